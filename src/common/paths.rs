//! Configuration paths and path helpers

use std::path::PathBuf;

/// Application name used for platform directories
const APP_NAME: &str = "sanity";

/// Name of the configuration file
const CONFIG_FILE: &str = "sanity.toml";

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/sanity/`
/// - macOS: `~/Library/Application Support/sanity/`
/// - Windows: `%APPDATA%\sanity\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the user-level configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Configuration files in lookup order: working directory first
pub fn config_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from(CONFIG_FILE)];
    candidates.extend(config_path());
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_working_directory_config_comes_first() {
        let candidates = config_candidates();
        assert_eq!(candidates[0], PathBuf::from("sanity.toml"));
    }
}
