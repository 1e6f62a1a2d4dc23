//! Configuration file handling
//!
//! A `Config` value is built once per run and handed to the scenario
//! catalog; nothing here is global.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths;
use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Filesystem layout
    #[serde(default)]
    pub paths: PathsConfig,

    /// External tools
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Health gate settings
    #[serde(default)]
    pub health: HealthConfig,

    /// Block-storage scenario settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Commit-log scenario settings
    #[serde(default)]
    pub log: LogConfig,

    /// Map-reduce scenario settings
    #[serde(default)]
    pub job: JobConfig,
}

/// Filesystem layout
#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// Directory holding one sub-directory per project under test
    #[serde(default = "default_projects_dir")]
    pub projects_dir: PathBuf,

    /// Directory holding golden snapshots, one sub-directory per check
    #[serde(default = "default_snapshots_dir")]
    pub snapshots_dir: PathBuf,

    /// Directory where downloaded artifacts are written
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            projects_dir: default_projects_dir(),
            snapshots_dir: default_snapshots_dir(),
            work_dir: default_work_dir(),
        }
    }
}

fn default_projects_dir() -> PathBuf {
    PathBuf::from("./projects")
}
fn default_snapshots_dir() -> PathBuf {
    PathBuf::from("./sanity_checks")
}
fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

/// External tools used to drive the systems under test
#[derive(Debug, Deserialize, Clone)]
pub struct ToolsConfig {
    /// Interpreter for the client scripts
    #[serde(default = "default_python")]
    pub python: String,

    /// Container orchestration command, e.g. `["docker", "compose"]`
    #[serde(default = "default_compose")]
    pub compose: Vec<String>,

    /// Dependency install command; the requirements file is appended
    #[serde(default = "default_pip_install")]
    pub pip_install: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            compose: default_compose(),
            pip_install: default_pip_install(),
        }
    }
}

fn default_python() -> String {
    "python3".to_string()
}
fn default_compose() -> Vec<String> {
    vec!["docker".to_string(), "compose".to_string()]
}
fn default_pip_install() -> Vec<String> {
    ["pip", "install", "-q", "--progress-bar", "off", "-r"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Health gate settings in seconds
#[derive(Debug, Deserialize, Clone)]
pub struct HealthConfig {
    /// Deadline per endpoint
    #[serde(default = "default_health_timeout")]
    pub timeout_secs: u64,

    /// Sleep between probes
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_health_timeout(),
            interval_secs: default_health_interval(),
        }
    }
}

fn default_health_timeout() -> u64 {
    60
}
fn default_health_interval() -> u64 {
    2
}

/// Block-storage scenario
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Project directory name under `paths.projects_dir`
    #[serde(default = "default_storage_project")]
    pub project: String,

    /// Ports answering `/healthcheck` on localhost
    #[serde(default = "default_storage_ports")]
    pub ports: Vec<u16>,

    /// File to upload, relative to the project directory
    #[serde(default = "default_storage_file")]
    pub test_file: PathBuf,

    /// Name the file is stored under
    #[serde(default = "default_remote_name")]
    pub remote_name: String,

    /// Local name the file is downloaded to, relative to `paths.work_dir`
    #[serde(default = "default_download_name")]
    pub download_name: String,

    /// Per-invocation timeout; unbounded when absent
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            project: default_storage_project(),
            ports: default_storage_ports(),
            test_file: default_storage_file(),
            remote_name: default_remote_name(),
            download_name: default_download_name(),
            timeout_secs: None,
        }
    }
}

fn default_storage_project() -> String {
    "1-hdfs".to_string()
}
fn default_storage_ports() -> Vec<u16> {
    vec![8000, 8001, 8002, 8003]
}
fn default_storage_file() -> PathBuf {
    PathBuf::from("test_files/cat.jpg")
}
fn default_remote_name() -> String {
    "uploaded-cat.jpg".to_string()
}
fn default_download_name() -> String {
    "downloaded-cat.jpg".to_string()
}

/// Commit-log scenario
#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_project")]
    pub project: String,

    #[serde(default = "default_log_ports")]
    pub ports: Vec<u16>,

    /// Pause after the health gate so brokers can elect a leader
    #[serde(default = "default_leader_election")]
    pub leader_election_secs: u64,

    /// Pause after topic creation
    #[serde(default = "default_propagation")]
    pub propagation_secs: u64,

    #[serde(default = "default_partitions")]
    pub partitions: u32,

    /// Key shared by every produced record
    #[serde(default = "default_key")]
    pub key: String,

    #[serde(default = "default_payloads")]
    pub payloads: Vec<String>,

    #[serde(default = "default_produce_timeout")]
    pub produce_timeout_secs: u64,

    /// Partition suffix of the topic-partition name that is consumed
    #[serde(default = "default_consume_partition")]
    pub consume_partition: u32,

    /// How long the consumer is left running before it is stopped
    #[serde(default = "default_drain")]
    pub drain_secs: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            project: default_log_project(),
            ports: default_log_ports(),
            leader_election_secs: default_leader_election(),
            propagation_secs: default_propagation(),
            partitions: default_partitions(),
            key: default_key(),
            payloads: default_payloads(),
            produce_timeout_secs: default_produce_timeout(),
            consume_partition: default_consume_partition(),
            drain_secs: default_drain(),
        }
    }
}

fn default_log_project() -> String {
    "4-kafka".to_string()
}
fn default_log_ports() -> Vec<u16> {
    vec![8001, 8002, 8003, 8004, 8005]
}
fn default_leader_election() -> u64 {
    10
}
fn default_propagation() -> u64 {
    5
}
fn default_partitions() -> u32 {
    1
}
fn default_key() -> String {
    "samekey".to_string()
}
fn default_payloads() -> Vec<String> {
    vec![
        "payload1".to_string(),
        "payload2".to_string(),
        "payload3".to_string(),
    ]
}
fn default_produce_timeout() -> u64 {
    20
}
fn default_consume_partition() -> u32 {
    1
}
fn default_drain() -> u64 {
    5
}

/// Map-reduce scenario
#[derive(Debug, Deserialize, Clone)]
pub struct JobConfig {
    #[serde(default = "default_job_project")]
    pub project: String,

    #[serde(default = "default_job_ports")]
    pub ports: Vec<u16>,

    /// Input dataset name, as understood by the job client
    #[serde(default = "default_input")]
    pub input: String,

    #[serde(default = "default_map_tasks")]
    pub map_tasks: u32,

    #[serde(default = "default_reduce_tasks")]
    pub reduce_tasks: u32,

    /// Application module submitted with the job
    #[serde(default = "default_app")]
    pub app: String,

    #[serde(default = "default_job_timeout")]
    pub timeout_secs: u64,

    /// Snapshot directory name under `paths.snapshots_dir`
    #[serde(default = "default_snapshot")]
    pub snapshot: PathBuf,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            project: default_job_project(),
            ports: default_job_ports(),
            input: default_input(),
            map_tasks: default_map_tasks(),
            reduce_tasks: default_reduce_tasks(),
            app: default_app(),
            timeout_secs: default_job_timeout(),
            snapshot: default_snapshot(),
        }
    }
}

fn default_job_project() -> String {
    "2-mapreduce".to_string()
}
fn default_job_ports() -> Vec<u16> {
    vec![8000, 8001, 8002, 8003, 8004, 8005]
}
fn default_input() -> String {
    "small-text".to_string()
}
fn default_map_tasks() -> u32 {
    1
}
fn default_reduce_tasks() -> u32 {
    3
}
fn default_app() -> String {
    "word_count".to_string()
}
fn default_job_timeout() -> u64 {
    100
}
fn default_snapshot() -> PathBuf {
    PathBuf::from("mapreduce/snapshot")
}

impl HealthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Config {
    /// Load configuration
    ///
    /// An explicit path must exist. Otherwise `./sanity.toml` and then the
    /// platform config file are tried; defaults are used if neither exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        for candidate in paths::config_candidates() {
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "Loading configuration");
                return Self::from_file(&candidate);
            }
        }

        Ok(Self::default())
    }

    /// Parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, &e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Directory of a project under test
    pub fn project_dir(&self, project: &str) -> PathBuf {
        self.paths.projects_dir.join(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_layout() {
        let config = Config::default();
        assert_eq!(config.health.timeout_secs, 60);
        assert_eq!(config.health.interval_secs, 2);
        assert_eq!(config.tools.compose, vec!["docker", "compose"]);
        assert_eq!(config.storage.ports, vec![8000, 8001, 8002, 8003]);
        assert_eq!(config.log.ports.len(), 5);
        assert_eq!(config.job.reduce_tasks, 3);
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            [health]
            interval_secs = 1

            [log]
            payloads = ["a", "b"]
            "#,
        )
        .unwrap();
        assert_eq!(config.health.interval_secs, 1);
        assert_eq!(config.health.timeout_secs, 60);
        assert_eq!(config.log.payloads, vec!["a", "b"]);
        assert_eq!(config.log.key, "samekey");
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let err = Config::from_toml("[health\n").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/sanity.toml"))).unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }
}
