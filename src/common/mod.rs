//! Common utilities shared by every harness component

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result, VerificationFailure};

/// Render a program and its arguments as a single shell-like string for
/// messages. Arguments containing whitespace are quoted.
pub fn display_command<S: AsRef<str>>(program: &str, args: &[S]) -> String {
    let mut out = program.to_string();
    for arg in args {
        let arg = arg.as_ref();
        out.push(' ');
        if arg.is_empty() || arg.chars().any(char::is_whitespace) {
            out.push('\'');
            out.push_str(arg);
            out.push('\'');
        } else {
            out.push_str(arg);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_command_quotes_whitespace() {
        assert_eq!(
            display_command("python3", &["run.py", "small text", ""]),
            "python3 run.py 'small text' ''"
        );
    }
}
