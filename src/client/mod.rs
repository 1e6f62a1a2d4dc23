//! Client driver
//!
//! Runs the external client programs of a system under test. Every call is
//! bounded: either by the invocation's own timeout or, for `drain`, by a
//! fixed window after which the process is killed and whatever it printed
//! so far is returned.

mod capture;

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::process::{Child, Command};

use crate::common::{display_command, Error, Result};
use capture::OutputCapture;

/// How long to wait for output pipes to close once the process is gone
const PIPE_GRACE: Duration = Duration::from_secs(2);

/// One call of an external client program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInvocation {
    /// Program to run, looked up on `PATH`
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Text written to the program's stdin, which is then closed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
    /// Wall-clock budget; unbounded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,
    /// Return partial output instead of failing when the budget runs out
    #[serde(default)]
    pub allow_partial: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl ClientInvocation {
    pub fn new<S: Into<String>>(program: impl Into<String>, args: impl IntoIterator<Item = S>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            stdin: None,
            timeout_secs: None,
            allow_partial: false,
            working_dir: None,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs_f64());
        self
    }

    pub fn allow_partial(mut self) -> Self {
        self.allow_partial = true;
        self
    }

    /// The budget as a duration; a negative or invalid budget is already spent
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .map(|secs| Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO))
    }

    /// Command line for messages and logs
    pub fn command_line(&self) -> String {
        display_command(&self.program, &self.args)
    }
}

/// What a finished (or stopped) client invocation produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Exit code; `None` when the process was killed or died from a signal
    pub exit_code: Option<i32>,
    /// stdout and stderr merged in arrival order
    pub output: String,
    pub elapsed: Duration,
    /// Whether the harness had to kill the process
    pub terminated: bool,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Whether a nonzero exit fails the call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitPolicy {
    Checked,
    Ignored,
}

/// Run a client to completion
///
/// Fails with [`Error::ClientInvocation`] on a nonzero exit and with
/// [`Error::ClientTimeout`] when the timeout expires, unless the invocation
/// accepts partial output.
pub async fn invoke(invocation: &ClientInvocation) -> Result<ExecutionResult> {
    execute(invocation, ExitPolicy::Checked).await
}

/// Run a client that never exits on its own for at most `window`
///
/// The process is killed when the window closes and the output captured up
/// to then is returned. The exit code is never judged: success is decided by
/// what the output contains.
pub async fn drain(program: &str, args: &[String], window: Duration) -> Result<ExecutionResult> {
    let invocation = ClientInvocation::new(program, args.iter().cloned())
        .with_timeout(window)
        .allow_partial();
    drain_invocation(&invocation).await
}

/// [`drain`] for a prepared invocation; its timeout is the drain window
pub async fn drain_invocation(invocation: &ClientInvocation) -> Result<ExecutionResult> {
    if invocation.timeout().is_none() {
        return Err(Error::Config(format!(
            "Drain of '{}' needs a bounded window",
            invocation.command_line()
        )));
    }
    let mut invocation = invocation.clone();
    invocation.allow_partial = true;
    execute(&invocation, ExitPolicy::Ignored).await
}

async fn execute(invocation: &ClientInvocation, policy: ExitPolicy) -> Result<ExecutionResult> {
    let command_line = invocation.command_line();
    tracing::debug!(command = %command_line, timeout = ?invocation.timeout(), "Invoking client");

    let started = Instant::now();
    let mut child = spawn(invocation).map_err(|source| Error::ClientSpawn {
        command: command_line.clone(),
        source,
    })?;

    if let (Some(payload), Some(mut stdin)) = (invocation.stdin.clone(), child.stdin.take()) {
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                tracing::debug!("Client closed stdin early: {}", e);
            }
            // dropping stdin closes the pipe
        });
    }

    let mut sources: Vec<Box<dyn AsyncRead + Unpin + Send>> = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        sources.push(Box::new(stdout));
    }
    if let Some(stderr) = child.stderr.take() {
        sources.push(Box::new(stderr));
    }
    let capture = OutputCapture::spawn(sources);

    let status = match invocation.timeout() {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => Some(status?),
            Err(_) => None,
        },
        None => Some(child.wait().await?),
    };

    let Some(status) = status else {
        terminate(&mut child).await;
        let output = capture.finish(PIPE_GRACE).await;
        let elapsed = started.elapsed();

        if invocation.allow_partial {
            tracing::debug!(command = %command_line, ?elapsed, "Stopped client, keeping partial output");
            return Ok(ExecutionResult {
                exit_code: None,
                output,
                elapsed,
                terminated: true,
            });
        }

        return Err(Error::ClientTimeout {
            command: command_line,
            timeout_secs: invocation.timeout_secs.unwrap_or_default(),
            output,
        });
    };

    let output = capture.finish(PIPE_GRACE).await;
    let result = ExecutionResult {
        exit_code: status.code(),
        output,
        elapsed: started.elapsed(),
        terminated: false,
    };
    tracing::debug!(command = %command_line, exit_code = ?result.exit_code, elapsed = ?result.elapsed, "Client finished");

    if policy == ExitPolicy::Checked && !status.success() {
        return Err(Error::ClientInvocation {
            command: command_line,
            exit_code: result.exit_code,
            output: result.output,
        });
    }

    Ok(result)
}

fn spawn(invocation: &ClientInvocation) -> std::io::Result<Child> {
    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .stdin(if invocation.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = &invocation.working_dir {
        command.current_dir(dir);
    }

    // Own process group, so a forced stop also reaches anything the client spawned
    #[cfg(unix)]
    command.process_group(0);

    command.spawn()
}

/// Kill a client and everything in its process group
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: killpg only signals processes, the group id is the child's own pid
        let result = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if result != 0 {
            tracing::debug!("killpg({}) failed: {}", pid, std::io::Error::last_os_error());
        }
    }

    if let Err(e) = child.kill().await {
        tracing::debug!("Failed to kill client: {}", e);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ClientInvocation {
        ClientInvocation::new("sh", ["-c", script])
    }

    #[tokio::test]
    async fn test_invoke_merges_stdout_and_stderr() {
        let result = invoke(&sh("echo out; echo err >&2")).await.unwrap();
        assert!(result.success());
        assert!(result.output.contains("out"));
        assert!(result.output.contains("err"));
        assert!(!result.terminated);
    }

    #[tokio::test]
    async fn test_invoke_feeds_stdin() {
        let invocation = sh("cat").with_stdin("samekey\npayload1\n\n");
        let result = invoke(&invocation).await.unwrap();
        assert_eq!(result.output, "samekey\npayload1\n\n");
    }

    #[tokio::test]
    async fn test_nonzero_exit_carries_output() {
        let err = invoke(&sh("echo boom; exit 3")).await.unwrap_err();
        match err {
            Error::ClientInvocation {
                exit_code, output, ..
            } => {
                assert_eq!(exit_code, Some(3));
                assert!(output.contains("boom"));
            }
            other => panic!("Expected ClientInvocation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_fails_with_partial_output() {
        let invocation = sh("echo started; sleep 10").with_timeout(Duration::from_millis(300));
        let started = Instant::now();
        let err = invoke(&invocation).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        match err {
            Error::ClientTimeout { output, .. } => assert!(output.contains("started")),
            other => panic!("Expected ClientTimeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_with_partial_output_allowed() {
        let invocation = sh("echo started; sleep 10")
            .with_timeout(Duration::from_millis(300))
            .allow_partial();
        let result = invoke(&invocation).await.unwrap();
        assert!(result.terminated);
        assert_eq!(result.exit_code, None);
        assert!(result.output.contains("started"));
    }

    #[tokio::test]
    async fn test_drain_returns_output_of_endless_consumer() {
        let args = vec![
            "-c".to_string(),
            "echo payload1; echo payload2; while true; do sleep 1; done".to_string(),
        ];
        let started = Instant::now();
        let result = drain("sh", &args, Duration::from_millis(500)).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(result.terminated);
        assert!(result.output.contains("payload1"));
        assert!(result.output.contains("payload2"));
    }

    #[tokio::test]
    async fn test_drain_ignores_exit_code_of_early_exit() {
        let args = vec!["-c".to_string(), "echo done; exit 1".to_string()];
        let result = drain("sh", &args, Duration::from_secs(5)).await.unwrap();
        assert!(!result.terminated);
        assert_eq!(result.exit_code, Some(1));
        assert!(result.output.contains("done"));
    }

    #[tokio::test]
    async fn test_drain_requires_a_window() {
        let err = drain_invocation(&sh("true")).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_missing_program_is_a_spawn_error() {
        let invocation = ClientInvocation::new("definitely-not-a-real-program", Vec::<String>::new());
        let err = invoke(&invocation).await.unwrap_err();
        assert!(matches!(err, Error::ClientSpawn { .. }));
    }
}
