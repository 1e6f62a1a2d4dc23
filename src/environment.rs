//! Environment controller
//!
//! Starts and stops the containerized system under test. [`scoped`] is the
//! only way the runner acquires an environment: once `up` has succeeded,
//! `down` runs exactly once, whatever the body does (including panicking).

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};

use crate::client::{self, ClientInvocation};
use crate::common::config::ToolsConfig;
use crate::common::{Error, Result};

/// Where the system under test comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnvironmentDescriptor {
    /// A compose project started from `file`
    Compose {
        file: PathBuf,
        /// Rebuild images on start
        #[serde(default = "default_build")]
        build: bool,
    },
    /// Already running; nothing is started or stopped
    External,
}

fn default_build() -> bool {
    true
}

/// A system under test that can be brought up and torn down
#[async_trait]
pub trait Environment: Send + Sync {
    /// Human-readable description for logs
    fn describe(&self) -> String;

    /// Start the system; fails with [`Error::EnvironmentStartup`]
    async fn up(&self) -> Result<()>;

    /// Stop and remove the system; fails with [`Error::EnvironmentTeardown`]
    async fn down(&self) -> Result<()>;
}

/// Build the environment a descriptor names
pub fn from_descriptor(descriptor: &EnvironmentDescriptor, tools: &ToolsConfig) -> Box<dyn Environment> {
    match descriptor {
        EnvironmentDescriptor::Compose { file, build } => Box::new(ComposeEnvironment::new(
            tools.compose.clone(),
            file.clone(),
            *build,
        )),
        EnvironmentDescriptor::External => Box::new(ExternalEnvironment),
    }
}

/// `docker compose -f <file> up --build -d` / `docker compose -f <file> down`
///
/// Neither call is time-boxed; they take as long as the compose tool does.
#[derive(Debug, Clone)]
pub struct ComposeEnvironment {
    compose: Vec<String>,
    file: PathBuf,
    build: bool,
}

impl ComposeEnvironment {
    /// `compose` is the orchestration command, e.g. `["docker", "compose"]`
    pub fn new(compose: Vec<String>, file: PathBuf, build: bool) -> Self {
        Self {
            compose,
            file,
            build,
        }
    }

    fn invocation(&self, action: &[&str]) -> Result<ClientInvocation> {
        let (program, prefix) = self
            .compose
            .split_first()
            .ok_or_else(|| Error::Config("Compose command is empty".to_string()))?;

        let mut args = prefix.to_vec();
        args.push("-f".to_string());
        args.push(self.file.display().to_string());
        args.extend(action.iter().map(|s| s.to_string()));
        Ok(ClientInvocation::new(program.clone(), args))
    }

    fn up_invocation(&self) -> Result<ClientInvocation> {
        if self.build {
            self.invocation(&["up", "--build", "-d"])
        } else {
            self.invocation(&["up", "-d"])
        }
    }

    fn down_invocation(&self) -> Result<ClientInvocation> {
        self.invocation(&["down"])
    }
}

#[async_trait]
impl Environment for ComposeEnvironment {
    fn describe(&self) -> String {
        format!("compose project {}", self.file.display())
    }

    async fn up(&self) -> Result<()> {
        let invocation = self.up_invocation()?;
        let command = invocation.command_line();

        if which::which(&invocation.program).is_err() {
            return Err(Error::EnvironmentStartup {
                command,
                reason: format!("'{}' not found on PATH", invocation.program),
            });
        }

        tracing::info!("Using compose file at: {}", self.file.display());
        let result = client::invoke(&invocation)
            .await
            .map_err(|e| Error::EnvironmentStartup {
                command: command.clone(),
                reason: failure_reason(e),
            })?;
        tracing::debug!("{} output:\n{}", command, result.output);
        Ok(())
    }

    async fn down(&self) -> Result<()> {
        let invocation = self.down_invocation()?;
        let command = invocation.command_line();

        let result = client::invoke(&invocation)
            .await
            .map_err(|e| Error::EnvironmentTeardown {
                command: command.clone(),
                reason: failure_reason(e),
            })?;
        tracing::debug!("{} output:\n{}", command, result.output);
        Ok(())
    }
}

fn failure_reason(error: Error) -> String {
    match error {
        Error::ClientInvocation {
            exit_code, output, ..
        } => format!("exit code {:?}\n{}", exit_code, output),
        other => other.to_string(),
    }
}

/// A deployment managed by someone else
#[derive(Debug, Clone, Copy, Default)]
pub struct ExternalEnvironment;

#[async_trait]
impl Environment for ExternalEnvironment {
    fn describe(&self) -> String {
        "external deployment".to_string()
    }

    async fn up(&self) -> Result<()> {
        Ok(())
    }

    async fn down(&self) -> Result<()> {
        Ok(())
    }
}

/// What happened inside and around an acquired environment
#[derive(Debug)]
pub struct Scoped<T> {
    /// Result of `up` followed by the body
    pub body: Result<T>,
    /// Teardown failure, kept apart from the body's result
    pub teardown: Option<Error>,
    /// Whether `down` ran
    pub released: bool,
}

/// Run `body` with the environment up, then tear it down
///
/// If `up` fails, the body does not run and nothing is released. Otherwise
/// `down` runs exactly once after the body, whether it succeeded, failed, or
/// panicked; a panic is resumed after teardown.
pub async fn scoped<E, F, Fut, T>(environment: &E, body: F) -> Scoped<T>
where
    E: Environment + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if let Err(e) = environment.up().await {
        return Scoped {
            body: Err(e),
            teardown: None,
            released: false,
        };
    }
    tracing::debug!("Acquired {}", environment.describe());

    let outcome = AssertUnwindSafe(body()).catch_unwind().await;

    let teardown = match environment.down().await {
        Ok(()) => {
            tracing::debug!("Released {}", environment.describe());
            None
        }
        Err(e) => {
            tracing::error!("Unable to bring down {}: {}", environment.describe(), e);
            Some(e)
        }
    };

    match outcome {
        Ok(body) => Scoped {
            body,
            teardown,
            released: true,
        },
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
