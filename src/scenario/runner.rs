//! Scenario runner implementation
//!
//! Brings the environment up, gates on health, installs client
//! dependencies, runs the steps, applies the verification rule, and always
//! tears the environment down again. The scenario's own failure and a
//! teardown failure are kept as two separate results.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use colored::Colorize;
use regex::Regex;
use serde::Serialize;

use crate::client::{self, ExecutionResult};
use crate::common::{Error, Result, VerificationFailure};
use crate::environment::{self, Environment};
use crate::health::{HealthGate, RetryPolicy};

use super::config::{Operation, Scenario};
use super::template::{Expand, Vars};

/// Result of a scenario run
#[derive(Debug)]
pub struct TestOutcome {
    pub name: String,
    pub steps_run: usize,
    pub steps_total: usize,
    pub elapsed: Duration,
    /// Why the scenario itself failed
    pub failure: Option<Error>,
    /// Why tearing the environment down failed, reported beside `failure`
    pub teardown_failure: Option<Error>,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        self.failure.is_none() && self.teardown_failure.is_none()
    }

    /// The one identified cause of a failed run: the scenario's own failure
    /// when there is one, the teardown failure otherwise
    pub fn cause(&self) -> Option<&Error> {
        self.failure.as_ref().or(self.teardown_failure.as_ref())
    }

    pub fn report(&self) -> OutcomeReport {
        OutcomeReport {
            name: self.name.clone(),
            passed: self.passed(),
            steps_run: self.steps_run,
            steps_total: self.steps_total,
            elapsed_secs: self.elapsed.as_secs_f64(),
            failure: self.failure.as_ref().map(ErrorReport::from),
            teardown_failure: self.teardown_failure.as_ref().map(ErrorReport::from),
        }
    }
}

/// Serializable form of a [`TestOutcome`]
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeReport {
    pub name: String,
    pub passed: bool,
    pub steps_run: usize,
    pub steps_total: usize,
    pub elapsed_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ErrorReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teardown_failure: Option<ErrorReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<VerificationFailure>,
}

impl From<&Error> for ErrorReport {
    fn from(e: &Error) -> Self {
        Self {
            code: e.code().to_string(),
            message: e.to_string(),
            detail: match e {
                Error::Verification(failure) => Some(failure.clone()),
                _ => None,
            },
        }
    }
}

/// Progress printing for a run
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Echo captured client output under each step
    pub verbose: bool,
    /// Print nothing; the caller reports the outcome itself
    pub quiet: bool,
}

impl RunOptions {
    pub fn quiet() -> Self {
        Self {
            verbose: false,
            quiet: true,
        }
    }
}

macro_rules! say {
    ($options:expr, $($arg:tt)*) => {
        if !$options.quiet {
            println!($($arg)*);
        }
    };
}

/// Steps completed so far; survives a failing body
#[derive(Debug, Default)]
struct Progress {
    steps_run: usize,
}

/// State threaded through the steps of one run
struct RunState {
    vars: Vars,
    captures: BTreeMap<String, ExecutionResult>,
}

/// Run one scenario against `environment`
///
/// Never returns an error: every failure ends up in the [`TestOutcome`].
pub async fn run_scenario(
    scenario: &Scenario,
    environment: &dyn Environment,
    policy: RetryPolicy,
    options: RunOptions,
) -> TestOutcome {
    let started = Instant::now();
    let steps_total = scenario.steps.len();

    say!(
        options,
        "\n{} {}",
        "Running Scenario:".blue().bold(),
        scenario.name.white().bold()
    );
    if let Some(desc) = &scenario.description {
        say!(options, "  {}", desc.dimmed());
    }
    say!(
        options,
        "\n{} {}",
        "Environment:".cyan(),
        environment.describe().dimmed()
    );

    let mut progress = Progress::default();
    let scoped = {
        let progress = &mut progress;
        environment::scoped(environment, move || {
            run_body(scenario, policy, options, progress)
        })
        .await
    };

    let outcome = TestOutcome {
        name: scenario.name.clone(),
        steps_run: progress.steps_run,
        steps_total,
        elapsed: started.elapsed(),
        failure: scoped.body.err(),
        teardown_failure: scoped.teardown,
    };

    print_outcome(&outcome, options);
    outcome
}

async fn run_body(
    scenario: &Scenario,
    policy: RetryPolicy,
    options: RunOptions,
    progress: &mut Progress,
) -> Result<()> {
    say!(options, "  {} Environment up", "✓".green());

    if !scenario.health.is_empty() {
        say!(options, "\n{}", "Health:".cyan());
        HealthGate::new(policy)?.wait_all(&scenario.health).await?;
        for endpoint in &scenario.health {
            say!(options, "  {} {}", "✓".green(), endpoint.base_url.dimmed());
        }
        tracing::info!("Containers are up and responding to healthcheck");
    }

    let mut state = RunState {
        vars: Vars::new(scenario.vars.clone())?,
        captures: BTreeMap::new(),
    };

    if !scenario.dependencies.is_empty() {
        say!(options, "\n{}", "Setup:".cyan());
        for dependency in &scenario.dependencies {
            let dependency = dependency.expand(&state.vars)?;
            install(&dependency).await?;
            say!(options, "  {} {}", "✓".green(), dependency.command_line().dimmed());
        }
    }

    say!(options, "\n{}", "Steps:".cyan());
    for (i, step) in scenario.steps.iter().enumerate() {
        let step_num = i + 1;
        let step = step.expand(&state.vars)?;
        if let Err(e) = execute_step(&step, &mut state, options).await {
            say!(options, "  {} Step {}: {}", "✗".red(), step_num, step.describe());
            return Err(e);
        }
        progress.steps_run = step_num;
        say!(
            options,
            "  {} Step {}: {}",
            "✓".green(),
            step_num,
            step.describe().dimmed()
        );
    }

    say!(options, "\n{}", "Verify:".cyan());
    let rule = scenario.verify.expand(&state.vars)?;
    rule.verify(|name| state.captures.get(name).map(|r| r.output.as_str()))?;
    say!(options, "  {} {}", "✓".green(), rule.describe().dimmed());

    Ok(())
}

async fn install(dependency: &client::ClientInvocation) -> Result<()> {
    match client::invoke(dependency).await {
        Ok(_) => Ok(()),
        Err(Error::ClientInvocation {
            command,
            exit_code,
            output,
        }) => Err(Error::DependencyInstall {
            command,
            exit_code,
            output,
        }),
        Err(Error::ClientTimeout {
            command, output, ..
        }) => Err(Error::DependencyInstall {
            command,
            exit_code: None,
            output,
        }),
        Err(Error::ClientSpawn { command, source }) => Err(Error::DependencyInstall {
            command,
            exit_code: None,
            output: source.to_string(),
        }),
        Err(other) => Err(other),
    }
}

/// Execute a single (already expanded) step
async fn execute_step(step: &Operation, state: &mut RunState, options: RunOptions) -> Result<()> {
    match step {
        Operation::Invoke { run, capture } => {
            let result = client::invoke(run).await?;
            record(state, run.command_line(), capture, result, options);
        }
        Operation::Drain {
            run,
            window_secs,
            capture,
        } => {
            let run = run.clone().with_timeout(seconds(*window_secs)?);
            let result = client::drain_invocation(&run).await?;
            record(state, run.command_line(), capture, result, options);
        }
        Operation::Sleep { secs, reason } => {
            tracing::debug!(?reason, "Sleeping {}s", secs);
            tokio::time::sleep(seconds(*secs)?).await;
        }
        Operation::RemoveFile { path } => {
            if path.exists() {
                std::fs::remove_file(path).map_err(|e| Error::file_read(path, &e))?;
                tracing::info!("Removed existing {}", path.display());
            }
        }
        Operation::Extract {
            from,
            pattern,
            into,
        } => {
            let output = state
                .captures
                .get(from)
                .map(|r| r.output.as_str())
                .ok_or_else(|| {
                    Error::Config(format!("No client output was captured as '{}'", from))
                })?;
            let regex = Regex::new(pattern)
                .map_err(|e| Error::Config(format!("Invalid pattern '{}': {}", pattern, e)))?;
            let value = extract(output, &regex).ok_or_else(|| {
                Error::Verification(VerificationFailure::PatternNotFound {
                    source: format!("'{}' output", from),
                    pattern: pattern.clone(),
                })
            })?;
            tracing::info!("Extracted {} = {}", into, value);
            state.vars.insert(into.clone(), value);
        }
    }
    Ok(())
}

fn seconds(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| Error::Config(format!("Invalid duration: {}s", secs)))
}

/// First capture group of `pattern` in `text` (whole match if it has none)
fn extract(text: &str, regex: &Regex) -> Option<String> {
    let caps = regex.captures(text)?;
    caps.get(1)
        .or_else(|| caps.get(0))
        .map(|m| m.as_str().to_string())
}

fn record(
    state: &mut RunState,
    command: String,
    capture: &Option<String>,
    result: ExecutionResult,
    options: RunOptions,
) {
    tracing::info!("{} output:\n{}", command, result.output);
    if options.verbose {
        for line in result.output.lines() {
            say!(options, "      {}", line.dimmed());
        }
    }
    if let Some(name) = capture {
        state.captures.insert(name.clone(), result);
    }
}

fn print_outcome(outcome: &TestOutcome, options: RunOptions) {
    if let Some(failure) = &outcome.failure {
        say!(options, "\n{} {}", "✗".red().bold(), "Scenario Failed".red().bold());
        say!(options, "  {}", failure);
    }
    if let Some(teardown) = &outcome.teardown_failure {
        say!(options, "\n{} {}", "✗".red().bold(), "Teardown Failed".red().bold());
        say!(options, "  {}", teardown);
    }
    if outcome.passed() {
        say!(
            options,
            "\n{} {} {}\n",
            "✓".green().bold(),
            "Scenario Passed".green().bold(),
            format!("({:.1}s)", outcome.elapsed.as_secs_f64()).dimmed()
        );
    }
}
