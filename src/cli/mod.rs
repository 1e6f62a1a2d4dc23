//! CLI command handling
//!
//! Dispatches CLI commands and formats their results, either as colored
//! progress lines or as JSON.

use std::path::{Path, PathBuf};
use std::time::Duration;

use colored::Colorize;
use serde::Serialize;
use tokio::io::AsyncReadExt;

use crate::commands::{Commands, VerifyCommands};
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::environment;
use crate::health::{HealthEndpoint, HealthGate, RetryPolicy};
use crate::scenario::runner::ErrorReport;
use crate::scenario::{catalog, run_scenario, RunOptions, Scenario};
use crate::verify;

/// Flags shared by every command
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub json: bool,
    pub verbose: bool,
}

/// Dispatch a CLI command
///
/// Returns whether the check passed. Errors are reserved for problems that
/// stop a check from being judged at all (unreadable config, bad scenario
/// file, unreachable health endpoint).
pub async fn dispatch(command: Commands, options: &GlobalOptions) -> Result<bool> {
    let config = Config::load(options.config.as_deref())?;

    match command {
        Commands::Check { system, print } => {
            let scenario = catalog::build(system, &config);
            if print {
                print!("{}", scenario.to_yaml()?);
                return Ok(true);
            }
            run(&scenario, &config, options).await
        }

        Commands::Run { path } => {
            let scenario = Scenario::load(&path)?;
            run(&scenario, &config, options).await
        }

        Commands::Health {
            urls,
            timeout,
            interval,
        } => {
            let policy = RetryPolicy::new(
                timeout.map(Duration::from_secs).unwrap_or_else(|| config.health.timeout()),
                interval.map(Duration::from_secs).unwrap_or_else(|| config.health.interval()),
            );
            health(&urls, policy, options).await
        }

        Commands::Verify(verify_cmd) => {
            let (label, result) = match verify_cmd {
                VerifyCommands::Hash {
                    left,
                    right,
                    algorithm,
                    chunk_size,
                } => (
                    format!("{} == {}", left.display(), right.display()),
                    verify::verify_hash_equality(&left, &right, algorithm, chunk_size),
                ),
                VerifyCommands::Contains { file, needles } => {
                    let text = read_input(&file).await?;
                    (
                        format!("{} contains {:?}", file.display(), needles),
                        verify::containment(&text, &needles, &file.display().to_string()),
                    )
                }
                VerifyCommands::Snapshot { actual, expected } => (
                    format!("{} matches {}", actual.display(), expected.display()),
                    verify::verify_snapshot_file(&actual, &expected, &actual.display().to_string()),
                ),
                VerifyCommands::Partitions {
                    results_dir,
                    snapshot_dir,
                    partitions,
                } => (
                    format!(
                        "{} partitions of {} match {}",
                        partitions,
                        results_dir.display(),
                        snapshot_dir.display()
                    ),
                    verify::verify_partitions(&results_dir, partitions, &snapshot_dir),
                ),
            };
            report_check(&label, result, options)
        }
    }
}

/// Run a scenario in the environment it names
async fn run(scenario: &Scenario, config: &Config, options: &GlobalOptions) -> Result<bool> {
    let env = environment::from_descriptor(&scenario.environment, &config.tools);
    let policy = RetryPolicy::new(config.health.timeout(), config.health.interval());
    let run_options = RunOptions {
        verbose: options.verbose,
        quiet: options.json,
    };

    let outcome = run_scenario(scenario, env.as_ref(), policy, run_options).await;

    if let Some(failure) = &outcome.failure {
        tracing::error!("{}", failure);
    }
    if let Some(teardown) = &outcome.teardown_failure {
        tracing::error!("{}", teardown);
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&outcome.report())?);
    }
    Ok(outcome.passed())
}

#[derive(Serialize)]
struct EndpointReport {
    url: String,
    elapsed_secs: f64,
}

async fn health(urls: &[String], policy: RetryPolicy, options: &GlobalOptions) -> Result<bool> {
    let gate = HealthGate::new(policy)?;
    let mut reports = Vec::with_capacity(urls.len());

    for url in urls {
        let endpoint = HealthEndpoint::new(url.clone());
        let elapsed = gate.wait(&endpoint).await?;
        if !options.json {
            println!(
                "  {} {} {}",
                "✓".green(),
                url,
                format!("({:.1}s)", elapsed.as_secs_f64()).dimmed()
            );
        }
        reports.push(EndpointReport {
            url: url.clone(),
            elapsed_secs: elapsed.as_secs_f64(),
        });
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    Ok(true)
}

#[derive(Serialize)]
struct CheckReport<'a> {
    check: &'a str,
    passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<ErrorReport>,
}

/// Print a verifier result; only verification failures count as a failed check
fn report_check(label: &str, result: Result<()>, options: &GlobalOptions) -> Result<bool> {
    let failure = match result {
        Ok(()) => None,
        Err(e @ Error::Verification(_)) => Some(e),
        Err(e) => return Err(e),
    };

    if options.json {
        let report = CheckReport {
            check: label,
            passed: failure.is_none(),
            failure: failure.as_ref().map(ErrorReport::from),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        match &failure {
            None => println!("{} {}", "✓".green().bold(), label),
            Some(e) => {
                println!("{} {}", "✗".red().bold(), label);
                println!("  {}", e);
            }
        }
    }
    Ok(failure.is_none())
}

/// Read a file, or stdin for `-`
async fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        tokio::io::stdin().read_to_string(&mut text).await?;
        return Ok(text);
    }
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::file_read(path, &e))
}
