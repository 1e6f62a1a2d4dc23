//! Sanity-check CLI for the distributed systems course projects
//!
//! Brings a project's containers up, drives its clients, verifies what comes
//! back, and tears everything down again.

use std::path::PathBuf;

use clap::Parser;
use sanity::cli::{self, GlobalOptions};
use sanity::commands::Commands;
use sanity::common::logging;

#[derive(Parser)]
#[command(name = "sanity", about = "End-to-end sanity checks for containerized systems")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: ./sanity.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Show client output and debug logs
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let guard = logging::init_cli(cli.verbose, cli.log_file.as_deref());

    let options = GlobalOptions {
        config: cli.config,
        json: cli.json,
        verbose: cli.verbose,
    };

    let passed = match cli::dispatch(cli.command, &options).await {
        Ok(passed) => passed,
        Err(e) => {
            eprintln!("Error: {e}");
            false
        }
    };

    // flush the log file before exiting
    drop(guard);
    if !passed {
        std::process::exit(1);
    }
}
