//! Command-line interface.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use console::style;

use crate::domain::errors::EngineError;

use commands::{abort::AbortArgs, run::RunArgs, summary::SummaryArgs};

/// Command line of the `runcheck` binary.
#[derive(Parser, Debug)]
#[command(name = "runcheck", version, about = "End-to-end tests for remote actor and task runs")]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Print machine readable JSON
    #[arg(short, long, global = true)]
    pub json: bool,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a test program, or handle an abort/timeout signal input
    Run(RunArgs),
    /// Abort every run recorded in a key-value store's CALLS record
    Abort(AbortArgs),
    /// Render a stored OUTPUT record
    Summary(SummaryArgs),
}

/// Exit code for a pass with failing specs.
pub const EXIT_TESTS_FAILED: i32 = 1;
/// Exit code for every other error. An interrupted run exits with 128
/// plus the signal number instead.
pub const EXIT_ERROR: i32 = 2;

/// Exit code for an error returned by a command.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<EngineError>() {
        Some(EngineError::AggregateFailure { .. }) => EXIT_TESTS_FAILED,
        Some(EngineError::Interrupted { exit_code, .. }) => *exit_code,
        _ => EXIT_ERROR,
    }
}

/// Report a command error and exit.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let causes: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        let body = serde_json::json!({ "error": err.to_string(), "causes": causes });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("{} {err:#}", style("error:").red().bold());
    }
    std::process::exit(exit_code(&err))
}
