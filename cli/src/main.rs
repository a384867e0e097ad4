//! `agentpack` CLI entrypoint.
//!
//! This binary builds agent projects into containers, attaches side files,
//! manages the signing certificate store, and verifies and installs
//! containers. Results go to stdout; diagnostics and logs go to stderr.

mod cli;
mod commands;
mod error;

use crate::cli::Cli;
use crate::commands::Console;
use crate::error::Result;
use clap::Parser;
use std::io::{self, Write};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "AGENTPACK_LOG";

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbosity);

    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    let mut stdin = io::stdin().lock();
    let run_result = commands::run(
        &cli,
        &mut Console {
            out: &mut stdout,
            err: &mut stderr,
            input: &mut stdin,
        },
    );
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

/// Install a stderr subscriber that also receives `log` records.
///
/// `-v` selects `info` and `-vv` selects `debug`; without either the
/// filter comes from `AGENTPACK_LOG`, defaulting to `warn`.
fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .without_time()
        .with_target(false)
        .try_init();
    if installed.is_err() {
        // A subscriber is already installed; keep it.
    }
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, format!("error: {err}"));
            1
        }
    }
}

fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort reporting; ignore write failures.
    }
}
