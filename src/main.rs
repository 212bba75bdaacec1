//! Binary entry point for wechat-dedup.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::Parser;
use std::process::ExitCode;
use wechat_dedup::cli::{self, Cli};
use wechat_dedup::config::AppConfig;
use wechat_dedup::observability::{self, LoggingConfig};
use wechat_dedup::{Error, ErrorKind};

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is the normal case.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {e}");
        return exit_code(&e);
    }

    if let Err(e) = observability::init(&LoggingConfig::from_env(cli.verbose)) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let mut stdout = std::io::stdout().lock();
    match cli::run(cli, config, &mut stdout).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            exit_code(&e)
        },
    }
}

/// Maps the error taxonomy onto process exit codes.
fn exit_code(error: &Error) -> ExitCode {
    match error.kind() {
        ErrorKind::Validation => ExitCode::from(2),
        ErrorKind::Contention => ExitCode::from(3),
        ErrorKind::NotReady => ExitCode::from(4),
        ErrorKind::Upstream => ExitCode::FAILURE,
    }
}
