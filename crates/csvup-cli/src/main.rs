//! csvup CLI - Main entry point

use clap::Parser;
use csvup_cli::summary::{render_json, render_text};
use csvup_cli::{CliError, Cli};
use csvup_common::{CsvupError, RunResult};
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

#[tokio::main]
async fn main() {
    // Credentials named by envUsernameProperty/envPasswordProperty may live in .env
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let guard = match cli.init_logging() {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {}", e);
            None
        },
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing chunks in flight");
                cancel.cancel();
            }
        }
    });

    let outcome = csvup_cli::execute(&cli, &cancel).await;
    let code = report(&cli, &outcome);

    // process::exit skips destructors; flush file logs first
    drop(guard);
    process::exit(code);
}

/// Print the summary and the error, if any, and pick the exit code
fn report(cli: &Cli, outcome: &csvup_cli::Result<RunResult>) -> i32 {
    let empty = RunResult::new();
    let (result, status) = match outcome {
        Ok(result) => (Some(result), "success"),
        Err(CliError::Upload(CsvupError::RunCancelled { result })) => (Some(result), "cancelled"),
        Err(e) => match e.run_result() {
            Some(result) => (Some(result), "incomplete"),
            None => (None, "error"),
        },
    };

    if cli.json {
        match render_json(result.unwrap_or(&empty), status) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error: {}", e),
        }
    } else if let Some(result) = result {
        print!("{}", render_text(result));
    }

    match outcome {
        Ok(_) => 0,
        Err(e) => {
            error!(error = %e, "Upload failed");
            eprintln!("Error: {}", e);
            1
        },
    }
}
