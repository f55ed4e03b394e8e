//! ferry CLI.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use ferry::{CliArgs, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = CliArgs::parse();
    match args.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "ferry failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
