mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use serde_json::json;
use std::process::ExitCode;

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let body = json!({
                "error": {
                    "kind": error.kind(),
                    "message": error.to_string(),
                }
            });
            eprintln!("{body}");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let value = commands::run(&cli).await?;
    output::render(&value, cli.pretty)
}
