//! scriptrun CLI entry point.

use clap::Parser;
use scriptrun_cli::{load_config, logging, run, Cli};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // A broken config is reported by the command that needs it
    let logging_config = load_config(cli.config.as_deref())
        .map(|config| config.logging)
        .unwrap_or_default();
    logging::init(cli.verbose, &logging_config);

    // Run the command
    run(cli).await
}
