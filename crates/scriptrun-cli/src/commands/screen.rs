//! Script screening command.

use anyhow::Context;
use clap::Args;
use scriptrun_core::{Screener, SupervisorConfig};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::render;

/// Screen command arguments.
#[derive(Args)]
pub struct ScreenArgs {
    /// Script to check
    pub file: PathBuf,

    /// Emit the verdict as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run the screen command. Exits non-zero when the script would be rejected.
pub async fn run(args: ScreenArgs, config: SupervisorConfig) -> anyhow::Result<ExitCode> {
    let screener = Screener::from_config(&config.screen).context("Invalid denylist")?;
    let verdict = screener.screen_file(&args.file);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    } else {
        render::render_verdict(&verdict);
    }

    Ok(if verdict.allowed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
