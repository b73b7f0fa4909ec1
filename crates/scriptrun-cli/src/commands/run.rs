//! Script execution command.

use anyhow::Context;
use clap::Args;
use futures::{pin_mut, StreamExt};
use scriptrun_core::SupervisorConfig;
use scriptrun_sandbox::{
    ExecutionResult, ExecutionSupervisor, ExecutionUpdate, ScriptJob, TerminationReason,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use crate::render;

/// Exit status used when the script was killed at its deadline.
pub const TIMEOUT_EXIT_CODE: u8 = 124;

/// Run command arguments.
#[derive(Args)]
pub struct RunArgs {
    /// Script to execute; a staged copy runs and the original is left in place
    pub file: PathBuf,

    /// Print output while the script runs
    #[arg(long)]
    pub stream: bool,

    /// Emit JSON instead of plain text
    #[arg(long)]
    pub json: bool,

    /// Timeout in seconds, overriding the configured value
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

/// Run the run command.
pub async fn run(args: RunArgs, config: SupervisorConfig) -> anyhow::Result<ExitCode> {
    let contents = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let name = args
        .file
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();

    let supervisor = ExecutionSupervisor::new(config).context("Invalid configuration")?;

    let mut job = ScriptJob::stage(&supervisor.config().uploads, name, &contents).await?;
    if let Some(secs) = args.timeout {
        job = job.with_timeout(Duration::from_secs(secs));
    }
    tracing::debug!(job_id = %job.id(), path = %job.path().display(), "Running staged script");

    let result = if args.stream {
        run_streaming(&supervisor, job, args.json).await?
    } else {
        let result = supervisor.execute_aggregated(job).await;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            render::render_output(&result);
        }
        result
    };

    if !args.json {
        render::render_summary(&result);
    }

    Ok(ExitCode::from(exit_status(&result)))
}

async fn run_streaming(
    supervisor: &ExecutionSupervisor,
    job: ScriptJob,
    json: bool,
) -> anyhow::Result<ExecutionResult> {
    let updates = supervisor.execute_streaming(job);
    pin_mut!(updates);

    let mut finished = None;
    while let Some(update) = updates.next().await {
        if json {
            // One self-contained object per line
            println!("{}", serde_json::to_string(&update)?);
        }
        match update {
            ExecutionUpdate::Output(event) => {
                if !json {
                    render::render_event(&event);
                }
            }
            ExecutionUpdate::Finished(result) => finished = Some(result),
        }
    }

    finished.context("Execution stream ended without a result")
}

/// Process exit status mirroring the script's own where possible.
pub fn exit_status(result: &ExecutionResult) -> u8 {
    match result.termination_reason {
        TerminationReason::Completed => result
            .exit_code
            .and_then(|code| u8::try_from(code).ok())
            .unwrap_or(1),
        TerminationReason::TimedOut => TIMEOUT_EXIT_CODE,
        TerminationReason::ScreenRejected
        | TerminationReason::SpawnFailed
        | TerminationReason::InternalError => 1,
    }
}
