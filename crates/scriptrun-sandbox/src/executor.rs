//! Execution supervisor: screens, spawns, drains, and reports one job.
//!
//! Per job: `Created -> Screening -> (Rejected | Spawning) -> Running ->
//! (Completed | TimedOut | SpawnFailed) -> CleanedUp`. Every path ends with
//! exactly one cleanup of the job's script file and exactly one
//! [`ExecutionResult`]; failures become a `termination_reason`, never an error.

use crate::error::SandboxError;
use crate::job::{JobId, ScriptJob};
use crate::multiplex::{Polled, StreamMultiplexer};
use crate::output::{ExecutionResult, ExecutionUpdate, OutputCollector, TerminationReason};
use crate::process::{Completion, ProcessHandle, ProcessSupervisor, SpawnSpec};
use crate::Result;
use futures::{Stream, StreamExt};
use scriptrun_core::config::SupervisorConfig;
use scriptrun_core::safety::{RiskVerdict, Screener};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Runs script jobs under one configuration.
///
/// Cheap to clone; clones share the configuration and compiled screen.
#[derive(Clone)]
pub struct ExecutionSupervisor {
    config: Arc<SupervisorConfig>,
    screener: Arc<Screener>,
    processes: ProcessSupervisor,
}

/// A spawned job: the child, its output, and its scratch directory.
struct Running {
    handle: ProcessHandle,
    mux: StreamMultiplexer,
    _workdir: TempDir,
}

/// Supervisor-level facts about how a job ended.
struct Outcome {
    reason: TerminationReason,
    exit_code: Option<i32>,
    matched_pattern: Option<String>,
    detail: Option<String>,
}

impl Outcome {
    fn rejected(verdict: RiskVerdict) -> Self {
        Self {
            reason: TerminationReason::ScreenRejected,
            exit_code: None,
            matched_pattern: verdict.matched_pattern,
            detail: verdict.message,
        }
    }

    fn spawn_failed(error: impl fmt::Display) -> Self {
        Self::failed(TerminationReason::SpawnFailed, error)
    }

    fn internal(error: impl fmt::Display) -> Self {
        Self::failed(TerminationReason::InternalError, error)
    }

    fn failed(reason: TerminationReason, error: impl fmt::Display) -> Self {
        Self {
            reason,
            exit_code: None,
            matched_pattern: None,
            detail: Some(error.to_string()),
        }
    }

    fn from_completion(completion: Completion) -> Self {
        match completion {
            Completion::Exited { code, signal } => Self {
                reason: TerminationReason::Completed,
                exit_code: code,
                matched_pattern: None,
                detail: signal.map(|s| format!("Process terminated by signal {}", s)),
            },
            Completion::Killed => Self {
                reason: TerminationReason::TimedOut,
                exit_code: None,
                matched_pattern: None,
                detail: None,
            },
        }
    }
}

impl ExecutionSupervisor {
    /// Create a supervisor. The configuration is validated and the screen compiled once.
    pub fn new(config: SupervisorConfig) -> Result<Self> {
        config.validate()?;
        let screener = Screener::from_config(&config.screen)?;
        let processes = ProcessSupervisor::new(config.execution.reap_timeout());

        Ok(Self {
            config: Arc::new(config),
            screener: Arc::new(screener),
            processes,
        })
    }

    /// Configuration in effect.
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Compiled risk screen.
    pub fn screener(&self) -> &Screener {
        &self.screener
    }

    /// Run a job to completion and return its result.
    pub async fn execute_aggregated(&self, job: ScriptJob) -> ExecutionResult {
        let job_id = job.id();
        let timeout = self.job_timeout(&job);

        let updates = self.execute_streaming(job);
        futures::pin_mut!(updates);

        let mut events = 0usize;
        while let Some(update) = updates.next().await {
            match update {
                ExecutionUpdate::Output(_) => events += 1,
                ExecutionUpdate::Finished(result) => {
                    debug!(%job_id, events, "Aggregated job output");
                    return result;
                }
            }
        }

        // The stream always ends with a result; this only guards the contract
        Self::bare_result(
            job_id,
            timeout,
            Outcome::internal("execution ended without a result"),
        )
    }

    /// Run a job, yielding each output line as it arrives and then one
    /// terminal result.
    ///
    /// The stream is single-use. Dropping it early kills the child and still
    /// removes the job's script file.
    pub fn execute_streaming(
        &self,
        job: ScriptJob,
    ) -> impl Stream<Item = ExecutionUpdate> + Send + 'static {
        let supervisor = self.clone();

        async_stream::stream! {
            let mut job = job;
            let job_id = job.id();
            let timeout = supervisor.job_timeout(&job);
            let collector = OutputCollector::default();

            debug!(%job_id, path = %job.path().display(), "Screening script");
            let verdict = supervisor.screen(&job).await;
            if !verdict.allowed {
                info!(%job_id, pattern = ?verdict.matched_pattern, "Script rejected by screen");
                let outcome = Outcome::rejected(verdict);
                yield ExecutionUpdate::Finished(
                    supervisor.finish(&mut job, outcome, collector, Duration::ZERO, false, timeout),
                );
                return;
            }

            let running = match supervisor.launch(&job, timeout).await {
                Ok(running) => running,
                Err(e) => {
                    let outcome = match e {
                        SandboxError::SpawnFailed(message) => Outcome::spawn_failed(message),
                        other => Outcome::internal(other),
                    };
                    yield ExecutionUpdate::Finished(
                        supervisor.finish(&mut job, outcome, collector, Duration::ZERO, false, timeout),
                    );
                    return;
                }
            };

            let updates = supervisor.drive(job, running, timeout);
            futures::pin_mut!(updates);
            while let Some(update) = updates.next().await {
                yield update;
            }
        }
    }

    /// Supervise a launched job until it ends, then report it.
    ///
    /// Yields output as it is dequeued and finishes with the job's result.
    /// Every process left in the job's group is killed before the result.
    fn drive(
        &self,
        job: ScriptJob,
        running: Running,
        timeout: Duration,
    ) -> impl Stream<Item = ExecutionUpdate> + Send + 'static {
        let supervisor = self.clone();

        async_stream::stream! {
            let mut job = job;
            let mut running = running;
            let job_id = job.id();
            let mut collector = OutputCollector::default();

            let poll = supervisor.config.execution.poll_interval();
            let outcome = loop {
                if running.handle.deadline_elapsed() {
                    debug!(%job_id, "Deadline elapsed");
                    break supervisor.time_out(&mut running).await;
                }

                match running.mux.poll(poll).await {
                    Polled::Event(event) => {
                        collector.push(&event);
                        yield ExecutionUpdate::Output(event);
                    }
                    Polled::Failed { stream, message } => {
                        let error = SandboxError::Reader {
                            stream: stream.to_string(),
                            message,
                        };
                        break supervisor.abandon(&mut running, error).await;
                    }
                    Polled::Idle => match running.handle.try_exited() {
                        Ok(Some(_)) => match supervisor.processes.await_completion(&mut running.handle).await {
                            Ok(completion) => break Outcome::from_completion(completion),
                            Err(e) => break supervisor.abandon(&mut running, e).await,
                        },
                        Ok(None) => {}
                        Err(e) => break supervisor.abandon(&mut running, e).await,
                    },
                    Polled::Closed => {
                        match supervisor.processes.await_completion(&mut running.handle).await {
                            Ok(completion) => break Outcome::from_completion(completion),
                            Err(e) => break supervisor.abandon(&mut running, e).await,
                        }
                    }
                }
            };

            let elapsed = running.handle.started_at().elapsed();

            // Background processes end with the job, on every path
            running.handle.kill_group();

            // One final pass for lines still in flight, bounded by the reap timeout
            let drain_until = Instant::now() + supervisor.config.execution.reap_timeout();
            loop {
                let remaining = drain_until.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                match running.mux.poll(remaining).await {
                    Polled::Event(event) => {
                        collector.push(&event);
                        yield ExecutionUpdate::Output(event);
                    }
                    Polled::Failed { stream, message } => {
                        warn!(%job_id, %stream, %message, "Reader failed during final drain");
                        break;
                    }
                    Polled::Idle | Polled::Closed => break,
                }
            }
            running.mux.abort();

            let truncated = running.mux.truncated();
            drop(running);

            yield ExecutionUpdate::Finished(
                supervisor.finish(&mut job, outcome, collector, elapsed, truncated, timeout),
            );
        }
    }

    fn job_timeout(&self, job: &ScriptJob) -> Duration {
        job.timeout()
            .unwrap_or_else(|| self.config.execution.timeout())
    }

    /// Screen the job's file. Read failures reject the job.
    async fn screen(&self, job: &ScriptJob) -> RiskVerdict {
        match tokio::fs::read_to_string(job.path()).await {
            Ok(text) => self.screener.screen(&text),
            Err(e) => RiskVerdict::unreadable(e),
        }
    }

    /// Copy the script into a fresh directory and start the interpreter there.
    async fn launch(&self, job: &ScriptJob, timeout: Duration) -> Result<Running> {
        let exec = &self.config.execution;

        let workdir = tempfile::Builder::new().prefix("scriptrun-").tempdir()?;
        let script = workdir.path().join(&exec.script_file_name);
        tokio::fs::copy(job.path(), &script).await?;

        let parent_env = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));
        let spec = SpawnSpec {
            program: exec.interpreter.clone(),
            args: exec.interpreter_args.clone(),
            script,
            cwd: workdir.path().to_path_buf(),
            env: exec.environment.apply(parent_env),
        };

        let mut handle = self.processes.spawn(&spec, timeout)?;
        debug!(job_id = %job.id(), pid = ?handle.pid(), "Job running");

        let mux = StreamMultiplexer::start(
            handle.take_stdout(),
            handle.take_stderr(),
            exec.max_output_bytes,
        );

        Ok(Running {
            handle,
            mux,
            _workdir: workdir,
        })
    }

    /// Kill a job whose deadline passed.
    async fn time_out(&self, running: &mut Running) -> Outcome {
        match self.processes.terminate(&mut running.handle).await {
            Ok(completion) => Outcome::from_completion(completion),
            Err(e) => Outcome::internal(e),
        }
    }

    /// Kill a job after a supervision failure.
    async fn abandon(&self, running: &mut Running, error: SandboxError) -> Outcome {
        warn!(error = %error, "Abandoning job");
        if let Err(e) = self.processes.terminate(&mut running.handle).await {
            warn!(error = %e, "Failed to terminate abandoned job");
        }
        Outcome::internal(error)
    }

    /// Clean up the job's file and shape the terminal result.
    fn finish(
        &self,
        job: &mut ScriptJob,
        outcome: Outcome,
        collector: OutputCollector,
        elapsed: Duration,
        truncated: bool,
        timeout: Duration,
    ) -> ExecutionResult {
        let cleanup_error = job.cleanup().error().map(str::to_string);
        let (stdout, stderr) = collector.into_parts();

        let mut result = Self::bare_result(job.id(), timeout, outcome);
        result.stdout = stdout;
        result.stderr = stderr;
        result.elapsed_ms = elapsed.as_millis() as u64;
        result.truncated = truncated;
        result.cleanup_error = cleanup_error;

        info!(
            job_id = %result.job_id,
            reason = %result.termination_reason,
            exit_code = ?result.exit_code,
            elapsed_ms = result.elapsed_ms,
            "Job finished"
        );
        result
    }

    fn bare_result(job_id: JobId, timeout: Duration, outcome: Outcome) -> ExecutionResult {
        ExecutionResult {
            job_id,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: outcome.exit_code,
            elapsed_ms: 0,
            termination_reason: outcome.reason,
            timeout_ms: timeout.as_millis() as u64,
            matched_pattern: outcome.matched_pattern,
            detail: outcome.detail,
            truncated: false,
            cleanup_error: None,
        }
    }
}
