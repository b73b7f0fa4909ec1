//! Events and results produced by a job.

use crate::job::JobId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Line emitted in place of output beyond the per-stream cap.
pub const TRUNCATION_MARKER: &str = "[Output truncated]\n";

/// Which child pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// One line of child output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    /// Source pipe.
    pub stream: StreamKind,

    /// The line, including its trailing newline when the child wrote one.
    pub text: String,

    /// Position across both streams, assigned when the line is dequeued.
    pub sequence: u64,
}

/// Why a job stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The interpreter ran and exited on its own.
    Completed,
    /// The deadline elapsed and the child was killed.
    TimedOut,
    /// The risk screen rejected the script; nothing ran.
    ScreenRejected,
    /// The interpreter could not be started.
    SpawnFailed,
    /// Supervision itself failed.
    InternalError,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
            Self::ScreenRejected => "screen_rejected",
            Self::SpawnFailed => "spawn_failed",
            Self::InternalError => "internal_error",
        };
        f.write_str(s)
    }
}

/// Terminal outcome of a job. Exactly one is produced per job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Job this result belongs to.
    pub job_id: JobId,

    /// All stdout lines, in order.
    pub stdout: String,

    /// All stderr lines, in order.
    pub stderr: String,

    /// Exit code; absent when the child was killed or never ran.
    pub exit_code: Option<i32>,

    /// Time from spawn to reap in milliseconds; zero when nothing ran.
    pub elapsed_ms: u64,

    /// Why the job stopped.
    pub termination_reason: TerminationReason,

    /// Timeout the job ran under, in milliseconds.
    pub timeout_ms: u64,

    /// Denylist entry that rejected the script.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_pattern: Option<String>,

    /// Screen message, OS error text, or internal failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Whether either stream hit the output cap.
    #[serde(default)]
    pub truncated: bool,

    /// Set when removing the script file failed. Never changes the reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_error: Option<String>,
}

impl ExecutionResult {
    /// Whether the script ran to completion and exited 0.
    pub fn success(&self) -> bool {
        self.termination_reason == TerminationReason::Completed && self.exit_code == Some(0)
    }

    /// Elapsed execution time.
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    /// User-facing error line for this result, if there is one.
    ///
    /// For a completed run this is stderr, or a synthesized exit-code line
    /// when the script failed silently.
    pub fn error_message(&self) -> Option<String> {
        let detail = self.detail.as_deref().unwrap_or("unknown error");
        match self.termination_reason {
            TerminationReason::ScreenRejected => Some(match &self.matched_pattern {
                Some(pattern) => format!("Dangerous code detected: {}", pattern),
                None => detail.to_string(),
            }),
            TerminationReason::TimedOut => Some(format!(
                "Execution timeout: Script exceeded {} seconds",
                format_seconds(self.timeout_ms)
            )),
            TerminationReason::SpawnFailed => {
                Some(format!("Failed to start interpreter: {}", detail))
            }
            TerminationReason::InternalError => Some(format!("Execution error: {}", detail)),
            TerminationReason::Completed => {
                if !self.stderr.is_empty() {
                    Some(self.stderr.clone())
                } else {
                    match self.exit_code {
                        Some(0) => None,
                        Some(code) => Some(format!("Process exited with code {}", code)),
                        None => self.detail.clone(),
                    }
                }
            }
        }
    }
}

fn format_seconds(ms: u64) -> String {
    if ms % 1000 == 0 {
        (ms / 1000).to_string()
    } else {
        format!("{:.1}", ms as f64 / 1000.0)
    }
}

/// One message of a streaming run.
///
/// Serializes as a self-contained object tagged by `type`, so a consumer can
/// render each message without buffering the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionUpdate {
    /// A line of output.
    Output(ExecutionEvent),
    /// The terminal result; always the last message.
    Finished(ExecutionResult),
}

impl ExecutionUpdate {
    /// Whether this is the terminal message.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }
}

/// Accumulates events into per-stream text.
#[derive(Debug, Default)]
pub(crate) struct OutputCollector {
    stdout: String,
    stderr: String,
}

impl OutputCollector {
    pub(crate) fn push(&mut self, event: &ExecutionEvent) {
        match event.stream {
            StreamKind::Stdout => self.stdout.push_str(&event.text),
            StreamKind::Stderr => self.stderr.push_str(&event.text),
        }
    }

    pub(crate) fn into_parts(self) -> (String, String) {
        (self.stdout, self.stderr)
    }
}
