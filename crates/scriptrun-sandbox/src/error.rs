//! Sandbox error types.

use std::io;
use thiserror::Error;

/// Errors that can occur while preparing or supervising a job.
///
/// The execution supervisor never surfaces these to its caller directly; it
/// folds them into the `termination_reason` of an `ExecutionResult`.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Script could not be staged for execution.
    #[error("Staging failed: {0}")]
    Staging(String),

    /// Interpreter could not be started.
    #[error("Failed to spawn interpreter: {0}")]
    SpawnFailed(String),

    /// Waiting on or terminating the child failed.
    #[error("Process supervision failed: {0}")]
    ExecutionFailed(String),

    /// An output reader failed mid-stream.
    #[error("Failed to read {stream} output: {message}")]
    Reader { stream: String, message: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] scriptrun_core::ConfigError),
}

impl SandboxError {
    /// Create a new staging error.
    pub fn staging(msg: impl Into<String>) -> Self {
        Self::Staging(msg.into())
    }

    /// Create a new spawn failure.
    pub fn spawn_failed(msg: impl Into<String>) -> Self {
        Self::SpawnFailed(msg.into())
    }

    /// Create a new execution failed error.
    pub fn execution_failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Whether the interpreter never started.
    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, Self::SpawnFailed(_))
    }
}
