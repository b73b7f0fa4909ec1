//! Supervised script execution for scriptrun.
//!
//! A job flows one way through this crate:
//!
//! - the risk screen (from `scriptrun-core`) rejects denylisted scripts before any process exists
//! - [`ProcessSupervisor`] spawns the interpreter in a job-scoped directory and enforces the deadline
//! - [`StreamMultiplexer`] merges stdout and stderr into one sequence-numbered event stream
//! - [`ExecutionSupervisor`] drives the above and reports an [`ExecutionResult`],
//!   either once or after a live sequence of [`ExecutionEvent`]s
//!
//! The job's script file is removed exactly once on every path.

pub mod error;
pub mod executor;
pub mod job;
pub mod multiplex;
pub mod output;
pub mod process;

#[cfg(test)]
mod testing;

pub use error::SandboxError;
pub use executor::ExecutionSupervisor;
pub use job::{CleanupOutcome, JobId, ScriptJob};
pub use multiplex::{Polled, StreamMultiplexer};
pub use output::{ExecutionEvent, ExecutionResult, ExecutionUpdate, StreamKind, TerminationReason};
pub use process::{Completion, ProcessHandle, ProcessSupervisor, SpawnSpec};

/// Result type for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;
