//! # scriptrun-core
//!
//! Core configuration and safety utilities for scriptrun.
//!
//! This crate provides the pieces shared by the sandbox and the CLI:
//!
//! - **Configuration**: Loading, validation, and persistence of the supervisor config
//! - **Safety**: The lexical pre-execution risk screen
//! - **Paths**: Resolution of the config file and uploads directory

pub mod config;
pub mod error;
pub mod paths;
pub mod safety;

// Re-exports for convenience
pub use config::SupervisorConfig;
pub use error::{ConfigError, Error, Result};
pub use safety::{RiskVerdict, Screener};
