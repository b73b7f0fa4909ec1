//! Configuration schema definitions.

use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

/// Main scriptrun configuration.
///
/// Passed by value into the execution supervisor so that several supervisors
/// with different policies can coexist in one process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Child process settings.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Pre-execution risk screen.
    #[serde(default)]
    pub screen: ScreenConfig,

    /// Script staging.
    #[serde(default)]
    pub uploads: UploadsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Child process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Interpreter executable spawned for every job.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Extra arguments placed before the script path.
    #[serde(default)]
    pub interpreter_args: Vec<String>,

    /// Wall-clock timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Bounded wait for reaping the child after exit or kill, in milliseconds.
    #[serde(default = "default_reap_timeout_ms")]
    pub reap_timeout_ms: u64,

    /// Poll timeout of the output multiplexer, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// File name of the script copy inside the job directory.
    #[serde(default = "default_script_file_name")]
    pub script_file_name: String,

    /// Maximum bytes captured per output stream.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Environment passed to the interpreter.
    #[serde(default)]
    pub environment: EnvironmentRules,
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_reap_timeout_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_script_file_name() -> String {
    "script.py".to_string()
}

fn default_max_output_bytes() -> usize {
    10 * 1024 * 1024 // 10 MB
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            interpreter_args: Vec::new(),
            timeout_secs: default_timeout_secs(),
            reap_timeout_ms: default_reap_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            script_file_name: default_script_file_name(),
            max_output_bytes: default_max_output_bytes(),
            environment: EnvironmentRules::default(),
        }
    }
}

impl ExecutionConfig {
    /// Default wall-clock timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Bound on the final wait for process reap.
    pub fn reap_timeout(&self) -> Duration {
        Duration::from_millis(self.reap_timeout_ms)
    }

    /// Poll timeout of the output multiplexer.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Environment variable rules for the child process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentRules {
    /// Inherit the supervisor's environment.
    #[serde(default)]
    pub inherit: bool,

    /// Allowed environment variables (if not inheriting).
    #[serde(default)]
    pub allowed: HashSet<String>,

    /// Blocked environment variables.
    #[serde(default)]
    pub blocked: HashSet<String>,

    /// Environment variables to set.
    #[serde(default)]
    pub set: HashMap<String, String>,
}

impl Default for EnvironmentRules {
    fn default() -> Self {
        let mut set = HashMap::new();
        set.insert("PYTHONDONTWRITEBYTECODE".to_string(), "1".to_string());
        set.insert("PYTHONUNBUFFERED".to_string(), "1".to_string());

        Self {
            inherit: true,
            allowed: HashSet::new(),
            blocked: Self::default_blocked(),
            set,
        }
    }
}

impl EnvironmentRules {
    /// Get default blocked environment variables.
    pub fn default_blocked() -> HashSet<String> {
        [
            // Dynamic linker injection
            "LD_PRELOAD",
            "LD_LIBRARY_PATH",
            "LD_AUDIT",
            "DYLD_INSERT_LIBRARIES",
            "DYLD_LIBRARY_PATH",
            // Interpreter injection
            "PYTHONSTARTUP",
            "PYTHONPATH",
            "PYTHONHOME",
            "PYTHONINSPECT",
            "BASH_ENV",
            "ENV",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// Resolve the child environment from a parent environment.
    pub fn apply<I>(&self, parent: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut env: HashMap<String, String> = parent
            .into_iter()
            .filter(|(key, _)| self.inherit || self.allowed.contains(key))
            .collect();

        for (key, value) in &self.set {
            env.insert(key.clone(), value.clone());
        }

        // Blocked wins over both inheritance and explicit settings
        env.retain(|key, _| !self.blocked.contains(key));
        env
    }
}

/// Pre-execution screen settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenConfig {
    /// Whether the screen runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Ordered list of disallowed substrings, matched case-insensitively.
    /// The first entry that occurs anywhere in the script wins.
    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Default denylist, in reporting order.
pub const DEFAULT_DENYLIST: &[&str] = &[
    // Module imports
    "import os",
    "from os",
    "import subprocess",
    "from subprocess",
    "import sys",
    "import shutil",
    "from shutil",
    "import socket",
    "from socket",
    "import requests",
    "import urllib",
    "from urllib",
    // Process, code evaluation, and file access calls
    "os.system",
    "subprocess",
    "eval(",
    "exec(",
    "compile(",
    "__import__",
    "open(",
    "file(",
    "input(",
    "raw_input(",
    "execfile(",
    "reload(",
    // Shell fragments
    "rm -",
    "sudo ",
    "curl ",
    "wget ",
];

fn default_denylist() -> Vec<String> {
    DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect()
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            denylist: default_denylist(),
        }
    }
}

/// Script staging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    /// Directory that holds staged scripts until their job finishes.
    #[serde(default = "default_uploads_dir")]
    pub dir: PathBuf,

    /// Maximum script size in bytes.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Accepted file extensions, without the dot.
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

fn default_uploads_dir() -> PathBuf {
    paths::uploads_dir().unwrap_or_else(|_| PathBuf::from("uploads"))
}

fn default_max_bytes() -> usize {
    5 * 1024 * 1024 // 5 MB
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["py".to_string()]
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: default_uploads_dir(),
            max_bytes: default_max_bytes(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}
