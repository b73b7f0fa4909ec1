//! Shared fixtures for the integration tests.

use scriptrun_core::SupervisorConfig;
use std::path::Path;

/// Configuration that runs scripts with `/bin/sh` and stages them under `uploads`.
pub fn sh_config(uploads: &Path) -> SupervisorConfig {
    let mut config = SupervisorConfig::default();
    config.execution.interpreter = "/bin/sh".to_string();
    config.execution.script_file_name = "script.sh".to_string();
    config.uploads.dir = uploads.to_path_buf();
    config.uploads.allowed_extensions = vec!["sh".to_string()];
    config
}

/// Number of entries currently in `dir`.
pub fn entry_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}
