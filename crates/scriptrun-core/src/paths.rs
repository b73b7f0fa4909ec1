//! Path resolution utilities.

use crate::error::ConfigError;
use std::path::PathBuf;

/// Get the scriptrun base directory (~/.scriptrun).
pub fn base_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or_else(|| {
        ConfigError::Validation("Could not determine home directory".to_string())
    })?;
    Ok(home.join(".scriptrun"))
}

/// Get the main config file path (~/.scriptrun/scriptrun.json5).
pub fn config_file() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("scriptrun.json5"))
}

/// Get the default uploads directory (~/.scriptrun/uploads).
pub fn uploads_dir() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("uploads"))
}

/// Ensure all required directories exist.
pub fn ensure_dirs() -> Result<(), ConfigError> {
    let dirs = [base_dir()?, uploads_dir()?];

    for dir in dirs {
        std::fs::create_dir_all(&dir)?;
    }

    Ok(())
}

/// Expand tilde (~) in a path.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
