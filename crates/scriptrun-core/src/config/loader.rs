//! Configuration loading and persistence.

use super::SupervisorConfig;
use crate::error::ConfigError;
use crate::paths;
use std::fs;
use std::path::{Component, Path};

/// Environment variable overriding `execution.timeout_secs`.
pub const ENV_TIMEOUT_SECS: &str = "SCRIPTRUN_TIMEOUT_SECS";

/// Environment variable overriding `execution.interpreter`.
pub const ENV_INTERPRETER: &str = "SCRIPTRUN_INTERPRETER";

/// Environment variable overriding `uploads.dir`.
pub const ENV_UPLOADS_DIR: &str = "SCRIPTRUN_UPLOADS_DIR";

impl SupervisorConfig {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = paths::config_file()?;
        Self::load(&path)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Save configuration to the default path.
    pub fn save_default(&self) -> Result<(), ConfigError> {
        let path = paths::config_file()?;
        self.save(&path)
    }

    /// Save configuration to a file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Serialize to JSON5 string.
    pub fn to_json5(&self) -> Result<String, ConfigError> {
        // json5 has no serializer; plain JSON is valid JSON5
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        let exec = &self.execution;

        // 1. Interpreter
        if exec.interpreter.trim().is_empty() {
            errors.push("Interpreter must not be empty".to_string());
        }

        // 2. Timing
        if exec.timeout_secs == 0 {
            errors.push("Execution timeout must be greater than 0".to_string());
        }
        if exec.reap_timeout_ms == 0 {
            errors.push("Reap timeout must be greater than 0".to_string());
        }
        if exec.poll_interval_ms == 0 {
            errors.push("Poll interval must be greater than 0".to_string());
        } else if exec.timeout_secs > 0 && exec.poll_interval() >= exec.timeout() {
            errors.push(format!(
                "Poll interval ({} ms) must be shorter than the timeout ({} s)",
                exec.poll_interval_ms, exec.timeout_secs
            ));
        }

        // 3. Script copy must stay inside the job directory
        let name = Path::new(&exec.script_file_name);
        let mut components = name.components();
        let is_bare = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !is_bare {
            errors.push(format!(
                "Script file name '{}' must be a bare file name",
                exec.script_file_name
            ));
        }

        // 4. Output cap
        if exec.max_output_bytes == 0 {
            errors.push("Maximum output size must be greater than 0".to_string());
        }

        // 5. Denylist entries
        for (i, pattern) in self.screen.denylist.iter().enumerate() {
            if pattern.is_empty() {
                errors.push(format!("Denylist entry [{}] must not be empty", i));
            }
        }

        // 6. Uploads
        if self.uploads.allowed_extensions.is_empty() {
            errors.push("At least one allowed extension is required".to_string());
        }
        if self.uploads.max_bytes == 0 {
            errors.push("Upload size limit must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }

    /// Load configuration from the default path, falling back to defaults if no file exists.
    ///
    /// Environment overrides are applied in both cases.
    pub fn load_or_default() -> Self {
        let mut config = match Self::load_default() {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => Self::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load config, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        config
    }

    /// Apply `SCRIPTRUN_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS).and_then(|v| v.trim().parse().ok()) {
            self.execution.timeout_secs = secs;
        }
        if let Some(interpreter) = lookup(ENV_INTERPRETER).filter(|v| !v.is_empty()) {
            self.execution.interpreter = interpreter;
        }
        if let Some(dir) = lookup(ENV_UPLOADS_DIR).filter(|v| !v.is_empty()) {
            self.uploads.dir = paths::expand_tilde(&dir);
        }
    }
}
