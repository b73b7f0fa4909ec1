//! Script jobs and ownership of their backing files.

use crate::error::SandboxError;
use crate::Result;
use scriptrun_core::config::UploadsConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Unique identifier of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Result of removing a job's script file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The file was removed.
    Removed,
    /// The file was already gone.
    AlreadyGone,
    /// Removal failed; the message is the OS error.
    Failed(String),
}

impl CleanupOutcome {
    /// Error text worth reporting, if any.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed(msg) => Some(msg),
            _ => None,
        }
    }
}

/// One request to execute a single script file.
///
/// The job exclusively owns the file at `path` until [`cleanup`](Self::cleanup)
/// runs. Cleanup happens at most once; dropping a job that was never cleaned
/// up performs it.
#[derive(Debug)]
pub struct ScriptJob {
    id: JobId,
    path: PathBuf,
    timeout: Option<Duration>,
    cleanup: Option<CleanupOutcome>,
}

impl ScriptJob {
    /// Adopt an already-saved script file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            id: JobId::new(),
            path: path.into(),
            timeout: None,
            cleanup: None,
        }
    }

    /// Override the supervisor's default timeout for this job.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Save script contents under a unique name in the uploads directory.
    ///
    /// `original_name` is the caller-facing file name; only its final
    /// component is kept, and its extension must be allowed.
    pub async fn stage(
        uploads: &UploadsConfig,
        original_name: &str,
        contents: &[u8],
    ) -> Result<Self> {
        let name = sanitize_file_name(original_name)
            .ok_or_else(|| SandboxError::staging("No file selected"))?;

        if !has_allowed_extension(&name, &uploads.allowed_extensions) {
            let allowed = uploads
                .allowed_extensions
                .iter()
                .map(|ext| format!(".{}", ext))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(SandboxError::staging(format!(
                "Only {} files are allowed",
                allowed
            )));
        }

        if contents.len() > uploads.max_bytes {
            return Err(SandboxError::staging(format!(
                "File too large: {} bytes (maximum: {})",
                contents.len(),
                uploads.max_bytes
            )));
        }

        tokio::fs::create_dir_all(&uploads.dir).await?;

        let token = Uuid::new_v4().simple().to_string();
        let path = uploads.dir.join(format!("{}_{}", &token[..16], name));

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        let job = Self::new(&path);
        file.write_all(contents).await?;
        file.flush().await?;

        debug!(job_id = %job.id, path = %path.display(), "Staged script");
        Ok(job)
    }

    /// Job identifier.
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Location of the script file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Per-job timeout override.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether cleanup has already run.
    pub fn is_cleaned_up(&self) -> bool {
        self.cleanup.is_some()
    }

    /// Remove the script file. Later calls return the first outcome and
    /// leave the filesystem alone.
    pub fn cleanup(&mut self) -> &CleanupOutcome {
        if self.cleanup.is_none() {
            let outcome = match std::fs::remove_file(&self.path) {
                Ok(()) => CleanupOutcome::Removed,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    warn!(job_id = %self.id, path = %self.path.display(), "Script already removed");
                    CleanupOutcome::AlreadyGone
                }
                Err(e) => {
                    warn!(job_id = %self.id, path = %self.path.display(), error = %e, "Failed to remove script");
                    CleanupOutcome::Failed(e.to_string())
                }
            };
            self.cleanup = Some(outcome);
        }
        self.cleanup.get_or_insert(CleanupOutcome::AlreadyGone)
    }
}

impl Drop for ScriptJob {
    fn drop(&mut self) {
        if !self.is_cleaned_up() {
            debug!(job_id = %self.id, "Job dropped before cleanup");
            self.cleanup();
        }
    }
}

/// Keep only the final path component and replace characters outside a
/// conservative set.
fn sanitize_file_name(name: &str) -> Option<String> {
    let base = Path::new(name.trim()).file_name()?.to_str()?;
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn has_allowed_extension(name: &str, allowed: &[String]) -> bool {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)),
        _ => false,
    }
}
