//! Child process lifecycle: spawn, deadline tracking, forced kill, and reap.

use crate::error::SandboxError;
use crate::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

/// What to run for one job.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    /// Interpreter executable.
    pub program: String,

    /// Arguments placed before the script path.
    pub args: Vec<String>,

    /// Script path passed as the final argument.
    pub script: PathBuf,

    /// Working directory of the child.
    pub cwd: PathBuf,

    /// Complete child environment; nothing else is inherited.
    pub env: HashMap<String, String>,
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The child exited on its own.
    Exited {
        /// Exit code, absent when a signal ended the process.
        code: Option<i32>,
        /// Signal that ended the process (Unix).
        signal: Option<i32>,
    },
    /// The supervisor killed the child at its deadline.
    Killed,
}

impl Completion {
    fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self::Exited {
            code: status.code(),
            signal,
        }
    }
}

/// A spawned child and its deadline.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
    started_at: Instant,
    deadline: Instant,
    status: Option<ExitStatus>,
}

impl ProcessHandle {
    /// OS process ID.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Spawn time.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Whether the deadline has passed.
    pub fn deadline_elapsed(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Take the stdout pipe.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take the stderr pipe.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Check for exit without blocking. The status is cached once observed.
    pub fn try_exited(&mut self) -> Result<Option<ExitStatus>> {
        if self.status.is_none() {
            self.status = self.child.try_wait().map_err(|e| {
                SandboxError::execution_failed(format!("Failed to poll child: {}", e))
            })?;
        }
        Ok(self.status)
    }

    /// Send SIGKILL to every process left in the child's group.
    ///
    /// Applies whether or not the child itself has exited, so anything it
    /// put in the background stops with the job.
    pub fn kill_group(&self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            // ESRCH when the group is already empty
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                trace!(pid, error = %e, "Process group not signalled");
            }
        }
    }

    /// Send SIGKILL to the child's process group, then to the child itself.
    fn signal_kill(&mut self) -> std::io::Result<()> {
        if self.status.is_some() {
            return Ok(());
        }

        self.kill_group();

        match self.child.start_kill() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Spawns children and enforces their deadlines.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    reap_timeout: Duration,
}

impl ProcessSupervisor {
    /// Create a supervisor whose post-kill reap waits at most `reap_timeout`.
    pub fn new(reap_timeout: Duration) -> Self {
        Self { reap_timeout }
    }

    /// Spawn the interpreter with both output streams piped.
    ///
    /// The deadline is spawn time plus `timeout`.
    pub fn spawn(&self, spec: &SpawnSpec, timeout: Duration) -> Result<ProcessHandle> {
        debug!(program = %spec.program, script = %spec.script.display(), "Spawning interpreter");

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .arg(&spec.script)
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .envs(&spec.env)
            .kill_on_drop(true);

        // Own process group so a kill reaches anything the script forks
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd
            .spawn()
            .map_err(|e| SandboxError::spawn_failed(format!("{}: {}", spec.program, e)))?;

        let started_at = Instant::now();
        let pid = child.id();
        debug!(pid = ?pid, timeout_ms = timeout.as_millis() as u64, "Interpreter started");

        Ok(ProcessHandle {
            child,
            pid,
            started_at,
            deadline: started_at + timeout,
            status: None,
        })
    }

    /// Wait for the child to exit, killing it if the deadline passes first.
    pub async fn await_completion(&self, handle: &mut ProcessHandle) -> Result<Completion> {
        if let Some(status) = handle.status {
            return Ok(Completion::from_status(status));
        }

        let deadline = tokio::time::Instant::from_std(handle.deadline);
        let waited = tokio::select! {
            status = handle.child.wait() => Some(status),
            _ = tokio::time::sleep_until(deadline) => None,
        };

        match waited {
            Some(Ok(status)) => {
                handle.status = Some(status);
                Ok(Completion::from_status(status))
            }
            Some(Err(e)) => Err(SandboxError::execution_failed(format!(
                "Failed to wait for child: {}",
                e
            ))),
            None => self.terminate(handle).await,
        }
    }

    /// Kill the child without grace period and reap it.
    pub async fn terminate(&self, handle: &mut ProcessHandle) -> Result<Completion> {
        if let Some(status) = handle.status {
            return Ok(Completion::from_status(status));
        }

        warn!(pid = ?handle.pid, "Killing child");
        handle.signal_kill().map_err(|e| {
            SandboxError::execution_failed(format!("Failed to kill child: {}", e))
        })?;

        self.reap(handle).await?;
        Ok(Completion::Killed)
    }

    /// Bounded wait that releases the child's process-table entry.
    ///
    /// Returns `None` if the child did not exit within the reap bound.
    pub async fn reap(&self, handle: &mut ProcessHandle) -> Result<Option<ExitStatus>> {
        if handle.status.is_some() {
            return Ok(handle.status);
        }

        match timeout(self.reap_timeout, handle.child.wait()).await {
            Ok(Ok(status)) => {
                handle.status = Some(status);
                Ok(Some(status))
            }
            Ok(Err(e)) => Err(SandboxError::execution_failed(format!(
                "Failed to reap child: {}",
                e
            ))),
            Err(_) => {
                warn!(pid = ?handle.pid, "Child not reaped within bound");
                Ok(None)
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn sh_spec(dir: &std::path::Path, script: &str) -> SpawnSpec {
        let path = dir.join("job.sh");
        std::fs::write(&path, script).unwrap();
        SpawnSpec {
            program: "/bin/sh".to_string(),
            args: Vec::new(),
            script: path,
            cwd: dir.to_path_buf(),
            env: std::env::vars().collect(),
        }
    }

    #[tokio::test]
    async fn test_exit_code_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let supervisor = ProcessSupervisor::new(Duration::from_secs(1));
        let mut handle = supervisor
            .spawn(&sh_spec(dir.path(), "exit 3\n"), Duration::from_secs(5))
            .unwrap();

        let completion = supervisor.await_completion(&mut handle).await.unwrap();
        assert!(matches!(completion, Completion::Exited { code: Some(3), .. }));
    }

    #[tokio::test]
    async fn test_deadline_kills_child() {
        let dir = tempfile::TempDir::new().unwrap();
        let supervisor = ProcessSupervisor::new(Duration::from_secs(1));
        let mut handle = supervisor
            .spawn(&sh_spec(dir.path(), "sleep 5\n"), Duration::from_millis(200))
            .unwrap();

        let start = Instant::now();
        let completion = supervisor.await_completion(&mut handle).await.unwrap();
        assert_eq!(completion, Completion::Killed);
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_kill_reaches_process_group() {
        let dir = tempfile::TempDir::new().unwrap();
        let supervisor = ProcessSupervisor::new(Duration::from_secs(1));
        // The sleep inherits stdout; the pipe only closes if it dies too
        let mut handle = supervisor
            .spawn(&sh_spec(dir.path(), "sleep 5\n"), Duration::from_millis(200))
            .unwrap();
        let mut stdout = handle.take_stdout().unwrap();

        supervisor.await_completion(&mut handle).await.unwrap();

        let mut buf = Vec::new();
        let read = timeout(Duration::from_secs(2), stdout.read_to_end(&mut buf)).await;
        assert!(read.is_ok(), "stdout stayed open after kill");
    }

    #[tokio::test]
    async fn test_kill_group_after_exit_stops_background_work() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("late");
        let script = format!(
            "(sleep 1; touch {}) >/dev/null 2>&1 &\nexit 0\n",
            marker.display()
        );
        let supervisor = ProcessSupervisor::new(Duration::from_secs(1));
        let mut handle = supervisor
            .spawn(&sh_spec(dir.path(), &script), Duration::from_secs(5))
            .unwrap();

        let completion = supervisor.await_completion(&mut handle).await.unwrap();
        assert!(matches!(completion, Completion::Exited { code: Some(0), .. }));

        handle.kill_group();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists(), "background job outlived its group kill");
    }

    #[tokio::test]
    async fn test_runs_in_given_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let supervisor = ProcessSupervisor::new(Duration::from_secs(1));
        let mut handle = supervisor
            .spawn(&sh_spec(dir.path(), "pwd\n"), Duration::from_secs(5))
            .unwrap();
        let mut stdout = handle.take_stdout().unwrap();

        let mut out = String::new();
        stdout.read_to_string(&mut out).await.unwrap();
        supervisor.await_completion(&mut handle).await.unwrap();

        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(std::path::Path::new(out.trim()).canonicalize().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_missing_interpreter_fails_to_spawn() {
        let dir = tempfile::TempDir::new().unwrap();
        let supervisor = ProcessSupervisor::new(Duration::from_secs(1));
        let mut spec = sh_spec(dir.path(), "true\n");
        spec.program = "/nonexistent/python3".to_string();

        let err = supervisor.spawn(&spec, Duration::from_secs(1)).unwrap_err();
        assert!(err.is_spawn_failure());
        assert!(err.to_string().contains("/nonexistent/python3"));
    }
}
