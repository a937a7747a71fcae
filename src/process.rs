//! Bounded-time execution of external tools.
//!
//! [`ProcessRunner`] is the seam between the pipeline and real executables:
//! production code uses [`TokioProcessRunner`], tests substitute doubles that
//! simulate normal exit, timeout or a crash without spawning anything.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// A single invocation of an external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Executable to run.
    pub program: String,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// File receiving combined stdout and stderr.
    pub log_path: PathBuf,
    /// Wall-clock bound after which the process is killed.
    pub timeout: Duration,
}

impl ProcessSpec {
    /// Builds a spec from a command line whose first element is the program.
    ///
    /// Returns `None` for an empty command line.
    #[must_use]
    pub fn from_command_line(
        command_line: &[String],
        extra_args: impl IntoIterator<Item = String>,
        log_path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Option<Self> {
        let (program, base_args) = command_line.split_first()?;
        Some(Self {
            program: program.clone(),
            args: base_args.iter().cloned().chain(extra_args).collect(),
            log_path: log_path.into(),
            timeout,
        })
    }

    /// Human-readable command line for logs.
    #[must_use]
    pub fn display_command(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How a bounded process run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The process exited on its own; `code` is `None` when killed by a signal.
    Exited {
        /// Exit code, if any.
        code: Option<i32>,
    },
    /// The bound elapsed and the process was forcibly terminated.
    TimedOut,
}

impl ProcessOutcome {
    /// Returns true for a zero exit code.
    #[must_use]
    pub fn success(self) -> bool {
        matches!(self, Self::Exited { code: Some(0) })
    }
}

/// Runs external processes with a wall-clock bound.
#[async_trait]
pub trait ProcessRunner: Send + Sync + std::fmt::Debug {
    /// Runs `spec` to completion or until its timeout.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the log file cannot be created or the process
    /// cannot be started.
    async fn run(&self, spec: &ProcessSpec) -> std::io::Result<ProcessOutcome>;
}

/// [`ProcessRunner`] that spawns real child processes via Tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    #[instrument(skip(self, spec), fields(program = %spec.program, timeout_secs = spec.timeout.as_secs()))]
    async fn run(&self, spec: &ProcessSpec) -> std::io::Result<ProcessOutcome> {
        let log = tokio::fs::File::create(&spec.log_path)
            .await?
            .into_std()
            .await;
        let log_err = log.try_clone()?;

        debug!(command = %spec.display_command(), "Spawning process");
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(true);
        // Own process group, so a timeout reaches tools launched by wrapper scripts.
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command.spawn()?;
        let group = ProcessGroupGuard::new(child.id());

        match tokio::time::timeout(spec.timeout, child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!(code = ?status.code(), "Process exited");
                Ok(ProcessOutcome::Exited {
                    code: status.code(),
                })
            }
            Err(_) => {
                group.kill();
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed-out process");
                }
                Ok(ProcessOutcome::TimedOut)
            }
        }
    }
}

/// Kills every process left in a child's process group when dropped.
///
/// Covers the timeout path, cancellation of the running future, and
/// background helpers that outlive a tool that exited on its own.
#[derive(Debug)]
struct ProcessGroupGuard {
    #[cfg_attr(not(unix), allow(dead_code))]
    pgid: Option<i32>,
}

impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pgid: pid.and_then(|pid| i32::try_from(pid).ok()).filter(|pid| *pid > 0),
        }
    }

    #[cfg(not(unix))]
    fn kill(&self) {}

    #[cfg(unix)]
    fn kill(&self) {
        let Some(pgid) = self.pgid else {
            return;
        };
        // SAFETY: signals a process group this runner created; no memory is shared.
        let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                warn!(pgid, error = %err, "Failed to kill process group");
            }
        }
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}
