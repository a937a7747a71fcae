//! Bounded-time media download through an external tool.
//!
//! The [`DownloadExecutor`] appends `[url, output stem, format]` to the
//! configured command line, runs it with combined output redirected to the
//! attempt's download log, and kills it after [`DOWNLOAD_TIMEOUT`]. A missing
//! target-format file after a normal exit is reported, not treated as fatal:
//! the conversion fallback decides what happens next.

use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, error, instrument, warn};

use crate::error::AcquireError;
use crate::process::{ProcessOutcome, ProcessRunner, ProcessSpec};
use crate::scratch::AttemptScratch;
use crate::track::{RequesterInfo, video_link};

/// Wall-clock bound for one download run.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(90);

/// Download-tool log line carrying the canonical video id.
#[allow(clippy::expect_used)]
static VIDEO_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Video ID: ([\w-]{11})").expect("video id regex is valid") // Static pattern, safe to panic
});

/// Result of a download run that finished within its bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadReport {
    /// Exit code of the tool, `None` if it was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Whether the target-format artifact exists.
    pub output_present: bool,
}

/// Runs the configured download tool for one attempt.
#[derive(Debug, Clone)]
pub struct DownloadExecutor {
    runner: Arc<dyn ProcessRunner>,
    command: Vec<String>,
    timeout: Duration,
}

impl DownloadExecutor {
    /// Creates an executor for `command` with the default [`DOWNLOAD_TIMEOUT`].
    #[must_use]
    pub fn new(runner: Arc<dyn ProcessRunner>, command: Vec<String>) -> Self {
        Self {
            runner,
            command,
            timeout: DOWNLOAD_TIMEOUT,
        }
    }

    /// Overrides the wall-clock bound.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configured wall-clock bound.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Downloads `url` into `scratch`.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::DownloadSpawn`] if the tool cannot be started and
    /// [`AcquireError::DownloadTimeout`] if it had to be killed.
    #[instrument(skip(self, scratch, requester), fields(attempt = %scratch.id(), requester = %requester))]
    pub async fn download(
        &self,
        url: &str,
        scratch: &AttemptScratch,
        requester: &RequesterInfo,
    ) -> Result<DownloadReport, AcquireError> {
        let raw_path = scratch.raw_path();
        let spec = ProcessSpec::from_command_line(
            &self.command,
            [
                url.to_string(),
                raw_path.to_string_lossy().into_owned(),
                scratch.format().to_string(),
            ],
            scratch.download_log_path(),
            self.timeout,
        )
        .ok_or_else(|| AcquireError::DownloadSpawn {
            program: String::new(),
            url: url.to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "download command is empty",
            ),
        })?;

        debug!(command = %spec.display_command(), "Starting download");
        let outcome = self
            .runner
            .run(&spec)
            .await
            .map_err(|source| AcquireError::DownloadSpawn {
                program: spec.program.clone(),
                url: url.to_string(),
                source,
            })?;

        let exit_code = match outcome {
            ProcessOutcome::TimedOut => {
                error!(
                    url,
                    timeout_secs = self.timeout.as_secs(),
                    "Forcibly destroyed the download process"
                );
                return Err(AcquireError::DownloadTimeout {
                    url: url.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
            ProcessOutcome::Exited { code } => code,
        };
        if exit_code != Some(0) {
            warn!(url, exit_code = ?exit_code, "Download tool exited unsuccessfully");
        }

        let output_present = file_exists(&scratch.output_path()).await;
        debug!(exit_code = ?exit_code, output_present, "Download finished");
        Ok(DownloadReport {
            exit_code,
            output_present,
        })
    }
}

/// Scans a download log for the canonical video id.
///
/// When several lines match, the last one wins. A missing log yields `None`.
pub async fn recover_video_id(log_path: &Path) -> Option<String> {
    let bytes = tokio::fs::read(log_path).await.ok()?;
    let text = String::from_utf8_lossy(&bytes);
    text.lines()
        .filter_map(|line| VIDEO_ID_PATTERN.captures(line))
        .filter_map(|captures| captures.get(1).map(|m| m.as_str().to_string()))
        .last()
}

/// Canonical source URL recovered from a download log.
pub async fn recover_source_url(log_path: &Path) -> Option<String> {
    recover_video_id(log_path).await.map(|id| video_link(&id))
}

pub(crate) async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::scratch::ScratchArena;

    /// Runner that records specs and plays back a fixed outcome, optionally creating files.
    #[derive(Debug)]
    struct StubRunner {
        outcome: std::io::Result<ProcessOutcome>,
        create_output: bool,
        log_text: &'static str,
        specs: Mutex<Vec<ProcessSpec>>,
    }

    impl StubRunner {
        fn new(outcome: std::io::Result<ProcessOutcome>, create_output: bool) -> Self {
            Self {
                outcome,
                create_output,
                log_text: "",
                specs: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ProcessRunner for StubRunner {
        async fn run(&self, spec: &ProcessSpec) -> std::io::Result<ProcessOutcome> {
            self.specs.lock().unwrap().push(spec.clone());
            std::fs::write(&spec.log_path, self.log_text)?;
            if self.create_output {
                let stem = &spec.args[spec.args.len() - 2];
                let format = &spec.args[spec.args.len() - 1];
                std::fs::write(format!("{stem}.{format}"), b"audio")?;
            }
            match &self.outcome {
                Ok(outcome) => Ok(*outcome),
                Err(e) => Err(std::io::Error::new(e.kind(), e.to_string())),
            }
        }
    }

    fn command() -> Vec<String> {
        vec!["sh".to_string(), "yt.sh".to_string()]
    }

    #[tokio::test]
    async fn test_download_passes_url_stem_and_format() {
        let root = TempDir::new().unwrap();
        let scratch = ScratchArena::new(root.path()).allocate("t1", "m4a").await.unwrap();
        let runner = Arc::new(StubRunner::new(Ok(ProcessOutcome::Exited { code: Some(0) }), true));
        let executor = DownloadExecutor::new(runner.clone(), command());

        let report = executor
            .download("https://youtu.be/abc", &scratch, &RequesterInfo::default())
            .await
            .unwrap();

        assert!(report.output_present);
        assert_eq!(report.exit_code, Some(0));
        let specs = runner.specs.lock().unwrap();
        let spec = &specs[0];
        assert_eq!(spec.program, "sh");
        assert_eq!(
            spec.args,
            vec![
                "yt.sh".to_string(),
                "https://youtu.be/abc".to_string(),
                scratch.raw_path().to_string_lossy().into_owned(),
                "m4a".to_string(),
            ]
        );
        assert_eq!(spec.log_path, scratch.download_log_path());
        assert_eq!(spec.timeout, DOWNLOAD_TIMEOUT);
    }

    #[tokio::test]
    async fn test_missing_output_is_reported_not_fatal() {
        let root = TempDir::new().unwrap();
        let scratch = ScratchArena::new(root.path()).allocate("t1", "m4a").await.unwrap();
        let runner = Arc::new(StubRunner::new(Ok(ProcessOutcome::Exited { code: Some(1) }), false));
        let executor = DownloadExecutor::new(runner, command());

        let report = executor
            .download("https://youtu.be/abc", &scratch, &RequesterInfo::default())
            .await
            .unwrap();
        assert!(!report.output_present);
        assert_eq!(report.exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_timeout_is_an_error() {
        let root = TempDir::new().unwrap();
        let scratch = ScratchArena::new(root.path()).allocate("t1", "m4a").await.unwrap();
        let runner = Arc::new(StubRunner::new(Ok(ProcessOutcome::TimedOut), false));
        let executor = DownloadExecutor::new(runner, command());

        let err = executor
            .download("https://youtu.be/abc", &scratch, &RequesterInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AcquireError::DownloadTimeout { ref url, timeout_secs: 90 } if url == "https://youtu.be/abc"
        ));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_an_error() {
        let root = TempDir::new().unwrap();
        let scratch = ScratchArena::new(root.path()).allocate("t1", "m4a").await.unwrap();
        let runner = Arc::new(StubRunner::new(
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no such file")),
            false,
        ));
        let executor = DownloadExecutor::new(runner, command());

        let err = executor
            .download("https://youtu.be/abc", &scratch, &RequesterInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AcquireError::DownloadSpawn { .. }));
    }

    #[tokio::test]
    async fn test_empty_command_is_spawn_error() {
        let root = TempDir::new().unwrap();
        let scratch = ScratchArena::new(root.path()).allocate("t1", "m4a").await.unwrap();
        let runner = Arc::new(StubRunner::new(Ok(ProcessOutcome::Exited { code: Some(0) }), true));
        let executor = DownloadExecutor::new(runner.clone(), Vec::new());

        let err = executor
            .download("https://youtu.be/abc", &scratch, &RequesterInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AcquireError::DownloadSpawn { .. }));
        assert!(runner.specs.lock().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_real_subprocess_killed_after_bound() {
        let root = TempDir::new().unwrap();
        let scratch = ScratchArena::new(root.path()).allocate("t1", "m4a").await.unwrap();
        let script = root.path().join("slow.sh");
        std::fs::write(&script, "exec sleep 30\n").unwrap();

        let executor = DownloadExecutor::new(
            Arc::new(crate::process::TokioProcessRunner),
            vec!["sh".to_string(), script.to_string_lossy().into_owned()],
        )
        .with_timeout(Duration::from_millis(300));

        let started = std::time::Instant::now();
        let err = executor
            .download("https://youtu.be/abc", &scratch, &RequesterInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AcquireError::DownloadTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_recover_video_id_last_match_wins() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("dl.log");
        std::fs::write(
            &log,
            "[youtube] Extracting URL\nVideo ID: aaaaaaaaaaa\nnoise\nVideo ID: bbbbbbbb-_b\n",
        )
        .unwrap();

        assert_eq!(recover_video_id(&log).await.as_deref(), Some("bbbbbbbb-_b"));
        assert_eq!(
            recover_source_url(&log).await.as_deref(),
            Some("https://youtu.be/bbbbbbbb-_b")
        );
    }

    #[tokio::test]
    async fn test_recover_video_id_absent() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("dl.log");
        std::fs::write(&log, "Video ID: short\n").unwrap();
        assert!(recover_video_id(&log).await.is_none());
        assert!(recover_video_id(&dir.path().join("missing.log")).await.is_none());
    }
}
