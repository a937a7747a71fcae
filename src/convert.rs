//! Conversion of raw downloads into the target audio format.

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, instrument};

use crate::download::file_exists;
use crate::error::AcquireError;
use crate::process::{ProcessOutcome, ProcessRunner, ProcessSpec};
use crate::scratch::AttemptScratch;
use crate::track::RequesterInfo;

/// Default wall-clock bound for one transcoder run.
pub const CONVERSION_TIMEOUT: Duration = Duration::from_secs(120);

/// External audio transcoder.
#[async_trait]
pub trait Transcoder: Send + Sync + Debug {
    /// Whether the transcoder is installed.
    fn is_available(&self) -> bool;

    /// Converts `input` into `output`, writing diagnostics to `log_path`.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the transcoder cannot be started.
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        log_path: &Path,
    ) -> std::io::Result<ProcessOutcome>;
}

/// `ffmpeg`, located on `PATH` at construction time.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    runner: Arc<dyn ProcessRunner>,
    program: Option<PathBuf>,
    timeout: Duration,
}

impl FfmpegTranscoder {
    /// Looks up `ffmpeg` on `PATH`.
    #[must_use]
    pub fn detect(runner: Arc<dyn ProcessRunner>) -> Self {
        let program = which::which("ffmpeg").ok();
        match &program {
            Some(path) => debug!(path = %path.display(), "Found ffmpeg"),
            None => debug!("ffmpeg not found on PATH"),
        }
        Self {
            runner,
            program,
            timeout: CONVERSION_TIMEOUT,
        }
    }

    /// Uses an explicit executable, or none at all.
    #[must_use]
    pub fn with_program(runner: Arc<dyn ProcessRunner>, program: Option<PathBuf>) -> Self {
        Self {
            runner,
            program,
            timeout: CONVERSION_TIMEOUT,
        }
    }

    /// Overrides the wall-clock bound.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn is_available(&self) -> bool {
        self.program.is_some()
    }

    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        log_path: &Path,
    ) -> std::io::Result<ProcessOutcome> {
        let Some(program) = &self.program else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "ffmpeg is not installed",
            ));
        };
        let spec = ProcessSpec {
            program: program.to_string_lossy().into_owned(),
            args: vec![
                "-hide_banner".to_string(),
                "-y".to_string(),
                "-i".to_string(),
                input.to_string_lossy().into_owned(),
                output.to_string_lossy().into_owned(),
            ],
            log_path: log_path.to_path_buf(),
            timeout: self.timeout,
        };
        self.runner.run(&spec).await
    }
}

/// Produces the target-format artifact when the download tool did not.
#[derive(Debug, Clone)]
pub struct ConversionFallback {
    transcoder: Arc<dyn Transcoder>,
}

impl ConversionFallback {
    /// Creates a fallback over `transcoder`.
    #[must_use]
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self { transcoder }
    }

    /// Returns the path of the target-format artifact, converting the raw
    /// download first if needed.
    ///
    /// # Errors
    ///
    /// - [`AcquireError::RawArtifactMissing`] if neither file exists
    /// - [`AcquireError::ConversionUnavailable`] if no transcoder is installed
    /// - [`AcquireError::ConversionFailed`] if the transcoder fails or leaves no output
    #[instrument(skip(self, scratch, requester), fields(attempt = %scratch.id(), requester = %requester))]
    pub async fn ensure_output(
        &self,
        scratch: &AttemptScratch,
        requester: &RequesterInfo,
    ) -> Result<PathBuf, AcquireError> {
        let output = scratch.output_path();
        if file_exists(&output).await {
            return Ok(output);
        }

        let raw = scratch.raw_path();
        if !file_exists(&raw).await {
            error!(path = %raw.display(), "Download tool left neither output nor raw artifact");
            return Err(AcquireError::RawArtifactMissing { path: raw });
        }

        if !self.transcoder.is_available() {
            error!(
                path = %raw.display(),
                log = %scratch.download_log_name(),
                "Cannot convert raw artifact, transcoder not installed"
            );
            return Err(AcquireError::ConversionUnavailable { path: raw });
        }

        debug!(input = %raw.display(), format = scratch.format(), "Converting raw artifact");
        let log_path = scratch.conversion_log_path();
        let failed = || AcquireError::ConversionFailed {
            path: raw.clone(),
            format: scratch.format().to_string(),
            log_name: scratch.conversion_log_name(),
        };

        let outcome = match self.transcoder.transcode(&raw, &output, &log_path).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, log = %scratch.conversion_log_name(), "Failed to start transcoder");
                return Err(failed());
            }
        };

        if !outcome.success() || !file_exists(&output).await {
            error!(
                outcome = ?outcome,
                log = %scratch.conversion_log_name(),
                "Failed to convert raw artifact"
            );
            return Err(failed());
        }
        Ok(output)
    }
}
