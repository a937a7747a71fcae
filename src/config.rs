//! Values consumed by [`crate::AudioSource`].
//!
//! Loading is left to the host; the binary reads an optional JSON file and
//! layers CLI flags on top. Keys from older deployments (`API_KEY`, `apiKey`,
//! `AUDIO_FORMAT`, ...) are accepted as aliases.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::convert::CONVERSION_TIMEOUT;
use crate::download::DOWNLOAD_TIMEOUT;
use crate::error::ConfigError;

/// Default target audio format.
pub const DEFAULT_AUDIO_FORMAT: &str = "m4a";

/// Default number of acquisitions allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_ACQUISITIONS: usize = 4;

/// Configuration of the resolution pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AudioSourceConfig {
    /// Data API key; without one only the fallback search runs.
    #[serde(alias = "API_KEY", alias = "apiKey")]
    pub api_key: Option<String>,

    /// Target audio format passed to the download tool.
    #[serde(alias = "AUDIO_FORMAT", alias = "audioFormat")]
    pub audio_format: String,

    /// Download command line; `[url, output stem, format]` are appended.
    #[serde(
        alias = "AUDIO_COMMAND",
        alias = "audioCommand",
        deserialize_with = "command_line"
    )]
    pub audio_command: Vec<String>,

    /// Root for per-attempt scratch directories.
    pub scratch_dir: PathBuf,

    /// Bound on one download run.
    #[serde(rename = "download_timeout_secs", deserialize_with = "duration_secs")]
    pub download_timeout: Duration,

    /// Bound on one transcoder run.
    #[serde(rename = "conversion_timeout_secs", deserialize_with = "duration_secs")]
    pub conversion_timeout: Duration,

    /// Acquisitions allowed to run at once.
    pub max_concurrent_acquisitions: usize,
}

impl Default for AudioSourceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            audio_format: DEFAULT_AUDIO_FORMAT.to_string(),
            audio_command: default_audio_command(),
            scratch_dir: std::env::temp_dir().join("jukebox-audio"),
            download_timeout: DOWNLOAD_TIMEOUT,
            conversion_timeout: CONVERSION_TIMEOUT,
            max_concurrent_acquisitions: DEFAULT_MAX_CONCURRENT_ACQUISITIONS,
        }
    }
}

impl AudioSourceConfig {
    /// Returns the API key if one is set and non-blank.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// Validates values against pipeline constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let format = self.audio_format.trim();
        if format.is_empty() {
            return Err(ConfigError::invalid("audio_format", "must not be empty"));
        }
        if !format.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::invalid(
                "audio_format",
                format!("'{format}' must be a plain file extension"),
            ));
        }
        if self.audio_command.iter().all(|part| part.trim().is_empty()) {
            return Err(ConfigError::invalid("audio_command", "must not be empty"));
        }
        if self.download_timeout.is_zero() {
            return Err(ConfigError::invalid("download_timeout_secs", "must be at least 1"));
        }
        if self.conversion_timeout.is_zero() {
            return Err(ConfigError::invalid("conversion_timeout_secs", "must be at least 1"));
        }
        if self.max_concurrent_acquisitions == 0 {
            return Err(ConfigError::invalid(
                "max_concurrent_acquisitions",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Platform default download command.
#[must_use]
pub fn default_audio_command() -> Vec<String> {
    if cfg!(windows) {
        vec!["yt.bat".to_string()]
    } else {
        vec!["sh".to_string(), "yt.sh".to_string()]
    }
}

/// Splits a whitespace-separated command line.
#[must_use]
pub fn parse_command_line(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CommandLine {
    List(Vec<String>),
    Line(String),
}

fn command_line<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match CommandLine::deserialize(deserializer)? {
        CommandLine::List(parts) => parts,
        CommandLine::Line(line) => parse_command_line(&line),
    })
}

fn duration_secs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_secs)
}
