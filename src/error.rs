//! Error types for audio resolution.
//!
//! Search problems never reach the caller (strategies swallow them), so the
//! only errors that cross module boundaries are construction failures,
//! collaborator failures and acquisition failures.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while constructing a search strategy.
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    /// The strategy's HTTP client could not be built.
    #[error("search strategy '{strategy}' unavailable: {reason}")]
    ClientBuild {
        /// Strategy being constructed.
        strategy: String,
        /// Why construction failed.
        reason: String,
    },
}

/// Errors reported by Database and Storage collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backing database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failure while opening the database.
    #[error("failed to run migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Filesystem failure in a storage backend.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Object name that cannot be mapped onto the backend.
    #[error("invalid storage name '{name}'")]
    InvalidName {
        /// Rejected name.
        name: String,
    },
}

impl StoreError {
    /// Creates an IO error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Terminal failures of a single acquisition attempt.
///
/// Every variant is local to the attempt that produced it.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// The per-attempt scratch area could not be created.
    #[error("failed to prepare scratch directory {path}: {source}")]
    Scratch {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The download tool could not be started.
    #[error("failed to start download tool '{program}' for {url}: {source}")]
    DownloadSpawn {
        /// Program that failed to start.
        program: String,
        /// Source URL being downloaded.
        url: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The download tool exceeded its wall-clock bound and was killed.
    #[error("download of {url} timed out after {timeout_secs}s")]
    DownloadTimeout {
        /// Source URL being downloaded.
        url: String,
        /// Configured bound in seconds.
        timeout_secs: u64,
    },

    /// Neither the target-format output nor the raw download exists.
    #[error("download tool produced no output at {path}")]
    RawArtifactMissing {
        /// Expected raw output path.
        path: PathBuf,
    },

    /// Conversion was needed but no transcoder is installed.
    #[error("cannot convert {path}: no transcoder installed")]
    ConversionUnavailable {
        /// Raw artifact that needed conversion.
        path: PathBuf,
    },

    /// The transcoder failed or produced no output.
    #[error("failed to convert {path} to {format}; check {log_name}")]
    ConversionFailed {
        /// Raw artifact being converted.
        path: PathBuf,
        /// Target format.
        format: String,
        /// Name of the conversion diagnostic log.
        log_name: String,
    },

    /// The final artifact could not be read back for persistence.
    #[error("failed to read artifact {path}: {source}")]
    ArtifactRead {
        /// Artifact path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Storage rejected the final artifact.
    #[error("failed to store artifact '{name}': {source}")]
    Storage {
        /// Artifact storage name.
        name: String,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },

    /// The stored artifact could not be served back.
    #[error("stored artifact '{name}' is not available")]
    ArtifactUnavailable {
        /// Artifact storage name.
        name: String,
    },

    /// The acquisition worker pool has shut down.
    #[error("acquisition pool closed unexpectedly")]
    PoolClosed,
}

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A value is outside its allowed range or empty.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Errors raised while assembling an [`crate::AudioSource`].
#[derive(Debug, Error)]
pub enum BuildError {
    /// Configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A search strategy could not be constructed.
    #[error(transparent)]
    Search(#[from] SearchError),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
