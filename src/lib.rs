//! Jukebox Audio Library
//!
//! Resolves a playable audio artifact for a music track identified by artist,
//! title and duration. External search services locate a source video, an
//! external download tool fetches it within a wall-clock bound, a transcoder
//! converts it when needed, and the result is cached so repeat requests skip
//! the whole pipeline.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`source`] - `AudioSource` facade: cache fast path and acquisition pipeline
//! - [`search`] - Search strategies, quota guard and the strategy arbiter
//! - [`download`] - Bounded-time download through the configured tool
//! - [`convert`] - Transcoder fallback when the download is not in the target format
//! - [`gateway`] - Persistence of locations, artifacts and diagnostic logs
//! - [`store`] - Database and Storage contracts
//! - [`db`] / [`storage`] - SQLite and directory-backed implementations
//! - [`process`] / [`scratch`] - Child process and scratch-space plumbing

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod convert;
pub mod db;
pub mod download;
pub mod error;
pub mod gateway;
pub mod process;
pub mod scratch;
pub mod search;
pub mod source;
pub mod storage;
pub mod store;
pub mod track;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::{AudioSourceConfig, DEFAULT_AUDIO_FORMAT, default_audio_command, parse_command_line};
pub use convert::{CONVERSION_TIMEOUT, ConversionFallback, FfmpegTranscoder, Transcoder};
pub use db::SqliteLocationCache;
pub use download::{DOWNLOAD_TIMEOUT, DownloadExecutor, DownloadReport, recover_source_url};
pub use error::{AcquireError, BuildError, ConfigError, SearchError, StoreError};
pub use gateway::{PersistedArtifact, PersistenceGateway};
pub use process::{ProcessOutcome, ProcessRunner, ProcessSpec, TokioProcessRunner};
pub use scratch::{AttemptScratch, ScratchArena};
pub use search::{
    QUOTA_TIMEOUT, QuotaGuard, SearchArbiter, SearchCandidate, SearchStrategy, StrategyPriority,
    select_closest,
};
pub use source::{AudioSource, AudioSourceBuilder, Resolution};
pub use storage::LocalStorage;
pub use store::{AudioDatabase, AudioStorage, StorageKind, StoredAudio};
pub use track::{RequesterInfo, ResolvedLocation, TrackQuery, mime_for_format, video_link};
