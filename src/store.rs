//! Persistence contracts consumed by the pipeline.
//!
//! [`AudioDatabase`] caches resolved source locations by track id;
//! [`AudioStorage`] holds artifact bytes and diagnostic logs. Both are
//! implemented by the host application; [`crate::db`] and [`crate::storage`]
//! provide the implementations the binary uses.

use async_trait::async_trait;
use tracing::warn;

use crate::error::StoreError;
use crate::track::RequesterInfo;

/// Kind of object held in [`AudioStorage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// Playable audio artifact.
    Audio,
    /// Diagnostic log from an external tool.
    Log,
}

impl StorageKind {
    /// Lowercase name, used for directory names and log fields.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Log => "log",
        }
    }
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bytes and media type of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAudio {
    /// Object contents.
    pub data: Vec<u8>,
    /// Media type recorded at store time.
    pub mime_type: String,
}

/// Track id to source location cache.
#[async_trait]
pub trait AudioDatabase: Send + Sync {
    /// Records `url` as the source location of `track_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails.
    async fn store_audio_location(
        &self,
        track_id: &str,
        url: &str,
        requester: &RequesterInfo,
    ) -> Result<(), StoreError>;

    /// Returns the cached location of `track_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    async fn provide_audio_location(
        &self,
        track_id: &str,
        requester: &RequesterInfo,
    ) -> Result<Option<String>, StoreError>;
}

/// Named blob storage for artifacts and logs.
#[async_trait]
pub trait AudioStorage: Send + Sync {
    /// Stores `data` under `name`, replacing any previous object.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails or the name is rejected.
    async fn store(
        &self,
        name: &str,
        kind: StorageKind,
        data: &[u8],
        mime_type: &str,
        requester: &RequesterInfo,
    ) -> Result<(), StoreError>;

    /// Reads the object stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    async fn provide(&self, name: &str, kind: StorageKind)
    -> Result<Option<StoredAudio>, StoreError>;

    /// Like [`AudioStorage::provide`], but logs failures instead of returning them.
    async fn safe_provide(&self, name: &str, kind: StorageKind) -> Option<StoredAudio> {
        match self.provide(name, kind).await {
            Ok(found) => found,
            Err(e) => {
                warn!(name, kind = %kind, error = %e, "Failed to provide stored object");
                None
            }
        }
    }
}
