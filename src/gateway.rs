//! Persistence of acquisition results into the Database and Storage collaborators.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, instrument, warn};

use crate::download::{file_exists, recover_source_url};
use crate::error::AcquireError;
use crate::scratch::AttemptScratch;
use crate::store::{AudioDatabase, AudioStorage, StorageKind, StoredAudio};
use crate::track::{RequesterInfo, TrackQuery, mime_for_format};

/// Media type recorded for diagnostic logs.
pub const LOG_MIME: &str = "text/plain";

/// Outcome of persisting a successful acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedArtifact {
    /// Storage name of the artifact.
    pub artifact_name: String,
    /// Canonical source URL recorded in the Database, if one was recovered.
    pub location: Option<String>,
    /// Artifact as served back by Storage.
    pub audio: StoredAudio,
}

/// Writes artifacts, locations and diagnostic logs.
#[derive(Clone)]
pub struct PersistenceGateway {
    database: Arc<dyn AudioDatabase>,
    storage: Arc<dyn AudioStorage>,
}

impl PersistenceGateway {
    /// Creates a gateway over the given collaborators.
    #[must_use]
    pub fn new(database: Arc<dyn AudioDatabase>, storage: Arc<dyn AudioStorage>) -> Self {
        Self { database, storage }
    }

    /// Persists the artifact at `artifact_path` for `query`.
    ///
    /// The canonical source URL, when the download log names one, is recorded
    /// best-effort: a Database failure is logged and does not fail the attempt.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::ArtifactRead`] if the artifact cannot be read,
    /// [`AcquireError::Storage`] if Storage rejects it and
    /// [`AcquireError::ArtifactUnavailable`] if it cannot be served back.
    #[instrument(skip_all, fields(track = %query.id, attempt = %scratch.id(), requester = %requester))]
    pub async fn persist_artifact(
        &self,
        query: &TrackQuery,
        scratch: &AttemptScratch,
        artifact_path: &Path,
        requester: &RequesterInfo,
    ) -> Result<PersistedArtifact, AcquireError> {
        let location = recover_source_url(&scratch.download_log_path()).await;
        match &location {
            Some(url) => {
                if let Err(e) = self
                    .database
                    .store_audio_location(&query.id, url, requester)
                    .await
                {
                    warn!(url = %url, error = %e, "Failed to record audio location");
                }
            }
            None => debug!("No video id in download log; location not recorded"),
        }

        let data = tokio::fs::read(artifact_path)
            .await
            .map_err(|source| AcquireError::ArtifactRead {
                path: artifact_path.to_path_buf(),
                source,
            })?;

        let artifact_name = query.artifact_name(scratch.format());
        let mime_type = mime_for_format(scratch.format());
        self.storage
            .store(&artifact_name, StorageKind::Audio, &data, mime_type, requester)
            .await
            .map_err(|source| {
                error!(name = %artifact_name, error = %source, "Failed to store artifact");
                AcquireError::Storage {
                    name: artifact_name.clone(),
                    source,
                }
            })?;
        debug!(name = %artifact_name, bytes = data.len(), mime = mime_type, "Stored artifact");

        let audio = self
            .storage
            .safe_provide(&artifact_name, StorageKind::Audio)
            .await
            .ok_or_else(|| AcquireError::ArtifactUnavailable {
                name: artifact_name.clone(),
            })?;

        Ok(PersistedArtifact {
            artifact_name,
            location,
            audio,
        })
    }

    /// Stores whichever diagnostic logs the attempt produced. Never fails.
    #[instrument(skip_all, fields(attempt = %scratch.id(), requester = %requester))]
    pub async fn persist_logs(&self, scratch: &AttemptScratch, requester: &RequesterInfo) {
        let logs = [
            (scratch.download_log_path(), scratch.download_log_name()),
            (scratch.conversion_log_path(), scratch.conversion_log_name()),
        ];
        for (path, name) in logs {
            if !file_exists(&path).await {
                continue;
            }
            let data = match tokio::fs::read(&path).await {
                Ok(data) => data,
                Err(e) => {
                    warn!(log = %name, error = %e, "Failed to read diagnostic log");
                    continue;
                }
            };
            if let Err(e) = self
                .storage
                .store(&name, StorageKind::Log, &data, LOG_MIME, requester)
                .await
            {
                warn!(log = %name, error = %e, "Failed to store diagnostic log");
            }
        }
    }
}

impl std::fmt::Debug for PersistenceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceGateway").finish_non_exhaustive()
    }
}
