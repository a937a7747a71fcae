//! Directory-backed [`AudioStorage`].
//!
//! Objects live at `{root}/{kind}/{name}`, with the media type alongside in
//! `{name}.mime`. Writes go to a `.partial` file first and are renamed into
//! place, so readers never see a half-written object.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::error::StoreError;
use crate::store::{AudioStorage, StorageKind, StoredAudio};
use crate::track::{DEFAULT_AUDIO_MIME, RequesterInfo};

const MIME_SUFFIX: &str = ".mime";
const PARTIAL_SUFFIX: &str = ".partial";

/// Stores objects as plain files below a root directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Creates storage rooted at `root`. Directories are created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Storage root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, name: &str, kind: StorageKind) -> Result<PathBuf, StoreError> {
        validate_name(name)?;
        Ok(self.root.join(kind.as_str()).join(name))
    }
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.ends_with(MIME_SUFFIX)
        && !name.ends_with(PARTIAL_SUFFIX)
        && !name.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName {
            name: name.to_string(),
        })
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}

async fn write_replacing(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let partial = sidecar(path, PARTIAL_SUFFIX);
    tokio::fs::write(&partial, data)
        .await
        .map_err(|e| StoreError::io(&partial, e))?;
    tokio::fs::rename(&partial, path)
        .await
        .map_err(|e| StoreError::io(path, e))
}

#[async_trait]
impl AudioStorage for LocalStorage {
    #[instrument(skip(self, data, requester), fields(kind = %kind, bytes = data.len(), requester = %requester))]
    async fn store(
        &self,
        name: &str,
        kind: StorageKind,
        data: &[u8],
        mime_type: &str,
        requester: &RequesterInfo,
    ) -> Result<(), StoreError> {
        let path = self.object_path(name, kind)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StoreError::io(dir, e))?;
        }

        write_replacing(&path, data).await?;
        write_replacing(&sidecar(&path, MIME_SUFFIX), mime_type.as_bytes()).await?;
        debug!(path = %path.display(), "Stored object");
        Ok(())
    }

    async fn provide(
        &self,
        name: &str,
        kind: StorageKind,
    ) -> Result<Option<StoredAudio>, StoreError> {
        let path = self.object_path(name, kind)?;
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        let mime_path = sidecar(&path, MIME_SUFFIX);
        let mime_type = match tokio::fs::read_to_string(&mime_path).await {
            Ok(mime) if !mime.trim().is_empty() => mime.trim().to_string(),
            Ok(_) => DEFAULT_AUDIO_MIME.to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => DEFAULT_AUDIO_MIME.to_string(),
            Err(e) => return Err(StoreError::io(&mime_path, e)),
        };

        Ok(Some(StoredAudio { data, mime_type }))
    }
}
