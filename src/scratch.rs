//! Per-attempt scratch space with guaranteed cleanup.
//!
//! Every acquisition attempt allocates its own directory under the
//! [`ScratchArena`] root, named by a fresh random identifier. All temporary
//! files of the attempt (raw download, `.part` marker, converted output, logs)
//! live inside it, and the [`AttemptScratch`] guard removes the directory when
//! dropped: on success, on early return, on error and on unwinding.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::{debug, warn};

use crate::error::AcquireError;

/// Length of generated attempt identifiers.
const ATTEMPT_ID_LEN: usize = 16;

/// Root under which attempt directories are allocated.
#[derive(Debug, Clone)]
pub struct ScratchArena {
    root: PathBuf,
}

impl ScratchArena {
    /// Creates an arena rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Arena root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocates a fresh, empty directory for one attempt on `track_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Scratch`] if the directory cannot be created.
    pub async fn allocate(&self, track_id: &str, format: &str) -> Result<AttemptScratch, AcquireError> {
        let id = generate_attempt_id();
        let dir = self.root.join(format!("attempt-{id}"));

        // create_dir (not _all) on the leaf: fails instead of sharing an existing directory
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| AcquireError::Scratch {
                path: self.root.clone(),
                source,
            })?;
        tokio::fs::create_dir(&dir)
            .await
            .map_err(|source| AcquireError::Scratch {
                path: dir.clone(),
                source,
            })?;

        debug!(attempt = %id, dir = %dir.display(), "Allocated scratch directory");
        Ok(AttemptScratch {
            id,
            dir,
            file_stem: sanitize_file_stem(track_id),
            format: format.to_string(),
            removed: false,
        })
    }
}

/// Scratch directory owned by exactly one acquisition attempt.
///
/// Removed, with everything in it, by [`AttemptScratch::cleanup`] or, failing that, when dropped.
#[derive(Debug)]
pub struct AttemptScratch {
    id: String,
    dir: PathBuf,
    file_stem: String,
    format: String,
    removed: bool,
}

impl AttemptScratch {
    /// Removes the directory without blocking the runtime.
    ///
    /// If removal fails, the blocking removal in `Drop` gets one more try.
    pub async fn cleanup(mut self) {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {
                debug!(attempt = %self.id, "Removed scratch directory");
                self.removed = true;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => self.removed = true,
            Err(e) => warn!(
                attempt = %self.id,
                dir = %self.dir.display(),
                error = %e,
                "Failed to remove scratch directory, retrying on drop"
            ),
        }
    }

    /// Random identifier of this attempt.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Directory holding this attempt's files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Target audio format of this attempt.
    #[must_use]
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Output stem handed to the download tool; also the raw artifact path.
    #[must_use]
    pub fn raw_path(&self) -> PathBuf {
        self.dir.join(format!("{}.tmp", self.id))
    }

    /// Partial-download marker the download tool may leave behind.
    #[must_use]
    pub fn partial_path(&self) -> PathBuf {
        self.dir.join(format!("{}.tmp.part", self.id))
    }

    /// Expected target-format artifact.
    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        self.dir.join(format!("{}.tmp.{}", self.id, self.format))
    }

    /// Combined output of the download tool.
    #[must_use]
    pub fn download_log_path(&self) -> PathBuf {
        self.dir.join(self.download_log_name())
    }

    /// Storage name of the download log.
    #[must_use]
    pub fn download_log_name(&self) -> String {
        format!("{}-{}.log", self.file_stem, self.id)
    }

    /// Combined output of the transcoder.
    #[must_use]
    pub fn conversion_log_path(&self) -> PathBuf {
        self.dir.join(self.conversion_log_name())
    }

    /// Storage name of the conversion log.
    #[must_use]
    pub fn conversion_log_name(&self) -> String {
        format!("{}-{}-convert.log", self.file_stem, self.id)
    }
}

impl Drop for AttemptScratch {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!(attempt = %self.id, "Removed scratch directory"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                attempt = %self.id,
                dir = %self.dir.display(),
                error = %e,
                "Failed to remove scratch directory"
            ),
        }
    }
}

fn generate_attempt_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ATTEMPT_ID_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// Maps a track id onto a safe file-name component.
fn sanitize_file_stem(track_id: &str) -> String {
    let stem: String = track_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() { "track".to_string() } else { stem }
}
