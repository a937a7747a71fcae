//! Test doubles shared by integration tests.

#![allow(dead_code)]

pub mod socket_guard;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jukebox_audio::search::{ExtractedItem, ExtractorError, PageToken, SearchExtractor, SearchPage};
use jukebox_audio::{
    AudioDatabase, AudioSource, AudioSourceBuilder, AudioSourceConfig, AudioStorage,
    ProcessOutcome, ProcessRunner, ProcessSpec, RequesterInfo, StorageKind, StoreError,
    StoredAudio, Transcoder,
};
use tempfile::TempDir;

// ==================== Database ====================

/// In-memory location cache counting every call.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    rows: Mutex<HashMap<String, String>>,
    pub provide_calls: AtomicUsize,
    pub store_calls: AtomicUsize,
}

impl MemoryDatabase {
    pub fn with_location(track_id: &str, url: &str) -> Self {
        let db = Self::default();
        db.rows
            .lock()
            .unwrap()
            .insert(track_id.to_string(), url.to_string());
        db
    }

    pub fn location(&self, track_id: &str) -> Option<String> {
        self.rows.lock().unwrap().get(track_id).cloned()
    }
}

#[async_trait]
impl AudioDatabase for MemoryDatabase {
    async fn store_audio_location(
        &self,
        track_id: &str,
        url: &str,
        _requester: &RequesterInfo,
    ) -> Result<(), StoreError> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        self.rows
            .lock()
            .unwrap()
            .insert(track_id.to_string(), url.to_string());
        Ok(())
    }

    async fn provide_audio_location(
        &self,
        track_id: &str,
        _requester: &RequesterInfo,
    ) -> Result<Option<String>, StoreError> {
        self.provide_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.location(track_id))
    }
}

// ==================== Storage ====================

/// In-memory blob storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<(String, StorageKind), StoredAudio>>,
}

impl MemoryStorage {
    pub fn get(&self, name: &str, kind: StorageKind) -> Option<StoredAudio> {
        self.objects
            .lock()
            .unwrap()
            .get(&(name.to_string(), kind))
            .cloned()
    }

    pub fn names(&self, kind: StorageKind) -> Vec<String> {
        let mut names: Vec<String> = self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(_, k)| *k == kind)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl AudioStorage for MemoryStorage {
    async fn store(
        &self,
        name: &str,
        kind: StorageKind,
        data: &[u8],
        mime_type: &str,
        _requester: &RequesterInfo,
    ) -> Result<(), StoreError> {
        self.objects.lock().unwrap().insert(
            (name.to_string(), kind),
            StoredAudio {
                data: data.to_vec(),
                mime_type: mime_type.to_string(),
            },
        );
        Ok(())
    }

    async fn provide(
        &self,
        name: &str,
        kind: StorageKind,
    ) -> Result<Option<StoredAudio>, StoreError> {
        Ok(self.get(name, kind))
    }
}

// ==================== Download tool ====================

/// What the scripted download tool does when run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadBehavior {
    /// Writes the target-format file and a log naming `video_id`.
    Succeed { video_id: &'static str },
    /// Writes only the raw, unconverted file.
    RawOnly,
    /// Exits non-zero without writing any artifact.
    NoOutput,
    /// Never finishes on its own; only the bound ends it.
    Hang,
    /// Fails to start.
    Crash,
}

/// [`ProcessRunner`] double that simulates the download tool.
#[derive(Debug)]
pub struct ScriptedRunner {
    behavior: DownloadBehavior,
    hold: Duration,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new(behavior: DownloadBehavior) -> Self {
        Self {
            behavior,
            hold: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    /// Keeps each run busy for `hold` before finishing.
    pub fn holding(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    async fn play(&self, spec: &ProcessSpec) -> std::io::Result<ProcessOutcome> {
        let [url, stem, format] = &spec.args[spec.args.len() - 3..] else {
            return Err(std::io::Error::other("unexpected argument shape"));
        };
        self.urls.lock().unwrap().push(url.clone());

        if self.behavior == DownloadBehavior::Crash {
            std::fs::File::create(&spec.log_path)?;
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "download tool not installed",
            ));
        }
        if !self.hold.is_zero() {
            tokio::time::sleep(self.hold).await;
        }

        match self.behavior {
            DownloadBehavior::Succeed { video_id } => {
                std::fs::write(
                    &spec.log_path,
                    format!("[download] {url}\nVideo ID: {video_id}\n[download] 100%\n"),
                )?;
                std::fs::write(format!("{stem}.part"), b"partial")?;
                std::fs::write(format!("{stem}.{format}"), b"target-audio")?;
                Ok(ProcessOutcome::Exited { code: Some(0) })
            }
            DownloadBehavior::RawOnly => {
                std::fs::write(&spec.log_path, "[download] no post-processing\n")?;
                std::fs::write(stem, b"raw-audio")?;
                Ok(ProcessOutcome::Exited { code: Some(0) })
            }
            DownloadBehavior::NoOutput => {
                std::fs::write(&spec.log_path, "ERROR: video unavailable\n")?;
                Ok(ProcessOutcome::Exited { code: Some(1) })
            }
            DownloadBehavior::Hang => {
                std::fs::write(&spec.log_path, "[download]   3.0% of 4.20MiB\n")?;
                std::fs::write(format!("{stem}.part"), b"partial")?;
                match tokio::time::timeout(spec.timeout, tokio::time::sleep(Duration::from_secs(3600)))
                    .await
                {
                    Ok(()) => Ok(ProcessOutcome::Exited { code: Some(0) }),
                    Err(_) => Ok(ProcessOutcome::TimedOut),
                }
            }
            DownloadBehavior::Crash => unreachable!("handled above"),
        }
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, spec: &ProcessSpec) -> std::io::Result<ProcessOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let result = self.play(spec).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// ==================== Transcoder ====================

/// [`Transcoder`] double.
#[derive(Debug)]
pub struct FakeTranscoder {
    available: bool,
    succeeds: bool,
    pub calls: AtomicUsize,
}

impl FakeTranscoder {
    pub fn new(available: bool, succeeds: bool) -> Self {
        Self {
            available,
            succeeds,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        log_path: &Path,
    ) -> std::io::Result<ProcessOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::fs::write(log_path, format!("converting {}\n", input.display()))?;
        if self.succeeds {
            std::fs::write(output, b"converted-audio")?;
            Ok(ProcessOutcome::Exited { code: Some(0) })
        } else {
            Ok(ProcessOutcome::Exited { code: Some(1) })
        }
    }
}

// ==================== Search extractor ====================

/// Single-page extractor returning fixed items.
#[derive(Debug, Default)]
pub struct ScriptedExtractor {
    items: Vec<ExtractedItem>,
    pub calls: AtomicUsize,
}

impl ScriptedExtractor {
    pub fn with_videos(videos: &[(&str, u64)]) -> Self {
        Self {
            items: videos
                .iter()
                .map(|(url, secs)| ExtractedItem::video(*url, *secs))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SearchExtractor for ScriptedExtractor {
    async fn search(&self, _query: &str) -> Result<SearchPage, ExtractorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SearchPage {
            items: self.items.clone(),
            next_page: None,
        })
    }

    async fn more_items(
        &self,
        _query: &str,
        _page: &PageToken,
    ) -> Result<SearchPage, ExtractorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SearchPage::default())
    }
}

// ==================== Harness ====================

/// Wires an [`AudioSource`] over the doubles above.
pub struct Harness {
    pub root: TempDir,
    pub database: Arc<MemoryDatabase>,
    pub storage: Arc<MemoryStorage>,
    pub runner: Arc<ScriptedRunner>,
    pub extractor: Arc<ScriptedExtractor>,
    pub transcoder: Arc<FakeTranscoder>,
}

impl Harness {
    pub fn new(runner: ScriptedRunner) -> Self {
        Self {
            root: TempDir::new().unwrap(),
            database: Arc::new(MemoryDatabase::default()),
            storage: Arc::new(MemoryStorage::default()),
            runner: Arc::new(runner),
            extractor: Arc::new(ScriptedExtractor::with_videos(&[(
                "https://youtu.be/fallback001",
                200,
            )])),
            transcoder: Arc::new(FakeTranscoder::new(true, true)),
        }
    }

    pub fn with_database(mut self, database: MemoryDatabase) -> Self {
        self.database = Arc::new(database);
        self
    }

    pub fn with_extractor(mut self, extractor: ScriptedExtractor) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    pub fn with_transcoder(mut self, transcoder: FakeTranscoder) -> Self {
        self.transcoder = Arc::new(transcoder);
        self
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.root.path().join("scratch")
    }

    pub fn config(&self) -> AudioSourceConfig {
        AudioSourceConfig {
            audio_command: vec!["fake-downloader".to_string()],
            scratch_dir: self.scratch_dir(),
            ..AudioSourceConfig::default()
        }
    }

    pub fn builder(&self, config: AudioSourceConfig) -> AudioSourceBuilder {
        AudioSource::builder(config, self.database.clone(), self.storage.clone())
            .process_runner(self.runner.clone())
            .transcoder(self.transcoder.clone())
            .fallback_extractor(self.extractor.clone())
            .detect_region(false)
    }

    pub fn source(&self) -> AudioSource {
        self.builder(self.config()).build().unwrap()
    }

    /// True when no attempt directory or file is left under the scratch root.
    pub fn scratch_is_empty(&self) -> bool {
        match std::fs::read_dir(self.scratch_dir()) {
            Ok(mut entries) => entries.next().is_none(),
            Err(e) => e.kind() == std::io::ErrorKind::NotFound,
        }
    }
}
