//! The audio source facade: cache fast path in front of the acquisition pipeline.
//!
//! A resolution first consults the Database for a previously resolved
//! location. On a miss it takes a permit from the acquisition pool, asks the
//! [`SearchArbiter`] for a candidate, downloads it, converts it if needed and
//! hands the result to the [`PersistenceGateway`]. Each attempt owns a private
//! scratch directory that is gone by the time [`AudioSource::resolve`] returns.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use jukebox_audio::{
//!     AudioSource, AudioSourceConfig, LocalStorage, RequesterInfo, SqliteLocationCache,
//!     TrackQuery,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let database = Arc::new(SqliteLocationCache::new("locations.db".as_ref()).await?);
//! let storage = Arc::new(LocalStorage::new("audio-store"));
//! let source = AudioSource::builder(AudioSourceConfig::default(), database, storage).build()?;
//!
//! let query = TrackQuery::new("t1", "Daft Punk", "One More Time", 320_000);
//! let resolution = source.resolve(&query, &RequesterInfo::new("u1")).await;
//! println!("{:?}", resolution.url());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn};
use url::Url;

use crate::config::AudioSourceConfig;
use crate::convert::{ConversionFallback, FfmpegTranscoder, Transcoder};
use crate::download::DownloadExecutor;
use crate::error::{AcquireError, BuildError};
use crate::gateway::{PersistedArtifact, PersistenceGateway};
use crate::process::{ProcessRunner, TokioProcessRunner};
use crate::scratch::{AttemptScratch, ScratchArena};
use crate::search::{
    DEFAULT_DATA_API_BASE_URL, DataApiStrategy, InnertubeExtractor, QuotaGuard, ScrapeStrategy,
    SearchArbiter, SearchCandidate, SearchExtractor,
};
use crate::store::{AudioDatabase, AudioStorage};
use crate::track::{RequesterInfo, TrackQuery};

/// Terminal state of one resolution.
#[derive(Debug)]
pub enum Resolution {
    /// The Database already knew a location; nothing else ran.
    Cached {
        /// Cached location, exactly as stored.
        url: String,
    },
    /// The pipeline acquired and stored a fresh artifact.
    Acquired(PersistedArtifact),
    /// No search strategy produced a candidate.
    NotFound,
    /// The attempt failed.
    Failed(AcquireError),
}

impl Resolution {
    /// Returns true for [`Resolution::Cached`] and [`Resolution::Acquired`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Cached { .. } | Self::Acquired(_))
    }

    /// Resolved source URL, if one is known.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Cached { url } => Some(url),
            Self::Acquired(artifact) => artifact.location.as_deref(),
            Self::NotFound | Self::Failed(_) => None,
        }
    }
}

/// Resolves playable audio for tracks.
pub struct AudioSource {
    database: Arc<dyn AudioDatabase>,
    arbiter: SearchArbiter,
    executor: DownloadExecutor,
    conversion: ConversionFallback,
    gateway: PersistenceGateway,
    scratch: ScratchArena,
    format: String,
    permits: Arc<Semaphore>,
}

impl AudioSource {
    /// Starts building a source over the given collaborators.
    #[must_use]
    pub fn builder(
        config: AudioSourceConfig,
        database: Arc<dyn AudioDatabase>,
        storage: Arc<dyn AudioStorage>,
    ) -> AudioSourceBuilder {
        AudioSourceBuilder::new(config, database, storage)
    }

    /// Names of the registered search strategies, in execution order.
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&str> {
        self.arbiter.strategy_names()
    }

    /// Shared quota guard of the primary search.
    #[must_use]
    pub fn quota(&self) -> &Arc<QuotaGuard> {
        self.arbiter.quota()
    }

    /// Looks up a previously resolved location for `track_id`.
    ///
    /// Entries that do not parse as URLs are treated as misses. Database
    /// failures are logged and treated as misses.
    #[instrument(skip(self, requester), fields(requester = %requester))]
    pub async fn provide_location(
        &self,
        track_id: &str,
        requester: &RequesterInfo,
    ) -> Option<String> {
        let cached = match self.database.provide_audio_location(track_id, requester).await {
            Ok(cached) => cached?,
            Err(e) => {
                warn!(track = track_id, error = %e, "Failed to look up cached location");
                return None;
            }
        };

        match Url::parse(&cached) {
            Ok(_) => {
                trace!(track = track_id, url = %cached, "Cache hit");
                Some(cached)
            }
            Err(e) => {
                warn!(track = track_id, url = %cached, error = %e, "Ignoring unparseable cached location");
                None
            }
        }
    }

    /// Resolves `query`, preferring a cached location.
    #[instrument(skip_all, fields(track = %query.id, requester = %requester))]
    pub async fn resolve(&self, query: &TrackQuery, requester: &RequesterInfo) -> Resolution {
        if let Some(url) = self.provide_location(&query.id, requester).await {
            return Resolution::Cached { url };
        }
        self.acquire(query, requester).await
    }

    /// Runs [`AudioSource::resolve`] as an independent task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_resolve(
        self: &Arc<Self>,
        query: TrackQuery,
        requester: RequesterInfo,
    ) -> JoinHandle<Resolution> {
        let source = Arc::clone(self);
        tokio::spawn(async move { source.resolve(&query, &requester).await })
    }

    /// Runs the acquisition pipeline, bypassing the cache.
    #[instrument(skip_all, fields(track = %query.id, requester = %requester))]
    pub async fn acquire(&self, query: &TrackQuery, requester: &RequesterInfo) -> Resolution {
        let Ok(_permit) = self.permits.acquire().await else {
            return Resolution::Failed(AcquireError::PoolClosed);
        };

        let Some(candidate) = self.arbiter.find_candidate(query, requester).await else {
            return Resolution::NotFound;
        };

        let scratch = match self.scratch.allocate(&query.id, &self.format).await {
            Ok(scratch) => scratch,
            Err(e) => {
                error!(error = %e, "Failed to allocate scratch space");
                return Resolution::Failed(e);
            }
        };

        let result = self.acquire_into(query, &candidate, &scratch, requester).await;
        self.gateway.persist_logs(&scratch, requester).await;
        scratch.cleanup().await;

        match result {
            Ok(artifact) => {
                info!(
                    name = %artifact.artifact_name,
                    source = %candidate.source,
                    location = ?artifact.location,
                    "Acquired audio"
                );
                Resolution::Acquired(artifact)
            }
            Err(e) => {
                error!(url = %candidate.url, error = %e, "Failed to acquire audio");
                Resolution::Failed(e)
            }
        }
    }

    async fn acquire_into(
        &self,
        query: &TrackQuery,
        candidate: &SearchCandidate,
        scratch: &AttemptScratch,
        requester: &RequesterInfo,
    ) -> Result<PersistedArtifact, AcquireError> {
        let report = self
            .executor
            .download(&candidate.url, scratch, requester)
            .await?;

        let artifact = if report.output_present {
            scratch.output_path()
        } else {
            debug!("Target format missing after download, trying conversion");
            self.conversion.ensure_output(scratch, requester).await?
        };

        self.gateway
            .persist_artifact(query, scratch, &artifact, requester)
            .await
    }
}

impl std::fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSource")
            .field("arbiter", &self.arbiter)
            .field("executor", &self.executor)
            .field("scratch", &self.scratch)
            .field("format", &self.format)
            .field("available_permits", &self.permits.available_permits())
            .finish_non_exhaustive()
    }
}

/// Assembles an [`AudioSource`].
///
/// Defaults: real child processes, `ffmpeg` from `PATH`, the public search
/// endpoints, and background region detection when an API key is present.
pub struct AudioSourceBuilder {
    config: AudioSourceConfig,
    database: Arc<dyn AudioDatabase>,
    storage: Arc<dyn AudioStorage>,
    runner: Arc<dyn ProcessRunner>,
    transcoder: Option<Arc<dyn Transcoder>>,
    quota: Arc<QuotaGuard>,
    data_api_base_url: String,
    extractor: Option<Arc<dyn SearchExtractor>>,
    detect_region: bool,
}

impl AudioSourceBuilder {
    fn new(
        config: AudioSourceConfig,
        database: Arc<dyn AudioDatabase>,
        storage: Arc<dyn AudioStorage>,
    ) -> Self {
        Self {
            config,
            database,
            storage,
            runner: Arc::new(TokioProcessRunner),
            transcoder: None,
            quota: Arc::new(QuotaGuard::new()),
            data_api_base_url: DEFAULT_DATA_API_BASE_URL.to_string(),
            extractor: None,
            detect_region: true,
        }
    }

    /// Replaces the process runner used for downloads and `ffmpeg`.
    #[must_use]
    pub fn process_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Replaces the transcoder.
    #[must_use]
    pub fn transcoder(mut self, transcoder: Arc<dyn Transcoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    /// Shares an existing quota guard.
    #[must_use]
    pub fn quota(mut self, quota: Arc<QuotaGuard>) -> Self {
        self.quota = quota;
        self
    }

    /// Points the primary search at a different Data API root.
    #[must_use]
    pub fn data_api_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.data_api_base_url = base_url.into();
        self
    }

    /// Replaces the fallback search extractor.
    #[must_use]
    pub fn fallback_extractor(mut self, extractor: Arc<dyn SearchExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Enables or disables background region detection.
    #[must_use]
    pub fn detect_region(mut self, enabled: bool) -> Self {
        self.detect_region = enabled;
        self
    }

    /// Validates the configuration and wires the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Config`] for invalid configuration and
    /// [`BuildError::Search`] if a search client cannot be built.
    pub fn build(self) -> Result<AudioSource, BuildError> {
        let config = self.config;
        config.validate()?;

        let mut arbiter = SearchArbiter::new(Arc::clone(&self.quota));
        if let Some(key) = config.api_key() {
            let primary = DataApiStrategy::with_base_url(
                Some(key.to_string()),
                Arc::clone(&self.quota),
                self.data_api_base_url,
            )?;
            if self.detect_region && tokio::runtime::Handle::try_current().is_ok() {
                primary.spawn_region_detection();
            }
            arbiter.register(Box::new(primary));
        } else {
            warn!("No API key configured; only the fallback extractor will be used");
        }

        let extractor: Arc<dyn SearchExtractor> = match self.extractor {
            Some(extractor) => extractor,
            None => Arc::new(InnertubeExtractor::new()?),
        };
        arbiter.register(Box::new(ScrapeStrategy::new(extractor)));

        let transcoder = self.transcoder.unwrap_or_else(|| {
            Arc::new(
                FfmpegTranscoder::detect(Arc::clone(&self.runner))
                    .with_timeout(config.conversion_timeout),
            )
        });

        let command: Vec<String> = config
            .audio_command
            .iter()
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect();
        let executor = DownloadExecutor::new(self.runner, command)
            .with_timeout(config.download_timeout);

        Ok(AudioSource {
            gateway: PersistenceGateway::new(Arc::clone(&self.database), self.storage),
            database: self.database,
            arbiter,
            executor,
            conversion: ConversionFallback::new(transcoder),
            scratch: ScratchArena::new(config.scratch_dir),
            format: config.audio_format.trim().to_string(),
            permits: Arc::new(Semaphore::new(config.max_concurrent_acquisitions)),
        })
    }
}
