//! SQLite-backed location cache.
//!
//! This module provides the [`AudioDatabase`] used by the binary:
//! - Connection pool management
//! - WAL mode for concurrent reads
//! - Automatic migration execution
//!
//! # Example
//!
//! ```no_run
//! use jukebox_audio::SqliteLocationCache;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = SqliteLocationCache::new(Path::new("locations.db")).await?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{instrument, trace};

use crate::error::StoreError;
use crate::store::AudioDatabase;
use crate::track::{RequesterInfo, ResolvedLocation};

/// Default maximum number of connections in the pool.
/// Kept low for SQLite since it uses file-level locking.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// SQLite busy timeout in milliseconds.
const BUSY_TIMEOUT_MS: u64 = 5000;

/// Location cache stored in a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteLocationCache {
    pool: SqlitePool,
}

impl SqliteLocationCache {
    /// Opens (or creates) the cache at `db_path` and runs pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection fails,
    /// or [`StoreError::Migration`] if migrations fail.
    #[instrument(skip(db_path), fields(path = %db_path.display()))]
    pub async fn new(db_path: &Path) -> Result<Self, StoreError> {
        // Per-connection settings, applied to every connection the pool opens.
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Creates an in-memory cache for testing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection fails,
    /// or [`StoreError::Migration`] if migrations fail.
    #[instrument]
    pub async fn new_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Returns a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Lists every cached location, ordered by track id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn locations(&self) -> Result<Vec<ResolvedLocation>, StoreError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT track_id, url FROM audio_location ORDER BY track_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(track_id, url)| ResolvedLocation::new(track_id, url))
            .collect())
    }

    /// Gracefully closes all connections in the pool.
    #[instrument(skip(self))]
    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl AudioDatabase for SqliteLocationCache {
    async fn store_audio_location(
        &self,
        track_id: &str,
        url: &str,
        requester: &RequesterInfo,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO audio_location (track_id, url, stored_by, updated_at)
             VALUES (?, ?, ?, datetime('now'))
             ON CONFLICT(track_id) DO UPDATE SET
                url = excluded.url,
                stored_by = excluded.stored_by,
                updated_at = excluded.updated_at",
        )
        .bind(track_id)
        .bind(url)
        .bind(&requester.user_uid)
        .execute(&self.pool)
        .await?;
        trace!(track = track_id, url, requester = %requester, "Stored audio location");
        Ok(())
    }

    async fn provide_audio_location(
        &self,
        track_id: &str,
        requester: &RequesterInfo,
    ) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT url FROM audio_location WHERE track_id = ?")
                .bind(track_id)
                .fetch_optional(&self.pool)
                .await?;
        trace!(track = track_id, hit = row.is_some(), requester = %requester, "Looked up audio location");
        Ok(row.map(|(url,)| url))
    }
}
