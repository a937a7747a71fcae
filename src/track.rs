//! Track identity and requester types shared across the pipeline.

use std::fmt;

/// Canonical prefix for resolved video locations.
pub const VIDEO_LINK_PREFIX: &str = "https://youtu.be/";

/// Media type used when the configured format is not in [`mime_for_format`]'s table.
pub const DEFAULT_AUDIO_MIME: &str = "audio/mpeg";

/// A track to resolve audio for.
///
/// Immutable input to resolution; constructed once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackQuery {
    /// Stable track identifier, used for cache keys and artifact names.
    pub id: String,
    /// Performing artist.
    pub artist: String,
    /// Track title.
    pub title: String,
    /// Expected track length in milliseconds.
    pub duration_ms: u64,
}

impl TrackQuery {
    /// Creates a new track query.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        artist: impl Into<String>,
        title: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            id: id.into(),
            artist: artist.into(),
            title: title.into(),
            duration_ms,
        }
    }

    /// Free-text search query used by every search strategy.
    #[must_use]
    pub fn search_text(&self) -> String {
        format!("{} - {}", self.artist, self.title)
    }

    /// Deterministic storage name for the final artifact in `format`.
    #[must_use]
    pub fn artifact_name(&self, format: &str) -> String {
        format!("{}.{format}", self.id)
    }
}

/// Identifies who asked for a resolution.
///
/// Passed through to the Database and Storage collaborators and attached to log lines.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequesterInfo {
    /// Opaque per-client identifier.
    pub user_uid: String,
}

impl RequesterInfo {
    /// Creates requester info for `user_uid`.
    #[must_use]
    pub fn new(user_uid: impl Into<String>) -> Self {
        Self {
            user_uid: user_uid.into(),
        }
    }
}

impl fmt::Display for RequesterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_uid)
    }
}

/// A chosen remote location for a track, as persisted in the location cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    /// Track this location belongs to.
    pub track_id: String,
    /// Remote address of the source media.
    pub url: String,
}

impl ResolvedLocation {
    /// Creates a resolved location.
    #[must_use]
    pub fn new(track_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            track_id: track_id.into(),
            url: url.into(),
        }
    }
}

/// Builds the canonical short link for a video id.
#[must_use]
pub fn video_link(video_id: &str) -> String {
    format!("{VIDEO_LINK_PREFIX}{video_id}")
}

/// Returns the media type stored alongside an artifact in `format`.
#[must_use]
pub fn mime_for_format(format: &str) -> &'static str {
    match format.to_ascii_lowercase().as_str() {
        "m4a" => "audio/m4a",
        "aac" => "audio/aac",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        _ => DEFAULT_AUDIO_MIME,
    }
}
