//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Resolve playable audio for music tracks.
///
/// Looks up a cached source location first; on a miss, searches for the track,
/// downloads it with the configured tool and stores the artifact locally.
#[derive(Parser, Debug)]
#[command(name = "jukebox-audio")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// JSON config file; CLI flags override its values
    #[arg(long, env = "JUKEBOX_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database holding resolved locations
    #[arg(long, env = "JUKEBOX_DATABASE", default_value = "jukebox-audio.db", global = true)]
    pub database: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve audio for a track, acquiring it if not cached
    Resolve(ResolveArgs),
    /// Print the cached location for a track without acquiring
    Lookup(LookupArgs),
}

/// Track identity shared by subcommands.
#[derive(ClapArgs, Debug)]
pub struct TrackArgs {
    /// Stable track identifier
    #[arg(long)]
    pub id: String,

    /// Requester identifier attached to stored records
    #[arg(long, default_value = "cli")]
    pub requester: String,
}

/// Arguments of `lookup`.
#[derive(ClapArgs, Debug)]
pub struct LookupArgs {
    #[command(flatten)]
    pub track: TrackArgs,
}

/// Arguments of `resolve`.
#[derive(ClapArgs, Debug)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub track: TrackArgs,

    /// Performing artist
    #[arg(long)]
    pub artist: String,

    /// Track title
    #[arg(long)]
    pub title: String,

    /// Expected track length in milliseconds
    #[arg(long)]
    pub duration_ms: u64,

    /// Directory receiving stored artifacts and logs
    #[arg(long, env = "JUKEBOX_STORAGE_DIR", default_value = "audio-store")]
    pub storage_dir: PathBuf,

    /// Data API key (without one only the fallback search runs)
    #[arg(long, env = "JUKEBOX_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Target audio format
    #[arg(long, env = "JUKEBOX_AUDIO_FORMAT")]
    pub audio_format: Option<String>,

    /// Download command line; url, output stem and format are appended
    #[arg(long, env = "JUKEBOX_AUDIO_COMMAND")]
    pub audio_command: Option<String>,

    /// Root for per-attempt scratch directories
    #[arg(long, env = "JUKEBOX_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Download timeout in seconds (1-3600)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub download_timeout_secs: Option<u64>,

    /// Conversion timeout in seconds (1-3600)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub conversion_timeout_secs: Option<u64>,

    /// Search HTTP request timeout in seconds (1-3600)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub search_timeout_secs: Option<u64>,
}
