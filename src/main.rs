//! CLI entry point for jukebox-audio.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use jukebox_audio::search::{SEARCH_CONNECT_TIMEOUT_SECS, configure_search_http_timeouts};
use jukebox_audio::{
    AudioDatabase, AudioSource, AudioSourceConfig, LocalStorage, RequesterInfo, Resolution,
    SqliteLocationCache, TrackQuery, parse_command_line,
};
use tracing::{debug, info};

mod cli;

use cli::{Args, Command, LookupArgs, ResolveArgs};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let config = load_config(args.config.as_deref())?;
    match args.command {
        Command::Resolve(resolve) => run_resolve(config, &args.database, resolve).await,
        Command::Lookup(lookup) => run_lookup(&args.database, lookup).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<AudioSourceConfig> {
    let Some(path) = path else {
        return Ok(AudioSourceConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

fn apply_overrides(mut config: AudioSourceConfig, args: &ResolveArgs) -> AudioSourceConfig {
    if let Some(key) = &args.api_key {
        config.api_key = Some(key.clone());
    }
    if let Some(format) = &args.audio_format {
        config.audio_format.clone_from(format);
    }
    if let Some(command) = &args.audio_command {
        config.audio_command = parse_command_line(command);
    }
    if let Some(dir) = &args.scratch_dir {
        config.scratch_dir.clone_from(dir);
    }
    if let Some(secs) = args.download_timeout_secs {
        config.download_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = args.conversion_timeout_secs {
        config.conversion_timeout = Duration::from_secs(secs);
    }
    config
}

async fn run_resolve(config: AudioSourceConfig, database: &Path, args: ResolveArgs) -> Result<()> {
    let config = apply_overrides(config, &args);
    config.validate().context("invalid configuration")?;
    if let Some(secs) = args.search_timeout_secs {
        configure_search_http_timeouts(SEARCH_CONNECT_TIMEOUT_SECS.min(secs), secs);
    }

    let cache = SqliteLocationCache::new(database)
        .await
        .with_context(|| format!("failed to open location cache {}", database.display()))?;
    let storage = LocalStorage::new(&args.storage_dir);
    let source = AudioSource::builder(config, Arc::new(cache), Arc::new(storage))
        .build()
        .context("failed to set up audio source")?;
    debug!(?source, "Audio source ready");

    let query = TrackQuery::new(args.track.id, args.artist, args.title, args.duration_ms);
    let requester = RequesterInfo::new(args.track.requester);

    match source.resolve(&query, &requester).await {
        Resolution::Cached { url } => {
            info!(track = %query.id, "Served from cache");
            println!("{url}");
        }
        Resolution::Acquired(artifact) => {
            let stored_at = args.storage_dir.join("audio").join(&artifact.artifact_name);
            info!(
                track = %query.id,
                bytes = artifact.audio.data.len(),
                mime = %artifact.audio.mime_type,
                "Acquired audio"
            );
            match artifact.location {
                Some(location) => println!("{location}\t{}", stored_at.display()),
                None => println!("{}", stored_at.display()),
            }
        }
        Resolution::NotFound => bail!("no audio found for \"{}\"", query.search_text()),
        Resolution::Failed(e) => {
            return Err(e).with_context(|| format!("failed to acquire audio for track {}", query.id));
        }
    }
    Ok(())
}

async fn run_lookup(database: &Path, args: LookupArgs) -> Result<()> {
    let cache = SqliteLocationCache::new(database)
        .await
        .with_context(|| format!("failed to open location cache {}", database.display()))?;
    let requester = RequesterInfo::new(args.track.requester);

    match cache
        .provide_audio_location(&args.track.id, &requester)
        .await
        .context("failed to query location cache")?
    {
        Some(url) => println!("{url}"),
        None => info!(track = %args.track.id, "No cached location"),
    }
    cache.close().await;
    Ok(())
}
