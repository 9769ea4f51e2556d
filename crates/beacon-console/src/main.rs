use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use beacon_camera::UvcCamera;
use beacon_client::{ApiClient, Locator, StaticLocator};
use beacon_core::{merge, DetectionEvent, GeoFix, MatchRecord, Source};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod config;
mod live;
mod view;

use config::Config;
use live::{LiveCapture, LiveConfig, LiveEvent};

#[derive(Parser)]
#[command(name = "beacon", about = "Beacon face recognition console")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream the camera and submit frames for live matching
    Live {
        /// Stop automatically after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },
    /// Submit an image file for matching
    Image { path: PathBuf },
    /// Submit a video file for matching
    Video { path: PathBuf },
    /// Show the aggregated detection history
    History,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let client = ApiClient::new(&config.api_url)?;

    match cli.command {
        Commands::Live { duration } => run_live(&config, client, duration).await,
        Commands::Image { path } => run_upload(&client, Source::Image, &path, config.location).await,
        Commands::Video { path } => run_upload(&client, Source::Video, &path, config.location).await,
        Commands::History => run_history(&client).await,
    }
}

/// Stream the camera, folding live matches into the history-seeded board.
async fn run_live(config: &Config, client: ApiClient, duration: Option<u64>) -> Result<()> {
    let mut records = seed_from_history(&client).await;

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let locator = config
        .location
        .map(|fix| Arc::new(StaticLocator::new(fix)) as Arc<dyn Locator>);
    let live_config = LiveConfig {
        tick: config.tick,
        inflight_limit: config.inflight_limit,
    };
    let mut capture = LiveCapture::new(
        live_config,
        UvcCamera::new(&config.camera_device),
        Arc::new(client),
        locator,
        events_tx,
    );

    capture.start().await;
    if !capture.is_streaming() {
        let reason = match events_rx.try_recv() {
            Ok(LiveEvent::Error(msg)) => msg,
            _ => "camera unavailable".to_string(),
        };
        anyhow::bail!(reason);
    }

    println!("Streaming from {}. Press Ctrl-C to stop.", config.camera_device);
    let stop_at = duration.map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = deadline(stop_at), if stop_at.is_some() => break,
            event = events_rx.recv() => {
                let Some(event) = event else { break };
                records = render_event(event, records);
            }
        }
    }

    capture.stop();
    println!();
    view::print_match_table(&records);
    Ok(())
}

async fn deadline(stop_at: Option<tokio::time::Instant>) {
    match stop_at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn render_event(event: LiveEvent, records: Vec<MatchRecord>) -> Vec<MatchRecord> {
    match event {
        LiveEvent::Flash(_) => {
            println!("*** match ***");
            records
        }
        LiveEvent::Info(msg) => {
            println!("{msg}");
            records
        }
        LiveEvent::Error(msg) => {
            eprintln!("error: {msg}");
            records
        }
        LiveEvent::Match(event) => {
            let name = event.name.clone();
            let merged = merge(&records, &[event]);
            if let Some(record) = merged.iter().find(|r| r.name == name) {
                println!(
                    "  {}: confidence {:.1}, seen {}x",
                    record.name, record.confidence, record.count
                );
            }
            merged
        }
    }
}

/// Upload a media file and print whatever matched.
async fn run_upload(
    client: &ApiClient,
    source: Source,
    path: &Path,
    location: Option<GeoFix>,
) -> Result<()> {
    let raw = match source {
        Source::Video => client.upload_video(path, location).await?,
        _ => client.upload_image(path, location).await?,
    };
    if raw.is_empty() {
        println!("No matches found.");
        return Ok(());
    }

    let now = Utc::now();
    let events: Vec<DetectionEvent> = raw
        .into_iter()
        .map(|detection| detection.normalize(Some(source), now))
        .collect();
    view::print_match_table(&merge(&[], &events));
    Ok(())
}

/// Fetch and render the backend's aggregated detection history.
async fn run_history(client: &ApiClient) -> Result<()> {
    let raw = client.detection_history().await?;
    let now = Utc::now();
    let events: Vec<DetectionEvent> = raw
        .into_iter()
        .map(|detection| detection.normalize(None, now))
        .collect();
    view::print_match_table(&merge(&[], &events));
    Ok(())
}

/// Seed the live board from backend history; a cold backend is not fatal.
async fn seed_from_history(client: &ApiClient) -> Vec<MatchRecord> {
    match client.detection_history().await {
        Ok(raw) => {
            let now = Utc::now();
            let events: Vec<DetectionEvent> = raw
                .into_iter()
                .map(|detection| detection.normalize(None, now))
                .collect();
            merge(&[], &events)
        }
        Err(e) => {
            tracing::warn!(error = %e, "detection history unavailable; starting empty");
            Vec::new()
        }
    }
}
