//! Segue player (segue-player) - Main entry point
//!
//! Plays a list of audio files through the playback engine, logging every
//! transition. Output goes to the clocked (silent, real-time) sink unless the
//! `device-output` feature is enabled and `--audible` or `--device` is given.
//! Useful for exercising gaps, repeat modes and decode-ahead scheduling against
//! real files.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use segue_common::time::format_position;
use segue_common::{PlaybackState, PlayerEvent};
use segue_player::audio::SymphoniaPreparer;
use segue_player::playback::{
    AudioSink, ClockedSink, InMemoryGapStore, ListSequencer, PlaybackDelegate, PlayerCommand,
    PlayerComponents, RepeatMode, UnavailableTranscoder,
};
use segue_player::{PlayerConfig, Track};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for segue-player
#[derive(Parser, Debug)]
#[command(name = "segue-player")]
#[command(about = "Play audio files through the Segue transition engine")]
#[command(version)]
struct Args {
    /// Audio files to play, in order
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Configuration file (TOML)
    #[arg(short, long, env = "SEGUE_CONFIG")]
    config: Option<PathBuf>,

    /// Gap between tracks in seconds (overrides configuration)
    #[arg(short, long)]
    gap: Option<f64>,

    /// Repeat mode
    #[arg(short, long, value_enum, default_value_t = RepeatMode::Off)]
    repeat: RepeatMode,

    /// Print observer events to stdout as JSON lines
    #[arg(long)]
    json_events: bool,

    /// Play through the default audio output device
    #[cfg(feature = "device-output")]
    #[arg(long)]
    audible: bool,

    /// Play through the named audio output device (implies --audible)
    #[cfg(feature = "device-output")]
    #[arg(long)]
    device: Option<String>,
}

/// Device output when requested, otherwise the silent clocked sink
#[cfg_attr(not(feature = "device-output"), allow(unused_variables))]
fn output_sink(args: &Args) -> Result<Arc<dyn AudioSink>> {
    #[cfg(feature = "device-output")]
    if args.audible || args.device.is_some() {
        let sink = segue_player::playback::DeviceSink::open(args.device.clone())
            .context("Failed to open audio device")?;
        return Ok(Arc::new(sink));
    }
    Ok(Arc::new(ClockedSink::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        PlayerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(gap) = args.gap {
        config.gaps.gap_between_tracks_seconds = Some(gap);
        config.validate().context("Invalid --gap")?;
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.filter_directive().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Segue player with {} file(s)", args.files.len());

    let tracks: Vec<Track> = args.files.iter().map(|p| Track::new(p.clone())).collect();
    let mut sequencer = ListSequencer::new(tracks, args.repeat);
    let first = sequencer.begin().context("No tracks to play")?;

    let components = PlayerComponents {
        sink: output_sink(&args)?,
        preparer: Arc::new(SymphoniaPreparer::new(config.transcoding.clone())),
        transcoder: Arc::new(UnavailableTranscoder),
        gap_store: Arc::new(InMemoryGapStore::new()),
        sequencer: Box::new(sequencer),
    };
    let delegate = PlaybackDelegate::new(&config, components)
        .context("Failed to initialize playback engine")?;

    let events = delegate.subscribe();
    let (commands, command_rx) = mpsc::channel(32);
    let delegate_task = tokio::spawn(delegate.run(command_rx));
    let mut finished = tokio::spawn(watch_events(events, args.json_events));

    commands
        .send(PlayerCommand::Play(first))
        .await
        .context("Playback delegate exited early")?;

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = &mut finished => {
            info!("Playback finished");
        }
    }

    // The delegate may already be gone if it stopped on its own
    let _ = commands.send(PlayerCommand::Shutdown).await;
    delegate_task.await.context("Playback delegate panicked")?;
    finished.abort();

    info!("Shutdown complete");
    Ok(())
}

/// Log observer events until playback ends or a track fails
async fn watch_events(mut events: broadcast::Receiver<PlayerEvent>, json: bool) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event logger lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!(error = %e, "Failed to serialize event"),
            }
        }
        info!(event = event.event_type(), "{}", describe(&event));

        match event {
            PlayerEvent::TrackTransition {
                end_state: PlaybackState::NoTrack,
                ..
            }
            | PlayerEvent::TrackNotPlayed { .. }
            | PlayerEvent::TrackNotTranscoded { .. } => break,
            _ => {}
        }
    }
}

fn describe(event: &PlayerEvent) -> String {
    let name = |t: &Option<segue_common::TrackInfo>| {
        t.as_ref()
            .map_or_else(|| "-".to_string(), |t| t.display_name.clone())
    };

    match event {
        PlayerEvent::TrackTransition {
            begin_track,
            begin_state,
            end_track,
            end_state,
            gap_end_time,
            ..
        } => {
            let mut text = format!(
                "{} ({}) -> {} ({})",
                name(begin_track),
                begin_state,
                name(end_track),
                end_state
            );
            if let Some(gap_end) = gap_end_time {
                text.push_str(&format!(", gap ends {}", gap_end.format("%H:%M:%S")));
            }
            text
        }
        PlayerEvent::TrackNotPlayed { track, message, .. } => {
            format!("{} not played: {}", name(track), message)
        }
        PlayerEvent::TrackNotTranscoded { track, message, .. } => {
            format!("{} not transcoded: {}", track.display_name, message)
        }
        PlayerEvent::PlaybackCompleted { track, .. } => format!("{} completed", track.display_name),
        PlayerEvent::PlaybackStateChanged {
            old_state,
            new_state,
            ..
        } => format!("{} -> {}", old_state, new_state),
        PlayerEvent::LoopChanged {
            track,
            start_time,
            end_time,
            ..
        } => match (start_time, end_time) {
            (Some(start), Some(end)) => format!(
                "{} looping {}-{}",
                track.display_name,
                format_position(*start),
                format_position(*end)
            ),
            (Some(start), None) => {
                format!("{} loop from {}", track.display_name, format_position(*start))
            }
            _ => format!("{} loop removed", track.display_name),
        },
        PlayerEvent::TrackSeeked {
            track, position, ..
        } => format!("{} seeked to {}", track.display_name, format_position(*position)),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
