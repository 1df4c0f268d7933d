//! Replay-Scribe: record a voice clip, replay it, read the transcript.

mod config;
mod controller;
mod error;
mod transcription;

pub(crate) use {
    controller::{SessionController, TranscriptPhase, TranscriptState},
    error::{AppError, Result as AppResult},
    transcription::{Transcriber, WhisperClient},
};

use crate::config::Config;

use std::sync::Arc;

use replay_scribe_core::{
    AudioSession, CpalDriver, PermissionGateway, SessionConfig, SessionEvent, SessionPhase,
    StaticPermissions,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::error;

/// Application entry point.
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("replay_scribe=debug")
        .init();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load config: {:?}", e);
            std::process::exit(1);
        }
    };

    let driver = match CpalDriver::new() {
        Ok(d) => Arc::new(d),
        Err(e) => {
            error!("Failed to initialize audio driver: {:?}", e);
            std::process::exit(1);
        }
    };

    let client = match WhisperClient::from_config(&config.whisper) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Transcription client unavailable: {:?}", e);
            std::process::exit(1);
        }
    };

    // Desktop hosts have no microphone permission broker.
    let permissions = PermissionGateway::new(Arc::new(StaticPermissions::granted()));

    let (events_tx, events_rx) = mpsc::channel(16);
    let session = AudioSession::with_config(
        driver,
        permissions,
        events_tx,
        SessionConfig {
            preset: config.audio.preset(),
            ..SessionConfig::default()
        },
    );

    let controller = SessionController::new(session, client);

    if let Err(e) = run_shell(&controller, events_rx).await {
        error!(error = ?e, "Shell error");
    }

    controller.cleanup().await;
}

/// Minimal interactive shell over the session.
///
/// Stands in for the original UI: one command per line on stdin, session
/// events interleaved as they arrive.
async fn run_shell(
    controller: &SessionController,
    mut events: mpsc::Receiver<SessionEvent>,
) -> AppResult<()> {
    println!("replay-scribe");
    println!("  r  start/stop recording    p  play clip");
    println!("  a  pause playback          s  stop playback");
    println!("  t  show transcript         q  quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_command(controller, line.trim()).await {
                    break;
                }
            }

            Some(event) = events.recv() => {
                let SessionEvent::PlaybackFinished { clip } = event;
                println!("Playback finished: {clip}");
                print_transcript(&controller.transcript());
            }
        }
    }

    Ok(())
}

/// Execute one shell command; returns `false` to quit.
async fn handle_command(controller: &SessionController, command: &str) -> bool {
    match command {
        "r" => {
            if controller.phase().await == SessionPhase::Recording {
                match controller.stop_recording().await {
                    Ok(clip) => println!("Recorded {clip} ({}s)", controller.elapsed_secs()),
                    Err(e) => println!("Could not stop recording: {e}"),
                }
            } else {
                match controller.start_recording().await {
                    Ok(()) => println!("Recording... press r to stop"),
                    Err(e) => println!("Could not start recording: {e}"),
                }
            }
        }
        "p" => match controller.play(None).await {
            Ok(()) => println!("Playing... transcription requested"),
            Err(e) => println!("Could not play: {e}"),
        },
        "a" => match controller.pause().await {
            Ok(()) => println!("Paused"),
            Err(e) => println!("Could not pause: {e}"),
        },
        "s" => match controller.stop_playback().await {
            Ok(()) => println!("Stopped"),
            Err(e) => println!("Could not stop playback: {e}"),
        },
        "t" => print_transcript(&controller.transcript()),
        "q" => return false,
        "" => {}
        other => println!("Unknown command: {other}"),
    }
    true
}

fn print_transcript(transcript: &TranscriptState) {
    match transcript.phase {
        TranscriptPhase::Idle => println!("No transcript yet, play a clip first"),
        TranscriptPhase::Loading => println!("Transcribing..."),
        TranscriptPhase::Done => println!("Transcript: {}", transcript.text),
        TranscriptPhase::Error => println!(
            "Transcription failed: {}",
            transcript.error.as_deref().unwrap_or("unknown error")
        ),
    }
}
