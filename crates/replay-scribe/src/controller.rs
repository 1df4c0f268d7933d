use crate::{AppError, AppResult, Transcriber};

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use replay_scribe_core::{AudioSession, ClipRef, SessionPhase};
use tracing::{debug, info, instrument, warn};

/// Transcript lifecycle for the clip most recently played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptPhase {
    /// Nothing has been played yet.
    Idle,
    /// A transcription request is in flight.
    Loading,
    /// `text` holds the result.
    Done,
    /// `error` holds the failure message.
    Error,
}

/// Snapshot of the transcription side-channel.
#[derive(Debug, Clone)]
pub struct TranscriptState {
    /// Where the request currently stands.
    pub phase: TranscriptPhase,
    /// Transcribed text, empty unless `phase` is `Done`.
    pub text: String,
    /// Failure message, `None` unless `phase` is `Error`.
    pub error: Option<String>,
}

impl TranscriptState {
    fn idle() -> Self {
        Self {
            phase: TranscriptPhase::Idle,
            text: String::new(),
            error: None,
        }
    }

    fn loading() -> Self {
        Self {
            phase: TranscriptPhase::Loading,
            text: String::new(),
            error: None,
        }
    }
}

/// Glue between the audio session and the transcription side-channel.
///
/// Owns no audio handles itself. Every successful `play` resets the
/// transcript to `Loading` and fires a detached transcription task that runs
/// concurrently with playback; at most one outstanding request matters at a
/// time: results carrying a superseded request token are discarded
/// (last-request-wins). Transcription failures only ever surface through the
/// transcript state; they never touch playback.
pub struct SessionController {
    session: AudioSession,
    transcriber: Arc<dyn Transcriber>,
    transcript: Arc<Mutex<TranscriptState>>,
    request_seq: Arc<AtomicU64>,
}

impl SessionController {
    /// Wire a session to a transcriber.
    pub fn new(session: AudioSession, transcriber: Arc<dyn Transcriber>) -> Self {
        Self {
            session,
            transcriber,
            transcript: Arc::new(Mutex::new(TranscriptState::idle())),
            request_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start recording. Delegates to the session.
    pub async fn start_recording(&self) -> AppResult<()> {
        Ok(self.session.start_recording().await?)
    }

    /// Stop recording and yield the finished clip.
    pub async fn stop_recording(&self) -> AppResult<ClipRef> {
        Ok(self.session.stop_recording().await?)
    }

    /// Start playback and kick off transcription of the clip being played.
    ///
    /// The transcription task is detached: it neither blocks nor delays
    /// playback, and whichever of playback-end and transcription-result
    /// arrives first is reported independently.
    #[instrument(skip(self, clip))]
    pub async fn play(&self, clip: Option<ClipRef>) -> AppResult<()> {
        self.session.play(clip).await?;

        let Some(clip) = self.session.clip().await else {
            // play() only succeeds with a clip loaded; nothing to transcribe.
            warn!("Playback started without a clip reference");
            return Ok(());
        };

        let token = self.request_seq.fetch_add(1, Ordering::SeqCst) + 1;
        *lock_transcript(&self.transcript) = TranscriptState::loading();

        let transcriber = Arc::clone(&self.transcriber);
        let transcript = Arc::clone(&self.transcript);
        let request_seq = Arc::clone(&self.request_seq);

        tokio::spawn(async move {
            let result = transcriber.transcribe(&clip).await;

            // Token check and state update under one lock, so a stale result
            // can never overwrite a newer request's state.
            let mut state = lock_transcript(&transcript);
            if request_seq.load(Ordering::SeqCst) != token {
                debug!(token, "Discarding stale transcription result");
                return;
            }

            match result {
                Ok(text) => {
                    info!(clip = %clip, text_len = text.len(), "Transcript ready");
                    *state = TranscriptState {
                        phase: TranscriptPhase::Done,
                        text,
                        error: None,
                    };
                }
                Err(e) => {
                    warn!(clip = %clip, error = %e, "Transcription failed");
                    let message = match e {
                        AppError::TranscriptionFailed { message, .. } => message,
                        other => other.to_string(),
                    };
                    *state = TranscriptState {
                        phase: TranscriptPhase::Error,
                        text: String::new(),
                        error: Some(message),
                    };
                }
            }
        });

        Ok(())
    }

    /// Pause playback. Delegates to the session.
    pub async fn pause(&self) -> AppResult<()> {
        Ok(self.session.pause().await?)
    }

    /// Stop playback. Delegates to the session; idempotent.
    pub async fn stop_playback(&self) -> AppResult<()> {
        Ok(self.session.stop_playback().await?)
    }

    /// Release everything. Delegates to the session; never fails.
    pub async fn cleanup(&self) {
        self.session.cleanup().await;
    }

    /// Current session phase.
    pub async fn phase(&self) -> SessionPhase {
        self.session.phase().await
    }

    /// The session's current clip, if any.
    pub async fn clip(&self) -> Option<ClipRef> {
        self.session.clip().await
    }

    /// Whole seconds spent in the current Recording/Playing phase.
    pub fn elapsed_secs(&self) -> u64 {
        self.session.elapsed_secs()
    }

    /// Snapshot of the transcription side-channel.
    pub fn transcript(&self) -> TranscriptState {
        lock_transcript(&self.transcript).clone()
    }
}

fn lock_transcript(
    transcript: &Mutex<TranscriptState>,
) -> std::sync::MutexGuard<'_, TranscriptState> {
    // Recover from lock poison; the snapshot data stays valid.
    transcript.lock().unwrap_or_else(|e| e.into_inner())
}
