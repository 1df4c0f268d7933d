use crate::{
    CoreResult, PermissionGateway, SessionError,
    audio::{AudioDriver, ClipRef, Playback, Recording, RecordingPreset},
};

use std::{
    panic::Location,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use error_location::ErrorLocation;
use tokio::{
    sync::{Mutex, mpsc, oneshot},
    task::JoinHandle,
    time,
};
use tracing::{debug, info, instrument, warn};

/// Publicly observable session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No clip, no live handles.
    Idle,
    /// A capture handle is live.
    Recording,
    /// A finished clip is available, nothing is playing.
    Stopped,
    /// A playback handle is live and running.
    Playing,
    /// A playback handle is live but paused.
    Paused,
}

/// Events emitted by the session outside the call/return flow.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Playback reached the natural end of the audio. Emitted exactly once
    /// per playback; the session is already back in `Stopped` when this is
    /// delivered.
    PlaybackFinished {
        /// The clip whose playback finished.
        clip: ClipRef,
    },
}

/// Session tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Capture preset handed to the driver on every recording.
    pub preset: RecordingPreset,
    /// Elapsed-timer tick. One second in production; tests shrink it.
    pub timer_tick: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            preset: RecordingPreset::default(),
            timer_tick: Duration::from_secs(1),
        }
    }
}

/// Tagged session state. The capture and playback handles live inside their
/// variants, so holding both at once is unrepresentable.
enum State {
    Idle,
    Recording { handle: Box<dyn Recording> },
    Stopped { clip: ClipRef },
    Playing { handle: Box<dyn Playback>, clip: ClipRef },
    Paused { handle: Box<dyn Playback>, clip: ClipRef },
}

impl State {
    fn phase(&self) -> SessionPhase {
        match self {
            State::Idle => SessionPhase::Idle,
            State::Recording { .. } => SessionPhase::Recording,
            State::Stopped { .. } => SessionPhase::Stopped,
            State::Playing { .. } => SessionPhase::Playing,
            State::Paused { .. } => SessionPhase::Paused,
        }
    }

    fn clip(&self) -> Option<&ClipRef> {
        match self {
            State::Stopped { clip }
            | State::Playing { clip, .. }
            | State::Paused { clip, .. } => Some(clip),
            State::Idle | State::Recording { .. } => None,
        }
    }
}

struct Inner {
    state: State,
    timer: Option<JoinHandle<()>>,
    watcher: Option<JoinHandle<()>>,
    /// Bumped on every playback start; late completion signals from a
    /// superseded playback compare unequal and are dropped.
    generation: u64,
}

/// Owner of the single capture handle and the single playback handle.
///
/// All operations serialize on one internal lock, so handle replacement is
/// sequential: the old handle is always released before a new one is
/// acquired. Failures leave the machine in its pre-call state except where a
/// method documents otherwise.
///
/// Call [`AudioSession::cleanup`] on teardown; dropping the session without
/// it leaves the native handles to their own `Drop` and aborts nothing.
pub struct AudioSession {
    driver: Arc<dyn AudioDriver>,
    permissions: PermissionGateway,
    inner: Arc<Mutex<Inner>>,
    /// Whole seconds spent in the current Recording/Playing phase.
    elapsed: Arc<AtomicU64>,
    events: mpsc::Sender<SessionEvent>,
    config: SessionConfig,
}

impl AudioSession {
    /// Create a session with the default config (1 s timer tick, high
    /// quality preset).
    pub fn new(
        driver: Arc<dyn AudioDriver>,
        permissions: PermissionGateway,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self::with_config(driver, permissions, events, SessionConfig::default())
    }

    /// Create a session with an explicit config.
    pub fn with_config(
        driver: Arc<dyn AudioDriver>,
        permissions: PermissionGateway,
        events: mpsc::Sender<SessionEvent>,
        config: SessionConfig,
    ) -> Self {
        Self {
            driver,
            permissions,
            inner: Arc::new(Mutex::new(Inner {
                state: State::Idle,
                timer: None,
                watcher: None,
                generation: 0,
            })),
            elapsed: Arc::new(AtomicU64::new(0)),
            events,
            config,
        }
    }

    /// Start capturing from the microphone.
    ///
    /// Allowed from `Idle` and `Stopped`; prompts for permission when the
    /// grant is not already in place and fails with
    /// [`SessionError::PermissionDenied`] if it stays withheld. The previous
    /// clip is kept until the new capture handle is confirmed, so a failed
    /// start leaves the old clip playable. On success the old clip is gone
    /// and the elapsed timer restarts from zero.
    #[instrument(skip(self))]
    pub async fn start_recording(&self) -> CoreResult<()> {
        let mut inner = self.inner.lock().await;

        match inner.state.phase() {
            SessionPhase::Idle | SessionPhase::Stopped => {}
            phase => {
                return Err(SessionError::SessionBusy {
                    phase,
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }

        let mut status = self.permissions.check_status().await;
        if !status.is_granted() {
            status = self.permissions.request_permission().await;
        }
        if !status.is_granted() {
            return Err(SessionError::PermissionDenied {
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let handle = self.driver.create_recording(&self.config.preset).await?;

        inner.state = State::Recording { handle };
        self.start_timer(&mut inner);

        info!("Recording started");
        Ok(())
    }

    /// Finalize the capture and yield the new clip.
    ///
    /// Fails with [`SessionError::NoActiveRecording`] outside `Recording`.
    /// If finalizing fails the capture handle stays live and the session
    /// remains in `Recording` with the timer running.
    #[instrument(skip(self))]
    pub async fn stop_recording(&self) -> CoreResult<ClipRef> {
        let mut inner = self.inner.lock().await;

        let State::Recording { handle } = &mut inner.state else {
            return Err(SessionError::NoActiveRecording {
                location: ErrorLocation::from(Location::caller()),
            });
        };

        let clip = handle.stop_and_unload().await?;

        self.stop_timer(&mut inner);
        inner.state = State::Stopped { clip: clip.clone() };

        info!(clip = %clip, "Recording stopped");
        Ok(clip)
    }

    /// Start playing `clip`, or the session's current clip when `None`.
    ///
    /// Allowed from every phase except `Recording`. Fails with
    /// [`SessionError::NoClipAvailable`] when no clip is given and none is
    /// held. A previously loaded handle (paused or still playing) is released
    /// before the new one is loaded; playback always restarts from the
    /// beginning. If acquiring the new handle fails after an old one was
    /// already released, the session lands in `Stopped` rather than a
    /// handle-less `Paused`/`Playing`.
    #[instrument(skip(self, clip))]
    pub async fn play(&self, clip: Option<ClipRef>) -> CoreResult<()> {
        let mut inner = self.inner.lock().await;

        if let SessionPhase::Recording = inner.state.phase() {
            return Err(SessionError::SessionBusy {
                phase: SessionPhase::Recording,
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let target = match clip {
            Some(clip) => clip,
            None => inner
                .state
                .clip()
                .cloned()
                .ok_or(SessionError::NoClipAvailable {
                    location: ErrorLocation::from(Location::caller()),
                })?,
        };

        // Release the previous handle before acquiring the new one; `restore`
        // is where a failed acquisition lands.
        let restore = match std::mem::replace(&mut inner.state, State::Idle) {
            State::Paused { mut handle, clip } | State::Playing { mut handle, clip } => {
                if let Err(e) = handle.stop().await {
                    warn!(error = %e, "Stopping superseded playback failed");
                }
                if let Err(e) = handle.unload().await {
                    warn!(error = %e, "Releasing superseded playback failed");
                }
                State::Stopped { clip }
            }
            other => other,
        };

        let mut handle = match self.driver.create_sound(&target).await {
            Ok(handle) => handle,
            Err(e) => {
                inner.state = restore;
                return Err(e);
            }
        };

        let finished = handle.take_finished();

        if let Err(e) = handle.play().await {
            // Loaded but refused to start; release it before reporting.
            if let Err(unload_err) = handle.unload().await {
                warn!(error = %unload_err, "Releasing failed playback");
            }
            inner.state = restore;
            return Err(e);
        }

        inner.generation = inner.generation.wrapping_add(1);
        let generation = inner.generation;
        inner.state = State::Playing {
            handle,
            clip: target.clone(),
        };
        self.start_timer(&mut inner);
        self.spawn_watcher(&mut inner, generation, finished);

        info!(clip = %target, "Playback started");
        Ok(())
    }

    /// Pause the running playback, keeping the handle loaded.
    ///
    /// Fails with [`SessionError::NotPlaying`] outside `Playing`.
    #[instrument(skip(self))]
    pub async fn pause(&self) -> CoreResult<()> {
        let mut inner = self.inner.lock().await;

        let State::Playing { handle, .. } = &mut inner.state else {
            return Err(SessionError::NotPlaying {
                location: ErrorLocation::from(Location::caller()),
            });
        };

        handle.pause().await?;

        self.stop_timer(&mut inner);
        if let State::Playing { handle, clip } = std::mem::replace(&mut inner.state, State::Idle) {
            inner.state = State::Paused { handle, clip };
        }

        info!("Playback paused");
        Ok(())
    }

    /// Stop and release the playback handle.
    ///
    /// From `Playing` or `Paused` the session moves to `Stopped`; from every
    /// other phase this is a successful no-op. Release errors are logged and
    /// swallowed; the handle is dropped either way, so the machine never
    /// keeps a half-released handle.
    #[instrument(skip(self))]
    pub async fn stop_playback(&self) -> CoreResult<()> {
        let mut inner = self.inner.lock().await;

        match inner.state.phase() {
            SessionPhase::Playing | SessionPhase::Paused => {}
            _ => return Ok(()),
        }

        self.stop_timer(&mut inner);
        match std::mem::replace(&mut inner.state, State::Idle) {
            State::Playing { mut handle, clip } | State::Paused { mut handle, clip } => {
                if let Err(e) = handle.stop().await {
                    warn!(error = %e, "Stopping playback failed");
                }
                if let Err(e) = handle.unload().await {
                    warn!(error = %e, "Releasing playback failed");
                }
                inner.state = State::Stopped { clip };
            }
            other => inner.state = other,
        }

        info!("Playback stopped");
        Ok(())
    }

    /// Forcibly release both handles and return to `Idle`.
    ///
    /// Used on teardown. Never fails; release errors are logged and
    /// swallowed.
    #[instrument(skip(self))]
    pub async fn cleanup(&self) {
        let mut inner = self.inner.lock().await;

        self.stop_timer(&mut inner);
        if let Some(watcher) = inner.watcher.take() {
            watcher.abort();
        }
        inner.generation = inner.generation.wrapping_add(1);

        match std::mem::replace(&mut inner.state, State::Idle) {
            State::Recording { mut handle } => {
                if let Err(e) = handle.stop_and_unload().await {
                    warn!(error = %e, "Releasing recording during cleanup failed");
                }
            }
            State::Playing { mut handle, .. } | State::Paused { mut handle, .. } => {
                if let Err(e) = handle.unload().await {
                    warn!(error = %e, "Releasing playback during cleanup failed");
                }
            }
            State::Idle | State::Stopped { .. } => {}
        }

        info!("Session cleaned up");
    }

    /// Current phase.
    pub async fn phase(&self) -> SessionPhase {
        self.inner.lock().await.state.phase()
    }

    /// The clip most recently produced or played, if any.
    pub async fn clip(&self) -> Option<ClipRef> {
        self.inner.lock().await.state.clip().cloned()
    }

    /// Whole seconds spent in the current Recording/Playing phase. Zero
    /// outside those phases.
    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed.load(Ordering::Relaxed)
    }

    /// Reset the counter to zero and start a fresh periodic tick task.
    fn start_timer(&self, inner: &mut Inner) {
        self.stop_timer(inner);

        let elapsed = Arc::clone(&self.elapsed);
        let tick = self.config.timer_tick;
        inner.timer = Some(tokio::spawn(async move {
            let mut interval = time::interval(tick);
            // The first tick of a tokio interval completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                elapsed.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }

    /// Abort the tick task and reset the counter. Runs under the state lock,
    /// so no tick lands after a phase transition.
    fn stop_timer(&self, inner: &mut Inner) {
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        self.elapsed.store(0, Ordering::Relaxed);
    }

    /// Arm the natural-end watcher for the playback that was just started.
    ///
    /// The watcher re-checks generation and phase under the lock before
    /// acting, so a superseded playback can never emit a completion event.
    fn spawn_watcher(
        &self,
        inner: &mut Inner,
        generation: u64,
        finished: Option<oneshot::Receiver<()>>,
    ) {
        if let Some(prev) = inner.watcher.take() {
            prev.abort();
        }

        let Some(finished) = finished else {
            warn!("Playback handle exposes no finished signal; natural end will not be observed");
            return;
        };

        let inner_ref = Arc::clone(&self.inner);
        let elapsed = Arc::clone(&self.elapsed);
        let events = self.events.clone();

        inner.watcher = Some(tokio::spawn(async move {
            if finished.await.is_err() {
                // Sender dropped: the handle was released before natural end.
                return;
            }

            let event = {
                let mut inner = inner_ref.lock().await;
                if inner.generation != generation {
                    debug!("Stale playback completion ignored");
                    return;
                }
                match std::mem::replace(&mut inner.state, State::Idle) {
                    State::Playing { mut handle, clip } => {
                        if let Some(timer) = inner.timer.take() {
                            timer.abort();
                        }
                        elapsed.store(0, Ordering::Relaxed);
                        if let Err(e) = handle.unload().await {
                            warn!(error = %e, "Releasing finished playback failed");
                        }
                        inner.state = State::Stopped { clip: clip.clone() };
                        SessionEvent::PlaybackFinished { clip }
                    }
                    other => {
                        inner.state = other;
                        return;
                    }
                }
            };

            // Emit outside the lock; a slow consumer must not wedge the
            // session.
            let _ = events.send(event).await;
        }));
    }
}
