//! Hand-rolled fakes for the external collaborator boundaries.

use crate::{
    AudioDriver, AudioSession, ClipRef, CoreResult, PermissionBackend, PermissionGateway,
    PermissionState, Playback, Recording, RecordingPreset, SessionConfig, SessionError,
    SessionEvent,
};

use std::{
    collections::VecDeque,
    panic::Location,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use error_location::ErrorLocation;
use tokio::sync::{mpsc, oneshot};

/// The boundary failure injected by the fakes.
pub(crate) fn backend_error(reason: &str) -> SessionError {
    SessionError::DeviceError {
        reason: reason.to_string(),
        location: ErrorLocation::from(Location::caller()),
    }
}

fn recover<T>(guard: std::sync::LockResult<std::sync::MutexGuard<'_, T>>) -> std::sync::MutexGuard<'_, T> {
    guard.unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

/// Scripted permission backend. Scripted results are consumed in order;
/// once exhausted the fallback state is returned.
pub(crate) struct FakePermissions {
    fallback: PermissionState,
    status_script: Mutex<VecDeque<CoreResult<PermissionState>>>,
    request_script: Mutex<VecDeque<CoreResult<PermissionState>>>,
    pub(crate) request_calls: AtomicUsize,
}

impl FakePermissions {
    pub(crate) fn always(fallback: PermissionState) -> Self {
        Self {
            fallback,
            status_script: Mutex::new(VecDeque::new()),
            request_script: Mutex::new(VecDeque::new()),
            request_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn push_status(&self, result: CoreResult<PermissionState>) {
        recover(self.status_script.lock()).push_back(result);
    }

    pub(crate) fn push_request(&self, result: CoreResult<PermissionState>) {
        recover(self.request_script.lock()).push_back(result);
    }
}

#[async_trait]
impl PermissionBackend for FakePermissions {
    async fn request_permissions(&self) -> CoreResult<PermissionState> {
        self.request_calls.fetch_add(1, Ordering::SeqCst);
        recover(self.request_script.lock())
            .pop_front()
            .unwrap_or(Ok(self.fallback))
    }

    async fn get_permissions(&self) -> CoreResult<PermissionState> {
        recover(self.status_script.lock())
            .pop_front()
            .unwrap_or(Ok(self.fallback))
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Live-resource accounting shared between driver and handles. Handles
/// decrement on drop, so "live" means the handle object still exists.
#[derive(Default)]
pub(crate) struct DriverStats {
    pub(crate) live_recordings: AtomicUsize,
    pub(crate) live_playbacks: AtomicUsize,
    pub(crate) recordings_created: AtomicUsize,
    pub(crate) sounds_created: AtomicUsize,
}

/// In-memory driver with one-shot failure injection and a test-triggered
/// natural-end signal.
pub(crate) struct FakeDriver {
    pub(crate) stats: Arc<DriverStats>,
    fail_next_recording: AtomicBool,
    fail_next_finalize: AtomicBool,
    fail_next_sound: AtomicBool,
    fail_next_play: AtomicBool,
    next_clip_uri: Mutex<Option<String>>,
    finish_trigger: Mutex<Option<oneshot::Sender<()>>>,
    clip_counter: AtomicUsize,
}

impl FakeDriver {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            stats: Arc::new(DriverStats::default()),
            fail_next_recording: AtomicBool::new(false),
            fail_next_finalize: AtomicBool::new(false),
            fail_next_sound: AtomicBool::new(false),
            fail_next_play: AtomicBool::new(false),
            next_clip_uri: Mutex::new(None),
            finish_trigger: Mutex::new(None),
            clip_counter: AtomicUsize::new(0),
        })
    }

    pub(crate) fn fail_next_recording(&self) {
        self.fail_next_recording.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_next_finalize(&self) {
        self.fail_next_finalize.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_next_sound(&self) {
        self.fail_next_sound.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_next_play(&self) {
        self.fail_next_play.store(true, Ordering::SeqCst);
    }

    /// Fix the URI the next finalized recording reports.
    pub(crate) fn set_next_clip_uri(&self, uri: &str) {
        *recover(self.next_clip_uri.lock()) = Some(uri.to_string());
    }

    /// Simulate the currently loaded sound reaching its natural end.
    pub(crate) fn fire_finished(&self) -> bool {
        match recover(self.finish_trigger.lock()).take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl AudioDriver for FakeDriver {
    async fn create_recording(&self, _preset: &RecordingPreset) -> CoreResult<Box<dyn Recording>> {
        if self.fail_next_recording.swap(false, Ordering::SeqCst) {
            return Err(backend_error("device busy"));
        }

        let n = self.clip_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let uri = recover(self.next_clip_uri.lock())
            .take()
            .unwrap_or_else(|| format!("file:///tmp/clip-{}.m4a", n));

        self.stats.live_recordings.fetch_add(1, Ordering::SeqCst);
        self.stats.recordings_created.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(FakeRecording {
            stats: Arc::clone(&self.stats),
            uri,
            fail_finalize: self.fail_next_finalize.swap(false, Ordering::SeqCst),
        }))
    }

    async fn create_sound(&self, _clip: &ClipRef) -> CoreResult<Box<dyn Playback>> {
        if self.fail_next_sound.swap(false, Ordering::SeqCst) {
            return Err(backend_error("file not readable"));
        }

        let (finished_tx, finished_rx) = oneshot::channel();
        *recover(self.finish_trigger.lock()) = Some(finished_tx);

        self.stats.live_playbacks.fetch_add(1, Ordering::SeqCst);
        self.stats.sounds_created.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(FakePlayback {
            stats: Arc::clone(&self.stats),
            fail_play: self.fail_next_play.swap(false, Ordering::SeqCst),
            finished_rx: Some(finished_rx),
        }))
    }
}

struct FakeRecording {
    stats: Arc<DriverStats>,
    uri: String,
    fail_finalize: bool,
}

#[async_trait]
impl Recording for FakeRecording {
    async fn stop_and_unload(&mut self) -> CoreResult<ClipRef> {
        if self.fail_finalize {
            // One-shot: a retry succeeds, matching a transient I/O failure.
            self.fail_finalize = false;
            return Err(backend_error("flush failed"));
        }
        Ok(ClipRef::new(self.uri.clone()))
    }
}

impl Drop for FakeRecording {
    fn drop(&mut self) {
        self.stats.live_recordings.fetch_sub(1, Ordering::SeqCst);
    }
}

struct FakePlayback {
    stats: Arc<DriverStats>,
    fail_play: bool,
    finished_rx: Option<oneshot::Receiver<()>>,
}

#[async_trait]
impl Playback for FakePlayback {
    async fn play(&mut self) -> CoreResult<()> {
        if self.fail_play {
            return Err(backend_error("output device gone"));
        }
        Ok(())
    }

    async fn pause(&mut self) -> CoreResult<()> {
        Ok(())
    }

    async fn stop(&mut self) -> CoreResult<()> {
        Ok(())
    }

    async fn unload(&mut self) -> CoreResult<()> {
        Ok(())
    }

    fn take_finished(&mut self) -> Option<oneshot::Receiver<()>> {
        self.finished_rx.take()
    }
}

impl Drop for FakePlayback {
    fn drop(&mut self) {
        self.stats.live_playbacks.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Session wiring
// ---------------------------------------------------------------------------

/// Fast timer tick for tests; production uses one second.
pub(crate) const TEST_TICK: Duration = Duration::from_millis(20);

/// Session over the given fakes with a fast timer.
pub(crate) fn new_session(
    driver: Arc<FakeDriver>,
    permissions: Arc<FakePermissions>,
) -> (AudioSession, mpsc::Receiver<SessionEvent>) {
    let (events_tx, events_rx) = mpsc::channel(16);
    let session = AudioSession::with_config(
        driver,
        PermissionGateway::new(permissions),
        events_tx,
        SessionConfig {
            timer_tick: TEST_TICK,
            ..SessionConfig::default()
        },
    );
    (session, events_rx)
}

/// Session with permissions already granted, the common case.
pub(crate) fn granted_session() -> (AudioSession, Arc<FakeDriver>, mpsc::Receiver<SessionEvent>) {
    let driver = FakeDriver::new();
    let permissions = Arc::new(FakePermissions::always(PermissionState::Granted));
    let (session, events_rx) = new_session(Arc::clone(&driver), permissions);
    (session, driver, events_rx)
}
