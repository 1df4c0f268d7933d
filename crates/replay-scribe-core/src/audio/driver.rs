//! Capture/playback subsystem boundary.
//!
//! The native audio stack is an external collaborator: the session only ever
//! talks to it through [`AudioDriver`] and the opaque handles it hands out.
//! Handles reference live native resources and must be explicitly released.

use crate::CoreResult;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

/// Immutable locator for a finished audio artifact.
///
/// A `file://` URI produced by finalizing a recording. Cheap to clone and
/// shared read-only once produced; a new recording replaces it wholesale.
#[derive(Clone, PartialEq, Eq)]
pub struct ClipRef(Arc<str>);

impl ClipRef {
    /// Wrap a URI string.
    pub fn new(uri: impl Into<String>) -> Self {
        Self(Arc::from(uri.into()))
    }

    /// The locator as a URI string.
    pub fn as_uri(&self) -> &str {
        &self.0
    }

    /// Filesystem path for `file://` locators, `None` otherwise.
    pub fn to_file_path(&self) -> Option<PathBuf> {
        self.0.strip_prefix("file://").map(PathBuf::from)
    }
}

impl fmt::Debug for ClipRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClipRef").field(&self.0).finish()
    }
}

impl fmt::Display for ClipRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capture format, fixed for the lifetime of a recording.
///
/// The session never converts audio; whatever the driver captures under this
/// preset is what the clip contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingPreset {
    /// Requested sample rate in Hz.
    pub sample_rate: u32,
    /// Requested channel count (1 = mono).
    pub channels: u16,
}

impl RecordingPreset {
    /// 44.1 kHz mono, the preset used for voice clips.
    pub fn high_quality() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
        }
    }
}

impl Default for RecordingPreset {
    fn default() -> Self {
        Self::high_quality()
    }
}

/// An active capture operation.
///
/// At most one exists at a time; the session enforces this. Finalizing yields
/// the clip locator and releases the native resource.
#[async_trait]
pub trait Recording: Send {
    /// Stop capturing, flush the artifact, release the native handle.
    ///
    /// On failure the handle stays live and may be finalized again.
    async fn stop_and_unload(&mut self) -> CoreResult<ClipRef>;
}

/// An active playback operation, bound to exactly one clip.
#[async_trait]
pub trait Playback: Send {
    /// Start or resume playing.
    async fn play(&mut self) -> CoreResult<()>;

    /// Pause without releasing the native handle.
    async fn pause(&mut self) -> CoreResult<()>;

    /// Stop playing; the handle stays loaded until [`Self::unload`].
    async fn stop(&mut self) -> CoreResult<()>;

    /// Release the native handle.
    async fn unload(&mut self) -> CoreResult<()>;

    /// Single-fire signal for the natural end of the audio.
    ///
    /// Returns `Some` exactly once; the receiver resolves when the last
    /// sample has played. Dropping the handle drops the sender, so a released
    /// playback never signals completion.
    fn take_finished(&mut self) -> Option<oneshot::Receiver<()>>;
}

/// Factory boundary of the capture/playback subsystem.
#[async_trait]
pub trait AudioDriver: Send + Sync {
    /// Open the capture device and start recording under `preset`.
    async fn create_recording(&self, preset: &RecordingPreset) -> CoreResult<Box<dyn Recording>>;

    /// Load `clip` for playback. Does not start playing.
    async fn create_sound(&self, clip: &ClipRef) -> CoreResult<Box<dyn Playback>>;
}
