use crate::audio::SessionPhase;

use error_location::ErrorLocation;
use thiserror::Error;

/// Audio session errors with source location tracking.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Microphone permission was not granted after prompting.
    #[error("Microphone permission denied {location}")]
    PermissionDenied {
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// A recording operation was requested while no recording is active.
    #[error("No active recording {location}")]
    NoActiveRecording {
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// Playback was requested but no clip has been recorded yet.
    #[error("No clip available {location}")]
    NoClipAvailable {
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// A playback operation was requested while nothing is playing.
    #[error("Not playing {location}")]
    NotPlaying {
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// The session cannot accept the operation in its current phase.
    #[error("Session busy ({phase:?}) {location}")]
    SessionBusy {
        /// Phase the session was in when the operation was rejected.
        phase: SessionPhase,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// Capture/playback subsystem failure, message passed through.
    #[error("Audio device error: {reason} {location}")]
    DeviceError {
        /// Description of the device error.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },
}

/// Result type alias using [`SessionError`].
pub type Result<T> = std::result::Result<T, SessionError>;
