//! Replay-Scribe Core Library
//!
//! Microphone capture, clip playback and the session state machine that owns
//! both: at most one live recording handle, at most one live playback handle,
//! never both. Permission gating and a CPAL-backed device driver included.
//!
//! # Example
//!
//! ```no_run
//! use replay_scribe_core::{
//!     AudioSession, CoreResult, CpalDriver, PermissionGateway, SessionEvent, StaticPermissions,
//! };
//!
//! use std::{sync::Arc, time::Duration};
//!
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> CoreResult<()> {
//!     let (events_tx, _events_rx) = mpsc::channel::<SessionEvent>(16);
//!     let driver = Arc::new(CpalDriver::new()?);
//!     let permissions = PermissionGateway::new(Arc::new(StaticPermissions::granted()));
//!     let session = AudioSession::new(driver, permissions, events_tx);
//!
//!     session.start_recording().await?;
//!     tokio::time::sleep(Duration::from_secs(3)).await;
//!     let clip = session.stop_recording().await?;
//!
//!     println!("Recorded: {}", clip);
//!     session.play(None).await?;
//!     Ok(())
//! }
//! ```

mod audio;
mod error;
mod permission;

pub use {
    audio::{
        AudioDriver, AudioSession, ClipRef, CpalDriver, Playback, Recording, RecordingPreset,
        SessionConfig, SessionEvent, SessionPhase,
    },
    error::{Result as CoreResult, SessionError},
    permission::{PermissionBackend, PermissionGateway, PermissionState, StaticPermissions},
};

#[cfg(test)]
mod tests;
