pub(crate) mod device;
mod driver;
mod session;

pub use {
    device::CpalDriver,
    driver::{AudioDriver, ClipRef, Playback, Recording, RecordingPreset},
    session::{AudioSession, SessionConfig, SessionEvent, SessionPhase},
};
