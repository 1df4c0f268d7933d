use replay_scribe_core::RecordingPreset;
use serde::{Deserialize, Serialize};

/// Capture preset configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Requested capture sample rate in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Requested channel count (1 = mono).
    #[serde(default = "default_channels")]
    pub channels: u16,
}

fn default_sample_rate() -> u32 {
    RecordingPreset::high_quality().sample_rate
}

fn default_channels() -> u16 {
    RecordingPreset::high_quality().channels
}

impl AudioConfig {
    /// The preset handed to the capture driver.
    pub fn preset(&self) -> RecordingPreset {
        RecordingPreset {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
        }
    }
}
