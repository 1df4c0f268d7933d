use crate::config::{default_endpoint, default_model};

use serde::{Deserialize, Serialize};

/// Remote transcription endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperConfig {
    /// Endpoint receiving the multipart transcription request.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model identifier sent with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// API key for the Authorization header. When unset, the
    /// `OPENAI_API_KEY` environment variable is used instead.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl WhisperConfig {
    /// The key to authenticate with, config first, environment second.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
        }
    }
}
