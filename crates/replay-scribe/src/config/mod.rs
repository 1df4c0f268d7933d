mod audio_config;
#[allow(clippy::module_inception)]
mod config;
mod whisper_config;

pub(crate) use {audio_config::AudioConfig, config::Config, whisper_config::WhisperConfig};

pub(crate) const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/audio/transcriptions";
pub(crate) const DEFAULT_MODEL: &str = "whisper-1";

pub(crate) fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

pub(crate) fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
