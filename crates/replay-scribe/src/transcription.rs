//! Remote speech-to-text client.
//!
//! Packages a finished clip into a multipart request and posts it to the
//! transcription endpoint. One attempt per call, no retry: a failed request
//! is reported to the caller, who may re-invoke via a new playback.

use crate::{AppError, AppResult, config::WhisperConfig};

use std::panic::Location;

use async_trait::async_trait;
use error_location::ErrorLocation;
use replay_scribe_core::ClipRef;
use serde::Deserialize;
use tracing::{debug, info, instrument};

#[track_caller]
fn transcription_failed(message: impl Into<String>) -> AppError {
    AppError::TranscriptionFailed {
        message: message.into(),
        location: ErrorLocation::from(Location::caller()),
    }
}

/// Remote transcription boundary.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the clip's audio into text.
    async fn transcribe(&self, clip: &ClipRef) -> AppResult<String>;
}

/// Success body: `{"text": "..."}`.
#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Failure body: `{"error": {"message": "..."}}`.
#[derive(Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// HTTP client for the Whisper transcription endpoint.
pub struct WhisperClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl WhisperClient {
    /// Build a client with explicit endpoint, key and model.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Build a client from config, resolving the API key lazily.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when no key is configured and the environment
    /// does not provide one.
    #[track_caller]
    pub fn from_config(config: &WhisperConfig) -> AppResult<Self> {
        let api_key = config.resolve_api_key().ok_or_else(|| AppError::ConfigError {
            reason: "No API key: set [whisper] api_key in the config or the OPENAI_API_KEY \
                     environment variable"
                .to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?;

        Ok(Self::new(&config.endpoint, api_key, &config.model))
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    #[instrument(skip(self))]
    async fn transcribe(&self, clip: &ClipRef) -> AppResult<String> {
        let path = clip
            .to_file_path()
            .ok_or_else(|| transcription_failed(format!("unsupported clip locator: {}", clip)))?;

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| transcription_failed(format!("could not read clip: {}", e)))?;

        debug!(clip = %clip, bytes = bytes.len(), "Posting clip for transcription");

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name("recording.m4a")
            .mime_str("audio/m4a")
            .map_err(|e| transcription_failed(format!("could not build request: {}", e)))?;

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| transcription_failed(format!("network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|decoded| decoded.error.message)
                .unwrap_or_else(|_| format!("transcription request failed with status {}", status));
            return Err(transcription_failed(message));
        }

        let decoded: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| transcription_failed(format!("malformed response: {}", e)))?;

        info!(text_len = decoded.text.len(), "Transcription complete");

        Ok(decoded.text)
    }
}
