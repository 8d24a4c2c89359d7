//! OpenAI-compatible speech-to-text client
//!
//! Sends audio as a multipart upload to `{base_url}/audio/transcriptions`
//! and returns the recognised text.

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::audio::MediaError;
use crate::settings::ClientSettings;

/// Request timeout for a single transcription call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors that can occur during transcription
#[derive(Debug)]
pub enum TranscriptionError {
    /// API key not configured
    MissingApiKey,
    /// File name is not a plain name inside the recordings directory
    InvalidFilename(String),
    /// Stored file does not exist
    FileNotFound(String),
    /// Only .webm and .mp3 are accepted
    UnsupportedFormat(String),
    /// File never reached a stable size
    FileNotReady(String),
    /// Container has no audio stream
    InvalidAudio(String),
    /// ffprobe/ffmpeg failure
    Media(String),
    /// Failed to read audio file
    FileReadError(String),
    /// Network/HTTP error
    NetworkError(String),
    /// API returned an error
    ApiError { status: u16, message: String },
    /// Failed to parse API response
    ParseError(String),
}

impl TranscriptionError {
    /// HTTP status an upload endpoint would answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            TranscriptionError::InvalidFilename(_)
            | TranscriptionError::UnsupportedFormat(_)
            | TranscriptionError::InvalidAudio(_) => 400,
            TranscriptionError::FileNotFound(_) => 404,
            _ => 500,
        }
    }
}

impl std::fmt::Display for TranscriptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscriptionError::MissingApiKey => write!(
                f,
                "Speech-to-text API key not configured. Set STT_API_KEY or OPENAI_API_KEY."
            ),
            TranscriptionError::InvalidFilename(name) => write!(f, "Invalid filename: {}", name),
            TranscriptionError::FileNotFound(name) => write!(f, "File not found: {}", name),
            TranscriptionError::UnsupportedFormat(name) => write!(
                f,
                "Unsupported file format: {} (only .webm and .mp3 are accepted)",
                name
            ),
            TranscriptionError::FileNotReady(e) => write!(f, "File not ready: {}", e),
            TranscriptionError::InvalidAudio(name) => {
                write!(f, "Invalid audio file: {} has no audio stream", name)
            }
            TranscriptionError::Media(e) => write!(f, "Media processing failed: {}", e),
            TranscriptionError::FileReadError(e) => write!(f, "Failed to read audio file: {}", e),
            TranscriptionError::NetworkError(e) => write!(f, "Network error: {}", e),
            TranscriptionError::ApiError { status, message } => {
                write!(f, "Speech-to-text API error ({}): {}", status, message)
            }
            TranscriptionError::ParseError(e) => write!(f, "Failed to parse API response: {}", e),
        }
    }
}

impl std::error::Error for TranscriptionError {}

impl From<MediaError> for TranscriptionError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::NotReady { .. } => TranscriptionError::FileNotReady(e.to_string()),
            other => TranscriptionError::Media(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// API error response
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Get the API key from the environment.
/// `STT_API_KEY` wins over `OPENAI_API_KEY`.
pub fn get_api_key() -> Option<String> {
    ["STT_API_KEY", "OPENAI_API_KEY"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|key| !key.is_empty())
}

/// Check if an API key is configured (for status display)
pub fn is_api_key_configured() -> bool {
    get_api_key().is_some()
}

/// MIME type for an upload, from its extension.
pub fn mime_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "webm" => "audio/webm",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        _ => "application/octet-stream",
    }
}

/// Language hint to forward. `auto` and blank mean "let the model detect".
fn normalize_language(language: Option<&str>) -> Option<&str> {
    language
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case("auto"))
}

/// Client for an OpenAI-compatible `/audio/transcriptions` endpoint.
#[derive(Debug, Clone)]
pub struct SttClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl SttClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, TranscriptionError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TranscriptionError::NetworkError(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    /// Build a client from settings plus the API key in the environment.
    pub fn from_settings(settings: &ClientSettings) -> Result<Self, TranscriptionError> {
        let api_key = get_api_key().ok_or(TranscriptionError::MissingApiKey)?;
        Self::new(&settings.stt_base_url, &settings.stt_model, api_key)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.base_url)
    }

    /// Transcribe an uploaded file as-is, guessing its MIME type from the name.
    pub async fn transcribe_bytes(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        language: Option<&str>,
    ) -> Result<String, TranscriptionError> {
        if bytes.is_empty() {
            return Err(TranscriptionError::FileReadError(
                "No audio file provided".to_string(),
            ));
        }
        self.transcribe(bytes, filename, mime_for(filename), language)
            .await
    }

    /// Send one audio payload and return the transcribed text.
    pub async fn transcribe(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        mime: &str,
        language: Option<&str>,
    ) -> Result<String, TranscriptionError> {
        log::info!(
            "Transcribing audio file: {} ({} bytes, model {})",
            filename,
            bytes.len(),
            self.model
        );

        let file_part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime)
            .map_err(|e| TranscriptionError::ParseError(e.to_string()))?;

        let mut form = Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("prompt", "");

        if let Some(language) = normalize_language(language) {
            form = form.text("language", language.to_string());
        }

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscriptionError::NetworkError(e.to_string()))?;

        let status = response.status();

        if status.is_success() {
            let body: TranscriptionResponse = response
                .json()
                .await
                .map_err(|e| TranscriptionError::ParseError(e.to_string()))?;

            log::info!("Transcription successful: {} chars", body.text.len());
            Ok(body.text)
        } else {
            let error_text = response.text().await.unwrap_or_default();

            let message =
                if let Ok(error_response) = serde_json::from_str::<ApiErrorResponse>(&error_text) {
                    error_response.error.message
                } else {
                    error_text
                };

            log::error!("Speech-to-text API error ({}): {}", status.as_u16(), message);

            Err(TranscriptionError::ApiError {
                status: status.as_u16(),
                message,
            })
        }
    }
}
