//! Speech-to-text transcription
//!
//! Talks to an OpenAI-compatible transcription API, either with raw upload
//! bytes or by running a stored recording through the media pipeline.

mod openai;
mod pipeline;

pub use openai::{get_api_key, is_api_key_configured, mime_for, SttClient, TranscriptionError};
pub use pipeline::{transcribe_stored_file, StoredTranscription};
