//! Audio ingestion: persist an uploaded recording under a deterministic name.

use std::path::{Path, PathBuf};

use super::paths::recording_filename;

/// Errors that can occur while storing an upload
#[derive(Debug)]
pub enum IngestError {
    /// Upload contained no audio bytes
    EmptyAudio,
    /// Timestamp field was missing or blank
    MissingTimestamp,
    /// Filesystem error
    Io(String),
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::EmptyAudio => write!(f, "No audio file provided"),
            IngestError::MissingTimestamp => write!(f, "No timestamp provided"),
            IngestError::Io(e) => write!(f, "Failed to save audio file: {}", e),
        }
    }
}

impl std::error::Error for IngestError {}

/// A stored recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedRecording {
    pub filename: String,
    pub path: PathBuf,
}

/// Write `audio` to `<dir>/recording_<timestamp>.webm`, creating `dir` if needed.
///
/// An existing file with the same name is overwritten.
pub async fn save_recording(
    dir: &Path,
    audio: &[u8],
    timestamp: &str,
) -> Result<SavedRecording, IngestError> {
    if audio.is_empty() {
        return Err(IngestError::EmptyAudio);
    }
    if timestamp.trim().is_empty() {
        return Err(IngestError::MissingTimestamp);
    }

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| IngestError::Io(e.to_string()))?;

    let filename = recording_filename(timestamp.trim());
    let path = dir.join(&filename);
    tokio::fs::write(&path, audio)
        .await
        .map_err(|e| IngestError::Io(e.to_string()))?;

    log::info!("Saved audio chunk: {} ({} bytes)", filename, audio.len());

    Ok(SavedRecording { filename, path })
}
