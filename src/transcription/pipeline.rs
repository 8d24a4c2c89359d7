//! Transcribe a stored recording
//!
//! # Pipeline
//!
//! ```text
//! filename ──▶ resolve ──▶ exists? ──▶ .webm/.mp3? ──▶ stable size
//!                                                        │
//!            .webm: ffprobe ──▶ ffmpeg → 16 kHz mono WAV │
//!                                                        ▼
//!                                              speech-to-text API
//! ```
//!
//! Once a file passes validation it is deleted when the pipeline returns,
//! whatever the outcome. The converted WAV is deleted with it.

use std::path::{Path, PathBuf};

use super::openai::{SttClient, TranscriptionError};
use crate::audio::media::{self, StablePolicy};
use crate::audio::resolve_stored;

/// Result of a successful stored-file transcription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTranscription {
    pub filename: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    Webm,
    Mp3,
}

impl SourceFormat {
    fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "webm" => Some(SourceFormat::Webm),
            "mp3" => Some(SourceFormat::Mp3),
            _ => None,
        }
    }
}

/// Removes its files on drop.
struct ArtifactGuard {
    paths: Vec<PathBuf>,
}

impl ArtifactGuard {
    fn new(path: PathBuf) -> Self {
        Self { paths: vec![path] }
    }

    fn track(&mut self, path: PathBuf) {
        self.paths.push(path);
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        for path in &self.paths {
            match std::fs::remove_file(path) {
                Ok(()) => log::debug!("Removed {:?}", path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to remove {:?}: {}", path, e),
            }
        }
    }
}

/// Transcribe `<dir>/<filename>` and delete it afterwards.
pub async fn transcribe_stored_file(
    dir: &Path,
    filename: &str,
    client: &SttClient,
    language: Option<&str>,
    policy: &StablePolicy,
) -> Result<StoredTranscription, TranscriptionError> {
    let source = resolve_stored(dir, filename)
        .ok_or_else(|| TranscriptionError::InvalidFilename(filename.to_string()))?;

    if !source.is_file() {
        return Err(TranscriptionError::FileNotFound(filename.to_string()));
    }

    let format = SourceFormat::from_path(&source)
        .ok_or_else(|| TranscriptionError::UnsupportedFormat(filename.to_string()))?;

    let mut guard = ArtifactGuard::new(source.clone());

    media::wait_for_stable_file(&source, policy).await?;

    let (upload_path, mime) = match format {
        SourceFormat::Webm => {
            if !media::probe_has_audio(&source).await? {
                log::warn!("Invalid audio file, deleting: {}", filename);
                return Err(TranscriptionError::InvalidAudio(filename.to_string()));
            }
            let wav = source.with_extension("wav");
            guard.track(wav.clone());
            media::convert_to_wav(&source, &wav).await?;
            (wav, "audio/wav")
        }
        SourceFormat::Mp3 => (source.clone(), "audio/mpeg"),
    };

    let bytes = tokio::fs::read(&upload_path)
        .await
        .map_err(|e| TranscriptionError::FileReadError(e.to_string()))?;

    let upload_name = upload_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename)
        .to_string();

    let text = client.transcribe(bytes, &upload_name, mime, language).await?;

    Ok(StoredTranscription {
        filename: filename.to_string(),
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast() -> StablePolicy {
        StablePolicy {
            poll_interval: Duration::from_millis(5),
            ..Default::default()
        }
    }

    fn unreachable_client() -> SttClient {
        SttClient::new("http://127.0.0.1:9/v1", "whisper-1", "test-key").unwrap()
    }

    #[tokio::test]
    async fn test_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result =
            transcribe_stored_file(dir.path(), "../secret.mp3", &unreachable_client(), None, &fast())
                .await;
        assert!(matches!(result, Err(TranscriptionError::InvalidFilename(_))));
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result =
            transcribe_stored_file(dir.path(), "recording_1.webm", &unreachable_client(), None, &fast())
                .await;
        assert!(matches!(result, Err(TranscriptionError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_unsupported_format_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.ogg");
        std::fs::write(&path, b"ogg").unwrap();

        let result =
            transcribe_stored_file(dir.path(), "notes.ogg", &unreachable_client(), None, &fast())
                .await;
        assert!(matches!(result, Err(TranscriptionError::UnsupportedFormat(_))));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_source_removed_after_network_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp3");
        std::fs::write(&path, b"ID3 fake mp3 bytes").unwrap();

        let result =
            transcribe_stored_file(dir.path(), "clip.mp3", &unreachable_client(), Some("pl"), &fast())
                .await;
        assert!(matches!(result, Err(TranscriptionError::NetworkError(_))));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_empty_file_is_not_ready_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp3");
        std::fs::write(&path, b"").unwrap();

        let result =
            transcribe_stored_file(dir.path(), "clip.mp3", &unreachable_client(), None, &fast())
                .await;
        assert!(matches!(result, Err(TranscriptionError::FileNotReady(_))));
        assert!(!path.exists());
    }
}
