//! Media helpers backed by the `ffprobe` and `ffmpeg` command-line tools.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

/// Errors from file readiness checks and conversion
#[derive(Debug)]
pub enum MediaError {
    /// File never reached a stable, non-zero size
    NotReady { attempts: u32 },
    /// `ffprobe`/`ffmpeg` could not be started
    ToolUnavailable(String),
    /// `ffmpeg` exited with an error
    ConversionFailed(String),
}

impl std::fmt::Display for MediaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaError::NotReady { attempts } => {
                write!(f, "File not ready after {} attempts", attempts)
            }
            MediaError::ToolUnavailable(e) => write!(f, "Media tool unavailable: {}", e),
            MediaError::ConversionFailed(e) => write!(f, "Audio conversion failed: {}", e),
        }
    }
}

impl std::error::Error for MediaError {}

/// How long to wait for an upload to finish being written.
#[derive(Debug, Clone, Copy)]
pub struct StablePolicy {
    pub poll_interval: Duration,
    pub max_attempts: u32,
    /// Consecutive unchanged observations required
    pub stable_checks: u32,
}

impl Default for StablePolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_attempts: 20,
            stable_checks: 3,
        }
    }
}

/// Poll until `path` has a non-zero size that stops changing.
/// Returns the final size in bytes.
pub async fn wait_for_stable_file(path: &Path, policy: &StablePolicy) -> Result<u64, MediaError> {
    let mut last_size = 0u64;
    let mut stable = 0u32;

    for attempt in 1..=policy.max_attempts {
        if let Ok(meta) = std::fs::metadata(path) {
            let size = meta.len();
            if size > 0 {
                if size == last_size {
                    stable += 1;
                    if stable >= policy.stable_checks {
                        log::info!("File ready and stable: {:?} ({} bytes)", path, size);
                        return Ok(size);
                    }
                } else {
                    stable = 0;
                    last_size = size;
                }
            }
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.poll_interval).await;
        }
    }

    Err(MediaError::NotReady {
        attempts: policy.max_attempts,
    })
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_type: Option<String>,
}

/// True if `ffprobe -of json` output lists at least one audio stream.
pub fn probe_output_has_audio(json: &str) -> bool {
    serde_json::from_str::<ProbeOutput>(json)
        .map(|probe| {
            probe
                .streams
                .iter()
                .any(|s| s.codec_type.as_deref() == Some("audio"))
        })
        .unwrap_or(false)
}

/// Check that the container at `path` has an audio stream.
///
/// A file `ffprobe` cannot read counts as having no audio.
pub async fn probe_has_audio(path: &Path) -> Result<bool, MediaError> {
    let output = Command::new("ffprobe")
        .args(["-v", "error", "-show_entries", "stream=codec_type", "-of", "json"])
        .arg(path)
        .output()
        .await
        .map_err(|e| MediaError::ToolUnavailable(format!("ffprobe: {}", e)))?;

    if !output.status.success() {
        log::warn!(
            "File validation failed for {:?}: {}",
            path,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return Ok(false);
    }

    let has_audio = probe_output_has_audio(&String::from_utf8_lossy(&output.stdout));
    log::info!("File validation: {:?} - has audio: {}", path, has_audio);
    Ok(has_audio)
}

/// Convert any container ffmpeg understands to 16 kHz mono PCM16 WAV.
pub async fn convert_to_wav(input: &Path, output: &Path) -> Result<(), MediaError> {
    let result = Command::new("ffmpeg")
        .args(["-y", "-loglevel", "error", "-i"])
        .arg(input)
        .args(["-acodec", "pcm_s16le", "-ac", "1", "-ar", "16000", "-f", "wav"])
        .arg(output)
        .output()
        .await
        .map_err(|e| MediaError::ToolUnavailable(format!("ffmpeg: {}", e)))?;

    if !result.status.success() {
        return Err(MediaError::ConversionFailed(
            String::from_utf8_lossy(&result.stderr).trim().to_string(),
        ));
    }

    log::info!("Converted {:?} to {:?}", input, output);
    Ok(())
}
