//! XDG path helpers for uploaded recordings
//!
//! Recordings are stored in: ~/.local/share/voice-chat-client/audio-to-transcript/

use std::path::{Path, PathBuf};

/// Default recordings directory.
/// Returns: ~/.local/share/voice-chat-client/audio-to-transcript/
pub fn default_recordings_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("voice-chat-client")
        .join("audio-to-transcript")
}

/// Deterministic file name for an uploaded recording.
/// Format: recording_<timestamp>.webm
///
/// Characters outside `[A-Za-z0-9_-]` are replaced with `_` so the result
/// is always a plain file name.
pub fn recording_filename(timestamp: &str) -> String {
    let safe: String = timestamp
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("recording_{}.webm", safe)
}

/// Resolve a client-supplied file name inside `dir`.
///
/// Returns `None` for anything that is not a single plain path component.
pub fn resolve_stored(dir: &Path, filename: &str) -> Option<PathBuf> {
    let candidate = Path::new(filename);
    let mut components = candidate.components();
    match (components.next(), components.next()) {
        (Some(std::path::Component::Normal(name)), None) if name == candidate.as_os_str() => {
            Some(dir.join(name))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_filename() {
        assert_eq!(recording_filename("1718000000000"), "recording_1718000000000.webm");
        assert_eq!(recording_filename("../x/y"), "recording____x_y.webm");
    }

    #[test]
    fn test_default_dir_contains_expected_path() {
        let dir = default_recordings_dir();
        let path_str = dir.to_string_lossy();
        assert!(path_str.contains("voice-chat-client"));
        assert!(path_str.contains("audio-to-transcript"));
    }

    #[test]
    fn test_resolve_stored_rejects_traversal() {
        let dir = Path::new("/srv/audio");
        assert_eq!(
            resolve_stored(dir, "recording_1.webm"),
            Some(PathBuf::from("/srv/audio/recording_1.webm"))
        );
        assert_eq!(resolve_stored(dir, "../etc/passwd"), None);
        assert_eq!(resolve_stored(dir, "a/b.webm"), None);
        assert_eq!(resolve_stored(dir, "/abs.webm"), None);
        assert_eq!(resolve_stored(dir, ""), None);
        assert_eq!(resolve_stored(dir, ".."), None);
    }
}
