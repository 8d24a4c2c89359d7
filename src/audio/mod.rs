//! Audio file handling for uploaded recordings
//!
//! Uploads are stored under deterministic names, then validated and
//! converted with ffmpeg before transcription.

mod ingest;
pub mod media;
mod paths;

pub use ingest::{save_recording, IngestError, SavedRecording};
pub use media::{MediaError, StablePolicy};
pub use paths::{default_recordings_dir, recording_filename, resolve_stored};
