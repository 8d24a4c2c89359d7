//! Transcript reassembly for streamed assistant replies
//!
//! Folds decoded frames into discrete conversation entries in a
//! [`TranscriptStore`].
//!
//! # Reassembly Strategy
//!
//! - **Plain**: appended as a sealed entry, streaming pointer untouched
//! - **Start**: opens a new streaming entry and points at it
//! - **Chunk**: appended to the pointed entry, or opens one if there is none
//! - **End**: appended and sealed, or ignored if there is no pointed entry
//!
//! Delivery across reconnects is not ordered, so out-of-sequence frames are
//! absorbed instead of rejected. No fragment that reaches the user is dropped.

use super::entry::{generate_entry_id, ConversationEntry};
use super::store::TranscriptStore;
use crate::streaming::Frame;

/// What a frame did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reassembly {
    /// A new entry was appended at this index
    Appended(usize),
    /// The streaming entry at this index grew
    Extended(usize),
    /// The streaming entry at this index was finalised
    Sealed(usize),
    /// Nothing changed
    Ignored,
}

impl Reassembly {
    pub fn changed(&self) -> bool {
        !matches!(self, Reassembly::Ignored)
    }
}

/// Tracks the single in-flight assistant reply.
#[derive(Debug, Clone, Default)]
pub struct TranscriptReassembler {
    /// Index of the current streaming Received entry
    streaming: Option<usize>,
    /// Count of frames applied (for logging)
    frame_count: u64,
}

impl TranscriptReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the entry currently being filled, if any.
    pub fn streaming_index(&self) -> Option<usize> {
        self.streaming
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Apply one decoded frame to the store.
    pub fn apply(&mut self, store: &mut TranscriptStore, frame: Frame) -> Reassembly {
        self.frame_count += 1;
        if self.frame_count % 50 == 0 {
            log::debug!(
                "TranscriptReassembler: {} frames applied, {} entries",
                self.frame_count,
                store.len()
            );
        }

        match frame {
            Frame::Plain { id, content } => {
                let id = id.unwrap_or_else(generate_entry_id);
                Reassembly::Appended(store.push(ConversationEntry::received(id, content)))
            }
            Frame::StreamStart { id, fragment } => {
                if let Some(open) = self.streaming {
                    // The previous entry stays as it is
                    log::warn!(
                        "TranscriptReassembler: stream_start while entry {} is still streaming",
                        open
                    );
                }
                self.open(store, id, fragment)
            }
            Frame::StreamChunk { id, fragment } => match self.current_mut(store) {
                Some((index, entry)) => {
                    entry.content.push_str(&fragment);
                    Reassembly::Extended(index)
                }
                None => {
                    log::debug!("TranscriptReassembler: stream_chunk without start, opening entry");
                    self.open(store, id, fragment)
                }
            },
            Frame::StreamEnd { fragment, .. } => match self.current_mut(store) {
                Some((index, entry)) => {
                    entry.content.push_str(&fragment);
                    entry.streaming = false;
                    self.streaming = None;
                    log::debug!(
                        "TranscriptReassembler: sealed entry {} ({} chars)",
                        index,
                        entry.content.len()
                    );
                    Reassembly::Sealed(index)
                }
                None => {
                    log::debug!("TranscriptReassembler: ignoring stream_end with no open entry");
                    Reassembly::Ignored
                }
            },
        }
    }

    /// Forget the streaming pointer (the store is cleared separately).
    pub fn reset(&mut self) {
        self.streaming = None;
        self.frame_count = 0;
    }

    fn open(
        &mut self,
        store: &mut TranscriptStore,
        id: Option<String>,
        fragment: String,
    ) -> Reassembly {
        let id = id.unwrap_or_else(generate_entry_id);
        let index = store.push(ConversationEntry::streaming(id, fragment));
        self.streaming = Some(index);
        Reassembly::Appended(index)
    }

    fn current_mut<'a>(
        &mut self,
        store: &'a mut TranscriptStore,
    ) -> Option<(usize, &'a mut ConversationEntry)> {
        let index = self.streaming?;
        match store.get_mut(index) {
            Some(entry) if entry.streaming && entry.is_received() => Some((index, entry)),
            _ => {
                // Pointer outlived its entry
                self.streaming = None;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::decode_frame;

    fn feed(frames: &[&str]) -> (TranscriptReassembler, TranscriptStore) {
        let mut reassembler = TranscriptReassembler::new();
        let mut store = TranscriptStore::new();
        for raw in frames {
            reassembler.apply(&mut store, decode_frame(raw));
        }
        (reassembler, store)
    }

    #[test]
    fn test_full_stream_produces_one_sealed_entry() {
        let (reassembler, store) = feed(&[
            r#"{"type":"stream_start","content":"Hel"}"#,
            r#"{"type":"stream_chunk","content":"lo "}"#,
            r#"{"type":"stream_chunk","content":"world"}"#,
            r#"{"type":"stream_end","content":"!"}"#,
        ]);

        assert_eq!(store.len(), 1);
        let entry = store.get(0).unwrap();
        assert_eq!(entry.content, "Hello world!");
        assert!(!entry.streaming);
        assert!(entry.is_received());
        assert_eq!(reassembler.streaming_index(), None);
    }

    #[test]
    fn test_stream_uses_backend_id() {
        let (_, store) = feed(&[r#"{"type":"stream_start","content":"a","message_id":"m-7"}"#]);
        assert_eq!(store.get(0).unwrap().id, "m-7");
    }

    #[test]
    fn test_plain_text_is_sealed_entry() {
        let (reassembler, store) = feed(&["plain text"]);
        assert_eq!(store.len(), 1);
        let entry = store.get(0).unwrap();
        assert_eq!(entry.content, "plain text");
        assert!(!entry.streaming);
        assert_eq!(reassembler.streaming_index(), None);
    }

    #[test]
    fn test_orphan_end_is_noop() {
        let (_, store) = feed(&[
            r#"{"message":"hi"}"#,
            r#"{"type":"stream_end","content":"tail"}"#,
        ]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(0).unwrap().content, "hi");
    }

    #[test]
    fn test_end_after_seal_is_noop() {
        let (_, store) = feed(&[
            r#"{"type":"stream_start","content":"a"}"#,
            r#"{"type":"stream_end","content":"b"}"#,
            r#"{"type":"stream_end","content":"c"}"#,
        ]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(0).unwrap().content, "ab");
    }

    #[test]
    fn test_orphan_chunk_opens_streaming_entry() {
        let (reassembler, store) = feed(&[r#"{"type":"stream_chunk","content":"mid"}"#]);
        assert_eq!(store.len(), 1);
        assert!(store.get(0).unwrap().streaming);
        assert_eq!(reassembler.streaming_index(), Some(0));
    }

    #[test]
    fn test_orphan_chunks_with_same_id_after_seal_do_not_merge() {
        let (_, store) = feed(&[
            r#"{"type":"stream_chunk","content":"a","message_id":"x"}"#,
            r#"{"type":"stream_end"}"#,
            r#"{"type":"stream_chunk","content":"b","message_id":"x"}"#,
        ]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(0).unwrap().content, "a");
        assert_eq!(store.get(1).unwrap().content, "b");
    }

    #[test]
    fn test_duplicate_start_leaves_previous_entry_in_place() {
        let (reassembler, store) = feed(&[
            r#"{"type":"stream_start","content":"first","message_id":"a"}"#,
            r#"{"type":"stream_start","content":"second","message_id":"b"}"#,
            r#"{"type":"stream_chunk","content":"+"}"#,
            r#"{"type":"stream_end"}"#,
        ]);

        assert_eq!(store.len(), 2);
        let first = store.get(0).unwrap();
        assert_eq!(first.content, "first");
        // Only the latest start is tracked, so the first is never sealed
        assert!(first.streaming);
        let second = store.get(1).unwrap();
        assert_eq!(second.content, "second+");
        assert!(!second.streaming);
        assert_eq!(reassembler.streaming_index(), None);
    }

    #[test]
    fn test_plain_during_stream_does_not_break_stream() {
        let (_, store) = feed(&[
            r#"{"type":"stream_start","content":"Hel"}"#,
            r#"{"message":"notice"}"#,
            r#"{"type":"stream_chunk","content":"lo"}"#,
            r#"{"type":"stream_end"}"#,
        ]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(0).unwrap().content, "Hello");
        assert_eq!(store.get(1).unwrap().content, "notice");
    }

    #[test]
    fn test_content_never_shrinks_while_streaming() {
        let mut reassembler = TranscriptReassembler::new();
        let mut store = TranscriptStore::new();
        let frames = [
            r#"{"type":"stream_start","content":"a"}"#,
            r#"{"type":"stream_chunk","content":""}"#,
            r#"{"type":"stream_chunk","content":"bc"}"#,
            "garbage{",
            r#"{"type":"stream_start","content":""}"#,
            r#"{"type":"stream_chunk","content":"d"}"#,
            r#"{"type":"stream_end","content":"e"}"#,
        ];

        let mut lengths = vec![0usize; frames.len()];
        for raw in frames {
            reassembler.apply(&mut store, decode_frame(raw));
            for (i, entry) in store.entries().iter().enumerate() {
                assert!(entry.content.len() >= lengths[i]);
                lengths[i] = entry.content.len();
            }
        }
    }

    #[test]
    fn test_reset_then_orphan_chunk_still_reassembles() {
        let mut reassembler = TranscriptReassembler::new();
        let mut store = TranscriptStore::new();
        reassembler.apply(&mut store, decode_frame(r#"{"type":"stream_start","content":"x"}"#));

        store.clear();
        reassembler.reset();
        assert_eq!(reassembler.streaming_index(), None);

        let result = reassembler.apply(
            &mut store,
            decode_frame(r#"{"type":"stream_chunk","content":"y"}"#),
        );
        assert_eq!(result, Reassembly::Appended(0));
        assert_eq!(store.get(0).unwrap().content, "y");
    }

    #[test]
    fn test_reassembly_results() {
        let mut reassembler = TranscriptReassembler::new();
        let mut store = TranscriptStore::new();

        let r = reassembler.apply(&mut store, decode_frame(r#"{"type":"stream_start"}"#));
        assert_eq!(r, Reassembly::Appended(0));
        let r = reassembler.apply(&mut store, decode_frame(r#"{"type":"stream_chunk","content":"a"}"#));
        assert_eq!(r, Reassembly::Extended(0));
        let r = reassembler.apply(&mut store, decode_frame(r#"{"type":"stream_end"}"#));
        assert_eq!(r, Reassembly::Sealed(0));
        let r = reassembler.apply(&mut store, decode_frame(r#"{"type":"stream_end"}"#));
        assert_eq!(r, Reassembly::Ignored);
        assert!(!r.changed());
    }

    #[test]
    fn test_frame_count_tracks_applied_frames_until_reset() {
        let mut reassembler = TranscriptReassembler::new();
        let mut store = TranscriptStore::new();

        reassembler.apply(&mut store, decode_frame("hello"));
        reassembler.apply(&mut store, decode_frame(r#"{"type":"stream_end"}"#));
        assert_eq!(reassembler.frame_count(), 2);

        reassembler.reset();
        assert_eq!(reassembler.frame_count(), 0);
    }

    #[test]
    fn test_numeric_chunk_extends_open_reply() {
        let mut reassembler = TranscriptReassembler::new();
        let mut store = TranscriptStore::new();

        reassembler.apply(&mut store, decode_frame(r#"{"type":"stream_start","content":"n="}"#));
        let r = reassembler.apply(&mut store, decode_frame(r#"{"type":"stream_chunk","content":5}"#));
        assert_eq!(r, Reassembly::Extended(0));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(0).unwrap().content, "n=5");
    }

    #[test]
    fn test_array_payload_does_not_touch_open_reply() {
        let mut reassembler = TranscriptReassembler::new();
        let mut store = TranscriptStore::new();

        reassembler.apply(&mut store, decode_frame(r#"{"type":"stream_start","content":"a"}"#));
        let r = reassembler.apply(&mut store, decode_frame(r#"["stream_chunk","x"]"#));
        assert_eq!(r, Reassembly::Appended(1));
        assert_eq!(store.get(0).unwrap().content, "a");
        assert_eq!(store.get(1).unwrap().content, r#"["stream_chunk","x"]"#);
        assert_eq!(reassembler.streaming_index(), Some(0));
    }
}
