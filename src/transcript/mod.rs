//! Conversation transcript: entries, reassembly, and the ordered store.

mod entry;
mod reassembler;
mod store;

pub use entry::{generate_entry_id, ConversationEntry, Direction};
pub use reassembler::{Reassembly, TranscriptReassembler};
pub use store::TranscriptStore;

use crate::streaming::Frame;

/// Store plus the reassembly state that writes into it.
///
/// Kept together so clearing the store always drops the streaming pointer.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    store: TranscriptStore,
    reassembler: TranscriptReassembler,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &TranscriptStore {
        &self.store
    }

    pub fn streaming_index(&self) -> Option<usize> {
        self.reassembler.streaming_index()
    }

    /// Fold one inbound frame into the store.
    pub fn apply_frame(&mut self, frame: Frame) -> Reassembly {
        self.reassembler.apply(&mut self.store, frame)
    }

    /// Record a message the user sent. Returns its index.
    pub(crate) fn record_sent(&mut self, text: &str) -> usize {
        self.store.push(ConversationEntry::sent(text))
    }

    /// Empty the store and forget any in-flight reply.
    pub fn clear(&mut self) {
        log::debug!(
            "Clearing transcript: {} entries, {} frames applied",
            self.store.len(),
            self.reassembler.frame_count()
        );
        self.store.clear();
        self.reassembler.reset();
    }
}
