//! Ordered conversation store with dual-pane views.

use super::entry::{ConversationEntry, Direction};

/// Ordered list of conversation entries.
///
/// Entries are kept in arrival/dispatch order and are never reordered or
/// removed individually. Mutation is crate-private: only the reassembler and
/// the outbound dispatcher write here.
#[derive(Debug, Clone, Default)]
pub struct TranscriptStore {
    entries: Vec<ConversationEntry>,
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ConversationEntry> {
        self.entries.get(index)
    }

    /// Visible assistant entries, in order.
    pub fn assistant_view(&self) -> Vec<&ConversationEntry> {
        self.view(Direction::Received)
    }

    /// Visible user entries, in order.
    pub fn user_view(&self) -> Vec<&ConversationEntry> {
        self.view(Direction::Sent)
    }

    fn view(&self, direction: Direction) -> Vec<&ConversationEntry> {
        self.entries
            .iter()
            .filter(|e| e.direction == direction && e.visible)
            .collect()
    }

    /// Append an entry and return its index.
    pub(crate) fn push(&mut self, entry: ConversationEntry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut ConversationEntry> {
        self.entries.get_mut(index)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
