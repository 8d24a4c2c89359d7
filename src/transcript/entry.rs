//! Conversation entries as rendered by the presentation layer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Who authored an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    /// Typed by the local user
    Sent,
    /// Produced by the assistant backend
    Received,
}

/// One discrete entry in the conversation timeline.
///
/// `content` only ever grows, and only while `streaming` is true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    pub id: String,
    pub direction: Direction,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub streaming: bool,
    pub visible: bool,
}

impl ConversationEntry {
    /// A complete assistant message that was never streamed.
    pub fn received(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            direction: Direction::Received,
            content: content.into(),
            created_at: Utc::now(),
            streaming: false,
            visible: true,
        }
    }

    /// An assistant message that will be filled by later chunks.
    pub fn streaming(id: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            streaming: true,
            ..Self::received(id, fragment)
        }
    }

    /// A message the user sent.
    pub fn sent(content: impl Into<String>) -> Self {
        Self {
            id: generate_entry_id(),
            direction: Direction::Sent,
            content: content.into(),
            created_at: Utc::now(),
            streaming: false,
            visible: true,
        }
    }

    pub fn is_received(&self) -> bool {
        self.direction == Direction::Received
    }
}

/// Generate an entry identity for frames that carry no `message_id`.
/// Format: <unix millis><9 hex chars>
pub fn generate_entry_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}{}", Utc::now().timestamp_millis(), &suffix[..9])
}
