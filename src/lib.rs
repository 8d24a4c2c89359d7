//! Streaming chat client
//!
//! Keeps one WebSocket connection to a chat backend alive, reassembles
//! streamed assistant replies into a single ordered transcript, and exposes
//! assistant/user views of it. Speech-to-text helpers turn uploaded
//! recordings into text that can be sent as a message.
//!
//! # Architecture
//!
//! ```text
//! ChatSession ──▶ reduce(State, Event) ──▶ Effects ──▶ WebSocketRunner
//!     ▲                                                     │
//!     └────────────── TransportEvent (opened/closed/frame) ◀┘
//! ```

pub mod audio;
pub mod dispatcher;
pub mod effects;
pub mod session;
pub mod settings;
pub mod state_machine;
pub mod streaming;
pub mod transcript;
pub mod transcription;

pub use session::{ChatSession, SessionConfig, SessionUpdate};
pub use settings::ClientSettings;
pub use state_machine::{ConnectionState, ConnectionStatus, ReconnectPolicy};
pub use streaming::{decode_frame, Frame};
pub use transcript::{ConversationEntry, Direction};
