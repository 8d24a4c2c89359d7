//! Streaming connection to the chat backend
//!
//! This module holds the wire protocol and the error taxonomy for the
//! persistent WebSocket connection.
//!
//! # Architecture
//!
//! ```text
//! ChatSession::send ──▶ outbound channel ──▶ transport pump ──▶ WebSocket
//!                                                                  │
//!                                                                  ▼
//!                        TranscriptReassembler ◀── decode_frame ◀── text frames
//! ```
//!
//! # Reconnect Strategy
//!
//! - Unexpected closures reconnect up to 5 times (1s, 2s, 4s, 8s, 16s)
//! - Caller-initiated disconnects never reconnect
//! - Entries survive reconnects within the same session

mod protocol;

pub use protocol::{decode_frame, Envelope, Frame};

/// Errors that can occur on the chat backend connection
#[derive(Debug, Clone)]
pub enum ConnectionError {
    /// URL could not be turned into a WebSocket request
    InvalidUrl(String),
    /// Failed to establish WebSocket connection
    ConnectionFailed(String),
    /// WebSocket protocol error
    ProtocolError(String),
    /// Connection was closed unexpectedly
    Disconnected(String),
    /// Failed to send a frame
    SendFailed(String),
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionError::InvalidUrl(e) => write!(f, "Invalid chat backend URL: {}", e),
            ConnectionError::ConnectionFailed(e) => {
                write!(f, "Failed to connect to chat backend: {}", e)
            }
            ConnectionError::ProtocolError(e) => write!(f, "WebSocket protocol error: {}", e),
            ConnectionError::Disconnected(e) => write!(f, "WebSocket disconnected: {}", e),
            ConnectionError::SendFailed(e) => write!(f, "Failed to send message: {}", e),
        }
    }
}

impl std::error::Error for ConnectionError {}
