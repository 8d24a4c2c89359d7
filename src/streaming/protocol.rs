//! Chat backend wire protocol
//!
//! Inbound frames are JSON envelopes (or arbitrary text) pushed by the chat
//! backend; outbound frames are raw text with no envelope.
//!
//! # Envelope
//!
//! ```text
//! { "type": "stream_start" | "stream_chunk" | "stream_end",
//!   "content": "...", "message_id": "...", "message": "...", "text": "..." }
//! ```
//!
//! Anything without a streaming `type` is a plain, complete message.

use serde_json::{Map, Value};

/// Envelope fields as sent by the backend.
///
/// Every field is optional; the backend is free to omit any of them and
/// unknown fields are ignored. String fields are taken as-is, numbers and
/// booleans by their JSON text. Anything else counts as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub kind: Option<String>,
    pub content: Option<String>,
    pub message_id: Option<String>,
    pub message: Option<String>,
    pub text: Option<String>,
}

impl Envelope {
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let field = |name: &str| object.get(name).and_then(scalar_text);
        Self {
            kind: object.get("type").and_then(Value::as_str).map(str::to_string),
            content: field("content"),
            message_id: field("message_id"),
            message: field("message"),
            text: field("text"),
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A classified inbound frame.
///
/// `id` is the backend's `message_id` when it sent one. Callers generate an
/// identity when it is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete message, never streamed
    Plain {
        id: Option<String>,
        content: String,
    },
    /// First fragment of a streamed reply
    StreamStart {
        id: Option<String>,
        fragment: String,
    },
    /// Middle fragment of a streamed reply
    StreamChunk {
        id: Option<String>,
        fragment: String,
    },
    /// Final fragment of a streamed reply
    StreamEnd {
        id: Option<String>,
        fragment: String,
    },
}

impl Frame {
    /// Backend-supplied identity, if any
    pub fn id(&self) -> Option<&str> {
        match self {
            Frame::Plain { id, .. }
            | Frame::StreamStart { id, .. }
            | Frame::StreamChunk { id, .. }
            | Frame::StreamEnd { id, .. } => id.as_deref(),
        }
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Plain { .. } => "plain",
            Frame::StreamStart { .. } => "stream_start",
            Frame::StreamChunk { .. } => "stream_chunk",
            Frame::StreamEnd { .. } => "stream_end",
        }
    }
}

/// Treats empty strings the same as missing fields.
fn populated(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

fn plain_raw(raw: &str) -> Frame {
    Frame::Plain {
        id: None,
        content: raw.to_string(),
    }
}

/// Classify one raw inbound payload.
///
/// Total: every payload yields exactly one frame. Payloads that are not a JSON
/// object degrade to a plain frame carrying the raw text.
pub fn decode_frame(raw: &str) -> Frame {
    let envelope = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(object)) => Envelope::from_object(&object),
        Ok(_) => {
            log::debug!("Frame is JSON but not an object, treating as plain");
            return plain_raw(raw);
        }
        Err(e) => {
            log::debug!("Frame is not a structured envelope ({}), treating as plain", e);
            return plain_raw(raw);
        }
    };

    let id = populated(&envelope.message_id).map(str::to_string);
    let fragment = || envelope.content.clone().unwrap_or_default();

    match envelope.kind.as_deref() {
        Some("stream_start") => Frame::StreamStart {
            id,
            fragment: fragment(),
        },
        Some("stream_chunk") => Frame::StreamChunk {
            id,
            fragment: fragment(),
        },
        Some("stream_end") => Frame::StreamEnd {
            id,
            fragment: fragment(),
        },
        _ => {
            let content = populated(&envelope.message)
                .or_else(|| populated(&envelope.content))
                .or_else(|| populated(&envelope.text))
                .unwrap_or(raw)
                .to_string();
            Frame::Plain { id, content }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_json_is_plain_raw() {
        let frame = decode_frame("plain text");
        assert_eq!(
            frame,
            Frame::Plain {
                id: None,
                content: "plain text".to_string()
            }
        );
    }

    #[test]
    fn test_json_scalar_is_plain_raw() {
        // Valid JSON but not an object
        let frame = decode_frame("42");
        assert_eq!(
            frame,
            Frame::Plain {
                id: None,
                content: "42".to_string()
            }
        );
    }

    #[test]
    fn test_stream_start_with_id() {
        let frame = decode_frame(r#"{"type":"stream_start","content":"Hel","message_id":"m1"}"#);
        assert_eq!(
            frame,
            Frame::StreamStart {
                id: Some("m1".to_string()),
                fragment: "Hel".to_string()
            }
        );
    }

    #[test]
    fn test_stream_chunk_without_content() {
        let frame = decode_frame(r#"{"type":"stream_chunk"}"#);
        assert_eq!(
            frame,
            Frame::StreamChunk {
                id: None,
                fragment: String::new()
            }
        );
    }

    #[test]
    fn test_stream_end() {
        let frame = decode_frame(r#"{"type":"stream_end","content":"!"}"#);
        assert_eq!(frame.kind(), "stream_end");
        assert_eq!(frame.id(), None);
    }

    #[test]
    fn test_plain_field_priority() {
        let frame = decode_frame(r#"{"message":"m","content":"c","text":"t"}"#);
        assert!(matches!(frame, Frame::Plain { ref content, .. } if content == "m"));

        let frame = decode_frame(r#"{"content":"c","text":"t"}"#);
        assert!(matches!(frame, Frame::Plain { ref content, .. } if content == "c"));

        let frame = decode_frame(r#"{"text":"t"}"#);
        assert!(matches!(frame, Frame::Plain { ref content, .. } if content == "t"));
    }

    #[test]
    fn test_plain_empty_fields_fall_through() {
        let frame = decode_frame(r#"{"message":"","text":"hi"}"#);
        assert!(matches!(frame, Frame::Plain { ref content, .. } if content == "hi"));
    }

    #[test]
    fn test_plain_without_content_fields_uses_raw_payload() {
        let raw = r#"{"type":"status","ok":true}"#;
        let frame = decode_frame(raw);
        assert!(matches!(frame, Frame::Plain { ref content, .. } if content == raw));
    }

    #[test]
    fn test_unknown_type_is_plain() {
        let frame = decode_frame(r#"{"type":"stream_restart","content":"x","message_id":"m9"}"#);
        assert_eq!(
            frame,
            Frame::Plain {
                id: Some("m9".to_string()),
                content: "x".to_string()
            }
        );
    }

    #[test]
    fn test_json_array_is_plain_raw() {
        // Arrays must not be read positionally as an envelope
        let raw = r#"["stream_start","hi"]"#;
        assert_eq!(
            decode_frame(raw),
            Frame::Plain {
                id: None,
                content: raw.to_string()
            }
        );

        let raw = r#"["stream_chunk","x"]"#;
        assert!(matches!(decode_frame(raw), Frame::Plain { ref content, .. } if content == raw));
    }

    #[test]
    fn test_numeric_content_stays_in_stream() {
        let frame = decode_frame(r#"{"type":"stream_chunk","content":5}"#);
        assert_eq!(
            frame,
            Frame::StreamChunk {
                id: None,
                fragment: "5".to_string()
            }
        );
    }

    #[test]
    fn test_structured_content_is_empty_fragment() {
        let frame = decode_frame(r#"{"type":"stream_end","content":{"a":1},"message_id":7}"#);
        assert_eq!(
            frame,
            Frame::StreamEnd {
                id: Some("7".to_string()),
                fragment: String::new()
            }
        );
    }

    #[test]
    fn test_non_string_type_is_plain() {
        let frame = decode_frame(r#"{"type":1,"message":"hello"}"#);
        assert!(matches!(frame, Frame::Plain { ref content, .. } if content == "hello"));
    }
}
