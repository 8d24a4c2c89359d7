//! Outbound dispatcher: user text onto the wire and into the transcript.
//!
//! Silent messages go over the wire but never into the transcript. They are
//! used for priming prompts that must stay out of the visible timeline.

use crate::state_machine::State;
use crate::transcript::Transcript;

/// Why a send was refused. No side effect happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRejected {
    NotConnected,
    EmptyMessage,
    /// Connected on paper, but the transport already hung up
    TransportGone,
}

impl std::fmt::Display for SendRejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendRejected::NotConnected => write!(f, "not connected"),
            SendRejected::EmptyMessage => write!(f, "message is empty"),
            SendRejected::TransportGone => write!(f, "transport closed"),
        }
    }
}

/// Transmit `text` and, unless `silent`, record it as a Sent entry.
///
/// Returns the index of the new entry (`None` for silent sends).
pub fn dispatch(
    connection: &State,
    transcript: &mut Transcript,
    text: &str,
    silent: bool,
) -> Result<Option<usize>, SendRejected> {
    if text.trim().is_empty() {
        return Err(SendRejected::EmptyMessage);
    }
    let outbound = connection.outbound().ok_or(SendRejected::NotConnected)?;
    if !outbound.send(text) {
        return Err(SendRejected::TransportGone);
    }

    if silent {
        log::debug!("Sent silent message ({} chars)", text.len());
        Ok(None)
    } else {
        Ok(Some(transcript.record_sent(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::Outbound;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn connected() -> (State, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            State::Connected {
                id: Uuid::new_v4(),
                outbound: Outbound::new(tx),
            },
            rx,
        )
    }

    #[test]
    fn test_send_while_disconnected_is_rejected() {
        let mut transcript = Transcript::new();
        let result = dispatch(&State::default(), &mut transcript, "hello", false);
        assert_eq!(result, Err(SendRejected::NotConnected));
        assert!(transcript.store().is_empty());
    }

    #[test]
    fn test_whitespace_is_rejected_without_transmitting() {
        let (state, mut rx) = connected();
        let mut transcript = Transcript::new();
        let result = dispatch(&state, &mut transcript, "   \n", false);
        assert_eq!(result, Err(SendRejected::EmptyMessage));
        assert!(rx.try_recv().is_err());
        assert!(transcript.store().is_empty());
    }

    #[test]
    fn test_send_transmits_raw_text_and_records_entry() {
        let (state, mut rx) = connected();
        let mut transcript = Transcript::new();
        let result = dispatch(&state, &mut transcript, " hi there ", false);
        assert_eq!(result, Ok(Some(0)));
        assert_eq!(rx.try_recv().unwrap(), " hi there ");
        assert_eq!(transcript.store().user_view()[0].content, " hi there ");
    }

    #[test]
    fn test_silent_send_is_transmitted_but_not_recorded() {
        let (state, mut rx) = connected();
        let mut transcript = Transcript::new();
        let result = dispatch(&state, &mut transcript, "prime the assistant", true);
        assert_eq!(result, Ok(None));
        assert_eq!(rx.try_recv().unwrap(), "prime the assistant");
        assert!(transcript.store().is_empty());
        assert!(transcript.store().user_view().is_empty());
        assert!(transcript.store().assistant_view().is_empty());
    }

    #[test]
    fn test_send_after_transport_dropped() {
        let (state, rx) = connected();
        drop(rx);
        let mut transcript = Transcript::new();
        let result = dispatch(&state, &mut transcript, "hello", false);
        assert_eq!(result, Err(SendRejected::TransportGone));
        assert!(transcript.store().is_empty());
    }
}
