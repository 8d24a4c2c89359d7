//! Connection state machine for the chat backend
//!
//! This module implements the connection lifecycle using a single-writer pattern.
//! All state transitions go through the `reduce()` function, which returns
//! a new state and a list of effects to execute.
//!
//! Every connection attempt gets its own id. Transport and timer events carry
//! the id they belong to, and events whose id is not current are stale and
//! ignored. A caller-initiated disconnect therefore cannot be undone by a
//! late handshake or a timer that was already firing.

use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Reconnect attempts after an unexpected closure
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// First reconnect delay (doubles with each attempt)
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Bounded exponential backoff for unexpected closures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            base_delay: RECONNECT_BASE_DELAY,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnecting when `attempts` reconnects have already been made.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempts))
    }
}

/// Sending half of a live connection. Frames are raw text.
#[derive(Debug, Clone)]
pub struct Outbound(mpsc::UnboundedSender<String>);

impl Outbound {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self(tx)
    }

    /// Queue a frame for the transport. Returns false if the transport is gone.
    pub fn send(&self, text: &str) -> bool {
        self.0.send(text.to_string()).is_ok()
    }
}

/// Connection state exposed to observers and UI gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Errored,
}

/// Snapshot of the connection for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub error: Option<String>,
    pub reconnect_attempts: u32,
}

/// Internal state of the connection.
/// This is the authoritative state - all transitions go through the reducer.
#[derive(Debug, Clone)]
pub enum State {
    Disconnected {
        error: Option<String>,
        attempts: u32,
        /// Id of the armed reconnect timer, if any
        reconnect: Option<Uuid>,
    },
    Connecting {
        id: Uuid,
        attempts: u32,
    },
    Connected {
        id: Uuid,
        outbound: Outbound,
    },
    Errored {
        id: Uuid,
        message: String,
        attempts: u32,
    },
}

impl Default for State {
    fn default() -> Self {
        State::Disconnected {
            error: None,
            attempts: 0,
            reconnect: None,
        }
    }
}

impl State {
    pub fn kind(&self) -> ConnectionState {
        match self {
            State::Disconnected { .. } => ConnectionState::Disconnected,
            State::Connecting { .. } => ConnectionState::Connecting,
            State::Connected { .. } => ConnectionState::Connected,
            State::Errored { .. } => ConnectionState::Errored,
        }
    }

    /// Id of the connection attempt that owns the transport, if any.
    pub fn connection_id(&self) -> Option<Uuid> {
        match self {
            State::Disconnected { .. } => None,
            State::Connecting { id, .. } | State::Connected { id, .. } | State::Errored { id, .. } => {
                Some(*id)
            }
        }
    }

    /// Sending half, only while connected.
    pub fn outbound(&self) -> Option<&Outbound> {
        match self {
            State::Connected { outbound, .. } => Some(outbound),
            _ => None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        let (error, reconnect_attempts) = match self {
            State::Disconnected { error, attempts, .. } => (error.clone(), *attempts),
            State::Connecting { attempts, .. } => (None, *attempts),
            State::Connected { .. } => (None, 0),
            State::Errored {
                message, attempts, ..
            } => (Some(message.clone()), *attempts),
        };
        ConnectionStatus {
            state: self.kind(),
            error,
            reconnect_attempts,
        }
    }
}

/// Events that can trigger state transitions.
/// These come from callers (connect/disconnect), the transport pump, and reconnect timers.
#[derive(Debug, Clone)]
pub enum Event {
    /// Caller asked to connect
    Connect,
    /// Caller asked to disconnect
    Disconnect,

    // Transport events
    Opened {
        id: Uuid,
        outbound: Outbound,
    },
    Failed {
        id: Uuid,
        message: String,
    },
    /// Transport closed without being asked to
    Closed {
        id: Uuid,
        reason: String,
    },

    /// Reconnect timer fired (includes id to prevent stale timers)
    ReconnectDue {
        id: Uuid,
    },
}

/// Effects to be executed after a state transition.
/// The effect runner handles these asynchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    OpenTransport { id: Uuid },
    CloseTransport { id: Uuid },
    ScheduleReconnect { id: Uuid, delay: Duration },
    CancelReconnect,
    /// Signal to notify subscribers of the new connection status
    EmitUpdate,
}

/// Reducer function: (state, event) -> (next_state, effects)
///
/// Key rules:
/// - Never mutate state directly
/// - Ignore events with stale connection or timer ids
/// - Always emit EmitUpdate after state changes
pub fn reduce(state: &State, event: Event, policy: &ReconnectPolicy) -> (State, Vec<Effect>) {
    use Effect::*;
    use Event::*;
    use State::*;

    let current_id = state.connection_id();
    let is_current = |eid: Uuid| current_id == Some(eid);

    match (state, event) {
        // -----------------
        // Caller requests
        // -----------------
        (Connecting { .. } | Connected { .. }, Connect) => (state.clone(), vec![]),
        (Disconnected { reconnect, .. }, Connect) => {
            let id = Uuid::new_v4();
            let mut effects = Vec::with_capacity(3);
            if reconnect.is_some() {
                effects.push(CancelReconnect);
            }
            effects.extend([OpenTransport { id }, EmitUpdate]);
            (Connecting { id, attempts: 0 }, effects)
        }
        (Errored { id: old, .. }, Connect) => {
            let id = Uuid::new_v4();
            (
                Connecting { id, attempts: 0 },
                vec![CloseTransport { id: *old }, OpenTransport { id }, EmitUpdate],
            )
        }

        (Disconnected { error, .. }, Disconnect) => (
            Disconnected {
                error: error.clone(),
                attempts: 0,
                reconnect: None,
            },
            vec![CancelReconnect, EmitUpdate],
        ),
        (Connecting { id, .. } | Connected { id, .. }, Disconnect) => (
            Disconnected {
                error: None,
                attempts: 0,
                reconnect: None,
            },
            vec![CancelReconnect, CloseTransport { id: *id }, EmitUpdate],
        ),
        (Errored { id, message, .. }, Disconnect) => (
            Disconnected {
                error: Some(message.clone()),
                attempts: 0,
                reconnect: None,
            },
            vec![CancelReconnect, CloseTransport { id: *id }, EmitUpdate],
        ),

        // -----------------
        // Transport events
        // -----------------
        (Connecting { id: cur, .. }, Opened { id, outbound }) if *cur == id => {
            (Connected { id, outbound }, vec![EmitUpdate])
        }
        // Handshake finished for an attempt nobody wants anymore
        (_, Opened { id, .. }) if !is_current(id) => (state.clone(), vec![CloseTransport { id }]),

        (Connecting { id: cur, attempts }, Failed { id, message }) if *cur == id => (
            Errored {
                id,
                message,
                attempts: *attempts,
            },
            vec![EmitUpdate],
        ),
        (Connected { id: cur, .. }, Failed { id, message }) if *cur == id => (
            Errored {
                id,
                message,
                attempts: 0,
            },
            vec![EmitUpdate],
        ),

        (Connecting { id: cur, attempts }, Closed { id, reason }) if *cur == id => {
            on_unexpected_close(id, None, *attempts, &reason, policy)
        }
        (Connected { id: cur, .. }, Closed { id, reason }) if *cur == id => {
            on_unexpected_close(id, None, 0, &reason, policy)
        }
        (
            Errored {
                id: cur,
                message,
                attempts,
            },
            Closed { id, reason },
        ) if *cur == id => on_unexpected_close(id, Some(message.clone()), *attempts, &reason, policy),

        // -----------------
        // Reconnect timer
        // -----------------
        (
            Disconnected {
                reconnect: Some(timer),
                attempts,
                ..
            },
            ReconnectDue { id },
        ) if *timer == id => {
            let id = Uuid::new_v4();
            (
                Connecting {
                    id,
                    attempts: attempts + 1,
                },
                vec![OpenTransport { id }, EmitUpdate],
            )
        }

        // -----------------
        // Fallback: stale or irrelevant events
        // -----------------
        (_, event) => {
            log::debug!("Ignoring event {:?} in state {:?}", event, state.kind());
            (state.clone(), vec![])
        }
    }
}

fn on_unexpected_close(
    id: Uuid,
    error: Option<String>,
    attempts: u32,
    reason: &str,
    policy: &ReconnectPolicy,
) -> (State, Vec<Effect>) {
    use Effect::*;

    if attempts < policy.max_attempts {
        let timer = Uuid::new_v4();
        let delay = policy.delay_for(attempts);
        log::info!(
            "Connection closed ({}), reconnecting in {:?} (attempt {}/{})",
            reason,
            delay,
            attempts + 1,
            policy.max_attempts
        );
        (
            State::Disconnected {
                error,
                attempts,
                reconnect: Some(timer),
            },
            vec![
                CloseTransport { id },
                ScheduleReconnect { id: timer, delay },
                EmitUpdate,
            ],
        )
    } else {
        log::warn!(
            "Connection closed ({}), giving up after {} reconnect attempts",
            reason,
            attempts
        );
        let message = match error {
            Some(e) => format!("{} (gave up after {} reconnect attempts)", e, attempts),
            None => format!("Connection lost; gave up after {} reconnect attempts", attempts),
        };
        (
            State::Disconnected {
                error: Some(message),
                attempts,
                reconnect: None,
            },
            vec![CloseTransport { id }, EmitUpdate],
        )
    }
}
