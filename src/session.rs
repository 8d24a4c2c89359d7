//! Chat session: one connection, one transcript, one observer channel.
//!
//! A `ChatSession` is created once per logical chat and owns everything it
//! needs; nothing is shared between sessions. Caller operations
//! (`connect`, `disconnect`, `send`, `clear`) decide and return immediately.
//! Transport and timer events are applied by a background task in arrival
//! order.
//!
//! The mutable core lives behind a single mutex that is never held across an
//! `.await`, so snapshots taken by the presentation layer never observe a
//! half-applied frame.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::dispatcher::dispatch;
use crate::effects::{EffectRunner, TransportEvent, WebSocketRunner};
use crate::state_machine::{
    reduce, ConnectionState, ConnectionStatus, Effect, Event, ReconnectPolicy, State,
};
use crate::streaming::decode_frame;
use crate::transcript::{ConversationEntry, Transcript};

/// Capacity of the transport event channel
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Capacity of the observer channel
const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// How to reach the chat backend.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket URL, e.g. `ws://localhost:8000/ws`
    pub url: String,
    pub reconnect: ReconnectPolicy,
}

impl SessionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Notification sent to subscribers after every observable change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SessionUpdate {
    /// Connection state changed
    Connection(ConnectionStatus),
    /// Transcript changed; `len` is the new entry count
    Transcript { len: usize },
}

struct Core {
    connection: State,
    transcript: Transcript,
}

/// Shared by the caller-facing handle and the background event loop.
struct Shared {
    core: Mutex<Core>,
    runner: Arc<dyn EffectRunner>,
    events_tx: mpsc::Sender<TransportEvent>,
    updates: broadcast::Sender<SessionUpdate>,
    policy: ReconnectPolicy,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, update: SessionUpdate) {
        // No subscribers is fine
        let _ = self.updates.send(update);
    }

    /// Apply one connection event and run its effects, all under the lock so
    /// effects leave in the same order their transitions happened.
    fn apply(&self, event: Event) {
        let mut core = self.lock();

        let old_kind = core.connection.kind();
        let (next, effects) = reduce(&core.connection, event, &self.policy);
        let new_kind = next.kind();

        if old_kind != new_kind {
            log::info!("State transition: {:?} -> {:?}", old_kind, new_kind);
        }

        core.connection = next;

        for effect in effects {
            match effect {
                Effect::EmitUpdate => self.notify(SessionUpdate::Connection(core.connection.status())),
                other => self.runner.spawn(other, self.events_tx.clone()),
            }
        }
    }

    fn handle(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connection(event) => self.apply(event),
            TransportEvent::Frame { id, raw } => {
                let mut core = self.lock();
                if core.connection.connection_id() != Some(id) {
                    log::debug!("Dropping frame from stale transport {}", id);
                    return;
                }
                let frame = decode_frame(&raw);
                log::debug!(
                    "Received {} frame ({} bytes, id {:?})",
                    frame.kind(),
                    raw.len(),
                    frame.id()
                );
                if core.transcript.apply_frame(frame).changed() {
                    let len = core.transcript.store().len();
                    self.notify(SessionUpdate::Transcript { len });
                }
            }
        }
    }
}

/// Handle to a chat session.
///
/// Must be created inside a Tokio runtime. Dropping the handle disconnects.
pub struct ChatSession {
    shared: Arc<Shared>,
    loop_task: JoinHandle<()>,
}

impl ChatSession {
    /// Create a session that talks to a real WebSocket backend.
    pub fn new(config: SessionConfig) -> Self {
        let runner = WebSocketRunner::new(config.url);
        log::info!("Chat session for {}", runner.url());
        Self::with_runner(runner, config.reconnect)
    }

    /// Create a session with a custom effect runner.
    pub fn with_runner(runner: Arc<dyn EffectRunner>, policy: ReconnectPolicy) -> Self {
        let (events_tx, mut events_rx) = mpsc::channel::<TransportEvent>(EVENT_CHANNEL_CAPACITY);
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        let shared = Arc::new(Shared {
            core: Mutex::new(Core {
                connection: State::default(),
                transcript: Transcript::new(),
            }),
            runner,
            events_tx,
            updates,
            policy,
        });

        let loop_shared = shared.clone();
        let loop_task = tokio::spawn(async move {
            log::debug!("Session event loop started");
            while let Some(event) = events_rx.recv().await {
                loop_shared.handle(event);
            }
            log::debug!("Session event loop ended");
        });

        Self { shared, loop_task }
    }

    /// Open the connection. No-op while connecting or connected.
    pub fn connect(&self) {
        self.shared.apply(Event::Connect);
    }

    /// Close the connection and stop any reconnect. Entries are kept.
    pub fn disconnect(&self) {
        self.shared.apply(Event::Disconnect);
    }

    /// Send a message. Returns false (and changes nothing) when not connected
    /// or when `text` is blank. Silent messages are transmitted but never
    /// recorded.
    pub fn send(&self, text: &str, silent: bool) -> bool {
        let mut core = self.shared.lock();
        let core = &mut *core;
        match dispatch(&core.connection, &mut core.transcript, text, silent) {
            Ok(Some(_)) => {
                let len = core.transcript.store().len();
                self.shared.notify(SessionUpdate::Transcript { len });
                true
            }
            Ok(None) => true,
            Err(reason) => {
                log::debug!("Send rejected: {}", reason);
                false
            }
        }
    }

    /// Empty the transcript and forget any in-flight reply.
    pub fn clear(&self) {
        let mut core = self.shared.lock();
        core.transcript.clear();
        self.shared.notify(SessionUpdate::Transcript { len: 0 });
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.lock().connection.status()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().connection.kind()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Snapshot of every entry, in order.
    pub fn entries(&self) -> Vec<ConversationEntry> {
        self.shared.lock().transcript.store().entries().to_vec()
    }

    /// Snapshot of visible assistant entries, in order.
    pub fn assistant_view(&self) -> Vec<ConversationEntry> {
        let core = self.shared.lock();
        core.transcript
            .store()
            .assistant_view()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Snapshot of visible user entries, in order.
    pub fn user_view(&self) -> Vec<ConversationEntry> {
        let core = self.shared.lock();
        core.transcript
            .store()
            .user_view()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Index of the entry currently being streamed, if any.
    pub fn streaming_index(&self) -> Option<usize> {
        self.shared.lock().transcript.streaming_index()
    }

    /// Subscribe to connection and transcript changes.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.shared.updates.subscribe()
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.disconnect();
        self.loop_task.abort();
    }
}
