//! Effect runner for the chat connection
//!
//! This module executes effects produced by the connection state machine:
//! opening and closing WebSocket transports and arming reconnect timers.
//! Results flow back to the session as [`TransportEvent`]s.
//!
//! # Transport Pump
//!
//! ```text
//! OpenTransport{id} ──▶ connect (timeout) ──▶ Opened{id, outbound}
//!                                               │
//!              outbound rx ──▶ ws write         │
//!              ws read ──▶ Frame{id, raw} ◀─────┘
//!              close/error ──▶ Failed{id} + Closed{id}
//! ```
//!
//! A cancelled pump closes its socket and reports nothing: cancellation only
//! ever comes from the state machine, which already knows.

use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{client::IntoClientRequest, Message},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::state_machine::{Effect, Event, Outbound};
use crate::streaming::ConnectionError;

/// Connection timeout for the WebSocket handshake
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything the runner reports back to the session, in arrival order.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Input for the connection state machine
    Connection(Event),
    /// Raw inbound text frame from the transport with this id
    Frame { id: Uuid, raw: String },
}

/// Trait for running effects asynchronously.
/// Completion events are sent back via the provided channel.
pub trait EffectRunner: Send + Sync + 'static {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<TransportEvent>);
}

/// Real effect runner backed by tokio-tungstenite.
pub struct WebSocketRunner {
    url: String,
    /// Live transport pumps, keyed by connection attempt id
    transports: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
    /// The single armed reconnect timer
    reconnect_timer: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketRunner {
    pub fn new(url: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            url: url.into(),
            transports: Arc::new(Mutex::new(HashMap::new())),
            reconnect_timer: Mutex::new(None),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Number of transports that have not been closed yet.
    pub fn live_transports(&self) -> usize {
        self.transports.lock().map(|t| t.len()).unwrap_or(0)
    }

    fn cancel_timer(&self) {
        if let Ok(mut timer) = self.reconnect_timer.lock() {
            if let Some(handle) = timer.take() {
                log::debug!("Cancelling pending reconnect timer");
                handle.abort();
            }
        }
    }

    fn close_transport(&self, id: Uuid) {
        let token = self.transports.lock().ok().and_then(|mut t| t.remove(&id));
        if let Some(token) = token {
            log::debug!("Closing transport {}", id);
            token.cancel();
        }
    }
}

impl EffectRunner for WebSocketRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<TransportEvent>) {
        match effect {
            Effect::OpenTransport { id } => {
                let cancel = CancellationToken::new();
                if let Ok(mut transports) = self.transports.lock() {
                    transports.insert(id, cancel.clone());
                }
                let url = self.url.clone();
                tokio::spawn(async move {
                    run_transport(url, id, cancel, tx).await;
                });
            }
            Effect::CloseTransport { id } => self.close_transport(id),
            Effect::ScheduleReconnect { id, delay } => {
                // A pending timer is always replaced, never doubled up
                self.cancel_timer();
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    log::debug!("Reconnect timer {} fired", id);
                    let _ = tx
                        .send(TransportEvent::Connection(Event::ReconnectDue { id }))
                        .await;
                });
                if let Ok(mut timer) = self.reconnect_timer.lock() {
                    *timer = Some(handle);
                }
            }
            Effect::CancelReconnect => self.cancel_timer(),
            Effect::EmitUpdate => {
                // Handled by the session
            }
        }
    }
}

impl Drop for WebSocketRunner {
    fn drop(&mut self) {
        self.cancel_timer();
        if let Ok(mut transports) = self.transports.lock() {
            for (_, token) in transports.drain() {
                token.cancel();
            }
        }
    }
}

/// Report a transport failure. Failures are always followed by a close.
async fn report_failure(tx: &mpsc::Sender<TransportEvent>, id: Uuid, error: ConnectionError) {
    log::warn!("Transport {} failed: {}", id, error);
    let reason = error.to_string();
    let _ = tx
        .send(TransportEvent::Connection(Event::Failed {
            id,
            message: reason.clone(),
        }))
        .await;
    let _ = tx
        .send(TransportEvent::Connection(Event::Closed { id, reason }))
        .await;
}

/// Connect, then pump frames in both directions until closed or cancelled.
async fn run_transport(
    url: String,
    id: Uuid,
    cancel: CancellationToken,
    tx: mpsc::Sender<TransportEvent>,
) {
    let request = match url.as_str().into_client_request() {
        Ok(request) => request,
        Err(e) => {
            report_failure(&tx, id, ConnectionError::InvalidUrl(e.to_string())).await;
            return;
        }
    };

    log::info!("Connecting to chat backend at {}...", url);

    let connected = tokio::select! {
        biased;

        _ = cancel.cancelled() => {
            log::debug!("Transport {} cancelled during handshake", id);
            return;
        }

        result = timeout(CONNECTION_TIMEOUT, connect_async_with_config(request, None, false)) => result,
    };

    let ws_stream = match connected {
        Ok(Ok((ws_stream, _response))) => ws_stream,
        Ok(Err(e)) => {
            report_failure(&tx, id, ConnectionError::ConnectionFailed(e.to_string())).await;
            return;
        }
        Err(_) => {
            report_failure(
                &tx,
                id,
                ConnectionError::ConnectionFailed("Connection timeout".to_string()),
            )
            .await;
            return;
        }
    };

    log::info!("WebSocket connected ({})", id);

    let (mut write, mut read) = ws_stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();

    if tx
        .send(TransportEvent::Connection(Event::Opened {
            id,
            outbound: Outbound::new(outbound_tx),
        }))
        .await
        .is_err()
    {
        log::debug!("Session gone before transport {} opened", id);
        return;
    }

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                log::info!("Closing WebSocket ({})", id);
                if let Err(e) = write.close().await {
                    log::warn!("Error closing WebSocket: {}", e);
                }
                break;
            }

            Some(text) = outbound_rx.recv() => {
                if let Err(e) = write.send(Message::Text(text)).await {
                    report_failure(&tx, id, ConnectionError::SendFailed(e.to_string())).await;
                    break;
                }
            }

            msg = read.next() => match msg {
                Some(Ok(Message::Text(raw))) => {
                    if tx.send(TransportEvent::Frame { id, raw }).await.is_err() {
                        log::debug!("Session channel closed");
                        break;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(raw) => {
                        if tx.send(TransportEvent::Frame { id, raw }).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => log::debug!("Ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                        .unwrap_or_else(|| "closed by server".to_string());
                    log::info!("WebSocket closed by server: {}", reason);
                    let _ = tx
                        .send(TransportEvent::Connection(Event::Closed { id, reason }))
                        .await;
                    break;
                }
                Some(Ok(_)) => {} // Ignore ping/pong/raw frames
                Some(Err(e)) => {
                    report_failure(&tx, id, ConnectionError::ProtocolError(e.to_string())).await;
                    break;
                }
                None => {
                    let reason = ConnectionError::Disconnected("Stream ended".to_string()).to_string();
                    let _ = tx
                        .send(TransportEvent::Connection(Event::Closed { id, reason }))
                        .await;
                    break;
                }
            }
        }
    }

    log::debug!("Transport {} exiting", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_timer_fires_after_delay() {
        let runner = WebSocketRunner::new("ws://127.0.0.1:9");
        let (tx, mut rx) = mpsc::channel(8);
        let id = Uuid::new_v4();
        let start = Instant::now();

        runner.spawn(
            Effect::ScheduleReconnect {
                id,
                delay: Duration::from_secs(4),
            },
            tx.clone(),
        );

        match rx.recv().await {
            Some(TransportEvent::Connection(Event::ReconnectDue { id: fired })) => {
                assert_eq!(fired, id)
            }
            other => panic!("Expected ReconnectDue, got {:?}", other),
        }
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let runner = WebSocketRunner::new("ws://127.0.0.1:9");
        let (tx, mut rx) = mpsc::channel(8);

        runner.spawn(
            Effect::ScheduleReconnect {
                id: Uuid::new_v4(),
                delay: Duration::from_secs(1),
            },
            tx.clone(),
        );
        runner.spawn(Effect::CancelReconnect, tx.clone());

        let result = timeout(Duration::from_secs(60), rx.recv()).await;
        assert!(result.is_err(), "timer should not fire: {:?}", result);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_timer_replaces_pending_one() {
        let runner = WebSocketRunner::new("ws://127.0.0.1:9");
        let (tx, mut rx) = mpsc::channel(8);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        runner.spawn(
            Effect::ScheduleReconnect {
                id: first,
                delay: Duration::from_secs(1),
            },
            tx.clone(),
        );
        runner.spawn(
            Effect::ScheduleReconnect {
                id: second,
                delay: Duration::from_secs(2),
            },
            tx.clone(),
        );

        match rx.recv().await {
            Some(TransportEvent::Connection(Event::ReconnectDue { id })) => assert_eq!(id, second),
            other => panic!("Expected ReconnectDue, got {:?}", other),
        }
        assert!(timeout(Duration::from_secs(60), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_url_reports_failure_then_close() {
        let runner = WebSocketRunner::new("not a url");
        let (tx, mut rx) = mpsc::channel(8);
        let id = Uuid::new_v4();

        runner.spawn(Effect::OpenTransport { id }, tx);

        match rx.recv().await {
            Some(TransportEvent::Connection(Event::Failed { id: failed, message })) => {
                assert_eq!(failed, id);
                assert!(message.contains("Invalid chat backend URL"));
            }
            other => panic!("Expected Failed, got {:?}", other),
        }
        assert!(matches!(
            rx.recv().await,
            Some(TransportEvent::Connection(Event::Closed { .. }))
        ));
    }

    #[test]
    fn test_runner_keeps_configured_url() {
        let runner = WebSocketRunner::new("ws://localhost:8000/ws");
        assert_eq!(runner.url(), "ws://localhost:8000/ws");
        assert_eq!(runner.live_transports(), 0);
    }

    #[tokio::test]
    async fn test_close_transport_forgets_it() {
        let runner = WebSocketRunner::new("ws://127.0.0.1:9");
        let (tx, _rx) = mpsc::channel(8);
        let id = Uuid::new_v4();

        runner.spawn(Effect::OpenTransport { id }, tx.clone());
        assert_eq!(runner.live_transports(), 1);

        runner.spawn(Effect::CloseTransport { id }, tx);
        assert_eq!(runner.live_transports(), 0);
    }
}
