// WebSocket client transport with a fixed-delay reconnection policy.
//
// The transport owns the socket and nothing else: it reports connection
// transitions and raw text frames, and writes whatever text it is handed.
// Room membership and resync decisions belong to the channel manager.

use std::fmt::Display;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::config::RealtimeConfig;

/// Events emitted by the transport to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    /// The socket dropped. A reconnect attempt follows unless the policy is
    /// exhausted.
    Disconnected,
    Reconnecting { attempt: u32 },
    /// A text frame (raw JSON string).
    Frame(String),
    /// Reconnection attempts are exhausted; the transport has stopped.
    GaveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl From<&RealtimeConfig> for ReconnectPolicy {
    fn from(config: &RealtimeConfig) -> Self {
        ReconnectPolicy {
            delay: config.reconnection_delay(),
            max_attempts: config.reconnection_attempts,
        }
    }
}

/// Why a connection pump returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The socket closed or errored.
    Dropped,
    /// The event receiver is gone; stop everything.
    EventsClosed,
    /// Every outbound sender is gone; close the socket and stop.
    OutboundClosed,
}

// ---------------------------------------------------------------------------
// WsTransport
// ---------------------------------------------------------------------------

/// Handle to a running transport task.
pub struct WsTransport {
    pub outbound: mpsc::UnboundedSender<String>,
    pub events: mpsc::Receiver<TransportEvent>,
    pub task: JoinHandle<()>,
}

impl WsTransport {
    /// Spawn the connect/reconnect loop for `url`.
    pub fn spawn(url: String, policy: ReconnectPolicy, buffer: usize) -> WsTransport {
        let (event_tx, events) = mpsc::channel(buffer);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(url, policy, event_tx, outbound_rx));
        WsTransport {
            outbound,
            events,
            task,
        }
    }
}

/// Connect, pump frames, and reconnect after drops until the policy gives up
/// or either channel closes.
pub async fn run(
    url: String,
    policy: ReconnectPolicy,
    tx: mpsc::Sender<TransportEvent>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    let mut attempt: u32 = 0;

    loop {
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((ws_stream, _response)) => {
                info!("Connected to {url}");
                attempt = 0;

                // Anything queued while offline targeted the old connection.
                while outbound.try_recv().is_ok() {}

                if tx.send(TransportEvent::Connected).await.is_err() {
                    return;
                }

                let (mut write, read) = ws_stream.split();
                match pump_connection(read, &mut write, &mut outbound, &tx).await {
                    PumpExit::Dropped => {}
                    PumpExit::EventsClosed => return,
                    PumpExit::OutboundClosed => {
                        let _ = write.close().await;
                        return;
                    }
                }

                warn!("Connection to {url} dropped");
                if tx.send(TransportEvent::Disconnected).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!("Failed to connect to {url}: {e}");
            }
        }

        attempt += 1;
        if attempt > policy.max_attempts {
            warn!("Giving up on {url} after {} attempts", policy.max_attempts);
            let _ = tx.send(TransportEvent::GaveUp).await;
            return;
        }

        if tx
            .send(TransportEvent::Reconnecting { attempt })
            .await
            .is_err()
        {
            return;
        }
        tokio::time::sleep(policy.delay).await;
    }
}

/// Shuttle one connection: inbound text frames to `tx`, outbound strings to
/// `write`. Generic over the stream and sink so it can be tested with
/// in-memory values.
pub async fn pump_connection<R, W>(
    mut read: R,
    write: &mut W,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    tx: &mpsc::Sender<TransportEvent>,
) -> PumpExit
where
    R: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if tx.send(TransportEvent::Frame(text.to_string())).await.is_err() {
                        return PumpExit::EventsClosed;
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    info!("Server sent close frame");
                    return PumpExit::Dropped;
                }
                Some(Err(e)) => {
                    warn!("WebSocket error: {e}");
                    return PumpExit::Dropped;
                }
                None => return PumpExit::Dropped,
                Some(Ok(_)) => {
                    // Ignore Binary, Ping, Pong, Frame variants.
                }
            },
            out = outbound.recv() => match out {
                Some(text) => {
                    debug!("-> {text}");
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        warn!("WebSocket write failed: {e}");
                        return PumpExit::Dropped;
                    }
                }
                None => return PumpExit::OutboundClosed,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
