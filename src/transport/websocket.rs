//! WebSocket transport
//!
//! Serves a `MemoryBroker` to remote receivers and senders. Responsibilities:
//! - Accept TCP/WebSocket connections until the shutdown token fires
//! - Translate each JSON request into one broker call and reply
//! - Track the locks each connection holds and abandon them when the
//!   connection goes away, so nothing waits for lock expiry

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use super::message::{ClientMessage, ErrorKind, ServerMessage};
use crate::broker::{EntityPath, MemoryBroker, Received};

pub async fn start_websocket_server(
    addr: &str,
    broker: Arc<MemoryBroker>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, broker, shutdown).await
}

/// Accepts connections on an already-bound listener. Returns once `shutdown`
/// fires and every connection task has finished.
pub async fn serve(
    listener: TcpListener,
    broker: Arc<MemoryBroker>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    info!("Broker listening on ws://{}", listener.local_addr()?);
    let tracker = TaskTracker::new();

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    continue;
                }
            },
        };

        let broker = broker.clone();
        let shutdown = shutdown.clone();
        tracker.spawn(handle_connection(stream, peer, broker, shutdown));
    }

    tracker.close();
    tracker.wait().await;
    info!("Broker stopped");
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    broker: Arc<MemoryBroker>,
    shutdown: CancellationToken,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, error = %e, "WebSocket handshake error");
            return;
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let mut connection = Connection::new(broker);
    debug!(connection = %connection.id, %peer, "client connected");

    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = ws_receiver.next() => frame,
        };
        let text = match frame {
            Some(Ok(WsMessage::Text(text))) => text,
            Some(Ok(WsMessage::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!(connection = %connection.id, error = %e, "read failed");
                break;
            }
        };

        let reply = match serde_json::from_str::<ClientMessage>(&text) {
            Ok(request) => {
                // Only one request is in flight, so any frame arriving now
                // means the client went away or broke protocol.
                tokio::select! {
                    biased;
                    reply = connection.dispatch(request, &shutdown) => reply,
                    _ = ws_receiver.next() => {
                        debug!(connection = %connection.id, "client left with a request in flight");
                        break;
                    }
                }
            }
            Err(e) => {
                warn!(
                    connection = %connection.id,
                    error = %e,
                    "Invalid client message | {}",
                    text.chars().take(100).collect::<String>()
                );
                ServerMessage::Error {
                    kind: ErrorKind::BadRequest,
                    message: format!("invalid request: {e}"),
                }
            }
        };

        let json = match serde_json::to_string(&reply) {
            Ok(json) => json,
            Err(e) => {
                error!(connection = %connection.id, error = %e, "Failed to serialize reply");
                break;
            }
        };
        if let Err(e) = ws_sender.send(WsMessage::text(json)).await {
            // A delivered envelope in this reply stays in `held` and is
            // released below.
            debug!(connection = %connection.id, error = %e, "write failed");
            break;
        }
    }

    connection.release();
    let _ = ws_sender.close().await;
    debug!(connection = %connection.id, "client disconnected");
}

/// Per-connection view of the broker.
struct Connection {
    id: String,
    broker: Arc<MemoryBroker>,
    held: HashMap<EntityPath, HashSet<Uuid>>,
}

impl Connection {
    fn new(broker: Arc<MemoryBroker>) -> Self {
        Self {
            id: format!("conn-{}", Uuid::new_v4()),
            broker,
            held: HashMap::new(),
        }
    }

    async fn dispatch(&mut self, request: ClientMessage, shutdown: &CancellationToken) -> ServerMessage {
        match request {
            ClientMessage::Send { entity, message } => match self.broker.send(&entity, message) {
                Ok(message_id) => {
                    debug!(connection = %self.id, %entity, %message_id, "sent");
                    ServerMessage::Sent { message_id }
                }
                Err(e) => e.into(),
            },
            ClientMessage::Receive { entity, timeout_ms } => {
                let timeout = timeout_ms.map(Duration::from_millis);
                match self.broker.receive(&entity, timeout, shutdown).await {
                    Ok(Received::Message(envelope)) => {
                        self.held
                            .entry(entity)
                            .or_default()
                            .insert(envelope.lock_token);
                        ServerMessage::Delivered { envelope }
                    }
                    Ok(Received::Empty) | Ok(Received::Cancelled) => ServerMessage::Empty {},
                    Err(e) => e.into(),
                }
            }
            ClientMessage::Complete { entity, lock_token } => {
                let result = self.broker.complete(&entity, lock_token);
                self.settled(&entity, lock_token);
                result.map_or_else(Into::into, |_| ServerMessage::Ok {})
            }
            ClientMessage::DeadLetter {
                entity,
                lock_token,
                reason,
                description,
            } => {
                let result = self
                    .broker
                    .dead_letter(&entity, lock_token, &reason, &description);
                self.settled(&entity, lock_token);
                result.map_or_else(Into::into, |_| ServerMessage::Ok {})
            }
            ClientMessage::Abandon { entity, lock_token } => {
                let result = self.broker.abandon(&entity, lock_token);
                self.settled(&entity, lock_token);
                result.map_or_else(Into::into, |_| ServerMessage::Ok {})
            }
        }
    }

    fn settled(&mut self, entity: &EntityPath, lock_token: Uuid) {
        if let Some(tokens) = self.held.get_mut(entity) {
            tokens.remove(&lock_token);
        }
    }

    /// Abandons every lock this connection still holds.
    fn release(&mut self) {
        for (entity, tokens) in self.held.drain() {
            if tokens.is_empty() {
                continue;
            }
            let tokens: Vec<Uuid> = tokens.into_iter().collect();
            debug!(connection = %self.id, %entity, count = tokens.len(), "releasing held locks");
            self.broker.release_locks(&entity, &tokens);
        }
    }
}
