//! Remote receivers and senders
//!
//! `RemoteReceiver` and `RemoteSender` implement the broker traits over a
//! WebSocket connection to the broker server, so the consumption loop and
//! the publishing path run unchanged against a broker in another process.
//!
//! Each handle owns one connection and issues one request at a time. A
//! receive interrupted by cancellation leaves a reply outstanding, so the
//! connection is closed and later calls fail with `SourceError::Closed`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use super::message::{ClientMessage, ServerMessage};
use crate::broker::{EntityPath, Envelope, MessageSender, MessageSource, OutgoingMessage, Received};
use crate::utils::error::SourceError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct RemoteConnection {
    endpoint: String,
    stream: Mutex<Option<WsStream>>,
}

impl RemoteConnection {
    async fn connect(endpoint: &str) -> Result<Self, SourceError> {
        let (stream, _response) = connect_async(endpoint).await?;
        debug!(%endpoint, "connected to broker");
        Ok(Self {
            endpoint: endpoint.to_string(),
            stream: Mutex::new(Some(stream)),
        })
    }

    /// Sends one request and waits for its reply. `Ok(None)` means `cancel`
    /// fired first; the connection is closed in that case.
    async fn call(
        &self,
        request: &ClientMessage,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<ServerMessage>, SourceError> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(SourceError::Closed)?;

        let text = serde_json::to_string(request)?;
        let sent = stream.send(WsMessage::text(text)).await;

        let reply = match sent {
            Err(e) => Some(Err(SourceError::from(e))),
            Ok(()) => match cancel {
                Some(cancel) => tokio::select! {
                    _ = cancel.cancelled() => None,
                    reply = read_reply(stream) => Some(reply),
                },
                None => Some(read_reply(stream).await),
            },
        };

        match reply {
            None => {
                debug!(endpoint = %self.endpoint, "request cancelled, closing connection");
                if let Some(mut stream) = guard.take() {
                    let _ = stream.close(None).await;
                }
                Ok(None)
            }
            Some(Err(e)) => {
                if e.is_fatal() {
                    guard.take();
                }
                Err(e)
            }
            Some(Ok(reply)) => Ok(Some(reply)),
        }
    }

    async fn call_ok(&self, request: &ClientMessage, lock_token: Uuid) -> Result<(), SourceError> {
        match self.call(request, None).await? {
            Some(ServerMessage::Ok {}) => Ok(()),
            Some(other) => Err(other.into_source_error(Some(lock_token))),
            None => Err(SourceError::Closed),
        }
    }

    async fn close(&self) -> Result<(), SourceError> {
        if let Some(mut stream) = self.stream.lock().await.take() {
            stream.close(None).await?;
        }
        Ok(())
    }
}

async fn read_reply(stream: &mut WsStream) -> Result<ServerMessage, SourceError> {
    loop {
        match stream.next().await {
            Some(Ok(WsMessage::Text(text))) => return Ok(serde_json::from_str(&text)?),
            Some(Ok(WsMessage::Close(_))) | None => return Err(SourceError::Closed),
            Some(Ok(WsMessage::Binary(_))) => {
                return Err(SourceError::Protocol("unexpected binary frame".to_string()));
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

/// `MessageSource` for one queue or subscription on a remote broker.
pub struct RemoteReceiver {
    connection: RemoteConnection,
    entity: EntityPath,
}

impl RemoteReceiver {
    pub async fn connect(endpoint: &str, entity: EntityPath) -> Result<Self, SourceError> {
        Ok(Self {
            connection: RemoteConnection::connect(endpoint).await?,
            entity,
        })
    }

    pub fn entity(&self) -> &EntityPath {
        &self.entity
    }

    pub async fn close(&self) -> Result<(), SourceError> {
        self.connection.close().await
    }
}

#[async_trait]
impl MessageSource for RemoteReceiver {
    async fn receive(
        &self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Received, SourceError> {
        let request = ClientMessage::Receive {
            entity: self.entity.clone(),
            timeout_ms: timeout.map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX)),
        };
        match self.connection.call(&request, Some(cancel)).await? {
            None => Ok(Received::Cancelled),
            Some(ServerMessage::Delivered { envelope }) => Ok(Received::Message(envelope)),
            Some(ServerMessage::Empty {}) => Ok(Received::Empty),
            Some(other) => Err(other.into_source_error(None)),
        }
    }

    async fn complete(&self, envelope: &Envelope) -> Result<(), SourceError> {
        let request = ClientMessage::Complete {
            entity: self.entity.clone(),
            lock_token: envelope.lock_token,
        };
        self.connection.call_ok(&request, envelope.lock_token).await
    }

    async fn dead_letter(
        &self,
        envelope: &Envelope,
        reason: &str,
        description: &str,
    ) -> Result<(), SourceError> {
        let request = ClientMessage::DeadLetter {
            entity: self.entity.clone(),
            lock_token: envelope.lock_token,
            reason: reason.to_string(),
            description: description.to_string(),
        };
        self.connection.call_ok(&request, envelope.lock_token).await
    }

    async fn abandon(&self, envelope: &Envelope) -> Result<(), SourceError> {
        let request = ClientMessage::Abandon {
            entity: self.entity.clone(),
            lock_token: envelope.lock_token,
        };
        self.connection.call_ok(&request, envelope.lock_token).await
    }
}

/// `MessageSender` for one queue or topic on a remote broker.
pub struct RemoteSender {
    connection: RemoteConnection,
    entity: EntityPath,
}

impl RemoteSender {
    pub async fn connect(endpoint: &str, entity: EntityPath) -> Result<Self, SourceError> {
        Ok(Self {
            connection: RemoteConnection::connect(endpoint).await?,
            entity,
        })
    }

    pub async fn close(&self) -> Result<(), SourceError> {
        self.connection.close().await
    }
}

#[async_trait]
impl MessageSender for RemoteSender {
    async fn send(&self, message: OutgoingMessage) -> Result<String, SourceError> {
        let request = ClientMessage::Send {
            entity: self.entity.clone(),
            message,
        };
        match self.connection.call(&request, None).await? {
            Some(ServerMessage::Sent { message_id }) => Ok(message_id),
            Some(other) => Err(other.into_source_error(None)),
            None => Err(SourceError::Closed),
        }
    }
}
