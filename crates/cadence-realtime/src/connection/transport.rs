//! Transport seam between the connection manager and the network.

use async_trait::async_trait;
use cadence_core::SessionKey;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::errors::{RealtimeError, Result};

/// What a transport observed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame.
    Message(String),
    /// A transport error. The transport is expected to close afterwards.
    Error(String),
    /// The transport closed.
    Closed,
}

/// An open bidirectional text channel.
#[async_trait]
pub trait Transport: Send {
    /// Wait for the next event. Returns [`TransportEvent::Closed`] once the
    /// transport is done, and keeps returning it.
    async fn recv(&mut self) -> TransportEvent;

    /// Send a text frame.
    async fn send(&mut self, text: String) -> Result<()>;

    /// Close the transport. Errors are ignored.
    async fn close(&mut self);
}

/// Opens transports for session keys.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a transport for `key`. Resolves once the transport is open.
    async fn connect(&self, key: &SessionKey) -> Result<Box<dyn Transport>>;
}

/// Connects to `{base_url}/{key}` over WebSocket.
#[derive(Clone, Debug)]
pub struct WsConnector {
    base_url: String,
}

impl WsConnector {
    /// Create a connector for a `ws://` or `wss://` base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Endpoint for `key`.
    pub fn endpoint(&self, key: &SessionKey) -> Result<String> {
        if key.is_empty() || key.contains('/') {
            return Err(RealtimeError::InvalidEndpoint {
                key: key.clone(),
                reason: "session key must be a single non-empty path segment".into(),
            });
        }
        Ok(format!("{}/{}", self.base_url.trim_end_matches('/'), key))
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, key: &SessionKey) -> Result<Box<dyn Transport>> {
        let url = self.endpoint(key)?;
        debug!(session_key = %key, url = %url, "opening websocket");
        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        Ok(Box::new(WsTransport { stream, done: false }))
    }
}

/// A tokio-tungstenite client stream.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    done: bool,
}

#[async_trait]
impl Transport for WsTransport {
    async fn recv(&mut self) -> TransportEvent {
        if self.done {
            return TransportEvent::Closed;
        }
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return TransportEvent::Message(text.as_str().to_owned()),
                Some(Ok(Message::Binary(data))) => {
                    debug!(len = data.len(), "ignoring binary frame");
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.done = true;
                    return TransportEvent::Closed;
                }
                // Ping/pong is answered by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    self.done = true;
                    return TransportEvent::Error(e.to_string());
                }
            }
        }
    }

    async fn send(&mut self, text: String) -> Result<()> {
        if self.done {
            return Err(RealtimeError::Closed);
        }
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if !self.done {
            self.done = true;
            let _ = self.stream.close(None).await;
        }
    }
}
