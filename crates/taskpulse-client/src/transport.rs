//! Transport abstraction and its WebSocket implementation.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use taskpulse_core::{FeedError, FeedResult};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// An open, bidirectional text channel.
#[async_trait]
pub trait Transport: Send {
    /// Send one text frame.
    async fn send(&mut self, text: String) -> FeedResult<()>;

    /// Next inbound text frame. `None` once the peer has closed.
    async fn recv(&mut self) -> Option<FeedResult<String>>;

    /// Close the channel. Must be safe on an already closed transport.
    async fn close(&mut self);
}

/// Opens transports. One call, one connection attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> FeedResult<Box<dyn Transport>>;
}

/// Connects to a `ws://` or `wss://` endpoint with `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> FeedResult<Box<dyn Transport>> {
        let (stream, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| FeedError::Connect(format!("{}: {}", self.url, e)))?;
        debug!(url = %self.url, "WebSocket transport opened");
        Ok(Box::new(WsTransport { stream }))
    }
}

struct WsTransport {
    stream: WsStream,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> FeedResult<()> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| FeedError::transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<FeedResult<String>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(FeedError::transport(e.to_string()))),
            };
            match msg {
                Message::Text(text) => return Some(Ok(text.as_str().to_owned())),
                Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => {
                        debug!("Ignoring non-UTF-8 binary frame");
                        continue;
                    }
                },
                Message::Close(_) => return None,
                // Ping/pong handled by tungstenite.
                _ => continue,
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "WebSocket close failed (already closed?)");
        }
    }
}
