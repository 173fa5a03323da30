use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::errors::HubError;

/// One open duplex link carrying text frames.
#[async_trait]
pub trait HubTransport: Send {
    async fn send(&mut self, frame: String) -> Result<(), HubError>;
    /// Next text frame; `None` once the peer is gone.
    async fn recv(&mut self) -> Option<Result<String, HubError>>;
    async fn close(&mut self);
}

#[async_trait]
pub trait HubConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn HubTransport>, HubError>;
}

/// Direct WebSocket transport; negotiation is skipped.
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl HubConnector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn HubTransport>, HubError> {
        let (stream, response) = connect_async(url).await.map_err(|err| HubError::Connect {
            url: url.to_string(),
            reason: err.to_string(),
        })?;
        debug!(url, status = response.status().as_u16(), "WebSocket upgraded");
        Ok(Box::new(WebSocketTransport { stream }))
    }
}

#[async_trait]
impl HubTransport for WebSocketTransport {
    async fn send(&mut self, frame: String) -> Result<(), HubError> {
        self.stream
            .send(Message::Text(frame))
            .await
            .map_err(|err| HubError::Transport(err.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, HubError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(
                        String::from_utf8(bytes)
                            .map_err(|_| HubError::Protocol("binary frame is not UTF-8".into())),
                    )
                }
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "WebSocket closed by peer");
                    return None;
                }
                // ping/pong are answered by tungstenite itself
                Ok(_) => continue,
                Err(err) => return Some(Err(HubError::Transport(err.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(err) = self.stream.close(None).await {
            debug!(error = %err, "WebSocket close failed");
        }
    }
}
