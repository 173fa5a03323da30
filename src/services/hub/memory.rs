use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use super::errors::HubError;
use super::protocol::{self, HubMessage};
use super::transport::{HubConnector, HubTransport};

/// Connector whose connections are in-process channel pairs. Each accepted
/// connection hands its server side to the test through a channel.
pub(crate) struct MemoryConnector {
    attempts: AtomicUsize,
    failures_left: AtomicUsize,
    accepted: mpsc::UnboundedSender<ServerEnd>,
}

impl MemoryConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted, servers) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            attempts: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
            accepted,
        });
        (connector, servers)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Refuse the next `count` connection attempts.
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl HubConnector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn HubTransport>, HubError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if refused {
            return Err(HubError::Connect {
                url: url.to_string(),
                reason: "connection refused".into(),
            });
        }

        let (to_client, from_server) = mpsc::unbounded_channel();
        let (to_server, from_client) = mpsc::unbounded_channel();
        // handshake ack is queued before the client asks for it
        let _ = to_client.send(format!("{{}}{}", protocol::RECORD_SEPARATOR));
        let _ = self.accepted.send(ServerEnd {
            to_client,
            from_client,
        });
        Ok(Box::new(MemoryTransport {
            incoming: from_server,
            outgoing: to_server,
        }))
    }
}

struct MemoryTransport {
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl HubTransport for MemoryTransport {
    async fn send(&mut self, frame: String) -> Result<(), HubError> {
        self.outgoing
            .send(frame)
            .map_err(|_| HubError::Transport("server end dropped".into()))
    }

    async fn recv(&mut self) -> Option<Result<String, HubError>> {
        self.incoming.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.incoming.close();
    }
}

/// Server side of one in-memory connection. Dropping it looks like a lost
/// connection to the client.
pub(crate) struct ServerEnd {
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    pub fn send(&self, message: &HubMessage) {
        let _ = self.to_client.send(protocol::encode(message));
    }

    pub fn push_event(&self, target: &str, arguments: Vec<Value>) {
        self.send(&HubMessage::Invocation {
            invocation_id: None,
            target: target.to_string(),
            arguments,
        });
    }

    /// Next message from the client, skipping the handshake and pings.
    pub async fn next_message(&mut self) -> Option<HubMessage> {
        loop {
            let frame = self.from_client.recv().await?;
            if frame.contains("\"protocol\"") {
                continue;
            }
            for record in protocol::parse_records(&frame) {
                match record {
                    Ok(HubMessage::Ping) | Err(_) => continue,
                    Ok(message) => return Some(message),
                }
            }
        }
    }
}
