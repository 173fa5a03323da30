use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("hub handshake failed: {0}")]
    Handshake(String),
    #[error("hub protocol error: {0}")]
    Protocol(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("connection closed: {0}")]
    Closed(String),
}
