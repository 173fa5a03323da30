use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no session token is stored")]
    MissingSession,
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: &'static str, status: u16 },
    #[error("{endpoint} was rejected: {message}")]
    Rejected {
        endpoint: &'static str,
        message: String,
    },
    #[error("{endpoint} returned an unexpected body: {detail}")]
    Decode {
        endpoint: &'static str,
        detail: String,
    },
}

impl ApiError {
    /// Message suitable for an inline error line in a view.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Rejected { message, .. } if !message.is_empty() => message.clone(),
            ApiError::MissingSession => "Sign in required".to_string(),
            ApiError::Transport { .. } => "Could not reach the server".to_string(),
            _ => "The request failed, please try again".to_string(),
        }
    }
}
