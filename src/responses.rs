use serde::{Deserialize, Serialize};

/// Envelope every portal REST response is wrapped in. `data` is only
/// meaningful when `succeeded` is true.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub succeeded: bool,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    pub fn success(data: T) -> Self {
        ApiEnvelope {
            succeeded: true,
            message: None,
            errors: None,
            data: Some(data),
        }
    }

    /// Server message plus any listed errors, joined the way the portal
    /// shows them.
    pub fn describe(&self) -> String {
        let mut out = self.message.clone().unwrap_or_default();
        if let Some(errors) = self.errors.as_ref().filter(|e| !e.is_empty()) {
            if !out.is_empty() {
                out.push_str(": ");
            }
            out.push_str(&errors.join(", "));
        }
        out
    }

    /// `Some(data)` only for a successful envelope carrying data.
    pub fn into_data(self) -> Option<T> {
        if self.succeeded {
            self.data
        } else {
            None
        }
    }
}
