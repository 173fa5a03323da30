use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("AI service returned HTTP {status}: {detail}")]
    Rejected { status: u16, detail: String },
    #[error("AI service returned an unreadable body: {0}")]
    Decode(String),
    #[error("image is empty")]
    EmptyImage,
}

impl AiError {
    pub fn user_message(&self) -> String {
        match self {
            AiError::Rejected { detail, .. } => detail.clone(),
            _ => "حدث خطأ أثناء تحليل الصورة. يرجى المحاولة مرة أخرى.".to_string(),
        }
    }
}
