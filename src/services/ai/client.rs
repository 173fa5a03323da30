use std::sync::Arc;

use reqwest::{
    multipart::{Form, Part},
    Client, Response,
};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::errors::AiError;
use crate::config::Config;
use crate::session::Session;

/// An image picked for analysis.
#[derive(Debug, Clone)]
pub struct ScanImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Inference result. The services disagree on field names, so every field is
/// optional and the raw body is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnosis {
    pub diagnosis: Option<String>,
    pub diagnosis_en: Option<String>,
    pub confidence: Option<String>,
    pub advice: Option<String>,
    pub raw: Value,
}

impl Diagnosis {
    pub fn from_body(raw: Value) -> Self {
        let diagnosis = ["analysis", "class_label_ar", "class_label_en"]
            .iter()
            .find_map(|key| text_field(&raw, key));
        Self {
            diagnosis,
            diagnosis_en: text_field(&raw, "class_label_en"),
            confidence: text_field(&raw, "confidence_level"),
            advice: text_field(&raw, "generated_advice"),
            raw,
        }
    }
}

/// Non-empty string, or the JSON text of a number.
fn text_field(body: &Value, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub struct AiClient {
    client: Client,
    config: Arc<Config>,
    session: Session,
}

impl AiClient {
    pub fn new(client: Client, config: Arc<Config>, session: Session) -> Self {
        Self {
            client,
            config,
            session,
        }
    }

    /// Uploads an image to the prediction service. The caller's role goes in
    /// the query string, lowercased.
    pub async fn diagnose(
        &self,
        image: ScanImage,
        patient_id: Option<&str>,
    ) -> Result<Diagnosis, AiError> {
        if image.bytes.is_empty() {
            return Err(AiError::EmptyImage);
        }
        let role = self.session.get_user_role().to_lowercase();

        let mut form = Form::new().part("file", Part::bytes(image.bytes).file_name(image.file_name));
        if let Some(patient_id) = patient_id {
            form = form.text("patient_id", patient_id.to_string());
        }

        let mut req = self
            .client
            .post(&self.config.ai_predict_url)
            .query(&[("user_role", role.as_str())])
            .multipart(form);
        if let Some(token) = self.session.get_token() {
            req = req.bearer_auth(token);
        }

        debug!(url = %self.config.ai_predict_url, %role, "Submitting image for analysis");
        let res = req.send().await?;
        let body = Self::json_or_rejection(res).await?;
        Ok(Diagnosis::from_body(body))
    }

    /// Sends one chat message and returns the assistant's JSON reply as is.
    pub async fn chat(&self, message: &str, user_role: &str) -> Result<Value, AiError> {
        let url = format!("{}/chat/", self.config.ai_chat_url.trim_end_matches('/'));
        let res = self
            .client
            .post(&url)
            .json(&json!({ "message": message, "user_role": user_role }))
            .send()
            .await?;
        Self::json_or_rejection(res).await
    }

    async fn json_or_rejection(res: Response) -> Result<Value, AiError> {
        let status = res.status();
        if !status.is_success() {
            let detail = res
                .json::<Value>()
                .await
                .ok()
                .and_then(|body| body.get("detail").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| format!("API Error: {}", status.as_u16()));
            warn!(status = status.as_u16(), %detail, "AI service rejected request");
            return Err(AiError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }
        res.json::<Value>()
            .await
            .map_err(|err| AiError::Decode(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{test_tokens::token_for, MemoryTokenStore};
    use httpmock::prelude::*;

    fn client_for(server: &MockServer, token: Option<String>) -> AiClient {
        let mut config = Config::for_api_base(server.url("/api"));
        config.ai_predict_url = server.url("/predict");
        config.ai_chat_url = server.url("");
        let store = match token {
            Some(token) => MemoryTokenStore::with_token(token),
            None => MemoryTokenStore::new(),
        };
        AiClient::new(Client::new(), Arc::new(config), Session::new(Arc::new(store)))
    }

    fn scan() -> ScanImage {
        ScanImage {
            file_name: "lesion.jpg".into(),
            bytes: vec![0xff, 0xd8, 0xff, 0xe0],
        }
    }

    #[tokio::test]
    async fn diagnose_sends_role_token_and_patient() {
        let server = MockServer::start();
        let token = token_for("d1", "Doctor", 3600);
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/predict")
                .query_param("user_role", "doctor")
                .header("authorization", format!("Bearer {token}"))
                .body_contains("name=\"patient_id\"")
                .body_contains("p-42");
            then.status(200).json_body(json!({
                "class_label_ar": "إكزيما",
                "class_label_en": "Eczema",
                "confidence_level": 0.93,
                "generated_advice": "Keep the area moisturised."
            }));
        });

        let client = client_for(&server, Some(token.clone()));
        let result = client.diagnose(scan(), Some("p-42")).await.unwrap();

        mock.assert();
        assert_eq!(result.diagnosis.as_deref(), Some("إكزيما"));
        assert_eq!(result.diagnosis_en.as_deref(), Some("Eczema"));
        assert_eq!(result.confidence.as_deref(), Some("0.93"));
        assert_eq!(result.advice.as_deref(), Some("Keep the area moisturised."));
    }

    #[tokio::test]
    async fn signed_out_upload_uses_fallback_role_without_auth() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/predict")
                .query_param("user_role", "patient");
            then.status(200).json_body(json!({"analysis": "benign"}));
        });

        let result = client_for(&server, None).diagnose(scan(), None).await.unwrap();

        mock.assert();
        assert_eq!(result.diagnosis.as_deref(), Some("benign"));
        assert_eq!(result.diagnosis_en, None);
    }

    #[test]
    fn diagnosis_prefers_analysis_then_arabic_then_english() {
        let only_en = Diagnosis::from_body(json!({"analysis": "", "class_label_en": "Acne"}));
        assert_eq!(only_en.diagnosis.as_deref(), Some("Acne"));

        let both = Diagnosis::from_body(json!({"analysis": "x", "class_label_ar": "y"}));
        assert_eq!(both.diagnosis.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn diagnose_failure_status_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/predict");
            then.status(503).body("overloaded");
        });

        let err = client_for(&server, None).diagnose(scan(), None).await.unwrap_err();
        assert!(matches!(err, AiError::Rejected { status: 503, .. }));
    }

    #[tokio::test]
    async fn empty_image_is_refused_locally() {
        let server = MockServer::start();
        let image = ScanImage {
            file_name: "empty.png".into(),
            bytes: Vec::new(),
        };
        let err = client_for(&server, None).diagnose(image, None).await.unwrap_err();
        assert!(matches!(err, AiError::EmptyImage));
    }

    #[tokio::test]
    async fn chat_surfaces_server_detail() {
        let server = MockServer::start();
        let ok = server.mock(|when, then| {
            when.method(POST)
                .path("/chat/")
                .json_body(json!({"message": "hello", "user_role": "patient"}));
            then.status(200).json_body(json!({"response": "Hi there"}));
        });
        let client = client_for(&server, None);

        let reply = client.chat("hello", "patient").await.unwrap();
        ok.assert();
        assert_eq!(reply["response"], "Hi there");

        server.mock(|when, then| {
            when.method(POST).path("/chat/").json_body(json!({"message": "", "user_role": "patient"}));
            then.status(422).json_body(json!({"detail": "message must not be empty"}));
        });
        let err = client.chat("", "patient").await.unwrap_err();
        assert_eq!(err.user_message(), "message must not be empty");
    }
}
