//! SignalR JSON hub protocol, version 1.
//!
//! Every record is a JSON object followed by the ASCII record separator.
//! A single transport message may carry several records.

use serde_json::{json, Map, Value};

use super::errors::HubError;

pub const RECORD_SEPARATOR: char = '\u{1e}';

const TYPE_INVOCATION: u64 = 1;
const TYPE_COMPLETION: u64 = 3;
const TYPE_PING: u64 = 6;
const TYPE_CLOSE: u64 = 7;

#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
    },
    Completion {
        invocation_id: String,
        result: Option<Value>,
        error: Option<String>,
    },
    Ping,
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
    /// Stream items, cancellations and anything newer than this client.
    Unsupported(u64),
}

pub fn handshake_request() -> String {
    format!(r#"{{"protocol":"json","version":1}}{RECORD_SEPARATOR}"#)
}

/// Splits the first record off `text` and checks it is a successful
/// handshake response. Returns whatever followed it.
pub fn parse_handshake_response(text: &str) -> Result<&str, HubError> {
    let (record, rest) = text
        .split_once(RECORD_SEPARATOR)
        .ok_or_else(|| HubError::Handshake("incomplete handshake response".into()))?;
    let value: Value = serde_json::from_str(record)
        .map_err(|err| HubError::Handshake(format!("unreadable handshake response: {err}")))?;
    match value.get("error").and_then(Value::as_str) {
        Some(error) => Err(HubError::Handshake(error.to_string())),
        None => Ok(rest),
    }
}

/// Parses every complete record in `text`. A trailing fragment without a
/// separator is ignored.
pub fn parse_records(text: &str) -> Vec<Result<HubMessage, HubError>> {
    let mut records: Vec<&str> = text.split(RECORD_SEPARATOR).collect();
    // the piece after the last separator is never a complete record
    records.pop();
    records
        .into_iter()
        .filter(|record| !record.trim().is_empty())
        .map(parse_record)
        .collect()
}

fn parse_record(record: &str) -> Result<HubMessage, HubError> {
    let value: Value = serde_json::from_str(record)
        .map_err(|err| HubError::Protocol(format!("invalid record: {err}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| HubError::Protocol("record is not an object".into()))?;
    let kind = object
        .get("type")
        .and_then(Value::as_u64)
        .ok_or_else(|| HubError::Protocol("record has no type".into()))?;

    let message = match kind {
        TYPE_INVOCATION => HubMessage::Invocation {
            invocation_id: str_field(object, "invocationId"),
            target: str_field(object, "target")
                .ok_or_else(|| HubError::Protocol("invocation without target".into()))?,
            arguments: match object.get("arguments") {
                Some(Value::Array(args)) => args.clone(),
                _ => Vec::new(),
            },
        },
        TYPE_COMPLETION => HubMessage::Completion {
            invocation_id: str_field(object, "invocationId")
                .ok_or_else(|| HubError::Protocol("completion without invocationId".into()))?,
            result: object.get("result").cloned(),
            error: str_field(object, "error"),
        },
        TYPE_PING => HubMessage::Ping,
        TYPE_CLOSE => HubMessage::Close {
            error: str_field(object, "error"),
            allow_reconnect: object
                .get("allowReconnect")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        },
        other => HubMessage::Unsupported(other),
    };
    Ok(message)
}

fn str_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

pub fn encode(message: &HubMessage) -> String {
    let value = match message {
        HubMessage::Invocation {
            invocation_id,
            target,
            arguments,
        } => {
            let mut value = json!({
                "type": TYPE_INVOCATION,
                "target": target,
                "arguments": arguments,
            });
            if let Some(id) = invocation_id {
                value["invocationId"] = Value::String(id.clone());
            }
            value
        }
        HubMessage::Completion {
            invocation_id,
            result,
            error,
        } => {
            let mut value = json!({"type": TYPE_COMPLETION, "invocationId": invocation_id});
            if let Some(result) = result {
                value["result"] = result.clone();
            }
            if let Some(error) = error {
                value["error"] = Value::String(error.clone());
            }
            value
        }
        HubMessage::Ping => json!({"type": TYPE_PING}),
        HubMessage::Close {
            error,
            allow_reconnect,
        } => {
            let mut value = json!({"type": TYPE_CLOSE, "allowReconnect": allow_reconnect});
            if let Some(error) = error {
                value["error"] = Value::String(error.clone());
            }
            value
        }
        HubMessage::Unsupported(kind) => json!({"type": kind}),
    };
    format!("{value}{RECORD_SEPARATOR}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_request_is_terminated() {
        let request = handshake_request();
        assert!(request.ends_with(RECORD_SEPARATOR));
        let body: Value = serde_json::from_str(request.trim_end_matches(RECORD_SEPARATOR)).unwrap();
        assert_eq!(body, json!({"protocol": "json", "version": 1}));
    }

    #[test]
    fn handshake_response_may_carry_following_records() {
        let text = format!("{{}}{RECORD_SEPARATOR}{{\"type\":6}}{RECORD_SEPARATOR}");
        let rest = parse_handshake_response(&text).unwrap();
        assert_eq!(parse_records(rest), vec![Ok(HubMessage::Ping)]);
    }

    #[test]
    fn handshake_error_is_reported() {
        let text = format!("{{\"error\":\"protocol not supported\"}}{RECORD_SEPARATOR}");
        assert!(matches!(
            parse_handshake_response(&text),
            Err(HubError::Handshake(msg)) if msg == "protocol not supported"
        ));
        assert!(parse_handshake_response("{}").is_err());
    }

    #[test]
    fn parses_batched_records() {
        let text = format!(
            "{{\"type\":1,\"target\":\"AppointmentCreated\",\"arguments\":[{{\"id\":\"a1\"}}]}}{rs}\
             {{\"type\":3,\"invocationId\":\"7\",\"result\":5}}{rs}\
             {{\"type\":7,\"error\":\"bye\",\"allowReconnect\":true}}{rs}\
             {{\"type\":2,\"invocationId\":\"8\",\"item\":1}}{rs}partial",
            rs = RECORD_SEPARATOR
        );

        let messages: Vec<HubMessage> = parse_records(&text).into_iter().map(Result::unwrap).collect();
        assert_eq!(
            messages,
            vec![
                HubMessage::Invocation {
                    invocation_id: None,
                    target: "AppointmentCreated".into(),
                    arguments: vec![json!({"id": "a1"})],
                },
                HubMessage::Completion {
                    invocation_id: "7".into(),
                    result: Some(json!(5)),
                    error: None,
                },
                HubMessage::Close {
                    error: Some("bye".into()),
                    allow_reconnect: true,
                },
                HubMessage::Unsupported(2),
            ]
        );
    }

    #[test]
    fn malformed_record_does_not_poison_the_batch() {
        let text = format!("not json{RECORD_SEPARATOR}{{\"type\":6}}{RECORD_SEPARATOR}");
        let parsed = parse_records(&text);
        assert!(parsed[0].is_err());
        assert_eq!(parsed[1], Ok(HubMessage::Ping));
    }

    #[test]
    fn encoded_invocation_parses_back() {
        let message = HubMessage::Invocation {
            invocation_id: Some("1".into()),
            target: "JoinGroup".into(),
            arguments: vec![json!("doctor-7")],
        };
        let frame = encode(&message);
        assert_eq!(parse_records(&frame), vec![Ok(message)]);
    }
}
