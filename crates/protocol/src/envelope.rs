//! JSON-RPC 2.0 envelopes and line framing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, RpcError};

pub const JSONRPC_VERSION: &str = "2.0";

/// A request: carries an id and expects exactly one response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl Request {
    pub fn new(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id: Value::from(id),
            method: method.into(),
            params,
        }
    }
}

/// A response to one request, correlated by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// A one-way message with no id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Any message that can appear on a line.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Request(Request),
    Notification(Notification),
    Response(Response),
}

impl Envelope {
    /// Parse one line.
    ///
    /// Malformed JSON is a [`ProtocolError::Parse`]; well-formed JSON that is
    /// not a JSON-RPC 2.0 message is a [`ProtocolError::InvalidRequest`].
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| ProtocolError::Parse(e.to_string()))?;

        let Some(object) = value.as_object() else {
            return Err(ProtocolError::InvalidRequest(
                "message must be a JSON object".into(),
            ));
        };
        if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(ProtocolError::InvalidRequest(format!(
                "'jsonrpc' must be \"{JSONRPC_VERSION}\""
            )));
        }

        let has_id = object.get("id").is_some_and(|id| !id.is_null());
        let invalid = |e: serde_json::Error| ProtocolError::InvalidRequest(e.to_string());

        if object.contains_key("method") {
            if has_id {
                serde_json::from_value(value).map(Self::Request).map_err(invalid)
            } else {
                serde_json::from_value(value)
                    .map(Self::Notification)
                    .map_err(invalid)
            }
        } else if object.contains_key("result") || object.contains_key("error") {
            serde_json::from_value(value).map(Self::Response).map_err(invalid)
        } else {
            Err(ProtocolError::InvalidRequest(
                "message has neither 'method' nor 'result'/'error'".into(),
            ))
        }
    }

    /// Best-effort id of a line that failed to parse as a request, so the
    /// error response can still be correlated.
    pub fn salvage_id(line: &str) -> Value {
        serde_json::from_str::<Value>(line)
            .ok()
            .and_then(|v| v.get("id").cloned())
            .unwrap_or(Value::Null)
    }
}

/// Serialize any envelope as a single line (no trailing newline).
pub fn to_line<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_request() {
        let line = r#"{"jsonrpc":"2.0","id":7,"method":"message/send","params":{"text":"hi"}}"#;
        match Envelope::parse(line).unwrap() {
            Envelope::Request(req) => {
                assert_eq!(req.id, json!(7));
                assert_eq!(req.method, "message/send");
                assert_eq!(req.params["text"], "hi");
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn parses_notification_and_response() {
        let n = Envelope::parse(r#"{"jsonrpc":"2.0","method":"turn/started","params":{}}"#);
        assert!(matches!(n, Ok(Envelope::Notification(_))));

        let r = Envelope::parse(r#"{"jsonrpc":"2.0","id":"a","result":{"ok":true}}"#).unwrap();
        match r {
            Envelope::Response(resp) => assert_eq!(resp.into_result().unwrap()["ok"], true),
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn error_response_into_result() {
        let resp = Response::failure(
            json!(3),
            RpcError {
                code: -32601,
                message: "nope".into(),
                data: None,
            },
        );
        let line = to_line(&resp).unwrap();
        assert!(!line.contains("result"));
        assert_eq!(resp.into_result().unwrap_err().code, -32601);
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = Envelope::parse("{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Parse(_)));
        assert_eq!(Envelope::salvage_id("{not json"), Value::Null);
    }

    #[test]
    fn wrong_shape_is_invalid_request() {
        assert!(matches!(
            Envelope::parse("[1,2]"),
            Err(ProtocolError::InvalidRequest(_))
        ));
        assert!(matches!(
            Envelope::parse(r#"{"jsonrpc":"1.0","id":1,"method":"x"}"#),
            Err(ProtocolError::InvalidRequest(_))
        ));
        assert!(matches!(
            Envelope::parse(r#"{"jsonrpc":"2.0","id":1}"#),
            Err(ProtocolError::InvalidRequest(_))
        ));
        assert_eq!(
            Envelope::salvage_id(r#"{"jsonrpc":"1.0","id":9,"method":"x"}"#),
            json!(9)
        );
    }

    #[test]
    fn request_without_params_serializes_compactly() {
        let line = to_line(&Request::new(1, "shutdown", Value::Null)).unwrap();
        assert_eq!(line, r#"{"jsonrpc":"2.0","id":1,"method":"shutdown"}"#);
    }
}
