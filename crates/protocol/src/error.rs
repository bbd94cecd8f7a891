//! Protocol errors and their JSON-RPC codes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JSON-RPC error codes used by the server.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    /// A request other than `initialize` arrived before the session existed.
    pub const NOT_INITIALIZED: i64 = -32002;

    /// The session is running a turn and cannot take this request now.
    pub const BUSY: i64 = -32003;
}

/// The `error` member of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// Everything that can go wrong handling one protocol message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Session not initialized; send 'initialize' first")]
    NotInitialized,

    #[error("Session busy: {0}")]
    Busy(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProtocolError {
    pub fn code(&self) -> i64 {
        match self {
            Self::Parse(_) => codes::PARSE_ERROR,
            Self::InvalidRequest(_) => codes::INVALID_REQUEST,
            Self::MethodNotFound(_) => codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => codes::INVALID_PARAMS,
            Self::NotInitialized => codes::NOT_INITIALIZED,
            Self::Busy(_) => codes::BUSY,
            Self::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    pub fn to_rpc(&self) -> RpcError {
        RpcError {
            code: self.code(),
            message: self.to_string(),
            data: None,
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_variants() {
        assert_eq!(ProtocolError::Parse("x".into()).code(), -32700);
        assert_eq!(ProtocolError::MethodNotFound("x".into()).code(), -32601);
        assert_eq!(ProtocolError::InvalidParams("x".into()).code(), -32602);
        assert_eq!(ProtocolError::NotInitialized.code(), -32002);
        assert_eq!(ProtocolError::Busy("turn running".into()).code(), -32003);
        assert_eq!(ProtocolError::Internal("x".into()).code(), -32603);
    }

    #[test]
    fn rpc_error_omits_empty_data() {
        let json = serde_json::to_value(ProtocolError::NotInitialized.to_rpc()).unwrap();
        assert_eq!(json["code"], -32002);
        assert!(json.get("data").is_none());
    }
}
