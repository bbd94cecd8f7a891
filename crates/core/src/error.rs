//! Error types for the TAOR domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use std::time::Duration;
use thiserror::Error;

/// The top-level error type for all TAOR operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Session persistence ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider{}", retry_after.map(|d| format!(", retry after {}s", d.as_secs())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// HTTP statuses treated as transient.
const RETRYABLE_STATUSES: [u16; 4] = [429, 500, 502, 503];

impl ProviderError {
    /// Map a non-success HTTP status into the error taxonomy.
    pub fn from_status(status_code: u16, message: String, retry_after: Option<Duration>) -> Self {
        match status_code {
            429 => Self::RateLimited { retry_after },
            401 | 403 => Self::AuthenticationFailed(message),
            400 | 404 | 422 => Self::InvalidRequest(format!("{message} (status: {status_code})")),
            _ => Self::ApiError {
                status_code,
                message,
            },
        }
    }

    /// Whether a retry could plausibly succeed.
    ///
    /// Auth and validation failures are never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network(_) | Self::Timeout(_) => true,
            Self::ApiError { status_code, .. } => RETRYABLE_STATUSES.contains(status_code),
            Self::AuthenticationFailed(_)
            | Self::InvalidRequest(_)
            | Self::NotConfigured(_)
            | Self::InvalidResponse(_) => false,
        }
    }

    /// Server-supplied delay hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("A tool named '{0}' is already registered")]
    DuplicateName(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session storage error: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 502,
            message: "Bad gateway".into(),
        });
        assert!(err.to_string().contains("502"));
        assert!(err.to_string().contains("Bad gateway"));
    }

    #[test]
    fn rate_limit_display_includes_hint() {
        let err = ProviderError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert!(err.to_string().contains("retry after 7s"));
    }

    #[test]
    fn status_classification() {
        assert!(ProviderError::from_status(429, String::new(), None).is_retryable());
        assert!(ProviderError::from_status(500, String::new(), None).is_retryable());
        assert!(ProviderError::from_status(502, String::new(), None).is_retryable());
        assert!(ProviderError::from_status(503, String::new(), None).is_retryable());
        assert!(!ProviderError::from_status(400, String::new(), None).is_retryable());
        assert!(!ProviderError::from_status(401, String::new(), None).is_retryable());
        assert!(!ProviderError::from_status(403, String::new(), None).is_retryable());
        assert!(!ProviderError::from_status(504, String::new(), None).is_retryable());
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::DuplicateName("search".into()));
        assert!(err.to_string().contains("search"));
        assert!(err.to_string().contains("already registered"));
    }
}
