//! Error types for the vtiger client.
//!
//! # Design
//! `InvalidResponse` is the web service saying no: anything other than a
//! `{"success": true, "result": ...}` envelope. It keeps the raw body plus
//! the server's error code and message when the body carried them.
//! Transport failures (DNS, refused connections, timeouts) are wrapped
//! without inspection so the underlying error stays reachable via `source()`.

use thiserror::Error;

/// Maximum length for raw bodies rendered in error messages.
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Errors returned by the adapter and by `VtigerClient` operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server did not answer with a successful envelope.
    #[error("invalid response: {}", describe_invalid(.code.as_deref(), .message.as_deref(), .raw))]
    InvalidResponse {
        code: Option<String>,
        message: Option<String>,
        raw: String,
    },

    /// The HTTP exchange itself failed.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// An entity could not be encoded, or a result could not be decoded into
    /// the requested type.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A successful envelope was missing a field the handshake depends on.
    #[error("unexpected payload: {0}")]
    UnexpectedPayload(String),

    /// The entity passed to an operation cannot be sent as-is.
    #[error("invalid entity: {0}")]
    InvalidEntity(String),

    /// A required environment variable is missing or empty.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// Wrap any transport-level error.
    pub fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ApiError::Transport(Box::new(err))
    }

    /// The vtiger error code (`INVALID_SESSIONID`, `ACCESS_DENIED`, ...) if the
    /// server reported one.
    pub fn server_code(&self) -> Option<&str> {
        match self {
            ApiError::InvalidResponse { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

fn describe_invalid(code: Option<&str>, message: Option<&str>, raw: &str) -> String {
    match (code, message) {
        (Some(code), Some(message)) => format!("{code}: {message}"),
        (Some(code), None) => code.to_string(),
        (None, Some(message)) => message.to_string(),
        (None, None) => truncate_body(raw),
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_response_prefers_server_error() {
        let err = ApiError::InvalidResponse {
            code: Some("INVALID_SESSIONID".to_string()),
            message: Some("Session Identifier provided is Invalid".to_string()),
            raw: "{}".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid response: INVALID_SESSIONID: Session Identifier provided is Invalid"
        );
        assert_eq!(err.server_code(), Some("INVALID_SESSIONID"));
    }

    #[test]
    fn invalid_response_truncates_long_bodies() {
        let raw = "x".repeat(2000);
        let err = ApiError::InvalidResponse {
            code: None,
            message: None,
            raw: raw.clone(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("truncated, 2000 total bytes"));
        assert!(rendered.len() < raw.len());
        assert!(matches!(err, ApiError::InvalidResponse { raw: ref r, .. } if r.len() == 2000));
    }

    #[test]
    fn config_error_names_the_problem() {
        let err = ApiError::Config("VTIGER_HOST is not set".to_string());
        assert_eq!(err.to_string(), "configuration error: VTIGER_HOST is not set");
        assert!(err.server_code().is_none());
    }

    #[test]
    fn transport_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = ApiError::transport(io);
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "refused");
        assert!(err.server_code().is_none());
    }
}
