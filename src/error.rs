// Error handling module
// Normalizes every failure source into one ErrorEnvelope-based taxonomy

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Maximum length for error response bodies kept in fallback messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Normalized failure object surfaced to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    /// Message suitable for direct display
    pub message: String,

    /// Originating HTTP status, `None` for network-level failures
    pub status_code: Option<u16>,

    /// Machine-readable code (`error` field of the body, or a failure class)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    /// Parsed response body, when there was one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl ErrorEnvelope {
    /// Fallback envelope carrying only the status and a generic message
    pub fn generic(status: StatusCode) -> Self {
        Self {
            message: format!(
                "Request failed with status {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            ),
            status_code: Some(status.as_u16()),
            error_code: None,
            raw: None,
        }
    }

    /// Build an envelope from a non-2xx response body
    ///
    /// JSON bodies carrying `message` and/or `error` are mapped directly.
    /// `message` may be a list of strings (validation failures), which is joined.
    /// Anything else falls back to [`ErrorEnvelope::generic`].
    pub fn from_body(status: StatusCode, body: &[u8]) -> Self {
        let Ok(raw) = serde_json::from_slice::<Value>(body) else {
            if !body.is_empty() {
                tracing::debug!(
                    status = status.as_u16(),
                    body = %truncate_body(&String::from_utf8_lossy(body)),
                    "Error body is not JSON, using generic envelope"
                );
            }
            return Self::generic(status);
        };

        let message = match raw.get("message") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Array(items)) => {
                let parts: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
                (!parts.is_empty()).then(|| parts.join(", "))
            }
            _ => None,
        };

        let error_code = ["errorCode", "error", "code"]
            .iter()
            .find_map(|key| raw.get(*key).and_then(Value::as_str))
            .map(str::to_string);

        if message.is_none() && error_code.is_none() {
            return Self {
                raw: Some(raw),
                ..Self::generic(status)
            };
        }

        Self {
            message: message
                .or_else(|| error_code.clone())
                .unwrap_or_default(),
            status_code: Some(status.as_u16()),
            error_code,
            raw: Some(raw),
        }
    }

    /// Build an envelope for a transport failure (no HTTP status)
    pub fn from_transport(err: &reqwest::Error) -> Self {
        Self {
            message: format!("Network error: {}", err),
            status_code: None,
            error_code: Some(transport_error_kind(err).to_string()),
            raw: None,
        }
    }
}

/// Categorize a reqwest error for logging and envelope codes
pub fn transport_error_kind(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connection_failed"
    } else if err.is_request() {
        "request_error"
    } else if err.is_body() {
        "body_error"
    } else if err.is_decode() {
        "decode_error"
    } else {
        "unknown"
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

/// Errors surfaced by the API client
#[derive(Error, Debug)]
pub enum ApiError {
    /// Connection refused, timeout, broken body stream
    #[error("{}", .0.message)]
    Network(ErrorEnvelope),

    /// 401 that could not be recovered by a refresh
    #[error("Authentication failed: {}", .0.message)]
    Unauthorized(ErrorEnvelope),

    /// Any other non-2xx response
    #[error("API error: {} - {}", .0.status_code.unwrap_or_default(), .0.message)]
    Status(ErrorEnvelope),

    /// Cancelled through the caller's signal
    #[error("Request aborted")]
    Aborted,

    /// 2xx body that could not be decoded into the requested type
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Request issued on a disposed session
    #[error("Session is closed")]
    SessionClosed,

    /// Request that could not be built (bad URL, unserializable body)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Map a non-2xx response into the matching error kind
    pub fn from_response(status: StatusCode, body: &[u8]) -> Self {
        let envelope = ErrorEnvelope::from_body(status, body);
        if status == StatusCode::UNAUTHORIZED {
            ApiError::Unauthorized(envelope)
        } else {
            ApiError::Status(envelope)
        }
    }

    /// Authentication error raised when a refresh could not produce a credential
    pub fn session_expired() -> Self {
        ApiError::Unauthorized(ErrorEnvelope {
            message: "Session expired, please sign in again".to_string(),
            status_code: Some(StatusCode::UNAUTHORIZED.as_u16()),
            error_code: Some("session_expired".to_string()),
            raw: None,
        })
    }

    /// The envelope carried by this error, if any
    pub fn envelope(&self) -> Option<&ErrorEnvelope> {
        match self {
            ApiError::Network(e) | ApiError::Unauthorized(e) | ApiError::Status(e) => Some(e),
            _ => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        self.envelope().and_then(|e| e.status_code)
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, ApiError::Aborted)
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Network(ErrorEnvelope::from_transport(&err))
    }
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_body_with_message_and_error() {
        let body = br#"{"statusCode":404,"message":"Property not found","error":"Not Found"}"#;
        let env = ErrorEnvelope::from_body(StatusCode::NOT_FOUND, body);

        assert_eq!(env.message, "Property not found");
        assert_eq!(env.status_code, Some(404));
        assert_eq!(env.error_code.as_deref(), Some("Not Found"));
        assert_eq!(env.raw.unwrap()["statusCode"], 404);
    }

    #[test]
    fn test_body_with_message_list() {
        let body = br#"{"message":["price must be positive","rooms must be an integer"],"error":"Bad Request"}"#;
        let env = ErrorEnvelope::from_body(StatusCode::BAD_REQUEST, body);

        assert_eq!(env.message, "price must be positive, rooms must be an integer");
        assert_eq!(env.error_code.as_deref(), Some("Bad Request"));
    }

    #[test]
    fn test_body_with_only_error_field() {
        let env = ErrorEnvelope::from_body(StatusCode::FORBIDDEN, br#"{"error":"forbidden"}"#);
        assert_eq!(env.message, "forbidden");
        assert_eq!(env.error_code.as_deref(), Some("forbidden"));
    }

    #[test]
    fn test_error_code_preferred_over_error() {
        let body = br#"{"message":"Listing archived","errorCode":"LISTING_ARCHIVED","error":"Gone"}"#;
        let env = ErrorEnvelope::from_body(StatusCode::GONE, body);
        assert_eq!(env.error_code.as_deref(), Some("LISTING_ARCHIVED"));
    }

    #[test]
    fn test_unparseable_body_falls_back() {
        let env = ErrorEnvelope::from_body(StatusCode::BAD_GATEWAY, b"<html>upstream down</html>");

        assert_eq!(env.status_code, Some(502));
        assert_eq!(env.message, "Request failed with status 502 Bad Gateway");
        assert!(env.error_code.is_none());
        assert!(env.raw.is_none());
    }

    #[test]
    fn test_json_without_known_fields_keeps_raw() {
        let env = ErrorEnvelope::from_body(StatusCode::INTERNAL_SERVER_ERROR, br#"{"detail":"x"}"#);
        assert_eq!(env.message, "Request failed with status 500 Internal Server Error");
        assert_eq!(env.raw, Some(json!({"detail": "x"})));
    }

    #[test]
    fn test_empty_body_falls_back() {
        let env = ErrorEnvelope::from_body(StatusCode::SERVICE_UNAVAILABLE, b"");
        assert_eq!(env.status_code, Some(503));
        assert!(env.message.contains("503"));
    }

    #[test]
    fn test_from_response_kinds() {
        let err = ApiError::from_response(StatusCode::UNAUTHORIZED, br#"{"message":"Bad credentials"}"#);
        assert!(err.is_unauthorized());
        assert_eq!(err.status_code(), Some(401));
        assert_eq!(err.to_string(), "Authentication failed: Bad credentials");

        let err = ApiError::from_response(StatusCode::TOO_MANY_REQUESTS, br#"{"message":"Slow down"}"#);
        assert!(matches!(err, ApiError::Status(_)));
        assert_eq!(err.to_string(), "API error: 429 - Slow down");
    }

    #[test]
    fn test_aborted_has_no_envelope() {
        let err = ApiError::Aborted;
        assert!(err.is_aborted());
        assert!(err.envelope().is_none());
        assert_eq!(err.status_code(), None);
        assert_eq!(err.to_string(), "Request aborted");
    }

    #[test]
    fn test_session_expired() {
        let err = ApiError::session_expired();
        assert!(err.is_unauthorized());
        assert_eq!(err.status_code(), Some(401));
        assert_eq!(
            err.envelope().and_then(|e| e.error_code.as_deref()),
            Some("session_expired")
        );
    }

    #[test]
    fn test_envelope_serialization_shape() {
        let env = ErrorEnvelope {
            message: "offline".to_string(),
            status_code: None,
            error_code: None,
            raw: None,
        };
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value, json!({"message": "offline", "statusCode": null}));
    }

    #[test]
    fn test_truncate_body() {
        let long = "é".repeat(400);
        let truncated = truncate_body(&long);
        assert!(truncated.contains("truncated, 800 total bytes"));
        assert_eq!(truncate_body("short"), "short");
    }
}
