use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// No response was received.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// 4xx other than 401.
    #[error("{message}")]
    Client { status: StatusCode, message: String },

    #[error("{message}")]
    Server { status: StatusCode, message: String },

    /// A 401 seen by the transport. The pipeline recovers from the first one
    /// per request; callers only see this from login.
    #[error("{message}")]
    Unauthorized { message: String },

    /// The session was torn down and the user must sign in again.
    #[error("Session expired: {reason}")]
    SessionExpired { reason: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// The server's `detail` field, if the body is JSON and carries one.
    fn detail(body: &str) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        match value.get("detail")? {
            serde_json::Value::String(s) if s.trim().is_empty() => None,
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = Self::detail(body)
            .unwrap_or_else(|| format!("Status {}: {}", status, Self::truncate_body(body)));
        match status.as_u16() {
            401 => ApiError::Unauthorized { message },
            400..=499 => ApiError::Client { status, message },
            500..=599 => ApiError::Server { status, message },
            _ => ApiError::InvalidResponse(message),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired { .. })
    }
}
