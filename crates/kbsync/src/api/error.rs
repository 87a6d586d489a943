//! API client error types.

use thiserror::Error;

/// Maximum length for error bodies kept in errors and logs.
const MAX_ERROR_BODY_LENGTH: usize = 200;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not authenticated: no session token")]
    NotAuthenticated,

    #[error("Session rejected by server (401)")]
    Unauthorized,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request failed ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("Server rejected request: {0}")]
    Rejected(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Builds a status error with a truncated body.
    pub fn status(status: u16, body: &str) -> Self {
        ApiError::Status {
            status,
            body: truncate_body(body),
        }
    }

    /// Returns true if the failure is likely transient (network, 5xx).
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) => true,
            ApiError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else if err.is_builder() {
            ApiError::InvalidRequest(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
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
    format!("{}... (truncated)", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ApiError::Network("reset".into()).is_transient());
        assert!(ApiError::status(503, "unavailable").is_transient());
        assert!(!ApiError::status(400, "bad").is_transient());
        assert!(!ApiError::Unauthorized.is_transient());
        assert!(!ApiError::Rejected("quota exceeded".into()).is_transient());
    }

    #[test]
    fn test_long_bodies_truncated() {
        let body = "é".repeat(300);
        match ApiError::status(500, &body) {
            ApiError::Status { body, .. } => {
                assert!(body.ends_with("... (truncated)"));
                assert!(body.len() < 300);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
