use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("No credential available for the event stream")]
    NotAuthenticated,

    #[error("Event stream request failed: {0}")]
    Connect(String),

    #[error("Event stream rejected with HTTP {status}")]
    Status { status: u16 },

    #[error("Event stream interrupted: {0}")]
    Interrupted(String),

    #[error("Event stream closed by server")]
    Closed,

    #[error("Malformed {event} event: {message}")]
    Payload { event: String, message: String },
}

impl TelemetryError {
    /// Whether the error counts against the reconnect budget.
    pub fn is_connection_failure(&self) -> bool {
        !matches!(self, TelemetryError::Payload { .. })
    }

    /// The server refused the credential; retrying with it cannot succeed.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TelemetryError::Status { status: 401 })
    }
}

impl From<reqwest::Error> for TelemetryError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            TelemetryError::Status {
                status: status.as_u16(),
            }
        } else {
            TelemetryError::Connect(err.to_string())
        }
    }
}
