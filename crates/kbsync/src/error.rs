use std::path::PathBuf;
use thiserror::Error;

use crate::api::ApiError;
use crate::auth::CredentialError;
use crate::telemetry::TelemetryError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Errors surfaced by `UploadOrchestrator::submit`.
///
/// A user cancelling a duplicate prompt is not an error; it is reported as
/// `UploadOutcome::Cancelled`.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("File '{0}' is empty")]
    EmptyFile(String),

    #[error("File '{name}' rejected: {reason}")]
    Rejected { name: String, reason: String },

    #[error("An upload of '{0}' is already in progress")]
    AlreadyInFlight(String),

    #[error("Duplicate check for '{name}' failed: {source}")]
    DuplicateCheck {
        name: String,
        #[source]
        source: ApiError,
    },

    #[error("Upload of '{name}' failed: {source}")]
    Transfer {
        name: String,
        #[source]
        source: ApiError,
    },
}

pub type Result<T> = std::result::Result<T, SyncError>;
