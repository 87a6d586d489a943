use std::path::Path;

use crate::config::schema::SyncConfig;
use crate::error::ConfigError;

/// Overrides `apiBaseUrl` when set.
pub const API_URL_ENV_VAR: &str = "KBSYNC_API_URL";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SyncConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<SyncConfig, ConfigError> {
    let mut config: SyncConfig = serde_json::from_str(content)?;

    if let Ok(url) = std::env::var(API_URL_ENV_VAR) {
        if !url.trim().is_empty() {
            log::debug!("Using API base URL from {}", API_URL_ENV_VAR);
            config.api_base_url = url.trim().to_string();
        }
    }

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &SyncConfig) -> Result<(), ConfigError> {
    let url = config.api_base_url.trim();
    if url.is_empty() {
        return Err(ConfigError::Validation {
            message: "apiBaseUrl must not be empty".to_string(),
        });
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation {
            message: format!("apiBaseUrl must be an http(s) URL, got '{}'", url),
        });
    }

    if config.poll_interval_ms == 0 {
        return Err(ConfigError::Validation {
            message: "pollIntervalMs must be greater than zero".to_string(),
        });
    }

    if config.telemetry.base_delay_ms == 0 {
        return Err(ConfigError::Validation {
            message: "telemetry.baseDelayMs must be greater than zero".to_string(),
        });
    }

    if config.telemetry.max_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "telemetry.maxAttempts must be greater than zero".to_string(),
        });
    }

    if config.upload.max_file_size_bytes == Some(0) {
        return Err(ConfigError::Validation {
            message: "upload.maxFileSizeBytes must be greater than zero when set".to_string(),
        });
    }

    for mime in &config.upload.accepted_mime_types {
        if !mime.contains('/') {
            return Err(ConfigError::Validation {
                message: format!("Invalid MIME type in upload.acceptedMimeTypes: '{}'", mime),
            });
        }
    }

    Ok(())
}
