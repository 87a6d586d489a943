//! Table-driven tests for configuration loading and validation.

mod common;

use std::io::Write;

use serial_test::serial;
use tempfile::NamedTempFile;

use kbsync::config::{load_config, load_config_from_str, API_URL_ENV_VAR};
use kbsync::ConfigError;

/// Represents a single config loading test case.
struct ConfigTestCase {
    /// Test case name for identification.
    name: &'static str,
    config_json: &'static str,
    should_succeed: bool,
    /// Expected error substring (if should_succeed is false).
    expected_error: Option<&'static str>,
}

const CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "valid_minimal",
        config_json: r#"{ "apiBaseUrl": "http://localhost:3000/api" }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "valid_full",
        config_json: r#"{
            "apiBaseUrl": "https://kb.example.com/api",
            "pollIntervalMs": 5000,
            "sizeToleranceBytes": 256,
            "requestTimeoutSecs": 60,
            "connectTimeoutSecs": 5,
            "telemetry": { "baseDelayMs": 500, "maxAttempts": 8 },
            "upload": {
                "maxFileSizeBytes": 10485760,
                "acceptedMimeTypes": ["application/pdf", "text/*"]
            },
            "auth": { "tokenEnvVar": "KB_TOKEN" }
        }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "missing_base_url",
        config_json: r#"{ "pollIntervalMs": 2000 }"#,
        should_succeed: false,
        expected_error: Some("apiBaseUrl"),
    },
    ConfigTestCase {
        name: "non_http_base_url",
        config_json: r#"{ "apiBaseUrl": "ftp://kb.example.com" }"#,
        should_succeed: false,
        expected_error: Some("http(s)"),
    },
    ConfigTestCase {
        name: "zero_poll_interval",
        config_json: r#"{ "apiBaseUrl": "http://localhost", "pollIntervalMs": 0 }"#,
        should_succeed: false,
        expected_error: Some("pollIntervalMs"),
    },
    ConfigTestCase {
        name: "zero_max_attempts",
        config_json: r#"{ "apiBaseUrl": "http://localhost", "telemetry": { "maxAttempts": 0 } }"#,
        should_succeed: false,
        expected_error: Some("maxAttempts"),
    },
    ConfigTestCase {
        name: "zero_base_delay",
        config_json: r#"{ "apiBaseUrl": "http://localhost", "telemetry": { "baseDelayMs": 0 } }"#,
        should_succeed: false,
        expected_error: Some("baseDelayMs"),
    },
    ConfigTestCase {
        name: "malformed_json",
        config_json: r#"{ "apiBaseUrl": "http://localhost", "#,
        should_succeed: false,
        expected_error: Some("parse"),
    },
];

#[test]
#[serial]
fn test_config_table() {
    std::env::remove_var(API_URL_ENV_VAR);

    for case in CONFIG_TESTS {
        let result = load_config_from_str(case.config_json);
        match (result, case.should_succeed) {
            (Ok(_), true) => {}
            (Ok(_), false) => panic!("case '{}' should have failed", case.name),
            (Err(e), true) => panic!("case '{}' failed unexpectedly: {}", case.name, e),
            (Err(e), false) => {
                if let Some(expected) = case.expected_error {
                    assert!(
                        e.to_string().contains(expected),
                        "case '{}': error '{}' does not mention '{}'",
                        case.name,
                        e,
                        expected
                    );
                }
            }
        }
    }
}

#[test]
#[serial]
fn test_defaults_applied() {
    std::env::remove_var(API_URL_ENV_VAR);

    let config = load_config_from_str(r#"{ "apiBaseUrl": "http://localhost" }"#).unwrap();

    assert_eq!(config.poll_interval_ms, 2000);
    assert_eq!(config.size_tolerance_bytes, 100);
    assert_eq!(config.telemetry.base_delay_ms, 1000);
    assert_eq!(config.telemetry.max_attempts, 5);
    assert!(config.upload.accepted_mime_types.is_empty());
}

#[test]
#[serial]
fn test_load_from_file() {
    std::env::remove_var(API_URL_ENV_VAR);

    let mut file = NamedTempFile::new().unwrap();
    write!(file, r#"{{ "apiBaseUrl": "http://kb.local/api", "pollIntervalMs": 750 }}"#).unwrap();

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.api_base_url, "http://kb.local/api");
    assert_eq!(config.poll_interval_ms, 750);
}

#[test]
fn test_missing_file_reports_path() {
    let err = load_config("/definitely/not/here/kbsync.json").unwrap_err();
    assert!(matches!(err, ConfigError::ReadFile { .. }));
    assert!(err.to_string().contains("kbsync.json"));
}

#[test]
#[serial]
fn test_env_overrides_base_url() {
    std::env::set_var(API_URL_ENV_VAR, "https://override.example.com");
    let config = load_config_from_str(r#"{ "apiBaseUrl": "http://localhost" }"#);
    std::env::remove_var(API_URL_ENV_VAR);

    assert_eq!(config.unwrap().api_base_url, "https://override.example.com");
}
