//! Bearer credential resolution and the shared session.
//!
//! Credentials come from one of three sources, in priority order:
//!
//! 1. **Direct value** - `"token": "..."` in the config file
//! 2. **File reference** - `"tokenFile": "/run/secrets/kb-token"`
//! 3. **Env var reference** - `"tokenEnvVar": "KB_API_TOKEN"`

use std::fs;
use std::sync::RwLock;

use secrecy::{ExposeSecret, SecretString};

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("No credential source provided (need one of: direct token, token file, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read credential from file '{path}': {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },

    #[error("Credential from {origin} is empty")]
    Empty { origin: String },
}

pub type Result<T> = std::result::Result<T, CredentialError>;

/// Resolves a bearer credential from the first non-empty source.
pub fn resolve_credential(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    if let Some(value) = direct.filter(|v| !v.is_empty()) {
        return Ok(SecretString::from(value.trim()));
    }

    if let Some(path) = file_path.filter(|p| !p.is_empty()) {
        let expanded = expand_home(path);
        let content = fs::read_to_string(&expanded).map_err(|source| CredentialError::FileRead {
            path: expanded.clone(),
            source,
        })?;
        return non_empty(content.trim(), &format!("file '{}'", expanded));
    }

    if let Some(name) = env_var.filter(|n| !n.is_empty()) {
        return match std::env::var(name) {
            Ok(value) => non_empty(value.trim(), &format!("env var '{}'", name)),
            Err(std::env::VarError::NotPresent) => Err(CredentialError::EnvVarNotSet {
                name: name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(CredentialError::EnvVarNotUnicode {
                name: name.to_string(),
            }),
        };
    }

    Err(CredentialError::NoSourceProvided)
}

/// Like [`resolve_credential`], but a missing source yields `Ok(None)`.
///
/// The dashboard may start unauthenticated and receive a token later.
pub fn resolve_credential_optional(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<Option<SecretString>> {
    match resolve_credential(direct, file_path, env_var) {
        Ok(token) => Ok(Some(token)),
        Err(CredentialError::NoSourceProvided) => Ok(None),
        Err(e) => Err(e),
    }
}

fn non_empty(value: &str, origin: &str) -> Result<SecretString> {
    if value.is_empty() {
        return Err(CredentialError::Empty {
            origin: origin.to_string(),
        });
    }
    Ok(SecretString::from(value))
}

/// Expands a leading `~` to the user's home directory (HOME, then USERPROFILE).
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

/// The bearer credential shared by the API client and the telemetry client.
///
/// Produced by the (external) login flow; invalidated when the server answers
/// `401`.
#[derive(Default)]
pub struct Session {
    token: RwLock<Option<SecretString>>,
}

impl Session {
    pub fn new(token: Option<SecretString>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    pub fn set_token(&self, token: SecretString) {
        let mut guard = match self.token.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Session lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        *guard = Some(token);
    }

    /// Drops the credential. Safe to call when already signed out.
    pub fn clear(&self) {
        let mut guard = match self.token.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Session lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        if guard.take().is_some() {
            log::info!("Session invalidated");
        }
    }

    pub fn token(&self) -> Option<SecretString> {
        let guard = match self.token.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Session lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        guard
            .as_ref()
            .map(|t| SecretString::from(t.expose_secret().to_string()))
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}
