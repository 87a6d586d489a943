//! Files handed to the upload orchestrator, and the caller's constraints.

use std::path::Path;

use bytes::Bytes;

use crate::config::UploadConfig;
use crate::error::UploadError;

#[derive(Debug, Clone)]
pub struct UploadFile {
    /// User-visible name; also the duplicate-check and matching key.
    pub name: String,
    pub content: Bytes,
    pub mime_type: String,
}

impl UploadFile {
    pub fn new(name: &str, content: impl Into<Bytes>, mime_type: &str) -> Self {
        Self {
            name: name.to_string(),
            content: content.into(),
            mime_type: mime_type.to_string(),
        }
    }

    /// Creates a file with its MIME type guessed from the name.
    pub fn from_bytes(name: &str, content: impl Into<Bytes>) -> Self {
        let mime_type = guess_mime_type(name);
        Self::new(name, content, &mime_type)
    }

    /// Reads a file from disk.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("'{}' has no file name", path.display()),
                )
            })?;
        let content = tokio::fs::read(path).await?;
        Ok(Self::from_bytes(&name, content))
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Same bytes under a new display name.
    pub fn renamed(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            content: self.content.clone(),
            mime_type: self.mime_type.clone(),
        }
    }
}

fn guess_mime_type(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Size and type limits enforced before anything touches the network.
#[derive(Debug, Clone, Default)]
pub struct UploadConstraints {
    pub max_file_size_bytes: Option<u64>,
    pub accepted_mime_types: Vec<String>,
}

impl UploadConstraints {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            max_file_size_bytes: config.max_file_size_bytes,
            accepted_mime_types: config
                .accepted_mime_types
                .iter()
                .map(|m| m.trim().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn check(&self, file: &UploadFile) -> Result<(), UploadError> {
        if file.is_empty() {
            return Err(UploadError::EmptyFile(file.name.clone()));
        }

        if let Some(max) = self.max_file_size_bytes {
            if file.size() > max {
                return Err(UploadError::Rejected {
                    name: file.name.clone(),
                    reason: format!("{} bytes exceeds the {} byte limit", file.size(), max),
                });
            }
        }

        if !self.accepts_mime(&file.mime_type) {
            return Err(UploadError::Rejected {
                name: file.name.clone(),
                reason: format!("type '{}' is not accepted", file.mime_type),
            });
        }

        Ok(())
    }

    fn accepts_mime(&self, mime_type: &str) -> bool {
        if self.accepted_mime_types.is_empty() {
            return true;
        }
        let mime_type = mime_type.to_ascii_lowercase();
        self.accepted_mime_types.iter().any(|accepted| {
            if accepted == "*/*" || *accepted == mime_type {
                return true;
            }
            match accepted.strip_suffix("/*") {
                Some(family) => mime_type
                    .split_once('/')
                    .is_some_and(|(kind, _)| kind == family),
                None => false,
            }
        })
    }
}
