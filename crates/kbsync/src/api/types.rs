//! Wire shapes of the document and quota endpoints.

use serde::{Deserialize, Serialize};

use crate::jobs::JobRecord;

/// `{ success, data }` envelope used by the document endpoints.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default, alias = "error")]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    /// Unwraps a successful envelope; `success=false` or a missing payload is
    /// a rejection.
    pub fn into_data(self) -> Result<T, super::ApiError> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(super::ApiError::Decode(
                "response is missing 'data'".to_string(),
            )),
            (false, _) => Err(super::ApiError::Rejected(
                self.message.unwrap_or_else(|| "request unsuccessful".to_string()),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateCheckRequest<'a> {
    pub file_name: &'a str,
}

/// Result of a duplicate-name check.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateCheck {
    pub exists: bool,
    #[serde(default)]
    pub existing_id: Option<String>,
    #[serde(default)]
    pub suggested_name: Option<String>,
    #[serde(default)]
    pub file_name: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(default)]
    pub document: Option<JobRecord>,
    #[serde(default, alias = "error")]
    pub message: Option<String>,
}
