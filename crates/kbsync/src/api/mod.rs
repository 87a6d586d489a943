//! Request/response contracts of the remote knowledge-base API.

pub mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;

pub use client::ApiClient;
pub use error::ApiError;
pub use types::DuplicateCheck;

use crate::jobs::{JobRecord, UploadFile};
use crate::quota::QuotaState;

/// Document (job) endpoints.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// Full listing of server-known records.
    async fn list_documents(&self) -> Result<Vec<JobRecord>, ApiError>;

    async fn check_duplicate(&self, file_name: &str) -> Result<DuplicateCheck, ApiError>;

    /// Uploads `file`, superseding `replaces_id` when set.
    async fn upload(&self, file: &UploadFile, replaces_id: Option<&str>)
        -> Result<JobRecord, ApiError>;

    async fn delete_document(&self, id: &str) -> Result<(), ApiError>;
}

/// Token quota endpoint.
#[async_trait]
pub trait QuotaApi: Send + Sync {
    async fn quota(&self) -> Result<QuotaState, ApiError>;
}
