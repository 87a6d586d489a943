//! Client-visible representation of one document's ingestion lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Progress shown on a fresh placeholder so the bar is never empty.
pub const OPTIMISTIC_SEED_PROGRESS: u8 = 5;

const OPTIMISTIC_ID_PREFIX: &str = "optimistic-";

/// Ingestion status. `Pending` and `Processing` are non-terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::Processing => write!(f, "PROCESSING"),
            JobStatus::Completed => write!(f, "COMPLETED"),
            JobStatus::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub original_file_name: String,
    #[serde(alias = "fileSize")]
    pub file_size_bytes: u64,
    pub status: JobStatus,
    #[serde(default, alias = "progress")]
    pub progress_percent: u8,
    /// Local-only: never trusted from the wire.
    #[serde(default, skip_deserializing)]
    pub is_optimistic: bool,
    /// Local-only: set during a replace-duplicate flow.
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub replaces_id: Option<String>,
    /// Server clock once confirmed. Records without one sort after dated
    /// ones, in server order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Creates a local placeholder for an upload that the server has not
    /// confirmed yet.
    pub fn optimistic(file_name: &str, file_size_bytes: u64, replaces_id: Option<&str>) -> Self {
        Self {
            id: generate_optimistic_id(),
            original_file_name: file_name.to_string(),
            file_size_bytes,
            status: JobStatus::Pending,
            progress_percent: OPTIMISTIC_SEED_PROGRESS,
            is_optimistic: true,
            replaces_id: replaces_id.map(|s| s.to_string()),
            created_at: Some(Utc::now()),
        }
    }

    /// Marks a server record as confirmed, dropping any local-only state.
    pub fn into_confirmed(mut self) -> Self {
        self.is_optimistic = false;
        self.replaces_id = None;
        self
    }

    /// True while the poll scheduler still has something to wait for.
    pub fn is_active(&self) -> bool {
        self.is_optimistic || !self.status.is_terminal()
    }

    /// Whether `self` (a server record) is the confirmed counterpart of a
    /// placeholder: same name and a size within `tolerance` bytes.
    pub fn matches_placeholder(&self, placeholder: &JobRecord, tolerance: u64) -> bool {
        self.original_file_name == placeholder.original_file_name
            && self.file_size_bytes.abs_diff(placeholder.file_size_bytes) < tolerance
    }
}

/// `optimistic-<unix millis>-<random>`; unique for the process lifetime and
/// never reused, since the random part is a v4 UUID.
fn generate_optimistic_id() -> String {
    format!(
        "{}{}-{}",
        OPTIMISTIC_ID_PREFIX,
        Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4().simple()
    )
}

pub fn is_optimistic_id(id: &str) -> bool {
    id.starts_with(OPTIMISTIC_ID_PREFIX)
}
