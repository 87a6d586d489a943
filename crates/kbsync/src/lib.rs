pub mod api;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod jobs;
pub mod notify;
pub mod quota;
pub mod telemetry;

pub use api::{ApiClient, ApiError, DocumentApi, DuplicateCheck, QuotaApi};
pub use auth::{resolve_credential, CredentialError, Session};
pub use config::{load_config, load_config_from_str, SyncConfig};
pub use dashboard::{Dashboard, DashboardParts};
pub use error::{ConfigError, Result, SyncError, UploadError};
pub use jobs::{
    Decision, DuplicateResolver, FixedResolver, JobRecord, JobSnapshot, JobStatus, JobStore,
    PollScheduler, PromptResolver, Reconciler, UploadFile, UploadOrchestrator, UploadOutcome,
};
pub use notify::{Notification, NotificationBroadcaster, NotificationLevel};
pub use quota::{QuotaMonitor, QuotaState, QuotaUpdate};
pub use telemetry::{ConnectionState, LiveTelemetryClient, ReconnectPolicy, TelemetryListener};
