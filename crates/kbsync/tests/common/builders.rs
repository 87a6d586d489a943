//! Builders for records, configs and wired-up components.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::SecretString;

use kbsync::jobs::{
    DuplicateResolver, JobRecord, JobStatus, JobStore, Reconciler, UploadConstraints,
    UploadOrchestrator,
};
use kbsync::telemetry::{EventTransport, LiveTelemetryClient, ReconnectPolicy};
use kbsync::{Dashboard, DashboardParts, NotificationBroadcaster, Session, SyncConfig};

use super::fakes::FakeApi;

/// Builder for server-confirmed records.
pub struct RecordBuilder {
    record: JobRecord,
}

impl RecordBuilder {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            record: JobRecord {
                id: id.to_string(),
                original_file_name: name.to_string(),
                file_size_bytes: 1_000,
                status: JobStatus::Processing,
                progress_percent: 40,
                is_optimistic: false,
                replaces_id: None,
                created_at: Some(Utc::now()),
            },
        }
    }

    pub fn size(mut self, bytes: u64) -> Self {
        self.record.file_size_bytes = bytes;
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.record.status = status;
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.record.created_at = Some(at);
        self
    }

    pub fn build(self) -> JobRecord {
        self.record
    }
}

pub fn completed(id: &str, name: &str) -> JobRecord {
    RecordBuilder::new(id, name).status(JobStatus::Completed).build()
}

pub fn processing(id: &str, name: &str) -> JobRecord {
    RecordBuilder::new(id, name).build()
}

pub fn test_config(base_url: &str) -> SyncConfig {
    let mut config = SyncConfig::new(base_url);
    config.poll_interval_ms = 2_000;
    config.telemetry.base_delay_ms = 1_000;
    config.telemetry.max_attempts = 5;
    config
}

pub fn authenticated_session() -> Arc<Session> {
    Arc::new(Session::new(Some(SecretString::from("test-token".to_string()))))
}

/// Reconciler + orchestrator over a [`FakeApi`].
pub struct UploadHarness {
    pub api: Arc<FakeApi>,
    pub reconciler: Arc<Reconciler>,
    pub uploads: Arc<UploadOrchestrator>,
    pub notifier: NotificationBroadcaster,
}

impl UploadHarness {
    /// Builds the harness and loads the fake's documents into the store.
    pub async fn new(api: Arc<FakeApi>, resolver: Arc<dyn DuplicateResolver>) -> Self {
        Self::with_constraints(api, resolver, UploadConstraints::default()).await
    }

    pub async fn with_constraints(
        api: Arc<FakeApi>,
        resolver: Arc<dyn DuplicateResolver>,
        constraints: UploadConstraints,
    ) -> Self {
        let notifier = NotificationBroadcaster::default();
        let reconciler = Arc::new(Reconciler::new(
            JobStore::new(),
            api.clone(),
            100,
            notifier.clone(),
        ));
        reconciler
            .refresh()
            .await
            .expect("initial snapshot should load");
        let uploads = Arc::new(UploadOrchestrator::new(
            api.clone(),
            Arc::clone(&reconciler),
            resolver,
            constraints,
            notifier.clone(),
        ));
        Self {
            api,
            reconciler,
            uploads,
            notifier,
        }
    }

    pub fn store(&self) -> &JobStore {
        self.reconciler.store()
    }

    pub fn ids(&self) -> Vec<String> {
        self.store().snapshot().iter().map(|r| r.id.clone()).collect()
    }

    /// Resolves once the store holds an optimistic record.
    pub async fn wait_for_placeholder(&self) -> JobRecord {
        let mut changes = self.store().subscribe();
        loop {
            if let Some(record) = changes
                .borrow_and_update()
                .iter()
                .find(|r| r.is_optimistic)
                .cloned()
            {
                return record;
            }
            changes.changed().await.expect("store dropped");
        }
    }
}

pub fn telemetry_client(
    transport: Arc<dyn EventTransport>,
    session: Arc<Session>,
    notifier: NotificationBroadcaster,
) -> LiveTelemetryClient {
    LiveTelemetryClient::new(
        transport,
        session,
        ReconnectPolicy::new(Duration::from_millis(1_000), 5),
        notifier,
    )
}

pub fn dashboard(
    api: Arc<FakeApi>,
    transport: Arc<dyn EventTransport>,
    resolver: Arc<dyn DuplicateResolver>,
    session: Arc<Session>,
) -> Dashboard {
    Dashboard::with_parts(
        test_config("http://kb.test/api"),
        session,
        NotificationBroadcaster::default(),
        DashboardParts {
            documents: api.clone(),
            quota: api,
            transport,
            resolver,
        },
    )
}
