//! Application root: builds every component once and wires them together.

use std::sync::{Arc, Mutex};

use log::{info, warn};
use secrecy::SecretString;
use tokio::task::JoinHandle;

use crate::api::{ApiClient, ApiError, DocumentApi, QuotaApi};
use crate::auth::Session;
use crate::config::SyncConfig;
use crate::error::{Result, UploadError};
use crate::jobs::record::is_optimistic_id;
use crate::jobs::{
    DuplicateResolver, JobSnapshot, JobStore, PollScheduler, Reconciler, UploadConstraints,
    UploadFile, UploadOrchestrator, UploadOutcome,
};
use crate::notify::NotificationBroadcaster;
use crate::quota::{QuotaMonitor, QuotaState};
use crate::telemetry::{
    EventTransport, HttpEventTransport, LiveTelemetryClient, ReconnectPolicy, TelemetryListener,
};

/// Injectable collaborators. `Dashboard::new` fills these with the HTTP
/// implementations.
pub struct DashboardParts {
    pub documents: Arc<dyn DocumentApi>,
    pub quota: Arc<dyn QuotaApi>,
    pub transport: Arc<dyn EventTransport>,
    pub resolver: Arc<dyn DuplicateResolver>,
}

pub struct Dashboard {
    config: SyncConfig,
    session: Arc<Session>,
    notifier: NotificationBroadcaster,
    documents: Arc<dyn DocumentApi>,
    quota_api: Arc<dyn QuotaApi>,
    reconciler: Arc<Reconciler>,
    scheduler: Arc<PollScheduler>,
    uploads: UploadOrchestrator,
    telemetry: LiveTelemetryClient,
    quota: Arc<QuotaMonitor>,
    observer: Mutex<Option<JoinHandle<()>>>,
}

impl Dashboard {
    pub fn new(
        config: SyncConfig,
        session: Arc<Session>,
        resolver: Arc<dyn DuplicateResolver>,
    ) -> Result<Self> {
        let notifier = NotificationBroadcaster::default();
        let client = Arc::new(ApiClient::new(
            &config,
            Arc::clone(&session),
            notifier.clone(),
        )?);
        let transport = Arc::new(HttpEventTransport::new(&config)?);

        let parts = DashboardParts {
            documents: client.clone(),
            quota: client,
            transport,
            resolver,
        };
        Ok(Self::with_parts(config, session, notifier, parts))
    }

    pub fn with_parts(
        config: SyncConfig,
        session: Arc<Session>,
        notifier: NotificationBroadcaster,
        parts: DashboardParts,
    ) -> Self {
        let store = JobStore::new();
        let reconciler = Arc::new(Reconciler::new(
            store,
            Arc::clone(&parts.documents),
            config.size_tolerance_bytes,
            notifier.clone(),
        ));
        let scheduler = Arc::new(PollScheduler::new(
            Arc::clone(&reconciler),
            config.poll_interval(),
        ));
        let uploads = UploadOrchestrator::new(
            Arc::clone(&parts.documents),
            Arc::clone(&reconciler),
            parts.resolver,
            UploadConstraints::from_config(&config.upload),
            notifier.clone(),
        );

        let telemetry = LiveTelemetryClient::new(
            parts.transport,
            Arc::clone(&session),
            ReconnectPolicy::from_config(&config.telemetry),
            notifier.clone(),
        );
        let quota = Arc::new(QuotaMonitor::new());
        telemetry.add_listener(quota.clone() as Arc<dyn TelemetryListener>);

        Self {
            config,
            session,
            notifier,
            documents: parts.documents,
            quota_api: parts.quota,
            reconciler,
            scheduler,
            uploads,
            telemetry,
            quota,
            observer: Mutex::new(None),
        }
    }

    /// Loads the initial snapshot and quota, opens the push channel and
    /// starts watching the store for active work.
    ///
    /// Fetch failures are logged and leave the dashboard usable; only a
    /// missing credential is returned as an error.
    pub async fn start(&self) -> Result<()> {
        if !self.session.is_authenticated() {
            return Err(ApiError::NotAuthenticated.into());
        }
        info!("Starting dashboard sync against {}", self.config.api_base_url);

        if let Err(e) = self.reconciler.refresh().await {
            warn!("Initial document fetch failed: {}", e);
        }

        if let Err(e) = self.refresh_quota().await {
            warn!("Initial quota fetch failed: {}", e);
        }

        self.telemetry.connect();

        let mut observer = match self.observer.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if observer.as_ref().map_or(true, |h| h.is_finished()) {
            *observer = Some(self.scheduler.spawn_observer());
        }
        Ok(())
    }

    /// Stops polling and the push channel. Safe to call more than once.
    pub fn shutdown(&self) {
        let observer = match self.observer.lock() {
            Ok(mut g) => g.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = observer {
            handle.abort();
        }
        self.scheduler.stop();
        self.telemetry.disconnect();
        info!("Dashboard sync stopped");
    }

    pub async fn upload(&self, file: UploadFile) -> std::result::Result<UploadOutcome, UploadError> {
        let outcome = self.uploads.submit(file).await;
        self.scheduler.evaluate();
        outcome
    }

    /// Deletes a server-confirmed document, then drops it locally.
    pub async fn delete_document(&self, id: &str) -> std::result::Result<(), ApiError> {
        if is_optimistic_id(id) {
            return Err(ApiError::InvalidRequest(format!(
                "'{}' has not been confirmed by the server yet",
                id
            )));
        }

        match self.documents.delete_document(id).await {
            Ok(()) => {
                self.reconciler.remove(id);
                self.notifier.info("Document deleted", id);
                Ok(())
            }
            Err(e) => {
                self.notifier.error("Delete failed", &e.to_string());
                Err(e)
            }
        }
    }

    /// Installs a fresh credential and reopens the push channel, which also
    /// recovers from `GaveUp`.
    pub fn reauthenticate(&self, token: SecretString) {
        self.session.set_token(token);
        self.telemetry.disconnect();
        self.telemetry.connect();
    }

    pub async fn refresh(&self) -> std::result::Result<bool, ApiError> {
        let changed = self.reconciler.refresh().await?;
        self.scheduler.evaluate();
        Ok(changed)
    }

    pub async fn refresh_quota(&self) -> std::result::Result<QuotaState, ApiError> {
        self.quota.refresh(self.quota_api.as_ref()).await
    }

    pub fn jobs(&self) -> JobSnapshot {
        self.reconciler.store().snapshot()
    }

    pub fn store(&self) -> &JobStore {
        self.reconciler.store()
    }

    pub fn quota(&self) -> Option<QuotaState> {
        self.quota.current()
    }

    pub fn quota_monitor(&self) -> &Arc<QuotaMonitor> {
        &self.quota
    }

    pub fn telemetry(&self) -> &LiveTelemetryClient {
        &self.telemetry
    }

    pub fn scheduler(&self) -> &Arc<PollScheduler> {
        &self.scheduler
    }

    pub fn notifier(&self) -> &NotificationBroadcaster {
        &self.notifier
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        if let Ok(mut observer) = self.observer.lock() {
            if let Some(handle) = observer.take() {
                handle.abort();
            }
        }
    }
}
