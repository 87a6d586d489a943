//! Upload orchestrator: file -> placeholder -> server job.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use log::{info, warn};
use tracing::Instrument;

use super::duplicate::{
    suggest_name, DuplicateConflict, DuplicateResolution, DuplicateResolver, ResolutionState,
};
use super::file::{UploadConstraints, UploadFile};
use super::reconciler::Reconciler;
use super::record::JobRecord;
use crate::api::{DocumentApi, DuplicateCheck};
use crate::error::UploadError;
use crate::notify::NotificationBroadcaster;

/// How a submitted upload ended (when it did not fail).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The server accepted the file; the record is confirmed.
    Uploaded(JobRecord),
    /// The user cancelled at the duplicate prompt. Nothing was created.
    Cancelled,
}

/// File names with an upload between duplicate check and server response.
#[derive(Clone, Default)]
struct InFlight {
    names: Arc<Mutex<HashSet<String>>>,
}

impl InFlight {
    fn claim(&self, name: &str) -> Result<InFlightGuard, UploadError> {
        let mut names = match self.names.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !names.insert(name.to_string()) {
            return Err(UploadError::AlreadyInFlight(name.to_string()));
        }
        Ok(InFlightGuard {
            names: Arc::clone(&self.names),
            name: name.to_string(),
        })
    }
}

struct InFlightGuard {
    names: Arc<Mutex<HashSet<String>>>,
    name: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut names = match self.names.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        names.remove(&self.name);
    }
}

pub struct UploadOrchestrator {
    api: Arc<dyn DocumentApi>,
    reconciler: Arc<Reconciler>,
    resolver: Arc<dyn DuplicateResolver>,
    constraints: UploadConstraints,
    notifier: NotificationBroadcaster,
    in_flight: InFlight,
}

impl UploadOrchestrator {
    pub fn new(
        api: Arc<dyn DocumentApi>,
        reconciler: Arc<Reconciler>,
        resolver: Arc<dyn DuplicateResolver>,
        constraints: UploadConstraints,
        notifier: NotificationBroadcaster,
    ) -> Self {
        Self {
            api,
            reconciler,
            resolver,
            constraints,
            notifier,
            in_flight: InFlight::default(),
        }
    }

    /// Submits a file for ingestion.
    ///
    /// The duplicate check completes before any placeholder exists. On a
    /// conflict the resolver decides; `Cancel` returns
    /// `UploadOutcome::Cancelled` with no record and no upload. Failures
    /// roll the store back and are published as notifications.
    pub async fn submit(&self, file: UploadFile) -> Result<UploadOutcome, UploadError> {
        let span = tracing::info_span!("jobs.upload", file = %file.name, size = file.size());
        let result = self.submit_inner(file).instrument(span).await;
        if let Err(e) = &result {
            self.notifier.error("Upload failed", &e.to_string());
        }
        result
    }

    async fn submit_inner(&self, file: UploadFile) -> Result<UploadOutcome, UploadError> {
        self.constraints.check(&file)?;
        let _claim = self.in_flight.claim(&file.name)?;

        let mut resolution = DuplicateResolution::new();
        resolution.begin_check();

        let check = self
            .api
            .check_duplicate(&file.name)
            .await
            .map_err(|source| UploadError::DuplicateCheck {
                name: file.name.clone(),
                source,
            })?;

        let mut _rename_claim = None;
        let (file, replaces_id) = if check.exists {
            let conflict = self.conflict_for(&file, check)?;
            resolution.conflict(conflict.clone());
            info!(
                "'{}' already exists as {}, awaiting decision",
                conflict.file_name, conflict.existing_id
            );

            let decision = self.resolver.resolve(&conflict).await;
            match resolution.decide(decision) {
                Some(ResolutionState::Replacing { existing_id }) => (file, Some(existing_id)),
                Some(ResolutionState::Renaming { new_name }) => {
                    _rename_claim = Some(self.in_flight.claim(&new_name)?);
                    (file.renamed(&new_name), None)
                }
                _ => {
                    info!("Upload of '{}' cancelled by user", conflict.file_name);
                    return Ok(UploadOutcome::Cancelled);
                }
            }
        } else {
            resolution.no_conflict();
            (file, None)
        };

        self.upload_with_placeholder(file, replaces_id).await
    }

    /// Builds the prompt for a reported duplicate. A missing `existingId` is
    /// looked up in the store by name.
    fn conflict_for(
        &self,
        file: &UploadFile,
        check: DuplicateCheck,
    ) -> Result<DuplicateConflict, UploadError> {
        let existing_id = match check.existing_id {
            Some(id) => id,
            None => self
                .reconciler
                .store()
                .snapshot()
                .iter()
                .find(|r| !r.is_optimistic && r.original_file_name == file.name)
                .map(|r| r.id.clone())
                .ok_or_else(|| UploadError::Rejected {
                    name: file.name.clone(),
                    reason: "server reported a duplicate without identifying it".to_string(),
                })?,
        };

        Ok(DuplicateConflict {
            file_name: file.name.clone(),
            existing_id,
            suggested_name: check
                .suggested_name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| suggest_name(&file.name)),
        })
    }

    async fn upload_with_placeholder(
        &self,
        file: UploadFile,
        replaces_id: Option<String>,
    ) -> Result<UploadOutcome, UploadError> {
        let placeholder = JobRecord::optimistic(&file.name, file.size(), replaces_id.as_deref());
        let placeholder_id = placeholder.id.clone();
        self.reconciler.insert_placeholder(placeholder);

        match self.api.upload(&file, replaces_id.as_deref()).await {
            Ok(document) => {
                let document = document.into_confirmed();
                info!("Upload of '{}' accepted as {}", file.name, document.id);
                self.reconciler
                    .promote_placeholder(&placeholder_id, document.clone());
                Ok(UploadOutcome::Uploaded(document))
            }
            Err(source) => {
                warn!("Upload of '{}' failed: {}", file.name, source);
                self.reconciler.remove(&placeholder_id);
                if replaces_id.is_some() {
                    // The server may or may not have removed the replaced
                    // record; only a fresh snapshot can tell.
                    if let Err(e) = self.reconciler.refresh().await {
                        warn!("Resync after failed replace did not complete: {}", e);
                    }
                }
                Err(UploadError::Transfer {
                    name: file.name,
                    source,
                })
            }
        }
    }
}
