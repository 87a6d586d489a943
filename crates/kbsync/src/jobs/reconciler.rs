//! Reconciler: merge server snapshots into the job store.
//!
//! The merge is a pure function of (current records, incoming snapshot), so
//! poll results and upload responses may land in any order and any number
//! of times.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::Instrument;

use super::record::JobRecord;
use super::store::JobStore;
use crate::api::{ApiError, DocumentApi};
use crate::notify::NotificationBroadcaster;

/// Merges a server snapshot into the current records.
///
/// Placeholders with a counterpart in `snapshot` (same name, size delta
/// below `tolerance`) are retired; the rest are kept ahead of the snapshot.
/// Confirmed records not present in `snapshot` are dropped. A retired
/// placeholder's `replaces_id` is not re-applied. `reconcile(reconcile(s, t), t)`
/// equals `reconcile(s, t)`.
pub fn reconcile(current: &[JobRecord], snapshot: &[JobRecord], tolerance: u64) -> Vec<JobRecord> {
    let mut confirmed: Vec<JobRecord> = snapshot
        .iter()
        .cloned()
        .map(JobRecord::into_confirmed)
        .collect();
    // Stable: ties and undated records keep the server's order, undated last.
    confirmed.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let retained = current.iter().filter(|record| {
        record.is_optimistic
            && !confirmed
                .iter()
                .any(|server| server.matches_placeholder(record, tolerance))
    });

    let mut next: Vec<JobRecord> = retained.cloned().collect();
    next.extend(confirmed);
    next
}

/// Direct promotion: the upload response names the placeholder's real
/// counterpart.
///
/// The placeholder is replaced in place. If a poll already delivered the
/// confirmed record, that copy is kept and the placeholder is dropped. If
/// the placeholder is gone (retired by a poll that the record has since
/// dropped out of), the confirmed record goes to the head.
pub fn promote(current: &[JobRecord], placeholder_id: &str, confirmed: JobRecord) -> Vec<JobRecord> {
    let confirmed = confirmed.into_confirmed();

    if current.iter().any(|r| r.id == confirmed.id) {
        return current
            .iter()
            .filter(|r| r.id != placeholder_id)
            .cloned()
            .collect();
    }

    let mut next = Vec::with_capacity(current.len() + 1);
    let mut placed = false;
    for record in current {
        if record.id == placeholder_id {
            if !placed {
                next.push(confirmed.clone());
                placed = true;
            }
            continue;
        }
        next.push(record.clone());
    }
    if !placed {
        next.insert(0, confirmed);
    }
    next
}

/// The only writer of the job store.
pub struct Reconciler {
    store: JobStore,
    api: Arc<dyn DocumentApi>,
    tolerance: u64,
    notifier: NotificationBroadcaster,
    /// Set while snapshot fetches keep failing; one notification per streak.
    failing: AtomicBool,
}

impl Reconciler {
    pub fn new(
        store: JobStore,
        api: Arc<dyn DocumentApi>,
        tolerance: u64,
        notifier: NotificationBroadcaster,
    ) -> Self {
        Self {
            store,
            api,
            tolerance,
            notifier,
            failing: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn tolerance(&self) -> u64 {
        self.tolerance
    }

    /// Merges `snapshot` into the store. Returns whether anything changed.
    pub fn apply_snapshot(&self, snapshot: Vec<JobRecord>) -> bool {
        let _span = tracing::debug_span!("jobs.reconcile", incoming = snapshot.len()).entered();
        let tolerance = self.tolerance;
        let changed = self
            .store
            .update(|current| reconcile(current, &snapshot, tolerance));
        if changed {
            log::debug!("Job store updated from snapshot of {} records", snapshot.len());
        }
        changed
    }

    pub fn promote_placeholder(&self, placeholder_id: &str, confirmed: JobRecord) -> bool {
        log::debug!(
            "Promoting placeholder {} to confirmed record {}",
            placeholder_id,
            confirmed.id
        );
        self.store
            .update(|current| promote(current, placeholder_id, confirmed))
    }

    /// Inserts a placeholder at the head, removing the record it replaces in
    /// the same step so the user never sees both.
    pub fn insert_placeholder(&self, placeholder: JobRecord) {
        self.store.update(|current| {
            let replaced = placeholder.replaces_id.as_deref();
            let mut next = Vec::with_capacity(current.len() + 1);
            next.push(placeholder.clone());
            next.extend(
                current
                    .iter()
                    .filter(|r| Some(r.id.as_str()) != replaced)
                    .cloned(),
            );
            next
        });
    }

    /// Removes a record unconditionally (failed upload, user deletion).
    pub fn remove(&self, id: &str) -> bool {
        self.store.remove(id)
    }

    /// Fetches a fresh snapshot and merges it.
    ///
    /// On failure the store keeps its last known good state and the error is
    /// returned; the first failure of a streak is also published as a
    /// notification.
    pub async fn refresh(&self) -> Result<bool, ApiError> {
        let result = self
            .api
            .list_documents()
            .instrument(tracing::debug_span!("jobs.refresh"))
            .await;

        match result {
            Ok(snapshot) => {
                if self.failing.swap(false, Ordering::AcqRel) {
                    log::info!("Document snapshot fetch recovered");
                }
                Ok(self.apply_snapshot(snapshot))
            }
            Err(e) => {
                log::warn!("Snapshot fetch failed, keeping last known state: {}", e);
                if !self.failing.swap(true, Ordering::AcqRel) {
                    self.notifier
                        .warn("Could not refresh documents", &e.to_string());
                }
                Err(e)
            }
        }
    }
}
