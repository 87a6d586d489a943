//! In-memory job store holding immutable snapshots.
//!
//! Every mutation derives a complete next state from the current one and
//! swaps it in under the channel's lock; readers only ever see whole
//! snapshots. A snapshot is only published when its records changed, so
//! `revision` doubles as the "should I re-render" signal.

use std::sync::Arc;

use tokio::sync::watch;

use super::record::{JobRecord, JobStatus};

/// One immutable view of the job list, newest first.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    records: Arc<[JobRecord]>,
    revision: u64,
}

impl Default for JobSnapshot {
    fn default() -> Self {
        Self {
            records: Arc::from(Vec::new()),
            revision: 0,
        }
    }
}

impl JobSnapshot {
    pub fn records(&self) -> &[JobRecord] {
        &self.records
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, JobRecord> {
        self.records.iter()
    }

    pub fn get(&self, id: &str) -> Option<&JobRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// True when any record is optimistic or not yet terminal.
    pub fn has_active_work(&self) -> bool {
        self.records.iter().any(JobRecord::is_active)
    }

    /// Reference check: both handles point at the same published state.
    pub fn same_as(&self, other: &JobSnapshot) -> bool {
        Arc::ptr_eq(&self.records, &other.records)
    }

    pub fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for record in self.records.iter() {
            if record.is_optimistic {
                counts.optimistic += 1;
            }
            match record.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub optimistic: usize,
}

/// Cloneable handle to the shared job list.
#[derive(Clone)]
pub struct JobStore {
    sender: Arc<watch::Sender<JobSnapshot>>,
}

impl JobStore {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(JobSnapshot::default());
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Current snapshot (cheap: the records are shared).
    pub fn snapshot(&self) -> JobSnapshot {
        self.sender.borrow().clone()
    }

    /// Subscribes to published snapshots.
    pub fn subscribe(&self) -> watch::Receiver<JobSnapshot> {
        self.sender.subscribe()
    }

    /// Replaces the records with `derive(current)`.
    ///
    /// Returns whether a new snapshot was published. `derive` runs under the
    /// store lock and must not call back into the store.
    pub fn update<F>(&self, derive: F) -> bool
    where
        F: FnOnce(&[JobRecord]) -> Vec<JobRecord>,
    {
        self.sender.send_if_modified(|snapshot| {
            let next = derive(&snapshot.records);
            if next.as_slice() == &*snapshot.records {
                return false;
            }
            *snapshot = JobSnapshot {
                records: Arc::from(next),
                revision: snapshot.revision + 1,
            };
            true
        })
    }

    /// Puts a record at the head of the list.
    pub fn insert_front(&self, record: JobRecord) {
        self.update(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.push(record);
            next.extend(current.iter().cloned());
            next
        });
    }

    /// Removes a record by id. Returns whether it was present.
    pub fn remove(&self, id: &str) -> bool {
        self.update(|current| current.iter().filter(|r| r.id != id).cloned().collect())
    }

    pub fn get(&self, id: &str) -> Option<JobRecord> {
        self.sender.borrow().get(id).cloned()
    }

    pub fn has_active_work(&self) -> bool {
        self.sender.borrow().has_active_work()
    }

    pub fn len(&self) -> usize {
        self.sender.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sender.borrow().is_empty()
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}
