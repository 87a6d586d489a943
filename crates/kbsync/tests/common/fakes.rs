//! In-memory stand-ins for the remote API and the push channel.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;
use tokio::sync::Notify;

use kbsync::api::{ApiError, DocumentApi, DuplicateCheck, QuotaApi};
use kbsync::jobs::{JobRecord, JobStatus, UploadFile};
use kbsync::quota::QuotaState;
use kbsync::telemetry::{EventStream, EventTransport, SseEvent, TelemetryError};

/// A call observed by [`FakeApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    CheckDuplicate(String),
    Upload {
        name: String,
        replaces_id: Option<String>,
    },
    Delete(String),
}

/// Server double: keeps a document list and answers like the real API.
///
/// Uploads append a `PENDING` record (and drop the replaced one); the
/// duplicate check reports a conflict when a document with the same name
/// exists.
pub struct FakeApi {
    documents: Mutex<Vec<JobRecord>>,
    calls: Mutex<Vec<Call>>,
    next_id: AtomicU64,
    failing_lists: AtomicUsize,
    failing_upload: Mutex<Option<ApiError>>,
    upload_gate: Mutex<Option<Arc<Notify>>>,
    quota: Mutex<QuotaState>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            documents: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(100),
            failing_lists: AtomicUsize::new(0),
            failing_upload: Mutex::new(None),
            upload_gate: Mutex::new(None),
            quota: Mutex::new(QuotaState {
                quota: 10_000,
                used: 2_500,
                remaining: 7_500,
                usage_percentage: 25.0,
            }),
        })
    }

    pub fn with_documents(documents: Vec<JobRecord>) -> Arc<Self> {
        let api = Self::new();
        api.set_documents(documents);
        api
    }

    pub fn set_documents(&self, documents: Vec<JobRecord>) {
        *self.documents.lock().unwrap() = documents;
    }

    pub fn documents(&self) -> Vec<JobRecord> {
        self.documents.lock().unwrap().clone()
    }

    /// Moves every server document to `status`.
    pub fn finish_all(&self, status: JobStatus) {
        for doc in self.documents.lock().unwrap().iter_mut() {
            doc.status = status;
            doc.progress_percent = 100;
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Upload { .. }))
            .collect()
    }

    pub fn list_count(&self) -> usize {
        self.calls().iter().filter(|c| **c == Call::List).count()
    }

    pub fn fail_next_lists(&self, n: usize) {
        self.failing_lists.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_upload(&self, error: ApiError) {
        *self.failing_upload.lock().unwrap() = Some(error);
    }

    /// Holds every upload until the returned gate is notified once per
    /// upload.
    pub fn hold_uploads(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.upload_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl DocumentApi for FakeApi {
    async fn list_documents(&self) -> Result<Vec<JobRecord>, ApiError> {
        self.record(Call::List);
        let failing = self.failing_lists.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_lists.store(failing - 1, Ordering::SeqCst);
            return Err(ApiError::Network("connection refused".into()));
        }
        Ok(self.documents())
    }

    async fn check_duplicate(&self, file_name: &str) -> Result<DuplicateCheck, ApiError> {
        self.record(Call::CheckDuplicate(file_name.to_string()));
        let existing = self
            .documents()
            .into_iter()
            .find(|d| d.original_file_name == file_name);
        Ok(DuplicateCheck {
            exists: existing.is_some(),
            existing_id: existing.map(|d| d.id),
            suggested_name: None,
            file_name: file_name.to_string(),
        })
    }

    async fn upload(
        &self,
        file: &UploadFile,
        replaces_id: Option<&str>,
    ) -> Result<JobRecord, ApiError> {
        self.record(Call::Upload {
            name: file.name.clone(),
            replaces_id: replaces_id.map(str::to_string),
        });

        let gate = self.upload_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if let Some(error) = self.failing_upload.lock().unwrap().take() {
            return Err(error);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let created = JobRecord {
            id: format!("doc-{}", id),
            original_file_name: file.name.clone(),
            file_size_bytes: file.size(),
            status: JobStatus::Pending,
            progress_percent: 0,
            is_optimistic: false,
            replaces_id: None,
            created_at: Some(Utc::now()),
        };

        let mut documents = self.documents.lock().unwrap();
        if let Some(old) = replaces_id {
            documents.retain(|d| d.id != old);
        }
        documents.insert(0, created.clone());
        Ok(created)
    }

    async fn delete_document(&self, id: &str) -> Result<(), ApiError> {
        self.record(Call::Delete(id.to_string()));
        let mut documents = self.documents.lock().unwrap();
        let before = documents.len();
        documents.retain(|d| d.id != id);
        if documents.len() == before {
            return Err(ApiError::status(404, "not found"));
        }
        Ok(())
    }
}

#[async_trait]
impl QuotaApi for FakeApi {
    async fn quota(&self) -> Result<QuotaState, ApiError> {
        Ok(self.quota.lock().unwrap().clone())
    }
}

/// What one `open()` of the [`ScriptedTransport`] does.
pub enum Connection {
    /// The request fails before any event.
    Refused,
    /// Delivers the events, then the server closes the stream.
    Deliver(Vec<SseEvent>),
    /// Delivers the events and stays open.
    DeliverAndHold(Vec<SseEvent>),
}

/// Transport that plays back one scripted [`Connection`] per `open()`.
/// Once the script runs out every further attempt is refused.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Connection>>,
    opens: Mutex<Vec<tokio::time::Instant>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Connection>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            opens: Mutex::new(Vec::new()),
        })
    }

    pub fn open_count(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    /// Time between consecutive `open()` calls.
    pub fn gaps(&self) -> Vec<std::time::Duration> {
        let opens = self.opens.lock().unwrap();
        opens.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait]
impl EventTransport for ScriptedTransport {
    async fn open(&self, _token: &SecretString) -> Result<EventStream, TelemetryError> {
        self.opens.lock().unwrap().push(tokio::time::Instant::now());
        let next = self.script.lock().unwrap().pop_front();
        match next.unwrap_or(Connection::Refused) {
            Connection::Refused => Err(TelemetryError::Connect("connection refused".into())),
            Connection::Deliver(events) => {
                Ok(Box::pin(futures_util::stream::iter(events.into_iter().map(Ok::<_, TelemetryError>))))
            }
            Connection::DeliverAndHold(events) => {
                let head = futures_util::stream::iter(events.into_iter().map(Ok::<_, TelemetryError>));
                let tail = futures_util::stream::pending::<Result<SseEvent, TelemetryError>>();
                Ok(Box::pin(futures_util::StreamExt::chain(head, tail)))
            }
        }
    }
}

pub fn connected_event() -> SseEvent {
    SseEvent {
        event: "connected".to_string(),
        data: "{}".to_string(),
        id: None,
    }
}

pub fn token_update_event(used: u64, remaining: u64, usage_percentage: f64) -> SseEvent {
    SseEvent {
        event: "token-update".to_string(),
        data: format!(
            r#"{{"used":{},"remaining":{},"usagePercentage":{}}}"#,
            used, remaining, usage_percentage
        ),
        id: None,
    }
}
