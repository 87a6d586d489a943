//! Live telemetry client: owns the push connection and its reconnect loop.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use futures_util::StreamExt;
use log::{debug, info, warn};
use secrecy::SecretString;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::backoff::ReconnectPolicy;
use super::error::TelemetryError;
use super::sse::SseEvent;
use super::state::{ConnectionMachine, ConnectionState, FailureAction};
use super::transport::EventTransport;
use super::{EVENT_CONNECTED, EVENT_TOKEN_UPDATE};
use crate::auth::Session;
use crate::notify::NotificationBroadcaster;
use crate::quota::QuotaUpdate;

/// Receives quota updates. Called synchronously from the connection task,
/// so implementations should return quickly.
pub trait TelemetryListener: Send + Sync {
    fn on_quota_update(&self, update: &QuotaUpdate);
}

fn same_listener(a: &Arc<dyn TelemetryListener>, b: &Arc<dyn TelemetryListener>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

struct Inner {
    transport: Arc<dyn EventTransport>,
    session: Arc<Session>,
    policy: ReconnectPolicy,
    state: watch::Sender<ConnectionState>,
    listeners: RwLock<Vec<Arc<dyn TelemetryListener>>>,
    notifier: NotificationBroadcaster,
    /// Bumped by every connect/disconnect; a task only publishes while its
    /// generation is current.
    generation: AtomicU64,
}

impl Inner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    fn publish(&self, generation: u64, next: ConnectionState) {
        self.state.send_if_modified(|state| {
            if !self.is_current(generation) || *state == next {
                return false;
            }
            debug!("Telemetry state: {} -> {}", state, next);
            *state = next;
            true
        });
    }

    fn listeners(&self) -> Vec<Arc<dyn TelemetryListener>> {
        match self.listeners.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => {
                warn!("Telemetry listener lock was poisoned, recovering");
                poisoned.into_inner().clone()
            }
        }
    }

    fn dispatch(&self, update: &QuotaUpdate) {
        for listener in self.listeners() {
            let delivered = catch_unwind(AssertUnwindSafe(|| listener.on_quota_update(update)));
            if delivered.is_err() {
                warn!("Telemetry listener panicked; delivery continues with the rest");
            }
        }
    }

    fn handle_event(&self, generation: u64, machine: &mut ConnectionMachine, event: SseEvent) {
        match event.event.as_str() {
            EVENT_CONNECTED => {
                if machine.state() != ConnectionState::Connected {
                    info!("Telemetry stream connected");
                }
                self.publish(generation, machine.on_acknowledged());
            }
            EVENT_TOKEN_UPDATE => match serde_json::from_str::<QuotaUpdate>(&event.data) {
                Ok(update) => {
                    if self.is_current(generation) {
                        self.dispatch(&update);
                    }
                }
                Err(e) => {
                    let err = TelemetryError::Payload {
                        event: event.event.clone(),
                        message: e.to_string(),
                    };
                    warn!("Ignoring event: {}", err);
                }
            },
            other => debug!("Ignoring telemetry event '{}'", other),
        }
    }

    /// One connection attempt; returns why it ended.
    async fn stream_once(
        &self,
        generation: u64,
        machine: &mut ConnectionMachine,
        token: &SecretString,
    ) -> TelemetryError {
        let mut events = match self.transport.open(token).await {
            Ok(events) => events,
            Err(e) => return e,
        };

        while let Some(item) = events.next().await {
            match item {
                Ok(event) => self.handle_event(generation, machine, event),
                Err(e) if e.is_connection_failure() => return e,
                Err(e) => warn!("Ignoring event: {}", e),
            }
        }
        TelemetryError::Closed
    }

    async fn run(self: Arc<Self>, generation: u64) {
        let mut machine = ConnectionMachine::new(self.policy);

        loop {
            let Some(token) = self.session.token() else {
                warn!("Telemetry stopped: session has no credential");
                self.publish(generation, machine.reset());
                return;
            };

            self.publish(generation, machine.on_connecting());
            let reason = self.stream_once(generation, &mut machine, &token).await;

            if reason.is_unauthorized() {
                warn!("Event stream rejected session token, invalidating session");
                self.publish(generation, machine.reset());
                if self.is_current(generation) {
                    self.session.clear();
                    self.notifier
                        .error("Session expired", "Please sign in again to continue.");
                }
                return;
            }

            match machine.on_failure() {
                FailureAction::Retry(delay) => {
                    warn!(
                        "Telemetry connection lost ({}), reconnecting in {:?} (attempt {})",
                        reason,
                        delay,
                        machine.failures()
                    );
                    self.publish(generation, machine.state());
                    tokio::time::sleep(delay).await;
                }
                FailureAction::GiveUp => {
                    warn!(
                        "Telemetry connection failed {} times ({}), giving up",
                        machine.failures(),
                        reason
                    );
                    self.publish(generation, machine.state());
                    if self.is_current(generation) {
                        self.notifier.warn(
                            "Live updates unavailable",
                            "Quota figures may be stale until the page reconnects.",
                        );
                    }
                    return;
                }
            }
        }
    }
}

/// Push-channel client. Instantiate once and share by reference.
pub struct LiveTelemetryClient {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LiveTelemetryClient {
    pub fn new(
        transport: Arc<dyn EventTransport>,
        session: Arc<Session>,
        policy: ReconnectPolicy,
        notifier: NotificationBroadcaster,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                transport,
                session,
                policy,
                state,
                listeners: RwLock::new(Vec::new()),
                notifier,
                generation: AtomicU64::new(0),
            }),
            task: Mutex::new(None),
        }
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.task.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                warn!("Telemetry task lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Opens the stream unless a connection (or reconnect) is already in
    /// progress. Without a credential this logs and returns; call again once
    /// authenticated. Returns whether a new connection task was started.
    pub fn connect(&self) -> bool {
        let mut task = self.lock_task();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Telemetry connect ignored: already {}", self.state());
            return false;
        }
        if !self.inner.session.is_authenticated() {
            warn!("Telemetry connect skipped: not authenticated");
            return false;
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let inner = Arc::clone(&self.inner);
        let span = tracing::info_span!("telemetry.connection", generation);
        *task = Some(tokio::spawn(inner.run(generation).instrument(span)));
        true
    }

    /// Tears down the stream and any pending reconnect. Always safe.
    pub fn disconnect(&self) {
        let mut task = self.lock_task();
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(handle) = task.take() {
            handle.abort();
        }
        if self.state() != ConnectionState::Disconnected {
            info!("Telemetry disconnected");
        }
        self.inner.publish(generation, ConnectionState::Disconnected);
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Registers a listener. Registering the same `Arc` twice is a no-op.
    pub fn add_listener(&self, listener: Arc<dyn TelemetryListener>) -> bool {
        let mut listeners = match self.inner.listeners.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if listeners.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    pub fn remove_listener(&self, listener: &Arc<dyn TelemetryListener>) -> bool {
        let mut listeners = match self.inner.listeners.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners().len()
    }
}

impl Drop for LiveTelemetryClient {
    fn drop(&mut self) {
        if let Some(handle) = self.lock_task().take() {
            handle.abort();
        }
    }
}
