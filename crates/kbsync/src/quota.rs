//! Token quota display state.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::api::{ApiError, QuotaApi};
use crate::telemetry::TelemetryListener;

/// Server-reported token quota.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaState {
    pub quota: u64,
    pub used: u64,
    pub remaining: u64,
    pub usage_percentage: f64,
}

/// Payload of a `token-update` event. The total quota is not repeated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaUpdate {
    pub used: u64,
    pub remaining: u64,
    pub usage_percentage: f64,
}

impl QuotaState {
    /// Next state after a push update: quota kept, the rest taken from the
    /// server.
    pub fn with_update(&self, update: &QuotaUpdate) -> QuotaState {
        QuotaState {
            quota: self.quota,
            used: update.used,
            remaining: update.remaining,
            usage_percentage: update.usage_percentage,
        }
    }

    /// Fallback when an update lands before the initial fetch.
    fn from_update(update: &QuotaUpdate) -> QuotaState {
        QuotaState {
            quota: update.used.saturating_add(update.remaining),
            used: update.used,
            remaining: update.remaining,
            usage_percentage: update.usage_percentage,
        }
    }
}

/// Holds the displayed quota; fed by the initial fetch and by telemetry.
pub struct QuotaMonitor {
    state: watch::Sender<Option<QuotaState>>,
}

impl QuotaMonitor {
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self { state }
    }

    pub fn current(&self) -> Option<QuotaState> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<QuotaState>> {
        self.state.subscribe()
    }

    /// Fetches the full quota. On failure the previous value is kept.
    pub async fn refresh(&self, api: &dyn QuotaApi) -> Result<QuotaState, ApiError> {
        let fetched = api.quota().await?;
        log::debug!(
            "Quota fetched: {}/{} ({:.1}%)",
            fetched.used,
            fetched.quota,
            fetched.usage_percentage
        );
        self.state.send_replace(Some(fetched.clone()));
        Ok(fetched)
    }

    pub fn apply(&self, update: &QuotaUpdate) {
        self.state.send_modify(|current| {
            let next = match current.as_ref() {
                Some(state) => state.with_update(update),
                None => QuotaState::from_update(update),
            };
            *current = Some(next);
        });
    }
}

impl Default for QuotaMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryListener for QuotaMonitor {
    fn on_quota_update(&self, update: &QuotaUpdate) {
        self.apply(update);
    }
}
