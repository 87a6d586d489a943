//! Connection state machine for the telemetry stream.
//!
//! `Disconnected -> Connecting -> Connected -> Reconnecting -> Connecting ...`
//! with `GaveUp` once the reconnect budget is spent. Transitions are pure so
//! the backoff schedule can be checked without a transport.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use super::backoff::ReconnectPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Terminal until an explicit `connect()`.
    GaveUp,
}

impl ConnectionState {
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::GaveUp => "gave up",
        };
        f.write_str(label)
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    Retry(Duration),
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    failures: u32,
    policy: ReconnectPolicy,
}

impl ConnectionMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            failures: 0,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failures since the last acknowledged connection.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn on_connecting(&mut self) -> ConnectionState {
        self.state = ConnectionState::Connecting;
        self.state
    }

    /// Server acknowledgement received. Only this resets the failure count;
    /// an open transport alone does not.
    pub fn on_acknowledged(&mut self) -> ConnectionState {
        self.state = ConnectionState::Connected;
        self.failures = 0;
        self.state
    }

    pub fn on_failure(&mut self) -> FailureAction {
        self.failures = self.failures.saturating_add(1);
        match self.policy.delay_for(self.failures) {
            Some(delay) => {
                self.state = ConnectionState::Reconnecting;
                FailureAction::Retry(delay)
            }
            None => {
                self.state = ConnectionState::GaveUp;
                FailureAction::GiveUp
            }
        }
    }

    pub fn reset(&mut self) -> ConnectionState {
        self.state = ConnectionState::Disconnected;
        self.failures = 0;
        self.state
    }
}
