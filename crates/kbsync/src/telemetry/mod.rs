//! Live telemetry: a server-push channel for quota updates.

pub mod backoff;
pub mod client;
pub mod error;
pub mod sse;
pub mod state;
pub mod transport;

pub use backoff::ReconnectPolicy;
pub use client::{LiveTelemetryClient, TelemetryListener};
pub use error::TelemetryError;
pub use sse::{SseDecoder, SseEvent};
pub use state::{ConnectionMachine, ConnectionState, FailureAction};
pub use transport::{EventStream, EventTransport, HttpEventTransport};

/// Server acknowledgement that the stream is live.
pub const EVENT_CONNECTED: &str = "connected";
/// Quota delta event.
pub const EVENT_TOKEN_UPDATE: &str = "token-update";
