//! Transport seam for the push channel.

use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use secrecy::{ExposeSecret, SecretString};

use super::error::TelemetryError;
use super::sse::{SseDecoder, SseEvent};
use crate::api::client::{join_url, STREAM_PATH};
use crate::config::SyncConfig;

/// Stream of decoded events. Ends when the server closes the channel.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<SseEvent, TelemetryError>> + Send>>;

#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Opens one connection. The returned stream ending or yielding an error
    /// counts as a transport failure.
    async fn open(&self, token: &SecretString) -> Result<EventStream, TelemetryError>;
}

/// `GET /tokens/stream` over reqwest.
pub struct HttpEventTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpEventTransport {
    pub fn new(config: &SyncConfig) -> Result<Self, TelemetryError> {
        // No total timeout: the response body is open-ended.
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| TelemetryError::Connect(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: join_url(&config.api_base_url, STREAM_PATH),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EventTransport for HttpEventTransport {
    async fn open(&self, token: &SecretString) -> Result<EventStream, TelemetryError> {
        let response = self
            .client
            .get(&self.url)
            .bearer_auth(token.expose_secret())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::Status {
                status: status.as_u16(),
            });
        }

        Ok(decode_body(response.bytes_stream()))
    }
}

/// Runs a raw byte stream through an [`SseDecoder`].
pub fn decode_body<S, E>(body: S) -> EventStream
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = (Box::pin(body), SseDecoder::new(), VecDeque::new(), false);
    let events = futures_util::stream::unfold(
        state,
        |(mut body, mut decoder, mut pending, failed)| async move {
            loop {
                if let Some(event) = pending.pop_front() {
                    return Some((Ok(event), (body, decoder, pending, failed)));
                }
                if failed {
                    return None;
                }
                match body.next().await {
                    Some(Ok(chunk)) => pending.extend(decoder.feed(&chunk)),
                    Some(Err(e)) => {
                        let err = TelemetryError::Interrupted(e.to_string());
                        return Some((Err(err), (body, decoder, pending, true)));
                    }
                    None => return None,
                }
            }
        },
    );
    Box::pin(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_decode_body_yields_events_across_chunks() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"event: connected\ndata: {}\n")),
            Ok(Bytes::from_static(b"\nevent: token-update\ndata: {\"used\":3,")),
            Ok(Bytes::from_static(b"\"remaining\":7,\"usagePercentage\":30}\n\n")),
        ];
        let mut events = decode_body(futures_util::stream::iter(chunks));

        let first = events.next().await.unwrap().unwrap();
        assert_eq!(first.event, "connected");
        let second = events.next().await.unwrap().unwrap();
        assert_eq!(second.event, "token-update");
        assert!(second.data.contains("usagePercentage"));
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn test_decode_body_surfaces_error_then_ends() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"event: connected\ndata: {}\n\n")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(Bytes::from_static(b"event: token-update\ndata: {}\n\n")),
        ];
        let mut events = decode_body(futures_util::stream::iter(chunks));

        assert!(events.next().await.unwrap().is_ok());
        let err = events.next().await.unwrap().unwrap_err();
        assert!(matches!(err, TelemetryError::Interrupted(_)));
        assert!(events.next().await.is_none());
    }

    #[test]
    fn test_transport_url() {
        let config = SyncConfig::new("http://localhost:8080/api/");
        let transport = HttpEventTransport::new(&config).unwrap();
        assert_eq!(transport.url(), "http://localhost:8080/api/tokens/stream");
    }
}
