//! HTTP client for the knowledge-base document and quota endpoints.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;

use super::error::ApiError;
use super::types::{DuplicateCheck, DuplicateCheckRequest, Envelope, UploadResponse};
use super::{DocumentApi, QuotaApi};
use crate::auth::Session;
use crate::config::SyncConfig;
use crate::jobs::{JobRecord, UploadFile};
use crate::notify::NotificationBroadcaster;
use crate::quota::QuotaState;

pub(crate) const DOCUMENTS_PATH: &str = "/documents";
pub(crate) const CHECK_DUPLICATE_PATH: &str = "/documents/check-duplicate";
pub(crate) const UPLOAD_PATH: &str = "/documents/upload";
pub(crate) const QUOTA_PATH: &str = "/tokens/usage";
pub(crate) const STREAM_PATH: &str = "/tokens/stream";

#[derive(Debug, Deserialize)]
struct Ack {
    success: bool,
    #[serde(default, alias = "error")]
    message: Option<String>,
}

/// Joins a base URL and an absolute path without doubling slashes.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Arc<Session>,
    notifier: NotificationBroadcaster,
}

impl ApiClient {
    pub fn new(
        config: &SyncConfig,
        session: Arc<Session>,
        notifier: NotificationBroadcaster,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            session,
            notifier,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// Attaches the bearer credential, sends, and maps non-2xx responses.
    ///
    /// A `401` invalidates the session: the token is dropped and a
    /// notification asks the user to sign in again.
    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let token = self.session.token().ok_or(ApiError::NotAuthenticated)?;
        let response = request.bearer_auth(token.expose_secret()).send().await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!("Server rejected session token, invalidating session");
            self.session.clear();
            self.notifier
                .error("Session expired", "Please sign in again to continue.");
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::status(status.as_u16(), &body));
        }
        Ok(response)
    }
}

#[async_trait]
impl DocumentApi for ApiClient {
    async fn list_documents(&self) -> Result<Vec<JobRecord>, ApiError> {
        let response = self.send(self.client.get(self.url(DOCUMENTS_PATH))).await?;
        let envelope: Envelope<Vec<JobRecord>> = response.json().await?;
        let records = envelope.into_data()?;
        debug!("Fetched snapshot with {} documents", records.len());
        Ok(records)
    }

    async fn check_duplicate(&self, file_name: &str) -> Result<DuplicateCheck, ApiError> {
        let request = self
            .client
            .post(self.url(CHECK_DUPLICATE_PATH))
            .json(&DuplicateCheckRequest { file_name });
        let response = self.send(request).await?;
        let envelope: Envelope<DuplicateCheck> = response.json().await?;
        envelope.into_data()
    }

    async fn upload(
        &self,
        file: &UploadFile,
        replaces_id: Option<&str>,
    ) -> Result<JobRecord, ApiError> {
        let part = Part::stream_with_length(Body::from(file.content.clone()), file.size())
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)?;
        let mut form = Form::new().part("file", part);
        if let Some(id) = replaces_id {
            form = form.text("replaceId", id.to_string());
        }

        info!(
            "Uploading '{}' ({} bytes){}",
            file.name,
            file.size(),
            replaces_id
                .map(|id| format!(", replacing {}", id))
                .unwrap_or_default()
        );

        let request = self.client.post(self.url(UPLOAD_PATH)).multipart(form);
        let response = self.send(request).await?;
        let body: UploadResponse = response.json().await?;

        match (body.success, body.document) {
            (true, Some(document)) => Ok(document),
            (true, None) => Err(ApiError::Decode(
                "upload response is missing 'document'".to_string(),
            )),
            (false, _) => Err(ApiError::Rejected(
                body.message.unwrap_or_else(|| "upload unsuccessful".to_string()),
            )),
        }
    }

    async fn delete_document(&self, id: &str) -> Result<(), ApiError> {
        if id.is_empty() || id.contains('/') || id.contains(char::is_whitespace) {
            return Err(ApiError::InvalidRequest(format!("Invalid document id '{}'", id)));
        }

        let url = format!("{}/{}", self.url(DOCUMENTS_PATH), id);
        let response = self.send(self.client.delete(url)).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(());
        }

        let ack: Ack = response.json().await?;
        if ack.success {
            Ok(())
        } else {
            Err(ApiError::Rejected(
                ack.message.unwrap_or_else(|| "delete unsuccessful".to_string()),
            ))
        }
    }
}

#[async_trait]
impl QuotaApi for ApiClient {
    async fn quota(&self) -> Result<QuotaState, ApiError> {
        let response = self.send(self.client.get(self.url(QUOTA_PATH))).await?;
        Ok(response.json().await?)
    }
}
