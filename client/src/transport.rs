//! Request/response transport for delta fetches and mutations.
//!
//! The transport is a black box to the coordinators: they see the
//! [`Transport`] trait and the classified [`TransportError`], nothing else.
//! [`HttpTransport`] is the production implementation; tests substitute
//! their own.

use async_trait::async_trait;
use serde_json::Value;
use tether_engine::{ChangeSet, Checkpoint, Record, Version};

/// Transport failure, classified so callers can branch without inspecting
/// status codes themselves.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Request never produced a server verdict (DNS, refused, timeout).
    #[error("network: {0}")]
    Network(String),

    /// The server rejected the asserted record version.
    #[error("stale record version")]
    Conflict,

    /// The server rejected the input.
    #[error("validation: {0}")]
    Validation(String),

    /// The server no longer accepts the session's credentials.
    #[error("authentication expired")]
    AuthExpired,

    /// Any other server-side failure.
    #[error("server: {0}")]
    Server(String),
}

/// Request/response collaborator used by the sync and write coordinators.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch everything that changed since `since`.
    async fn fetch_changes(&self, since: Checkpoint) -> Result<ChangeSet, TransportError>;

    /// Create a record from its field payload.
    async fn create_record(&self, fields: Value) -> Result<Record, TransportError>;

    /// Patch a record, asserting the version the writer last saw.
    async fn update_record(
        &self,
        id: &str,
        patch: Value,
        expected_version: Version,
    ) -> Result<Record, TransportError>;

    /// Delete a record, asserting the version the writer last saw.
    async fn delete_record(&self, id: &str, expected_version: Version)
        -> Result<(), TransportError>;
}

/// HTTP implementation of [`Transport`].
///
/// The expected version travels as an `If-Match` header; the server answers
/// a stale one with 409.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport against the given API base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn classify(response: reqwest::Response) -> TransportError {
        use reqwest::StatusCode;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED => TransportError::AuthExpired,
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => TransportError::Conflict,
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                TransportError::Validation(body)
            }
            _ => TransportError::Server(format!("{status}: {body}")),
        }
    }

    async fn into_record(response: reqwest::Response) -> Result<Record, TransportError> {
        response
            .json::<Record>()
            .await
            .map_err(|e| TransportError::Server(format!("malformed record response: {e}")))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_changes(&self, since: Checkpoint) -> Result<ChangeSet, TransportError> {
        let response = self
            .http
            .get(self.url("/changes"))
            .query(&[("since", since.millis())])
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }
        response
            .json::<ChangeSet>()
            .await
            .map_err(|e| TransportError::Server(format!("malformed delta response: {e}")))
    }

    async fn create_record(&self, fields: Value) -> Result<Record, TransportError> {
        let response = self
            .http
            .post(self.url("/records"))
            .json(&fields)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }
        Self::into_record(response).await
    }

    async fn update_record(
        &self,
        id: &str,
        patch: Value,
        expected_version: Version,
    ) -> Result<Record, TransportError> {
        let response = self
            .http
            .patch(self.url(&format!("/records/{id}")))
            .header(reqwest::header::IF_MATCH, expected_version.to_string())
            .json(&patch)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }
        Self::into_record(response).await
    }

    async fn delete_record(
        &self,
        id: &str,
        expected_version: Version,
    ) -> Result<(), TransportError> {
        let response = self
            .http
            .delete(self.url(&format!("/records/{id}")))
            .header(reqwest::header::IF_MATCH, expected_version.to_string())
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }
        Ok(())
    }
}
