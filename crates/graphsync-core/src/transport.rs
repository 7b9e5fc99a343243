//! The transport collaborator.
//!
//! The engine never talks HTTP itself. It hands [`RemoteRequest`]s to a
//! [`Transport`] and classifies the returned status. Implementations must
//! be thread-safe (`Send + Sync`); one transport is typically shared by all
//! concurrent operations.
//!
//! URIs are relative to the API root (`/deviceManagement/...`) except for
//! `@odata.nextLink` values, which are absolute and must be used verbatim.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// A request for the transport to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    pub method: HttpMethod,
    pub uri: String,
    /// Query pairs, not yet percent-encoded.
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Value for an `If-Match` header.
    pub if_match: Option<String>,
}

impl RemoteRequest {
    pub fn new(method: HttpMethod, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            query: Vec::new(),
            body: None,
            if_match: None,
        }
    }

    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, uri)
    }

    pub fn delete(uri: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, uri)
    }

    #[must_use]
    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_if_match(mut self, etag: Option<String>) -> Self {
        self.if_match = etag;
        self
    }
}

/// What the transport got back. Non-2xx statuses are not errors at this
/// level; the engine classifies them.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    pub status: u16,
    /// Parsed JSON body, `Value::Null` when the body was empty. A non-JSON
    /// error body is carried as a JSON string.
    pub body: Value,
}

impl RemoteResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failures below the HTTP status level.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The connection could not be established or was interrupted.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The request did not complete within the transport's own timeout.
    #[error("Request timed out")]
    Timeout,

    /// A success response carried a body that is not valid JSON.
    #[error("Invalid response body: {0}")]
    InvalidBody(String),
}

/// Executes requests against the remote API.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse, TransportError>;

    async fn get(
        &self,
        uri: &str,
        query: Vec<(String, String)>,
    ) -> Result<RemoteResponse, TransportError> {
        self.send(RemoteRequest::get(uri).with_query(query)).await
    }

    async fn post(&self, uri: &str, body: Value) -> Result<RemoteResponse, TransportError> {
        self.send(RemoteRequest::new(HttpMethod::Post, uri).with_body(body))
            .await
    }

    async fn patch(&self, uri: &str, body: Value) -> Result<RemoteResponse, TransportError> {
        self.send(RemoteRequest::new(HttpMethod::Patch, uri).with_body(body))
            .await
    }

    async fn delete(&self, uri: &str) -> Result<RemoteResponse, TransportError> {
        self.send(RemoteRequest::delete(uri)).await
    }
}
