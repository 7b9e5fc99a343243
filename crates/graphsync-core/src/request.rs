//! Request execution: cancellation, deadlines and status classification.
//!
//! Every network call of an operation goes through one
//! [`RequestExecutor`]. Calls are issued sequentially; each one races the
//! transport future against the caller's cancellation token and the
//! operation deadline, so an abort unwinds the pipeline without issuing any
//! further step.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::transport::{HttpMethod, RemoteRequest, RemoteResponse, Transport};

/// Caller-supplied controls for one operation.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl OperationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `token` to abort the operation.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Bounds the whole operation (all of its requests) by `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Issues requests for one operation.
pub struct RequestExecutor<'a> {
    transport: &'a dyn Transport,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl<'a> RequestExecutor<'a> {
    /// Starts the operation clock.
    pub fn new(transport: &'a dyn Transport, context: &OperationContext) -> Self {
        Self {
            transport,
            cancel: context.cancel.clone(),
            deadline: context.timeout.map(|timeout| Instant::now() + timeout),
        }
    }

    /// Sends one request and returns the success body.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled`/`Timeout` when aborted, `NotFound` for 404,
    /// `ConcurrencyConflict` for 409/412 and `RemoteRequest` for any other
    /// non-2xx status.
    pub async fn execute(&self, request: RemoteRequest) -> EngineResult<Value> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let method = request.method;
        let uri = request.uri.clone();
        debug!(method = %method, uri = %uri, "Sending request");

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(EngineError::Cancelled),
            _ = wait_for_deadline(self.deadline) => return Err(EngineError::Timeout),
            result = self.transport.send(request) => result?,
        };

        debug!(method = %method, uri = %uri, status = response.status, "Received response");
        classify(method, &uri, response)
    }

    /// Fetches every item of a collection, following `@odata.nextLink`.
    ///
    /// Stops early once `limit` items have been collected, or when a page
    /// links back to one already fetched.
    pub async fn fetch_collection(
        &self,
        uri: &str,
        query: Vec<(String, String)>,
        limit: Option<usize>,
    ) -> EngineResult<Vec<Value>> {
        let mut items = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some((uri.to_string(), query));

        while let Some((page_uri, page_query)) = next.take() {
            visited.insert(page_uri.clone());
            let body = self
                .execute(RemoteRequest::get(&page_uri).with_query(page_query))
                .await?;

            let (page, next_link) = match body {
                Value::Object(mut map) => {
                    let next_link = map
                        .remove("@odata.nextLink")
                        .and_then(|link| link.as_str().map(str::to_string));
                    match map.remove("value") {
                        Some(Value::Array(page)) => (page, next_link),
                        _ => {
                            return Err(EngineError::unexpected_response(
                                page_uri,
                                "collection response has no 'value' array",
                            ));
                        }
                    }
                }
                Value::Array(page) => (page, None),
                _ => {
                    return Err(EngineError::unexpected_response(
                        page_uri,
                        "expected a collection response",
                    ));
                }
            };

            items.extend(page);
            if let Some(limit) = limit
                && items.len() >= limit
            {
                items.truncate(limit);
                break;
            }
            next = match next_link {
                Some(link) if visited.contains(&link) => {
                    warn!(uri = %link, "Server repeated a page link; stopping pagination");
                    None
                }
                link => link.map(|link| (link, Vec::new())),
            };
        }

        Ok(items)
    }
}

async fn wait_for_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// Maps a response status onto the engine's error kinds.
pub fn classify(method: HttpMethod, uri: &str, response: RemoteResponse) -> EngineResult<Value> {
    if response.is_success() {
        return Ok(response.body);
    }

    let message = remote_message(&response.body);
    match response.status {
        404 => Err(EngineError::not_found(uri)),
        409 | 412 => Err(EngineError::ConcurrencyConflict {
            uri: uri.to_string(),
            status: response.status,
            message,
        }),
        status => Err(EngineError::RemoteRequest {
            method,
            uri: uri.to_string(),
            status,
            message,
            body: response.body,
        }),
    }
}

/// Extracts `error.code: error.message` from an OData error body.
fn remote_message(body: &Value) -> String {
    if let Some(error) = body.get("error") {
        let code = error.get("code").and_then(Value::as_str);
        let message = error.get("message").and_then(Value::as_str);
        match (code, message) {
            (Some(code), Some(message)) => return format!("{code}: {message}"),
            (None, Some(message)) => return message.to_string(),
            (Some(code), None) => return code.to_string(),
            (None, None) => {}
        }
    }
    match body {
        Value::Null => "no response body".to_string(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_success_and_not_found() {
        let body = classify(
            HttpMethod::Get,
            "/a",
            RemoteResponse::new(200, json!({ "id": "1" })),
        )
        .unwrap();
        assert_eq!(body, json!({ "id": "1" }));

        let err = classify(HttpMethod::Get, "/a", RemoteResponse::new(404, Value::Null)).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_classify_conflict_and_remote_error() {
        let err = classify(
            HttpMethod::Patch,
            "/a",
            RemoteResponse::new(
                412,
                json!({ "error": { "code": "PreconditionFailed", "message": "etag mismatch" } }),
            ),
        )
        .unwrap_err();
        assert!(err.is_conflict());
        assert!(err.to_string().contains("PreconditionFailed: etag mismatch"));

        let err = classify(
            HttpMethod::Post,
            "/a",
            RemoteResponse::new(400, json!({ "error": { "message": "Invalid displayName" } })),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "POST /a failed (HTTP 400): Invalid displayName"
        );

        let err = classify(
            HttpMethod::Get,
            "/a",
            RemoteResponse::new(502, json!("Bad gateway")),
        )
        .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "GET /a failed (HTTP 502): Bad gateway");
    }
}
