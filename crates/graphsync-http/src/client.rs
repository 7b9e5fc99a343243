use async_trait::async_trait;
use graphsync_core::{HttpMethod, RemoteRequest, RemoteResponse, Transport, TransportError};
use serde_json::Value;
use tracing::trace;

use crate::config::ClientSettings;

/// [`Transport`] over HTTPS using `reqwest`.
///
/// Relative URIs are appended to the configured base URL. Absolute URIs
/// (`@odata.nextLink` values) are used verbatim.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl HttpTransport {
    /// Builds a transport from client settings.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Connection` if the HTTP client cannot be
    /// constructed (e.g. the TLS backend fails to initialise).
    pub fn new(settings: &ClientSettings) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(settings.timeout_ms))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| TransportError::Connection(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            bearer_token: settings.bearer_token.clone(),
        })
    }

    /// Replaces the bearer token.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, uri: &str) -> String {
        if uri.starts_with("https://") || uri.starts_with("http://") {
            return uri.to_string();
        }
        format!("{}/{}", self.base_url, uri.trim_start_matches('/'))
    }

    fn request(&self, method: HttpMethod, url: &str) -> reqwest::RequestBuilder {
        let method = match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };
        let mut req = self.http.request(method, url);
        if let Some(token) = &self.bearer_token {
            req = req.bearer_auth(token);
        }
        req.header("Accept", "application/json")
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse, TransportError> {
        let url = self.url(&request.uri);
        let mut req = self.request(request.method, &url);
        if !request.query.is_empty() {
            req = req.query(&request.query);
        }
        if let Some(body) = &request.body {
            req = req.json(body);
        }
        if let Some(etag) = &request.if_match {
            req = req.header("If-Match", etag);
        }

        let resp = req.send().await.map_err(map_reqwest_error)?;
        handle_response(resp).await
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Connection(err.to_string())
    }
}

async fn handle_response(resp: reqwest::Response) -> Result<RemoteResponse, TransportError> {
    let status = resp.status();
    let text = resp.text().await.map_err(map_reqwest_error)?;
    trace!(status = status.as_u16(), bytes = text.len(), "Response body received");

    if text.trim().is_empty() {
        return Ok(RemoteResponse::new(status.as_u16(), Value::Null));
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(body) => Ok(RemoteResponse::new(status.as_u16(), body)),
        // Error pages from gateways are often HTML or plain text.
        Err(_) if !status.is_success() => Ok(RemoteResponse::new(status.as_u16(), Value::String(text))),
        Err(e) => Err(TransportError::InvalidBody(e.to_string())),
    }
}
