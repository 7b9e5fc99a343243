//! Shared test helpers: a scripted in-memory transport that records every
//! request it receives.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use graphsync_core::{HttpMethod, RemoteRequest, RemoteResponse, Transport, TransportError};
use serde_json::{Value, json};

type Matcher = Box<dyn Fn(&RemoteRequest) -> bool + Send + Sync>;

struct Route {
    matcher: Matcher,
    responses: VecDeque<Result<RemoteResponse, TransportError>>,
    delay: Option<Duration>,
}

/// Answers requests from scripted routes, in registration order. A route
/// with several responses replays them in turn and repeats the last one.
/// Unmatched requests get a 404.
#[derive(Default)]
pub struct RecordingTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<RemoteRequest>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, matcher: F, status: u16, body: Value) -> &Self
    where
        F: Fn(&RemoteRequest) -> bool + Send + Sync + 'static,
    {
        self.push_route(Box::new(matcher), vec![Ok(RemoteResponse::new(status, body))], None)
    }

    pub fn on_method(&self, method: HttpMethod, uri: &str, status: u16, body: Value) -> &Self {
        let uri = uri.to_string();
        self.on(move |r| r.method == method && r.uri == uri, status, body)
    }

    pub fn on_sequence(&self, method: HttpMethod, uri: &str, responses: Vec<(u16, Value)>) -> &Self {
        let uri = uri.to_string();
        self.push_route(
            Box::new(move |r| r.method == method && r.uri == uri),
            responses
                .into_iter()
                .map(|(status, body)| Ok(RemoteResponse::new(status, body)))
                .collect(),
            None,
        )
    }

    pub fn on_error(&self, method: HttpMethod, uri: &str, error: TransportError) -> &Self {
        let uri = uri.to_string();
        self.push_route(
            Box::new(move |r| r.method == method && r.uri == uri),
            vec![Err(error)],
            None,
        )
    }

    /// Like [`on_method`](Self::on_method) but the response only arrives
    /// after `delay`.
    pub fn on_delayed(&self, method: HttpMethod, uri: &str, delay: Duration, status: u16, body: Value) -> &Self {
        let uri = uri.to_string();
        self.push_route(
            Box::new(move |r| r.method == method && r.uri == uri),
            vec![Ok(RemoteResponse::new(status, body))],
            Some(delay),
        )
    }

    fn push_route(
        &self,
        matcher: Matcher,
        responses: Vec<Result<RemoteResponse, TransportError>>,
        delay: Option<Duration>,
    ) -> &Self {
        self.routes.lock().unwrap().push(Route {
            matcher,
            responses: responses.into(),
            delay,
        });
        self
    }

    pub fn calls(&self) -> Vec<RemoteRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// `"METHOD uri"` for every recorded call.
    pub fn call_lines(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|r| format!("{} {}", r.method, r.uri))
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse, TransportError> {
        self.calls.lock().unwrap().push(request.clone());

        let (response, delay) = {
            let mut routes = self.routes.lock().unwrap();
            match routes.iter_mut().find(|route| (route.matcher)(&request)) {
                Some(route) => {
                    let response = if route.responses.len() > 1 {
                        route.responses.pop_front()
                    } else {
                        route.responses.front().cloned()
                    };
                    (response, route.delay)
                }
                None => (None, None),
            }
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        response.unwrap_or_else(|| {
            Ok(RemoteResponse::new(
                404,
                json!({ "error": { "code": "ResourceNotFound", "message": "no route" } }),
            ))
        })
    }
}
