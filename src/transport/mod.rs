//! HTTP client capability
//!
//! The core only depends on the abstract shape
//! `execute(method, url, headers, json_body) -> { status, body, error }`.
//! Transport-level failures are reported as status `0` with a classified
//! [`TransportError`], never as a Rust `Err`, so retry loops handle every
//! outcome in one `match`.
//!
//! Implementations:
//! - [`ReqwestClient`]: production transport (`reqwest`, rustls)
//! - [`ScriptedHttpClient`]: replays scripted responses, records requests

pub mod reqwest_client;
pub mod scripted;

pub use reqwest_client::ReqwestClient;
pub use scripted::{RecordedRequest, ScriptedHttpClient, ScriptedReply};

use async_trait::async_trait;

/// HTTP verbs the core issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(body),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Outcome of a request.
///
/// `status == 0` means the request never produced an HTTP response; `error`
/// then says why.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    pub error: Option<TransportError>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            error: None,
        }
    }

    pub fn transport_failure(error: TransportError) -> Self {
        Self {
            status: 0,
            body: String::new(),
            error: Some(error),
        }
    }

    pub fn is_transport_failure(&self) -> bool {
        self.status == 0
    }

    /// True when the failure means the endpoint could not be reached at all.
    pub fn lost_connectivity(&self) -> bool {
        self.error
            .as_ref()
            .is_some_and(TransportError::is_connectivity_loss)
    }
}

/// Transport failures, classified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("no network connection: {0}")]
    NoNetwork(String),
    #[error("server is offline or unreachable: {0}")]
    Unreachable(String),
    #[error("request timed out")]
    Timeout,
    #[error("request failed: {0}")]
    Client(String),
}

impl TransportError {
    /// "No network" and "server unreachable" both mean the endpoint is gone.
    pub fn is_connectivity_loss(&self) -> bool {
        matches!(
            self,
            TransportError::NoNetwork(_) | TransportError::Unreachable(_) | TransportError::Timeout
        )
    }
}

/// Pluggable HTTP transport.
///
/// Implementations must be thread-safe; one client is shared by every
/// background job.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> HttpResponse;

    /// Transport name for logging
    fn name(&self) -> &'static str;
}
