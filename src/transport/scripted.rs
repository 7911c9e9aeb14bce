//! Scripted HTTP transport
//!
//! Replays queued replies per URL path and records every request it sees,
//! stamped with `tokio::time::Instant` so paused-clock tests can assert on
//! backoff spacing. The simulator binary also uses it for `--offline` runs.

use super::{HttpClient, HttpRequest, HttpResponse, Method, TransportError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::time::Instant;

/// A canned reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedReply {
    Status(u16),
    StatusWithBody(u16, String),
    Failure(TransportError),
}

impl ScriptedReply {
    fn into_response(self) -> HttpResponse {
        match self {
            ScriptedReply::Status(status) => HttpResponse::new(status, ""),
            ScriptedReply::StatusWithBody(status, body) => HttpResponse::new(status, body),
            ScriptedReply::Failure(e) => HttpResponse::transport_failure(e),
        }
    }
}

/// A request as seen by the scripted transport.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub at: Instant,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// [`HttpClient`] that answers from per-path queues.
///
/// When a path's queue is empty the default reply is used (200 unless
/// changed with [`ScriptedHttpClient::with_default`]).
pub struct ScriptedHttpClient {
    queues: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
    default_reply: ScriptedReply,
    log: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::with_default(ScriptedReply::Status(200))
    }

    pub fn with_default(default_reply: ScriptedReply) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            default_reply,
            log: Mutex::new(Vec::new()),
        }
    }

    /// Queue one reply for `path` (e.g. `/v1/submit`).
    pub fn push(&self, path: &str, reply: ScriptedReply) {
        if let Ok(mut queues) = self.queues.lock() {
            queues.entry(path.to_string()).or_default().push_back(reply);
        }
    }

    pub fn push_many(&self, path: &str, replies: impl IntoIterator<Item = ScriptedReply>) {
        for reply in replies {
            self.push(path, reply);
        }
    }

    /// Every request so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Requests whose URL path equals `path`.
    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests_to(path).len()
    }

    fn next_reply(&self, path: &str) -> ScriptedReply {
        self.queues
            .lock()
            .ok()
            .and_then(|mut queues| queues.get_mut(path).and_then(VecDeque::pop_front))
            .unwrap_or_else(|| self.default_reply.clone())
    }
}

impl Default for ScriptedHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn execute(&self, request: HttpRequest) -> HttpResponse {
        let path = url_path(&request.url).to_string();
        if let Ok(mut log) = self.log.lock() {
            log.push(RecordedRequest {
                method: request.method,
                path: path.clone(),
                url: request.url,
                headers: request.headers,
                body: request.body,
                at: Instant::now(),
            });
        }
        self.next_reply(&path).into_response()
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Path component of a URL, without query string.
///
/// `https://api.example.com/v1/submit?x=1` -> `/v1/submit`
fn url_path(url: &str) -> &str {
    let after_scheme = url.find("://").map_or(url, |i| &url[i + 3..]);
    let path = after_scheme.find('/').map_or("/", |i| &after_scheme[i..]);
    path.split('?').next().unwrap_or(path)
}
