//! Production HTTP transport built on `reqwest`.

use super::{HttpClient, HttpRequest, HttpResponse, Method, TransportError};
use async_trait::async_trait;
use std::error::Error as _;
use std::time::Duration;
use tracing::debug;

/// `reqwest`-backed [`HttpClient`] with a fixed per-request timeout.
#[derive(Clone)]
pub struct ReqwestClient {
    http: reqwest::Client,
}

impl ReqwestClient {
    /// Build a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn execute(&self, request: HttpRequest) -> HttpResponse {
        let mut builder = match request.method {
            Method::Get => self.http.get(&request.url),
            Method::Post => self.http.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = match builder.send().await {
            Ok(resp) => resp,
            Err(e) => {
                let error = classify(&e);
                debug!(url = %request.url, error = %error, "HTTP transport failure");
                return HttpResponse::transport_failure(error);
            }
        };

        let status = resp.status().as_u16();
        // A body that cannot be read still carries a meaningful status.
        let body = resp.text().await.unwrap_or_default();
        HttpResponse::new(status, body)
    }

    fn name(&self) -> &'static str {
        "reqwest"
    }
}

/// Map a `reqwest` error onto the transport taxonomy.
fn classify(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout;
    }
    if err.is_connect() {
        let chain = error_chain(err);
        let lowered = chain.to_lowercase();
        if lowered.contains("dns") || lowered.contains("resolve") || lowered.contains("network is unreachable") {
            return TransportError::NoNetwork(chain);
        }
        return TransportError::Unreachable(chain);
    }
    TransportError::Client(error_chain(err))
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(s) = source {
        msg.push_str(": ");
        msg.push_str(&s.to_string());
        source = s.source();
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_refused_connection_is_connectivity_loss() {
        // Port 9 (discard) on loopback is closed on any sane test machine.
        let client = ReqwestClient::new(Duration::from_secs(2)).unwrap();
        let resp = client
            .execute(HttpRequest::get("http://127.0.0.1:9/ping"))
            .await;
        assert_eq!(resp.status, 0);
        assert!(resp.lost_connectivity(), "unexpected error: {:?}", resp.error);
    }

    #[test]
    fn test_client_builds() {
        let client = ReqwestClient::new(Duration::from_secs(30)).unwrap();
        assert_eq!(client.name(), "reqwest");
    }
}
