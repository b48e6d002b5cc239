//! Network capability: the transport behind the guest's `network_request`.
//!
//! The bridge never talks HTTP itself; it hands an `HttpRequest` to a
//! `NetworkClient` and writes whatever body comes back into guest memory.
//!
//! Implementations:
//! - `ReqwestNetwork` (this module): real HTTP via `reqwest`
//! - `MemNetwork`: scripted in-memory responses for testing

use std::time::Duration;

use async_trait::async_trait;

use crate::error::HostError;
use crate::types::{HttpRequest, HttpResponse};

/// Default per-request deadline for `ReqwestNetwork`.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Abstraction over the HTTP transport.
///
/// Implementations return every response they receive, whatever its
/// status; classifying non-2xx as a failure is the bridge's job.
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Perform one request and return the full response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HostError>;
}

/// `NetworkClient` backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestNetwork {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestNetwork {
    /// Create a client with the default timeout.
    pub fn new() -> Result<Self, HostError> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client whose requests fail after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self, HostError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(HostError::transport)?;
        Ok(Self { client, timeout })
    }

    /// The configured per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl NetworkClient for ReqwestNetwork {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HostError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| HostError::transport(format!("method {}: {}", request.method, e)))?;

        let mut builder = self.client.request(method, request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                HostError::Timeout(self.timeout)
            } else if e.is_builder() {
                HostError::invalid_url(e)
            } else {
                HostError::transport(e)
            }
        })?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                HostError::Timeout(self.timeout)
            } else {
                HostError::transport(e)
            }
        })?;

        tracing::debug!(status, bytes = body.len(), "upstream responded");
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}
