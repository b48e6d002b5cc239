//! In-memory network capability for testing.
//!
//! `MemNetwork` records every request it receives and answers with a
//! scripted response. It can also delay each answer and tracks how many
//! requests were in flight at once, which lets tests observe whether
//! callers were serialized.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::HostError;
use crate::network::NetworkClient;
use crate::types::{HttpRequest, HttpResponse};

type Responder = dyn Fn(&HttpRequest) -> Result<HttpResponse, HostError> + Send + Sync;

/// Scripted `NetworkClient`.
#[derive(Clone)]
pub struct MemNetwork {
    responder: Arc<Responder>,
    delay: Option<Duration>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MemNetwork {
    /// Answer every request with `200 OK` and the given body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::with_status(200, body)
    }

    /// Answer every request with the given status and body.
    pub fn with_status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        let response = HttpResponse::new(status, body);
        Self::from_fn(move |_| Ok(response.clone()))
    }

    /// Answer every request with the given error.
    pub fn failing(error: HostError) -> Self {
        Self::from_fn(move |_| Err(error.clone()))
    }

    /// Compute each response from the request.
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, HostError> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            delay: None,
            requests: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleep for `delay` before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// All requests received so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    /// Highest number of requests that were being answered at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkClient for MemNetwork {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HostError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Ok(mut guard) = self.requests.lock() {
            guard.push(request.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = (self.responder)(&request);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
