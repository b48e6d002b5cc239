//! Per-call exchange state.
//!
//! The guest fetches a response in two steps: `network_request` returns the
//! buffer pointer, then `network_request_length` returns its byte length.
//! The length lives in a `CallContext` created by `capture` and dropped when
//! the call ends, so a value recorded during one call can never be observed
//! by another.

use crate::error::BridgeError;

/// Outcome of the most recent network exchange within one call.
#[derive(Debug, Default)]
pub struct ExchangeState {
    response_len: Option<usize>,
    exchanges: u32,
    failure: Option<BridgeError>,
}

impl ExchangeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the byte length of a delivered response body.
    /// Overwrites the previous exchange's value.
    pub fn record_response(&mut self, len: usize) {
        self.response_len = Some(len);
        self.exchanges += 1;
    }

    /// Length of the last delivered response. `Some(0)` is an empty body;
    /// `None` means no response has been recorded in this call.
    pub fn response_len(&self) -> Option<usize> {
        self.response_len
    }

    /// Number of responses delivered so far in this call.
    pub fn exchanges(&self) -> u32 {
        self.exchanges
    }

    /// Remember why a host capability trapped. The first failure wins.
    pub fn record_failure(&mut self, err: BridgeError) {
        if self.failure.is_none() {
            self.failure = Some(err);
        }
    }

    pub fn take_failure(&mut self) -> Option<BridgeError> {
        self.failure.take()
    }
}

/// Everything scoped to one in-flight `capture` call.
#[derive(Debug)]
pub struct CallContext {
    /// Monotonic per-bridge call number, used in log spans.
    pub call_id: u64,
    /// Base URL relative request targets are resolved against.
    pub target_host: String,
    pub exchange: ExchangeState,
}

impl CallContext {
    pub fn new(call_id: u64, target_host: impl Into<String>) -> Self {
        Self {
            call_id,
            target_host: target_host.into(),
            exchange: ExchangeState::new(),
        }
    }
}
