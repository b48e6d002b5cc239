//! Diagnostic sink behind the guest's `log_message` import.
//!
//! Sink failures are reported to the bridge as `Err`, but the bridge never
//! lets them reach the guest: logging is fire-and-forget.

use std::sync::{Arc, Mutex};

use crate::error::HostError;

/// Destination for guest log lines.
pub trait LogSink: Send + Sync {
    /// Record one message emitted by the guest.
    fn log(&self, message: &str) -> Result<(), HostError>;
}

/// Default sink: forwards guest messages to `tracing` under target `guest`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, message: &str) -> Result<(), HostError> {
        tracing::info!(target: "guest", "{}", message);
        Ok(())
    }
}

/// In-memory sink for tests. Optionally rejects every message.
#[derive(Debug, Clone, Default)]
pub struct MemLogSink {
    lines: Arc<Mutex<Vec<String>>>,
    reject: bool,
}

impl MemLogSink {
    /// A sink that accepts and stores every message.
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that stores every message and then reports failure.
    pub fn rejecting() -> Self {
        Self {
            lines: Arc::default(),
            reject: true,
        }
    }

    /// Messages received so far, in order.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl LogSink for MemLogSink {
    fn log(&self, message: &str) -> Result<(), HostError> {
        self.lines
            .lock()
            .map_err(|_| HostError::Sink("log buffer poisoned".into()))?
            .push(message.to_string());
        if self.reject {
            return Err(HostError::Sink("sink rejects all messages".into()));
        }
        Ok(())
    }
}
