//! Mutable state held in the Wasmtime Store.
//!
//! `HostState` combines the host capabilities, the store limits, the guest's
//! resolved exports, and the per-call context into a single struct that lives
//! inside `Store<HostState>` for the lifetime of a `GuestBridge`.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;
use wasmtime::{AsContextMut, Instance, StoreLimits, StoreLimitsBuilder};

use hogwire_hostapi::{CamelCaseJson, LogSink, NetworkClient, PropertySerializer, TracingLogSink};

use crate::allocator::{AllocationStats, BufferAllocator, BufferLedger};
use crate::config::{BridgeConfig, ExportNames};
use crate::error::BridgeError;
use crate::exchange::CallContext;
use crate::memory::MemoryView;

/// The host services a guest may reach through its imports.
#[derive(Clone)]
pub struct Capabilities {
    pub network: Arc<dyn NetworkClient>,
    pub log_sink: Arc<dyn LogSink>,
    pub serializer: Arc<dyn PropertySerializer>,
}

impl Capabilities {
    /// Capabilities over `network`, logging through `tracing` and encoding
    /// properties as compact camelCase JSON.
    pub fn new(network: Arc<dyn NetworkClient>) -> Self {
        Self {
            network,
            log_sink: Arc::new(TracingLogSink),
            serializer: Arc::new(CamelCaseJson::default()),
        }
    }

    pub fn with_log_sink(mut self, log_sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = log_sink;
        self
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn PropertySerializer>) -> Self {
        self.serializer = serializer;
        self
    }
}

/// Guest exports resolved once after instantiation.
#[derive(Clone)]
pub struct GuestExports {
    pub memory: MemoryView,
    pub allocator: BufferAllocator,
}

impl GuestExports {
    /// Look up the memory and allocator exports by name.
    pub fn resolve(
        instance: &Instance,
        mut store: impl AsContextMut<Data = HostState>,
        names: &ExportNames,
    ) -> Result<Self, BridgeError> {
        let memory = instance
            .get_memory(&mut store, "memory")
            .map(MemoryView::new)
            .ok_or_else(|| BridgeError::Link("no memory export".into()))?;
        let allocate = instance
            .get_typed_func::<i32, i32>(&mut store, &names.allocate)
            .map_err(|e| BridgeError::Link(format!("export '{}': {}", names.allocate, e)))?;
        let deallocate = instance
            .get_typed_func::<(i32, i32), ()>(&mut store, &names.deallocate)
            .map_err(|e| BridgeError::Link(format!("export '{}': {}", names.deallocate, e)))?;

        Ok(Self {
            memory,
            allocator: BufferAllocator::new(allocate, deallocate, memory),
        })
    }
}

/// Store data for one bridge instance.
pub struct HostState {
    pub capabilities: Capabilities,
    /// Deadline applied to each network request.
    pub request_timeout: Duration,
    /// Re-indent JSON log lines before forwarding them.
    pub pretty_log_json: bool,
    /// Linear memory growth cap, installed as the store limiter.
    pub limits: StoreLimits,
    /// Set by the runtime after instantiation.
    pub guest: Option<GuestExports>,
    /// Present only while a `capture` call is in flight.
    pub call: Option<CallContext>,
    /// Host-owned buffers for the in-flight call.
    pub ledger: BufferLedger,
    pub stats: AllocationStats,
    next_call_id: u64,
}

impl HostState {
    pub fn new(capabilities: Capabilities, config: &BridgeConfig) -> Self {
        let limits = StoreLimitsBuilder::new()
            .memory_size(config.max_memory_bytes())
            .instances(1)
            .build();
        Self {
            capabilities,
            request_timeout: config.request_timeout,
            pretty_log_json: config.pretty_log_json,
            limits,
            guest: None,
            call: None,
            ledger: BufferLedger::new(),
            stats: AllocationStats::default(),
            next_call_id: 1,
        }
    }

    /// Open a fresh call context and return its id.
    pub fn begin_call(&mut self, target_host: &str) -> u64 {
        let call_id = self.next_call_id;
        self.next_call_id += 1;
        self.call = Some(CallContext::new(call_id, target_host));
        call_id
    }

    /// Drop the call context. Any recorded response length goes with it.
    pub fn end_call(&mut self) -> Option<CallContext> {
        self.call.take()
    }

    pub fn call(&self) -> Result<&CallContext, BridgeError> {
        self.call
            .as_ref()
            .ok_or_else(|| BridgeError::CallFailed("no capture call in flight".into()))
    }

    pub fn call_mut(&mut self) -> Result<&mut CallContext, BridgeError> {
        self.call
            .as_mut()
            .ok_or_else(|| BridgeError::CallFailed("no capture call in flight".into()))
    }

    /// Resolved guest exports. Cloned so the store can be borrowed mutably
    /// while they are in use.
    pub fn guest(&self) -> Result<GuestExports, BridgeError> {
        self.guest
            .clone()
            .ok_or_else(|| BridgeError::CallFailed("guest exports not resolved".into()))
    }

    /// The capability failure recorded during the current call, if any.
    pub fn take_call_failure(&mut self) -> Option<BridgeError> {
        self.call.as_mut().and_then(|c| c.exchange.take_failure())
    }

    /// `text` re-indented when pretty JSON logging is on and it parses as
    /// an object or array; otherwise unchanged.
    pub fn format_json<'a>(&self, text: &'a str) -> Cow<'a, str> {
        match self.pretty_log_json.then(|| pretty_json(text)).flatten() {
            Some(pretty) => Cow::Owned(pretty),
            None => Cow::Borrowed(text),
        }
    }

    /// Forward a guest log line to the sink. Never fails.
    pub fn forward_log(&self, message: &str) {
        let line = self.format_json(message);
        if let Err(e) = self.capabilities.log_sink.log(&line) {
            warn!(error = %e, "log sink rejected guest message");
        }
    }
}

/// Indented form of `message` when it is a JSON object or array.
fn pretty_json(message: &str) -> Option<String> {
    match serde_json::from_str::<Value>(message.trim()) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => serde_json::to_string_pretty(&value).ok(),
        _ => None,
    }
}
