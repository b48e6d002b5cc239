//! Bridge error types.

use hogwire_hostapi::HostError;
use wasmtime::Trap;

/// Top-level error type for the bridge crate.
///
/// `Link` is construction-time and fatal for the bridge. Every other variant
/// aborts only the `capture` call that raised it; the bridge stays usable.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    /// Compilation, ABI validation, or instantiation failed.
    #[error("link error: {0}")]
    Link(String),

    /// A guest pointer range fell outside the current linear memory.
    #[error("out-of-bounds access: ptr={ptr} len={len} memory_size={memory_size}")]
    OutOfBoundsAccess { ptr: i64, len: i64, memory_size: usize },

    /// Bytes read from guest memory were not valid UTF-8.
    #[error("invalid utf-8 in guest memory: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    /// The guest allocator trapped or returned an unusable pointer.
    #[error("guest allocation of {size} bytes failed: {reason}")]
    AllocationFailed { size: usize, reason: String },

    /// The network capability failed inside `network_request`.
    #[error("upstream request failed: {0}")]
    UpstreamRequestFailed(HostError),

    /// The entry point produced no usable result.
    #[error("call failed: {0}")]
    CallFailed(String),

    /// The property map could not be encoded for the guest.
    #[error("properties serialization failed: {0}")]
    Serialization(HostError),

    /// `try_capture` found another call in flight.
    #[error("bridge busy: a capture call is already in flight")]
    Busy,

    /// The guest ran out of fuel.
    #[error("fuel exhausted (instruction limit)")]
    FuelExhausted,

    /// The guest trapped for a reason other than a host capability failure.
    #[error("guest trapped: {0}")]
    GuestTrapped(String),
}

impl BridgeError {
    /// Classify an error returned by a guest call.
    ///
    /// Fuel exhaustion -> `FuelExhausted`, anything else -> `GuestTrapped`.
    pub fn from_trap(err: anyhow::Error) -> Self {
        match err.downcast_ref::<Trap>() {
            Some(Trap::OutOfFuel) => Self::FuelExhausted,
            _ => Self::GuestTrapped(format!("{:#}", err)),
        }
    }

    /// Build an `OutOfBoundsAccess` for a guest range.
    pub fn out_of_bounds(ptr: i64, len: i64, memory_size: usize) -> Self {
        Self::OutOfBoundsAccess {
            ptr,
            len,
            memory_size,
        }
    }

    /// The upstream HTTP status, if this is a status failure.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::UpstreamRequestFailed(host) => host.status(),
            _ => None,
        }
    }
}
