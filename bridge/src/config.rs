//! Bridge configuration.

use std::time::Duration;

use hogwire_hostapi::DEFAULT_REQUEST_TIMEOUT;

/// Names of the functions the guest must export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportNames {
    pub allocate: String,
    pub deallocate: String,
    pub entry_point: String,
}

impl ExportNames {
    /// Export names used by earlier guest builds (`alloc_buffer`/`dealloc_buffer`).
    pub fn legacy() -> Self {
        Self {
            allocate: "alloc_buffer".into(),
            deallocate: "dealloc_buffer".into(),
            ..Self::default()
        }
    }
}

impl Default for ExportNames {
    fn default() -> Self {
        Self {
            allocate: "allocate".into(),
            deallocate: "deallocate".into(),
            entry_point: "capture".into(),
        }
    }
}

/// Configuration for a `GuestBridge`.
///
/// Controls memory limits, instruction fuel, the network deadline, and the
/// export names resolved at link time.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Maximum linear memory pages (1 page = 64 KiB).
    /// Default: 256 pages = 16 MiB.
    pub max_memory_pages: u32,

    /// Wasmtime fuel granted to each `capture` call.
    pub fuel_limit: u64,

    /// Deadline for each network request issued by the guest.
    pub request_timeout: Duration,

    /// Guest export names.
    pub export_names: ExportNames,

    /// Re-indent guest log lines that are JSON documents.
    pub pretty_log_json: bool,
}

impl BridgeConfig {
    /// Linear memory cap in bytes.
    pub fn max_memory_bytes(&self) -> usize {
        self.max_memory_pages as usize * 65536
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_memory_pages: 256,       // 16 MiB
            fuel_limit: 100_000_000,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            export_names: ExportNames::default(),
            pretty_log_json: true,
        }
    }
}
