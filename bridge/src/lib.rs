//! `hogwire-bridge`: Wasmtime-based bridge into a sandboxed analytics guest.
//!
//! This crate loads, validates, and drives a guest WASM module that builds
//! and sends analytics events. The host marshals strings into the guest's
//! linear memory, invokes its entry point, and services the guest's
//! callbacks (network, logging) while the call is suspended. It enforces:
//!
//! - **Bounds checking:** every guest `(ptr, len)` pair is validated per access
//! - **Buffer ownership:** each guest buffer is released exactly once per call
//! - **Single flight:** one `capture` at a time per bridge; callers queue
//! - **Fuel metering:** instruction-level metering stops runaway guests
//! - **Memory limits:** bounded linear memory growth
//! - **Import whitelisting:** only the `env` host functions, no WASI
//!
//! The primary entry point is [`GuestBridge::capture`].

pub mod error;
pub mod config;
pub mod memory;
pub mod allocator;
pub mod exchange;
pub mod host_impl;
pub mod validation;
pub mod linker;
pub mod runtime;

pub use error::BridgeError;
pub use config::{BridgeConfig, ExportNames};
pub use allocator::{AllocationStats, BufferOwner, MarshaledBuffer};
pub use exchange::ExchangeState;
pub use host_impl::Capabilities;
pub use validation::EntryArity;
pub use runtime::GuestBridge;

// Capability implementations callers need to build a `Capabilities`.
pub use hogwire_hostapi as hostapi;
