//! `hogwire-hostapi`: host capabilities exposed to the hogwire guest module.
//!
//! The bridge crate wires these capabilities into the guest's import table.
//! Nothing here depends on the WASM runtime, so capabilities can be swapped
//! or tested on their own. This crate provides:
//!
//! - `NetworkClient` trait: the transport behind `network_request`
//! - `ReqwestNetwork`: production `NetworkClient` over `reqwest`
//! - `MemNetwork`: scripted in-memory `NetworkClient` for testing
//! - `LogSink` trait: destination for `log_message` (`TracingLogSink`, `MemLogSink`)
//! - `PropertySerializer` trait: property map encoding (`CamelCaseJson`)
//! - `HttpRequest` / `HttpResponse` / `HttpMethod`: explicit request shapes
//! - `HostError`: capability error type

pub mod error;
pub mod types;
pub mod network;
pub mod mem_network;
pub mod log_sink;
pub mod serializer;

// Re-export commonly used types at the crate root.
pub use error::HostError;
pub use types::{resolve_url, HttpMethod, HttpRequest, HttpResponse};
pub use network::{NetworkClient, ReqwestNetwork, DEFAULT_REQUEST_TIMEOUT};
pub use mem_network::MemNetwork;
pub use log_sink::{LogSink, MemLogSink, TracingLogSink};
pub use serializer::{CamelCaseJson, PropertySerializer};
