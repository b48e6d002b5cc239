//! Shared test helpers for integration tests.
//!
//! Provides WAT guest fixtures, property maps, and bridge factory functions
//! used across all integration test files.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{json, Map, Value};

use hogwire_bridge::hostapi::{MemLogSink, MemNetwork, NetworkClient};
use hogwire_bridge::{BridgeConfig, Capabilities, ExportNames, GuestBridge};

// ── Guest Fixtures ──

/// Analytics guest: builds
/// `{"api_key":..,"event":..,"distinct_id":..,"properties":..}`, logs the
/// properties, POSTs the body to `/capture`, and returns a copy of the
/// response in a buffer it allocates itself.
///
/// `deallocate` traps if more buffers are freed than were allocated.
const POSTHOG_GUEST: &str = r#"
(module
    (import "env" "network_request"
        (func $net (param i32 i32 i32 i32 i32 i32) (result i32)))
    (import "env" "network_request_length" (func $net_len (result i32)))
    (import "env" "log_message" (func $log (param i32 i32)))
    (memory (export "memory") 1)
    (global $bump (mut i32) (i32.const 1024))
    (global $live (mut i32) (i32.const 0))
    (data (i32.const 16) "{\"api_key\":\"")
    (data (i32.const 32) "\",\"event\":\"")
    (data (i32.const 48) "\",\"distinct_id\":\"")
    (data (i32.const 80) "\",\"properties\":")
    (data (i32.const 96) "}")
    (data (i32.const 112) "/capture")
    (data (i32.const 128) "POST")
    (func $alloc (export "allocate") (param $size i32) (result i32)
        (local $ptr i32)
        (local.set $ptr (global.get $bump))
        (global.set $bump (i32.add (global.get $bump) (local.get $size)))
        (global.set $live (i32.add (global.get $live) (i32.const 1)))
        (local.get $ptr))
    (func $dealloc (export "deallocate") (param $ptr i32) (param $len i32)
        (if (i32.eqz (global.get $live)) (then unreachable))
        (global.set $live (i32.sub (global.get $live) (i32.const 1))))
    (func $append (param $dst i32) (param $src i32) (param $n i32) (result i32)
        (memory.copy (local.get $dst) (local.get $src) (local.get $n))
        (i32.add (local.get $dst) (local.get $n)))
    (func (export "capture")
        (param $ev_ptr i32) (param $ev_len i32)
        (param $id_ptr i32) (param $id_len i32)
        (param $key_ptr i32) (param $key_len i32)
        (param $props_ptr i32) (param $props_len i32)
        HOST_PARAMS
        (result i32)
        (local $len i32) (local $body i32) (local $cur i32)
        (local $resp i32) (local $rlen i32) (local $out i32)
        (call $log (local.get $props_ptr) (local.get $props_len))
        (local.set $len
            (i32.add (i32.const 56)
                (i32.add
                    (i32.add (local.get $ev_len) (local.get $id_len))
                    (i32.add (local.get $key_len) (local.get $props_len)))))
        (local.set $body (call $alloc (local.get $len)))
        (local.set $cur (call $append (local.get $body) (i32.const 16) (i32.const 12)))
        (local.set $cur (call $append (local.get $cur) (local.get $key_ptr) (local.get $key_len)))
        (local.set $cur (call $append (local.get $cur) (i32.const 32) (i32.const 11)))
        (local.set $cur (call $append (local.get $cur) (local.get $ev_ptr) (local.get $ev_len)))
        (local.set $cur (call $append (local.get $cur) (i32.const 48) (i32.const 17)))
        (local.set $cur (call $append (local.get $cur) (local.get $id_ptr) (local.get $id_len)))
        (local.set $cur (call $append (local.get $cur) (i32.const 80) (i32.const 15)))
        (local.set $cur (call $append (local.get $cur) (local.get $props_ptr) (local.get $props_len)))
        (drop (call $append (local.get $cur) (i32.const 96) (i32.const 1)))
        (local.set $resp
            (call $net (i32.const 112) (i32.const 8) (i32.const 128) (i32.const 4)
                (local.get $body) (local.get $len)))
        (call $dealloc (local.get $body) (local.get $len))
        (local.set $rlen (call $net_len))
        (local.set $out (call $alloc (local.get $rlen)))
        (memory.copy (local.get $out) (local.get $resp) (local.get $rlen))
        (local.get $out))
)
"#;

/// Raw-request guest: `event` is the method, `distinct_id` the URL and
/// `api_key` the body. Returns the host's response buffer as its result.
/// Also logs the properties, an invalid UTF-8 range, and an out-of-bounds
/// range.
const RELAY_GUEST: &str = r#"
(module
    (import "env" "network_request"
        (func $net (param i32 i32 i32 i32 i32 i32) (result i32)))
    (import "env" "log_message" (func $log (param i32 i32)))
    (memory (export "memory") 1)
    (global $bump (mut i32) (i32.const 1024))
    (data (i32.const 200) "\ff\fe")
    (func (export "allocate") (param $size i32) (result i32)
        (local $ptr i32)
        (local.set $ptr (global.get $bump))
        (global.set $bump (i32.add (global.get $bump) (local.get $size)))
        (local.get $ptr))
    (func (export "deallocate") (param i32 i32))
    (func (export "capture")
        (param $ev_ptr i32) (param $ev_len i32)
        (param $id_ptr i32) (param $id_len i32)
        (param $key_ptr i32) (param $key_len i32)
        (param $props_ptr i32) (param $props_len i32)
        (result i32)
        (call $log (local.get $props_ptr) (local.get $props_len))
        (call $log (i32.const 200) (i32.const 2))
        (call $log (i32.const 65530) (i32.const 100))
        (call $net
            (local.get $id_ptr) (local.get $id_len)
            (local.get $ev_ptr) (local.get $ev_len)
            (local.get $key_ptr) (local.get $key_len)))
)
"#;

/// Returns 0 without ever calling the network.
const SILENT_GUEST: &str = r#"
(module
    (memory (export "memory") 1)
    (global $bump (mut i32) (i32.const 1024))
    (func (export "allocate") (param $size i32) (result i32)
        (local $ptr i32)
        (local.set $ptr (global.get $bump))
        (global.set $bump (i32.add (global.get $bump) (local.get $size)))
        (local.get $ptr))
    (func (export "deallocate") (param i32 i32))
    (func (export "capture")
        (param i32 i32 i32 i32 i32 i32 i32 i32) (result i32)
        i32.const 0)
)
"#;

/// Performs a GET and then returns a pointer near the end of memory.
const OOB_RESULT_GUEST: &str = r#"
(module
    (import "env" "network_request"
        (func $net (param i32 i32 i32 i32 i32 i32) (result i32)))
    (memory (export "memory") 1)
    (global $bump (mut i32) (i32.const 1024))
    (data (i32.const 16) "/")
    (data (i32.const 32) "GET")
    (func (export "allocate") (param $size i32) (result i32)
        (local $ptr i32)
        (local.set $ptr (global.get $bump))
        (global.set $bump (i32.add (global.get $bump) (local.get $size)))
        (local.get $ptr))
    (func (export "deallocate") (param i32 i32))
    (func (export "capture")
        (param i32 i32 i32 i32 i32 i32 i32 i32) (result i32)
        (drop (call $net (i32.const 16) (i32.const 1) (i32.const 32) (i32.const 3)
            (i32.const 0) (i32.const 0)))
        i32.const 65530)
)
"#;

/// Spins forever.
const SPINNING_GUEST: &str = r#"
(module
    (memory (export "memory") 1)
    (global $bump (mut i32) (i32.const 1024))
    (func (export "allocate") (param $size i32) (result i32)
        (local $ptr i32)
        (local.set $ptr (global.get $bump))
        (global.set $bump (i32.add (global.get $bump) (local.get $size)))
        (local.get $ptr))
    (func (export "deallocate") (param i32 i32))
    (func (export "capture")
        (param i32 i32 i32 i32 i32 i32 i32 i32) (result i32)
        (loop $spin (br $spin))
        i32.const 0)
)
"#;

/// The analytics guest with an 8-parameter entry point.
pub fn posthog_guest() -> String {
    POSTHOG_GUEST.replace("HOST_PARAMS", "")
}

/// The analytics guest with a 10-parameter entry point (target host last).
pub fn posthog_guest_with_host() -> String {
    POSTHOG_GUEST.replace("HOST_PARAMS", "(param $host_ptr i32) (param $host_len i32)")
}

/// The analytics guest built against the older import and export names.
pub fn legacy_guest() -> String {
    posthog_guest()
        .replace("\"network_request_length\"", "\"http_request_len\"")
        .replace("\"network_request\"", "\"http_request\"")
        .replace("(export \"allocate\")", "(export \"alloc_buffer\")")
        .replace("(export \"deallocate\")", "(export \"dealloc_buffer\")")
}

pub fn relay_guest() -> &'static str {
    RELAY_GUEST
}

pub fn silent_guest() -> &'static str {
    SILENT_GUEST
}

pub fn oob_result_guest() -> &'static str {
    OOB_RESULT_GUEST
}

pub fn spinning_guest() -> &'static str {
    SPINNING_GUEST
}

// ── Properties ──

pub fn props() -> Map<String, Value> {
    match json!({ "plan": "pro" }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

// ── Bridge Factories ──

/// Install a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn capabilities(network: impl NetworkClient + 'static) -> Capabilities {
    Capabilities::new(Arc::new(network))
}

pub fn capabilities_with_sink(network: MemNetwork, sink: MemLogSink) -> Capabilities {
    capabilities(network).with_log_sink(Arc::new(sink))
}

pub async fn load_bridge(wat: &str, capabilities: Capabilities) -> GuestBridge {
    load_bridge_with_config(wat, capabilities, BridgeConfig::default()).await
}

pub async fn load_bridge_with_config(
    wat: &str,
    capabilities: Capabilities,
    config: BridgeConfig,
) -> GuestBridge {
    init_tracing();
    GuestBridge::new(wat.as_bytes(), capabilities, config)
        .await
        .expect("guest should link")
}

pub fn legacy_config() -> BridgeConfig {
    BridgeConfig {
        export_names: ExportNames::legacy(),
        ..BridgeConfig::default()
    }
}
