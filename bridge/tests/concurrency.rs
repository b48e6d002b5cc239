//! Concurrency tests: single-flight calls on one bridge.
//!
//! The network capability echoes the request body after a short delay, so
//! any interleaving of two calls would either overlap at the network or
//! hand one caller another caller's response.

mod common;

use std::sync::Arc;
use std::time::Duration;

use hogwire_bridge::hostapi::{HttpResponse, MemNetwork};
use hogwire_bridge::BridgeError;

use common::*;

const HOST: &str = "https://eu.example.com";

fn echo_network(delay: Duration) -> MemNetwork {
    MemNetwork::from_fn(|request| Ok(HttpResponse::ok(request.body.clone().unwrap_or_default())))
        .with_delay(delay)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_captures_are_serialized() {
    let network = echo_network(Duration::from_millis(20));
    let bridge = Arc::new(load_bridge(&posthog_guest(), capabilities(network.clone())).await);

    let mut handles = Vec::new();
    for i in 0..8 {
        let bridge = Arc::clone(&bridge);
        handles.push(tokio::spawn(async move {
            let distinct_id = format!("user-{}", i);
            let text = bridge
                .capture("signed_up", &distinct_id, "phc_test", &props(), HOST)
                .await
                .unwrap();
            (distinct_id, text)
        }));
    }

    for handle in handles {
        let (distinct_id, text) = handle.await.unwrap();
        let expected = format!(r#""distinct_id":"{}""#, distinct_id);
        assert!(text.contains(&expected), "{} got {}", distinct_id, text);
    }

    assert_eq!(network.request_count(), 8);
    assert_eq!(network.max_in_flight(), 1);

    let stats = bridge.allocation_stats().await;
    assert_eq!(stats.host_allocations, 8 * 5);
    assert_eq!(stats.outstanding(), 0);
    assert_eq!(stats.guest_releases, 8);
}

#[tokio::test]
async fn test_try_capture_reports_busy() {
    let network = echo_network(Duration::from_millis(200));
    let bridge = Arc::new(load_bridge(&posthog_guest(), capabilities(network)).await);

    let in_flight = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move {
            bridge
                .capture("signed_up", "user-1", "phc_test", &props(), HOST)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = bridge
        .try_capture("signed_up", "user-2", "phc_test", &props(), HOST)
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Busy));

    let text = in_flight.await.unwrap().unwrap();
    assert!(text.contains("user-1"));

    // Once idle, try_capture runs normally.
    let text = bridge
        .try_capture("signed_up", "user-2", "phc_test", &props(), HOST)
        .await
        .unwrap();
    assert!(text.contains("user-2"));
}

/// Traps unless exactly the four argument buffers are live on entry, then
/// performs a GET and returns the host's response buffer.
const LIVE_COUNT_GUEST: &str = r#"
(module
    (import "env" "network_request"
        (func $net (param i32 i32 i32 i32 i32 i32) (result i32)))
    (memory (export "memory") 1)
    (global $bump (mut i32) (i32.const 1024))
    (global $live (mut i32) (i32.const 0))
    (data (i32.const 16) "/")
    (data (i32.const 32) "GET")
    (func (export "allocate") (param $size i32) (result i32)
        (local $ptr i32)
        (local.set $ptr (global.get $bump))
        (global.set $bump (i32.add (global.get $bump) (local.get $size)))
        (global.set $live (i32.add (global.get $live) (i32.const 1)))
        (local.get $ptr))
    (func (export "deallocate") (param i32 i32)
        (global.set $live (i32.sub (global.get $live) (i32.const 1))))
    (func (export "capture")
        (param i32 i32 i32 i32 i32 i32 i32 i32) (result i32)
        (if (i32.ne (global.get $live) (i32.const 4)) (then unreachable))
        (call $net (i32.const 16) (i32.const 1) (i32.const 32) (i32.const 3)
            (i32.const 0) (i32.const 0)))
)
"#;

#[tokio::test]
async fn test_cancelled_capture_is_reclaimed_by_next_call() {
    let network = MemNetwork::ok("done").with_delay(Duration::from_millis(300));
    let bridge = load_bridge(LIVE_COUNT_GUEST, capabilities(network)).await;

    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        bridge.capture("signed_up", "user-1", "phc_test", &props(), HOST),
    )
    .await;
    assert!(cancelled.is_err());
    assert_eq!(bridge.outstanding_buffers().await, 4);

    // The guest sees only this call's arguments on entry.
    let text = bridge
        .capture("signed_up", "user-2", "phc_test", &props(), HOST)
        .await
        .unwrap();
    assert_eq!(text, "done");

    assert_eq!(bridge.outstanding_buffers().await, 0);
    let stats = bridge.allocation_stats().await;
    assert_eq!(stats.host_allocations, 4 + 5);
    assert_eq!(stats.outstanding(), 0);
}
