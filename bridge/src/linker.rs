//! Host function registration via Wasmtime linker.
//!
//! Registers the `env` imports the guest may call back into:
//!
//! - `network_request(url_ptr, url_len, method_ptr, method_len, body_ptr, body_len) -> ptr`
//! - `network_request_length() -> len`
//! - `log_message(ptr, len)`
//!
//! plus the `http_request`/`http_request_len` aliases used by older guests.
//! A capability failure traps the guest. The failure itself is stashed in the
//! call's `ExchangeState` so `capture` can report its precise kind.

use tracing::{debug, warn};
use wasmtime::{Caller, Linker};

use hogwire_hostapi::{resolve_url, HostError, HttpMethod, HttpRequest};

use crate::error::BridgeError;
use crate::host_impl::HostState;

/// Import module every host function is registered under.
pub const IMPORT_MODULE: &str = "env";

/// Import names satisfied by `register_host_functions`.
pub const HOST_IMPORTS: &[&str] = &[
    "network_request",
    "network_request_length",
    "log_message",
    "http_request",
    "http_request_len",
];

/// Register all `env` host functions with the linker.
pub fn register_host_functions(linker: &mut Linker<HostState>) -> Result<(), BridgeError> {
    register_network_request(linker, "network_request")?;
    register_network_request(linker, "http_request")?;
    register_network_request_length(linker, "network_request_length")?;
    register_network_request_length(linker, "http_request_len")?;
    register_log_message(linker)?;
    Ok(())
}

fn link_error(err: anyhow::Error) -> BridgeError {
    BridgeError::Link(format!("{:#}", err))
}

/// Record `err` as the call's failure and turn it into a trap.
fn raise(caller: &mut Caller<'_, HostState>, err: BridgeError) -> anyhow::Error {
    if let Some(call) = caller.data_mut().call.as_mut() {
        call.exchange.record_failure(err.clone());
    }
    anyhow::Error::new(err)
}

// ── Network ──

fn register_network_request(
    linker: &mut Linker<HostState>,
    name: &str,
) -> Result<(), BridgeError> {
    linker
        .func_wrap_async(
            IMPORT_MODULE,
            name,
            |mut caller: Caller<'_, HostState>,
             (url_ptr, url_len, method_ptr, method_len, body_ptr, body_len): (
                i32,
                i32,
                i32,
                i32,
                i32,
                i32,
            )| {
                Box::new(async move {
                    let outcome = perform_network_request(
                        &mut caller,
                        (url_ptr, url_len),
                        (method_ptr, method_len),
                        (body_ptr, body_len),
                    )
                    .await;
                    outcome.map_err(|e| raise(&mut caller, e))
                })
            },
        )
        .map_err(link_error)?;
    Ok(())
}

async fn perform_network_request(
    caller: &mut Caller<'_, HostState>,
    (url_ptr, url_len): (i32, i32),
    (method_ptr, method_len): (i32, i32),
    (body_ptr, body_len): (i32, i32),
) -> Result<i32, BridgeError> {
    let guest = caller.data().guest()?;

    let raw_url = guest.memory.read_string(&*caller, url_ptr, url_len)?;
    let method = HttpMethod::parse(&guest.memory.read_string(&*caller, method_ptr, method_len)?);
    let body = if body_len != 0 {
        Some(guest.memory.read_bytes(&*caller, body_ptr, body_len)?)
    } else {
        None
    };

    let target_host = caller.data().call()?.target_host.clone();
    let url = resolve_url(Some(&target_host), &raw_url).map_err(BridgeError::UpstreamRequestFailed)?;

    let request = HttpRequest::from_guest(method, url, body);
    let network = caller.data().capabilities.network.clone();
    let timeout = caller.data().request_timeout;
    debug!(method = %request.method, url = %request.url, "guest network request");
    if let Some(text) = request.body_text() {
        debug!(body = %caller.data().format_json(text), "guest request body");
    }

    let response = match tokio::time::timeout(timeout, network.send(request)).await {
        Ok(result) => result.map_err(BridgeError::UpstreamRequestFailed)?,
        Err(_) => {
            return Err(BridgeError::UpstreamRequestFailed(HostError::Timeout(
                timeout,
            )))
        }
    };
    if !response.is_success() {
        return Err(BridgeError::UpstreamRequestFailed(HostError::Status(
            response.status,
        )));
    }
    debug!(status = response.status, bytes = response.body.len(), "upstream responded");
    if let Ok(text) = std::str::from_utf8(&response.body) {
        debug!(body = %caller.data().format_json(text), "upstream response body");
    }

    let buffer = guest.allocator.write_bytes(&mut *caller, &response.body).await?;
    let ptr = buffer.ptr();
    let len = buffer.len();

    let state = caller.data_mut();
    state.ledger.track(buffer);
    state.call_mut()?.exchange.record_response(len);
    Ok(ptr)
}

fn register_network_request_length(
    linker: &mut Linker<HostState>,
    name: &str,
) -> Result<(), BridgeError> {
    linker
        .func_wrap(
            IMPORT_MODULE,
            name,
            |mut caller: Caller<'_, HostState>| -> anyhow::Result<i32> {
                response_length(caller.data()).map_err(|e| raise(&mut caller, e))
            },
        )
        .map_err(link_error)?;
    Ok(())
}

fn response_length(state: &HostState) -> Result<i32, BridgeError> {
    let len = state
        .call()?
        .exchange
        .response_len()
        .ok_or_else(|| BridgeError::CallFailed("no response recorded in this call".into()))?;
    i32::try_from(len)
        .map_err(|_| BridgeError::CallFailed(format!("response length {} exceeds i32", len)))
}

// ── Logging ──

fn register_log_message(linker: &mut Linker<HostState>) -> Result<(), BridgeError> {
    linker
        .func_wrap(
            IMPORT_MODULE,
            "log_message",
            |caller: Caller<'_, HostState>, ptr: i32, len: i32| {
                let state = caller.data();
                let message = state
                    .guest()
                    .and_then(|guest| guest.memory.read_string(&caller, ptr, len));
                match message {
                    Ok(message) => state.forward_log(&message),
                    Err(e) => warn!(ptr, len, error = %e, "dropping unreadable guest log message"),
                }
            },
        )
        .map_err(link_error)?;
    Ok(())
}
