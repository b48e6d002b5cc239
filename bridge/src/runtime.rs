//! Bridge runtime: Wasmtime engine, module linking, and `capture` calls.
//!
//! `GuestBridge` is the main entry point. It loads a guest module, validates
//! its ABI, instantiates it once, and then serves `capture` calls against
//! that single instance. The store sits behind an async mutex, so calls on
//! one bridge never interleave; concurrent callers queue.

use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};
use wasmtime::{Config, Engine, Linker, Module, Store, TypedFunc};

use hogwire_hostapi::PropertySerializer;

use crate::allocator::{AllocationStats, MarshaledBuffer};
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::host_impl::{Capabilities, GuestExports, HostState};
use crate::linker::register_host_functions;
use crate::memory::check_range;
use crate::validation::{validate_module, EntryArity};

type Pair = (i32, i32);

enum EntryPoint {
    WithoutHost(TypedFunc<(i32, i32, i32, i32, i32, i32, i32, i32), i32>),
    WithHost(TypedFunc<(i32, i32, i32, i32, i32, i32, i32, i32, i32, i32), i32>),
}

/// Borrowed arguments of one `capture` call, with properties already encoded.
struct CaptureArgs<'a> {
    event_name: &'a str,
    distinct_id: &'a str,
    api_key: &'a str,
    properties: String,
    target_host: &'a str,
}

/// A linked guest module ready to serve `capture` calls.
pub struct GuestBridge {
    store: Mutex<Store<HostState>>,
    entry: EntryPoint,
    guest: GuestExports,
    serializer: Arc<dyn PropertySerializer>,
    fuel_limit: u64,
}

impl GuestBridge {
    /// Link a guest from WASM bytecode (or WAT text).
    ///
    /// Validates the module's exports and imports before instantiating it.
    pub async fn new(
        wasm_bytes: &[u8],
        capabilities: Capabilities,
        config: BridgeConfig,
    ) -> Result<Self, BridgeError> {
        let engine = create_engine()?;
        let module = Module::new(&engine, wasm_bytes).map_err(link_error)?;
        Self::link(&engine, &module, capabilities, config).await
    }

    /// Load from a `.wasm` file path.
    pub async fn from_file(
        path: &Path,
        capabilities: Capabilities,
        config: BridgeConfig,
    ) -> Result<Self, BridgeError> {
        let engine = create_engine()?;
        let module = Module::from_file(&engine, path).map_err(link_error)?;
        Self::link(&engine, &module, capabilities, config).await
    }

    async fn link(
        engine: &Engine,
        module: &Module,
        capabilities: Capabilities,
        config: BridgeConfig,
    ) -> Result<Self, BridgeError> {
        let names = &config.export_names;
        let arity = validate_module(module, names)?;
        let serializer = capabilities.serializer.clone();

        let mut store = Store::new(engine, HostState::new(capabilities, &config));
        store.limiter(|state| &mut state.limits);
        store.set_fuel(config.fuel_limit).map_err(link_error)?;

        let mut linker = Linker::new(engine);
        register_host_functions(&mut linker)?;

        let instance = linker
            .instantiate_async(&mut store, module)
            .await
            .map_err(link_error)?;

        let guest = GuestExports::resolve(&instance, &mut store, names)?;
        let entry = match arity {
            EntryArity::WithoutHost => EntryPoint::WithoutHost(
                instance
                    .get_typed_func(&mut store, &names.entry_point)
                    .map_err(link_error)?,
            ),
            EntryArity::WithHost => EntryPoint::WithHost(
                instance
                    .get_typed_func(&mut store, &names.entry_point)
                    .map_err(link_error)?,
            ),
        };
        store.data_mut().guest = Some(guest.clone());

        info!(
            entry_point = %names.entry_point,
            params = arity.param_count(),
            "guest module linked"
        );

        Ok(Self {
            store: Mutex::new(store),
            entry,
            guest,
            serializer,
            fuel_limit: config.fuel_limit,
        })
    }

    /// Run the guest's entry point and return the text it produced.
    ///
    /// Waits for any call already in flight on this bridge.
    ///
    /// Dropping the returned future mid-call defers buffer cleanup: the next
    /// call on this bridge releases whatever the cancelled one left behind
    /// before it marshals its own arguments.
    pub async fn capture(
        &self,
        event_name: &str,
        distinct_id: &str,
        api_key: &str,
        properties: &Map<String, Value>,
        target_host: &str,
    ) -> Result<String, BridgeError> {
        let properties = self
            .serializer
            .serialize(properties)
            .map_err(BridgeError::Serialization)?;
        let mut store = self.store.lock().await;
        let args = CaptureArgs {
            event_name,
            distinct_id,
            api_key,
            properties,
            target_host,
        };
        self.run(&mut store, args).await
    }

    /// Like `capture`, but fails with `Busy` instead of waiting.
    pub async fn try_capture(
        &self,
        event_name: &str,
        distinct_id: &str,
        api_key: &str,
        properties: &Map<String, Value>,
        target_host: &str,
    ) -> Result<String, BridgeError> {
        let properties = self
            .serializer
            .serialize(properties)
            .map_err(BridgeError::Serialization)?;
        let mut store = self.store.try_lock().map_err(|_| BridgeError::Busy)?;
        let args = CaptureArgs {
            event_name,
            distinct_id,
            api_key,
            properties,
            target_host,
        };
        self.run(&mut store, args).await
    }

    /// Allocation counters accumulated over the bridge's lifetime.
    pub async fn allocation_stats(&self) -> AllocationStats {
        self.store.lock().await.data().stats
    }

    /// Host-owned buffers still tracked. Zero whenever no call is in flight.
    pub async fn outstanding_buffers(&self) -> usize {
        self.store.lock().await.data().ledger.len()
    }

    async fn run(
        &self,
        store: &mut Store<HostState>,
        args: CaptureArgs<'_>,
    ) -> Result<String, BridgeError> {
        if !store.data().ledger.is_empty() {
            self.reclaim_abandoned(store).await;
        }

        let call_id = store.data_mut().begin_call(args.target_host);
        let span = info_span!("capture", call_id, event = args.event_name);

        async move {
            let outcome = self.invoke(store, &args).await;

            // Deallocation runs guest code, which needs fuel even if the
            // entry point burned through all of it.
            if let Err(e) = store.set_fuel(self.fuel_limit) {
                warn!(error = %e, "failed to refill fuel");
            }
            let cleanup = self.release_all(store).await;
            store.data_mut().end_call();

            match (outcome, cleanup) {
                (Err(e), _) => {
                    debug!(error = %e, "capture failed");
                    Err(e)
                }
                (Ok(_), Err(e)) => Err(e),
                (Ok(text), Ok(())) => Ok(text),
            }
        }
        .instrument(span)
        .await
    }

    async fn invoke(
        &self,
        store: &mut Store<HostState>,
        args: &CaptureArgs<'_>,
    ) -> Result<String, BridgeError> {
        store
            .set_fuel(self.fuel_limit)
            .map_err(|e| BridgeError::CallFailed(format!("fuel: {}", e)))?;

        let (ev_ptr, ev_len) = self.marshal(store, args.event_name).await?;
        let (id_ptr, id_len) = self.marshal(store, args.distinct_id).await?;
        let (key_ptr, key_len) = self.marshal(store, args.api_key).await?;
        let (props_ptr, props_len) = self.marshal(store, &args.properties).await?;

        let returned = match &self.entry {
            EntryPoint::WithoutHost(func) => {
                func.call_async(
                    &mut *store,
                    (ev_ptr, ev_len, id_ptr, id_len, key_ptr, key_len, props_ptr, props_len),
                )
                .await
            }
            EntryPoint::WithHost(func) => {
                let (host_ptr, host_len) = self.marshal(store, args.target_host).await?;
                func.call_async(
                    &mut *store,
                    (
                        ev_ptr, ev_len, id_ptr, id_len, key_ptr, key_len, props_ptr, props_len,
                        host_ptr, host_len,
                    ),
                )
                .await
            }
        };
        let result_ptr = returned.map_err(|e| {
            store
                .data_mut()
                .take_call_failure()
                .unwrap_or_else(|| BridgeError::from_trap(e))
        })?;

        let exchange = &store.data().call()?.exchange;
        let response_len = exchange.response_len().ok_or_else(|| {
            BridgeError::CallFailed("guest returned without a recorded response".into())
        })?;
        debug!(result_ptr, response_len, exchanges = exchange.exchanges(), "entry point returned");

        self.take_result(store, result_ptr, response_len)
    }

    /// Read the guest's result and take ownership of its buffer.
    fn take_result(
        &self,
        store: &mut Store<HostState>,
        result_ptr: i32,
        response_len: usize,
    ) -> Result<String, BridgeError> {
        if result_ptr < 0 || (result_ptr == 0 && response_len > 0) {
            return Err(BridgeError::CallFailed(format!(
                "entry point returned unusable pointer {}",
                result_ptr
            )));
        }
        let len = i32::try_from(response_len).map_err(|_| {
            BridgeError::CallFailed(format!("response length {} exceeds i32", response_len))
        })?;

        check_range(self.guest.memory.size(&*store), result_ptr, len as i64)?;

        // A pointer to one of our own response buffers is already tracked.
        let ledger = &mut store.data_mut().ledger;
        if result_ptr != 0 && !ledger.contains(result_ptr) {
            ledger.track(MarshaledBuffer::from_guest(result_ptr, response_len));
        }

        self.guest.memory.read_string(&*store, result_ptr, len)
    }

    async fn marshal(
        &self,
        store: &mut Store<HostState>,
        text: &str,
    ) -> Result<Pair, BridgeError> {
        let buffer = self.guest.allocator.write_string(&mut *store, text).await?;
        let pair = (buffer.ptr(), buffer.len_i32());
        store.data_mut().ledger.track(buffer);
        Ok(pair)
    }

    /// Clean up after a call whose future was dropped before it finished.
    async fn reclaim_abandoned(&self, store: &mut Store<HostState>) {
        let abandoned = store.data_mut().end_call().map(|call| call.call_id);
        warn!(
            call_id = ?abandoned,
            buffers = store.data().ledger.len(),
            "releasing buffers left by a cancelled call"
        );
        if let Err(e) = store.set_fuel(self.fuel_limit) {
            warn!(error = %e, "failed to refill fuel");
        }
        // Failures are already logged per buffer; the ledger is empty either way.
        let _ = self.release_all(store).await;
    }

    /// Release every buffer tracked for the current call.
    /// Keeps going past failures and reports the first one.
    async fn release_all(&self, store: &mut Store<HostState>) -> Result<(), BridgeError> {
        let buffers = store.data_mut().ledger.drain();
        let mut first_error = None;
        for buffer in buffers {
            if let Err(e) = self.guest.allocator.release(&mut *store, buffer).await {
                warn!(error = %e, "failed to release guest buffer");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn link_error(err: anyhow::Error) -> BridgeError {
    BridgeError::Link(format!("{:#}", err))
}

/// Create a Wasmtime engine for async guest execution.
fn create_engine() -> Result<Engine, BridgeError> {
    let mut wasm_config = Config::new();

    // Host functions suspend on network I/O.
    wasm_config.async_support(true);

    // Fuel metering prevents runaway guests.
    wasm_config.consume_fuel(true);

    wasm_config.wasm_threads(false);
    wasm_config.wasm_multi_memory(false);

    Engine::new(&wasm_config).map_err(link_error)
}
