//! Guest buffer allocation and ownership tracking.
//!
//! `BufferAllocator` proxies the guest's exported `allocate`/`deallocate`.
//! Every region it hands out is a `MarshaledBuffer`: a handle that cannot be
//! cloned or copied, and that `release` consumes. A buffer therefore reaches
//! the guest deallocator at most once, and the per-call `BufferLedger`
//! guarantees it reaches it at least once.

use wasmtime::{AsContextMut, TypedFunc};

use crate::error::BridgeError;
use crate::host_impl::HostState;
use crate::memory::MemoryView;

/// Which side created a buffer. The host releases both kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferOwner {
    /// Allocated by the host through `allocate` (arguments, I/O responses).
    Host,
    /// Returned by the guest as a call result.
    Guest,
}

/// A tracked `(pointer, length, owner)` region in guest memory.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a marshaled buffer must be tracked or released"]
pub struct MarshaledBuffer {
    ptr: i32,
    len: usize,
    owner: BufferOwner,
}

impl MarshaledBuffer {
    /// Take ownership of a buffer the guest returned.
    pub fn from_guest(ptr: i32, len: usize) -> Self {
        Self {
            ptr,
            len,
            owner: BufferOwner::Guest,
        }
    }

    pub fn ptr(&self) -> i32 {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn owner(&self) -> BufferOwner {
        self.owner
    }

    /// Length as the guest ABI sees it. Allocation already proved it fits.
    pub fn len_i32(&self) -> i32 {
        self.len as i32
    }
}

/// Host-side allocation counters, exposed for leak checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationStats {
    /// Successful `allocate` calls made by the host.
    pub host_allocations: u64,
    /// `deallocate` calls made for host-allocated buffers.
    pub host_releases: u64,
    /// `deallocate` calls made for guest-returned result buffers.
    pub guest_releases: u64,
}

impl AllocationStats {
    /// Host allocations not yet released.
    pub fn outstanding(&self) -> u64 {
        self.host_allocations.saturating_sub(self.host_releases)
    }
}

/// Buffers owned by the host for the duration of one call.
#[derive(Debug, Default)]
pub struct BufferLedger {
    buffers: Vec<MarshaledBuffer>,
}

impl BufferLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a buffer that must be released when the call ends.
    pub fn track(&mut self, buffer: MarshaledBuffer) {
        self.buffers.push(buffer);
    }

    /// Whether a tracked buffer starts at `ptr`.
    pub fn contains(&self, ptr: i32) -> bool {
        self.buffers.iter().any(|b| b.ptr == ptr)
    }

    /// Length of the tracked buffer starting at `ptr`.
    pub fn len_of(&self, ptr: i32) -> Option<usize> {
        self.buffers.iter().find(|b| b.ptr == ptr).map(|b| b.len)
    }

    /// Remove every tracked buffer, in allocation order.
    pub fn drain(&mut self) -> Vec<MarshaledBuffer> {
        std::mem::take(&mut self.buffers)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

/// Proxy for the guest's allocator exports.
#[derive(Clone)]
pub struct BufferAllocator {
    allocate: TypedFunc<i32, i32>,
    deallocate: TypedFunc<(i32, i32), ()>,
    memory: MemoryView,
}

impl BufferAllocator {
    pub fn new(
        allocate: TypedFunc<i32, i32>,
        deallocate: TypedFunc<(i32, i32), ()>,
        memory: MemoryView,
    ) -> Self {
        Self {
            allocate,
            deallocate,
            memory,
        }
    }

    /// Ask the guest for `size` bytes.
    pub async fn allocate(
        &self,
        mut store: impl AsContextMut<Data = HostState>,
        size: usize,
    ) -> Result<MarshaledBuffer, BridgeError> {
        let failed = |reason: String| BridgeError::AllocationFailed { size, reason };

        let size_arg = i32::try_from(size)
            .map_err(|_| failed("size exceeds the 32-bit guest address space".into()))?;
        let ptr = self
            .allocate
            .call_async(&mut store, size_arg)
            .await
            .map_err(|e| match BridgeError::from_trap(e) {
                BridgeError::FuelExhausted => BridgeError::FuelExhausted,
                other => failed(other.to_string()),
            })?;

        if ptr < 0 || (ptr == 0 && size > 0) {
            return Err(failed(format!("guest returned pointer {}", ptr)));
        }

        store.as_context_mut().data_mut().stats.host_allocations += 1;
        Ok(MarshaledBuffer {
            ptr,
            len: size,
            owner: BufferOwner::Host,
        })
    }

    /// Allocate a guest buffer and copy `data` into it.
    ///
    /// If the copy fails the fresh buffer is released before returning.
    pub async fn write_bytes(
        &self,
        mut store: impl AsContextMut<Data = HostState>,
        data: &[u8],
    ) -> Result<MarshaledBuffer, BridgeError> {
        let buffer = self.allocate(&mut store, data.len()).await?;
        if let Err(err) = self.memory.write_bytes(&mut store, buffer.ptr, data) {
            if let Err(release_err) = self.release(&mut store, buffer).await {
                tracing::warn!(error = %release_err, "failed to release unwritten guest buffer");
            }
            return Err(err);
        }
        Ok(buffer)
    }

    /// Marshal a UTF-8 string into a new guest buffer.
    pub async fn write_string(
        &self,
        store: impl AsContextMut<Data = HostState>,
        text: &str,
    ) -> Result<MarshaledBuffer, BridgeError> {
        self.write_bytes(store, text.as_bytes()).await
    }

    /// Hand a buffer back to the guest deallocator.
    pub async fn release(
        &self,
        mut store: impl AsContextMut<Data = HostState>,
        buffer: MarshaledBuffer,
    ) -> Result<(), BridgeError> {
        let MarshaledBuffer { ptr, len, owner } = buffer;
        let len_arg = i32::try_from(len)
            .map_err(|_| BridgeError::CallFailed(format!("buffer length {} exceeds i32", len)))?;

        self.deallocate
            .call_async(&mut store, (ptr, len_arg))
            .await
            .map_err(BridgeError::from_trap)?;

        let mut ctx = store.as_context_mut();
        let stats = &mut ctx.data_mut().stats;
        match owner {
            BufferOwner::Host => stats.host_releases += 1,
            BufferOwner::Guest => stats.guest_releases += 1,
        }
        tracing::trace!(ptr, len, ?owner, "released guest buffer");
        Ok(())
    }
}
