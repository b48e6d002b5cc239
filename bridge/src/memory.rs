//! Bounds-checked access to guest linear memory.
//!
//! Every read and write validates `[ptr, ptr+len)` against the memory size
//! at the moment of the access. Memory can grow (and move) whenever the
//! guest runs, so sizes are never cached. Out-of-range access returns
//! `OutOfBoundsAccess` and touches nothing.

use wasmtime::{AsContext, AsContextMut, Memory};

use crate::error::BridgeError;
use crate::host_impl::HostState;

/// Validate that `[ptr, ptr+len)` lies within a memory of `mem_size` bytes.
/// Returns the range as `usize` bounds.
pub fn check_range(mem_size: usize, ptr: i32, len: i64) -> Result<(usize, usize), BridgeError> {
    let oob = || BridgeError::out_of_bounds(ptr as i64, len, mem_size);
    if ptr < 0 || len < 0 {
        return Err(oob());
    }
    let start = ptr as usize;
    let end = start
        .checked_add(usize::try_from(len).map_err(|_| oob())?)
        .ok_or_else(oob)?;
    if end > mem_size {
        return Err(oob());
    }
    Ok((start, end))
}

/// Read `len` bytes from guest memory at `ptr`.
pub fn read_bytes(mem: &[u8], ptr: i32, len: i32) -> Result<Vec<u8>, BridgeError> {
    let (start, end) = check_range(mem.len(), ptr, len as i64)?;
    Ok(mem[start..end].to_vec())
}

/// Read `len` bytes at `ptr` and decode them as UTF-8.
pub fn read_string(mem: &[u8], ptr: i32, len: i32) -> Result<String, BridgeError> {
    let (start, end) = check_range(mem.len(), ptr, len as i64)?;
    Ok(std::str::from_utf8(&mem[start..end])?.to_owned())
}

/// Write `data` to guest memory at `ptr`.
pub fn write_bytes(mem: &mut [u8], ptr: i32, data: &[u8]) -> Result<(), BridgeError> {
    let (start, end) = check_range(mem.len(), ptr, data.len() as i64)?;
    mem[start..end].copy_from_slice(data);
    Ok(())
}

/// Handle on the guest's exported memory.
///
/// Holds no pointer into the buffer itself, only the wasmtime handle, so
/// every access re-resolves the current data slice.
#[derive(Debug, Clone, Copy)]
pub struct MemoryView {
    memory: Memory,
}

impl MemoryView {
    pub fn new(memory: Memory) -> Self {
        Self { memory }
    }

    /// Current size of linear memory in bytes.
    pub fn size(&self, store: impl AsContext<Data = HostState>) -> usize {
        self.memory.data_size(&store)
    }

    pub fn read_bytes(
        &self,
        store: impl AsContext<Data = HostState>,
        ptr: i32,
        len: i32,
    ) -> Result<Vec<u8>, BridgeError> {
        read_bytes(self.memory.data(&store), ptr, len)
    }

    pub fn read_string(
        &self,
        store: impl AsContext<Data = HostState>,
        ptr: i32,
        len: i32,
    ) -> Result<String, BridgeError> {
        read_string(self.memory.data(&store), ptr, len)
    }

    pub fn write_bytes(
        &self,
        mut store: impl AsContextMut<Data = HostState>,
        ptr: i32,
        data: &[u8],
    ) -> Result<(), BridgeError> {
        write_bytes(self.memory.data_mut(&mut store), ptr, data)
    }

    pub fn write_string(
        &self,
        store: impl AsContextMut<Data = HostState>,
        ptr: i32,
        text: &str,
    ) -> Result<(), BridgeError> {
        self.write_bytes(store, ptr, text.as_bytes())
    }
}
