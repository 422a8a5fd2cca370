// memory.rs - Device memory models behind one small trait.
//
// A sample is written once against `DeviceMemory` and runs under either
// model:
//
//   ExplicitBuffers     device-only buffers. write/read are copies
//                       scheduled on the queue. read() synchronizes
//                       before returning, so its bytes are always valid.
//
//   SharedAllocations   host+device addressable allocations (unified
//                       memory). write/read are plain host touches and
//                       are refused while device work on the handle is
//                       outstanding; call synchronize() first.
//
// HANDLE LIFECYCLE:
//   allocate -> [write | dispatch (in flight) | synchronize | read]* -> release
//
// release() is idempotent. Releasing a handle that is still in flight is
// UseAfterFree. Handles adopted from elsewhere (`Ownership::External`) are
// forgotten on release but never freed.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytemuck::Pod;
use tracing::{debug, trace, warn};

use crate::error::{Result, SampleError};
use crate::runtime::{BufferId, ContextId, Placement, QueueId, RuntimeAdapter};

/// Which memory model a sample uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryModelKind {
    Explicit,
    Shared,
}

impl fmt::Display for MemoryModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryModelKind::Explicit => write!(f, "explicit"),
            MemoryModelKind::Shared => write!(f, "shared"),
        }
    }
}

/// Who frees the underlying device object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    Harness,
    External,
}

/// Opaque descriptor of one allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryHandle {
    id: u64,
    buffer: BufferId,
    size: usize,
    host_visible: bool,
    ownership: Ownership,
}

impl MemoryHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_host_visible(&self) -> bool {
        self.host_visible
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }
}

/// Uniform allocate/write/read/release over one memory model.
pub trait DeviceMemory {
    fn kind(&self) -> MemoryModelKind;

    /// `placement` is honoured by the shared model and ignored by the
    /// explicit one.
    fn allocate(&mut self, size: usize, placement: Placement) -> Result<MemoryHandle>;

    /// Track a buffer the harness did not allocate. Releasing it never
    /// frees the device object.
    fn adopt(&mut self, buffer: BufferId, size: usize) -> MemoryHandle;

    fn write(&mut self, handle: &MemoryHandle, offset: usize, data: &[u8]) -> Result<()>;

    fn read(&mut self, handle: &MemoryHandle) -> Result<Vec<u8>>;

    fn release(&mut self, handle: &MemoryHandle) -> Result<()>;

    /// Queue finish. Clears every in-flight mark.
    fn synchronize(&mut self) -> Result<()>;

    /// Record that enqueued device work references `handle`.
    fn mark_in_flight(&mut self, handle: &MemoryHandle) -> Result<()>;

    fn is_in_flight(&self, handle: &MemoryHandle) -> bool;

    /// Synchronize, then release every live harness-owned handle.
    fn release_all(&mut self) -> Result<()>;
}

impl dyn DeviceMemory + '_ {
    pub fn write_pod<T: Pod>(&mut self, handle: &MemoryHandle, values: &[T]) -> Result<()> {
        self.write(handle, 0, bytemuck::cast_slice(values))
    }

    pub fn read_pod<T: Pod>(&mut self, handle: &MemoryHandle) -> Result<Vec<T>> {
        let bytes = self.read(handle)?;
        let whole = bytes.len() - bytes.len() % std::mem::size_of::<T>();
        Ok(bytemuck::pod_collect_to_vec(&bytes[..whole]))
    }

    /// Allocate and fill in one step.
    pub fn upload<T: Pod>(&mut self, values: &[T], placement: Placement) -> Result<MemoryHandle> {
        let handle = self.allocate(std::mem::size_of_val(values), placement)?;
        self.write_pod(&handle, values)?;
        Ok(handle)
    }
}

/// Construct the memory model of `kind` on `queue`.
pub fn memory_model(
    kind: MemoryModelKind,
    runtime: Arc<dyn RuntimeAdapter>,
    context: ContextId,
    queue: QueueId,
) -> Box<dyn DeviceMemory> {
    let table = HandleTable::new(runtime, context, queue);
    match kind {
        MemoryModelKind::Explicit => Box::new(ExplicitBuffers { table }),
        MemoryModelKind::Shared => Box::new(SharedAllocations { table }),
    }
}

// ---------------------------------------------------------------------------
// Handle bookkeeping shared by both models
// ---------------------------------------------------------------------------

/// Handle ids are unique per process, not per table.
static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct Slot {
    handle: MemoryHandle,
    released: bool,
    in_flight: bool,
}

struct HandleTable {
    runtime: Arc<dyn RuntimeAdapter>,
    context: ContextId,
    queue: QueueId,
    slots: HashMap<u64, Slot>,
}

impl HandleTable {
    fn new(runtime: Arc<dyn RuntimeAdapter>, context: ContextId, queue: QueueId) -> Self {
        HandleTable { runtime, context, queue, slots: HashMap::new() }
    }

    fn insert(&mut self, buffer: BufferId, size: usize, host_visible: bool, ownership: Ownership)
        -> MemoryHandle
    {
        let id = NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed);
        let handle = MemoryHandle { id, buffer, size, host_visible, ownership };
        self.slots.insert(handle.id, Slot { handle, released: false, in_flight: false });
        handle
    }

    /// Slot for `handle`. The stored handle must match in full; a handle
    /// from another memory model is rejected.
    fn slot(&mut self, handle: &MemoryHandle) -> Result<&mut Slot> {
        match self.slots.get_mut(&handle.id) {
            Some(slot) if slot.handle == *handle => Ok(slot),
            _ => Err(SampleError::InvalidHandle {
                handle: handle.id,
                reason: "not allocated by this memory model",
            }),
        }
    }

    /// Live slot for `handle`.
    fn live(&mut self, handle: &MemoryHandle) -> Result<&mut Slot> {
        let slot = self.slot(handle)?;
        if slot.released {
            return Err(SampleError::InvalidHandle { handle: handle.id, reason: "already released" });
        }
        Ok(slot)
    }

    fn release(&mut self, handle: &MemoryHandle) -> Result<()> {
        let runtime = Arc::clone(&self.runtime);
        let slot = self.slot(handle)?;
        if slot.released {
            trace!(handle = handle.id, "double release ignored");
            return Ok(());
        }
        if slot.in_flight {
            return Err(SampleError::UseAfterFree { handle: handle.id });
        }
        if slot.handle.ownership == Ownership::Harness {
            runtime.release_buffer(slot.handle.buffer)?;
        }
        slot.released = true;
        debug!(handle = handle.id, size = slot.handle.size, "released");
        Ok(())
    }

    fn synchronize(&mut self) -> Result<()> {
        self.runtime.finish(self.queue)?;
        for slot in self.slots.values_mut() {
            slot.in_flight = false;
        }
        Ok(())
    }

    fn release_all(&mut self) -> Result<()> {
        self.synchronize()?;
        let live: Vec<MemoryHandle> = self
            .slots
            .values()
            .filter(|s| !s.released)
            .map(|s| s.handle)
            .collect();
        for handle in live {
            self.release(&handle)?;
        }
        Ok(())
    }

    fn is_in_flight(&self, handle: &MemoryHandle) -> bool {
        self.slots
            .get(&handle.id)
            .is_some_and(|s| s.handle == *handle && s.in_flight && !s.released)
    }

    fn check_range(handle: &MemoryHandle, offset: usize, len: usize) -> Result<()> {
        if offset.checked_add(len).map_or(true, |end| end > handle.size) {
            return Err(SampleError::invalid_argument(format!(
                "write of {len} bytes at offset {offset} exceeds handle {} of {} bytes",
                handle.id, handle.size
            )));
        }
        Ok(())
    }
}

impl Drop for HandleTable {
    fn drop(&mut self) {
        if self.slots.values().all(|s| s.released) {
            return;
        }
        if let Err(e) = self.release_all() {
            warn!("releasing device memory on drop failed: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Explicit buffers
// ---------------------------------------------------------------------------

pub struct ExplicitBuffers {
    table: HandleTable,
}

impl DeviceMemory for ExplicitBuffers {
    fn kind(&self) -> MemoryModelKind {
        MemoryModelKind::Explicit
    }

    fn allocate(&mut self, size: usize, _placement: Placement) -> Result<MemoryHandle> {
        if size == 0 {
            return Err(SampleError::invalid_argument("zero-sized allocation"));
        }
        let buffer = self.table.runtime.allocate_buffer(self.table.context, size)?;
        let handle = self.table.insert(buffer, size, false, Ownership::Harness);
        trace!(handle = handle.id, size, "explicit buffer allocated");
        Ok(handle)
    }

    fn adopt(&mut self, buffer: BufferId, size: usize) -> MemoryHandle {
        self.table.insert(buffer, size, false, Ownership::External)
    }

    fn write(&mut self, handle: &MemoryHandle, offset: usize, data: &[u8]) -> Result<()> {
        HandleTable::check_range(handle, offset, data.len())?;
        let queue = self.table.queue;
        let runtime = Arc::clone(&self.table.runtime);
        let slot = self.table.live(handle)?;
        runtime.enqueue_write(queue, slot.handle.buffer, offset, data)?;
        slot.in_flight = true;
        Ok(())
    }

    fn read(&mut self, handle: &MemoryHandle) -> Result<Vec<u8>> {
        let buffer = self.table.live(handle)?.handle.buffer;
        let readback = self.table.runtime.enqueue_read(self.table.queue, buffer)?;
        self.table.synchronize()?;
        let mut bytes = self.table.runtime.take_readback(readback)?;
        bytes.truncate(handle.size);
        Ok(bytes)
    }

    fn release(&mut self, handle: &MemoryHandle) -> Result<()> {
        self.table.release(handle)
    }

    fn synchronize(&mut self) -> Result<()> {
        self.table.synchronize()
    }

    fn mark_in_flight(&mut self, handle: &MemoryHandle) -> Result<()> {
        self.table.live(handle)?.in_flight = true;
        Ok(())
    }

    fn is_in_flight(&self, handle: &MemoryHandle) -> bool {
        self.table.is_in_flight(handle)
    }

    fn release_all(&mut self) -> Result<()> {
        self.table.release_all()
    }
}

// ---------------------------------------------------------------------------
// Shared allocations
// ---------------------------------------------------------------------------

pub struct SharedAllocations {
    table: HandleTable,
}

impl DeviceMemory for SharedAllocations {
    fn kind(&self) -> MemoryModelKind {
        MemoryModelKind::Shared
    }

    fn allocate(&mut self, size: usize, placement: Placement) -> Result<MemoryHandle> {
        if size == 0 {
            return Err(SampleError::invalid_argument("zero-sized allocation"));
        }
        let buffer = self.table.runtime.allocate_shared(self.table.context, size, placement)?;
        let handle = self.table.insert(buffer, size, true, Ownership::Harness);
        trace!(handle = handle.id, size, %placement, "shared allocation");
        Ok(handle)
    }

    fn adopt(&mut self, buffer: BufferId, size: usize) -> MemoryHandle {
        self.table.insert(buffer, size, true, Ownership::External)
    }

    fn write(&mut self, handle: &MemoryHandle, offset: usize, data: &[u8]) -> Result<()> {
        HandleTable::check_range(handle, offset, data.len())?;
        let runtime = Arc::clone(&self.table.runtime);
        let slot = self.table.live(handle)?;
        if slot.in_flight {
            return Err(SampleError::UnsynchronizedAccess { handle: handle.id });
        }
        runtime.host_write(slot.handle.buffer, offset, data)?;
        Ok(())
    }

    fn read(&mut self, handle: &MemoryHandle) -> Result<Vec<u8>> {
        let runtime = Arc::clone(&self.table.runtime);
        let slot = self.table.live(handle)?;
        if slot.in_flight {
            return Err(SampleError::UnsynchronizedAccess { handle: handle.id });
        }
        let mut bytes = runtime.host_read(slot.handle.buffer)?;
        bytes.truncate(handle.size);
        Ok(bytes)
    }

    fn release(&mut self, handle: &MemoryHandle) -> Result<()> {
        self.table.release(handle)
    }

    fn synchronize(&mut self) -> Result<()> {
        self.table.synchronize()
    }

    fn mark_in_flight(&mut self, handle: &MemoryHandle) -> Result<()> {
        self.table.live(handle)?.in_flight = true;
        Ok(())
    }

    fn is_in_flight(&self, handle: &MemoryHandle) -> bool {
        self.table.is_in_flight(handle)
    }

    fn release_all(&mut self) -> Result<()> {
        self.table.release_all()
    }
}
