// runtime/host.rs - Host-simulated compute device.
//
// `HostRuntime` implements `RuntimeAdapter` entirely on the CPU. It is the
// device used by the test suite and by `--backend host`, and it is strict
// about the parts of the contract a real driver lets slide:
//
//   - Programs are WGSL compiled by naga (parse + validate), so build logs
//     carry real compiler diagnostics with line/column spans.
//   - Enqueued work is recorded, not executed. Writes, dispatches and
//     readbacks run in submission order only when `finish(queue)` is
//     called, so reading before synchronizing is observable and rejected.
//   - Kernels are host closures registered per entry point. The compiled
//     WGSL decides which entry points exist; the closure is what runs.
//   - The device list and its capability set are configurable, which makes
//     this the mock device for capability-gating tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::wgsl;
use super::{
    BufferId, BuildOutput, ContextId, DeviceId, DeviceInfo, DeviceKind, KernelArg, NdRange,
    Placement, ProgramId, QueueId, ReadbackId, Result, RuntimeAdapter,
};
use crate::capability::DeviceCapabilitySet;
use crate::error::RuntimeError;

/// A host implementation of one kernel entry point.
pub type HostKernel =
    Arc<dyn Fn(&mut HostInvocation<'_>) -> std::result::Result<(), String> + Send + Sync>;

// ---------------------------------------------------------------------------
// Kernel invocation view
// ---------------------------------------------------------------------------

enum HostArg {
    Buffer { id: BufferId, data: Vec<u8> },
    Uniform(Vec<u8>),
}

/// Arguments of one dispatch as seen by a host kernel. Argument indices
/// match `@binding(i)` in the WGSL source.
pub struct HostInvocation<'a> {
    pub range: NdRange,
    args: &'a mut [HostArg],
}

impl HostInvocation<'_> {
    pub fn global(&self) -> [u32; 3] {
        self.range.global
    }

    pub fn buffer(&self, index: usize) -> std::result::Result<&[u8], String> {
        match self.args.get(index) {
            Some(HostArg::Buffer { data, .. }) => Ok(data),
            Some(HostArg::Uniform(_)) => Err(format!("argument {index} is a uniform, not a buffer")),
            None => Err(format!("argument {index} is missing")),
        }
    }

    pub fn buffer_mut(&mut self, index: usize) -> std::result::Result<&mut [u8], String> {
        match self.args.get_mut(index) {
            Some(HostArg::Buffer { data, .. }) => Ok(data),
            Some(HostArg::Uniform(_)) => Err(format!("argument {index} is a uniform, not a buffer")),
            None => Err(format!("argument {index} is missing")),
        }
    }

    /// Buffer argument reinterpreted as a vector of `T`.
    pub fn read<T: Pod>(&self, index: usize) -> std::result::Result<Vec<T>, String> {
        let bytes = self.buffer(index)?;
        if bytes.len() % std::mem::size_of::<T>() != 0 {
            return Err(format!(
                "argument {index}: {} bytes is not a multiple of {}",
                bytes.len(),
                std::mem::size_of::<T>()
            ));
        }
        Ok(bytemuck::pod_collect_to_vec(bytes))
    }

    /// Store `values` at the start of buffer argument `index`.
    pub fn write<T: Pod>(&mut self, index: usize, values: &[T]) -> std::result::Result<(), String> {
        let src: &[u8] = bytemuck::cast_slice(values);
        let dst = self.buffer_mut(index)?;
        if src.len() > dst.len() {
            return Err(format!(
                "argument {index}: writing {} bytes into a {}-byte buffer",
                src.len(),
                dst.len()
            ));
        }
        dst[..src.len()].copy_from_slice(src);
        Ok(())
    }

    pub fn uniform<T: Pod>(&self, index: usize) -> std::result::Result<T, String> {
        match self.args.get(index) {
            Some(HostArg::Uniform(bytes)) if bytes.len() >= std::mem::size_of::<T>() => {
                Ok(bytemuck::pod_read_unaligned(&bytes[..std::mem::size_of::<T>()]))
            }
            Some(HostArg::Uniform(bytes)) => Err(format!(
                "argument {index}: uniform is {} bytes, expected {}",
                bytes.len(),
                std::mem::size_of::<T>()
            )),
            Some(HostArg::Buffer { .. }) => Err(format!("argument {index} is a buffer, not a uniform")),
            None => Err(format!("argument {index} is missing")),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

struct HostDevice {
    name: String,
    capabilities: DeviceCapabilitySet,
}

struct HostProgram {
    context: ContextId,
    entry_points: Vec<String>,
}

struct HostBuffer {
    context: ContextId,
    data: Vec<u8>,
    shared: bool,
    placement: Placement,
}

enum PendingOp {
    Write { buffer: BufferId, offset: usize, data: Vec<u8> },
    Dispatch { entry_point: String, args: Vec<KernelArg>, range: NdRange },
    Read { readback: ReadbackId, buffer: BufferId },
}

impl PendingOp {
    fn touches(&self, id: BufferId) -> bool {
        match self {
            PendingOp::Write { buffer, .. } | PendingOp::Read { buffer, .. } => *buffer == id,
            PendingOp::Dispatch { args, .. } => {
                args.iter().any(|a| matches!(a, KernelArg::Buffer(b) if *b == id))
            }
        }
    }
}

struct HostQueue {
    context: ContextId,
    pending: Vec<PendingOp>,
}

struct Readback {
    buffer: BufferId,
    data: Option<Vec<u8>>,
}

#[derive(Default)]
struct HostState {
    next_id: u64,
    contexts: HashMap<ContextId, DeviceId>,
    queues: HashMap<QueueId, HostQueue>,
    programs: HashMap<ProgramId, HostProgram>,
    buffers: HashMap<BufferId, HostBuffer>,
    readbacks: HashMap<ReadbackId, Readback>,
}

impl HostState {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_context(&self, context: ContextId) -> Result<()> {
        if self.contexts.contains_key(&context) {
            Ok(())
        } else {
            Err(RuntimeError::UnknownObject { kind: "context", id: context.0 })
        }
    }

    fn buffer(&self, id: BufferId) -> Result<&HostBuffer> {
        self.buffers
            .get(&id)
            .ok_or(RuntimeError::UnknownObject { kind: "buffer", id: id.0 })
    }

    fn has_pending(&self, id: BufferId) -> bool {
        self.queues.values().any(|q| q.pending.iter().any(|op| op.touches(id)))
    }
}

// ---------------------------------------------------------------------------
// HostRuntime
// ---------------------------------------------------------------------------

/// CPU-backed implementation of [`RuntimeAdapter`].
pub struct HostRuntime {
    devices: Vec<HostDevice>,
    kernels: HashMap<String, HostKernel>,
    state: Mutex<HostState>,
    compiles: AtomicUsize,
}

impl Default for HostRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl HostRuntime {
    /// One simulated device with an empty capability set.
    pub fn new() -> Self {
        HostRuntime {
            devices: vec![HostDevice {
                name: "host-simulated device".to_string(),
                capabilities: DeviceCapabilitySet::empty(),
            }],
            kernels: HashMap::new(),
            state: Mutex::new(HostState::default()),
            compiles: AtomicUsize::new(0),
        }
    }

    /// A runtime that finds no devices at all.
    pub fn without_devices() -> Self {
        HostRuntime { devices: Vec::new(), ..Self::new() }
    }

    /// Replace the capability set of every simulated device.
    pub fn with_capabilities<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let caps: DeviceCapabilitySet = features.into_iter().collect();
        for d in &mut self.devices {
            d.capabilities = caps.clone();
        }
        self
    }

    pub fn with_kernel<F>(mut self, entry_point: &str, kernel: F) -> Self
    where
        F: Fn(&mut HostInvocation<'_>) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.register_kernel(entry_point, Arc::new(kernel));
        self
    }

    pub fn register_kernel(&mut self, entry_point: &str, kernel: HostKernel) {
        self.kernels.insert(entry_point.to_string(), kernel);
    }

    /// Number of `compile_program` calls so far.
    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    /// Number of operations waiting for `finish` on `queue`.
    pub fn pending_ops(&self, queue: QueueId) -> usize {
        self.state.lock().queues.get(&queue).map_or(0, |q| q.pending.len())
    }

    fn run_op(&self, state: &mut HostState, op: PendingOp) -> Result<()> {
        match op {
            PendingOp::Write { buffer, offset, data } => {
                let buf = state
                    .buffers
                    .get_mut(&buffer)
                    .ok_or(RuntimeError::UnknownObject { kind: "buffer", id: buffer.0 })?;
                buf.data[offset..offset + data.len()].copy_from_slice(&data);
            }
            PendingOp::Read { readback, buffer } => {
                let data = state.buffer(buffer)?.data.clone();
                if let Some(rb) = state.readbacks.get_mut(&readback) {
                    rb.data = Some(data);
                }
            }
            PendingOp::Dispatch { entry_point, args, range } => {
                self.run_kernel(state, &entry_point, args, range)?;
            }
        }
        Ok(())
    }

    fn run_kernel(
        &self,
        state: &mut HostState,
        entry_point: &str,
        args: Vec<KernelArg>,
        range: NdRange,
    ) -> Result<()> {
        let kernel = self.kernels.get(entry_point).cloned().ok_or_else(|| {
            RuntimeError::KernelFailed {
                entry_point: entry_point.to_string(),
                reason: "no host implementation registered".to_string(),
            }
        })?;

        // Move buffer contents out of the table for the duration of the call
        // so the kernel can hold several of them mutably at once.
        let mut seen = HashSet::new();
        let mut host_args = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                KernelArg::Buffer(id) => {
                    if !seen.insert(id) {
                        restore(state, host_args);
                        return Err(RuntimeError::KernelFailed {
                            entry_point: entry_point.to_string(),
                            reason: format!("buffer {id} bound to more than one argument"),
                        });
                    }
                    let data = match state.buffers.get_mut(&id) {
                        Some(b) => std::mem::take(&mut b.data),
                        None => {
                            restore(state, host_args);
                            return Err(RuntimeError::UnknownObject { kind: "buffer", id: id.0 });
                        }
                    };
                    host_args.push(HostArg::Buffer { id, data });
                }
                KernelArg::Uniform(bytes) => host_args.push(HostArg::Uniform(bytes)),
            }
        }

        trace!(entry_point, ?range, "host kernel");
        let result = {
            let mut inv = HostInvocation { range, args: &mut host_args };
            kernel(&mut inv)
        };
        restore(state, host_args);

        result.map_err(|reason| RuntimeError::KernelFailed {
            entry_point: entry_point.to_string(),
            reason,
        })
    }
}

fn restore(state: &mut HostState, args: Vec<HostArg>) {
    for arg in args {
        if let HostArg::Buffer { id, data } = arg {
            if let Some(b) = state.buffers.get_mut(&id) {
                b.data = data;
            }
        }
    }
}

impl RuntimeAdapter for HostRuntime {
    fn backend_name(&self) -> &'static str {
        "host"
    }

    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self
            .devices
            .iter()
            .enumerate()
            .map(|(i, d)| DeviceInfo {
                id: DeviceId(i as u64),
                name: d.name.clone(),
                vendor: 0,
                kind: DeviceKind::Cpu,
                backend: "Host".to_string(),
            })
            .collect())
    }

    fn query_capabilities(&self, device: DeviceId) -> Result<DeviceCapabilitySet> {
        self.devices
            .get(device.0 as usize)
            .map(|d| d.capabilities.clone())
            .ok_or_else(|| RuntimeError::NoDevice(format!("device {device} does not exist")))
    }

    fn create_context(&self, device: DeviceId) -> Result<ContextId> {
        if device.0 as usize >= self.devices.len() {
            return Err(RuntimeError::NoDevice(format!("device {device} does not exist")));
        }
        let mut state = self.state.lock();
        let id = ContextId(state.next());
        state.contexts.insert(id, device);
        debug!(context = %id, device = %device, "host context created");
        Ok(id)
    }

    fn create_queue(&self, context: ContextId) -> Result<QueueId> {
        let mut state = self.state.lock();
        state.check_context(context)?;
        let id = QueueId(state.next());
        state.queues.insert(id, HostQueue { context, pending: Vec::new() });
        Ok(id)
    }

    fn compile_program(&self, context: ContextId, source: &str, options: &str)
        -> Result<BuildOutput>
    {
        self.state.lock().check_context(context)?;
        self.compiles.fetch_add(1, Ordering::SeqCst);

        let checked = match wgsl::check(source, options) {
            Ok(c) => c,
            Err(log) => return Ok(BuildOutput::failed(log)),
        };
        let log = checked.log;
        let entry_points = checked.entry_points;

        let mut state = self.state.lock();
        let id = ProgramId(state.next());
        state.programs.insert(id, HostProgram { context, entry_points });
        Ok(BuildOutput { program: Some(id), log, success: true })
    }

    fn allocate_buffer(&self, context: ContextId, size: usize) -> Result<BufferId> {
        let mut state = self.state.lock();
        state.check_context(context)?;
        let id = BufferId(state.next());
        state.buffers.insert(
            id,
            HostBuffer { context, data: vec![0; size], shared: false, placement: Placement::Unspecified },
        );
        Ok(id)
    }

    fn allocate_shared(&self, context: ContextId, size: usize, placement: Placement)
        -> Result<BufferId>
    {
        let mut state = self.state.lock();
        state.check_context(context)?;
        let id = BufferId(state.next());
        state.buffers.insert(id, HostBuffer { context, data: vec![0; size], shared: true, placement });
        trace!(buffer = %id, size, %placement, "shared allocation");
        Ok(id)
    }

    fn enqueue_write(&self, queue: QueueId, buffer: BufferId, offset: usize, data: &[u8])
        -> Result<()>
    {
        let mut state = self.state.lock();
        let size = state.buffer(buffer)?.data.len();
        if offset + data.len() > size {
            return Err(RuntimeError::OutOfBounds { offset, len: data.len(), size });
        }
        let q = state
            .queues
            .get_mut(&queue)
            .ok_or(RuntimeError::UnknownObject { kind: "queue", id: queue.0 })?;
        q.pending.push(PendingOp::Write { buffer, offset, data: data.to_vec() });
        Ok(())
    }

    fn enqueue_read(&self, queue: QueueId, buffer: BufferId) -> Result<ReadbackId> {
        let mut state = self.state.lock();
        state.buffer(buffer)?;
        if !state.queues.contains_key(&queue) {
            return Err(RuntimeError::UnknownObject { kind: "queue", id: queue.0 });
        }
        let readback = ReadbackId(state.next());
        state.readbacks.insert(readback, Readback { buffer, data: None });
        if let Some(q) = state.queues.get_mut(&queue) {
            q.pending.push(PendingOp::Read { readback, buffer });
        }
        Ok(readback)
    }

    fn take_readback(&self, readback: ReadbackId) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        let rb = state
            .readbacks
            .get(&readback)
            .ok_or(RuntimeError::UnknownObject { kind: "readback", id: readback.0 })?;
        if rb.data.is_none() {
            return Err(RuntimeError::NotSynchronized(rb.buffer.0));
        }
        let rb = state
            .readbacks
            .remove(&readback)
            .ok_or(RuntimeError::UnknownObject { kind: "readback", id: readback.0 })?;
        Ok(rb.data.unwrap_or_default())
    }

    fn enqueue_dispatch(
        &self,
        queue: QueueId,
        program: ProgramId,
        entry_point: &str,
        args: &[KernelArg],
        range: NdRange,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let prog = state
            .programs
            .get(&program)
            .ok_or(RuntimeError::UnknownObject { kind: "program", id: program.0 })?;
        if !prog.entry_points.iter().any(|e| e == entry_point) {
            return Err(RuntimeError::KernelNotFound(entry_point.to_string()));
        }
        if !self.kernels.contains_key(entry_point) {
            return Err(RuntimeError::KernelFailed {
                entry_point: entry_point.to_string(),
                reason: "no host implementation registered".to_string(),
            });
        }
        let program_context = prog.context;
        for arg in args {
            if let KernelArg::Buffer(id) = arg {
                if state.buffer(*id)?.context != program_context {
                    return Err(RuntimeError::KernelFailed {
                        entry_point: entry_point.to_string(),
                        reason: format!("buffer {id} belongs to a different context"),
                    });
                }
            }
        }
        let q = state
            .queues
            .get_mut(&queue)
            .ok_or(RuntimeError::UnknownObject { kind: "queue", id: queue.0 })?;
        if q.context != program_context {
            return Err(RuntimeError::KernelFailed {
                entry_point: entry_point.to_string(),
                reason: "program and queue belong to different contexts".to_string(),
            });
        }
        q.pending.push(PendingOp::Dispatch {
            entry_point: entry_point.to_string(),
            args: args.to_vec(),
            range,
        });
        Ok(())
    }

    fn finish(&self, queue: QueueId) -> Result<()> {
        let mut state = self.state.lock();
        let ops = match state.queues.get_mut(&queue) {
            Some(q) => std::mem::take(&mut q.pending),
            None => return Err(RuntimeError::UnknownObject { kind: "queue", id: queue.0 }),
        };
        debug!(queue = %queue, ops = ops.len(), "finish");
        for op in ops {
            self.run_op(&mut state, op)?;
        }
        Ok(())
    }

    fn host_write(&self, buffer: BufferId, offset: usize, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        if state.has_pending(buffer) {
            return Err(RuntimeError::NotSynchronized(buffer.0));
        }
        let buf = state
            .buffers
            .get_mut(&buffer)
            .ok_or(RuntimeError::UnknownObject { kind: "buffer", id: buffer.0 })?;
        if !buf.shared {
            return Err(RuntimeError::Unsupported("host access to a device-only buffer".into()));
        }
        if offset + data.len() > buf.data.len() {
            return Err(RuntimeError::OutOfBounds { offset, len: data.len(), size: buf.data.len() });
        }
        buf.data[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn host_read(&self, buffer: BufferId) -> Result<Vec<u8>> {
        let state = self.state.lock();
        if state.has_pending(buffer) {
            return Err(RuntimeError::NotSynchronized(buffer.0));
        }
        let buf = state.buffer(buffer)?;
        if !buf.shared {
            return Err(RuntimeError::Unsupported("host access to a device-only buffer".into()));
        }
        trace!(buffer = %buffer, placement = %buf.placement, "host read");
        Ok(buf.data.clone())
    }

    fn release_buffer(&self, buffer: BufferId) -> Result<()> {
        let mut state = self.state.lock();
        if state.has_pending(buffer) {
            return Err(RuntimeError::NotSynchronized(buffer.0));
        }
        state
            .buffers
            .remove(&buffer)
            .map(|_| ())
            .ok_or(RuntimeError::UnknownObject { kind: "buffer", id: buffer.0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COPY_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read> src: array<u32>;
@group(0) @binding(1) var<storage, read_write> dst: array<u32>;

@compute @workgroup_size({{WG}}, 1, 1)
fn copy(@builtin(global_invocation_id) gid: vec3<u32>) {
    if gid.x >= arrayLength(&src) { return; }
    dst[gid.x] = src[gid.x];
}
"#;

    fn copy_runtime() -> HostRuntime {
        HostRuntime::new().with_kernel("copy", |inv| {
            let src: Vec<u32> = inv.read(0)?;
            inv.write(1, &src)
        })
    }

    fn context_and_queue(rt: &HostRuntime) -> (ContextId, QueueId) {
        let ctx = rt.create_context(DeviceId(0)).unwrap();
        let q = rt.create_queue(ctx).unwrap();
        (ctx, q)
    }

    #[test]
    fn compiles_valid_wgsl() {
        let rt = copy_runtime();
        let (ctx, _) = context_and_queue(&rt);
        let out = rt.compile_program(ctx, COPY_WGSL, "-D WG=64").unwrap();
        assert!(out.success, "{}", out.log);
        assert!(out.program.is_some());
        assert!(out.log.contains("copy"));
        assert_eq!(rt.compile_count(), 1);
    }

    #[test]
    fn syntax_error_yields_diagnostic_log() {
        let rt = copy_runtime();
        let (ctx, _) = context_and_queue(&rt);
        let out = rt.compile_program(ctx, "fn broken( {", "").unwrap();
        assert!(!out.success);
        assert!(out.program.is_none());
        assert!(out.log.contains("error"), "log: {}", out.log);
    }

    #[test]
    fn missing_define_fails_the_build() {
        let rt = copy_runtime();
        let (ctx, _) = context_and_queue(&rt);
        let out = rt.compile_program(ctx, COPY_WGSL, "").unwrap();
        assert!(!out.success);
        assert!(out.log.contains("{{WG}}"), "log: {}", out.log);
    }

    #[test]
    fn work_runs_only_at_finish() {
        let rt = copy_runtime();
        let (ctx, q) = context_and_queue(&rt);
        let program = rt.compile_program(ctx, COPY_WGSL, "-D WG=64").unwrap().program.unwrap();

        let src = rt.allocate_buffer(ctx, 16).unwrap();
        let dst = rt.allocate_buffer(ctx, 16).unwrap();
        let values = [1u32, 2, 3, 4];
        rt.enqueue_write(q, src, 0, bytemuck::cast_slice(&values)).unwrap();
        rt.enqueue_dispatch(q, program, "copy", &[KernelArg::Buffer(src), KernelArg::Buffer(dst)],
            NdRange::d1(4, 64)).unwrap();
        let rb = rt.enqueue_read(q, dst).unwrap();
        assert_eq!(rt.pending_ops(q), 3);

        assert!(matches!(rt.take_readback(rb), Err(RuntimeError::NotSynchronized(_))));

        rt.finish(q).unwrap();
        assert_eq!(rt.pending_ops(q), 0);
        let bytes = rt.take_readback(rb).unwrap();
        let out: Vec<u32> = bytemuck::pod_collect_to_vec(&bytes);
        assert_eq!(out, values);
    }

    #[test]
    fn unknown_entry_point_is_rejected_at_enqueue() {
        let rt = copy_runtime();
        let (ctx, q) = context_and_queue(&rt);
        let program = rt.compile_program(ctx, COPY_WGSL, "-D WG=64").unwrap().program.unwrap();
        let err = rt.enqueue_dispatch(q, program, "nope", &[], NdRange::d1(1, 1)).unwrap_err();
        assert!(matches!(err, RuntimeError::KernelNotFound(_)));
    }

    #[test]
    fn host_access_requires_shared_allocation() {
        let rt = HostRuntime::new();
        let (ctx, _) = context_and_queue(&rt);
        let device_only = rt.allocate_buffer(ctx, 8).unwrap();
        assert!(matches!(rt.host_read(device_only), Err(RuntimeError::Unsupported(_))));

        let shared = rt.allocate_shared(ctx, 8, Placement::HostPreferred).unwrap();
        rt.host_write(shared, 4, &[9, 9, 9, 9]).unwrap();
        assert_eq!(rt.host_read(shared).unwrap(), vec![0, 0, 0, 0, 9, 9, 9, 9]);
    }

    #[test]
    fn host_access_with_pending_work_is_rejected() {
        let rt = copy_runtime();
        let (ctx, q) = context_and_queue(&rt);
        let shared = rt.allocate_shared(ctx, 8, Placement::Unspecified).unwrap();
        rt.enqueue_write(q, shared, 0, &[1; 8]).unwrap();
        assert!(matches!(rt.host_read(shared), Err(RuntimeError::NotSynchronized(_))));
        assert!(matches!(rt.release_buffer(shared), Err(RuntimeError::NotSynchronized(_))));
        rt.finish(q).unwrap();
        assert_eq!(rt.host_read(shared).unwrap(), vec![1; 8]);
        rt.release_buffer(shared).unwrap();
    }

    #[test]
    fn same_buffer_bound_twice_fails_at_finish() {
        let rt = copy_runtime();
        let (ctx, q) = context_and_queue(&rt);
        let program = rt.compile_program(ctx, COPY_WGSL, "-D WG=64").unwrap().program.unwrap();
        let buf = rt.allocate_buffer(ctx, 16).unwrap();
        rt.enqueue_dispatch(q, program, "copy", &[KernelArg::Buffer(buf), KernelArg::Buffer(buf)],
            NdRange::d1(4, 64)).unwrap();
        assert!(matches!(rt.finish(q), Err(RuntimeError::KernelFailed { .. })));
        // The buffer contents survive the failed dispatch.
        let rb = rt.enqueue_read(q, buf).unwrap();
        rt.finish(q).unwrap();
        assert_eq!(rt.take_readback(rb).unwrap().len(), 16);
    }

    #[test]
    fn no_devices_means_no_context() {
        let rt = HostRuntime::without_devices();
        assert!(rt.enumerate_devices().unwrap().is_empty());
        assert!(matches!(rt.create_context(DeviceId(0)), Err(RuntimeError::NoDevice(_))));
    }

    #[test]
    fn capabilities_are_configurable() {
        let rt = HostRuntime::new().with_capabilities(["unified_memory"]);
        let caps = rt.query_capabilities(DeviceId(0)).unwrap();
        assert!(caps.contains("unified_memory"));
        assert!(!caps.contains("motion_estimation"));
    }
}
