// gpu/runtime.rs - `RuntimeAdapter` over real devices through wgpu.
//
// One wgpu `Device` per context. Queues created on a context share the
// device's `wgpu::Queue`, which executes submissions in order, so every
// enqueue_* call records and submits its own command buffer immediately.
//
// SYNCHRONIZATION:
// Submission is asynchronous. Each queue tracks the buffers its unfinished
// work touches and the readbacks it has scheduled. `finish` blocks with
// `device.poll(Maintain::Wait)`, after which readbacks become redeemable
// and the touched buffers are released for host access.
//
// READBACK:
// Device-only buffers cannot be mapped. `enqueue_read` copies into a
// MAP_READ staging buffer; `take_readback` maps it with the usual
// `map_async` + channel + poll dance.
//
// SHARED ALLOCATIONS:
// Need `Features::MAPPABLE_PRIMARY_BUFFERS` so a STORAGE buffer may also be
// MAP_READ | MAP_WRITE. Host reads and writes map the buffer directly.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};
use wgpu::util::DeviceExt;

use super::device::{
    capability_names, device_kind, effective_profile, enumerate_ranked, limits_for_profile,
    wanted_features, DeviceProfile, WorkgroupSize,
};
use crate::capability::DeviceCapabilitySet;
use crate::error::RuntimeError;
use crate::runtime::{
    wgsl, BufferId, BuildOutput, ContextId, DeviceId, DeviceInfo, KernelArg, NdRange, Placement,
    ProgramId, QueueId, ReadbackId, Result, RuntimeAdapter,
};

/// A device opened for one context.
struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    profile: DeviceProfile,
}

struct GpuProgram {
    context: ContextId,
    module: wgpu::ShaderModule,
    entry_points: Vec<String>,
    pipelines: HashMap<String, Arc<wgpu::ComputePipeline>>,
}

struct GpuBuffer {
    context: ContextId,
    buffer: wgpu::Buffer,
    /// Requested size; the wgpu buffer is rounded up to COPY_BUFFER_ALIGNMENT.
    size: usize,
    shared: bool,
}

struct GpuQueue {
    context: ContextId,
    touched: HashSet<BufferId>,
    readbacks: Vec<ReadbackId>,
}

struct Readback {
    context: ContextId,
    buffer: BufferId,
    staging: wgpu::Buffer,
    size: usize,
    ready: bool,
}

#[derive(Default)]
struct GpuState {
    next_id: u64,
    contexts: HashMap<ContextId, Arc<GpuContext>>,
    queues: HashMap<QueueId, GpuQueue>,
    programs: HashMap<ProgramId, GpuProgram>,
    buffers: HashMap<BufferId, GpuBuffer>,
    readbacks: HashMap<ReadbackId, Readback>,
}

impl GpuState {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn context(&self, id: ContextId) -> Result<Arc<GpuContext>> {
        self.contexts
            .get(&id)
            .cloned()
            .ok_or(RuntimeError::UnknownObject { kind: "context", id: id.0 })
    }

    fn queue_mut(&mut self, id: QueueId) -> Result<&mut GpuQueue> {
        self.queues
            .get_mut(&id)
            .ok_or(RuntimeError::UnknownObject { kind: "queue", id: id.0 })
    }

    fn buffer(&self, id: BufferId) -> Result<&GpuBuffer> {
        self.buffers
            .get(&id)
            .ok_or(RuntimeError::UnknownObject { kind: "buffer", id: id.0 })
    }

    fn has_pending(&self, id: BufferId) -> bool {
        self.queues.values().any(|q| q.touched.contains(&id))
    }
}

/// Real-device implementation of [`RuntimeAdapter`].
///
/// # Field drop order
/// `_instance` is declared last so the `wgpu::Instance` outlives every
/// device created from it. dzn (the D3D12-to-Vulkan layer on WSL2) crashes
/// when the instance goes away while device objects still reference it.
pub struct WgpuRuntime {
    state: Mutex<GpuState>,
    adapters: Vec<wgpu::Adapter>,
    profile: DeviceProfile,
    _instance: wgpu::Instance,
}

impl WgpuRuntime {
    pub fn new() -> Self {
        Self::with_profile(DeviceProfile::Native)
    }

    /// Enumerate adapters on every primary backend.
    ///
    /// Finding no adapter is not an error here: `enumerate_devices` then
    /// returns an empty list and the capability gate turns that into a skip.
    pub fn with_profile(profile: DeviceProfile) -> Self {
        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION
                | wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        } else {
            wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        };
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags,
            ..Default::default()
        });
        let adapters = enumerate_ranked(&instance, wgpu::Backends::PRIMARY);
        if adapters.is_empty() {
            warn!("no wgpu adapter found");
        }
        WgpuRuntime {
            state: Mutex::new(GpuState::default()),
            adapters,
            profile,
            _instance: instance,
        }
    }

    fn adapter(&self, device: DeviceId) -> Result<&wgpu::Adapter> {
        self.adapters
            .get(device.0 as usize)
            .ok_or_else(|| RuntimeError::NoDevice(format!("device {device} does not exist")))
    }

    fn pipeline(
        state: &mut GpuState,
        ctx: &GpuContext,
        program: ProgramId,
        entry_point: &str,
    ) -> Result<Arc<wgpu::ComputePipeline>> {
        let prog = state
            .programs
            .get_mut(&program)
            .ok_or(RuntimeError::UnknownObject { kind: "program", id: program.0 })?;
        if !prog.entry_points.iter().any(|e| e == entry_point) {
            return Err(RuntimeError::KernelNotFound(entry_point.to_string()));
        }
        if let Some(p) = prog.pipelines.get(entry_point) {
            return Ok(Arc::clone(p));
        }

        // Auto layout: wgpu derives group 0 from the shader's bindings.
        let pipeline = ctx.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(entry_point),
            layout: None,
            module: &prog.module,
            entry_point,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        let pipeline = Arc::new(pipeline);
        prog.pipelines.insert(entry_point.to_string(), Arc::clone(&pipeline));
        debug!(entry_point, program = %program, "compute pipeline created");
        Ok(pipeline)
    }

    fn map_blocking(device: &wgpu::Device, slice: wgpu::BufferSlice<'_>, mode: wgpu::MapMode)
        -> Result<()>
    {
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(mode, move |result| {
            let _ = sender.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| RuntimeError::Map("map callback never fired".into()))?
            .map_err(|e| RuntimeError::Map(e.to_string()))
    }
}

impl Default for WgpuRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Round up to wgpu's copy alignment; zero-sized buffers cannot be bound.
fn aligned_size(size: usize) -> u64 {
    let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
    (size.max(1).div_ceil(align) * align) as u64
}

impl RuntimeAdapter for WgpuRuntime {
    fn backend_name(&self) -> &'static str {
        "wgpu"
    }

    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self
            .adapters
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let info = a.get_info();
                DeviceInfo {
                    id: DeviceId(i as u64),
                    name: info.name,
                    vendor: info.vendor,
                    kind: device_kind(info.device_type),
                    backend: format!("{:?}", info.backend),
                }
            })
            .collect())
    }

    fn query_capabilities(&self, device: DeviceId) -> Result<DeviceCapabilitySet> {
        let adapter = self.adapter(device)?;
        let names = capability_names(adapter.features(), adapter.get_info().device_type);
        Ok(names.into_iter().collect())
    }

    fn create_context(&self, device: DeviceId) -> Result<ContextId> {
        let adapter = self.adapter(device)?;
        let info = adapter.get_info();
        let profile = effective_profile(self.profile, &info.name);

        let (device_handle, queue): (wgpu::Device, wgpu::Queue) =
            pollster::block_on(adapter.request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("compute-samples"),
                    required_features: adapter.features() & wanted_features(),
                    required_limits: limits_for_profile(profile),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            ))
            .map_err(|e| RuntimeError::DeviceRequest(e.to_string()))?;

        info!(
            adapter = %info.name,
            %profile,
            workgroup = %WorkgroupSize::for_profile(profile),
            "device opened"
        );

        let mut state = self.state.lock();
        let id = ContextId(state.next());
        state.contexts.insert(
            id,
            Arc::new(GpuContext { device: device_handle, queue, profile }),
        );
        Ok(id)
    }

    fn create_queue(&self, context: ContextId) -> Result<QueueId> {
        let mut state = self.state.lock();
        state.context(context)?;
        let id = QueueId(state.next());
        state.queues.insert(id, GpuQueue { context, touched: HashSet::new(), readbacks: Vec::new() });
        Ok(id)
    }

    fn compile_program(&self, context: ContextId, source: &str, options: &str)
        -> Result<BuildOutput>
    {
        let ctx = self.state.lock().context(context)?;

        let checked = match wgsl::check(source, options) {
            Ok(c) => c,
            Err(log) => return Ok(BuildOutput::failed(log)),
        };
        let mut log = vec![checked.log];

        ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: None,
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(checked.source)),
        });
        let info = pollster::block_on(module.get_compilation_info());
        let scope_error = pollster::block_on(ctx.device.pop_error_scope());

        let mut success = scope_error.is_none();
        for msg in &info.messages {
            let kind = match msg.message_type {
                wgpu::CompilationMessageType::Error => {
                    success = false;
                    "error"
                }
                wgpu::CompilationMessageType::Warning => "warning",
                wgpu::CompilationMessageType::Info => "info",
            };
            match &msg.location {
                Some(loc) => log.push(format!(
                    "{kind}: {}:{}: {}",
                    loc.line_number, loc.line_position, msg.message
                )),
                None => log.push(format!("{kind}: {}", msg.message)),
            }
        }
        if let Some(err) = scope_error {
            log.push(format!("error: {err}"));
        }
        let log = log.join("\n");

        if !success {
            return Ok(BuildOutput::failed(log));
        }

        let mut state = self.state.lock();
        let id = ProgramId(state.next());
        state.programs.insert(
            id,
            GpuProgram {
                context,
                module,
                entry_points: checked.entry_points,
                pipelines: HashMap::new(),
            },
        );
        Ok(BuildOutput { program: Some(id), log, success: true })
    }

    fn allocate_buffer(&self, context: ContextId, size: usize) -> Result<BufferId> {
        let mut state = self.state.lock();
        let ctx = state.context(context)?;
        let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("explicit"),
            size: aligned_size(size),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let id = BufferId(state.next());
        state.buffers.insert(id, GpuBuffer { context, buffer, size, shared: false });
        Ok(id)
    }

    fn allocate_shared(&self, context: ContextId, size: usize, placement: Placement)
        -> Result<BufferId>
    {
        let mut state = self.state.lock();
        let ctx = state.context(context)?;
        if !ctx.device.features().contains(wgpu::Features::MAPPABLE_PRIMARY_BUFFERS) {
            return Err(RuntimeError::Unsupported("shared allocation".into()));
        }
        // wgpu exposes no placement control; the hint is only logged.
        trace!(size, %placement, "shared allocation");
        let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("shared"),
            size: aligned_size(size),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::MAP_READ
                | wgpu::BufferUsages::MAP_WRITE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let id = BufferId(state.next());
        state.buffers.insert(id, GpuBuffer { context, buffer, size, shared: true });
        Ok(id)
    }

    fn enqueue_write(&self, queue: QueueId, buffer: BufferId, offset: usize, data: &[u8])
        -> Result<()>
    {
        let mut state = self.state.lock();
        let buf = state.buffer(buffer)?;
        if offset + data.len() > buf.size {
            return Err(RuntimeError::OutOfBounds { offset, len: data.len(), size: buf.size });
        }
        if offset as u64 % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(RuntimeError::Unsupported(format!("write at unaligned offset {offset}")));
        }
        let ctx = state.context(buf.context)?;

        // write_buffer needs a multiple of 4 bytes; the allocation was rounded
        // up, so padding the tail stays inside the buffer.
        let padded = aligned_size(data.len()) as usize;
        if padded == data.len() {
            ctx.queue.write_buffer(&buf.buffer, offset as u64, data);
        } else {
            let mut bytes = data.to_vec();
            bytes.resize(padded, 0);
            ctx.queue.write_buffer(&buf.buffer, offset as u64, &bytes);
        }
        ctx.queue.submit(std::iter::empty());

        state.queue_mut(queue)?.touched.insert(buffer);
        Ok(())
    }

    fn enqueue_read(&self, queue: QueueId, buffer: BufferId) -> Result<ReadbackId> {
        let mut state = self.state.lock();
        let buf = state.buffer(buffer)?;
        let context = buf.context;
        let size = buf.size;
        let ctx = state.context(context)?;

        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: aligned_size(size),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("readback") });
        encoder.copy_buffer_to_buffer(&buf.buffer, 0, &staging, 0, aligned_size(size));
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let id = ReadbackId(state.next());
        let q = state.queue_mut(queue)?;
        q.touched.insert(buffer);
        q.readbacks.push(id);
        state.readbacks.insert(id, Readback { context, buffer, staging, size, ready: false });
        Ok(id)
    }

    fn take_readback(&self, readback: ReadbackId) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        let rb = state
            .readbacks
            .get(&readback)
            .ok_or(RuntimeError::UnknownObject { kind: "readback", id: readback.0 })?;
        if !rb.ready {
            return Err(RuntimeError::NotSynchronized(rb.buffer.0));
        }
        let ctx = state.context(rb.context)?;
        let rb = state
            .readbacks
            .remove(&readback)
            .ok_or(RuntimeError::UnknownObject { kind: "readback", id: readback.0 })?;

        let slice = rb.staging.slice(..);
        Self::map_blocking(&ctx.device, slice, wgpu::MapMode::Read)?;
        let mapped = slice.get_mapped_range();
        let out = mapped[..rb.size].to_vec();
        drop(mapped);
        rb.staging.unmap();
        Ok(out)
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
        let context = state
            .programs
            .get(&program)
            .ok_or(RuntimeError::UnknownObject { kind: "program", id: program.0 })?
            .context;
        let ctx = state.context(context)?;
        for arg in args {
            if let KernelArg::Buffer(id) = arg {
                state.buffer(*id)?;
            }
        }

        ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = match Self::pipeline(&mut state, &ctx, program, entry_point) {
            Ok(p) => p,
            Err(e) => {
                let _ = pollster::block_on(ctx.device.pop_error_scope());
                return Err(e);
            }
        };

        let mut uniforms = Vec::new();
        for arg in args {
            if let KernelArg::Uniform(bytes) = arg {
                uniforms.push(ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("uniform"),
                    contents: bytes,
                    usage: wgpu::BufferUsages::UNIFORM,
                }));
            }
        }

        let mut entries = Vec::with_capacity(args.len());
        let mut next_uniform = uniforms.iter();
        for (i, arg) in args.iter().enumerate() {
            let resource = match arg {
                KernelArg::Buffer(id) => state.buffers.get(id).map(|b| b.buffer.as_entire_binding()),
                KernelArg::Uniform(_) => next_uniform.next().map(|u| u.as_entire_binding()),
            };
            if let Some(resource) = resource {
                entries.push(wgpu::BindGroupEntry { binding: i as u32, resource });
            }
        }

        let layout = pipeline.get_bind_group_layout(0);
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(entry_point),
            layout: &layout,
            entries: &entries,
        });

        let [wx, wy, wz] = range.workgroups();
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(entry_point) });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(entry_point),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(wx, wy, wz);
        }
        ctx.queue.submit(std::iter::once(encoder.finish()));

        if let Some(err) = pollster::block_on(ctx.device.pop_error_scope()) {
            return Err(RuntimeError::KernelFailed {
                entry_point: entry_point.to_string(),
                reason: err.to_string(),
            });
        }
        trace!(entry_point, workgroups = ?[wx, wy, wz], "dispatch submitted");

        let q = state.queue_mut(queue)?;
        for arg in args {
            if let KernelArg::Buffer(id) = arg {
                q.touched.insert(*id);
            }
        }
        Ok(())
    }

    fn finish(&self, queue: QueueId) -> Result<()> {
        let mut state = self.state.lock();
        let context = state
            .queues
            .get(&queue)
            .ok_or(RuntimeError::UnknownObject { kind: "queue", id: queue.0 })?
            .context;
        let ctx = state.context(context)?;
        ctx.device.poll(wgpu::Maintain::Wait);

        let q = state.queue_mut(queue)?;
        q.touched.clear();
        let ready = std::mem::take(&mut q.readbacks);
        for id in ready {
            if let Some(rb) = state.readbacks.get_mut(&id) {
                rb.ready = true;
            }
        }
        debug!(queue = %queue, profile = %ctx.profile, "finish");
        Ok(())
    }

    fn host_write(&self, buffer: BufferId, offset: usize, data: &[u8]) -> Result<()> {
        let state = self.state.lock();
        if state.has_pending(buffer) {
            return Err(RuntimeError::NotSynchronized(buffer.0));
        }
        let buf = state.buffer(buffer)?;
        if !buf.shared {
            return Err(RuntimeError::Unsupported("host access to a device-only buffer".into()));
        }
        if offset + data.len() > buf.size {
            return Err(RuntimeError::OutOfBounds { offset, len: data.len(), size: buf.size });
        }
        let ctx = state.context(buf.context)?;
        let slice = buf.buffer.slice(..);
        Self::map_blocking(&ctx.device, slice, wgpu::MapMode::Write)?;
        slice.get_mapped_range_mut()[offset..offset + data.len()].copy_from_slice(data);
        buf.buffer.unmap();
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
        let ctx = state.context(buf.context)?;
        let slice = buf.buffer.slice(..);
        Self::map_blocking(&ctx.device, slice, wgpu::MapMode::Read)?;
        let out = slice.get_mapped_range()[..buf.size].to_vec();
        buf.buffer.unmap();
        Ok(out)
    }

    fn release_buffer(&self, buffer: BufferId) -> Result<()> {
        let mut state = self.state.lock();
        if state.has_pending(buffer) {
            return Err(RuntimeError::NotSynchronized(buffer.0));
        }
        let buf = state
            .buffers
            .remove(&buffer)
            .ok_or(RuntimeError::UnknownObject { kind: "buffer", id: buffer.0 })?;
        buf.buffer.destroy();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // GPU tests follow the subprocess pattern: the outer test spawns
    // `cargo test` on the inner one and checks for GPU_TEST_OK, so a driver
    // crash on process exit (dzn on WSL2) does not fail the suite.

    fn run_gpu_test_in_subprocess(test_name: &str) -> String {
        let output = std::process::Command::new("cargo")
            .args(["test", "--lib", "--", test_name, "--exact", "--ignored", "--nocapture"])
            .output()
            .unwrap_or_else(|e| panic!("failed to spawn subprocess for {test_name}: {e}"));
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        print!("{stdout}");
        eprint!("{stderr}");
        stdout + &stderr
    }

    const DOUBLE_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read_write> data: array<u32>;

@compute @workgroup_size({{WG_X}}, 1, 1)
fn double(@builtin(global_invocation_id) gid: vec3<u32>) {
    if gid.x >= arrayLength(&data) { return; }
    data[gid.x] = data[gid.x] * 2u;
}
"#;

    #[test]
    fn test_aligned_size() {
        assert_eq!(aligned_size(0), 4);
        assert_eq!(aligned_size(5), 8);
        assert_eq!(aligned_size(16), 16);
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_explicit_round_trip() {
        let rt = WgpuRuntime::new();
        let Some(dev) = rt.enumerate_devices().unwrap().into_iter().next() else {
            println!("SKIPPED: no adapter");
            println!("GPU_TEST_OK");
            return;
        };
        let ctx = rt.create_context(dev.id).unwrap();
        let q = rt.create_queue(ctx).unwrap();
        let out = rt.compile_program(ctx, DOUBLE_WGSL, "-D WG_X=64").unwrap();
        assert!(out.success, "{}", out.log);

        let values: Vec<u32> = (0..100).collect();
        let buf = rt.allocate_buffer(ctx, 400).unwrap();
        rt.enqueue_write(q, buf, 0, bytemuck::cast_slice(&values)).unwrap();
        rt.enqueue_dispatch(q, out.program.unwrap(), "double", &[KernelArg::Buffer(buf)],
            NdRange::d1(100, 64)).unwrap();
        let rb = rt.enqueue_read(q, buf).unwrap();
        assert!(rt.take_readback(rb).is_err());
        rt.finish(q).unwrap();
        let got: Vec<u32> = bytemuck::pod_collect_to_vec(&rt.take_readback(rb).unwrap());
        let want: Vec<u32> = values.iter().map(|v| v * 2).collect();
        assert_eq!(got, want);
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_syntax_error_is_a_failed_build() {
        let rt = WgpuRuntime::new();
        let Some(dev) = rt.enumerate_devices().unwrap().into_iter().next() else {
            println!("SKIPPED: no adapter");
            println!("GPU_TEST_OK");
            return;
        };
        let ctx = rt.create_context(dev.id).unwrap();
        let out = rt.compile_program(ctx, "fn broken( {", "").unwrap();
        assert!(!out.success);
        assert!(out.log.contains("error"), "{}", out.log);
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "requires a real GPU"]
    fn test_explicit_round_trip() {
        let out = run_gpu_test_in_subprocess("gpu::runtime::tests::inner_explicit_round_trip");
        assert!(out.contains("GPU_TEST_OK"), "inner test did not print GPU_TEST_OK:\n{out}");
    }

    #[test]
    #[ignore = "requires a real GPU"]
    fn test_syntax_error_is_a_failed_build() {
        let out = run_gpu_test_in_subprocess("gpu::runtime::tests::inner_syntax_error_is_a_failed_build");
        assert!(out.contains("GPU_TEST_OK"), "inner test did not print GPU_TEST_OK:\n{out}");
    }
}
