// session.rs - Device acquisition and the per-run sample context.
//
// `acquire` performs the part of a run that precedes the sample body:
//
//   enumerate devices -> select (by --device hint) -> query capabilities
//   -> capability gate -> create context + queue -> memory model
//
// and yields either a ready `SampleContext` or a skip reason. Both
// `Application::run` and `test_harness::hw_test` go through it, so a sample
// and a hardware test gate on capabilities identically.

use std::sync::Arc;

use bytemuck::Pod;
use tracing::{debug, info};

use crate::capability::{self, require, Decision, DeviceCapabilitySet, Requirements};
use crate::config::HarnessConfig;
use crate::error::{Result, SampleError};
use crate::gpu::device::effective_profile;
use crate::gpu::WorkgroupSize;
use crate::memory::{memory_model, DeviceMemory, MemoryHandle, MemoryModelKind};
use crate::program_cache::{KernelSource, ProgramCache, ProgramCacheEntry};
use crate::runtime::{ContextId, DeviceInfo, KernelArg, NdRange, QueueId, RuntimeAdapter};
use crate::validation::{self, ValidationError};

/// Lifecycle phases of one run, recorded in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    DeviceAcquired,
    ProgramBuilt,
    MemoryPrepared,
    Dispatched,
    Validated,
    Skipped,
    Failed,
    Terminated,
}

/// Outcome of `acquire`.
pub enum Acquisition {
    Ready(Box<SampleContext>),
    Skip(String),
}

/// A kernel argument as written by sample code.
pub enum Arg<'a> {
    Memory(&'a MemoryHandle),
    Uniform(Vec<u8>),
}

impl Arg<'_> {
    pub fn uniform<T: Pod>(value: &T) -> Self {
        Arg::Uniform(bytemuck::bytes_of(value).to_vec())
    }
}

/// Memory model plus the capabilities it needs in addition to the sample's.
pub fn effective_requirements(needed: &Requirements, memory: MemoryModelKind) -> Requirements {
    let mut all: Vec<String> = needed.iter().map(str::to_string).collect();
    if memory == MemoryModelKind::Shared {
        all.push(capability::UNIFIED_MEMORY.to_string());
    }
    all.into_iter().collect()
}

fn select_device(devices: Vec<DeviceInfo>, hint: Option<&str>) -> Result<Option<DeviceInfo>> {
    let Some(hint) = hint else {
        return Ok(devices.into_iter().next());
    };
    let needle = hint.to_ascii_lowercase();
    let found = devices
        .into_iter()
        .find(|d| d.name.to_ascii_lowercase().contains(&needle));
    match found {
        Some(d) => Ok(Some(d)),
        None => Err(SampleError::invalid_argument(format!("no device name matches `{hint}`"))),
    }
}

/// Acquire a device for a run, or decide to skip it.
///
/// `trace` receives `DeviceAcquired` once a device has been selected.
pub fn acquire(
    runtime: Arc<dyn RuntimeAdapter>,
    config: &HarnessConfig,
    needed: &Requirements,
    memory: MemoryModelKind,
    trace: &mut Vec<RunPhase>,
) -> Result<Acquisition> {
    let needed = effective_requirements(needed, memory);

    let devices = runtime.enumerate_devices()?;
    debug!(backend = runtime.backend_name(), count = devices.len(), "devices enumerated");
    let Some(device) = select_device(devices, config.device.as_deref())? else {
        let reason = match require(None, &needed) {
            Decision::Skip(reason) => reason,
            Decision::Proceed => "no compute device available".to_string(),
        };
        return Ok(Acquisition::Skip(reason));
    };

    let capabilities = runtime.query_capabilities(device.id)?;
    info!(device = %device, capabilities = %capabilities, "device selected");
    trace.push(RunPhase::DeviceAcquired);

    if let Decision::Skip(reason) = require(Some(&capabilities), &needed) {
        return Ok(Acquisition::Skip(reason));
    }

    let context = runtime.create_context(device.id)?;
    let queue = runtime.create_queue(context)?;
    let profile = effective_profile(config.profile, &device.name);
    let memory = memory_model(memory, Arc::clone(&runtime), context, queue);

    Ok(Acquisition::Ready(Box::new(SampleContext {
        cache: ProgramCache::new(config.kernel_dir.clone()),
        runtime,
        device,
        capabilities,
        context,
        queue,
        memory,
        workgroup: WorkgroupSize::for_profile(profile),
        trace: Vec::new(),
    })))
}

/// Everything a sample body works with during one run.
pub struct SampleContext {
    runtime: Arc<dyn RuntimeAdapter>,
    device: DeviceInfo,
    capabilities: DeviceCapabilitySet,
    context: ContextId,
    queue: QueueId,
    cache: ProgramCache,
    memory: Box<dyn DeviceMemory>,
    workgroup: WorkgroupSize,
    trace: Vec<RunPhase>,
}

impl SampleContext {
    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn capabilities(&self) -> &DeviceCapabilitySet {
        &self.capabilities
    }

    /// Default 2D workgroup size for the selected device's profile.
    pub fn workgroup_size(&self) -> WorkgroupSize {
        self.workgroup
    }

    /// Phases reached by the sample body so far, each recorded once.
    pub fn phases(&self) -> &[RunPhase] {
        &self.trace
    }

    fn mark(&mut self, phase: RunPhase) {
        if !self.trace.contains(&phase) {
            self.trace.push(phase);
        }
    }

    pub fn build_program(&mut self, source: &KernelSource, options: &str)
        -> Result<Arc<ProgramCacheEntry>>
    {
        let entry = self.cache.get_or_build(self.runtime.as_ref(), self.context, source, options)?;
        self.mark(RunPhase::ProgramBuilt);
        Ok(entry)
    }

    pub fn memory(&mut self) -> &mut dyn DeviceMemory {
        self.mark(RunPhase::MemoryPrepared);
        self.memory.as_mut()
    }

    /// Enqueue one kernel launch. Memory arguments are marked in flight
    /// until the next `finish`.
    pub fn dispatch(
        &mut self,
        program: &ProgramCacheEntry,
        entry_point: &str,
        args: &[Arg<'_>],
        range: NdRange,
    ) -> Result<()> {
        let kernel_args: Vec<KernelArg> = args
            .iter()
            .map(|a| match a {
                Arg::Memory(h) => KernelArg::Buffer(h.buffer()),
                Arg::Uniform(bytes) => KernelArg::Uniform(bytes.clone()),
            })
            .collect();
        self.runtime
            .enqueue_dispatch(self.queue, program.program, entry_point, &kernel_args, range)?;
        for arg in args {
            if let Arg::Memory(h) = arg {
                self.memory.mark_in_flight(h)?;
            }
        }
        self.mark(RunPhase::Dispatched);
        Ok(())
    }

    /// Block until all enqueued work has completed.
    pub fn finish(&mut self) -> Result<()> {
        self.memory.synchronize()
    }

    pub fn validate_exact<T>(&mut self, what: &str, expected: &[T], actual: &[T]) -> Result<()>
    where
        T: PartialEq + std::fmt::Debug,
    {
        self.validated(validation::compare_exact(what, expected, actual))
    }

    fn validated(&mut self, result: std::result::Result<(), ValidationError>) -> Result<()> {
        result?;
        self.mark(RunPhase::Validated);
        Ok(())
    }

    /// Release all harness-owned memory. Called by the application after
    /// the body returns.
    pub fn teardown(&mut self) -> Result<()> {
        self.memory.release_all()
    }
}
