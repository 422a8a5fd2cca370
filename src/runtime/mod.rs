// runtime/mod.rs - The device runtime adapter seam.
//
// The harness never touches a driver directly. Everything it needs from a
// compute runtime goes through `RuntimeAdapter`: device enumeration,
// context/queue creation, program compilation, memory and dispatch.
//
// Device objects are referred to by small opaque ids rather than by
// associated types. That keeps the trait object safe, so an `Application`
// holds an `Arc<dyn RuntimeAdapter>` and the same sample code runs on the
// wgpu backend (`crate::gpu`) and on the host-simulated device
// (`runtime::host`).
//
// ASYNC MODEL:
//   enqueue_write / enqueue_read / enqueue_dispatch only schedule work.
//   finish(queue) is the one blocking synchronization point.
//   take_readback() and host_read()/host_write() fail with
//   RuntimeError::NotSynchronized if the work they depend on has not been
//   finished yet.

pub mod host;
pub mod preprocess;
pub mod wgsl;

use std::fmt;

use crate::capability::DeviceCapabilitySet;
use crate::error::RuntimeError;

pub type Result<T> = std::result::Result<T, RuntimeError>;

macro_rules! object_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

object_id!(
    /// Index of a device in `enumerate_devices()` order.
    DeviceId
);
object_id!(
    /// Identity of a context. Part of the program cache key.
    ContextId
);
object_id!(QueueId);
object_id!(ProgramId);
object_id!(BufferId);
object_id!(
    /// A scheduled device-to-host copy, redeemed after `finish`.
    ReadbackId
);

/// Coarse device classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    DiscreteGpu,
    IntegratedGpu,
    VirtualGpu,
    Cpu,
    Other,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::DiscreteGpu => write!(f, "DiscreteGpu"),
            DeviceKind::IntegratedGpu => write!(f, "IntegratedGpu"),
            DeviceKind::VirtualGpu => write!(f, "VirtualGpu"),
            DeviceKind::Cpu => write!(f, "Cpu"),
            DeviceKind::Other => write!(f, "Other"),
        }
    }
}

/// A device as reported by `enumerate_devices`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub vendor: u32,
    pub kind: DeviceKind,
    /// Backend name, e.g. "Vulkan" or "Host".
    pub backend: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.backend, self.kind)
    }
}

/// Result of `compile_program`. A failed build still carries its log.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub program: Option<ProgramId>,
    pub log: String,
    pub success: bool,
}

impl BuildOutput {
    pub fn failed(log: String) -> Self {
        BuildOutput { program: None, log, success: false }
    }
}

/// Placement hint for shared allocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Placement {
    #[value(name = "host")]
    HostPreferred,
    #[value(name = "device")]
    DevicePreferred,
    #[default]
    Unspecified,
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::HostPreferred => write!(f, "host"),
            Placement::DevicePreferred => write!(f, "device"),
            Placement::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// Kernel argument as seen by the adapter. Argument `i` is bound to
/// `@group(0) @binding(i)`.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelArg {
    Buffer(BufferId),
    /// Small by-value parameter block, bound as a uniform buffer.
    Uniform(Vec<u8>),
}

/// Launch geometry: global size in invocations and workgroup size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdRange {
    pub global: [u32; 3],
    pub local: [u32; 3],
}

impl NdRange {
    pub fn d1(global: u32, local: u32) -> Self {
        NdRange { global: [global, 1, 1], local: [local, 1, 1] }
    }

    pub fn d2(width: u32, height: u32, local: (u32, u32)) -> Self {
        NdRange { global: [width, height, 1], local: [local.0, local.1, 1] }
    }

    /// Number of workgroups per dimension, rounded up so every invocation
    /// in `global` is covered. Kernels must guard against the overhang.
    pub fn workgroups(&self) -> [u32; 3] {
        let mut out = [1u32; 3];
        for i in 0..3 {
            let local = self.local[i].max(1);
            out[i] = self.global[i].div_ceil(local);
        }
        out
    }
}

/// The device runtime consumed by the harness.
pub trait RuntimeAdapter: Send + Sync {
    /// Short backend name for logs ("wgpu", "host").
    fn backend_name(&self) -> &'static str;

    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>>;

    fn query_capabilities(&self, device: DeviceId) -> Result<DeviceCapabilitySet>;

    fn create_context(&self, device: DeviceId) -> Result<ContextId>;

    fn create_queue(&self, context: ContextId) -> Result<QueueId>;

    /// Compile `source` with the verbatim `options` string. Compiler
    /// diagnostics are returned in the output, not as an `Err`; `Err` is
    /// reserved for adapter failures (unknown context and the like).
    fn compile_program(&self, context: ContextId, source: &str, options: &str)
        -> Result<BuildOutput>;

    /// Device-only buffer; no host mapping.
    fn allocate_buffer(&self, context: ContextId, size: usize) -> Result<BufferId>;

    /// Allocation addressable from both host and device.
    fn allocate_shared(&self, context: ContextId, size: usize, placement: Placement)
        -> Result<BufferId>;

    fn enqueue_write(&self, queue: QueueId, buffer: BufferId, offset: usize, data: &[u8])
        -> Result<()>;

    fn enqueue_read(&self, queue: QueueId, buffer: BufferId) -> Result<ReadbackId>;

    /// Bytes of a readback whose queue has been finished.
    fn take_readback(&self, readback: ReadbackId) -> Result<Vec<u8>>;

    fn enqueue_dispatch(
        &self,
        queue: QueueId,
        program: ProgramId,
        entry_point: &str,
        args: &[KernelArg],
        range: NdRange,
    ) -> Result<()>;

    /// Block until all work submitted to `queue` has completed.
    fn finish(&self, queue: QueueId) -> Result<()>;

    /// Plain host store into a shared allocation.
    fn host_write(&self, buffer: BufferId, offset: usize, data: &[u8]) -> Result<()>;

    /// Plain host load from a shared allocation.
    fn host_read(&self, buffer: BufferId) -> Result<Vec<u8>>;

    fn release_buffer(&self, buffer: BufferId) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workgroups_exact() {
        let r = NdRange::d2(640, 480, (16, 8));
        assert_eq!(r.workgroups(), [40, 60, 1]);
    }

    #[test]
    fn workgroups_round_up() {
        let r = NdRange::d2(100, 100, (8, 8));
        assert_eq!(r.workgroups(), [13, 13, 1]);
        let r = NdRange::d1(1, 64);
        assert_eq!(r.workgroups(), [1, 1, 1]);
    }

    #[test]
    fn zero_local_size_is_treated_as_one() {
        let r = NdRange { global: [5, 1, 1], local: [0, 0, 0] };
        assert_eq!(r.workgroups(), [5, 1, 1]);
    }
}
