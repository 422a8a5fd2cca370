// gpu/mod.rs - wgpu backend.
//
// `WgpuRuntime` implements `RuntimeAdapter` for real devices. Samples are
// written once against the adapter trait; the CPU reference in each sample
// stays authoritative and every kernel result is validated against it.
//
// `device` holds adapter selection, hardware profiles and limits;
// `runtime` holds the adapter implementation itself.

pub mod device;
pub mod runtime;

pub use device::{DeviceProfile, WorkgroupSize};
pub use runtime::WgpuRuntime;
