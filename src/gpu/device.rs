// gpu/device.rs - wgpu adapter selection, hardware profiles, device limits.
//
// Responsibilities:
//   - Enumerate adapters and order them so the best real GPU comes first.
//   - Expose a `DeviceProfile` for simulating hardware limits on a
//     development machine (e.g., cap invocations to match Raspberry Pi).
//   - Provide `WorkgroupSize`, sized to fit the active profile and
//     passed to kernels as build options.
//   - Translate adapter features into capability names.
//
// ADAPTER SELECTION:
// wgpu's default `request_adapter` uses power preference heuristics that
// may grab llvmpipe/softpipe on WSL2 (where the software renderer appears
// as a valid Vulkan device). We enumerate explicitly and sort by tier:
//   1. DiscreteGpu / IntegratedGpu (real hardware)
//   2. VirtualGpu / Other (dzn, VM pass-through)
//   3. Cpu (llvmpipe), kept as a last resort so the samples still run
//
// DEVICE LIMITS:
// We request *lower* limits than the hardware actually supports when
// running under a non-Native profile. wgpu validates every dispatch against
// the requested limits, so violations that would crash on RPi are caught at
// dev time on the laptop.
//
// WORKGROUP SIZES:
// Kernels spell their workgroup size as `{{WG_X}}`/`{{WG_Y}}` placeholders
// and receive the values through "-D" build options, so the options string
// (and with it the program cache key) records the configuration a program
// was built for.

use std::fmt;

use tracing::{debug, info};

use crate::capability;
use crate::runtime::DeviceKind;

/// Hardware profile controlling device limits and default workgroup sizes.
///
/// Use `Native` for best performance on your development machine.
/// Use `RaspberryPi` to simulate RPi 4/5 constraints; wgpu will reject
/// any dispatch that exceeds the RPi's actual Vulkan limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DeviceProfile {
    /// Use the adapter's actual hardware limits. No artificial caps.
    #[default]
    Native,
    /// Simulate Raspberry Pi 4/5 (Broadcom VideoCore VI/VII, V3DV Vulkan).
    #[value(name = "rpi", aliases = ["raspberrypi", "raspberry-pi"])]
    RaspberryPi,
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceProfile::Native => write!(f, "Native"),
            DeviceProfile::RaspberryPi => write!(f, "RaspberryPi (simulated limits)"),
        }
    }
}

/// A workgroup size configuration for 2D compute dispatches.
///
/// The product of both dimensions must not exceed the profile's
/// `max_compute_invocations_per_workgroup` limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
}

impl WorkgroupSize {
    /// Total invocations per workgroup (x * y).
    pub fn total(&self) -> u32 {
        self.x * self.y
    }

    /// Build options that define the kernel's workgroup placeholders:
    ///
    /// ```wgsl
    /// @compute @workgroup_size({{WG_X}}, {{WG_Y}}, 1)
    /// ```
    pub fn as_defines(&self) -> String {
        format!("-D WG_X={} -D WG_Y={}", self.x, self.y)
    }

    /// Select the default workgroup size for the given profile.
    ///
    /// - `Native` (NVIDIA/AMD): 16×8 = 128 invocations. 4 NVIDIA warps or
    ///   2 AMD wavefronts; the 16-wide x dimension matches row-major data.
    /// - `RaspberryPi`: 8×8 = 64 invocations, well inside the 256 limit.
    pub fn for_profile(profile: DeviceProfile) -> Self {
        match profile {
            DeviceProfile::Native => WorkgroupSize { x: 16, y: 8 },
            DeviceProfile::RaspberryPi => WorkgroupSize { x: 8, y: 8 },
        }
    }
}

impl fmt::Display for WorkgroupSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{} ({} invocations)", self.x, self.y, self.total())
    }
}

// ============================================================
// Adapter selection
// ============================================================

/// Selection tier of a device type; lower is better.
pub(crate) fn adapter_tier(device_type: wgpu::DeviceType) -> u8 {
    match device_type {
        wgpu::DeviceType::DiscreteGpu | wgpu::DeviceType::IntegratedGpu => 0,
        wgpu::DeviceType::VirtualGpu | wgpu::DeviceType::Other => 1,
        wgpu::DeviceType::Cpu => 2,
    }
}

/// Enumerate adapters on `backends`, best tier first. Order within a tier
/// is the driver's enumeration order.
pub(crate) fn enumerate_ranked(instance: &wgpu::Instance, backends: wgpu::Backends) -> Vec<wgpu::Adapter> {
    let mut adapters = instance.enumerate_adapters(backends);
    for a in &adapters {
        let info = a.get_info();
        info!(name = %info.name, backend = ?info.backend, device_type = ?info.device_type, "adapter");
    }
    adapters.sort_by_key(|a| adapter_tier(a.get_info().device_type));
    adapters
}

pub(crate) fn device_kind(device_type: wgpu::DeviceType) -> DeviceKind {
    match device_type {
        wgpu::DeviceType::DiscreteGpu => DeviceKind::DiscreteGpu,
        wgpu::DeviceType::IntegratedGpu => DeviceKind::IntegratedGpu,
        wgpu::DeviceType::VirtualGpu => DeviceKind::VirtualGpu,
        wgpu::DeviceType::Cpu => DeviceKind::Cpu,
        wgpu::DeviceType::Other => DeviceKind::Other,
    }
}

/// Auto-detect RPi when the caller passed Native but the adapter is V3D.
pub(crate) fn effective_profile(requested: DeviceProfile, adapter_name: &str) -> DeviceProfile {
    match requested {
        DeviceProfile::Native if adapter_name.to_ascii_lowercase().contains("v3d") => {
            debug!(adapter = adapter_name, "V3D adapter detected, using RaspberryPi profile");
            DeviceProfile::RaspberryPi
        }
        other => other,
    }
}

/// Optional features requested whenever the adapter offers them.
pub(crate) fn wanted_features() -> wgpu::Features {
    wgpu::Features::MAPPABLE_PRIMARY_BUFFERS
        | wgpu::Features::SHADER_F16
        | wgpu::Features::SHADER_INT64
        | wgpu::Features::TIMESTAMP_QUERY
        | wgpu::Features::SUBGROUP
}

/// Capability names for an adapter's features and type.
pub(crate) fn capability_names(features: wgpu::Features, device_type: wgpu::DeviceType) -> Vec<&'static str> {
    let mut names = Vec::new();
    let table = [
        (wgpu::Features::MAPPABLE_PRIMARY_BUFFERS, capability::UNIFIED_MEMORY),
        (wgpu::Features::SHADER_F16, capability::SHADER_F16),
        (wgpu::Features::SHADER_INT64, capability::SHADER_INT64),
        (wgpu::Features::TIMESTAMP_QUERY, capability::TIMESTAMP_QUERY),
        (wgpu::Features::SUBGROUP, capability::SUBGROUPS),
    ];
    for (flag, name) in table {
        if features.contains(flag) {
            names.push(name);
        }
    }
    match device_type {
        wgpu::DeviceType::DiscreteGpu => names.push(capability::DISCRETE_GPU),
        wgpu::DeviceType::IntegratedGpu => names.push(capability::INTEGRATED_GPU),
        _ => {}
    }
    names
}

// ============================================================
// Limits helpers
// ============================================================

/// Build wgpu limits for the given profile.
pub(crate) fn limits_for_profile(profile: DeviceProfile) -> wgpu::Limits {
    match profile {
        DeviceProfile::Native => wgpu::Limits::default(),

        DeviceProfile::RaspberryPi => wgpu::Limits {
            // VideoCore VI/VII: vulkaninfo reports 256 max invocations.
            max_compute_invocations_per_workgroup: 256,
            max_compute_workgroup_size_x: 256,
            max_compute_workgroup_size_y: 256,
            max_compute_workgroup_size_z: 64,
            max_texture_dimension_2d: 4096,
            // RPi 4 shares 4 GiB with the CPU.
            max_storage_buffer_binding_size: 128 << 20,
            ..wgpu::Limits::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workgroup_size_defines() {
        let ws = WorkgroupSize { x: 16, y: 8 };
        assert_eq!(ws.total(), 128);
        assert_eq!(ws.as_defines(), "-D WG_X=16 -D WG_Y=8");
    }

    #[test]
    fn test_workgroup_size_for_profiles() {
        assert_eq!(WorkgroupSize::for_profile(DeviceProfile::Native), WorkgroupSize { x: 16, y: 8 });
        let rpi = WorkgroupSize::for_profile(DeviceProfile::RaspberryPi);
        assert_eq!(rpi, WorkgroupSize { x: 8, y: 8 });
        assert!(rpi.total() <= 256);
    }

    #[test]
    fn test_default_sizes_fit_profile_limits() {
        for profile in [DeviceProfile::Native, DeviceProfile::RaspberryPi] {
            let ws = WorkgroupSize::for_profile(profile);
            let limits = limits_for_profile(profile);
            assert!(ws.total() <= limits.max_compute_invocations_per_workgroup);
            assert!(ws.x <= limits.max_compute_workgroup_size_x);
        }
    }

    #[test]
    fn test_rpi_limits_cap_invocations() {
        let limits = limits_for_profile(DeviceProfile::RaspberryPi);
        assert_eq!(limits.max_compute_invocations_per_workgroup, 256);
        assert_eq!(limits.max_compute_workgroup_size_x, 256);
        assert_eq!(limits.max_compute_workgroup_size_y, 256);
    }

    #[test]
    fn test_native_limits_are_default() {
        assert_eq!(limits_for_profile(DeviceProfile::Native), wgpu::Limits::default());
    }

    #[test]
    fn test_v3d_upgrades_native_profile() {
        assert_eq!(effective_profile(DeviceProfile::Native, "V3D 7.1"), DeviceProfile::RaspberryPi);
        assert_eq!(effective_profile(DeviceProfile::Native, "NVIDIA RTX"), DeviceProfile::Native);
    }

    #[test]
    fn test_tiers_prefer_real_hardware() {
        assert!(adapter_tier(wgpu::DeviceType::DiscreteGpu) < adapter_tier(wgpu::DeviceType::Other));
        assert!(adapter_tier(wgpu::DeviceType::Other) < adapter_tier(wgpu::DeviceType::Cpu));
    }

    #[test]
    fn test_capability_names() {
        let names = capability_names(
            wgpu::Features::MAPPABLE_PRIMARY_BUFFERS | wgpu::Features::SHADER_F16,
            wgpu::DeviceType::IntegratedGpu,
        );
        assert!(names.contains(&capability::UNIFIED_MEMORY));
        assert!(names.contains(&capability::SHADER_F16));
        assert!(names.contains(&capability::INTEGRATED_GPU));
        assert!(!names.contains(&capability::MOTION_ESTIMATION));
    }

    #[test]
    fn test_profile_value_names() {
        use clap::ValueEnum;
        assert_eq!(DeviceProfile::from_str("rpi", false).unwrap(), DeviceProfile::RaspberryPi);
        assert_eq!(DeviceProfile::from_str("raspberrypi", false).unwrap(), DeviceProfile::RaspberryPi);
        assert_eq!(DeviceProfile::from_str("native", false).unwrap(), DeviceProfile::Native);
        assert!(DeviceProfile::from_str("tpu", false).is_err());
    }
}
