// config.rs - Harness configuration shared by every sample binary.
//
// Resolution order for each field: command-line flag, then environment
// variable, then default. `HarnessArgs` is the clap surface and is
// flattened into each sample's own argument struct; `HarnessConfig` is the
// validated result the application works from.

use std::fmt;
use std::path::PathBuf;

use crate::error::{Result, SampleError};
use crate::gpu::DeviceProfile;
use crate::logging::LogFormat;

pub const KERNEL_DIR_ENV: &str = "COMPUTE_SAMPLES_KERNEL_DIR";
pub const BACKEND_ENV: &str = "COMPUTE_SAMPLES_BACKEND";

/// Which runtime adapter executes the sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Backend {
    /// Real devices through wgpu.
    #[default]
    Wgpu,
    /// Host-simulated device.
    Host,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Wgpu => write!(f, "wgpu"),
            Backend::Host => write!(f, "host"),
        }
    }
}

/// Kernel directory shipped with the crate.
pub fn default_kernel_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("kernels")
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub backend: Backend,
    /// Case-insensitive substring of the device name to select.
    pub device: Option<String>,
    pub profile: DeviceProfile,
    pub kernel_dir: PathBuf,
    /// Capabilities the host backend reports in addition to none.
    pub host_capabilities: Vec<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            device: None,
            profile: DeviceProfile::default(),
            kernel_dir: default_kernel_dir(),
            host_capabilities: Vec::new(),
        }
    }
}

impl HarnessConfig {
    pub fn builder() -> HarnessConfigBuilder {
        HarnessConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(hint) = &self.device {
            if hint.trim().is_empty() {
                return Err(SampleError::invalid_argument("--device must not be empty"));
            }
        }
        if self.kernel_dir.as_os_str().is_empty() {
            return Err(SampleError::invalid_argument("kernel directory must not be empty"));
        }
        if !self.host_capabilities.is_empty() && self.backend != Backend::Host {
            return Err(SampleError::invalid_argument(
                "--capabilities only applies to the host backend",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct HarnessConfigBuilder {
    config: HarnessConfig,
}

impl HarnessConfigBuilder {
    pub fn new() -> Self {
        Self { config: HarnessConfig::default() }
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn device<S: Into<String>>(mut self, hint: S) -> Self {
        self.config.device = Some(hint.into());
        self
    }

    pub fn profile(mut self, profile: DeviceProfile) -> Self {
        self.config.profile = profile;
        self
    }

    pub fn kernel_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.kernel_dir = dir.into();
        self
    }

    pub fn host_capability<S: Into<String>>(mut self, feature: S) -> Self {
        self.config.host_capabilities.push(feature.into());
        self
    }

    pub fn build(self) -> Result<HarnessConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Flags every sample accepts.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct HarnessArgs {
    /// Runtime backend.
    #[arg(long, value_enum, env = BACKEND_ENV, default_value_t = Backend::Wgpu)]
    pub backend: Backend,

    /// Select the first device whose name contains this text.
    #[arg(long)]
    pub device: Option<String>,

    /// Hardware profile whose limits the device is capped to.
    #[arg(long, value_enum, default_value_t = DeviceProfile::Native)]
    pub profile: DeviceProfile,

    /// Directory holding the WGSL kernels.
    #[arg(long, env = KERNEL_DIR_ENV)]
    pub kernel_dir: Option<PathBuf>,

    /// Capabilities the host backend reports (comma separated).
    #[arg(long, value_delimiter = ',')]
    pub capabilities: Vec<String>,

    /// Log level or filter directive; RUST_LOG wins when set.
    #[arg(long, default_value = crate::logging::DEFAULT_LEVEL)]
    pub log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Full)]
    pub log_format: LogFormat,
}

impl HarnessArgs {
    pub fn to_config(&self) -> Result<HarnessConfig> {
        let mut builder = HarnessConfig::builder().backend(self.backend).profile(self.profile);
        if let Some(hint) = &self.device {
            builder = builder.device(hint.clone());
        }
        if let Some(dir) = &self.kernel_dir {
            builder = builder.kernel_dir(dir.clone());
        }
        for cap in &self.capabilities {
            builder = builder.host_capability(cap.clone());
        }
        builder.build()
    }
}
