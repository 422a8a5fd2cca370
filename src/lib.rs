// compute-samples: a harness for GPU compute samples
//
// Every sample binary runs the same lifecycle: parse arguments, acquire a
// device, gate on its capabilities, build kernels through the program
// cache, move data under one of two memory models, dispatch, and validate
// against a CPU reference. Devices come from wgpu or from a host-simulated
// runtime used by the test suite.

pub mod error;
pub mod capability;
pub mod validation;
pub mod runtime;
pub mod gpu;
pub mod program_cache;
pub mod memory;
pub mod image;
pub mod logging;
pub mod config;
pub mod session;
pub mod application;
pub mod test_harness;
pub mod samples;

pub use application::{run_application, Application, ExitStatus, RunReport};
pub use capability::{DeviceCapabilitySet, Requirements};
pub use error::{BuildError, Result, RuntimeError, SampleError};
pub use memory::{DeviceMemory, MemoryHandle, MemoryModelKind};
pub use program_cache::{KernelSource, ProgramCache};
pub use session::SampleContext;
