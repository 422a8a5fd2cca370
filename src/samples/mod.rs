// samples/mod.rs - The sample applications.
//
// Each sample is an `Application` with a CPU reference, a WGSL kernel in
// kernels/, and a host kernel for `--backend host`.

pub mod median_filter;
pub mod usm_hello_world;
pub mod vme_interlaced;

pub use median_filter::MedianFilter;
pub use usm_hello_world::UsmHelloWorld;
pub use vme_interlaced::VmeInterlaced;
