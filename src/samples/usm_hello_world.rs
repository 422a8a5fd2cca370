// samples/usm_hello_world.rs - Round-trip a message through shared memory.
//
// Runs under the Shared memory model, so the device must report
// `unified_memory`. The host writes the message straight into one shared
// allocation, the kernel copies it word by word into a second one, and the
// host reads the copy back without any explicit transfer.

use std::sync::Arc;

use tracing::info;

use crate::application::Application;
use crate::error::{Result, SampleError};
use crate::memory::MemoryModelKind;
use crate::program_cache::KernelSource;
use crate::runtime::host::{HostInvocation, HostKernel};
use crate::runtime::{NdRange, Placement};
use crate::session::{Arg, SampleContext};

pub const KERNEL_FILE: &str = "usm_hello_world.wgsl";
pub const ENTRY_POINT: &str = "copy_buffer";
const GROUP_SIZE: u32 = 64;

#[derive(Debug, Clone, clap::Args)]
pub struct UsmHelloWorldArgs {
    /// Text to send through the device.
    #[arg(long, default_value = "Hello, world!")]
    pub message: String,

    /// Where the shared allocations should live.
    #[arg(long, value_enum, default_value_t = Placement::Unspecified)]
    pub placement: Placement,
}

/// Pack `bytes` into little-endian words, zero-padding the tail.
pub fn pack_words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(4)
        .map(|chunk| {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            u32::from_le_bytes(word)
        })
        .collect()
}

/// Inverse of `pack_words`, keeping the first `len` bytes.
pub fn unpack_words(words: &[u32], len: usize) -> Vec<u8> {
    let mut bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    bytes.truncate(len);
    bytes
}

fn host_copy(inv: &mut HostInvocation<'_>) -> std::result::Result<(), String> {
    let src: Vec<u32> = inv.read(0)?;
    inv.write(1, &src)
}

pub struct UsmHelloWorld;

impl Application for UsmHelloWorld {
    type Args = UsmHelloWorldArgs;

    fn name(&self) -> &'static str {
        "usm_hello_world"
    }

    fn about(&self) -> &'static str {
        "Copy a message between two shared (unified memory) allocations"
    }

    fn memory_model(&self, _args: &UsmHelloWorldArgs) -> MemoryModelKind {
        MemoryModelKind::Shared
    }

    fn host_kernels(&self) -> Vec<(&'static str, HostKernel)> {
        let kernel: HostKernel = Arc::new(host_copy);
        vec![(ENTRY_POINT, kernel)]
    }

    fn run_sample(&self, ctx: &mut SampleContext, args: &UsmHelloWorldArgs) -> Result<()> {
        if args.message.is_empty() {
            return Err(SampleError::invalid_argument("--message must not be empty"));
        }

        let program = ctx.build_program(
            &KernelSource::named(KERNEL_FILE),
            &format!("-D WG_SIZE={GROUP_SIZE}"),
        )?;

        let words = pack_words(args.message.as_bytes());
        let memory = ctx.memory();
        let src = memory.upload(&words, args.placement)?;
        let dst = memory.allocate(src.size(), args.placement)?;

        ctx.dispatch(
            &program,
            ENTRY_POINT,
            &[Arg::Memory(&src), Arg::Memory(&dst)],
            NdRange::d1(words.len() as u32, GROUP_SIZE),
        )?;
        ctx.finish()?;

        let copied: Vec<u32> = ctx.memory().read_pod(&dst)?;
        let received = unpack_words(&copied, args.message.len());
        info!(placement = %args.placement, "device says: {}", String::from_utf8_lossy(&received));
        ctx.validate_exact("message", args.message.as_bytes(), &received)
    }
}
