// samples/median_filter.rs - 3x3 median filter over a synthesized image.
//
// Explicit memory model: the input is copied to a device buffer, the kernel
// writes a second buffer, and the result is copied back and compared
// pixel-for-pixel with `median_filter_3x3` on the host.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use tracing::info;

use crate::application::Application;
use crate::error::{Result, SampleError};
use crate::image::{synthesize, Image, Pattern};
use crate::program_cache::KernelSource;
use crate::runtime::host::{HostInvocation, HostKernel};
use crate::runtime::{NdRange, Placement};
use crate::session::{Arg, SampleContext};

pub const KERNEL_FILE: &str = "median_filter.wgsl";
pub const ENTRY_POINT: &str = "median_filter";

/// Uniform block of the kernel.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct MedianParams {
    pub width: u32,
    pub height: u32,
    pub _pad0: u32,
    pub _pad1: u32,
}

#[derive(Debug, Clone, clap::Args)]
pub struct MedianFilterArgs {
    /// Width of the synthesized input.
    #[arg(long, default_value_t = 256)]
    pub width: u32,

    /// Height of the synthesized input.
    #[arg(long, default_value_t = 256)]
    pub height: u32,

    /// Input content.
    #[arg(long, value_enum, default_value_t = Pattern::Noise)]
    pub pattern: Pattern,

    #[arg(long, default_value_t = 0x5eed)]
    pub seed: u32,
}

/// Median of each pixel's 3x3 neighbourhood, clamped at the borders.
pub fn median_filter_3x3(src: &Image<u8>) -> Image<u8> {
    Image::from_fn(src.width(), src.height(), |x, y| {
        let mut window = [0u8; 9];
        let mut k = 0;
        for dy in -1..=1isize {
            for dx in -1..=1isize {
                window[k] = src.get_clamped(x as isize + dx, y as isize + dy);
                k += 1;
            }
        }
        window.sort_unstable();
        window[4]
    })
}

fn host_median(inv: &mut HostInvocation<'_>) -> std::result::Result<(), String> {
    let params: MedianParams = inv.uniform(2)?;
    let (w, h) = (params.width as usize, params.height as usize);
    let src: Vec<u32> = inv.read(0)?;
    let image = Image::<u8>::from_u32_slice(w, h, src.get(..w * h).unwrap_or(&src))
        .ok_or_else(|| format!("input holds {} pixels, expected {w}x{h}", src.len()))?;
    inv.write(1, &median_filter_3x3(&image).to_u32_vec())
}

pub struct MedianFilter;

impl Application for MedianFilter {
    type Args = MedianFilterArgs;

    fn name(&self) -> &'static str {
        "median_filter"
    }

    fn about(&self) -> &'static str {
        "3x3 median filter on a synthesized 8-bit image"
    }

    fn host_kernels(&self) -> Vec<(&'static str, HostKernel)> {
        let kernel: HostKernel = Arc::new(host_median);
        vec![(ENTRY_POINT, kernel)]
    }

    fn run_sample(&self, ctx: &mut SampleContext, args: &MedianFilterArgs) -> Result<()> {
        if args.width == 0 || args.height == 0 {
            return Err(SampleError::invalid_argument("--width and --height must be non-zero"));
        }

        let input = synthesize(args.pattern, args.width as usize, args.height as usize, args.seed);
        let expected = median_filter_3x3(&input);

        let wg = ctx.workgroup_size();
        let program = ctx.build_program(&KernelSource::named(KERNEL_FILE), &wg.as_defines())?;

        let pixels = input.to_u32_vec();
        let bytes = std::mem::size_of_val(pixels.as_slice());
        let memory = ctx.memory();
        let src = memory.upload(&pixels, Placement::DevicePreferred)?;
        let dst = memory.allocate(bytes, Placement::DevicePreferred)?;

        let params = MedianParams { width: args.width, height: args.height, _pad0: 0, _pad1: 0 };
        ctx.dispatch(
            &program,
            ENTRY_POINT,
            &[Arg::Memory(&src), Arg::Memory(&dst), Arg::uniform(&params)],
            NdRange::d2(args.width, args.height, (wg.x, wg.y)),
        )?;
        ctx.finish()?;

        let output: Vec<u32> = ctx.memory().read_pod(&dst)?;
        info!(
            width = args.width,
            height = args.height,
            pattern = ?args.pattern,
            "median filter complete"
        );
        ctx.validate_exact("median", &expected.to_u32_vec(), &output[..pixels.len().min(output.len())])
    }
}
