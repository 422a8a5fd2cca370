// samples/vme_interlaced.rs - Field-based motion estimation on interlaced video.
//
// An interlaced frame is two fields: even rows (top, parity 0) and odd rows
// (bottom, parity 1). Each field moves independently, so motion is searched
// per field: every `block`x`block` block of a field in the current frame is
// matched against the same field of the reference frame over a
// +/- `search_range` window, minimizing the sum of absolute differences.
//
// The sample needs `motion_estimation`; devices without it skip the run.
// Input is a noise frame and a copy whose fields are shifted by
// `TOP_FIELD_SHIFT` and `BOTTOM_FIELD_SHIFT`, so interior blocks have a
// known answer.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use tracing::info;

use crate::application::Application;
use crate::capability::{Requirements, MOTION_ESTIMATION};
use crate::error::{Result, SampleError};
use crate::image::{synthesize, Image, Pattern};
use crate::program_cache::KernelSource;
use crate::runtime::host::{HostInvocation, HostKernel};
use crate::runtime::{NdRange, Placement};
use crate::session::{Arg, SampleContext};

pub const KERNEL_FILE: &str = "vme_interlaced.wgsl";
pub const ENTRY_POINT: &str = "vme_interlaced";

/// Displacement applied to the top field of the current frame.
pub const TOP_FIELD_SHIFT: (i32, i32) = (2, 1);
/// Displacement applied to the bottom field of the current frame.
pub const BOTTOM_FIELD_SHIFT: (i32, i32) = (-1, 2);

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct VmeParams {
    pub width: u32,
    pub height: u32,
    pub block: u32,
    pub range: i32,
    pub blocks_x: u32,
    pub blocks_y: u32,
    pub _pad0: u32,
    pub _pad1: u32,
}

/// Best match for one block of one field.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct MotionVector {
    pub x: i32,
    pub y: i32,
    pub sad: i32,
    pub _pad: i32,
}

#[derive(Debug, Clone, clap::Args)]
pub struct VmeInterlacedArgs {
    /// Frame width.
    #[arg(long, default_value_t = 64)]
    pub width: u32,

    /// Frame height (both fields together).
    #[arg(long, default_value_t = 64)]
    pub height: u32,

    /// Block edge length in field pixels.
    #[arg(long, default_value_t = 8)]
    pub block: u32,

    /// Search window radius in field pixels.
    #[arg(long, default_value_t = 4)]
    pub search_range: i32,

    #[arg(long, default_value_t = 0x00c0ffee)]
    pub seed: u32,
}

impl VmeInterlacedArgs {
    fn check(&self) -> Result<()> {
        if self.width == 0 || self.height < 2 {
            return Err(SampleError::invalid_argument(
                "frame must be at least 1 pixel wide and 2 rows high",
            ));
        }
        if !(4..=16).contains(&self.block) {
            return Err(SampleError::invalid_argument("--block must be in 4..=16"));
        }
        if !(1..=16).contains(&self.search_range) {
            return Err(SampleError::invalid_argument("--search-range must be in 1..=16"));
        }
        Ok(())
    }
}

/// Blocks per field row and column. Rows are counted on the top field,
/// which is the taller one for odd frame heights.
pub fn block_grid(width: usize, height: usize, block: usize) -> (usize, usize) {
    let top_rows = height.div_ceil(2);
    (width.div_ceil(block), top_rows.div_ceil(block))
}

/// Weave two fields back into a frame.
fn weave(top: &Image<u8>, bottom: &Image<u8>, height: usize) -> Image<u8> {
    Image::from_fn(top.width(), height, |x, y| {
        if y % 2 == 0 { top.get(x, y / 2) } else { bottom.get(x, y / 2) }
    })
}

/// `reference` with its top field moved by `top` and its bottom field by
/// `bottom`. Pixels uncovered by the move repeat the field edge.
pub fn shift_fields(reference: &Image<u8>, top: (i32, i32), bottom: (i32, i32)) -> Image<u8> {
    let shift = |field: &Image<u8>, (sx, sy): (i32, i32)| {
        Image::from_fn(field.width(), field.height(), |x, y| {
            field.get_clamped(x as isize - sx as isize, y as isize - sy as isize)
        })
    };
    let top_field = shift(&reference.field(0), top);
    let bottom_field = shift(&reference.field(1), bottom);
    weave(&top_field, &bottom_field, reference.height())
}

fn block_sad(cur: &Image<u8>, reference: &Image<u8>, bx: isize, by: isize, block: isize, dx: isize, dy: isize)
    -> u32
{
    let mut sad = 0u32;
    for y in 0..block {
        for x in 0..block {
            let c = cur.get_clamped(bx + x, by + y);
            let r = reference.get_clamped(bx + x + dx, by + y + dy);
            sad += c.abs_diff(r) as u32;
        }
    }
    sad
}

/// Full-search block matching on both fields.
///
/// Output order is parity-major, then block row, then block column. Ties
/// keep the first candidate visited (dy outer, dx inner, both ascending).
pub fn search_interlaced(reference: &Image<u8>, current: &Image<u8>, block: usize, range: i32)
    -> Vec<MotionVector>
{
    let (blocks_x, blocks_y) = block_grid(reference.width(), reference.height(), block);
    let mut out = Vec::with_capacity(2 * blocks_x * blocks_y);
    let b = block as isize;
    let r = range as isize;

    for parity in 0..2 {
        let ref_field = reference.field(parity);
        let cur_field = current.field(parity);
        for by in 0..blocks_y {
            for bx in 0..blocks_x {
                let (ox, oy) = (bx as isize * b, by as isize * b);
                let mut best = MotionVector { sad: i32::MAX, ..MotionVector::default() };
                let mut best_sad = u32::MAX;
                for dy in -r..=r {
                    for dx in -r..=r {
                        let sad = block_sad(&cur_field, &ref_field, ox, oy, b, dx, dy);
                        if sad < best_sad {
                            best_sad = sad;
                            best = MotionVector { x: dx as i32, y: dy as i32, sad: sad as i32, _pad: 0 };
                        }
                    }
                }
                out.push(best);
            }
        }
    }
    out
}

fn host_vme(inv: &mut HostInvocation<'_>) -> std::result::Result<(), String> {
    let params: VmeParams = inv.uniform(3)?;
    let (w, h) = (params.width as usize, params.height as usize);
    let frame = |index: usize| -> std::result::Result<Image<u8>, String> {
        let pixels: Vec<u32> = inv.read(index)?;
        Image::from_u32_slice(w, h, pixels.get(..w * h).unwrap_or(&pixels))
            .ok_or_else(|| format!("argument {index}: expected a {w}x{h} frame"))
    };
    let reference = frame(0)?;
    let current = frame(1)?;
    let vectors = search_interlaced(&reference, &current, params.block as usize, params.range);
    inv.write(2, &vectors)
}

pub struct VmeInterlaced;

impl Application for VmeInterlaced {
    type Args = VmeInterlacedArgs;

    fn name(&self) -> &'static str {
        "vme_interlaced"
    }

    fn about(&self) -> &'static str {
        "Per-field block-matching motion estimation on interlaced frames"
    }

    fn requirements(&self, _args: &VmeInterlacedArgs) -> Requirements {
        Requirements::none().with(MOTION_ESTIMATION)
    }

    fn host_kernels(&self) -> Vec<(&'static str, HostKernel)> {
        let kernel: HostKernel = Arc::new(host_vme);
        vec![(ENTRY_POINT, kernel)]
    }

    fn run_sample(&self, ctx: &mut SampleContext, args: &VmeInterlacedArgs) -> Result<()> {
        args.check()?;
        let (w, h) = (args.width as usize, args.height as usize);
        let block = args.block as usize;

        let reference = synthesize(Pattern::Noise, w, h, args.seed);
        let current = shift_fields(&reference, TOP_FIELD_SHIFT, BOTTOM_FIELD_SHIFT);
        let expected = search_interlaced(&reference, &current, block, args.search_range);

        let wg = ctx.workgroup_size();
        let program = ctx.build_program(&KernelSource::named(KERNEL_FILE), &wg.as_defines())?;

        let (blocks_x, blocks_y) = block_grid(w, h, block);
        let motion_bytes = expected.len() * std::mem::size_of::<MotionVector>();
        let memory = ctx.memory();
        let ref_buf = memory.upload(&reference.to_u32_vec(), Placement::DevicePreferred)?;
        let cur_buf = memory.upload(&current.to_u32_vec(), Placement::DevicePreferred)?;
        let motion = memory.allocate(motion_bytes, Placement::DevicePreferred)?;

        let params = VmeParams {
            width: args.width,
            height: args.height,
            block: args.block,
            range: args.search_range,
            blocks_x: blocks_x as u32,
            blocks_y: blocks_y as u32,
            _pad0: 0,
            _pad1: 0,
        };
        ctx.dispatch(
            &program,
            ENTRY_POINT,
            &[Arg::Memory(&ref_buf), Arg::Memory(&cur_buf), Arg::Memory(&motion), Arg::uniform(&params)],
            NdRange { global: [blocks_x as u32, blocks_y as u32, 2], local: [wg.x, wg.y, 1] },
        )?;
        ctx.finish()?;

        let vectors: Vec<MotionVector> = ctx.memory().read_pod(&motion)?;
        let recovered = recovered_blocks(&vectors, blocks_x * blocks_y);
        info!(
            blocks = vectors.len(),
            recovered,
            "motion search complete ({blocks_x}x{blocks_y} blocks per field)"
        );
        ctx.validate_exact("motion vectors", &expected, &vectors[..expected.len().min(vectors.len())])
    }
}

/// Blocks whose vector undoes the known field shift with a perfect match.
fn recovered_blocks(vectors: &[MotionVector], per_field: usize) -> usize {
    vectors
        .iter()
        .enumerate()
        .filter(|(i, mv)| {
            let (sx, sy) = if *i < per_field { TOP_FIELD_SHIFT } else { BOTTOM_FIELD_SHIFT };
            mv.x == -sx && mv.y == -sy && mv.sad == 0
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_match_wgsl() {
        assert_eq!(std::mem::size_of::<VmeParams>(), 32);
        assert_eq!(std::mem::size_of::<MotionVector>(), 16);
    }

    #[test]
    fn grid_counts_partial_blocks() {
        assert_eq!(block_grid(64, 64, 8), (8, 4));
        assert_eq!(block_grid(65, 35, 8), (9, 3));
    }

    #[test]
    fn static_frame_has_zero_motion() {
        let frame = synthesize(Pattern::Noise, 32, 32, 3);
        let vectors = search_interlaced(&frame, &frame, 8, 2);
        assert!(vectors.iter().all(|mv| mv.x == 0 && mv.y == 0 && mv.sad == 0));
    }

    #[test]
    fn interior_blocks_recover_the_field_shift() {
        let reference = synthesize(Pattern::Noise, 48, 96, 11);
        let current = shift_fields(&reference, TOP_FIELD_SHIFT, BOTTOM_FIELD_SHIFT);
        let vectors = search_interlaced(&reference, &current, 8, 4);
        let (bx, by) = block_grid(48, 96, 8);
        // Block (2, 2) is far from every edge in both fields.
        let top = vectors[2 * bx + 2];
        let bottom = vectors[bx * by + 2 * bx + 2];
        assert_eq!((top.x, top.y, top.sad), (-TOP_FIELD_SHIFT.0, -TOP_FIELD_SHIFT.1, 0));
        assert_eq!((bottom.x, bottom.y, bottom.sad), (-BOTTOM_FIELD_SHIFT.0, -BOTTOM_FIELD_SHIFT.1, 0));
    }

    #[test]
    fn fields_move_independently() {
        let reference = synthesize(Pattern::Gradient, 16, 8, 0);
        let current = shift_fields(&reference, (0, 0), (1, 0));
        assert_eq!(current.field(0), reference.field(0));
        assert_ne!(current.field(1), reference.field(1));
    }

    #[test]
    fn argument_bounds() {
        let args = VmeInterlacedArgs { width: 64, height: 64, block: 8, search_range: 4, seed: 1 };
        assert!(args.check().is_ok());
        assert!(VmeInterlacedArgs { block: 2, ..args.clone() }.check().is_err());
        assert!(VmeInterlacedArgs { search_range: 0, ..args.clone() }.check().is_err());
        assert!(VmeInterlacedArgs { height: 1, ..args }.check().is_err());
    }
}
