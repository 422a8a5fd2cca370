// benches/benchmarks.rs -- CPU references, program cache, and a host-backend run.
//
//   cargo bench
//
// Everything here runs on the host-simulated device; no adapter needed.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use compute_samples::application::{host_runtime_for, run_application};
use compute_samples::image::{synthesize, Pattern};
use compute_samples::logging::{self, LogFormat};
use compute_samples::program_cache::{KernelSource, ProgramCache};
use compute_samples::runtime::host::HostRuntime;
use compute_samples::runtime::{DeviceId, RuntimeAdapter};
use compute_samples::samples::median_filter::median_filter_3x3;
use compute_samples::samples::vme_interlaced::{
    search_interlaced, shift_fields, BOTTOM_FIELD_SHIFT, TOP_FIELD_SHIFT,
};
use compute_samples::samples::MedianFilter;

// ============================================================
// CPU references
// ============================================================

fn bench_median(c: &mut Criterion) {
    let mut group = c.benchmark_group("median_filter");
    for &(w, h) in &[(256usize, 256usize), (752, 480)] {
        let img = synthesize(Pattern::Noise, w, h, 1);
        group.bench_with_input(BenchmarkId::new("reference", format!("{w}x{h}")), &img, |b, img| {
            b.iter(|| median_filter_3x3(img))
        });
    }
    group.finish();
}

fn bench_motion_search(c: &mut Criterion) {
    let reference = synthesize(Pattern::Noise, 64, 64, 7);
    let current = shift_fields(&reference, TOP_FIELD_SHIFT, BOTTOM_FIELD_SHIFT);

    let mut group = c.benchmark_group("vme_interlaced");
    for range in [2, 4, 8] {
        group.bench_with_input(BenchmarkId::new("reference_64x64_b8", range), &range, |b, &range| {
            b.iter(|| search_interlaced(&reference, &current, 8, range))
        });
    }
    group.finish();
}

// ============================================================
// Program cache
// ============================================================

fn bench_program_cache(c: &mut Criterion) {
    let rt = HostRuntime::new();
    let ctx = rt.create_context(DeviceId(0)).unwrap();
    let cache = ProgramCache::new(compute_samples::config::default_kernel_dir());
    let src = KernelSource::named("median_filter.wgsl");
    cache.get_or_build(&rt, ctx, &src, "-D WG_X=16 -D WG_Y=8").unwrap();

    let mut group = c.benchmark_group("program_cache");
    group.bench_function("hit", |b| {
        b.iter(|| cache.get_or_build(&rt, ctx, &src, "-D WG_X=16 -D WG_Y=8").unwrap())
    });
    group.bench_function("miss_fresh_cache", |b| {
        b.iter(|| {
            let fresh = ProgramCache::new(compute_samples::config::default_kernel_dir());
            fresh.get_or_build(&rt, ctx, &src, "-D WG_X=16 -D WG_Y=8").unwrap()
        })
    });
    group.finish();
}

// ============================================================
// Full lifecycle
// ============================================================

fn bench_host_run(c: &mut Criterion) {
    let logger = logging::init("error", LogFormat::Compact);
    let args = ["median_filter", "--width", "128", "--height", "128"];

    let mut group = c.benchmark_group("application");
    group.sample_size(20);
    group.bench_function("median_filter_host_128x128", |b| {
        b.iter(|| {
            let rt: Arc<dyn RuntimeAdapter> = Arc::new(host_runtime_for(&MedianFilter));
            run_application(&MedianFilter, &args, &logger, Some(rt)).status
        })
    });
    group.finish();
}

// ============================================================
// Register
// ============================================================

criterion_group!(
    benches,
    bench_median,
    bench_motion_search,
    bench_program_cache,
    bench_host_run,
);
criterion_main!(benches);
