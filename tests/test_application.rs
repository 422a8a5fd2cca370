// tests/test_application.rs - End-to-end sample runs on the host backend.
//
// Every sample runs through `run_application` exactly as its binary would,
// with the host-simulated device injected so the suite needs no GPU. The
// exit status, recorded phases, and skip reasons are checked.

use std::sync::Arc;

use compute_samples::application::{host_runtime_for, run_application, Application, ExitStatus};
use compute_samples::capability::{MOTION_ESTIMATION, UNIFIED_MEMORY};
use compute_samples::logging::{self, LogFormat, Logger};
use compute_samples::runtime::RuntimeAdapter;
use compute_samples::samples::{MedianFilter, UsmHelloWorld, VmeInterlaced};
use compute_samples::program_cache::KernelSource;
use compute_samples::runtime::host::HostRuntime;
use compute_samples::runtime::{NdRange, Placement};
use compute_samples::session::{Arg, RunPhase, SampleContext};
use compute_samples::test_harness::hw_test;
use compute_samples::{Requirements, SampleError};

fn logger() -> Logger {
    logging::init("warn", LogFormat::Compact)
}

fn host<A: Application>(app: &A, caps: &[&str]) -> Arc<dyn RuntimeAdapter> {
    Arc::new(host_runtime_for(app).with_capabilities(caps.iter().copied()))
}

fn cmd(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

// ===== median_filter =====

#[test]
fn median_filter_passes_on_host() {
    let app = MedianFilter;
    let report = run_application(
        &app,
        &cmd(&["median_filter", "--width", "40", "--height", "24"]),
        &logger(),
        Some(host(&app, &[])),
    );
    assert_eq!(report.status, ExitStatus::Success, "{:?}", report.error);
    assert_eq!(
        report.phases,
        vec![
            RunPhase::Init,
            RunPhase::DeviceAcquired,
            RunPhase::ProgramBuilt,
            RunPhase::MemoryPrepared,
            RunPhase::Dispatched,
            RunPhase::Validated,
            RunPhase::Terminated,
        ]
    );
}

#[test]
fn median_filter_every_pattern() {
    let app = MedianFilter;
    for pattern in ["uniform", "gradient", "noise"] {
        let report = run_application(
            &app,
            &cmd(&["median_filter", "--width", "17", "--height", "9", "--pattern", pattern]),
            &logger(),
            Some(host(&app, &[])),
        );
        assert_eq!(report.status, ExitStatus::Success, "{pattern}: {:?}", report.error);
    }
}

#[test]
fn zero_width_is_a_failure() {
    let app = MedianFilter;
    let report = run_application(
        &app,
        &cmd(&["median_filter", "--width", "0"]),
        &logger(),
        Some(host(&app, &[])),
    );
    assert_eq!(report.status, ExitStatus::Failure);
    assert!(matches!(report.error, Some(SampleError::InvalidArgument(_))));
    assert_eq!(report.phases.last(), Some(&RunPhase::Terminated));
    assert!(report.phases.contains(&RunPhase::Failed));
}

#[test]
fn unknown_flag_is_a_failure() {
    let app = MedianFilter;
    let report = run_application(
        &app,
        &cmd(&["median_filter", "--no-such-flag"]),
        &logger(),
        Some(host(&app, &[])),
    );
    assert_eq!(report.status, ExitStatus::Failure);
    assert_eq!(report.phases, vec![RunPhase::Init, RunPhase::Failed, RunPhase::Terminated]);
}

#[test]
fn help_exits_successfully_without_a_device() {
    let app = MedianFilter;
    let report = run_application(&app, &cmd(&["median_filter", "--help"]), &logger(), None);
    assert_eq!(report.status, ExitStatus::Success);
    assert_eq!(report.phases, vec![RunPhase::Init, RunPhase::Terminated]);
    assert!(report.error.is_none() && report.skip_reason.is_none());
}

#[test]
fn missing_kernel_dir_is_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let app = MedianFilter;
    let report = run_application(
        &app,
        &cmd(&["median_filter", "--kernel-dir", dir.path().to_str().unwrap()]),
        &logger(),
        Some(host(&app, &[])),
    );
    assert_eq!(report.status, ExitStatus::Failure);
    assert!(matches!(report.error, Some(SampleError::SourceNotFound { .. })));
}

#[test]
fn broken_kernel_reports_the_build_log() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("median_filter.wgsl"), "fn median_filter( {").unwrap();
    let app = MedianFilter;
    let report = run_application(
        &app,
        &cmd(&["median_filter", "--kernel-dir", dir.path().to_str().unwrap()]),
        &logger(),
        Some(host(&app, &[])),
    );
    assert_eq!(report.status, ExitStatus::Failure);
    match report.error {
        Some(SampleError::Build(b)) => {
            assert_eq!(b.source_id, "median_filter.wgsl");
            assert!(b.log.contains("error"), "{}", b.log);
        }
        other => panic!("expected a build error, got {other:?}"),
    }
}

// ===== usm_hello_world =====

#[test]
fn usm_without_unified_memory_is_skipped() {
    let app = UsmHelloWorld;
    let report = run_application(&app, &cmd(&["usm_hello_world"]), &logger(), Some(host(&app, &[])));
    assert_eq!(report.status, ExitStatus::Skipped);
    assert_eq!(report.status.code(), 0);
    assert!(report.skip_reason.unwrap().contains(UNIFIED_MEMORY));
    assert!(report.phases.contains(&RunPhase::Skipped));
    assert!(!report.phases.contains(&RunPhase::ProgramBuilt));
}

#[test]
fn usm_round_trips_the_message() {
    let app = UsmHelloWorld;
    for placement in ["host", "device", "unspecified"] {
        let report = run_application(
            &app,
            &cmd(&["usm_hello_world", "--message", "hello from the device", "--placement", placement]),
            &logger(),
            Some(host(&app, &[UNIFIED_MEMORY])),
        );
        assert_eq!(report.status, ExitStatus::Success, "{placement}: {:?}", report.error);
        assert!(report.phases.contains(&RunPhase::Validated));
    }
}

// ===== vme_interlaced =====

#[test]
fn vme_without_motion_estimation_is_skipped() {
    let app = VmeInterlaced;
    let report = run_application(&app, &cmd(&["vme_interlaced"]), &logger(), Some(host(&app, &[])));
    assert_eq!(report.status, ExitStatus::Skipped);
    assert!(report.skip_reason.unwrap().contains(MOTION_ESTIMATION));
    assert!(report.error.is_none());
}

#[test]
fn vme_runs_when_the_device_supports_it() {
    let app = VmeInterlaced;
    let report = run_application(
        &app,
        &cmd(&["vme_interlaced", "--width", "32", "--height", "32", "--search-range", "3"]),
        &logger(),
        Some(host(&app, &[MOTION_ESTIMATION])),
    );
    assert_eq!(report.status, ExitStatus::Success, "{:?}", report.error);
}

#[test]
fn host_backend_flag_selects_the_simulated_device() {
    let app = VmeInterlaced;
    let report = run_application(
        &app,
        &cmd(&[
            "vme_interlaced",
            "--backend",
            "host",
            "--capabilities",
            "motion_estimation",
            "--width",
            "24",
            "--height",
            "16",
        ]),
        &logger(),
        None,
    );
    assert_eq!(report.status, ExitStatus::Success, "{:?}", report.error);
}

// ===== Lifecycle edges =====

const COPY_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read> src: array<u32>;
@group(0) @binding(1) var<storage, read_write> dst: array<u32>;

@compute @workgroup_size(64, 1, 1)
fn copy(@builtin(global_invocation_id) gid: vec3<u32>) {
    if gid.x >= arrayLength(&src) { return; }
    dst[gid.x] = src[gid.x];
}
"#;

#[test]
fn release_after_dispatch_needs_finish() {
    let rt = HostRuntime::new().with_kernel("copy", |inv| {
        let src: Vec<u32> = inv.read(0)?;
        inv.write(1, &src)
    });
    let outcome = hw_test(Arc::new(rt), &Requirements::none(), |ctx| {
        let program = ctx.build_program(&KernelSource::inline("copy", COPY_WGSL), "")?;
        let src = ctx.memory().upload(&[1u32, 2, 3, 4], Placement::Unspecified)?;
        let dst = ctx.memory().allocate(16, Placement::Unspecified)?;
        ctx.dispatch(&program, "copy", &[Arg::Memory(&src), Arg::Memory(&dst)], NdRange::d1(4, 64))?;

        assert!(ctx.memory().is_in_flight(&dst));
        assert!(matches!(ctx.memory().release(&dst), Err(SampleError::UseAfterFree { .. })));

        ctx.finish()?;
        assert_eq!(ctx.memory().read_pod::<u32>(&dst)?, vec![1, 2, 3, 4]);
        ctx.memory().release(&dst)?;
        ctx.memory().release(&dst)?;
        Ok(())
    });
    assert!(outcome.is_passed(), "{outcome}");
}

/// A sample that discovers a missing feature only inside its body.
struct LateGate;

#[derive(Debug, Clone, clap::Args)]
struct NoArgs {}

impl Application for LateGate {
    type Args = NoArgs;

    fn name(&self) -> &'static str {
        "late_gate"
    }

    fn run_sample(&self, ctx: &mut SampleContext, _args: &NoArgs) -> compute_samples::Result<()> {
        if !ctx.capabilities().contains("shader_f16") {
            return Err(SampleError::CapabilityUnmet { feature: "shader_f16".into() });
        }
        Ok(())
    }
}

#[test]
fn capability_unmet_from_the_body_is_a_skip() {
    let report = run_application(
        &LateGate,
        &cmd(&["late_gate"]),
        &logger(),
        Some(Arc::new(HostRuntime::new())),
    );
    assert_eq!(report.status, ExitStatus::Skipped);
    assert!(report.error.is_none());
    assert!(report.skip_reason.unwrap().contains("shader_f16"));
    assert_eq!(report.phases.last(), Some(&RunPhase::Terminated));
}
