// tests/test_gpu_samples.rs - Samples on a real adapter through wgpu.
//
// Same subprocess pattern as the runtime tests: each outer test re-runs
// the ignored inner test in a child `cargo test` and looks for GPU_TEST_OK,
// so a driver crash during process teardown does not fail the suite.
// Machines without an adapter print SKIPPED and still pass.

use compute_samples::application::{run_application, ExitStatus};
use compute_samples::logging::{self, LogFormat};
use compute_samples::samples::{MedianFilter, UsmHelloWorld, VmeInterlaced};

fn run_gpu_test_in_subprocess(test_name: &str) -> String {
    let output = std::process::Command::new("cargo")
        .args([
            "test",
            "--test",
            "test_gpu_samples",
            "--",
            test_name,
            "--exact",
            "--ignored",
            "--nocapture",
        ])
        .output()
        .unwrap_or_else(|e| panic!("failed to spawn subprocess for {test_name}: {e}"));
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    print!("{stdout}");
    eprint!("{stderr}");
    stdout + &stderr
}

fn report_status(status: ExitStatus, skip_reason: Option<String>) {
    match status {
        ExitStatus::Success => println!("GPU_TEST_OK"),
        ExitStatus::Skipped => {
            println!("SKIPPED: {}", skip_reason.unwrap_or_default());
            println!("GPU_TEST_OK");
        }
        ExitStatus::Failure => panic!("sample failed"),
    }
}

#[test]
#[ignore = "GPU integration: run via outer subprocess wrapper"]
fn inner_median_filter() {
    let logger = logging::init("info", LogFormat::Compact);
    let report = run_application(
        &MedianFilter,
        &["median_filter", "--width", "320", "--height", "240"],
        &logger,
        None,
    );
    assert_ne!(report.status, ExitStatus::Failure, "{:?}", report.error);
    report_status(report.status, report.skip_reason);
}

#[test]
#[ignore = "GPU integration: run via outer subprocess wrapper"]
fn inner_usm_hello_world() {
    let logger = logging::init("info", LogFormat::Compact);
    let report = run_application(&UsmHelloWorld, &["usm_hello_world"], &logger, None);
    assert_ne!(report.status, ExitStatus::Failure, "{:?}", report.error);
    report_status(report.status, report.skip_reason);
}

#[test]
#[ignore = "GPU integration: run via outer subprocess wrapper"]
fn inner_vme_interlaced() {
    let logger = logging::init("info", LogFormat::Compact);
    let report = run_application(&VmeInterlaced, &["vme_interlaced"], &logger, None);
    assert_ne!(report.status, ExitStatus::Failure, "{:?}", report.error);
    report_status(report.status, report.skip_reason);
}

#[test]
#[ignore = "requires a real GPU"]
fn test_median_filter_gpu() {
    let out = run_gpu_test_in_subprocess("inner_median_filter");
    assert!(out.contains("GPU_TEST_OK"), "inner test did not print GPU_TEST_OK:\n{out}");
}

#[test]
#[ignore = "requires a real GPU"]
fn test_usm_hello_world_gpu() {
    let out = run_gpu_test_in_subprocess("inner_usm_hello_world");
    assert!(out.contains("GPU_TEST_OK"), "inner test did not print GPU_TEST_OK:\n{out}");
}

#[test]
#[ignore = "requires a real GPU"]
fn test_vme_interlaced_gpu() {
    let out = run_gpu_test_in_subprocess("inner_vme_interlaced");
    assert!(out.contains("GPU_TEST_OK"), "inner test did not print GPU_TEST_OK:\n{out}");
}
