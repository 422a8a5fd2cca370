// tests/test_capability.rs - Capability gate decisions and gated hardware tests.

use std::sync::Arc;

use compute_samples::capability::{
    require, Decision, DeviceCapabilitySet, Requirements, MOTION_ESTIMATION, SHADER_F16,
    UNIFIED_MEMORY,
};
use compute_samples::memory::MemoryModelKind;
use compute_samples::runtime::host::HostRuntime;
use compute_samples::runtime::Placement;
use compute_samples::test_harness::{hw_test, hw_test_with};

fn caps(features: &[&str]) -> DeviceCapabilitySet {
    features.iter().copied().collect()
}

#[test]
fn no_requirements_always_proceed() {
    assert_eq!(require(Some(&caps(&[])), &Requirements::none()), Decision::Proceed);
}

#[test]
fn no_device_is_a_skip() {
    let d = require(None, &Requirements::none().with(SHADER_F16));
    assert!(d.is_skip());
}

#[test]
fn superset_proceeds() {
    let device = caps(&[UNIFIED_MEMORY, MOTION_ESTIMATION, SHADER_F16]);
    let needed = Requirements::none().with(UNIFIED_MEMORY).with(MOTION_ESTIMATION);
    assert_eq!(require(Some(&device), &needed), Decision::Proceed);
}

#[test]
fn skip_reason_names_every_missing_feature() {
    let device = caps(&[SHADER_F16]);
    let needed = Requirements::none().with(UNIFIED_MEMORY).with(MOTION_ESTIMATION);
    let Decision::Skip(reason) = require(Some(&device), &needed) else {
        panic!("expected a skip");
    };
    assert!(reason.contains(UNIFIED_MEMORY), "{reason}");
    assert!(reason.contains(MOTION_ESTIMATION), "{reason}");
}

#[test]
fn shared_model_test_skips_without_unified_memory() {
    let outcome = hw_test_with(
        Arc::new(HostRuntime::new()),
        &Requirements::none(),
        MemoryModelKind::Shared,
        |_| panic!("body must not run"),
    );
    assert!(outcome.is_skipped());
    outcome.assert_not_failed();
}

#[test]
fn gated_test_body_runs_on_capable_device() {
    let rt = HostRuntime::new().with_capabilities([UNIFIED_MEMORY]);
    let outcome = hw_test_with(Arc::new(rt), &Requirements::none(), MemoryModelKind::Shared, |ctx| {
        assert!(ctx.capabilities().contains(UNIFIED_MEMORY));
        let mem = ctx.memory();
        let h = mem.upload(&[1u32, 2, 3], Placement::HostPreferred)?;
        let back: Vec<u32> = mem.read_pod(&h)?;
        assert_eq!(back, vec![1, 2, 3]);
        Ok(())
    });
    assert!(outcome.is_passed(), "{outcome}");
}

#[test]
fn motion_estimation_gate_on_default_host_device() {
    let outcome = hw_test(
        Arc::new(HostRuntime::new()),
        &Requirements::none().with(MOTION_ESTIMATION),
        |_| Ok(()),
    );
    assert!(outcome.is_skipped());
}
