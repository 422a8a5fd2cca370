// test_harness.rs - Capability-gated hardware tests.
//
// Hardware tests declare the features they need and run their body against
// a ready `SampleContext`. The outcome is three-way: a device that lacks a
// feature produces `Skipped` (printed as "SKIPPED: <reason>"), never a
// failure. Rust's test runner has no skip state, so callers assert with
// `outcome.assert_not_failed()`; a skipped test then passes with the skip
// visible in its output.
//
//     let outcome = hw_test(runtime, &Requirements::none().with("motion_estimation"), |ctx| {
//         ...
//         Ok(())
//     });
//     outcome.assert_not_failed();

use std::fmt;
use std::sync::Arc;

use crate::capability::Requirements;
use crate::config::{Backend, HarnessConfig};
use crate::error::{Result, SampleError};
use crate::memory::MemoryModelKind;
use crate::runtime::RuntimeAdapter;
use crate::session::{acquire, Acquisition, SampleContext};

#[derive(Debug)]
pub enum TestOutcome {
    Passed,
    Failed(SampleError),
    Skipped(String),
}

impl TestOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, TestOutcome::Passed)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, TestOutcome::Skipped(_))
    }

    /// Panic on `Failed`; print the reason on `Skipped`.
    #[track_caller]
    pub fn assert_not_failed(&self) {
        match self {
            TestOutcome::Passed => {}
            TestOutcome::Skipped(reason) => println!("SKIPPED: {reason}"),
            TestOutcome::Failed(e) => panic!("hardware test failed: {e}"),
        }
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestOutcome::Passed => write!(f, "passed"),
            TestOutcome::Failed(e) => write!(f, "failed: {e}"),
            TestOutcome::Skipped(reason) => write!(f, "skipped: {reason}"),
        }
    }
}

/// Run `body` on `runtime` if the selected device satisfies `needed`.
pub fn hw_test<F>(runtime: Arc<dyn RuntimeAdapter>, needed: &Requirements, body: F) -> TestOutcome
where
    F: FnOnce(&mut SampleContext) -> Result<()>,
{
    hw_test_with(runtime, needed, MemoryModelKind::Explicit, body)
}

/// `hw_test` with an explicit memory model.
pub fn hw_test_with<F>(
    runtime: Arc<dyn RuntimeAdapter>,
    needed: &Requirements,
    memory: MemoryModelKind,
    body: F,
) -> TestOutcome
where
    F: FnOnce(&mut SampleContext) -> Result<()>,
{
    let backend = if runtime.backend_name() == "host" { Backend::Host } else { Backend::Wgpu };
    let config = HarnessConfig { backend, ..HarnessConfig::default() };

    let mut ctx = match acquire(runtime, &config, needed, memory, &mut Vec::new()) {
        Ok(Acquisition::Ready(ctx)) => ctx,
        Ok(Acquisition::Skip(reason)) => return TestOutcome::Skipped(reason),
        Err(e) => return TestOutcome::Failed(e),
    };

    let result = body(&mut *ctx).and_then(|()| ctx.teardown());
    match result {
        Ok(()) => TestOutcome::Passed,
        Err(SampleError::CapabilityUnmet { feature }) => {
            TestOutcome::Skipped(format!("device does not support `{feature}`"))
        }
        Err(e) => TestOutcome::Failed(e),
    }
}
