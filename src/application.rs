// application.rs - The uniform command-line lifecycle every sample follows.
//
// A sample implements `Application`: its name, its arguments, the
// capabilities and memory model it needs, and a body. `run` does the rest:
//
//   Init -> DeviceAcquired -> ProgramBuilt -> MemoryPrepared -> Dispatched
//        -> Validated -> Terminated
//
// with Skipped or Failed replacing the tail when the capability gate says
// skip or anything returns an error. `run` is the only place errors become
// an exit status; nothing is retried.

use std::sync::Arc;

use clap::{Args, FromArgMatches};
use tracing::{debug, error};

use crate::capability::Requirements;
use crate::config::{Backend, HarnessArgs, HarnessConfig};
use crate::error::{Result, SampleError};
use crate::gpu::WgpuRuntime;
use crate::logging::{init_logging, Logger};
use crate::memory::MemoryModelKind;
use crate::runtime::host::{HostKernel, HostRuntime};
use crate::runtime::RuntimeAdapter;
use crate::session::{acquire, Acquisition, RunPhase, SampleContext};

/// Process-level outcome of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Failure,
    /// Not a failure: the device lacks something the sample needs.
    Skipped,
}

impl ExitStatus {
    pub fn code(&self) -> u8 {
        match self {
            ExitStatus::Success | ExitStatus::Skipped => 0,
            ExitStatus::Failure => 1,
        }
    }
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        std::process::ExitCode::from(status.code())
    }
}

/// What happened during a run, for callers that need more than the status.
#[derive(Debug)]
pub struct RunReport {
    pub status: ExitStatus,
    pub phases: Vec<RunPhase>,
    pub skip_reason: Option<String>,
    pub error: Option<SampleError>,
}

/// A runnable sample.
pub trait Application {
    /// Sample-specific command-line arguments.
    type Args: Args;

    fn name(&self) -> &'static str;

    fn about(&self) -> &'static str {
        ""
    }

    /// Device features the sample cannot run without.
    fn requirements(&self, _args: &Self::Args) -> Requirements {
        Requirements::none()
    }

    fn memory_model(&self, _args: &Self::Args) -> MemoryModelKind {
        MemoryModelKind::Explicit
    }

    /// Host implementations of the sample's kernels, for the host backend.
    fn host_kernels(&self) -> Vec<(&'static str, HostKernel)> {
        Vec::new()
    }

    /// The body: build, prepare memory, dispatch, validate.
    fn run_sample(&self, ctx: &mut SampleContext, args: &Self::Args) -> Result<()>;

    /// Parse `command_line` (program name first) and run once.
    fn run<S: AsRef<str>>(&self, command_line: &[S], logger: &Logger) -> ExitStatus
    where
        Self: Sized,
    {
        run_application(self, command_line, logger, None).status
    }
}

/// Process entry point shared by the sample binaries.
pub fn run_main<A: Application>(app: &A) -> std::process::ExitCode {
    let command_line: Vec<String> = std::env::args().collect();
    let logger = init_logging(&command_line);
    app.run(&command_line, &logger).into()
}

/// A host runtime with every kernel of `app` registered.
pub fn host_runtime_for<A: Application>(app: &A) -> HostRuntime {
    let mut runtime = HostRuntime::new();
    for (name, kernel) in app.host_kernels() {
        runtime.register_kernel(name, kernel);
    }
    runtime
}

fn runtime_for<A: Application>(app: &A, config: &HarnessConfig) -> Arc<dyn RuntimeAdapter> {
    match config.backend {
        Backend::Wgpu => Arc::new(WgpuRuntime::with_profile(config.profile)),
        Backend::Host => {
            Arc::new(host_runtime_for(app).with_capabilities(config.host_capabilities.clone()))
        }
    }
}

struct Parsed<A> {
    harness: HarnessArgs,
    sample: A,
}

enum ParseOutcome<A> {
    Args(Parsed<A>),
    /// --help or --version was printed.
    Exit,
}

fn parse<A: Application, S: AsRef<str>>(app: &A, command_line: &[S])
    -> Result<ParseOutcome<A::Args>>
{
    let cmd = clap::Command::new(app.name()).about(app.about());
    let cmd = HarnessArgs::augment_args(cmd);
    let cmd = A::Args::augment_args(cmd);

    let matches = match cmd.try_get_matches_from(command_line.iter().map(AsRef::as_ref)) {
        Ok(m) => m,
        Err(e) => match e.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                let _ = e.print();
                return Ok(ParseOutcome::Exit);
            }
            _ => return Err(SampleError::InvalidArgument(e.render().to_string())),
        },
    };

    let harness = HarnessArgs::from_arg_matches(&matches)
        .map_err(|e| SampleError::InvalidArgument(e.to_string()))?;
    let sample = A::Args::from_arg_matches(&matches)
        .map_err(|e| SampleError::InvalidArgument(e.to_string()))?;
    Ok(ParseOutcome::Args(Parsed { harness, sample }))
}

/// Run `app` once.
///
/// With `runtime` set, that adapter is used instead of the one
/// `--backend` selects; tests inject mock devices this way.
pub fn run_application<A: Application, S: AsRef<str>>(
    app: &A,
    command_line: &[S],
    logger: &Logger,
    runtime: Option<Arc<dyn RuntimeAdapter>>,
) -> RunReport {
    let mut phases = vec![RunPhase::Init];
    let outcome = run_phases(app, command_line, runtime, &mut phases);

    let mut report = match outcome {
        Ok(Outcome::Passed) => {
            logger.success(app.name());
            RunReport { status: ExitStatus::Success, phases, skip_reason: None, error: None }
        }
        Ok(Outcome::Exited) => {
            RunReport { status: ExitStatus::Success, phases, skip_reason: None, error: None }
        }
        Ok(Outcome::Skipped(reason)) => skipped(app, logger, phases, reason),
        Err(SampleError::CapabilityUnmet { feature }) => {
            skipped(app, logger, phases, format!("device does not support `{feature}`"))
        }
        Err(e) => {
            logger.failure(app.name(), &e);
            phases.push(RunPhase::Failed);
            RunReport { status: ExitStatus::Failure, phases, skip_reason: None, error: Some(e) }
        }
    };

    report.phases.push(RunPhase::Terminated);
    debug!(sample = app.name(), phases = ?report.phases, status = ?report.status, "run finished");
    report
}

fn skipped<A: Application>(app: &A, logger: &Logger, mut phases: Vec<RunPhase>, reason: String) -> RunReport {
    logger.skipped(app.name(), &reason);
    phases.push(RunPhase::Skipped);
    RunReport { status: ExitStatus::Skipped, phases, skip_reason: Some(reason), error: None }
}

enum Outcome {
    Passed,
    Skipped(String),
    /// Help or version text was printed; no sample ran.
    Exited,
}

fn run_phases<A: Application, S: AsRef<str>>(
    app: &A,
    command_line: &[S],
    runtime: Option<Arc<dyn RuntimeAdapter>>,
    phases: &mut Vec<RunPhase>,
) -> Result<Outcome> {
    let parsed = match parse(app, command_line)? {
        ParseOutcome::Args(p) => p,
        ParseOutcome::Exit => return Ok(Outcome::Exited),
    };
    let config = parsed.harness.to_config()?;
    let runtime = match runtime {
        Some(rt) => rt,
        None => runtime_for(app, &config),
    };

    let requirements = app.requirements(&parsed.sample);
    let memory = app.memory_model(&parsed.sample);
    let mut ctx = match acquire(runtime, &config, &requirements, memory, phases)? {
        Acquisition::Ready(ctx) => ctx,
        Acquisition::Skip(reason) => return Ok(Outcome::Skipped(reason)),
    };

    let result = app.run_sample(&mut ctx, &parsed.sample);
    phases.extend_from_slice(ctx.phases());
    let teardown = ctx.teardown();
    settle(result, teardown)?;
    Ok(Outcome::Passed)
}

/// Combine the body's result with the memory teardown that follows it.
/// The body's error wins; a teardown error is always logged.
fn settle(body: Result<()>, teardown: Result<()>) -> Result<()> {
    if let Err(e) = &teardown {
        error!("releasing sample memory failed: {e}");
    }
    body.and(teardown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(ExitStatus::Success.code(), 0);
        assert_eq!(ExitStatus::Skipped.code(), 0);
        assert_ne!(ExitStatus::Failure.code(), 0);
    }

    #[test]
    fn body_error_wins_over_teardown_error() {
        let body = Err(SampleError::invalid_argument("body"));
        let teardown = Err(SampleError::invalid_argument("teardown"));
        match settle(body, teardown) {
            Err(SampleError::InvalidArgument(msg)) => assert_eq!(msg, "body"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn teardown_error_fails_a_passing_body() {
        let teardown = Err(SampleError::invalid_argument("teardown"));
        assert!(matches!(settle(Ok(()), teardown), Err(SampleError::InvalidArgument(_))));
        assert!(settle(Ok(()), Ok(())).is_ok());
    }
}
