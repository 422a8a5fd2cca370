// logging.rs - Process-wide tracing setup and the `Logger` handle.
//
// `init_logging` runs once, before any `Application` exists. A small clap
// command picks `--log-level` and `--log-format` out of the raw command line
// and lets every other argument through (the sample's own parser runs later
// and declares the same flags in `HarnessArgs`). It then installs a
// `tracing_subscriber::fmt` subscriber writing to stderr, and returns a
// `Logger` that is passed by reference into `Application::run`.
//
// RUST_LOG, when set, takes precedence over `--log-level`.
//
// A second call in the same process cannot replace the global subscriber;
// it returns a Logger with `is_installed() == false` instead of failing.

use std::fmt;

use clap::Arg;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::{BuildError, SampleError};
use crate::validation::ValidationError;

pub const DEFAULT_LEVEL: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    Pretty,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Full => write!(f, "full"),
            LogFormat::Compact => write!(f, "compact"),
            LogFormat::Pretty => write!(f, "pretty"),
        }
    }
}

/// Handle to the initialized logging state. Diagnostics that end a sample
/// run are reported through it.
#[derive(Debug, Clone)]
pub struct Logger {
    installed: bool,
}

impl Logger {
    /// False when a subscriber was already installed by an earlier call.
    pub fn is_installed(&self) -> bool {
        self.installed
    }

    /// Full compiler log of a failed build.
    pub fn build_failure(&self, err: &BuildError) {
        error!(
            source = %err.source_id,
            options = %err.options,
            "program build failed, compiler log:\n{}",
            err.log
        );
    }

    pub fn validation_failure(&self, err: &ValidationError) {
        error!(what = %err.what, mismatches = err.mismatches, "validation failed: {err}");
    }

    pub fn skipped(&self, sample: &str, reason: &str) {
        warn!(sample, "SKIPPED: {reason}");
    }

    pub fn failure(&self, sample: &str, err: &SampleError) {
        match err {
            SampleError::Build(b) => self.build_failure(b),
            SampleError::Validation(v) => self.validation_failure(v),
            other => error!(sample, "sample failed: {other}"),
        }
    }

    pub fn success(&self, sample: &str) {
        info!(sample, "PASSED");
    }
}

/// Initialize logging from the raw command line (program name first).
pub fn init_logging<S: AsRef<str>>(command_line: &[S]) -> Logger {
    let (level, format) = logging_flags(command_line);
    init(&level, format)
}

/// `--log-level` and `--log-format` from a command line that also carries
/// arguments this parser does not know about. Those land in `rest`.
fn logging_flags<S: AsRef<str>>(command_line: &[S]) -> (String, LogFormat) {
    let cmd = clap::Command::new("logging")
        .disable_help_flag(true)
        .disable_version_flag(true)
        .ignore_errors(true)
        .arg(Arg::new("log-level").long("log-level").default_value(DEFAULT_LEVEL))
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_parser(clap::value_parser!(LogFormat))
                .default_value("full"),
        )
        .arg(Arg::new("rest").num_args(0..).allow_hyphen_values(true));

    let matches = cmd.get_matches_from(command_line.iter().map(AsRef::as_ref));
    let level = matches
        .get_one::<String>("log-level")
        .cloned()
        .unwrap_or_else(|| DEFAULT_LEVEL.to_string());
    let format = matches.get_one::<LogFormat>("log-format").copied().unwrap_or_default();
    (level, format)
}

/// Initialize logging with an explicit level and format.
pub fn init(level: &str, format: LogFormat) -> Logger {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = match format {
        LogFormat::Full => builder.try_init().is_ok(),
        LogFormat::Compact => builder.compact().try_init().is_ok(),
        LogFormat::Pretty => builder.pretty().try_init().is_ok(),
    };
    if !installed {
        tracing::debug!("logging already initialized; keeping the existing subscriber");
    }

    Logger { installed }
}
