// error.rs - Error taxonomy for the sample harness.
//
// Every component below `Application` returns `SampleError` (or one of the
// narrower types it wraps) and never retries. `application::run` is the only
// place where errors are turned into an exit status:
//
//   CapabilityUnmet           -> Skipped
//   everything else           -> Failure
//
// `RuntimeError` is the adapter-level taxonomy. It is kept separate so the
// two adapter implementations do not depend on harness concepts.

use std::path::PathBuf;

use crate::validation::ValidationError;

pub type Result<T> = std::result::Result<T, SampleError>;

/// Errors reported by a [`RuntimeAdapter`](crate::runtime::RuntimeAdapter).
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("no compute device available: {0}")]
    NoDevice(String),

    #[error("device request failed: {0}")]
    DeviceRequest(String),

    #[error("unknown {kind} id {id}")]
    UnknownObject { kind: &'static str, id: u64 },

    #[error("allocation of {size} bytes failed: {reason}")]
    Allocation { size: usize, reason: String },

    #[error("{0} is not supported by this device")]
    Unsupported(String),

    #[error("kernel entry point `{0}` not found in program")]
    KernelNotFound(String),

    #[error("kernel `{entry_point}` failed: {reason}")]
    KernelFailed { entry_point: String, reason: String },

    #[error("access to buffer {0} before its pending device work was synchronized")]
    NotSynchronized(u64),

    #[error("copy of {len} bytes at offset {offset} exceeds buffer size {size}")]
    OutOfBounds { offset: usize, len: usize, size: usize },

    #[error("buffer map failed: {0}")]
    Map(String),
}

/// A failed program build. Carries the complete compiler log.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to build `{source_id}` with options \"{options}\":\n{log}")]
pub struct BuildError {
    pub source_id: String,
    pub options: String,
    pub log: String,
}

/// Top-level harness error.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("required capability `{feature}` is not available")]
    CapabilityUnmet { feature: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("runtime adapter error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("memory handle {handle} released while device work referencing it is pending")]
    UseAfterFree { handle: u64 },

    #[error("memory handle {handle} accessed by the host before synchronization")]
    UnsynchronizedAccess { handle: u64 },

    #[error("memory handle {handle} is not valid: {reason}")]
    InvalidHandle { handle: u64, reason: &'static str },

    #[error("kernel source {path:?} could not be read: {error}")]
    SourceNotFound {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl SampleError {
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        SampleError::InvalidArgument(msg.into())
    }

    /// True for the one error class that maps to a skip instead of a failure.
    pub fn is_capability_unmet(&self) -> bool {
        matches!(self, SampleError::CapabilityUnmet { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_error_display_contains_log() {
        let err = BuildError {
            source_id: "median_filter.wgsl".into(),
            options: "-D WG_X=8".into(),
            log: "error: expected `;`".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("median_filter.wgsl"));
        assert!(msg.contains("expected `;`"));
    }

    #[test]
    fn only_capability_unmet_is_a_skip() {
        assert!(SampleError::CapabilityUnmet { feature: "motion_estimation".into() }
            .is_capability_unmet());
        assert!(!SampleError::invalid_argument("x").is_capability_unmet());
        assert!(!SampleError::from(RuntimeError::NoDevice("none".into())).is_capability_unmet());
    }
}
