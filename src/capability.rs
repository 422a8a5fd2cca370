// capability.rs - Device capability sets and the skip-on-unsupported gate.
//
// A device reports a set of lowercase feature identifiers once per run.
// Samples and hardware tests declare the features they need; the gate
// compares the two and answers Proceed or Skip(reason). A skip is never a
// failure: `Application::run` maps it to `ExitStatus::Skipped` and the test
// harness maps it to `TestOutcome::Skipped`.

use std::collections::BTreeSet;
use std::fmt;

/// Host and device share one address space (wgpu: `MAPPABLE_PRIMARY_BUFFERS`).
pub const UNIFIED_MEMORY: &str = "unified_memory";
/// Fixed-function video motion estimation.
pub const MOTION_ESTIMATION: &str = "motion_estimation";
pub const SHADER_F16: &str = "shader_f16";
pub const SHADER_INT64: &str = "shader_int64";
pub const TIMESTAMP_QUERY: &str = "timestamp_query";
pub const SUBGROUPS: &str = "subgroups";
pub const DISCRETE_GPU: &str = "discrete_gpu";
pub const INTEGRATED_GPU: &str = "integrated_gpu";

/// Features reported by the selected device. Immutable after construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCapabilitySet {
    features: BTreeSet<String>,
}

impl DeviceCapabilitySet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, feature: &str) -> bool {
        self.features.contains(&normalize(feature))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.features.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for DeviceCapabilitySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        DeviceCapabilitySet {
            features: iter.into_iter().map(|s| normalize(s.as_ref())).collect(),
        }
    }
}

impl fmt::Display for DeviceCapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.features.is_empty() {
            return write!(f, "(none)");
        }
        let names: Vec<&str> = self.iter().collect();
        write!(f, "{}", names.join(", "))
    }
}

/// Features a sample or test needs before it may run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirements {
    needed: BTreeSet<String>,
}

impl Requirements {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with(mut self, feature: &str) -> Self {
        self.needed.insert(normalize(feature));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.needed.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.needed.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for Requirements {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Requirements {
            needed: iter.into_iter().map(|s| normalize(s.as_ref())).collect(),
        }
    }
}

/// Outcome of a capability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    Skip(String),
}

impl Decision {
    pub fn is_skip(&self) -> bool {
        matches!(self, Decision::Skip(_))
    }
}

/// Check `needed` against the capabilities of the selected device.
///
/// `device` is `None` when no compute device could be found at all; that
/// case is a skip too, regardless of what was needed.
pub fn require(device: Option<&DeviceCapabilitySet>, needed: &Requirements) -> Decision {
    let Some(caps) = device else {
        return Decision::Skip("no compute device available".to_string());
    };

    let missing: Vec<&str> = needed.iter().filter(|f| !caps.contains(f)).collect();
    if missing.is_empty() {
        Decision::Proceed
    } else if missing.len() == 1 {
        Decision::Skip(format!("device does not support `{}`", missing[0]))
    } else {
        Decision::Skip(format!("device does not support `{}`", missing.join("`, `")))
    }
}

fn normalize(feature: &str) -> String {
    feature.trim().to_ascii_lowercase().replace('-', "_")
}
