// validation.rs - Compare kernel output against a host reference.
//
// Samples validate exactly (integer images, copied bytes). A mismatch
// produces a `ValidationError` whose message is the expected-vs-actual
// summary printed by the harness: total mismatch count plus the first
// offending element.

use std::fmt;

/// First differing element of a failed comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub index: usize,
    pub expected: String,
    pub actual: String,
}

/// Kernel output did not match the reference.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}", self.summary())]
pub struct ValidationError {
    /// What was being compared, e.g. "median filter output".
    pub what: String,
    pub expected_len: usize,
    pub actual_len: usize,
    /// Number of differing elements over the common prefix.
    pub mismatches: usize,
    pub first: Option<Mismatch>,
}

impl ValidationError {
    pub fn summary(&self) -> String {
        let mut out = format!("{}: ", self.what);
        if self.expected_len != self.actual_len {
            out += &format!("expected {} elements, got {}", self.expected_len, self.actual_len);
            if self.mismatches == 0 {
                return out;
            }
            out += "; ";
        }
        out += &format!("{} of {} elements differ", self.mismatches, self.expected_len);
        if let Some(m) = &self.first {
            out += &format!("; first at index {}: expected {}, actual {}", m.index, m.expected, m.actual);
        }
        out
    }
}

/// Exact element-wise comparison.
pub fn compare_exact<T>(what: &str, expected: &[T], actual: &[T]) -> Result<(), ValidationError>
where
    T: PartialEq + fmt::Debug,
{
    let mut mismatches = 0usize;
    let mut first = None;
    for (index, (e, a)) in expected.iter().zip(actual).enumerate() {
        if e != a {
            mismatches += 1;
            if first.is_none() {
                first = Some(Mismatch {
                    index,
                    expected: format!("{e:?}"),
                    actual: format!("{a:?}"),
                });
            }
        }
    }

    if mismatches == 0 && expected.len() == actual.len() {
        return Ok(());
    }

    Err(ValidationError {
        what: what.to_string(),
        expected_len: expected.len(),
        actual_len: actual.len(),
        mismatches,
        first,
    })
}
