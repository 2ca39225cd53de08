// src/exec/exit_code.rs

//! Exit code → failure class.
//!
//! Only the exit code is looked at; stderr content never influences the
//! classification.

use std::fmt;

/// Exit code the container runtime reports for an unspecified crash. A
/// possible-error code announced on stdout replaces it.
pub const GENERIC_FAILURE: i32 = 1;
pub const OUT_OF_MEMORY: i32 = 137;
pub const WORKING_DIRECTORY_ERROR: i32 = 125;

/// Classification of a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    Success,
    OutOfMemory,
    WorkingDirectoryError,
    Undefined(i32),
}

impl ExitClass {
    pub fn classify(code: i32) -> Self {
        match code {
            0 => ExitClass::Success,
            OUT_OF_MEMORY => ExitClass::OutOfMemory,
            WORKING_DIRECTORY_ERROR => ExitClass::WorkingDirectoryError,
            other => ExitClass::Undefined(other),
        }
    }

    /// Classify `code`, letting a previously announced crash code stand in
    /// for the generic failure code.
    pub fn classify_with_prediction(code: i32, predicted: Option<i32>) -> Self {
        Self::classify(effective_exit_code(code, predicted))
    }

    pub fn is_success(self) -> bool {
        self == ExitClass::Success
    }

    /// Human-readable explanation suitable for end users.
    pub fn describe(self) -> String {
        match self {
            ExitClass::Success => "the job finished successfully".to_string(),
            ExitClass::OutOfMemory => {
                "the job ran out of memory; assign more RAM to the container runtime or use a smaller image"
                    .to_string()
            }
            ExitClass::WorkingDirectoryError => {
                "the container runtime could not access the scratch directory; check that the drive is shared"
                    .to_string()
            }
            ExitClass::Undefined(code) => format!("the job failed with exit code {code}"),
        }
    }
}

impl fmt::Display for ExitClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitClass::Success => write!(f, "success"),
            ExitClass::OutOfMemory => write!(f, "out of memory"),
            ExitClass::WorkingDirectoryError => write!(f, "working directory error"),
            ExitClass::Undefined(code) => write!(f, "undefined failure ({code})"),
        }
    }
}

/// Apply the possible-error substitution. Only positive predictions count.
pub fn effective_exit_code(code: i32, predicted: Option<i32>) -> i32 {
    match predicted {
        Some(p) if p > 0 && code == GENERIC_FAILURE => p,
        _ => code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes() {
        assert_eq!(ExitClass::classify(0), ExitClass::Success);
        assert_eq!(ExitClass::classify(137), ExitClass::OutOfMemory);
        assert_eq!(ExitClass::classify(125), ExitClass::WorkingDirectoryError);
    }

    #[test]
    fn other_codes_are_reported_verbatim() {
        for code in [1, 2, 124, 126, 138, 255, -1] {
            assert_eq!(ExitClass::classify(code), ExitClass::Undefined(code));
        }
    }

    #[test]
    fn prediction_replaces_generic_failure_only() {
        assert_eq!(
            ExitClass::classify_with_prediction(1, Some(137)),
            ExitClass::OutOfMemory
        );
        assert_eq!(
            ExitClass::classify_with_prediction(1, Some(42)),
            ExitClass::Undefined(42)
        );
        assert_eq!(
            ExitClass::classify_with_prediction(2, Some(137)),
            ExitClass::Undefined(2)
        );
        assert_eq!(
            ExitClass::classify_with_prediction(0, Some(137)),
            ExitClass::Success
        );
    }

    #[test]
    fn absent_or_non_positive_prediction_is_ignored() {
        assert_eq!(
            ExitClass::classify_with_prediction(1, None),
            ExitClass::Undefined(1)
        );
        assert_eq!(
            ExitClass::classify_with_prediction(1, Some(0)),
            ExitClass::Undefined(1)
        );
        assert_eq!(
            ExitClass::classify_with_prediction(1, Some(-3)),
            ExitClass::Undefined(1)
        );
    }

    #[test]
    fn descriptions_mention_the_code_for_undefined_failures() {
        assert!(ExitClass::Undefined(3).describe().contains("exit code 3"));
        assert!(ExitClass::OutOfMemory.describe().contains("memory"));
    }
}
