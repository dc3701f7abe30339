use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::judge;
use crate::sandbox::RawExecutionResult;

/// Outcome of a single testcase execution attempt
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Passed,
    Failed,
    Error,
    Timeout,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Error => "ERROR",
            Self::Timeout => "TIMEOUT",
        }
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// Lifecycle of a submission
///
/// `Pending` and `Executing` are transient; the other three are terminal and
/// never left once entered.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Pending,
    Executing,
    Passed,
    Failed,
    Error,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Executing => "EXECUTING",
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed | Self::Error)
    }

    pub fn can_transition_to(&self, next: SubmissionStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Executing) => true,
            (Self::Executing, next) => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown variant `{0}`")]
pub struct UnknownVariant(pub String);

impl FromStr for SubmissionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "EXECUTING" => Ok(Self::Executing),
            "PASSED" => Ok(Self::Passed),
            "FAILED" => Ok(Self::Failed),
            "ERROR" => Ok(Self::Error),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl FromStr for Verdict {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PASSED" => Ok(Self::Passed),
            "FAILED" => Ok(Self::Failed),
            "ERROR" => Ok(Self::Error),
            "TIMEOUT" => Ok(Self::Timeout),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Classifies one run. A timeout wins over everything, then a non-zero or
/// missing exit code, and only a clean exit gets its stdout judged.
pub fn classify(raw: &RawExecutionResult, expected_output: &str) -> Verdict {
    if raw.timed_out {
        return Verdict::Timeout;
    }
    if raw.exit_code != Some(0) {
        return Verdict::Error;
    }
    if judge::compare(&raw.stdout, expected_output) {
        Verdict::Passed
    } else {
        Verdict::Failed
    }
}

/// Submission-level result folded from the per-testcase verdicts
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub status: SubmissionStatus,
    pub output: String,
    pub score: u32,
    pub passed: usize,
    pub total: usize,
}

impl Aggregate {
    /// A submission rejected before any testcase ran
    pub fn rejected(reason: impl Into<String>, total: usize) -> Self {
        Self {
            status: SubmissionStatus::Error,
            output: reason.into(),
            score: 0,
            passed: 0,
            total,
        }
    }
}

pub const NO_TESTCASES: &str = "No testcases configured";

/// Folds verdicts, given in testcase creation order, into a submission result
pub fn fold(verdicts: &[Verdict]) -> Aggregate {
    let total = verdicts.len();
    if total == 0 {
        return Aggregate::rejected(NO_TESTCASES, 0);
    }

    let passed = verdicts.iter().filter(|v| v.is_passed()).count();
    let any_error = verdicts.contains(&Verdict::Error);
    let any_timeout = verdicts.contains(&Verdict::Timeout);

    let (status, output) = if any_error {
        (SubmissionStatus::Error, "Runtime Error".to_string())
    } else if any_timeout {
        (SubmissionStatus::Failed, "Time Limit Exceeded".to_string())
    } else if passed == total {
        (SubmissionStatus::Passed, "Accepted".to_string())
    } else {
        (
            SubmissionStatus::Failed,
            format!("{passed}/{total} testcases passed"),
        )
    };

    Aggregate {
        status,
        output,
        score: score(passed, total),
        passed,
        total,
    }
}

/// `round(100 * passed / total)`, zero for an empty set
pub fn score(passed: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (100.0 * passed as f64 / total as f64).round() as u32
}
