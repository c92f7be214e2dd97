//! Submission, test case and verdict types.
//!
//! Everything here is created at the start of one `judge()` call and consumed
//! by its return. Field names follow the camelCase wire shape the platform
//! persists.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::canonical_eq;
use crate::error::JudgeError;

/// A candidate's code plus the question's test cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub source_code: String,
    /// Declared language tag, resolved with [`Language::from_str`].
    pub language: String,
    pub test_cases: Vec<TestCase>,
    /// Optional name of the function to call. When absent the submission
    /// must define exactly one top-level function.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
}

/// One input/expected-output pair.
///
/// `input` is a comma-separated list of JSON values (the inside of a JSON
/// array); `expected_output` is a single JSON value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: String,
    pub input: String,
    pub expected_output: String,
}

impl TestCase {
    pub fn new(
        id: impl Into<String>,
        input: impl Into<String>,
        expected_output: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            input: input.into(),
            expected_output: expected_output.into(),
        }
    }

    /// Parse `input` into an argument list.
    pub fn arguments(&self) -> Result<Vec<Value>, String> {
        serde_json::from_str::<Vec<Value>>(&format!("[{}]", self.input))
            .map_err(|e| format!("input is not a valid argument list: {e}"))
    }

    /// Parse `expected_output` into a single value.
    pub fn expected(&self) -> Result<Value, String> {
        serde_json::from_str(&self.expected_output)
            .map_err(|e| format!("expected output is not a valid value: {e}"))
    }
}

/// Languages the judge accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    JavaScript,
    Python,
}

/// Which executor family runs a language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutorKind {
    /// Embedded interpreter inside the judge process.
    InProcess,
    /// One fresh OS process per submission.
    IsolatedProcess,
}

impl Language {
    pub const fn executor_kind(self) -> ExecutorKind {
        match self {
            Self::JavaScript => ExecutorKind::InProcess,
            Self::Python => ExecutorKind::IsolatedProcess,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::Python => "python",
        }
    }
}

impl FromStr for Language {
    type Err = JudgeError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "javascript" | "js" | "node" => Ok(Self::JavaScript),
            "python" | "python3" | "py" => Ok(Self::Python),
            _ => Err(JudgeError::UnsupportedLanguage(tag.to_string())),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure taxonomy shared by per-test outcomes and whole-submission errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    UnsupportedLanguage,
    SyntaxError,
    NoEntryPoint,
    AmbiguousEntryPoint,
    MalformedTestData,
    RuntimeError,
    Timeout,
    OutputDecodeError,
    NotRun,
}

/// Result of running one test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub test_case_id: String,
    pub passed: bool,
    pub output: Option<Value>,
    pub expected_output: Option<Value>,
    pub execution_time_ms: f64,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
}

impl ExecutionOutcome {
    /// The entry point returned normally; `passed` is decided by canonical equality.
    pub fn completed(
        test_case_id: impl Into<String>,
        output: Value,
        expected_output: Value,
        execution_time_ms: f64,
    ) -> Self {
        Self {
            test_case_id: test_case_id.into(),
            passed: canonical_eq(&output, &expected_output),
            output: Some(output),
            expected_output: Some(expected_output),
            execution_time_ms,
            error_kind: None,
            error_message: None,
        }
    }

    pub fn failed(
        test_case_id: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
        expected_output: Option<Value>,
        execution_time_ms: f64,
    ) -> Self {
        Self {
            test_case_id: test_case_id.into(),
            passed: false,
            output: None,
            expected_output,
            execution_time_ms,
            error_kind: Some(kind),
            error_message: Some(message.into()),
        }
    }

    /// Padding for a case the executor never reached.
    pub fn not_run(test_case_id: impl Into<String>) -> Self {
        Self {
            test_case_id: test_case_id.into(),
            passed: false,
            output: None,
            expected_output: None,
            execution_time_ms: 0.0,
            error_kind: Some(ErrorKind::NotRun),
            error_message: None,
        }
    }
}

/// The complete result of judging one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionVerdict {
    pub outcomes: Vec<ExecutionOutcome>,
    pub overall_error: Option<ErrorKind>,
    /// Diagnostic accompanying `overall_error`.
    pub overall_message: Option<String>,
}

impl SubmissionVerdict {
    /// Verdict for a failure that prevented any test case from running.
    pub fn structural(err: &JudgeError) -> Self {
        Self {
            outcomes: Vec::new(),
            overall_error: Some(err.kind()),
            overall_message: Some(err.to_string()),
        }
    }

    pub fn passed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed).count()
    }

    /// Score summary over the `test_cases` the question defines. `points` is
    /// the question's weight; it defaults to one point per test case.
    #[allow(clippy::cast_precision_loss)]
    pub fn summary(&self, test_cases: usize, points: Option<f64>) -> VerdictSummary {
        let passed_tests = self.passed_count();
        let average_execution_time_ms = if self.outcomes.is_empty() {
            0.0
        } else {
            let elapsed: f64 = self.outcomes.iter().map(|o| o.execution_time_ms).sum();
            elapsed / self.outcomes.len() as f64
        };
        let score = if test_cases == 0 {
            0.0
        } else {
            let total = test_cases as f64;
            passed_tests as f64 / total * points.unwrap_or(total)
        };

        VerdictSummary {
            total_tests: test_cases,
            passed_tests,
            average_execution_time_ms,
            score,
        }
    }
}

/// Aggregate numbers shown next to a verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerdictSummary {
    pub total_tests: usize,
    pub passed_tests: usize,
    pub average_execution_time_ms: f64,
    pub score: f64,
}
