//! Structural failures that short-circuit a whole submission.
//!
//! Per-test failures never surface here; they are recorded on the
//! individual [`ExecutionOutcome`](crate::model::ExecutionOutcome).

use thiserror::Error;

use crate::model::ErrorKind;

/// A failure detected before (or instead of) running test cases.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JudgeError {
    #[error("Unsupported language: '{0}'")]
    UnsupportedLanguage(String),

    #[error("Syntax Error: {0}")]
    Syntax(String),

    #[error("{}", describe_missing(.0.as_deref()))]
    NoEntryPoint(Option<String>),

    #[error(
        "Ambiguous entry point: found {} top-level functions ({}); define exactly one",
        .0.len(),
        .0.join(", ")
    )]
    AmbiguousEntryPoint(Vec<String>),

    #[error("Runtime Error: {0}")]
    Runtime(String),

    #[error("Time limit of {0} ms exceeded")]
    Timeout(u64),

    /// Judge-side infrastructure failure (temp dir, spawn, task join).
    #[error("Execution Error: {0}")]
    Internal(String),
}

impl JudgeError {
    /// The verdict-level error kind this failure is reported as.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedLanguage(_) => ErrorKind::UnsupportedLanguage,
            Self::Syntax(_) => ErrorKind::SyntaxError,
            Self::NoEntryPoint(_) => ErrorKind::NoEntryPoint,
            Self::AmbiguousEntryPoint(_) => ErrorKind::AmbiguousEntryPoint,
            Self::Runtime(_) | Self::Internal(_) => ErrorKind::RuntimeError,
            Self::Timeout(_) => ErrorKind::Timeout,
        }
    }

    /// Wrap an infrastructure error, keeping its context chain.
    pub fn internal(err: &anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

fn describe_missing(requested: Option<&str>) -> String {
    requested.map_or_else(
        || "No entry point: the submission does not define a top-level function".to_string(),
        |name| format!("No entry point: top-level function '{name}' is not defined"),
    )
}
