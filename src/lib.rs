//! interview-judge library
//!
//! Runs a candidate's submission against a question's test cases and reports a
//! per-test verdict:
//! - JavaScript runs inside an embedded, capability-free interpreter
//! - Python runs in a fresh interpreter process per submission
//! - the judge is exposed as an MCP tool using rmcp

pub mod aggregate;
pub mod canonical;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod mcp;
pub mod model;

pub use config::JudgeConfig;
pub use dispatch::Judge;
pub use error::JudgeError;
pub use model::{
    ErrorKind, ExecutionOutcome, Language, Submission, SubmissionVerdict, TestCase,
    VerdictSummary,
};
