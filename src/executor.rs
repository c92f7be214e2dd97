//! Executor trait and implementations.
//!
//! An executor runs one submission's test cases for a family of languages.
//! The dispatcher picks exactly one executor per submission; executors never
//! share state between calls.

mod harness;
mod process;
pub mod protocol;
mod sandbox;
mod scope;

pub use process::ProcessExecutor;
pub use sandbox::SandboxExecutor;
pub use scope::SandboxScope;

use async_trait::async_trait;

use crate::aggregate::ExecutorRun;
use crate::error::JudgeError;
use crate::model::Submission;

/// Trait for execution backends.
///
/// Structural failures (syntax, entry point) come back as `Err` before any
/// test case runs. Everything that happens after the first test case starts is
/// encoded in the returned [`ExecutorRun`].
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, submission: &Submission) -> Result<ExecutorRun, JudgeError>;
}

/// Pick the entry point from the structurally discovered top-level callables.
///
/// `candidates` is in definition order; a name defined twice counts once.
pub(crate) fn select_entry(
    candidates: Vec<String>,
    requested: Option<&str>,
) -> Result<String, JudgeError> {
    let mut unique: Vec<String> = Vec::with_capacity(candidates.len());
    for name in candidates {
        if !unique.contains(&name) {
            unique.push(name);
        }
    }

    if let Some(name) = requested {
        return unique
            .into_iter()
            .find(|candidate| candidate == name)
            .ok_or_else(|| JudgeError::NoEntryPoint(Some(name.to_string())));
    }

    match unique.len() {
        0 => Err(JudgeError::NoEntryPoint(None)),
        1 => Ok(unique.remove(0)),
        _ => Err(JudgeError::AmbiguousEntryPoint(unique)),
    }
}
