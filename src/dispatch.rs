//! Language dispatcher.
//!
//! `Judge` is the single entry point: it resolves the declared language,
//! hands the submission to exactly one executor and turns whatever comes back
//! into a verdict.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::aggregate::aggregate;
use crate::config::JudgeConfig;
use crate::executor::{Executor, ProcessExecutor, SandboxExecutor};
use crate::model::{ExecutorKind, Language, Submission, SubmissionVerdict};

/// Judges submissions. Cheap to clone and safe to share across tasks.
#[derive(Clone)]
pub struct Judge {
    in_process: Arc<dyn Executor>,
    isolated: Arc<dyn Executor>,
}

impl std::fmt::Debug for Judge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Judge").finish_non_exhaustive()
    }
}

impl Judge {
    /// Build a judge with the default executors.
    pub fn new(config: JudgeConfig) -> Self {
        Self::with_executors(
            Arc::new(SandboxExecutor::new(config.sandbox)),
            Arc::new(ProcessExecutor::new(config.process)),
        )
    }

    /// Build a judge over explicit executors.
    pub fn with_executors(in_process: Arc<dyn Executor>, isolated: Arc<dyn Executor>) -> Self {
        Self {
            in_process,
            isolated,
        }
    }

    /// Judge one submission. Never fails: every problem ends up in the verdict.
    #[instrument(skip_all, fields(language = %submission.language, tests = submission.test_cases.len()))]
    pub async fn judge(&self, submission: &Submission) -> SubmissionVerdict {
        let language = match submission.language.parse::<Language>() {
            Ok(language) => language,
            Err(err) => {
                warn!(error = %err, "Rejecting submission");
                return SubmissionVerdict::structural(&err);
            }
        };

        let executor = match language.executor_kind() {
            ExecutorKind::InProcess => &self.in_process,
            ExecutorKind::IsolatedProcess => &self.isolated,
        };

        let verdict = match executor.execute(submission).await {
            Ok(run) => aggregate(&submission.test_cases, run),
            Err(err) => SubmissionVerdict::structural(&err),
        };

        info!(
            language = %language,
            passed = verdict.passed_count(),
            overall_error = ?verdict.overall_error,
            "Submission judged"
        );
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ExecutorRun;
    use crate::error::JudgeError;
    use crate::model::{ErrorKind, ExecutionOutcome, TestCase};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Executor that reports a fixed result and counts calls.
    struct MockExecutor {
        calls: AtomicUsize,
        result: Result<usize, JudgeError>,
    }

    impl MockExecutor {
        fn passing(reported: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                result: Ok(reported),
            })
        }

        fn failing(err: JudgeError) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                result: Err(err),
            })
        }
    }

    #[async_trait]
    impl Executor for MockExecutor {
        async fn execute(&self, submission: &Submission) -> Result<ExecutorRun, JudgeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reported = self.result.clone()?;
            let outcomes = submission
                .test_cases
                .iter()
                .take(reported)
                .map(|case| ExecutionOutcome::completed(case.id.as_str(), json!(1), json!(1), 1.0))
                .collect();
            Ok(ExecutorRun::complete(outcomes))
        }
    }

    fn submission(language: &str) -> Submission {
        Submission {
            source_code: String::new(),
            language: language.into(),
            test_cases: vec![TestCase::new("a", "", "1"), TestCase::new("b", "", "1")],
            entry_point: None,
        }
    }

    #[tokio::test]
    async fn routes_to_exactly_one_executor() {
        let js = MockExecutor::passing(2);
        let py = MockExecutor::passing(2);
        let judge = Judge::with_executors(js.clone(), py.clone());

        let verdict = judge.judge(&submission("javascript")).await;
        assert_eq!(verdict.passed_count(), 2);
        assert_eq!(js.calls.load(Ordering::SeqCst), 1);
        assert_eq!(py.calls.load(Ordering::SeqCst), 0);

        judge.judge(&submission("Python")).await;
        assert_eq!(js.calls.load(Ordering::SeqCst), 1);
        assert_eq!(py.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsupported_language_invokes_nothing() {
        let js = MockExecutor::passing(2);
        let py = MockExecutor::passing(2);
        let judge = Judge::with_executors(js.clone(), py.clone());

        let verdict = judge.judge(&submission("ruby")).await;
        assert!(verdict.outcomes.is_empty());
        assert_eq!(verdict.overall_error, Some(ErrorKind::UnsupportedLanguage));
        assert_eq!(
            verdict.overall_message.as_deref(),
            Some("Unsupported language: 'ruby'")
        );
        assert_eq!(js.calls.load(Ordering::SeqCst) + py.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn structural_errors_become_verdicts() {
        let judge = Judge::with_executors(
            MockExecutor::failing(JudgeError::Syntax("unexpected token".into())),
            MockExecutor::passing(0),
        );

        let verdict = judge.judge(&submission("js")).await;
        assert!(verdict.outcomes.is_empty());
        assert_eq!(verdict.overall_error, Some(ErrorKind::SyntaxError));
    }

    #[tokio::test]
    async fn short_runs_are_padded() {
        let judge = Judge::with_executors(MockExecutor::passing(1), MockExecutor::passing(0));

        let verdict = judge.judge(&submission("node")).await;
        assert_eq!(verdict.outcomes.len(), 2);
        assert!(verdict.outcomes[0].passed);
        assert_eq!(verdict.outcomes[1].error_kind, Some(ErrorKind::NotRun));
        assert!(verdict.overall_error.is_none());
    }
}
