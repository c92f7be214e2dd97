//! Result aggregation.
//!
//! Turns whatever an executor managed to report into a verdict with exactly
//! one outcome per test case. Pure: no I/O, inputs are consumed, not mutated.

use crate::model::{ErrorKind, ExecutionOutcome, SubmissionVerdict, TestCase};

/// What an executor reports back, possibly cut short.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutorRun {
    /// Outcomes in test-case order. May be shorter than the test-case list.
    pub outcomes: Vec<ExecutionOutcome>,
    /// Set when a whole-submission failure stopped the run early.
    pub interruption: Option<Interruption>,
}

/// A whole-submission failure that truncated an otherwise started run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interruption {
    pub kind: ErrorKind,
    pub message: String,
}

impl ExecutorRun {
    pub const fn complete(outcomes: Vec<ExecutionOutcome>) -> Self {
        Self {
            outcomes,
            interruption: None,
        }
    }

    pub fn interrupted(
        outcomes: Vec<ExecutionOutcome>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            outcomes,
            interruption: Some(Interruption {
                kind,
                message: message.into(),
            }),
        }
    }
}

/// Pad missing trailing outcomes with `NotRun` and build the verdict.
pub fn aggregate(test_cases: &[TestCase], run: ExecutorRun) -> SubmissionVerdict {
    let ExecutorRun {
        mut outcomes,
        interruption,
    } = run;

    outcomes.truncate(test_cases.len());
    let reported = outcomes.len();
    outcomes.extend(
        test_cases[reported..]
            .iter()
            .map(|case| ExecutionOutcome::not_run(case.id.as_str())),
    );

    let (overall_error, overall_message) =
        interruption.map_or((None, None), |i| (Some(i.kind), Some(i.message)));

    SubmissionVerdict {
        outcomes,
        overall_error,
        overall_message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cases(n: usize) -> Vec<TestCase> {
        (0..n)
            .map(|i| TestCase::new(format!("t{i}"), i.to_string(), i.to_string()))
            .collect()
    }

    #[test]
    fn complete_run_passes_through() {
        let cases = cases(2);
        let run = ExecutorRun::complete(vec![
            ExecutionOutcome::completed("t0", json!(0), json!(0), 1.0),
            ExecutionOutcome::completed("t1", json!(2), json!(1), 1.0),
        ]);

        let verdict = aggregate(&cases, run);
        assert_eq!(verdict.outcomes.len(), 2);
        assert!(verdict.outcomes[0].passed);
        assert!(!verdict.outcomes[1].passed);
        assert!(verdict.overall_error.is_none());
    }

    #[test]
    fn truncated_run_is_padded_in_order() {
        let cases = cases(4);
        let run = ExecutorRun::interrupted(
            vec![
                ExecutionOutcome::completed("t0", json!(0), json!(0), 1.0),
                ExecutionOutcome::failed("t1", ErrorKind::Timeout, "killed", None, 5000.0),
            ],
            ErrorKind::Timeout,
            "Time limit of 5000 ms exceeded",
        );

        let verdict = aggregate(&cases, run);
        assert_eq!(verdict.overall_error, Some(ErrorKind::Timeout));
        assert_eq!(verdict.outcomes.len(), cases.len());
        for (outcome, case) in verdict.outcomes.iter().zip(&cases) {
            assert_eq!(outcome.test_case_id, case.id);
        }
        assert_eq!(verdict.outcomes[2].error_kind, Some(ErrorKind::NotRun));
        assert_eq!(verdict.outcomes[3].error_kind, Some(ErrorKind::NotRun));
    }

    #[test]
    fn surplus_outcomes_are_dropped() {
        let cases = cases(1);
        let run = ExecutorRun::complete(vec![
            ExecutionOutcome::completed("t0", json!(0), json!(0), 1.0),
            ExecutionOutcome::completed("stray", json!(0), json!(0), 1.0),
        ]);
        assert_eq!(aggregate(&cases, run).outcomes.len(), 1);
    }

    #[test]
    fn empty_submission() {
        let verdict = aggregate(&[], ExecutorRun::default());
        assert!(verdict.outcomes.is_empty());
        assert!(verdict.overall_error.is_none());
    }
}
