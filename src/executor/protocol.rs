//! Harness record protocol.
//!
//! The generated harness writes one JSON object per line on stdout, one per
//! test case, in test-case order:
//!
//! ```json
//! {"testCaseId":"t1","passed":true,"executionTimeMs":0.4,"output":5,"expectedOutput":5,"error":null}
//! ```
//!
//! `error` is `null` on success or `{"kind": <ErrorKind>, "message": <text>}`.
//! This is the only contract between the judge and a spawned runtime.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::model::{ErrorKind, ExecutionOutcome, TestCase};

/// One per-test-case record emitted by a harness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarnessRecord {
    pub test_case_id: String,
    pub passed: bool,
    pub execution_time_ms: f64,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub expected_output: Option<Value>,
    pub error: Option<RecordError>,
}

/// Failure carried by a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Decode one line of harness output.
pub fn decode_record(line: &str) -> serde_json::Result<HarnessRecord> {
    serde_json::from_str(line)
}

impl HarnessRecord {
    /// Convert to an outcome. `passed` is recomputed by the judge; the
    /// harness's own verdict is only compared for diagnostics.
    pub fn into_outcome(self) -> ExecutionOutcome {
        match self.error {
            Some(error) => ExecutionOutcome::failed(
                self.test_case_id,
                error.kind,
                error.message,
                self.expected_output,
                self.execution_time_ms,
            ),
            None => {
                let claimed = self.passed;
                let outcome = ExecutionOutcome::completed(
                    self.test_case_id,
                    self.output.unwrap_or(Value::Null),
                    self.expected_output.unwrap_or(Value::Null),
                    self.execution_time_ms,
                );
                if outcome.passed != claimed {
                    debug!(
                        test_case = %outcome.test_case_id,
                        claimed,
                        judged = outcome.passed,
                        "Harness verdict differs from canonical comparison"
                    );
                }
                outcome
            }
        }
    }
}

/// Places decoded records into per-test-case slots as they stream in.
///
/// Records are matched to the first unreported test case with the same id.
/// Lines that cannot be decoded are charged to the first unreported test case,
/// since the harness reports strictly in order.
#[derive(Debug)]
pub struct RecordCollector<'a> {
    cases: &'a [TestCase],
    slots: Vec<Option<ExecutionOutcome>>,
}

impl<'a> RecordCollector<'a> {
    pub fn new(cases: &'a [TestCase]) -> Self {
        Self {
            cases,
            slots: vec![None; cases.len()],
        }
    }

    /// Feed one line of harness stdout.
    pub fn accept_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match decode_record(line) {
            Ok(record) => self.accept_record(record),
            Err(e) => self.accept_undecodable(&format!("undecodable harness output: {e}")),
        }
    }

    pub fn accept_record(&mut self, record: HarnessRecord) {
        let slot = self
            .slots
            .iter()
            .zip(self.cases)
            .position(|(slot, case)| slot.is_none() && case.id == record.test_case_id);

        match slot {
            Some(index) => self.slots[index] = Some(record.into_outcome()),
            None => warn!(
                test_case = %record.test_case_id,
                "Dropping record for unknown or already reported test case"
            ),
        }
    }

    /// Charge an undecodable line to the next unreported test case.
    pub fn accept_undecodable(&mut self, message: &str) {
        self.fail_pending(ErrorKind::OutputDecodeError, message);
    }

    /// Mark the next unreported test case as failed. Returns false when
    /// every test case already has an outcome.
    pub fn fail_pending(&mut self, kind: ErrorKind, message: &str) -> bool {
        let Some(index) = self.next_pending() else {
            warn!(kind = ?kind, message, "No pending test case to attribute failure to");
            return false;
        };
        self.slots[index] = Some(ExecutionOutcome::failed(
            self.cases[index].id.as_str(),
            kind,
            message,
            self.cases[index].expected().ok(),
            0.0,
        ));
        true
    }

    pub fn next_pending(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    pub fn reported(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.next_pending().is_none()
    }

    /// Outcomes up to the last reported test case. Gaps before it become
    /// `NotRun`; trailing unreported cases are left for the aggregator.
    pub fn finish(self) -> Vec<ExecutionOutcome> {
        let Some(last) = self.slots.iter().rposition(Option::is_some) else {
            return Vec::new();
        };
        self.slots
            .into_iter()
            .zip(self.cases)
            .take(last + 1)
            .map(|(slot, case)| slot.unwrap_or_else(|| ExecutionOutcome::not_run(case.id.as_str())))
            .collect()
    }
}
