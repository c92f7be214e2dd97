//! Python entry-point discovery and harness generation.
//!
//! The submission is parsed once in-process so that syntax errors and entry
//! point problems are reported without spawning anything. The generated
//! harness then imports the solution by path, reads the test cases from stdin
//! and writes one [`HarnessRecord`](super::protocol::HarnessRecord) per line.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rustpython_parser::{ast, Parse};
use tempfile::TempDir;
use tracing::{debug, warn};

use super::select_entry;
use crate::error::JudgeError;

pub const SOLUTION_FILE: &str = "solution.py";
pub const HARNESS_FILE: &str = "harness.py";

const ENTRY_PLACEHOLDER: &str = "__ENTRY__";
const SOLUTION_PLACEHOLDER: &str = "__SOLUTION__";

const HARNESS_TEMPLATE: &str = r#"import importlib.util
import json
import os
import sys
import time
import traceback

ENTRY = __ENTRY__
SOLUTION = __SOLUTION__

_records = os.fdopen(os.dup(1), "w", encoding="utf-8")
_devnull = os.open(os.devnull, os.O_WRONLY)
os.dup2(_devnull, 1)
sys.stdout = open(os.devnull, "w")


def emit(record):
    _records.write(json.dumps(record, allow_nan=False) + "\n")
    _records.flush()


def describe(exc):
    text = str(exc)
    name = type(exc).__name__
    return name + ": " + text if text else name


def reject_constant(name):
    raise ValueError("invalid JSON constant " + name)


def load_solution(path):
    located = importlib.util.spec_from_file_location("solution", path)
    module = importlib.util.module_from_spec(located)
    try:
        located.loader.exec_module(module)
    except BaseException as exc:
        frames = [
            traceback.FrameSummary(SOLUTION, frame.lineno, frame.name, line=frame.line)
            for frame in traceback.extract_tb(exc.__traceback__)
            if frame.filename == path
        ]
        if isinstance(exc, SyntaxError) and exc.filename == path:
            exc.filename = SOLUTION
        lines = traceback.format_list(frames) + traceback.format_exception_only(type(exc), exc)
        if frames:
            lines.insert(0, "Traceback (most recent call last):\n")
        sys.stderr.write("".join(lines))
        sys.stderr.flush()
        os._exit(1)
    return module


def main():
    cases = json.loads(sys.stdin.read())
    here = os.path.dirname(os.path.abspath(__file__))
    module = load_solution(os.path.join(here, SOLUTION))
    func = getattr(module, ENTRY)

    for case in cases:
        record = {
            "testCaseId": case["id"],
            "passed": False,
            "executionTimeMs": 0.0,
            "output": None,
            "expectedOutput": None,
            "error": None,
        }
        try:
            args = json.loads("[" + case["input"] + "]", parse_constant=reject_constant)
            expected = json.loads(case["expectedOutput"], parse_constant=reject_constant)
        except Exception as exc:
            record["error"] = {"kind": "MalformedTestData", "message": describe(exc)}
            emit(record)
            continue

        record["expectedOutput"] = expected
        start = time.perf_counter()
        try:
            output = func(*args)
        except BaseException as exc:
            record["executionTimeMs"] = (time.perf_counter() - start) * 1000.0
            record["error"] = {"kind": "RuntimeError", "message": describe(exc)}
            emit(record)
            continue
        record["executionTimeMs"] = (time.perf_counter() - start) * 1000.0

        try:
            json.dumps(output, allow_nan=False)
        except (TypeError, ValueError) as exc:
            record["error"] = {
                "kind": "RuntimeError",
                "message": "return value is not JSON-serializable: " + describe(exc),
            }
            emit(record)
            continue

        record["output"] = output
        record["passed"] = output == expected
        emit(record)


main()
"#;

/// Find the entry point of a Python submission.
///
/// Only `def` statements at module level count; nested functions, methods,
/// lambdas and `async def` are ignored.
pub fn discover_python_entry(source: &str, requested: Option<&str>) -> Result<String, JudgeError> {
    let suite = ast::Suite::parse(source, SOLUTION_FILE)
        .map_err(|e| JudgeError::Syntax(e.to_string()))?;

    let candidates = suite
        .iter()
        .filter_map(|stmt| match stmt {
            ast::Stmt::FunctionDef(def) => Some(def.name.as_str().to_string()),
            _ => None,
        })
        .collect();

    select_entry(candidates, requested)
}

/// Render the harness for `entry`.
pub fn generate_harness(entry: &str) -> String {
    // JSON string literals are valid Python string literals.
    let quote = |s: &str| serde_json::Value::from(s).to_string();
    HARNESS_TEMPLATE
        .replacen(ENTRY_PLACEHOLDER, &quote(entry), 1)
        .replacen(SOLUTION_PLACEHOLDER, &quote(SOLUTION_FILE), 1)
}

/// Scratch directory holding one submission's solution and harness.
///
/// Removed when dropped.
#[derive(Debug)]
pub struct HarnessWorkspace {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl HarnessWorkspace {
    pub fn create(source: &str, entry: &str, scratch_dir: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("judge-");
        let dir = match scratch_dir {
            Some(parent) => builder
                .tempdir_in(parent)
                .with_context(|| format!("Failed to create workspace in {}", parent.display()))?,
            None => builder.tempdir().context("Failed to create workspace")?,
        };

        std::fs::write(dir.path().join(SOLUTION_FILE), source)
            .context("Failed to write solution")?;
        std::fs::write(dir.path().join(HARNESS_FILE), generate_harness(entry))
            .context("Failed to write harness")?;

        debug!(path = %dir.path().display(), "Created harness workspace");
        Ok(Self {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for HarnessWorkspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                warn!(path = %self.path.display(), error = %e, "Failed to remove harness workspace");
            }
        }
    }
}
