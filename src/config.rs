//! Judge configuration.
//!
//! Defaults cover the common case. A JSON document can be supplied through the
//! `JUDGE_CONFIG` environment variable or a file, and a handful of individual
//! environment variables override single fields on top of that.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

/// Environment variable holding a JSON [`JudgeConfig`].
pub const CONFIG_ENV: &str = "JUDGE_CONFIG";

/// Top-level configuration for the judge.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeConfig {
    /// In-process sandbox limits.
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Isolated-process limits.
    #[serde(default)]
    pub process: ProcessConfig,
}

/// Limits for the embedded interpreter.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxConfig {
    /// Wall-clock limit per test-case invocation.
    #[serde(default = "default_timeout_ms")]
    pub test_timeout_ms: u64,

    /// Heap limit for one sandbox instance.
    #[serde(default = "default_memory_limit")]
    pub memory_limit_bytes: usize,

    /// Interpreter stack limit.
    #[serde(default = "default_max_stack")]
    pub max_stack_bytes: usize,

    /// Console lines kept per invocation before further output is dropped.
    #[serde(default = "default_console_lines")]
    pub console_capture_lines: usize,
}

/// Limits for the spawned-interpreter path.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessConfig {
    /// Python interpreter to spawn (looked up on `PATH`).
    #[serde(default = "default_python")]
    pub python: String,

    /// Hard wall-clock budget for the whole process run.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum number of harness processes alive at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Bytes of stderr kept for diagnostics.
    #[serde(default = "default_max_stderr")]
    pub max_stderr_bytes: usize,

    /// Longest accepted harness record line.
    #[serde(default = "default_max_line")]
    pub max_line_bytes: usize,

    /// Parent directory for harness workspaces; the system temp dir if unset.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            test_timeout_ms: default_timeout_ms(),
            memory_limit_bytes: default_memory_limit(),
            max_stack_bytes: default_max_stack(),
            console_capture_lines: default_console_lines(),
        }
    }
}

impl SandboxConfig {
    pub const fn test_timeout(&self) -> Duration {
        Duration::from_millis(self.test_timeout_ms)
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            timeout_ms: default_timeout_ms(),
            max_concurrent: default_max_concurrent(),
            max_stderr_bytes: default_max_stderr(),
            max_line_bytes: default_max_line(),
            scratch_dir: None,
        }
    }
}

impl ProcessConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl JudgeConfig {
    /// Load configuration from `JUDGE_CONFIG`, falling back to defaults when
    /// it is not set, then apply per-field environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(json) => serde_json::from_str(&json).context("Failed to parse JUDGE_CONFIG")?,
            Err(std::env::VarError::NotPresent) => Self::default(),
            Err(e) => return Err(e).context("JUDGE_CONFIG is not valid unicode"),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a JSON file, then apply environment overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply single-field overrides.
    ///
    /// Reads `JUDGE_TEST_TIMEOUT_MS`, `JUDGE_PROCESS_TIMEOUT_MS`,
    /// `JUDGE_MAX_PROCESSES` and `JUDGE_PYTHON` through `lookup`. Values that
    /// do not parse are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(ms) = parse_override(&lookup, "JUDGE_TEST_TIMEOUT_MS") {
            self.sandbox.test_timeout_ms = ms;
        }
        if let Some(ms) = parse_override(&lookup, "JUDGE_PROCESS_TIMEOUT_MS") {
            self.process.timeout_ms = ms;
        }
        if let Some(limit) = parse_override(&lookup, "JUDGE_MAX_PROCESSES") {
            self.process.max_concurrent = limit;
        }
        if let Some(python) = lookup("JUDGE_PYTHON").filter(|p| !p.trim().is_empty()) {
            debug!(python = %python, "Overriding Python interpreter");
            self.process.python = python;
        }
    }

    /// Create a config from a JSON string (for testing).
    #[cfg(test)]
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse JSON")?;
        Ok(config)
    }
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable override");
            None
        }
    }
}

const fn default_timeout_ms() -> u64 {
    5000
}

const fn default_memory_limit() -> usize {
    64 * 1024 * 1024
}

const fn default_max_stack() -> usize {
    1024 * 1024
}

const fn default_console_lines() -> usize {
    200
}

fn default_python() -> String {
    "python3".into()
}

const fn default_max_concurrent() -> usize {
    4
}

const fn default_max_stderr() -> usize {
    64 * 1024
}

const fn default_max_line() -> usize {
    1024 * 1024
}
