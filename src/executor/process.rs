//! Isolated-process executor.
//!
//! Runs a Python submission by spawning the interpreter on a generated harness
//! in a private workspace. The child gets a cleared environment and its own
//! process group; the whole group is killed once the run is over, whichever
//! way it ended.

use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, instrument, warn};

use super::harness::{discover_python_entry, HarnessWorkspace, HARNESS_FILE};
use super::protocol::RecordCollector;
use super::Executor;
use crate::aggregate::ExecutorRun;
use crate::config::ProcessConfig;
use crate::error::JudgeError;
use crate::model::{ErrorKind, Submission};

/// Bound on each cleanup step once the group has been killed.
const CLEANUP_GRACE: Duration = Duration::from_secs(1);

/// Executor that runs each submission in a fresh interpreter process.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    config: ProcessConfig,
    limiter: Arc<Semaphore>,
}

impl ProcessExecutor {
    pub fn new(config: ProcessConfig) -> Self {
        let permits = config.max_concurrent.max(1);
        Self {
            config,
            limiter: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Spawn and drive one harness. The outer error is judge infrastructure;
    /// the inner one is a failure of the submission itself.
    async fn run(
        &self,
        submission: &Submission,
        entry: &str,
    ) -> Result<Result<ExecutorRun, JudgeError>> {
        let workspace = HarnessWorkspace::create(
            &submission.source_code,
            entry,
            self.config.scratch_dir.as_deref(),
        )?;
        let payload =
            serde_json::to_vec(&submission.test_cases).context("Failed to encode test cases")?;

        let mut cmd = Command::new(&self.config.python);
        cmd.args(["-I", "-B", HARNESS_FILE])
            .current_dir(workspace.path())
            .env_clear()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }

        let deadline = Instant::now() + self.config.timeout();
        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.config.python))?;
        let group = ProcessGroup::of(&child);
        debug!(pid = ?child.id(), "Spawned harness");

        let mut stdin = child.stdin.take().context("Failed to open stdin")?;
        let writer = tokio::spawn(async move {
            stdin.write_all(&payload).await?;
            stdin.shutdown().await
        });

        let stderr = child.stderr.take().context("Failed to open stderr")?;
        let stderr_task = tokio::spawn(capture_capped(stderr, self.config.max_stderr_bytes));

        let stdout = child.stdout.take().context("Failed to open stdout")?;
        let mut collector = RecordCollector::new(&submission.test_cases);
        let ended = read_records(
            BufReader::new(stdout),
            &mut collector,
            self.config.max_line_bytes,
            deadline,
        )
        .await;

        let status = match ended {
            StreamEnd::Eof => wait_until(&mut child, deadline).await,
            StreamEnd::TimedOut => Ok(None),
            StreamEnd::Failed(e) => {
                Err(anyhow::Error::new(e).context("Failed to read harness output"))
            }
        };

        // Nothing from this run may outlive it: kill the group, reap the harness.
        group.kill();
        reap(&mut child).await;
        settle_writer(writer).await;

        let stderr = match timeout(CLEANUP_GRACE, stderr_task).await {
            Ok(Ok(bytes)) => scrub_paths(String::from_utf8_lossy(&bytes).trim(), workspace.path()),
            _ => String::new(),
        };
        if !stderr.is_empty() {
            debug!(stderr = %stderr, "Harness stderr");
        }

        let Some(status) = status? else {
            let message = JudgeError::Timeout(self.config.timeout_ms).to_string();
            warn!(reported = collector.reported(), "Harness exceeded its time budget");
            if collector.is_complete() {
                return Ok(Ok(ExecutorRun::complete(collector.finish())));
            }
            collector.fail_pending(ErrorKind::Timeout, &message);
            return Ok(Ok(ExecutorRun::interrupted(
                collector.finish(),
                ErrorKind::Timeout,
                message,
            )));
        };

        Ok(settle(collector, status, stderr))
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    #[instrument(skip_all, fields(tests = submission.test_cases.len()))]
    async fn execute(&self, submission: &Submission) -> Result<ExecutorRun, JudgeError> {
        // Structural problems are reported without spawning anything.
        let entry = discover_python_entry(
            &submission.source_code,
            submission.entry_point.as_deref(),
        )?;
        debug!(entry = %entry, "entry point resolved");

        let _permit = Arc::clone(&self.limiter)
            .acquire_owned()
            .await
            .map_err(|e| JudgeError::Internal(format!("process limiter closed: {e}")))?;

        self.run(submission, &entry)
            .await
            .map_err(|e| JudgeError::internal(&e))?
    }
}

/// Turn a run whose process exited on its own into an [`ExecutorRun`].
///
/// A harness that dies before reporting anything, leaving a diagnostic, failed
/// while loading the solution; that is a whole-submission error.
fn settle(
    mut collector: RecordCollector<'_>,
    status: ExitStatus,
    stderr: String,
) -> Result<ExecutorRun, JudgeError> {
    if collector.is_complete() {
        if !status.success() {
            warn!(%status, "Harness exited abnormally after reporting every test case");
        }
        return Ok(ExecutorRun::complete(collector.finish()));
    }

    if collector.reported() == 0 && !stderr.is_empty() {
        return Err(JudgeError::Runtime(stderr));
    }

    let message = if stderr.is_empty() {
        format!("process exited early ({status})")
    } else {
        stderr
    };
    collector.fail_pending(ErrorKind::RuntimeError, &message);
    Ok(ExecutorRun::complete(collector.finish()))
}

/// Remove the private workspace location from text shown to callers.
fn scrub_paths(text: &str, workspace: &Path) -> String {
    let mut roots = vec![workspace.to_path_buf()];
    if let Ok(real) = workspace.canonicalize() {
        if real != workspace {
            roots.push(real);
        }
    }

    roots.iter().fold(text.to_string(), |text, root| {
        let root = root.display().to_string();
        text.replace(&format!("{root}/"), "").replace(&root, ".")
    })
}

async fn reap(child: &mut Child) {
    match timeout(CLEANUP_GRACE, child.wait()).await {
        Ok(Ok(status)) => debug!(%status, "Harness reaped"),
        Ok(Err(e)) => warn!(error = %e, "Failed to reap harness"),
        Err(_) => warn!(pid = ?child.id(), "Harness still running after SIGKILL"),
    }
}

/// Collect the stdin writer's result. A closed pipe is expected when the
/// harness died early.
async fn settle_writer(mut writer: JoinHandle<io::Result<()>>) {
    match timeout(CLEANUP_GRACE, &mut writer).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!(error = %e, "Harness closed stdin before reading every test case");
        }
        Ok(Ok(Err(e))) => warn!(error = %e, "Failed to write test cases to harness"),
        Ok(Err(e)) => warn!(error = %e, "Test-case writer task failed"),
        Err(_) => {
            writer.abort();
            warn!("Test-case writer did not finish");
        }
    }
}

/// Process group of a spawned child. Killed on drop.
struct ProcessGroup {
    pgid: Option<Pid>,
}

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        // The child leads its own group, so its pid is the group id.
        let pgid = child
            .id()
            .and_then(|id| i32::try_from(id).ok())
            .map(Pid::from_raw);
        Self { pgid }
    }

    fn kill(&self) {
        let Some(pgid) = self.pgid else { return };
        match killpg(pgid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => warn!(pgid = %pgid, error = %e, "Failed to kill process group"),
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

enum StreamEnd {
    Eof,
    TimedOut,
    Failed(io::Error),
}

enum LineRead {
    Line,
    TooLong,
    Eof,
}

async fn read_records<R>(
    mut reader: R,
    collector: &mut RecordCollector<'_>,
    max_line: usize,
    deadline: Instant,
) -> StreamEnd
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        line.clear();
        match timeout_at(deadline, read_line_capped(&mut reader, &mut line, max_line)).await {
            Err(_) => return StreamEnd::TimedOut,
            Ok(Err(e)) => return StreamEnd::Failed(e),
            Ok(Ok(LineRead::Eof)) => return StreamEnd::Eof,
            Ok(Ok(LineRead::Line)) => collector.accept_line(&String::from_utf8_lossy(&line)),
            Ok(Ok(LineRead::TooLong)) => collector
                .accept_undecodable(&format!("harness record exceeds {max_line} bytes")),
        }
    }
}

/// Read one line of at most `max` bytes. Longer lines are consumed and
/// discarded.
async fn read_line_capped<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let limit = u64::try_from(max).unwrap_or(u64::MAX).saturating_add(1);
    let read = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if read == 0 {
        return Ok(LineRead::Eof);
    }
    if buf.len() <= max || buf.last() == Some(&b'\n') {
        return Ok(LineRead::Line);
    }

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            break;
        }
        if let Some(pos) = available.iter().position(|&b| b == b'\n') {
            reader.consume(pos + 1);
            break;
        }
        let len = available.len();
        reader.consume(len);
    }
    Ok(LineRead::TooLong)
}

/// Keep the first `cap` bytes and drain the rest so the child never blocks.
async fn capture_capped<R>(reader: R, cap: usize) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut kept = Vec::new();
    let mut limited = reader.take(u64::try_from(cap).unwrap_or(u64::MAX));
    if let Err(e) = limited.read_to_end(&mut kept).await {
        debug!(error = %e, "stderr read failed");
        return kept;
    }
    let mut rest = limited.into_inner();
    if let Err(e) = tokio::io::copy(&mut rest, &mut tokio::io::sink()).await {
        debug!(error = %e, "stderr drain failed");
    }
    kept
}

async fn wait_until(child: &mut Child, deadline: Instant) -> Result<Option<ExitStatus>> {
    match timeout_at(deadline, child.wait()).await {
        Ok(status) => Ok(Some(status.context("Failed to wait for harness")?)),
        Err(_) => Ok(None),
    }
}
