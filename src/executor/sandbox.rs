//! In-process JavaScript executor backed by an embedded QuickJS runtime.
//!
//! Each submission gets its own runtime and context. The context carries the
//! pure language intrinsics plus whatever its [`SandboxScope`] installs; there
//! is no module loader and no host I/O. A wall-clock deadline is enforced by
//! the interpreter's interrupt hook, so a runaway call is stopped inside the
//! interpreter rather than abandoned on a thread.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rquickjs::context::intrinsic::{BigInt, Date, Eval, Json, MapSet, RegExp, RegExpCompiler};
use rquickjs::convert::Coerced;
use rquickjs::function::Rest;
use rquickjs::{Context, Ctx, Function, Object, Runtime, Value};
use tracing::{debug, instrument, warn};

use super::scope::SandboxScope;
use super::{select_entry, Executor};
use crate::aggregate::ExecutorRun;
use crate::config::SandboxConfig;
use crate::error::JudgeError;
use crate::model::{ErrorKind, ExecutionOutcome, Submission, TestCase};

type Intrinsics = (Date, Eval, Json, RegExpCompiler, RegExp, MapSet, BigInt);

/// Executor for languages hosted inside the judge process.
#[derive(Debug, Clone, Default)]
pub struct SandboxExecutor {
    config: SandboxConfig,
}

impl SandboxExecutor {
    pub const fn new(config: SandboxConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Executor for SandboxExecutor {
    #[instrument(skip_all, fields(tests = submission.test_cases.len()))]
    async fn execute(&self, submission: &Submission) -> Result<ExecutorRun, JudgeError> {
        let submission = submission.clone();
        let config = self.config.clone();

        // QuickJS is synchronous; keep it off the async workers.
        tokio::task::spawn_blocking(move || run_submission(&submission, &config))
            .await
            .map_err(|e| JudgeError::Internal(format!("sandbox task failed: {e}")))?
    }
}

fn run_submission(submission: &Submission, config: &SandboxConfig) -> Result<ExecutorRun, JudgeError> {
    let requested = submission.entry_point.as_deref();
    let mut sandbox = Sandbox::load(&submission.source_code, requested, config)?;
    debug!(entry = %sandbox.entry, "entry point resolved");

    let cases = &submission.test_cases;
    let mut outcomes = Vec::with_capacity(cases.len());
    for (index, case) in cases.iter().enumerate() {
        let outcome = sandbox.invoke(case);
        let timed_out = outcome.error_kind == Some(ErrorKind::Timeout);
        outcomes.push(outcome);

        // A timed-out call may have left globals half-mutated.
        if timed_out && index + 1 < cases.len() {
            debug!(test_case = %case.id, "replacing sandbox after timeout");
            match Sandbox::load(&submission.source_code, requested, config) {
                Ok(fresh) => sandbox = fresh,
                Err(err) => {
                    warn!(error = %err, "sandbox could not be rebuilt");
                    return Ok(ExecutorRun::interrupted(outcomes, err.kind(), err.to_string()));
                }
            }
        }
    }

    Ok(ExecutorRun::complete(outcomes))
}

/// Deadline shared with the runtime's interrupt hook.
#[derive(Debug, Default)]
struct Watchdog {
    deadline: Mutex<Option<Instant>>,
    fired: AtomicBool,
}

impl Watchdog {
    fn arm(&self, budget: Duration) {
        self.fired.store(false, Ordering::SeqCst);
        *self.deadline.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now() + budget);
    }

    fn disarm(&self) {
        *self.deadline.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Called by the interpreter; returning `true` aborts the running script.
    fn expired(&self) -> bool {
        let expired = self
            .deadline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some_and(|deadline| Instant::now() >= deadline);
        if expired {
            self.fired.store(true, Ordering::SeqCst);
        }
        expired
    }

    fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

/// One loaded submission: runtime, context and the bound entry point.
struct Sandbox {
    context: Context,
    _runtime: Runtime,
    watchdog: Arc<Watchdog>,
    scope: SandboxScope,
    entry: String,
    budget: Duration,
}

impl Sandbox {
    /// Build a fresh runtime, evaluate the source once and locate the entry point.
    fn load(source: &str, requested: Option<&str>, config: &SandboxConfig) -> Result<Self, JudgeError> {
        let runtime =
            Runtime::new().map_err(|e| JudgeError::Internal(format!("cannot create runtime: {e}")))?;
        runtime.set_memory_limit(config.memory_limit_bytes);
        runtime.set_max_stack_size(config.max_stack_bytes);

        let watchdog = Arc::new(Watchdog::default());
        let hook = Arc::clone(&watchdog);
        runtime.set_interrupt_handler(Some(Box::new(move || hook.expired())));

        let context = Context::custom::<Intrinsics>(&runtime)
            .map_err(|e| JudgeError::Internal(format!("cannot create context: {e}")))?;
        let scope = SandboxScope::new(config.console_capture_lines);
        let budget = config.test_timeout();

        let entry = context.with(|ctx| -> Result<String, JudgeError> {
            scope
                .install(&ctx)
                .map_err(|e| JudgeError::Internal(format!("cannot install sandbox scope: {e}")))?;

            let globals = ctx.globals();
            let baseline = global_names(&globals)
                .map_err(|e| JudgeError::Internal(format!("cannot enumerate globals: {e}")))?;

            // Discovery reads globals, which may run getters; keep the deadline armed.
            watchdog.arm(budget);
            let discovered = ctx
                .eval::<Value, _>(source)
                .and_then(|_| defined_functions(&ctx, &globals, &baseline, source));
            let discovered = discovered.map_err(|err| {
                let failure = JsFailure::from_error(&ctx, err);
                if watchdog.fired() {
                    JudgeError::Timeout(config.test_timeout_ms)
                } else if failure.is_syntax_error() {
                    JudgeError::Syntax(failure.to_string())
                } else {
                    JudgeError::Runtime(failure.to_string())
                }
            });
            watchdog.disarm();

            select_entry(discovered?, requested)
        })?;

        drain_console(&scope, "<load>");

        Ok(Self {
            context,
            _runtime: runtime,
            watchdog,
            scope,
            entry,
            budget,
        })
    }

    fn budget_ms(&self) -> u64 {
        u64::try_from(self.budget.as_millis()).unwrap_or(u64::MAX)
    }

    /// Run the entry point against one test case.
    fn invoke(&self, case: &TestCase) -> ExecutionOutcome {
        let args = match case.arguments() {
            Ok(args) => args,
            Err(message) => {
                return ExecutionOutcome::failed(
                    case.id.as_str(),
                    ErrorKind::MalformedTestData,
                    message,
                    case.expected().ok(),
                    0.0,
                );
            }
        };
        let expected = match case.expected() {
            Ok(expected) => expected,
            Err(message) => {
                return ExecutionOutcome::failed(
                    case.id.as_str(),
                    ErrorKind::MalformedTestData,
                    message,
                    None,
                    0.0,
                );
            }
        };

        let outcome = self.context.with(|ctx| {
            let js_args = match args
                .iter()
                .map(|arg| ctx.json_parse(arg.to_string()))
                .collect::<rquickjs::Result<Vec<Value>>>()
            {
                Ok(js_args) => js_args,
                Err(err) => {
                    let failure = JsFailure::from_error(&ctx, err);
                    return ExecutionOutcome::failed(
                        case.id.as_str(),
                        ErrorKind::MalformedTestData,
                        failure.to_string(),
                        Some(expected),
                        0.0,
                    );
                }
            };

            // `const`/`let` bindings are not global properties; resolve the
            // name the way the submission itself would. An accessor may run
            // submission code, so the deadline is already armed.
            self.watchdog.arm(self.budget);
            let func = match ctx.eval::<Function, _>(self.entry.as_str()) {
                Ok(func) => func,
                Err(err) => {
                    let failure = JsFailure::from_error(&ctx, err);
                    let timed_out = self.watchdog.fired();
                    self.watchdog.disarm();
                    let (kind, message) = if timed_out {
                        (ErrorKind::Timeout, JudgeError::Timeout(self.budget_ms()).to_string())
                    } else {
                        (
                            ErrorKind::RuntimeError,
                            format!("Runtime Error: '{}' is no longer a function ({failure})", self.entry),
                        )
                    };
                    return ExecutionOutcome::failed(case.id.as_str(), kind, message, Some(expected), 0.0);
                }
            };

            let started = Instant::now();
            let result = func.call::<_, Value>((Rest(js_args),));
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

            // Serializing the result can run submission getters, so the
            // deadline stays armed until the value is out of the sandbox.
            let output = result
                .map_err(|err| format!("Runtime Error: {}", JsFailure::from_error(&ctx, err)))
                .and_then(|value| to_json(&ctx, value));
            let timed_out = self.watchdog.fired();
            self.watchdog.disarm();

            match output {
                _ if timed_out => ExecutionOutcome::failed(
                    case.id.as_str(),
                    ErrorKind::Timeout,
                    JudgeError::Timeout(self.budget_ms()).to_string(),
                    Some(expected),
                    elapsed_ms,
                ),
                Ok(output) => {
                    ExecutionOutcome::completed(case.id.as_str(), output, expected, elapsed_ms)
                }
                Err(message) => ExecutionOutcome::failed(
                    case.id.as_str(),
                    ErrorKind::RuntimeError,
                    message,
                    Some(expected),
                    elapsed_ms,
                ),
            }
        });

        drain_console(&self.scope, &case.id);
        outcome
    }
}

fn global_names(globals: &Object<'_>) -> rquickjs::Result<HashSet<String>> {
    globals.keys::<String>().collect()
}

/// Functions the source declared at top level, in definition order.
///
/// Top-level `function` declarations and `var` bindings become own enumerable
/// properties of the global object; built-ins are non-enumerable and anything
/// the scope installed is in `baseline`. `const` and `let` bindings live in the
/// global lexical scope, which cannot be enumerated, so every identifier in the
/// source is resolved there and kept when the interpreter binds it to a
/// function that is not a global property.
fn defined_functions(
    ctx: &Ctx<'_>,
    globals: &Object<'_>,
    baseline: &HashSet<String>,
    source: &str,
) -> rquickjs::Result<Vec<String>> {
    let mut found = Vec::new();
    for name in globals.keys::<String>() {
        let name = name?;
        if baseline.contains(&name) {
            continue;
        }
        let value: Value = globals.get(name.as_str())?;
        if value.is_function() {
            found.push(name);
        }
    }

    for name in identifiers(source) {
        if found.iter().any(|known| known == name) {
            continue;
        }
        if is_lexical_function(ctx, name)? {
            found.push(name.to_string());
        }
    }
    Ok(found)
}

/// Distinct identifier-shaped words of `source`, in order of first appearance.
fn identifiers<'a>(source: &'a str) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    let mut words = Vec::new();
    let mut push = |word: &'a str| {
        if !word.starts_with(|c: char| c.is_ascii_digit()) && seen.insert(word) {
            words.push(word);
        }
    };

    let mut start = None;
    for (index, c) in source.char_indices() {
        let part = c == '_' || c == '$' || c.is_alphanumeric();
        match start {
            Some(from) if !part => {
                push(&source[from..index]);
                start = None;
            }
            None if part => start = Some(index),
            _ => {}
        }
    }
    if let Some(from) = start {
        push(&source[from..]);
    }
    words
}

/// Whether `name` resolves at global scope to a function held by a lexical
/// binding rather than by the global object or its prototype chain. Classes
/// are not callable and do not count.
fn is_lexical_function(ctx: &Ctx<'_>, name: &str) -> rquickjs::Result<bool> {
    let check = format!(
        "typeof {name} === \"function\" && {name} !== globalThis[\"{name}\"] \
         && !Function.prototype.toString.call({name}).startsWith(\"class\")"
    );
    match ctx.eval::<bool, _>(check) {
        Ok(found) => Ok(found),
        Err(rquickjs::Error::Exception) => {
            let thrown = ctx.catch();
            let name_of_error = thrown
                .as_object()
                .and_then(|object| object.get::<_, Option<String>>("name").ok().flatten());
            // Keywords do not parse as expressions; uninitialised bindings throw.
            match name_of_error.as_deref() {
                Some("SyntaxError" | "ReferenceError") => Ok(false),
                _ => Err(ctx.throw(thrown)),
            }
        }
        Err(err) => Err(err),
    }
}

/// A thrown JavaScript value, reduced to its name and message.
#[derive(Debug)]
struct JsFailure {
    name: Option<String>,
    message: String,
}

impl JsFailure {
    /// Describe `err`, taking the pending exception off the context if there is one.
    fn from_error(ctx: &Ctx<'_>, err: rquickjs::Error) -> Self {
        if !matches!(err, rquickjs::Error::Exception) {
            return Self {
                name: None,
                message: err.to_string(),
            };
        }

        let thrown = ctx.catch();
        if let Some(object) = thrown.as_object() {
            return Self {
                name: object.get::<_, Option<String>>("name").ok().flatten(),
                message: object
                    .get::<_, Option<String>>("message")
                    .ok()
                    .flatten()
                    .unwrap_or_default(),
            };
        }

        Self {
            name: None,
            message: thrown
                .get::<Coerced<String>>()
                .map_or_else(|_| "uncaught exception".to_string(), |text| text.0),
        }
    }

    fn is_syntax_error(&self) -> bool {
        self.name.as_deref() == Some("SyntaxError")
    }
}

impl std::fmt::Display for JsFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) if self.message.is_empty() => f.write_str(name),
            Some(name) => write!(f, "{name}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

fn to_json<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> Result<serde_json::Value, String> {
    let text = match ctx.json_stringify(value) {
        // `undefined` and functions have no JSON form.
        Ok(None) => return Ok(serde_json::Value::Null),
        Ok(Some(text)) => text
            .to_string()
            .map_err(|e| format!("Runtime Error: return value is not JSON-serializable: {e}"))?,
        Err(err) => {
            return Err(format!(
                "Runtime Error: return value is not JSON-serializable: {}",
                JsFailure::from_error(ctx, err)
            ));
        }
    };
    serde_json::from_str(&text)
        .map_err(|e| format!("Runtime Error: return value is not JSON-serializable: {e}"))
}

fn drain_console(scope: &SandboxScope, test_case: &str) {
    let (lines, dropped) = scope.drain_console();
    for line in &lines {
        debug!(test_case, console = %line, "submission console output");
    }
    if dropped > 0 {
        debug!(test_case, dropped, "submission console output truncated");
    }
}
