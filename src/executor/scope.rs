//! Capability scope handed to the embedded interpreter.
//!
//! The sandbox starts with no host access at all. Whatever the submission is
//! allowed to reach is installed from a `SandboxScope` value when the sandbox
//! is built; today that is a `console` whose output lands in a bounded buffer
//! owned by the judge instead of the host's stdout.

use std::sync::{Arc, Mutex, PoisonError};

use rquickjs::convert::Coerced;
use rquickjs::function::Rest;
use rquickjs::{Ctx, Function, Object};

const CONSOLE_METHODS: [&str; 5] = ["log", "info", "warn", "error", "debug"];

/// Host capabilities exposed to one sandbox instance.
#[derive(Debug, Clone)]
pub struct SandboxScope {
    console: Arc<Mutex<ConsoleBuffer>>,
}

#[derive(Debug)]
struct ConsoleBuffer {
    lines: Vec<String>,
    capacity: usize,
    dropped: usize,
}

impl SandboxScope {
    /// A scope whose console keeps at most `capacity` lines between drains.
    pub fn new(capacity: usize) -> Self {
        Self {
            console: Arc::new(Mutex::new(ConsoleBuffer {
                lines: Vec::new(),
                capacity,
                dropped: 0,
            })),
        }
    }

    /// Install the scope's globals into a fresh context.
    pub(crate) fn install(&self, ctx: &Ctx<'_>) -> rquickjs::Result<()> {
        let console = Object::new(ctx.clone())?;
        for method in CONSOLE_METHODS {
            let scope = self.clone();
            let func = Function::new(ctx.clone(), move |parts: Rest<Coerced<String>>| {
                let line = parts
                    .0
                    .into_iter()
                    .map(|part| part.0)
                    .collect::<Vec<_>>()
                    .join(" ");
                scope.record(method, line);
            })?;
            console.set(method, func)?;
        }
        ctx.globals().set("console", console)
    }

    fn record(&self, method: &str, line: String) {
        let mut buffer = self.console.lock().unwrap_or_else(PoisonError::into_inner);
        if buffer.lines.len() < buffer.capacity {
            buffer.lines.push(format!("[{method}] {line}"));
        } else {
            buffer.dropped += 1;
        }
    }

    /// Take everything captured since the last drain, plus the count of
    /// lines dropped for exceeding capacity.
    pub fn drain_console(&self) -> (Vec<String>, usize) {
        let mut buffer = self.console.lock().unwrap_or_else(PoisonError::into_inner);
        let dropped = std::mem::take(&mut buffer.dropped);
        (std::mem::take(&mut buffer.lines), dropped)
    }
}
