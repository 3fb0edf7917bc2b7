//! Step-scoped logging for a synthesis run.
//!
//! Each work unit (one candidate type) owns a [`StepLog`] with its own stack
//! of steps. Every line is prefixed with two spaces per open step and the
//! trail `[a > b]`, appended to the run-wide log under a single lock, and
//! forwarded to the host's [`LogSink`].

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Reason, WeaveError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Debug,
    Info,
    Warning,
    Error,
}

/// The host pipeline's log channels.
pub trait LogSink: Send + Sync {
    fn debug(&self, line: &str);
    fn info(&self, line: &str);
    fn warning(&self, line: &str);
    fn error(&self, line: &str);

    fn write(&self, priority: Priority, line: &str) {
        match priority {
            Priority::Debug => self.debug(line),
            Priority::Info => self.info(line),
            Priority::Warning => self.warning(line),
            Priority::Error => self.error(line),
        }
    }
}

/// Sends every line to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn debug(&self, line: &str) {
        tracing::debug!(target: "restweave::weave", "{line}");
    }
    fn info(&self, line: &str) {
        tracing::info!(target: "restweave::weave", "{line}");
    }
    fn warning(&self, line: &str) {
        tracing::warn!(target: "restweave::weave", "{line}");
    }
    fn error(&self, line: &str) {
        tracing::error!(target: "restweave::weave", "{line}");
    }
}

/// Collects lines in memory; also mirrors them to `tracing`.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(Priority, String)>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<(Priority, String)> {
        self.lines.lock().clone()
    }

    pub fn contains(&self, priority: Priority, needle: &str) -> bool {
        self.lines
            .lock()
            .iter()
            .any(|(p, l)| *p == priority && l.contains(needle))
    }

    fn push(&self, priority: Priority, line: &str) {
        TracingSink.write(priority, line);
        self.lines.lock().push((priority, line.to_owned()));
    }
}

impl LogSink for MemorySink {
    fn debug(&self, line: &str) {
        self.push(Priority::Debug, line);
    }
    fn info(&self, line: &str) {
        self.push(Priority::Info, line);
    }
    fn warning(&self, line: &str) {
        self.push(Priority::Warning, line);
    }
    fn error(&self, line: &str) {
        self.push(Priority::Error, line);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub priority: Priority,
    pub text: String,
}

/// Append-only log for one run, shared by all of its work units.
#[derive(Clone)]
pub struct Diagnostics {
    sink: Arc<dyn LogSink>,
    lines: Arc<Mutex<Vec<LogLine>>>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl Diagnostics {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            lines: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A fresh step stack for one work unit.
    pub fn unit(&self) -> StepLog {
        StepLog {
            diag: self.clone(),
            layers: Vec::new(),
            done: Vec::new(),
            step: None,
        }
    }

    pub fn lines(&self) -> Vec<LogLine> {
        self.lines.lock().clone()
    }

    fn emit(&self, priority: Priority, text: String) {
        self.sink.write(priority, &text);
        self.lines.lock().push(LogLine { priority, text });
    }
}

pub struct StepLog {
    diag: Diagnostics,
    layers: Vec<String>,
    done: Vec<String>,
    step: Option<String>,
}

impl StepLog {
    /// Run `f` with `step` pushed on the stack.
    pub fn scope<T>(&mut self, step: impl Into<String>, f: impl FnOnce(&mut Self) -> T) -> T {
        self.layers.push(step.into());
        let out = f(self);
        self.layers.pop();
        out
    }

    /// Progress line; becomes the current step.
    pub fn log(&mut self, msg: impl Into<String>) {
        self.record(Priority::Debug, msg.into());
    }

    /// High-priority line; becomes the current step.
    pub fn important(&mut self, msg: impl Into<String>) {
        self.record(Priority::Info, msg.into());
    }

    /// Advisory; does not change the current step.
    pub fn warn(&mut self, msg: impl AsRef<str>) {
        let line = self.format(msg.as_ref());
        self.diag.emit(Priority::Warning, line);
    }

    /// Build a failure carrying the current trail and report it.
    pub fn fail(
        &mut self,
        reason: Reason,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> WeaveError {
        let err = WeaveError::new(reason, subject, message).with_trail(self.trail());
        self.report(&err);
        err
    }

    /// Report an error raised elsewhere, attaching the current trail if it has none.
    pub fn report(&mut self, err: &WeaveError) {
        let line = self.format(&err.to_string());
        self.diag.emit(Priority::Error, line);
        if let Some(step) = &self.step {
            let line = self.format(&format!("Current task: {step}"));
            self.diag.emit(Priority::Error, line);
        }
    }

    /// Open steps followed by the current step.
    pub fn trail(&self) -> Vec<String> {
        let mut t = self.layers.clone();
        if let Some(step) = &self.step {
            t.push(step.clone());
        }
        t
    }

    pub fn done_steps(&self) -> &[String] {
        &self.done
    }

    pub fn step(&self) -> Option<&str> {
        self.step.as_deref()
    }

    fn record(&mut self, priority: Priority, msg: String) {
        if let Some(prev) = self.step.take() {
            self.done.push(prev);
        }
        let line = self.format(&msg);
        self.diag.emit(priority, line);
        self.step = Some(msg);
    }

    fn format(&self, msg: &str) -> String {
        if self.layers.is_empty() {
            return msg.to_owned();
        }
        format!(
            "{}[{}] {msg}",
            "  ".repeat(self.layers.len()),
            self.layers.join(" > ")
        )
    }
}
