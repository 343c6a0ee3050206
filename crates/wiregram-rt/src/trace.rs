//! Execution tracing for debugging parse runs.
//!
//! `NoopTracer` methods are empty and `#[inline(always)]`, so the
//! default path carries no tracing cost; `CollectTracer` records lines
//! for tests and interactive debugging.

use wiregram_core::ParseError;

/// Instrumentation points inside the parse machine.
pub trait Tracer {
    /// Called before a step executes; `detail` is the rendered step.
    fn trace_step(&mut self, offset: u64, detail: &str);

    /// Called when the activation suspends for more input.
    fn trace_suspend(&mut self, offset: u64);

    /// Called when a resynchronization attempt re-anchors the parse.
    fn trace_resync(&mut self, from: u64, to: u64);

    /// Called when an error is about to surface to the driver.
    fn trace_error(&mut self, error: &ParseError);
}

/// Tracer that compiles away.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {
    #[inline(always)]
    fn trace_step(&mut self, _offset: u64, _detail: &str) {}

    #[inline(always)]
    fn trace_suspend(&mut self, _offset: u64) {}

    #[inline(always)]
    fn trace_resync(&mut self, _from: u64, _to: u64) {}

    #[inline(always)]
    fn trace_error(&mut self, _error: &ParseError) {}
}

/// Tracer that accumulates readable lines.
#[derive(Clone, Debug, Default)]
pub struct CollectTracer {
    lines: Vec<String>,
}

impl CollectTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

impl Tracer for CollectTracer {
    fn trace_step(&mut self, offset: u64, detail: &str) {
        self.lines.push(format!("@{offset} {detail}"));
    }

    fn trace_suspend(&mut self, offset: u64) {
        self.lines.push(format!("@{offset} suspend"));
    }

    fn trace_resync(&mut self, from: u64, to: u64) {
        self.lines.push(format!("resync {from} -> {to}"));
    }

    fn trace_error(&mut self, error: &ParseError) {
        self.lines.push(format!("error: {error}"));
    }
}
