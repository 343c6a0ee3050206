#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! The wiregram parsing runtime.
//!
//! Executes compiled [`wiregram_plan::Module`]s over byte streams that
//! arrive in arbitrarily sized chunks: an append-only [`stream`], a
//! suspendable [`machine`] driven through [`fiber::Resumable`], the
//! host-facing [`driver::Driver`], reassembling [`sink::Sink`]s, and
//! the process-global [`runtime`] registry.

pub mod driver;
pub mod fiber;
pub mod hooks;
pub mod machine;
pub mod regex;
pub mod runtime;
pub mod sink;
pub mod stream;
pub mod trace;

pub use driver::{parse, Driver, DriverStatus, ParserInfo};
pub use fiber::{FramePool, Machine, Resumable, RunState, Status};
pub use hooks::{EvalScope, ExprHost, HookContext, HookHost, NoopHost};
pub use machine::{MachineConfig, MachineLimits, ParseMachine};
pub use regex::{MatchState, StreamRegex};
pub use runtime::{ParsedUnit, RegisteredParser, RuntimeConfig};
pub use sink::{Filter, IdentityFilter, Sink, SinkPolicy};
pub use stream::{FindOutcome, Stream, View};
pub use trace::{CollectTracer, NoopTracer, Tracer};

#[cfg(test)]
mod stream_tests;
#[cfg(test)]
mod driver_tests;
