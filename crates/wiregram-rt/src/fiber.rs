//! Cooperative suspension: resumable activations and pooled frames.
//!
//! A parsing activation is an explicit state machine rather than a
//! stack-switching coroutine: suspension is just returning `Pending`
//! with all state parked in the machine, and `resume` re-enters it.
//! The suspension contract is the same — exactly one active activation
//! per driver, the host thread is the scheduler.

use wiregram_core::{ParseError, Result};

/// What a machine did when given control.
#[derive(Clone, Debug, PartialEq)]
pub enum RunState<T> {
    /// Ran to completion.
    Done(T),
    /// Needs more input; resume after the stream has grown.
    Pending,
}

/// A resumable unit of work driven by `Resumable`.
pub trait Machine {
    type Output;

    /// Run until completion or the next suspension point.
    fn run(&mut self) -> Result<RunState<Self::Output>>;
}

/// Status reported to the caller after each resume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Done,
    Suspended,
}

/// Owns a machine and caches its completion.
///
/// Resuming a completed activation is a no-op that reports `Done`
/// again; the cached result is unchanged.
#[derive(Debug)]
pub struct Resumable<M: Machine> {
    machine: M,
    result: Option<Result<M::Output>>,
}

impl<M: Machine> Resumable<M> {
    /// Start the machine and run it to its first suspension point.
    pub fn execute(machine: M) -> Self {
        let mut resumable = Self {
            machine,
            result: None,
        };
        resumable.resume();
        resumable
    }

    /// Continue a suspended activation.
    pub fn resume(&mut self) -> Status {
        if self.result.is_some() {
            return Status::Done;
        }
        match self.machine.run() {
            Ok(RunState::Done(value)) => {
                self.result = Some(Ok(value));
                Status::Done
            }
            Ok(RunState::Pending) => Status::Suspended,
            Err(err) => {
                self.result = Some(Err(err));
                Status::Done
            }
        }
    }

    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }

    pub fn result(&self) -> Option<&Result<M::Output>> {
        self.result.as_ref()
    }

    pub fn take_result(&mut self) -> Option<Result<M::Output>> {
        self.result.take()
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut M {
        &mut self.machine
    }
}

/// Pool of frame stacks so repeated parses reuse their allocations.
///
/// Priming the cache up front keeps the first parses on the hot path
/// from paying the allocation.
#[derive(Debug)]
pub struct FramePool<T> {
    free: Vec<Vec<T>>,
    capacity: usize,
}

impl<T> FramePool<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Vec::new(),
            capacity,
        }
    }

    /// Pre-allocate `count` stacks.
    pub fn prime(&mut self, count: usize) {
        while self.free.len() < count {
            self.free.push(Vec::with_capacity(self.capacity));
        }
    }

    pub fn take(&mut self) -> Vec<T> {
        self.free
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.capacity))
    }

    pub fn put(&mut self, mut stack: Vec<T>) {
        stack.clear();
        self.free.push(stack);
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }
}

/// Convenience for hosts that just want the final outcome.
pub fn run_to_completion<M: Machine>(machine: M) -> Result<M::Output> {
    let mut activation = Resumable::execute(machine);
    loop {
        if let Some(result) = activation.take_result() {
            return result;
        }
        match activation.resume() {
            Status::Done => continue,
            Status::Suspended => {
                return Err(ParseError::Internal(
                    "activation suspended with no way to supply more input".to_string(),
                ));
            }
        }
    }
}
