//! The parsing machine: executes a plan's steps over a growing stream.
//!
//! Control flow is an explicit frame stack over plan blocks, so the
//! whole activation is plain data: suspension returns `Pending` and
//! resumption re-enters `run` with everything parked in place. A step
//! consumes input only when it fully succeeds, which makes re-running
//! the failing step after an append safe.

pub mod decode;


use std::collections::VecDeque;
use std::sync::Arc;

use wiregram_core::{
    BlockId, Bytes, Expr, ParseError, ParseType, PlanId, Result, TokenId, UnitValue, Value,
};
use wiregram_plan::{
    BoundaryKind, BytesAttrs, HookKind, LiteralValue, LookAheadDefault, LoopKind, Module,
    RegexMode, Step,
};

use crate::fiber::{FramePool, Machine, RunState};
use crate::hooks::{eval_expr, EvalScope, ExprHost, HookContext, HookHost, NoopHost};
use crate::regex::{MatchState, StreamRegex};
use crate::stream::{FindOutcome, Stream, View};
use crate::trace::{NoopTracer, Tracer};

/// Runtime limits guarding pathological plans.
#[derive(Clone, Copy, Debug)]
pub struct MachineLimits {
    /// Maximum executed steps per activation.
    pub exec_fuel: u64,
    /// Maximum unit call depth.
    pub recursion_limit: u32,
}

impl Default for MachineLimits {
    fn default() -> Self {
        Self {
            exec_fuel: 100_000_000,
            recursion_limit: 1024,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MachineConfig {
    /// Trim consumed input after each suspension.
    pub auto_trim: bool,
    pub limits: MachineLimits,
}

impl MachineConfig {
    pub fn with_auto_trim(mut self, auto_trim: bool) -> Self {
        self.auto_trim = auto_trim;
        self
    }
}

/// Per-step resumable scratch. At most one matching step is in flight
/// at a time; `at` ties the scratch to the view position it was
/// started at.
#[derive(Debug)]
enum Scratch {
    Regex {
        at: u64,
        state: MatchState,
    },
    /// Terminator scan for `&until` byte runs.
    UntilScan {
        at: u64,
        resume: u64,
    },
    /// Delivery watermark for `&chunked` byte runs.
    Chunked {
        at: u64,
        delivered: u64,
    },
}

#[derive(Debug)]
struct LoopState {
    kind: LoopKind,
    collect: bool,
    items: Vec<Value>,
    started: bool,
    /// Counter iterations left; evaluated on loop entry.
    remaining: Option<u64>,
    /// Pending elements for `foreach`.
    queue: Option<VecDeque<Value>>,
    /// The `$$` binding for the current iteration.
    dollar: Option<Value>,
}

#[derive(Debug)]
struct BoundaryState {
    kind: BoundaryKind,
    /// Outer view to restore on completion.
    outer: View,
    /// Absolute end of the bounded region (`Size`/`MaxSize`).
    region_end: Option<u64>,
    /// Replaced stream for `&parse-from`.
    outer_stream: Option<Box<Stream>>,
}

#[derive(Debug)]
struct SyncState {
    /// Literal needle to scan for; byte-by-byte retry when absent.
    needle: Option<Vec<u8>>,
    /// Start of the current parse attempt.
    attempt: u64,
    /// Resumable literal-scan watermark.
    scan_from: u64,
    /// View bound at sync entry, restored for every retry.
    limit: Option<u64>,
    /// Unit-stack depth to restore on resync.
    units_len: usize,
    /// Original error, kept while waiting for more data to scan.
    pending: Option<ParseError>,
}

#[derive(Debug)]
enum Ctrl {
    /// Plain sub-block: if/switch/look-ahead arms.
    Seq,
    /// A unit body; completion pops the unit value.
    Unit,
    Loop(LoopState),
    /// Discard the produced value on completion.
    SkipValue,
    Boundary(BoundaryState),
    Sync(SyncState),
}

#[derive(Debug)]
struct Frame {
    plan: PlanId,
    block: BlockId,
    step: usize,
    ctrl: Ctrl,
}

enum StepFlow {
    Continue,
    Finished(UnitValue),
    /// Cooperative yield from an explicit `Suspend` step.
    Yield,
}

/// Sentinel forcing the loop boundary path on frame entry.
const LOOP_ENTRY: usize = usize::MAX;

thread_local! {
    /// Per-thread pool of activation frame stacks. Drivers are
    /// single-threaded, so recycling per thread keeps repeated parses
    /// from paying the stack allocation.
    static FRAME_POOL: std::cell::RefCell<FramePool<Frame>> =
        std::cell::RefCell::new(FramePool::new(32));
}

/// Pre-allocate `count` activation frame stacks on this thread.
pub fn prime_activations(count: usize) {
    FRAME_POOL.with(|pool| pool.borrow_mut().prime(count));
}

/// Frame stacks currently parked in this thread's pool.
pub fn pooled_activations() -> usize {
    FRAME_POOL.with(|pool| pool.borrow().available())
}

impl std::fmt::Debug for ParseMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseMachine")
            .field("frames", &self.frames.len())
            .field("units", &self.units.len())
            .field("fuel", &self.fuel)
            .field("depth", &self.depth)
            .field("error_hooks_ran", &self.error_hooks_ran)
            .field("yielded", &self.yielded)
            .finish()
    }
}

pub struct ParseMachine {
    module: Arc<Module>,
    stream: Stream,
    view: View,
    frames: Vec<Frame>,
    units: Vec<UnitValue>,
    current: Option<Value>,
    regexes: Vec<StreamRegex>,
    scratch: Option<Scratch>,
    hooks: Box<dyn HookHost>,
    exprs: Box<dyn ExprHost>,
    tracer: Box<dyn Tracer>,
    config: MachineConfig,
    fuel: u64,
    depth: u32,
    /// Set once error hooks have fired for the surfacing error.
    error_hooks_ran: bool,
    /// Set when the last suspension was a cooperative `Suspend` step
    /// rather than a wait for input.
    yielded: bool,
}

impl Drop for ParseMachine {
    fn drop(&mut self) {
        let frames = std::mem::take(&mut self.frames);
        FRAME_POOL.with(|pool| pool.borrow_mut().put(frames));
    }
}

impl ParseMachine {
    pub fn new(module: Arc<Module>, entry: PlanId) -> Result<Self> {
        Self::with_hosts(
            module,
            entry,
            Box::new(NoopHost),
            Box::new(NoopHost),
            MachineConfig::default(),
        )
    }

    pub fn with_hosts(
        module: Arc<Module>,
        entry: PlanId,
        hooks: Box<dyn HookHost>,
        exprs: Box<dyn ExprHost>,
        config: MachineConfig,
    ) -> Result<Self> {
        let regexes = module
            .regexes
            .iter()
            .map(|def| StreamRegex::new(&def.pattern))
            .collect::<Result<Vec<_>>>()?;

        let plan = module.plan(entry);
        let units = vec![UnitValue::new(&plan.name)];
        let mut frames = FRAME_POOL.with(|pool| pool.borrow_mut().take());
        frames.push(Frame {
            plan: entry,
            block: plan.root,
            step: 0,
            ctrl: Ctrl::Unit,
        });

        Ok(Self {
            stream: Stream::new(),
            view: View::new(0, None),
            frames,
            units,
            current: None,
            regexes,
            scratch: None,
            hooks,
            exprs,
            tracer: Box::new(NoopTracer),
            config,
            fuel: config.limits.exec_fuel,
            depth: 0,
            error_hooks_ran: false,
            yielded: false,
            module,
        })
    }

    pub fn set_tracer(&mut self, tracer: Box<dyn Tracer>) {
        self.tracer = tracer;
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut Stream {
        &mut self.stream
    }

    /// Absolute offset of the next unconsumed byte.
    pub fn offset(&self) -> u64 {
        self.view.offset()
    }

    /// Whether the last suspension was a cooperative yield (so the
    /// driver should resume immediately after housekeeping).
    pub fn take_yielded(&mut self) -> bool {
        std::mem::replace(&mut self.yielded, false)
    }

    /// Highest offset the stream may release without invalidating any
    /// live cursor, scan watermark, or pending resync attempt.
    pub fn trim_watermark(&self) -> u64 {
        let mut low = self.view.offset();
        for frame in &self.frames {
            match &frame.ctrl {
                Ctrl::Sync(sync) => low = low.min(sync.attempt),
                Ctrl::Boundary(boundary) => low = low.min(boundary.outer.offset()),
                _ => {}
            }
        }
        if let Some(
            Scratch::Regex { at, .. }
            | Scratch::UntilScan { at, .. }
            | Scratch::Chunked { at, .. },
        ) = &self.scratch
        {
            low = low.min(*at);
        }
        low
    }

    fn plan_block(&self, plan: PlanId, block: BlockId) -> &[Step] {
        self.module.plan(plan).block(block)
    }

    /// Evaluate an expression against the current unit and `$$`.
    fn eval(&mut self, expr: &Expr) -> Result<Value> {
        let dollar = self.frames.iter().rev().find_map(|f| match &f.ctrl {
            Ctrl::Loop(state) => state.dollar.as_ref(),
            _ => None,
        });
        let unit = self
            .units
            .last()
            .ok_or_else(|| ParseError::Internal("no unit in scope".to_string()))?;
        let scope = EvalScope { unit, dollar };
        eval_expr(expr, &scope, self.exprs.as_mut())
    }

    fn eval_u64(&mut self, expr: &Expr) -> Result<u64> {
        let value = self.eval(expr)?;
        value.as_u64().ok_or_else(|| {
            ParseError::OutOfRange(format!("expected a non-negative count, got {value:?}"))
        })
    }

    fn eval_bool(&mut self, expr: &Expr) -> Result<bool> {
        let value = self.eval(expr)?;
        value.as_bool().ok_or_else(|| {
            ParseError::Internal(format!("expected a boolean condition, got {value:?}"))
        })
    }

    fn run_hook(&mut self, plan: PlanId, hook: wiregram_core::HookId, data: Option<&[u8]>, error: Option<&str>) -> Result<()> {
        let module = Arc::clone(&self.module);
        let info = &module.plan(plan).hooks[hook.index()];
        let unit = self
            .units
            .last_mut()
            .ok_or_else(|| ParseError::Internal("no unit in scope".to_string()))?;
        let ctx = HookContext {
            hook: info,
            unit,
            data,
            error,
            input_offset: self.view.offset(),
        };
        self.hooks.run_hook(ctx)
    }

    /// Literal bytes for a token, if it compares as raw bytes.
    fn token_needle(&self, token: TokenId) -> Result<Option<Vec<u8>>> {
        match &self.module.literal(token).value {
            LiteralValue::Bytes(b) => Ok(Some(b.as_slice().to_vec())),
            LiteralValue::UInt { value, ty } => Ok(Some(decode::encode_uint(*value, ty)?)),
            LiteralValue::Regex(_) => Ok(None),
        }
    }

    /// Peek whether the view starts with this token.
    /// `None` means not decidable yet.
    fn token_matches(&mut self, token: TokenId) -> Result<Option<bool>> {
        if let Some(needle) = self.token_needle(token)? {
            return Ok(self.view.starts_with(&self.stream, &needle));
        }
        let LiteralValue::Regex(regex) = &self.module.literal(token).value else {
            unreachable!("token_needle covers the other literal kinds");
        };
        let re = &self.regexes[regex.index()];
        let mut state = re.start()?;
        match re.advance_view(&mut state, &self.stream, self.view) {
            Ok(Some(len)) => Ok(Some(len > 0)),
            Ok(None) => Ok(None),
            Err(err) if err.is_recoverable() => Ok(Some(false)),
            Err(err) => Err(err),
        }
    }

    /// Peek a token set. `None` = suspend; `Some(true)` = some token
    /// matches.
    fn set_matches(&mut self, set: &[TokenId]) -> Result<Option<bool>> {
        let mut undecided = false;
        for &token in set {
            match self.token_matches(token)? {
                Some(true) => return Ok(Some(true)),
                Some(false) => {}
                None => undecided = true,
            }
        }
        if undecided {
            Ok(None)
        } else {
            Ok(Some(false))
        }
    }

    fn missing_data(&self) -> ParseError {
        ParseError::MissingData {
            offset: self.stream.end_offset(),
        }
    }
}

impl Machine for ParseMachine {
    type Output = UnitValue;

    fn run(&mut self) -> Result<RunState<UnitValue>> {
        loop {
            if self.fuel == 0 {
                return Err(ParseError::Internal(
                    "execution limit exceeded".to_string(),
                ));
            }
            self.fuel -= 1;

            match self.step_once() {
                Ok(StepFlow::Continue) => {}
                Ok(StepFlow::Finished(unit)) => return Ok(RunState::Done(unit)),
                Ok(StepFlow::Yield) => {
                    self.yielded = true;
                    return Ok(RunState::Pending);
                }
                Err(err) if err.is_missing_data() => {
                    self.tracer.trace_suspend(self.view.offset());
                    return Ok(RunState::Pending);
                }
                Err(err) if err.is_recoverable() => match self.try_resync(err)? {
                    Resync::Handled => {}
                    Resync::Suspended => return Ok(RunState::Pending),
                    Resync::Unhandled(err) => {
                        self.surface_error(&err);
                        return Err(err);
                    }
                },
                Err(err) => {
                    self.surface_error(&err);
                    return Err(err);
                }
            }
        }
    }
}

enum Resync {
    Handled,
    Suspended,
    Unhandled(ParseError),
}

impl ParseMachine {
    /// Run error hooks of the innermost unit before an error surfaces.
    fn surface_error(&mut self, err: &ParseError) {
        self.tracer.trace_error(err);
        if self.error_hooks_ran {
            return;
        }
        self.error_hooks_ran = true;
        let Some(frame) = self.frames.last() else {
            return;
        };
        let plan = frame.plan;
        let reason = err.to_string();
        let hooks: Vec<_> = self
            .module
            .plan(plan)
            .hooks
            .iter()
            .enumerate()
            .filter(|(_, h)| h.kind == HookKind::Error)
            .map(|(i, _)| wiregram_core::HookId(i as u32))
            .collect();
        for hook in hooks {
            // Failures inside an error hook are swallowed; the parse is
            // already failing for the original reason.
            let _ = self.run_hook(plan, hook, None, Some(&reason));
        }
    }

    /// Find the innermost synchronize frame and re-anchor the parse.
    fn try_resync(&mut self, err: ParseError) -> Result<Resync> {
        let Some(sync_idx) = self
            .frames
            .iter()
            .rposition(|f| matches!(f.ctrl, Ctrl::Sync(_)))
        else {
            return Ok(Resync::Unhandled(err));
        };

        self.frames.truncate(sync_idx + 1);
        self.current = None;
        self.scratch = None;

        let frame = &mut self.frames[sync_idx];
        let Ctrl::Sync(state) = &mut frame.ctrl else {
            unreachable!();
        };
        self.units.truncate(state.units_len);
        self.depth = self.units.len().saturating_sub(1) as u32;

        let limit = state.limit;
        let next = match &state.needle {
            Some(needle) => {
                let from = state.scan_from.max(state.attempt + 1);
                match self.stream.find_bytes(needle, from, limit) {
                    FindOutcome::Found(offset) => Some(offset),
                    FindOutcome::Partial(resume) => {
                        state.scan_from = resume;
                        None
                    }
                    FindOutcome::NotFound => {
                        return Ok(Resync::Unhandled(state.pending.take().unwrap_or(err)));
                    }
                }
            }
            None => {
                let candidate = state.attempt + 1;
                let end = limit.unwrap_or(u64::MAX).min(self.stream.end_offset());
                if candidate < end {
                    Some(candidate)
                } else if self.stream.is_frozen()
                    || limit.is_some_and(|l| l <= self.stream.end_offset())
                {
                    return Ok(Resync::Unhandled(state.pending.take().unwrap_or(err)));
                } else {
                    None
                }
            }
        };

        match next {
            Some(offset) => {
                self.tracer.trace_resync(state.attempt, offset);
                state.attempt = offset;
                state.scan_from = offset;
                state.pending = None;
                frame.step = 0;
                self.view = View::new(offset, limit);
                Ok(Resync::Handled)
            }
            None => {
                state.pending.get_or_insert(err);
                Ok(Resync::Suspended)
            }
        }
    }

    fn step_once(&mut self) -> Result<StepFlow> {
        let (plan, block, step_idx, pending) = {
            let Some(frame) = self.frames.last() else {
                return Err(ParseError::Internal(
                    "machine resumed after completion".to_string(),
                ));
            };
            let pending = match &frame.ctrl {
                Ctrl::Sync(state) => state.pending.clone(),
                _ => None,
            };
            (frame.plan, frame.block, frame.step, pending)
        };

        // A resync frame that parked an error re-attempts the scan as
        // soon as it runs again (the driver appended more data).
        if let Some(pending) = pending {
            return match self.try_resync(pending)? {
                Resync::Handled => Ok(StepFlow::Continue),
                Resync::Suspended => Err(self.missing_data()),
                Resync::Unhandled(err) => Err(err),
            };
        }

        if step_idx >= self.plan_block(plan, block).len() {
            return self.block_end();
        }

        let step = self.plan_block(plan, block)[step_idx].clone();
        self.exec_step(plan, step)
    }

    /// Handle a frame whose block ran out of steps.
    fn block_end(&mut self) -> Result<StepFlow> {
        let frame = self.frames.last_mut().expect("caller checked");
        match &mut frame.ctrl {
            Ctrl::Seq => {
                self.frames.pop();
                Ok(StepFlow::Continue)
            }
            Ctrl::SkipValue => {
                self.current = None;
                self.frames.pop();
                Ok(StepFlow::Continue)
            }
            Ctrl::Sync(_) => {
                self.frames.pop();
                Ok(StepFlow::Continue)
            }
            Ctrl::Unit => self.finish_unit(),
            Ctrl::Boundary(_) => self.finish_boundary(),
            Ctrl::Loop(_) => self.loop_boundary(),
        }
    }

    fn finish_unit(&mut self) -> Result<StepFlow> {
        let frame = self.frames.last().expect("caller checked");
        let plan = frame.plan;

        // Apply `&default` to fields the parse never reached.
        let defaults: Vec<(String, Expr)> = {
            let unit = self.units.last().expect("unit frame has a unit");
            self.module
                .plan(plan)
                .fields
                .iter()
                .filter_map(|f| {
                    let default = f.default.clone()?;
                    matches!(
                        unit.state(&f.name),
                        wiregram_core::FieldState::Absent
                    )
                    .then(|| (f.name.clone(), default))
                })
                .collect()
        };
        for (name, default) in defaults {
            let value = self.eval(&default)?;
            self.units
                .last_mut()
                .expect("unit frame has a unit")
                .set(name, value);
        }

        self.frames.pop();
        let unit = self.units.pop().expect("unit frame has a unit");
        if self.units.is_empty() {
            Ok(StepFlow::Finished(unit))
        } else {
            self.depth = self.depth.saturating_sub(1);
            self.current = Some(Value::Unit(unit));
            Ok(StepFlow::Continue)
        }
    }

    fn finish_boundary(&mut self) -> Result<StepFlow> {
        let frame = self.frames.pop().expect("caller checked");
        let Ctrl::Boundary(state) = frame.ctrl else {
            unreachable!();
        };

        match state.kind {
            BoundaryKind::Size => {
                let region_end = state.region_end.expect("size boundary has an end");
                if self.view.offset() != region_end {
                    return Err(ParseError::recoverable(
                        "bounded region not fully consumed",
                        self.view.offset(),
                    ));
                }
                self.view = View::new(region_end, state.outer.limit());
            }
            BoundaryKind::MaxSize => {
                // Only an upper bound: keep the inner position, drop
                // the bound.
                self.view = View::new(self.view.offset(), state.outer.limit());
            }
            BoundaryKind::ParseAt | BoundaryKind::ParseFrom => {
                if let Some(outer_stream) = state.outer_stream {
                    self.stream = *outer_stream;
                }
                self.view = state.outer;
            }
        }
        Ok(StepFlow::Continue)
    }

    /// One loop-frame boundary: finish the previous iteration (if any)
    /// and decide whether to run another.
    fn loop_boundary(&mut self) -> Result<StepFlow> {
        // Iteration-end bookkeeping first.
        let finished_value = {
            let frame = self.frames.last_mut().expect("caller checked");
            let Ctrl::Loop(state) = &mut frame.ctrl else {
                unreachable!();
            };
            if state.started {
                let value = self.current.take().unwrap_or(Value::Null);
                if state.collect {
                    state.items.push(value.clone());
                }
                Some(value)
            } else {
                None
            }
        };

        // `&until`: post-checked against the element just parsed.
        if let Some(value) = &finished_value {
            let until = {
                let frame = self.frames.last().expect("caller checked");
                let Ctrl::Loop(state) = &frame.ctrl else {
                    unreachable!();
                };
                match &state.kind {
                    LoopKind::Until(pred) => Some((pred.clone(), value.clone())),
                    _ => None,
                }
            };
            if let Some((pred, element)) = until {
                self.set_loop_dollar(Some(element));
                let stop = self.eval_bool(&pred)?;
                self.set_loop_dollar(None);
                if stop {
                    return self.exit_loop();
                }
            }
        }

        // Pre-check for the next iteration.
        if self.loop_pre_check()? {
            let frame = self.frames.last_mut().expect("caller checked");
            frame.step = 0;
            let Ctrl::Loop(state) = &mut frame.ctrl else {
                unreachable!();
            };
            state.started = true;
            self.current = None;
            Ok(StepFlow::Continue)
        } else {
            self.exit_loop()
        }
    }

    fn set_loop_dollar(&mut self, value: Option<Value>) {
        if let Some(frame) = self.frames.last_mut() {
            if let Ctrl::Loop(state) = &mut frame.ctrl {
                state.dollar = value;
            }
        }
    }

    /// Whether the loop should run another iteration. May suspend.
    fn loop_pre_check(&mut self) -> Result<bool> {
        let kind = {
            let frame = self.frames.last().expect("caller checked");
            let Ctrl::Loop(state) = &frame.ctrl else {
                unreachable!();
            };
            state.kind.clone()
        };

        match kind {
            LoopKind::Counter(count) => {
                let remaining = {
                    let frame = self.frames.last().expect("caller checked");
                    let Ctrl::Loop(state) = &frame.ctrl else {
                        unreachable!();
                    };
                    state.remaining
                };
                let mut remaining = match remaining {
                    Some(r) => r,
                    None => self.eval_u64(&count)?,
                };
                let run = remaining > 0;
                if run {
                    remaining -= 1;
                }
                let frame = self.frames.last_mut().expect("caller checked");
                let Ctrl::Loop(state) = &mut frame.ctrl else {
                    unreachable!();
                };
                state.remaining = Some(remaining);
                Ok(run)
            }
            LoopKind::WhileExpr(cond) => self.eval_bool(&cond),
            LoopKind::WhileLookAhead(tokens) => {
                if self.view.at_eod(&self.stream) {
                    return Ok(false);
                }
                match self.set_matches(&tokens)? {
                    Some(matched) => Ok(matched),
                    None => Err(self.missing_data()),
                }
            }
            LoopKind::Until(_) => Ok(true),
            LoopKind::Eod => {
                if self.view.size(&self.stream) > 0 {
                    Ok(true)
                } else if self.view.exhausted(&self.stream) {
                    Ok(false)
                } else {
                    Err(self.missing_data())
                }
            }
            LoopKind::ForEach(container) => {
                let initialized = {
                    let frame = self.frames.last().expect("caller checked");
                    let Ctrl::Loop(state) = &frame.ctrl else {
                        unreachable!();
                    };
                    state.queue.is_some()
                };
                if !initialized {
                    let value = self.eval(&container)?;
                    let Value::Vector(items) = value else {
                        return Err(ParseError::Internal(format!(
                            "foreach expects a container, got {value:?}"
                        )));
                    };
                    let frame = self.frames.last_mut().expect("caller checked");
                    let Ctrl::Loop(state) = &mut frame.ctrl else {
                        unreachable!();
                    };
                    state.queue = Some(items.into());
                }
                let frame = self.frames.last_mut().expect("caller checked");
                let Ctrl::Loop(state) = &mut frame.ctrl else {
                    unreachable!();
                };
                match state.queue.as_mut().expect("just initialized").pop_front() {
                    Some(element) => {
                        state.dollar = Some(element);
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
        }
    }

    fn exit_loop(&mut self) -> Result<StepFlow> {
        let frame = self.frames.pop().expect("caller checked");
        let Ctrl::Loop(state) = frame.ctrl else {
            unreachable!();
        };
        self.current = state.collect.then(|| Value::Vector(state.items));
        Ok(StepFlow::Continue)
    }

    /// Execute one step. The frame's step pointer advances only when
    /// the step completes, so a suspended step re-runs on resume.
    fn exec_step(&mut self, plan: PlanId, step: Step) -> Result<StepFlow> {
        match step {
            Step::MatchLiteral { token } => {
                self.match_literal(token)?;
                self.advance_step();
            }
            Step::MatchType { ty, bytes } => {
                self.match_type(plan, &ty, &bytes)?;
                self.advance_step();
            }
            Step::MatchRegex { regex, mode } => {
                self.match_regex(regex, mode)?;
                self.advance_step();
            }
            Step::TryLookAhead {
                set_a,
                set_b,
                default,
                block_a,
                block_b,
            } => {
                let chosen = self.choose_alternative(&set_a, &set_b, default)?;
                self.advance_step();
                let block = if chosen { block_a } else { block_b };
                self.push_frame(plan, block, Ctrl::Seq);
            }
            Step::Switch {
                scrutinee,
                cases,
                default,
            } => {
                let value = self.eval(&scrutinee)?;
                let mut target = default;
                for (case, block) in &cases {
                    let case_value = self.eval(case)?;
                    if values_equal(&value, &case_value) {
                        target = Some(*block);
                        break;
                    }
                }
                let Some(block) = target else {
                    return Err(ParseError::recoverable(
                        format!("no case matches {value:?}"),
                        self.view.offset(),
                    ));
                };
                self.advance_step();
                self.push_frame(plan, block, Ctrl::Seq);
            }
            Step::Call { plan: callee, args } => {
                if self.depth >= self.config.limits.recursion_limit {
                    return Err(ParseError::Internal(
                        "unit recursion limit exceeded".to_string(),
                    ));
                }
                let callee_plan = self.module.plan(callee);
                let mut unit = UnitValue::new(&callee_plan.name);
                let params = callee_plan.params.clone();
                let root = callee_plan.root;
                for (param, arg) in params.iter().zip(&args) {
                    let value = self.eval(arg)?;
                    unit.set(param.clone(), value);
                }
                self.advance_step();
                self.units.push(unit);
                self.depth += 1;
                self.current = None;
                self.push_frame(callee, root, Ctrl::Unit);
            }
            Step::Loop {
                kind,
                body,
                collect,
            } => {
                self.advance_step();
                self.frames.push(Frame {
                    plan,
                    block: body,
                    step: LOOP_ENTRY,
                    ctrl: Ctrl::Loop(LoopState {
                        kind,
                        collect,
                        items: Vec::new(),
                        started: false,
                        remaining: None,
                        queue: None,
                        dollar: None,
                    }),
                });
            }
            Step::IfCond {
                cond,
                then_block,
                else_block,
            } => {
                let taken = self.eval_bool(&cond)?;
                self.advance_step();
                if taken {
                    self.push_frame(plan, then_block, Ctrl::Seq);
                } else if let Some(block) = else_block {
                    self.push_frame(plan, block, Ctrl::Seq);
                }
            }
            Step::Skip { body } => {
                self.advance_step();
                self.push_frame(plan, body, Ctrl::SkipValue);
            }
            Step::AssignField {
                field,
                source,
                convert,
                requires,
            } => {
                let mut value = match &source {
                    Some(expr) => self.eval(expr)?,
                    None => self.current.take().ok_or_else(|| {
                        ParseError::Internal("assignment without a parsed value".to_string())
                    })?,
                };
                if let Some(requires) = &requires {
                    if !self.eval_with_dollar(requires, &value)?.as_bool().unwrap_or(false) {
                        return Err(ParseError::AssertionFailure(format!(
                            "&requires failed for field `{}`",
                            self.module.plan(plan).field(field).name
                        )));
                    }
                }
                if let Some(convert) = &convert {
                    value = self.eval_with_dollar(convert, &value)?;
                }
                let name = self.module.plan(plan).field(field).name.clone();
                self.units
                    .last_mut()
                    .ok_or_else(|| ParseError::Internal("no unit in scope".to_string()))?
                    .set(name, value);
                self.advance_step();
            }
            Step::RunHook { hook } => {
                self.run_hook(plan, hook, None, None)?;
                self.advance_step();
            }
            Step::SetBoundary { kind, arg, body } => {
                self.enter_boundary(plan, kind, &arg, body)?;
            }
            Step::Synchronize { body, token } => {
                let needle = match token {
                    Some(token) => self.token_needle(token)?,
                    None => None,
                };
                self.advance_step();
                self.frames.push(Frame {
                    plan,
                    block: body,
                    step: 0,
                    ctrl: Ctrl::Sync(SyncState {
                        needle,
                        attempt: self.view.offset(),
                        scan_from: self.view.offset(),
                        limit: self.view.limit(),
                        units_len: self.units.len(),
                        pending: None,
                    }),
                });
            }
            Step::Suspend => {
                self.advance_step();
                return Ok(StepFlow::Yield);
            }
        }
        Ok(StepFlow::Continue)
    }

    fn eval_with_dollar(&mut self, expr: &Expr, dollar: &Value) -> Result<Value> {
        let unit = self
            .units
            .last()
            .ok_or_else(|| ParseError::Internal("no unit in scope".to_string()))?;
        let scope = EvalScope {
            unit,
            dollar: Some(dollar),
        };
        eval_expr(expr, &scope, self.exprs.as_mut())
    }

    fn advance_step(&mut self) {
        self.scratch = None;
        if let Some(frame) = self.frames.last_mut() {
            frame.step += 1;
        }
    }

    fn push_frame(&mut self, plan: PlanId, block: BlockId, ctrl: Ctrl) {
        self.frames.push(Frame {
            plan,
            block,
            step: 0,
            ctrl,
        });
    }

    fn match_literal(&mut self, token: TokenId) -> Result<()> {
        let literal = self.module.literal(token).value.clone();
        match literal {
            LiteralValue::Bytes(expected) => {
                self.consume_literal(expected.as_slice())?;
                self.current = Some(Value::Bytes(expected));
            }
            LiteralValue::UInt { value, ty } => {
                let needle = decode::encode_uint(value, &ty)?;
                self.consume_literal(&needle)?;
                self.current = Some(Value::UInt(value));
            }
            LiteralValue::Regex(regex) => {
                self.match_regex(regex, RegexMode::Exact)?;
            }
        }
        Ok(())
    }

    fn consume_literal(&mut self, needle: &[u8]) -> Result<()> {
        let n = needle.len() as u64;
        self.view.require(&self.stream, n).map_err(|err| {
            match err {
                ParseError::Recoverable { offset, .. } => ParseError::recoverable(
                    format!("expected {:?}", Bytes::from(needle)),
                    offset,
                ),
                other => other,
            }
        })?;
        let have = self.stream.slice(self.view.offset(), self.view.offset() + n)?;
        if have != needle {
            return Err(ParseError::recoverable(
                format!("expected {:?}", Bytes::from(needle)),
                self.view.offset(),
            ));
        }
        self.view = self.view.advance(&self.stream, n)?;
        Ok(())
    }

    fn match_regex(&mut self, regex: wiregram_plan::RegexId, mode: RegexMode) -> Result<()> {
        let at = self.view.offset();

        let mut state = match self.scratch.take() {
            Some(Scratch::Regex { at: scratch_at, state }) if scratch_at == at => state,
            _ => self.regexes[regex.index()].start()?,
        };

        let re = &self.regexes[regex.index()];
        match re.advance_view(&mut state, &self.stream, self.view)? {
            Some(len) => {
                let matched = self.stream.slice(at, at + len)?;
                if mode != RegexMode::LookAhead {
                    self.view = self.view.advance(&self.stream, len)?;
                }
                self.current = Some(Value::bytes(matched));
                Ok(())
            }
            None => {
                self.scratch = Some(Scratch::Regex { at, state });
                Err(self.missing_data())
            }
        }
    }

    fn match_type(&mut self, plan: PlanId, ty: &ParseType, bytes: &BytesAttrs) -> Result<()> {
        if let Some(size) = decode::fixed_size(ty) {
            self.view.require(&self.stream, size)?;
            let raw = self
                .stream
                .slice(self.view.offset(), self.view.offset() + size)?;
            let value = decode::decode_fixed(ty, &raw)?;
            self.view = self.view.advance(&self.stream, size)?;
            self.current = Some(value);
            return Ok(());
        }
        self.match_bytes(plan, bytes)
    }

    /// Byte runs: extent from `&size`, `&until`, or `&eod`.
    fn match_bytes(&mut self, plan: PlanId, attrs: &BytesAttrs) -> Result<()> {
        let at = self.view.offset();

        if let Some(size) = &attrs.size {
            let n = self.eval_u64(size)?;
            self.deliver_chunks(plan, attrs, at, at + n)?;
            self.view.require(&self.stream, n)?;
            let value = self.stream.slice(at, at + n)?;
            self.view = self.view.advance(&self.stream, n)?;
            self.current = Some(Value::bytes(value));
            return Ok(());
        }

        if let Some(token) = attrs.until {
            let needle = self.token_needle(token)?.ok_or_else(|| {
                ParseError::Internal("`&until` terminator must be a byte literal".to_string())
            })?;
            let from = match self.scratch.take() {
                Some(Scratch::UntilScan { at: scratch_at, resume }) if scratch_at == at => {
                    resume
                }
                _ => at,
            };
            match self.stream.find_bytes(&needle, from, self.view.limit()) {
                FindOutcome::Found(offset) => {
                    let value_end = if attrs.until_including {
                        offset + needle.len() as u64
                    } else {
                        offset
                    };
                    let value = self.stream.slice(at, value_end)?;
                    self.deliver_chunk_slice(plan, attrs, &value)?;
                    self.view = self
                        .view
                        .advance_to(&self.stream, offset + needle.len() as u64)?;
                    self.current = Some(Value::bytes(value));
                    Ok(())
                }
                FindOutcome::Partial(resume) => {
                    self.scratch = Some(Scratch::UntilScan { at, resume });
                    Err(self.missing_data())
                }
                FindOutcome::NotFound => Err(ParseError::recoverable(
                    "unterminated field: terminator not found",
                    at,
                )),
            }
        } else if attrs.eod {
            let end = self
                .view
                .limit()
                .map_or(self.stream.end_offset(), |l| l.min(self.stream.end_offset()));
            self.deliver_chunks(plan, attrs, at, end)?;
            if !self.view.exhausted(&self.stream) {
                return Err(self.missing_data());
            }
            let value = self.stream.slice(at, end)?;
            self.view = self.view.advance_to(&self.stream, end)?;
            self.current = Some(Value::bytes(value));
            Ok(())
        } else if let Some(limit) = self.view.limit() {
            // Inside a bounded region a bare bytes field takes the rest.
            let end = limit;
            self.deliver_chunks(plan, attrs, at, end)?;
            self.view.require(&self.stream, end - at)?;
            let value = self.stream.slice(at, end)?;
            self.view = self.view.advance_to(&self.stream, end)?;
            self.current = Some(Value::bytes(value));
            Ok(())
        } else {
            Err(ParseError::Internal(
                "bytes field has no length: needs `&size`, `&until`, or `&eod`".to_string(),
            ))
        }
    }

    /// Incremental `&chunked` delivery of `[at, target_end)` as bytes
    /// arrive; tracks the watermark so nothing is delivered twice.
    fn deliver_chunks(
        &mut self,
        plan: PlanId,
        attrs: &BytesAttrs,
        at: u64,
        target_end: u64,
    ) -> Result<()> {
        let Some(hook) = attrs.chunked else {
            return Ok(());
        };
        let delivered = match &self.scratch {
            Some(Scratch::Chunked { at: scratch_at, delivered }) if *scratch_at == at => {
                *delivered
            }
            _ => 0,
        };
        let available = target_end.min(self.stream.end_offset());
        if at + delivered < available {
            let data = self.stream.slice(at + delivered, available)?;
            self.run_hook(plan, hook, Some(&data), None)?;
            self.scratch = Some(Scratch::Chunked {
                at,
                delivered: available - at,
            });
        }
        Ok(())
    }

    fn deliver_chunk_slice(
        &mut self,
        plan: PlanId,
        attrs: &BytesAttrs,
        data: &[u8],
    ) -> Result<()> {
        let Some(hook) = attrs.chunked else {
            return Ok(());
        };
        self.run_hook(plan, hook, Some(data), None)
    }

    /// Decide an LL(1) alternative. `true` = first.
    fn choose_alternative(
        &mut self,
        set_a: &[TokenId],
        set_b: &[TokenId],
        default: LookAheadDefault,
    ) -> Result<bool> {
        match self.set_matches(set_a)? {
            Some(true) => return Ok(true),
            Some(false) => {}
            None => return Err(self.missing_data()),
        }
        match self.set_matches(set_b)? {
            Some(true) => return Ok(false),
            Some(false) => {}
            None => return Err(self.missing_data()),
        }
        match default {
            LookAheadDefault::First => Ok(true),
            LookAheadDefault::Second => Ok(false),
            LookAheadDefault::None => Err(ParseError::recoverable(
                "no look-ahead alternative matches",
                self.view.offset(),
            )),
        }
    }

    fn enter_boundary(
        &mut self,
        plan: PlanId,
        kind: BoundaryKind,
        arg: &Expr,
        body: BlockId,
    ) -> Result<()> {
        let outer = self.view;
        let state = match kind {
            BoundaryKind::Size | BoundaryKind::MaxSize => {
                let n = self.eval_u64(arg)?;
                let region_end = outer.offset() + n;
                if let Some(limit) = outer.limit() {
                    if region_end > limit {
                        return Err(ParseError::recoverable(
                            "bounded region exceeds the enclosing bound",
                            outer.offset(),
                        ));
                    }
                }
                self.view = outer.with_limit(region_end);
                BoundaryState {
                    kind,
                    outer,
                    region_end: Some(region_end),
                    outer_stream: None,
                }
            }
            BoundaryKind::ParseAt => {
                let offset = self.eval_u64(arg)?;
                self.view = View::new(offset, outer.limit());
                BoundaryState {
                    kind,
                    outer,
                    region_end: None,
                    outer_stream: None,
                }
            }
            BoundaryKind::ParseFrom => {
                let value = self.eval(arg)?;
                let Value::Bytes(data) = value else {
                    return Err(ParseError::ContextMismatch(format!(
                        "`&parse-from` expects bytes, got {value:?}"
                    )));
                };
                let mut secondary = Stream::new();
                secondary.append(data.into_vec())?;
                secondary.freeze();
                let outer_stream = std::mem::replace(&mut self.stream, secondary);
                self.view = View::new(0, None);
                BoundaryState {
                    kind,
                    outer,
                    region_end: None,
                    outer_stream: Some(Box::new(outer_stream)),
                }
            }
        };
        self.advance_step();
        self.frames.push(Frame {
            plan,
            block: body,
            step: 0,
            ctrl: Ctrl::Boundary(state),
        });
        Ok(())
    }
}

/// Loose equality for switch dispatch: numeric values compare across
/// signedness.
fn values_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a.as_u64(), b.as_u64()) {
        (Some(x), Some(y)) => x == y,
        _ => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}
