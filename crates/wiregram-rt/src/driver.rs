//! The externally visible entry point: feed bytes, get a unit value.
//!
//! A driver owns one parser activation over one input stream. Each
//! `process` call transfers the chunk into the stream and resumes the
//! activation; the driver reports completion, suspension, or error.
//! Fatal errors latch: further calls fail immediately until `reset`.

use std::sync::Arc;

use wiregram_core::{ParseError, PlanId, Result, UnitValue};
use wiregram_plan::Module;

use crate::fiber::{Resumable, Status};
use crate::hooks::{ExprHost, HookHost, NoopHost};
use crate::machine::{MachineConfig, ParseMachine};

/// Public description of a parser, for host introspection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParserInfo {
    pub name: String,
    pub params: Vec<String>,
    pub fields: Vec<String>,
}

/// Outcome of a `process` call that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverStatus {
    /// The activation suspended waiting for more input.
    NeedMoreData,
    /// The unit value is complete; collect it with `finish`.
    Finished,
}

#[derive(Debug)]
pub struct Driver {
    module: Arc<Module>,
    entry: PlanId,
    config: MachineConfig,
    activation: Resumable<ParseMachine>,
    failed: Option<ParseError>,
    result: Option<UnitValue>,
}

impl Driver {
    /// Create a driver for a public parser, with no embedding host.
    pub fn new(module: Arc<Module>, parser: &str) -> Result<Self> {
        Self::with_hosts(
            module,
            parser,
            Box::new(NoopHost),
            Box::new(NoopHost),
            MachineConfig::default(),
        )
    }

    pub fn with_hosts(
        module: Arc<Module>,
        parser: &str,
        hooks: Box<dyn HookHost>,
        exprs: Box<dyn ExprHost>,
        config: MachineConfig,
    ) -> Result<Self> {
        let entry = module.entry(parser).ok_or_else(|| {
            ParseError::ContextMismatch(format!("no parser named `{parser}`"))
        })?;
        let machine =
            ParseMachine::with_hosts(Arc::clone(&module), entry, hooks, exprs, config)?;
        Ok(Self {
            module,
            entry,
            config,
            activation: Resumable::execute(machine),
            failed: None,
            result: None,
        })
    }

    /// Append a chunk and run the activation. Ownership of the bytes
    /// moves into the stream; nothing is copied on the way in.
    pub fn process(&mut self, bytes: impl Into<Vec<u8>>) -> Result<DriverStatus> {
        self.check_usable()?;
        self.activation
            .machine_mut()
            .stream_mut()
            .append(bytes)?;
        self.pump()
    }

    /// Report a hole in the input, as a sink does for missing segments.
    pub fn process_gap(&mut self, len: u64) -> Result<DriverStatus> {
        self.check_usable()?;
        self.activation.machine_mut().stream_mut().append_gap(len)?;
        self.pump()
    }

    /// Declare end-of-input and collect the unit value.
    pub fn finish(&mut self) -> Result<UnitValue> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        if self.result.is_none() {
            self.activation.machine_mut().stream_mut().freeze();
            self.pump()?;
        }
        self.result.take().ok_or_else(|| {
            ParseError::Internal("activation still pending over a frozen stream".to_string())
        })
    }

    /// Parse into an existing unit value.
    pub fn finish_into(&mut self, target: &mut UnitValue) -> Result<()> {
        *target = self.finish()?;
        Ok(())
    }

    /// Drop all parse state and start over on a fresh stream.
    pub fn reset(&mut self) -> Result<()> {
        let machine = ParseMachine::new(Arc::clone(&self.module), self.entry)?;
        self.activation = Resumable::execute(machine);
        self.failed = None;
        self.result = None;
        Ok(())
    }

    pub fn parser_info(&self) -> ParserInfo {
        let plan = self.module.plan(self.entry);
        ParserInfo {
            name: plan.name.clone(),
            params: plan.params.clone(),
            fields: plan
                .fields
                .iter()
                .filter(|f| !f.anonymous)
                .map(|f| f.name.clone())
                .collect(),
        }
    }

    /// Total bytes the activation has consumed so far.
    pub fn bytes_consumed(&self) -> u64 {
        self.activation.machine().offset()
    }

    fn check_usable(&self) -> Result<()> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        if self.result.is_some() {
            return Err(ParseError::Internal(
                "driver already finished; call reset() first".to_string(),
            ));
        }
        Ok(())
    }

    fn pump(&mut self) -> Result<DriverStatus> {
        loop {
            match self.activation.resume() {
                Status::Done => {
                    let result = self
                        .activation
                        .take_result()
                        .expect("Done implies a result");
                    return match result {
                        Ok(unit) => {
                            self.result = Some(unit);
                            Ok(DriverStatus::Finished)
                        }
                        // Any surfaced error ends this parse; `reset`
                        // starts a new one.
                        Err(err) => {
                            self.failed = Some(err.clone());
                            Err(err)
                        }
                    };
                }
                Status::Suspended => {
                    let machine = self.activation.machine_mut();
                    if self.config.auto_trim {
                        let watermark = machine.trim_watermark();
                        machine.stream_mut().trim(watermark);
                    }
                    if machine.take_yielded() {
                        continue;
                    }
                    return Ok(DriverStatus::NeedMoreData);
                }
            }
        }
    }
}

/// One-shot convenience: feed the whole input and finish.
pub fn parse(module: Arc<Module>, parser: &str, input: &[u8]) -> Result<UnitValue> {
    let mut driver = Driver::new(module, parser)?;
    driver.process(input)?;
    driver.finish()
}
