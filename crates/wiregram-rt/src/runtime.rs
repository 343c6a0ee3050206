//! Process-wide runtime state: configuration and the parser registry.
//!
//! Created by `init`, destroyed by `done`. `init` is idempotent; any
//! entry point called after `done` (or before `init`) fails with an
//! internal error. Registered modules are immutable and shared, so
//! drivers can be created from any thread even though each driver is
//! itself single-threaded.

use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use wiregram_core::{ParseError, Result, UnitValue};
use wiregram_plan::{Manifest, Module, ParserEntry, Protocol};

use crate::driver::Driver;

/// Runtime-wide configuration, fixed at `init`.
#[derive(Clone, Copy, Debug)]
pub struct RuntimeConfig {
    /// Enables verbose tracing in embedders that ask for it.
    pub debug: bool,
    /// Frame stacks pre-allocated for parser activations.
    pub primed_activations: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            debug: false,
            primed_activations: 8,
        }
    }
}

/// A public parser known to the registry.
#[derive(Clone, Debug)]
pub struct RegisteredParser {
    pub entry: ParserEntry,
    pub module: Arc<Module>,
}

struct GlobalState {
    config: RuntimeConfig,
    parsers: IndexMap<String, RegisteredParser>,
}

static STATE: Mutex<Option<GlobalState>> = Mutex::new(None);

fn with_state<T>(f: impl FnOnce(&mut GlobalState) -> Result<T>) -> Result<T> {
    let mut guard = STATE.lock().map_err(|_| {
        ParseError::Internal("runtime state poisoned".to_string())
    })?;
    match guard.as_mut() {
        Some(state) => f(state),
        None => Err(ParseError::Internal(
            "runtime is not initialized".to_string(),
        )),
    }
}

/// Initialize the global runtime. Idempotent.
pub fn init() {
    init_with(RuntimeConfig::default());
}

pub fn init_with(config: RuntimeConfig) {
    crate::machine::prime_activations(config.primed_activations);
    let mut guard = STATE.lock().unwrap_or_else(|e| e.into_inner());
    if guard.is_none() {
        *guard = Some(GlobalState {
            config,
            parsers: IndexMap::new(),
        });
    }
}

/// Tear the runtime down. Every entry point fails afterwards until the
/// next `init`.
pub fn done() {
    let mut guard = STATE.lock().unwrap_or_else(|e| e.into_inner());
    *guard = None;
}

pub fn is_initialized() -> bool {
    STATE
        .lock()
        .map(|guard| guard.is_some())
        .unwrap_or(false)
}

pub fn config() -> Result<RuntimeConfig> {
    with_state(|state| Ok(state.config))
}

/// Register every parser a manifest names against its module.
pub fn register_manifest(manifest: &Manifest, module: &Arc<Module>) -> Result<()> {
    for entry in &manifest.parsers {
        register_parser(entry.clone(), Arc::clone(module))?;
    }
    Ok(())
}

pub fn register_parser(entry: ParserEntry, module: Arc<Module>) -> Result<()> {
    if module.entry(&entry.entry).is_none() {
        return Err(ParseError::ContextMismatch(format!(
            "manifest entry `{}` names unit `{}` which the module does not define",
            entry.name, entry.entry
        )));
    }
    with_state(|state| {
        state
            .parsers
            .insert(entry.name.clone(), RegisteredParser { entry, module });
        Ok(())
    })
}

pub fn parser_by_name(name: &str) -> Result<RegisteredParser> {
    with_state(|state| {
        state.parsers.get(name).cloned().ok_or_else(|| {
            ParseError::ContextMismatch(format!("no parser registered as `{name}`"))
        })
    })
}

pub fn parser_by_mime(mime: &str) -> Result<RegisteredParser> {
    with_state(|state| {
        state
            .parsers
            .values()
            .find(|p| p.entry.mime_types.iter().any(|m| m == mime))
            .cloned()
            .ok_or_else(|| {
                ParseError::ContextMismatch(format!(
                    "no parser registered for MIME type `{mime}`"
                ))
            })
    })
}

pub fn parser_by_port(port: u16, protocol: Protocol) -> Result<RegisteredParser> {
    with_state(|state| {
        state
            .parsers
            .values()
            .find(|p| {
                p.entry
                    .ports
                    .iter()
                    .any(|spec| spec.port == port && spec.protocol == protocol)
            })
            .cloned()
            .ok_or_else(|| {
                ParseError::ContextMismatch(format!(
                    "no parser registered for port {port}"
                ))
            })
    })
}

/// A fresh driver for a registered parser.
pub fn driver_for(name: &str) -> Result<Driver> {
    let parser = parser_by_name(name)?;
    Driver::new(parser.module, &parser.entry.entry)
}

pub fn driver_for_mime(mime: &str) -> Result<Driver> {
    let parser = parser_by_mime(mime)?;
    Driver::new(parser.module, &parser.entry.entry)
}

/// Type-erased parse result, for hosts that dispatch on parser names
/// chosen at runtime.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedUnit {
    parser: String,
    unit: Option<UnitValue>,
}

impl ParsedUnit {
    pub fn empty(parser: impl Into<String>) -> Self {
        Self {
            parser: parser.into(),
            unit: None,
        }
    }

    pub fn parser(&self) -> &str {
        &self.parser
    }

    pub fn is_set(&self) -> bool {
        self.unit.is_some()
    }

    pub fn get(&self) -> Result<&UnitValue> {
        self.unit.as_ref().ok_or_else(|| {
            ParseError::ContextMismatch("parsed unit holds no value".to_string())
        })
    }

    pub fn set(&mut self, unit: UnitValue) {
        self.unit = Some(unit);
    }
}

/// Parse a complete input with a registered parser into a type-erased
/// wrapper.
pub fn parse_erased(name: &str, input: &[u8]) -> Result<ParsedUnit> {
    let mut driver = driver_for(name)?;
    driver.process(input)?;
    let unit = driver.finish()?;
    let mut parsed = ParsedUnit::empty(name);
    parsed.set(unit);
    Ok(parsed)
}
