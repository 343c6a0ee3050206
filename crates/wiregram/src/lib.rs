#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! wiregram: declarative binary-format grammars compiled into
//! incremental stream parsers.
//!
//! # Example
//!
//! ```
//! use wiregram::{Ctor, FieldDescription, FieldItem, ParserSet, UnitDescription};
//!
//! let request = UnitDescription::new("RequestLine")
//!     .with_field(FieldDescription::new("method", FieldItem::Ctor(Ctor::regex("[A-Z]+"))))
//!     .with_field(FieldDescription::anonymous_item(FieldItem::Ctor(Ctor::bytes(" "))))
//!     .with_field(FieldDescription::new("uri", FieldItem::Ctor(Ctor::regex("[^ ]+"))));
//!
//! let parsers = ParserSet::compile(&[request]).expect("valid grammar");
//! let unit = parsers.parse("RequestLine", b"GET /index").expect("parses");
//! assert_eq!(unit.get("method"), Some(&wiregram::Value::bytes("GET")));
//! ```

use std::sync::Arc;

pub use wiregram_compiler::{
    build_grammar, compile, compile_with, CompileOutput, Ctor, DiagnosticMessage, Diagnostics,
    DiagnosticsPrinter, FieldDescription, FieldItem, Grammar, HookSpec, RepeatSpec, Severity,
    SynthOptions, UnitDescription,
};
pub use wiregram_core::{
    AttrKind, Attribute, AttributeSet, Bytes, ByteOrder, Expr, FieldState, Location,
    ParseError, ParseType, UnitValue, Value,
};
pub use wiregram_plan::{
    Artifact, ArtifactError, LookAheadDefault, Manifest, Module, ParserEntry, PortSpec,
    Protocol,
};
pub use wiregram_rt::{
    parse, Driver, DriverStatus, ExprHost, HookContext, HookHost, MachineConfig, ParserInfo,
    Sink, SinkPolicy,
};

/// A compiled set of parsers with a shared, immutable module.
///
/// The module is reference-counted: drivers created from one set share
/// it without copying, which is the intended way to run many parses of
/// the same grammar.
#[derive(Clone, Debug)]
pub struct ParserSet {
    module: Arc<Module>,
    warnings: Diagnostics,
}

impl ParserSet {
    /// Compile unit descriptions into an executable parser set.
    pub fn compile(units: &[UnitDescription]) -> Result<Self, Diagnostics> {
        Self::compile_with(units, SynthOptions::default())
    }

    pub fn compile_with(
        units: &[UnitDescription],
        options: SynthOptions,
    ) -> Result<Self, Diagnostics> {
        let output = compile_with(units, options)?;
        Ok(Self {
            module: Arc::new(output.module),
            warnings: output.warnings,
        })
    }

    /// Load a parser set from a persisted artifact.
    pub fn open(bytes: &[u8]) -> Result<Self, ArtifactError> {
        let artifact = Artifact::open(bytes)?;
        Ok(Self {
            module: Arc::new(artifact.module),
            warnings: Diagnostics::new(),
        })
    }

    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub fn warnings(&self) -> &Diagnostics {
        &self.warnings
    }

    /// A fresh driver for one of the compiled units.
    pub fn driver(&self, unit: &str) -> Result<Driver, ParseError> {
        Driver::new(Arc::clone(&self.module), unit)
    }

    /// One-shot parse of a complete input.
    pub fn parse(&self, unit: &str, input: &[u8]) -> Result<UnitValue, ParseError> {
        parse(Arc::clone(&self.module), unit, input)
    }

    /// Package the module with a manifest for persistence.
    pub fn into_artifact(&self, manifest: Manifest) -> Artifact {
        Artifact::new(manifest, (*self.module).clone())
    }
}

#[cfg(test)]
mod lib_tests;
