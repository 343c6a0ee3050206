#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Grammar model, LL(1) analysis, and parser synthesis.
//!
//! The pipeline: a resolved [`unit::UnitDescription`] lowers into a
//! [`grammar::Grammar`] ([`build`]), `finalize` runs the analyzer and
//! freezes FIRST/FOLLOW/look-ahead tables ([`analyze`]), and
//! [`synth::synthesize`] lowers the analyzed grammar into an executable
//! [`wiregram_plan::Module`]. All construction problems surface as
//! [`diagnostics::Diagnostics`] before any parsing starts.

pub mod analyze;
pub mod build;
pub mod diagnostics;
pub mod grammar;
pub mod synth;
pub mod unit;

pub use build::build_grammar;
pub use diagnostics::{DiagnosticMessage, Diagnostics, DiagnosticsPrinter, Severity};
pub use grammar::{Ctor, CtorIntType, Grammar, Production, ProductionKind, WhileMode};
pub use synth::{synthesize, synthesize_with, SynthOptions};
pub use unit::{FieldDescription, FieldItem, HookSpec, RepeatSpec, UnitDescription};

use wiregram_plan::Module;

/// A compiled module plus the warnings finalization produced.
#[derive(Debug)]
pub struct CompileOutput {
    pub module: Module,
    pub warnings: Diagnostics,
}

/// Run the whole pipeline: build, finalize, synthesize.
pub fn compile(units: &[UnitDescription]) -> Result<CompileOutput, Diagnostics> {
    compile_with(units, SynthOptions::default())
}

pub fn compile_with(
    units: &[UnitDescription],
    options: SynthOptions,
) -> Result<CompileOutput, Diagnostics> {
    let mut grammar = build_grammar(units)?;
    let warnings = grammar.finalize()?;
    let module = synthesize_with(&grammar, options)?;
    Ok(CompileOutput { module, warnings })
}

#[cfg(test)]
mod analyze_tests;
#[cfg(test)]
mod build_tests;
#[cfg(test)]
mod test_util;
