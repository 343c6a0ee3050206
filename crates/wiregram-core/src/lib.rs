#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Core data structures shared by the wiregram compiler and runtime.
//!
//! This crate defines the vocabulary both sides of the pipeline speak:
//! stable ids, source locations, runtime values, parseable primitive
//! types, opaque user expressions, field attributes, and the error
//! strata. It has no opinion on how grammars are built or how bytes are
//! consumed; those live in `wiregram-compiler` and `wiregram-rt`.

pub mod attr;
pub mod error;
pub mod expr;
pub mod ids;
pub mod location;
pub mod types;
pub mod value;

pub use attr::{AttrKind, Attribute, AttributeSet};
pub use error::{ParseError, Result};
pub use expr::Expr;
pub use ids::{BlockId, ExprId, FieldId, HookId, PlanId, ProductionId, TokenId};
pub use location::Location;
pub use types::{AddressFamily, BitOrder, BitRange, ByteOrder, ParseType, RealFormat};
pub use value::{Bytes, FieldState, UnitValue, Value};
