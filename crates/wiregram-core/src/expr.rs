//! Opaque user expressions.
//!
//! The core never interprets expression bodies; it only fixes where they
//! evaluate. The three built-in forms cover what the parsing machinery
//! itself needs (constants, sibling-field reads, the `$$` element
//! binding); everything else is a `Host` expression delegated to the
//! embedding host through `ExprHost`.

use serde::{Deserialize, Serialize};

use crate::ids::ExprId;
use crate::value::Value;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A constant known at grammar-build time. Persists through the
    /// tagged value codec; `Value`'s plain serialization is the
    /// write-only display form.
    Const(#[serde(with = "crate::value::codec")] Value),
    /// Reads a previously parsed field of the current unit.
    FieldRef(String),
    /// `$$`: the element currently being parsed in a container body.
    Dollar,
    /// Evaluated by the host.
    Host(ExprId),
}

impl Expr {
    pub fn uint(v: u64) -> Self {
        Expr::Const(Value::UInt(v))
    }

    pub fn boolean(v: bool) -> Self {
        Expr::Const(Value::Bool(v))
    }

    /// The constant value, if this expression is a literal.
    pub fn as_const(&self) -> Option<&Value> {
        match self {
            Expr::Const(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Const(v) => write!(f, "{v:?}"),
            Expr::FieldRef(name) => write!(f, "self.{name}"),
            Expr::Dollar => write!(f, "$$"),
            Expr::Host(id) => write!(f, "host({id})"),
        }
    }
}
