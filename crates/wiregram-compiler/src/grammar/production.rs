//! The production variants describing a unit's parse structure.

use std::collections::BTreeSet;

use wiregram_core::{
    AttributeSet, Expr, FieldId, HookId, Location, ParseType, ProductionId, TokenId,
};
use wiregram_plan::{FieldInfo, HookInfo, LookAheadDefault};

use wiregram_core::Bytes;

/// A literal constructor: the concrete value of a literal production.
///
/// Equal ctors intern to the same look-ahead token.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Ctor {
    Bytes(Bytes),
    UInt { value: u64, ty: CtorIntType },
    Regex(String),
}

/// Wire encoding of an integer ctor. A reduced mirror of `ParseType`
/// that stays `Eq + Hash` for interning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CtorIntType {
    pub bits: u8,
    pub big_endian: bool,
}

impl Ctor {
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Ctor::Bytes(data.into())
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Ctor::Regex(pattern.into())
    }
}

impl std::fmt::Display for Ctor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ctor::Bytes(b) => write!(f, "b\"{b}\""),
            Ctor::UInt { value, ty } => write!(f, "{value}:u{}", ty.bits),
            Ctor::Regex(p) => write!(f, "/{p}/"),
        }
    }
}

/// Termination mode of a `While` production.
#[derive(Clone, Debug, PartialEq)]
pub enum WhileMode {
    /// Pre-checked condition.
    Cond(Expr),
    /// Post-checked predicate over `$$`; the terminating element is kept.
    Until(Expr),
    /// Run until end-of-data.
    Eod,
    /// Run while the next token is in the body's FIRST set.
    LookAhead,
}

/// Per-field metadata the synthesizer needs beyond plan storage info.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitField {
    pub info: FieldInfo,
    pub convert: Option<Expr>,
    pub requires: Option<Expr>,
}

/// The body, parameters, and tables of a unit type. Present on the
/// canonical `Unit` production for the type; embeds carry only the name
/// and arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitDef {
    pub params: Vec<String>,
    pub body: Vec<ProductionId>,
    pub fields: Vec<UnitField>,
    pub hooks: Vec<HookInfo>,
    pub attrs: AttributeSet,
}

/// The closed set of production variants.
#[derive(Clone, Debug, PartialEq)]
pub enum ProductionKind {
    /// Matches empty input.
    Epsilon,

    /// Matches a specific literal; usable as a look-ahead token.
    Ctor { ctor: Ctor, token: TokenId },

    /// Matches a value of a parseable primitive type.
    TypeLiteral { ty: ParseType },

    /// A field whose parse size derives from its type and attributes.
    Variable { ty: ParseType, attrs: AttributeSet },

    /// Matches each sub-production in order.
    Sequence { elements: Vec<ProductionId> },

    /// A sequence guarded by a runtime condition, with boundary
    /// attributes and an optional else branch.
    Block {
        body: Vec<ProductionId>,
        condition: Option<Expr>,
        else_body: Vec<ProductionId>,
        attrs: AttributeSet,
    },

    /// LL(1) choice between two alternatives. The look-ahead sets are
    /// computed by the analyzer during `finalize`.
    LookAhead {
        alt1: ProductionId,
        alt2: ProductionId,
        default: LookAheadDefault,
        condition: Option<Expr>,
        lahs: Option<(BTreeSet<TokenId>, BTreeSet<TokenId>)>,
    },

    /// Value-based dispatch.
    Switch {
        scrutinee: Expr,
        cases: Vec<(Expr, ProductionId)>,
        default: Option<ProductionId>,
        attrs: AttributeSet,
    },

    /// Repeat the body N times.
    Counter { count: Expr, body: ProductionId },

    /// Repeat until the mode says stop.
    While { mode: WhileMode, body: ProductionId },

    /// Iterate over an existing container.
    ForEach { container: Expr, body: ProductionId },

    /// Parse and discard the inner value.
    Skip { inner: ProductionId },

    /// Nameable wrapper enabling begin/finish hooks.
    Enclosure {
        inner: ProductionId,
        begin: Option<HookId>,
        end: Option<HookId>,
    },

    /// Recursively embed a unit type. The canonical production for a
    /// type carries `def`; an embed instead points at the canonical one
    /// (possibly through a `Deferred` while the grammar is still being
    /// built) and carries the instantiation arguments.
    Unit {
        name: String,
        args: Vec<Expr>,
        target: Option<ProductionId>,
        def: Option<UnitDef>,
    },

    /// Non-owning pointer to another production in the same grammar.
    Reference { target: ProductionId },

    /// Placeholder resolved in place during grammar construction.
    Deferred { target: Option<ProductionId> },
}

/// A node in the grammar: a stable symbol, an optional source location,
/// an optional owning-field back-reference, and the variant payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Production {
    pub symbol: String,
    pub location: Option<Location>,
    /// Field this production's value stores into, within its unit.
    pub field: Option<FieldId>,
    pub kind: ProductionKind,
}

impl Production {
    pub fn new(symbol: impl Into<String>, kind: ProductionKind) -> Self {
        Self {
            symbol: symbol.into(),
            location: None,
            field: None,
            kind,
        }
    }

    pub fn with_location(mut self, location: Option<Location>) -> Self {
        self.location = location;
        self
    }

    pub fn with_field(mut self, field: FieldId) -> Self {
        self.field = Some(field);
        self
    }

    /// True iff this variant matches with no sub-production scheduling.
    pub fn is_atomic(&self) -> bool {
        matches!(
            self.kind,
            ProductionKind::Epsilon
                | ProductionKind::Ctor { .. }
                | ProductionKind::TypeLiteral { .. }
                | ProductionKind::Variable { .. }
        )
    }

    /// True iff the analyzer may use this production as a look-ahead
    /// token.
    pub fn is_literal(&self) -> bool {
        matches!(self.kind, ProductionKind::Ctor { .. })
    }

    /// The deterministic token id of a literal production.
    pub fn token_id(&self) -> Option<TokenId> {
        match &self.kind {
            ProductionKind::Ctor { token, .. } => Some(*token),
            _ => None,
        }
    }

    /// All direct structural children, used by traversals.
    pub fn child_ids(&self) -> Vec<ProductionId> {
        match &self.kind {
            ProductionKind::Epsilon
            | ProductionKind::Ctor { .. }
            | ProductionKind::TypeLiteral { .. }
            | ProductionKind::Variable { .. } => Vec::new(),
            ProductionKind::Sequence { elements } => elements.clone(),
            ProductionKind::Block {
                body, else_body, ..
            } => body.iter().chain(else_body).copied().collect(),
            ProductionKind::LookAhead { alt1, alt2, .. } => vec![*alt1, *alt2],
            ProductionKind::Switch { cases, default, .. } => cases
                .iter()
                .map(|(_, p)| *p)
                .chain(default.iter().copied())
                .collect(),
            ProductionKind::Counter { body, .. }
            | ProductionKind::While { body, .. }
            | ProductionKind::ForEach { body, .. } => vec![*body],
            ProductionKind::Skip { inner } | ProductionKind::Enclosure { inner, .. } => {
                vec![*inner]
            }
            ProductionKind::Unit { target, def, .. } => match def {
                Some(d) => d.body.clone(),
                None => target.iter().copied().collect(),
            },
            ProductionKind::Reference { target } => vec![*target],
            ProductionKind::Deferred { target } => target.iter().copied().collect(),
        }
    }

    /// Alternative right-hand sides as sequences of sub-productions.
    ///
    /// Atomic productions have no RHS; alternation variants return one
    /// RHS per alternative. `Reference` and `Deferred` forward to their
    /// target as a single-element RHS.
    pub fn rhss(&self) -> Vec<Vec<ProductionId>> {
        match &self.kind {
            ProductionKind::Epsilon => vec![vec![]],
            ProductionKind::Ctor { .. }
            | ProductionKind::TypeLiteral { .. }
            | ProductionKind::Variable { .. } => Vec::new(),
            ProductionKind::Sequence { elements } => vec![elements.clone()],
            ProductionKind::Block {
                body, else_body, ..
            } => {
                let mut rhss = vec![body.clone()];
                if !else_body.is_empty() {
                    rhss.push(else_body.clone());
                }
                rhss
            }
            ProductionKind::LookAhead { alt1, alt2, .. } => {
                vec![vec![*alt1], vec![*alt2]]
            }
            ProductionKind::Switch { cases, default, .. } => cases
                .iter()
                .map(|(_, p)| vec![*p])
                .chain(default.iter().map(|p| vec![*p]))
                .collect(),
            ProductionKind::Counter { body, .. }
            | ProductionKind::While { body, .. }
            | ProductionKind::ForEach { body, .. } => vec![vec![*body]],
            ProductionKind::Skip { inner } | ProductionKind::Enclosure { inner, .. } => {
                vec![vec![*inner]]
            }
            ProductionKind::Unit { target, def, .. } => match def {
                Some(d) => vec![d.body.clone()],
                None => target.iter().map(|t| vec![*t]).collect(),
            },
            ProductionKind::Reference { target } => vec![vec![*target]],
            ProductionKind::Deferred { target } => {
                target.iter().map(|t| vec![*t]).collect()
            }
        }
    }

    /// Static byte size, when derivable without running the parse.
    pub fn bytes_consumed(&self) -> Option<Expr> {
        match &self.kind {
            ProductionKind::Epsilon => Some(Expr::uint(0)),
            ProductionKind::Ctor {
                ctor: Ctor::Bytes(b),
                ..
            } => Some(Expr::uint(b.len() as u64)),
            ProductionKind::Ctor {
                ctor: Ctor::UInt { ty, .. },
                ..
            } => Some(Expr::uint(u64::from(ty.bits) / 8)),
            ProductionKind::TypeLiteral { ty } | ProductionKind::Variable { ty, .. } => {
                ty.fixed_size().map(Expr::uint)
            }
            _ => None,
        }
    }
}
