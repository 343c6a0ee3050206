//! Resolved unit descriptions: the front-end boundary.
//!
//! A description arrives with names and types already resolved; the
//! builder only lowers it to productions. Expressions inside guards,
//! counts, and attributes are opaque (`Expr`).

use wiregram_core::{AttributeSet, Expr, Location, ParseType};
use wiregram_plan::{HookKind, LookAheadDefault};

use crate::grammar::Ctor;

/// A user hook attached to a unit or field.
#[derive(Clone, Debug, PartialEq)]
pub struct HookSpec {
    pub name: String,
    pub kind: HookKind,
}

impl HookSpec {
    pub fn new(name: impl Into<String>, kind: HookKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Repetition applied to a container field.
#[derive(Clone, Debug, PartialEq)]
pub enum RepeatSpec {
    /// `&count=E` elements.
    Count(Expr),
    /// Stop after the element matching E (`$$` bound); element dropped.
    Until(Expr),
    /// Same, but the terminating element is kept.
    UntilIncluding(Expr),
    /// `&while=E`: pre-checked.
    While(Expr),
    /// `&eod`.
    Eod,
    /// Repeat while the element's FIRST set matches.
    LookAhead,
}

/// What a field parses.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldItem {
    /// A literal value.
    Ctor(Ctor),
    /// A primitive of a parseable type.
    Type(ParseType),
    /// An embedded unit.
    Unit { name: String, args: Vec<Expr> },
    /// Value-based dispatch over nested fields.
    Switch {
        scrutinee: Expr,
        cases: Vec<(Expr, Vec<FieldDescription>)>,
        default: Option<Vec<FieldDescription>>,
    },
    /// A nested group of fields, usable with a guard and boundaries.
    Block {
        fields: Vec<FieldDescription>,
        else_fields: Vec<FieldDescription>,
    },
    /// LL(1) choice between two groups of fields.
    Alternative {
        first: Vec<FieldDescription>,
        second: Vec<FieldDescription>,
        default: LookAheadDefault,
    },
}

/// One field of a unit description.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDescription {
    /// External name; `None` for pure separators.
    pub name: Option<String>,
    pub item: FieldItem,
    pub attributes: AttributeSet,
    pub hooks: Vec<HookSpec>,
    /// Parse the field only when this holds.
    pub guard: Option<Expr>,
    pub repeat: Option<RepeatSpec>,
    pub location: Option<Location>,
}

impl FieldDescription {
    pub fn new(name: impl Into<String>, item: FieldItem) -> Self {
        Self {
            name: Some(name.into()),
            item,
            attributes: AttributeSet::new(),
            hooks: Vec::new(),
            guard: None,
            repeat: None,
            location: None,
        }
    }

    /// An unnamed field, e.g. a literal separator.
    pub fn anonymous_item(item: FieldItem) -> Self {
        Self {
            name: None,
            item,
            attributes: AttributeSet::new(),
            hooks: Vec::new(),
            guard: None,
            repeat: None,
            location: None,
        }
    }

    pub fn with_attributes(mut self, attributes: AttributeSet) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_repeat(mut self, repeat: RepeatSpec) -> Self {
        self.repeat = Some(repeat);
        self
    }

    pub fn with_guard(mut self, guard: Expr) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn with_hook(mut self, hook: HookSpec) -> Self {
        self.hooks.push(hook);
        self
    }
}

/// A resolved unit description: ordered fields plus unit metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitDescription {
    pub name: String,
    pub params: Vec<String>,
    pub attributes: AttributeSet,
    pub fields: Vec<FieldDescription>,
    pub hooks: Vec<HookSpec>,
    pub location: Option<Location>,
}

impl UnitDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            attributes: AttributeSet::new(),
            fields: Vec::new(),
            hooks: Vec::new(),
            location: None,
        }
    }

    pub fn with_field(mut self, field: FieldDescription) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn with_hook(mut self, hook: HookSpec) -> Self {
        self.hooks.push(hook);
        self
    }
}
