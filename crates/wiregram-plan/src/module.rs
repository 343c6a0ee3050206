//! The compiled module: per-unit plans plus shared tables.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use wiregram_core::{
    BlockId, Bytes, FieldId, Location, ParseType, PlanId, ProductionId, TokenId,
};

use crate::step::Step;

/// A pattern in the module's regex table.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RegexId(pub u32);

impl RegexId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for RegexId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegexDef {
    pub pattern: String,
}

/// The concrete value of a literal token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    Bytes(Bytes),
    /// An integer literal matched in its wire encoding.
    UInt { value: u64, ty: ParseType },
    /// A regex literal; usable as a look-ahead token.
    Regex(RegexId),
}

/// An entry in the literal table. The table index is the token id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Literal {
    pub value: LiteralValue,
    /// The production the literal came from, for diagnostics.
    pub origin: Option<ProductionId>,
}

/// Where in a unit's lifecycle a hook fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookKind {
    UnitBegin,
    UnitEnd,
    FieldBegin,
    FieldEnd,
    /// Fires with each incremental chunk of a `&chunked` field.
    Chunked,
    /// Fires when the unit's parse fails; receives the error reason.
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HookInfo {
    pub name: String,
    pub kind: HookKind,
    /// Owning field, absent for unit-level hooks.
    pub field: Option<FieldId>,
}

/// Storage metadata for one unit field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    /// Matched but never stored.
    pub transient: bool,
    /// Stored under a synthesized name, hidden from the host.
    pub anonymous: bool,
    /// `&default`: applied at unit completion if the field is absent.
    #[serde(default)]
    pub default: Option<wiregram_core::Expr>,
    pub location: Option<Location>,
}

/// The executable plan for one unit type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub name: String,
    pub params: Vec<String>,
    pub root: BlockId,
    pub blocks: Vec<Vec<Step>>,
    pub fields: Vec<FieldInfo>,
    pub hooks: Vec<HookInfo>,
    /// Token that re-anchors the parse after an error inside a
    /// `&synchronize` region.
    pub sync_token: Option<TokenId>,
}

impl Plan {
    pub fn block(&self, id: BlockId) -> &[Step] {
        &self.blocks[id.index()]
    }

    pub fn field(&self, id: FieldId) -> &FieldInfo {
        &self.fields[id.index()]
    }

    pub fn step_count(&self) -> usize {
        self.blocks.iter().map(Vec::len).sum()
    }
}

/// A compiled module: every unit plan of a grammar plus shared tables.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub plans: Vec<Plan>,
    /// Literal table; `TokenId` indexes into it.
    pub literals: Vec<Literal>,
    pub regexes: Vec<RegexDef>,
    /// Public entry points by unit name.
    pub entries: IndexMap<String, PlanId>,
}

impl Module {
    pub fn plan(&self, id: PlanId) -> &Plan {
        &self.plans[id.index()]
    }

    pub fn literal(&self, token: TokenId) -> &Literal {
        &self.literals[token.index()]
    }

    pub fn regex(&self, id: RegexId) -> &RegexDef {
        &self.regexes[id.index()]
    }

    pub fn entry(&self, name: &str) -> Option<PlanId> {
        self.entries.get(name).copied()
    }
}
