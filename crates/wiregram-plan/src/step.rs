//! The typed step set executed by the parsing runtime.
//!
//! Steps live in blocks; control-flow steps reference sub-blocks by
//! [`BlockId`] rather than nesting, which keeps activation frames plain
//! data and makes suspension points trivially resumable.
//!
//! Matching steps leave their result in the machine's current-value
//! slot; a following `AssignField` stores it. A match with no assignment
//! is a plain consume-and-discard.

use serde::{Deserialize, Serialize};

use wiregram_core::{BlockId, Expr, FieldId, HookId, ParseType, PlanId, TokenId};

use crate::module::RegexId;

/// How a regex step consumes input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegexMode {
    /// Anchored at the view start; consumes the match.
    Exact,
    /// Anchored peek; consumes nothing.
    LookAhead,
    /// Scan forward for the first occurrence.
    Find,
}

/// Which alternative a `TryLookAhead` falls back to when neither
/// look-ahead set matches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookAheadDefault {
    First,
    Second,
    #[default]
    None,
}

/// Loop flavors, one per container construct.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LoopKind {
    /// Repeat the body N times.
    Counter(Expr),
    /// Check the condition, then run the body; stop when false.
    WhileExpr(Expr),
    /// Repeat while the next token is in the body's FIRST set; stop on
    /// miss or end-of-data.
    WhileLookAhead(Vec<TokenId>),
    /// Run the body, then stop once the predicate holds for the parsed
    /// element (`$$`). The terminating element is kept.
    Until(Expr),
    /// Repeat until end-of-data.
    Eod,
    /// Iterate an existing container; `$$` binds each element.
    ForEach(Expr),
}

/// Byte-run attributes honored by `MatchType` for `bytes` fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BytesAttrs {
    /// Fixed length in bytes.
    pub size: Option<Expr>,
    /// Terminator literal; consumed, excluded from the value unless
    /// `until_including`.
    pub until: Option<TokenId>,
    pub until_including: bool,
    /// Run to end-of-data.
    pub eod: bool,
    /// Deliver chunks to this hook as bytes arrive.
    pub chunked: Option<HookId>,
}

/// Boundary attribute applied by `SetBoundary`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryKind {
    /// `&size`: exactly N bytes; inner plan must consume all of them.
    Size,
    /// `&max-size`: at most N bytes; no full-consumption check.
    MaxSize,
    /// `&parse-at`: reposition to an absolute offset, restore after.
    ParseAt,
    /// `&parse-from`: parse a secondary byte source.
    ParseFrom,
}

/// One executable parsing step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Step {
    /// Match a literal at the view start and advance past it.
    MatchLiteral { token: TokenId },

    /// Decode a primitive value into the current-value slot.
    MatchType { ty: ParseType, bytes: BytesAttrs },

    /// Match a pattern from the regex table.
    MatchRegex { regex: RegexId, mode: RegexMode },

    /// LL(1) branch: peek one token, pick an alternative.
    TryLookAhead {
        set_a: Vec<TokenId>,
        set_b: Vec<TokenId>,
        default: LookAheadDefault,
        block_a: BlockId,
        block_b: BlockId,
    },

    /// Dispatch over a scrutinee value. Cases are tried in order; the
    /// optional default runs last; no match is a parse error.
    Switch {
        scrutinee: Expr,
        cases: Vec<(Expr, BlockId)>,
        default: Option<BlockId>,
    },

    /// Recursively run another unit's plan, pushing a fresh unit value.
    /// The completed unit lands in the current-value slot.
    Call { plan: PlanId, args: Vec<Expr> },

    /// Run the body repeatedly. With `collect`, each iteration's value
    /// accumulates into a vector that becomes the current value when
    /// the loop finishes.
    Loop {
        kind: LoopKind,
        body: BlockId,
        collect: bool,
    },

    /// Conditional block with optional else.
    IfCond {
        cond: Expr,
        then_block: BlockId,
        else_block: Option<BlockId>,
    },

    /// Run the body, discarding any value it produces.
    Skip { body: BlockId },

    /// Store the current value (or `source`) into a unit field,
    /// applying `&convert` and checking `&requires` first.
    AssignField {
        field: FieldId,
        source: Option<Expr>,
        convert: Option<Expr>,
        requires: Option<Expr>,
    },

    /// Invoke a user hook with the current parse context.
    RunHook { hook: HookId },

    /// Run the body under a bounded or repositioned sub-view.
    SetBoundary {
        kind: BoundaryKind,
        arg: Expr,
        body: BlockId,
    },

    /// Run the body; on a recoverable parse error, re-anchor and retry.
    /// With a token, the stream is scanned forward for that literal;
    /// without one, the attempt position advances byte by byte.
    Synchronize {
        body: BlockId,
        token: Option<TokenId>,
    },

    /// Yield the activation back to the driver.
    Suspend,
}
