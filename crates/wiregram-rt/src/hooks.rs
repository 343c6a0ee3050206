//! Host boundary: user hooks and opaque expressions.
//!
//! The core fixes *where* and *in what order* hooks and expressions
//! run; their bodies belong to the embedding host, reached through
//! these traits.

use wiregram_core::{Expr, ExprId, ParseError, Result, UnitValue, Value};
use wiregram_plan::HookInfo;

/// Context handed to a hook invocation.
pub struct HookContext<'a> {
    pub hook: &'a HookInfo,
    pub unit: &'a mut UnitValue,
    /// Incremental data for `&chunked` delivery.
    pub data: Option<&'a [u8]>,
    /// Failure reason for error hooks.
    pub error: Option<&'a str>,
    pub input_offset: u64,
}

/// Executes user hook bodies.
///
/// An error returned from a hook aborts the current parse as a
/// `ParseError`, except inside an error hook, where it is ignored
/// (the parse is already failing for the original reason).
pub trait HookHost {
    fn run_hook(&mut self, ctx: HookContext<'_>) -> Result<()>;
}

/// Evaluates host expressions.
pub trait ExprHost {
    fn eval(&mut self, id: ExprId, scope: &EvalScope<'_>) -> Result<Value>;
}

/// What an expression can see: the unit under construction and the
/// current `$$` element, if any.
pub struct EvalScope<'a> {
    pub unit: &'a UnitValue,
    pub dollar: Option<&'a Value>,
}

/// Evaluate a core expression against a scope, delegating `Host`
/// expressions to the host.
pub fn eval_expr(
    expr: &Expr,
    scope: &EvalScope<'_>,
    host: &mut dyn ExprHost,
) -> Result<Value> {
    match expr {
        Expr::Const(value) => Ok(value.clone()),
        Expr::FieldRef(name) => scope.unit.get(name).cloned().ok_or_else(|| {
            ParseError::Internal(format!(
                "expression references field `{name}` which has no value yet"
            ))
        }),
        Expr::Dollar => scope.dollar.cloned().ok_or_else(|| {
            ParseError::Internal("`$$` used outside a container element".to_string())
        }),
        Expr::Host(id) => host.eval(*id, scope),
    }
}

/// Host that runs no hooks and knows no expressions. The default for
/// drivers constructed without an embedding host.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHost;

impl HookHost for NoopHost {
    fn run_hook(&mut self, _ctx: HookContext<'_>) -> Result<()> {
        Ok(())
    }
}

impl ExprHost for NoopHost {
    fn eval(&mut self, id: ExprId, _scope: &EvalScope<'_>) -> Result<Value> {
        Err(ParseError::Internal(format!(
            "no expression host installed for host expression {id}"
        )))
    }
}
