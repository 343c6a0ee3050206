//! Human-readable module dump for debugging and snapshot tests.

use std::fmt::Write as _;

use wiregram_core::{BlockId, TokenId};

use crate::module::{LiteralValue, Module, Plan};
use crate::step::{LoopKind, RegexMode, Step};

/// Render the whole module: tables first, then each plan's blocks.
pub fn dump(module: &Module) -> String {
    let mut out = String::new();

    if !module.literals.is_empty() {
        out.push_str("literals:\n");
        for (i, lit) in module.literals.iter().enumerate() {
            let rendered = match &lit.value {
                LiteralValue::Bytes(b) => format!("b\"{b}\""),
                LiteralValue::UInt { value, ty } => format!("{value}:{ty}"),
                LiteralValue::Regex(id) => {
                    format!("/{}/", module.regex(*id).pattern)
                }
            };
            let _ = writeln!(out, "  t{i} = {rendered}");
        }
    }

    if !module.regexes.is_empty() {
        out.push_str("regexes:\n");
        for (i, re) in module.regexes.iter().enumerate() {
            let _ = writeln!(out, "  r{i} = /{}/", re.pattern);
        }
    }

    for plan in &module.plans {
        dump_plan(&mut out, module, plan);
    }

    out
}

fn dump_plan(out: &mut String, module: &Module, plan: &Plan) {
    let _ = writeln!(out, "unit {} (root {}):", plan.name, plan.root);
    for (i, field) in plan.fields.iter().enumerate() {
        let mut marks = String::new();
        if field.transient {
            marks.push_str(" transient");
        }
        if field.anonymous {
            marks.push_str(" anonymous");
        }
        let _ = writeln!(out, "  f{i} = {}{marks}", field.name);
    }
    for (i, hook) in plan.hooks.iter().enumerate() {
        let _ = writeln!(out, "  h{i} = {} ({:?})", hook.name, hook.kind);
    }
    for (i, block) in plan.blocks.iter().enumerate() {
        let _ = writeln!(out, "  b{i}:");
        for step in block {
            let _ = writeln!(out, "    {}", render_step(module, step));
        }
    }
}

fn tokens(set: &[TokenId]) -> String {
    let names: Vec<String> = set.iter().map(|t| t.to_string()).collect();
    format!("{{{}}}", names.join(" "))
}

fn render_step(module: &Module, step: &Step) -> String {
    match step {
        Step::MatchLiteral { token } => format!("match-literal {token}"),
        Step::MatchType { ty, bytes } => {
            let mut s = format!("match-type {ty}");
            if let Some(size) = &bytes.size {
                let _ = write!(s, " size={size}");
            }
            if let Some(until) = &bytes.until {
                let _ = write!(
                    s,
                    " until{}={until}",
                    if bytes.until_including { "-incl" } else { "" }
                );
            }
            if bytes.eod {
                s.push_str(" eod");
            }
            if bytes.chunked.is_some() {
                s.push_str(" chunked");
            }
            s
        }
        Step::MatchRegex { regex, mode } => {
            let mode = match mode {
                RegexMode::Exact => "exact",
                RegexMode::LookAhead => "look-ahead",
                RegexMode::Find => "find",
            };
            format!("match-regex /{}/ {mode}", module.regex(*regex).pattern)
        }
        Step::TryLookAhead {
            set_a,
            set_b,
            default,
            block_a,
            block_b,
        } => format!(
            "try-look-ahead {} -> {block_a} | {} -> {block_b} default={default:?}",
            tokens(set_a),
            tokens(set_b)
        ),
        Step::Switch {
            scrutinee,
            cases,
            default,
        } => {
            let mut s = format!("switch {scrutinee}");
            for (value, block) in cases {
                let _ = write!(s, " [{value} -> {block}]");
            }
            if let Some(block) = default {
                let _ = write!(s, " [* -> {block}]");
            }
            s
        }
        Step::Call { plan, args } => {
            let mut s = format!("call {}", module.plan(*plan).name);
            if !args.is_empty() {
                let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                let _ = write!(s, "({})", rendered.join(", "));
            }
            s
        }
        Step::Loop {
            kind,
            body,
            collect,
        } => {
            let kind = match kind {
                LoopKind::Counter(e) => format!("counter {e}"),
                LoopKind::WhileExpr(e) => format!("while {e}"),
                LoopKind::WhileLookAhead(set) => format!("while-look-ahead {}", tokens(set)),
                LoopKind::Until(e) => format!("until {e}"),
                LoopKind::Eod => "eod".to_string(),
                LoopKind::ForEach(e) => format!("foreach {e}"),
            };
            let collect = if *collect { " collect" } else { "" };
            format!("loop {kind} body={body}{collect}")
        }
        Step::IfCond {
            cond,
            then_block,
            else_block,
        } => match else_block {
            Some(e) => format!("if {cond} then={then_block} else={e}"),
            None => format!("if {cond} then={then_block}"),
        },
        Step::Skip { body } => format!("skip body={body}"),
        Step::AssignField {
            field,
            source,
            convert,
            requires,
        } => {
            let mut s = format!("assign {field}");
            if let Some(e) = source {
                let _ = write!(s, " source={e}");
            }
            if let Some(e) = convert {
                let _ = write!(s, " convert={e}");
            }
            if let Some(e) = requires {
                let _ = write!(s, " requires={e}");
            }
            s
        }
        Step::RunHook { hook } => format!("run-hook {hook}"),
        Step::SetBoundary { kind, arg, body } => {
            format!("boundary {kind:?} {arg} body={body}")
        }
        Step::Synchronize { body, token } => match token {
            Some(token) => format!("synchronize token={token} body={body}"),
            None => format!("synchronize body={body}"),
        },
        Step::Suspend => "suspend".to_string(),
    }
}

/// Render a single block, used by targeted tests.
pub fn dump_block(module: &Module, plan: &Plan, block: BlockId) -> String {
    let mut out = String::new();
    for step in plan.block(block) {
        let _ = writeln!(out, "{}", render_step(module, step));
    }
    out
}
