//! Grammar analysis: nullability, FIRST, FOLLOW, and look-ahead sets.
//!
//! Everything here is a fixed-point iteration over the production
//! arena. Cycles through `Reference` and resolved `Deferred` nodes are
//! harmless: the sets only grow, so iteration terminates once no table
//! changes.

use std::collections::BTreeSet;

use wiregram_core::{ProductionId, TokenId};
use wiregram_plan::LookAheadDefault;

use crate::diagnostics::{DiagnosticMessage, Diagnostics};
use crate::grammar::{Grammar, ProductionKind};

/// Frozen analysis tables, indexed by production.
#[derive(Clone, Debug)]
pub struct Analysis {
    pub nullable: Vec<bool>,
    pub first: Vec<BTreeSet<TokenId>>,
    pub follow: Vec<BTreeSet<TokenId>>,
    /// True iff end-of-input may follow the production.
    pub follow_eod: Vec<bool>,
}

pub(crate) struct AnalyzeOutcome {
    pub analysis: Analysis,
    pub lahs: Vec<(ProductionId, (BTreeSet<TokenId>, BTreeSet<TokenId>))>,
    pub warnings: Diagnostics,
}

pub(crate) fn analyze(grammar: &Grammar) -> Result<AnalyzeOutcome, Diagnostics> {
    let n = grammar.len();
    let mut analysis = Analysis {
        nullable: vec![false; n],
        first: vec![BTreeSet::new(); n],
        follow: vec![BTreeSet::new(); n],
        follow_eod: vec![false; n],
    };

    compute_nullable(grammar, &mut analysis);
    compute_first(grammar, &mut analysis);
    compute_follow(grammar, &mut analysis);

    let reachable = grammar.reachable();
    let mut warnings = Diagnostics::new();
    for (id, production) in grammar.iter() {
        if !reachable[id.index()] {
            warnings.push(
                DiagnosticMessage::warning("production is unreachable from the start")
                    .with_symbol(production.symbol.clone())
                    .with_location(production.location.clone()),
            );
        }
    }

    let mut errors = Diagnostics::new();
    let lahs = compute_lahs(grammar, &analysis, &reachable, &mut errors);
    if errors.has_errors() {
        return Err(errors);
    }

    Ok(AnalyzeOutcome {
        analysis,
        lahs,
        warnings,
    })
}

fn compute_nullable(grammar: &Grammar, analysis: &mut Analysis) {
    loop {
        let mut changed = false;
        for (id, production) in grammar.iter() {
            if analysis.nullable[id.index()] {
                continue;
            }
            let nullable = match &production.kind {
                ProductionKind::Epsilon => true,
                ProductionKind::Ctor { .. }
                | ProductionKind::TypeLiteral { .. }
                | ProductionKind::Variable { .. } => false,
                // Zero iterations are permitted unless the count is a
                // known positive constant.
                ProductionKind::Counter { count, body } => {
                    match count.as_const().and_then(|v| v.as_u64()) {
                        Some(c) if c > 0 => analysis.nullable[body.index()],
                        _ => true,
                    }
                }
                ProductionKind::While { .. } | ProductionKind::ForEach { .. } => true,
                // A guarded block with no else matches empty when the
                // guard is false.
                ProductionKind::Block {
                    condition: Some(_),
                    else_body,
                    ..
                } if else_body.is_empty() => true,
                _ => production.rhss().iter().any(|rhs| {
                    rhs.iter().all(|e| analysis.nullable[e.index()])
                }),
            };
            if nullable {
                analysis.nullable[id.index()] = true;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

fn compute_first(grammar: &Grammar, analysis: &mut Analysis) {
    loop {
        let mut changed = false;
        for (id, production) in grammar.iter() {
            let mut addition: BTreeSet<TokenId> = BTreeSet::new();
            if let Some(token) = production.token_id() {
                addition.insert(token);
            }
            for rhs in production.rhss() {
                for element in rhs {
                    addition.extend(analysis.first[element.index()].iter().copied());
                    if !analysis.nullable[element.index()] {
                        break;
                    }
                }
            }
            let set = &mut analysis.first[id.index()];
            let before = set.len();
            set.extend(addition);
            changed |= set.len() != before;
        }
        if !changed {
            break;
        }
    }
}

fn compute_follow(grammar: &Grammar, analysis: &mut Analysis) {
    if let Some(start) = grammar.start() {
        analysis.follow_eod[start.index()] = true;
    }

    loop {
        let mut changed = false;
        for (id, production) in grammar.iter() {
            for rhs in production.rhss() {
                for (i, element) in rhs.iter().enumerate() {
                    let mut tail_nullable = true;
                    let mut addition: BTreeSet<TokenId> = BTreeSet::new();
                    for follower in &rhs[i + 1..] {
                        addition.extend(analysis.first[follower.index()].iter().copied());
                        if !analysis.nullable[follower.index()] {
                            tail_nullable = false;
                            break;
                        }
                    }
                    let mut add_eod = false;
                    if tail_nullable {
                        addition.extend(analysis.follow[id.index()].iter().copied());
                        add_eod = analysis.follow_eod[id.index()];
                    }

                    let set = &mut analysis.follow[element.index()];
                    let before = set.len();
                    set.extend(addition);
                    changed |= set.len() != before;
                    if add_eod && !analysis.follow_eod[element.index()] {
                        analysis.follow_eod[element.index()] = true;
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }
}

fn render_tokens(grammar: &Grammar, tokens: &BTreeSet<TokenId>) -> String {
    let rendered: Vec<String> = tokens
        .iter()
        .map(|t| grammar.literals()[t.index()].to_string())
        .collect();
    format!("{{{}}}", rendered.join(", "))
}

#[allow(clippy::type_complexity)]
fn compute_lahs(
    grammar: &Grammar,
    analysis: &Analysis,
    reachable: &[bool],
    errors: &mut Diagnostics,
) -> Vec<(ProductionId, (BTreeSet<TokenId>, BTreeSet<TokenId>))> {
    let mut lahs = Vec::new();

    for (id, production) in grammar.iter() {
        let ProductionKind::LookAhead {
            alt1,
            alt2,
            default,
            condition,
            ..
        } = &production.kind
        else {
            continue;
        };

        let lah_of = |alt: ProductionId| {
            let mut set = analysis.first[alt.index()].clone();
            if analysis.nullable[alt.index()] {
                set.extend(analysis.follow[id.index()].iter().copied());
            }
            set
        };
        let lah1 = lah_of(*alt1);
        let lah2 = lah_of(*alt2);

        if reachable[id.index()] {
            check_conflicts(
                grammar, analysis, production, id, *alt1, *alt2, &lah1, &lah2, *default,
                condition.is_some(), errors,
            );
        }

        lahs.push((id, (lah1, lah2)));
    }

    lahs
}

#[allow(clippy::too_many_arguments)]
fn check_conflicts(
    grammar: &Grammar,
    analysis: &Analysis,
    production: &crate::grammar::Production,
    id: ProductionId,
    alt1: ProductionId,
    alt2: ProductionId,
    lah1: &BTreeSet<TokenId>,
    lah2: &BTreeSet<TokenId>,
    default: LookAheadDefault,
    has_condition: bool,
    errors: &mut Diagnostics,
) {
    let _ = id;
    let diag = |msg: String| {
        DiagnosticMessage::error(msg)
            .with_symbol(production.symbol.clone())
            .with_location(production.location.clone())
    };

    let shared: BTreeSet<TokenId> = lah1.intersection(lah2).copied().collect();
    if !shared.is_empty() && default == LookAheadDefault::None && !has_condition {
        errors.push(diag(format!(
            "look-ahead conflict: alternatives share tokens {}",
            render_tokens(grammar, &shared)
        )));
    }

    let nullable1 = analysis.nullable[alt1.index()];
    let nullable2 = analysis.nullable[alt2.index()];
    if nullable1 && nullable2 && default == LookAheadDefault::None {
        errors.push(diag(
            "look-ahead conflict: both alternatives can match empty input".to_string(),
        ));
    }

    if default == LookAheadDefault::None {
        for (lah, nullable, which) in [(lah1, nullable1, "first"), (lah2, nullable2, "second")] {
            if lah.is_empty() && !nullable {
                errors.push(diag(format!(
                    "no look-ahead token available for the {which} alternative"
                )));
            }
        }
    }
}

/// FIRST set of a `While`-with-look-ahead body, as the synthesizer
/// consumes it.
pub(crate) fn body_first(grammar: &Grammar, body: ProductionId) -> Vec<TokenId> {
    grammar
        .analysis()
        .map(|a| a.first[body.index()].iter().copied().collect())
        .unwrap_or_default()
}
