use wiregram_core::{AttributeSet, Expr, ExprId, ParseType, ProductionId};
use wiregram_plan::LookAheadDefault;

use crate::grammar::{Ctor, Grammar, Production, ProductionKind};

/// Build a grammar whose start production is produced by `build`,
/// using a deferred slot so children can be added first.
fn grammar_with_start(build: impl FnOnce(&mut Grammar) -> ProductionId) -> Grammar {
    let mut grammar = Grammar::new("test");
    let start = grammar.add_production(Production::new(
        "%start",
        ProductionKind::Deferred { target: None },
    ));
    let target = build(&mut grammar);
    grammar.resolve(start, target).unwrap();
    grammar
}

fn seq(grammar: &mut Grammar, symbol: &str, elements: Vec<ProductionId>) -> ProductionId {
    grammar.add_production(Production::new(
        symbol,
        ProductionKind::Sequence { elements },
    ))
}

fn look_ahead(
    grammar: &mut Grammar,
    alt1: ProductionId,
    alt2: ProductionId,
    default: LookAheadDefault,
) -> ProductionId {
    grammar.add_production(Production::new(
        "choice",
        ProductionKind::LookAhead {
            alt1,
            alt2,
            default,
            condition: None,
            lahs: None,
        },
    ))
}

fn lahs_of(grammar: &Grammar, id: ProductionId) -> (Vec<u32>, Vec<u32>) {
    match &grammar.get(id).kind {
        ProductionKind::LookAhead {
            lahs: Some((a, b)), ..
        } => (
            a.iter().map(|t| t.0).collect(),
            b.iter().map(|t| t.0).collect(),
        ),
        other => panic!("expected analyzed look-ahead, got {other:?}"),
    }
}

#[test]
fn epsilon_is_nullable_literals_are_not() {
    let mut grammar = grammar_with_start(|g| {
        let eps = g.add_production(Production::new("eps", ProductionKind::Epsilon));
        let a = g.add_ctor("a", Ctor::bytes("A"));
        seq(g, "s", vec![eps, a])
    });
    grammar.finalize().unwrap();

    let eps = grammar.lookup("eps").unwrap();
    let a = grammar.lookup("a").unwrap();
    let s = grammar.lookup("s").unwrap();
    assert!(grammar.is_nullable(eps));
    assert!(!grammar.is_nullable(a));
    assert!(!grammar.is_nullable(s));
}

#[test]
fn sequence_of_nullables_is_nullable() {
    let mut grammar = grammar_with_start(|g| {
        let e1 = g.add_production(Production::new("e1", ProductionKind::Epsilon));
        let e2 = g.add_production(Production::new("e2", ProductionKind::Epsilon));
        seq(g, "s", vec![e1, e2])
    });
    grammar.finalize().unwrap();
    let s = grammar.lookup("s").unwrap();
    assert!(grammar.is_nullable(s));
}

#[test]
fn counter_nullability_depends_on_constant_count() {
    let mut grammar = grammar_with_start(|g| {
        let a1 = g.add_ctor("a1", Ctor::bytes("A"));
        let fixed = g.add_production(Production::new(
            "fixed",
            ProductionKind::Counter {
                count: Expr::uint(2),
                body: a1,
            },
        ));
        let a2 = g.add_ctor("a2", Ctor::bytes("B"));
        let dynamic = g.add_production(Production::new(
            "dynamic",
            ProductionKind::Counter {
                count: Expr::Host(ExprId(0)),
                body: a2,
            },
        ));
        seq(g, "s", vec![fixed, dynamic])
    });
    grammar.finalize().unwrap();

    assert!(!grammar.is_nullable(grammar.lookup("fixed").unwrap()));
    assert!(grammar.is_nullable(grammar.lookup("dynamic").unwrap()));
}

#[test]
fn first_of_sequence_chains_through_nullable_heads() {
    let mut grammar = grammar_with_start(|g| {
        let eps = g.add_production(Production::new("eps", ProductionKind::Epsilon));
        let a = g.add_ctor("a", Ctor::bytes("A"));
        seq(g, "s", vec![eps, a])
    });
    grammar.finalize().unwrap();

    let s = grammar.lookup("s").unwrap();
    let a = grammar.lookup("a").unwrap();
    let analysis = grammar.analysis().unwrap();
    let a_token = grammar.get(a).token_id().unwrap();
    assert!(analysis.first[s.index()].contains(&a_token));
}

#[test]
fn follow_contains_successor_first_and_eod_at_the_end() {
    let mut grammar = grammar_with_start(|g| {
        let a = g.add_ctor("a", Ctor::bytes("A"));
        let b = g.add_ctor("b", Ctor::bytes("B"));
        seq(g, "s", vec![a, b])
    });
    grammar.finalize().unwrap();

    let a = grammar.lookup("a").unwrap();
    let b = grammar.lookup("b").unwrap();
    let analysis = grammar.analysis().unwrap();
    let b_token = grammar.get(b).token_id().unwrap();

    assert!(analysis.follow[a.index()].contains(&b_token));
    assert!(!analysis.follow_eod[a.index()]);
    assert!(analysis.follow_eod[b.index()]);
}

#[test]
fn disjoint_alternatives_get_their_lah_sets() {
    let mut grammar = grammar_with_start(|g| {
        let a = g.add_ctor("a", Ctor::bytes("A"));
        let x = g.add_ctor("x", Ctor::bytes("x"));
        let sa = seq(g, "sa", vec![a, x]);
        let b = g.add_ctor("b", Ctor::bytes("B"));
        let y = g.add_ctor("y", Ctor::bytes("y"));
        let sb = seq(g, "sb", vec![b, y]);
        look_ahead(g, sa, sb, LookAheadDefault::None)
    });
    grammar.finalize().unwrap();

    let choice = grammar.lookup("choice").unwrap();
    let (lah1, lah2) = lahs_of(&grammar, choice);
    let a_token = grammar.get(grammar.lookup("a").unwrap()).token_id().unwrap();
    let b_token = grammar.get(grammar.lookup("b").unwrap()).token_id().unwrap();
    assert_eq!(lah1, vec![a_token.0]);
    assert_eq!(lah2, vec![b_token.0]);
}

#[test]
fn overlapping_alternatives_conflict() {
    let mut grammar = grammar_with_start(|g| {
        let a1 = g.add_ctor("a1", Ctor::bytes("A"));
        let x = g.add_ctor("x", Ctor::bytes("x"));
        let sa = seq(g, "sa", vec![a1, x]);
        let a2 = g.add_ctor("a2", Ctor::bytes("A"));
        let y = g.add_ctor("y", Ctor::bytes("y"));
        let sb = seq(g, "sb", vec![a2, y]);
        look_ahead(g, sa, sb, LookAheadDefault::None)
    });

    let errors = grammar.finalize().unwrap_err();
    assert!(
        errors
            .iter()
            .any(|d| d.message().contains("look-ahead conflict")),
        "{errors:?}"
    );
}

#[test]
fn default_disambiguates_overlap() {
    let mut grammar = grammar_with_start(|g| {
        let a1 = g.add_ctor("a1", Ctor::bytes("A"));
        let x = g.add_ctor("x", Ctor::bytes("x"));
        let sa = seq(g, "sa", vec![a1, x]);
        let a2 = g.add_ctor("a2", Ctor::bytes("A"));
        let y = g.add_ctor("y", Ctor::bytes("y"));
        let sb = seq(g, "sb", vec![a2, y]);
        look_ahead(g, sa, sb, LookAheadDefault::First)
    });
    assert!(grammar.finalize().is_ok());
}

#[test]
fn nullable_alternative_extends_lah_with_follow() {
    let mut grammar = grammar_with_start(|g| {
        let eps = g.add_production(Production::new("eps", ProductionKind::Epsilon));
        let b = g.add_ctor("b", Ctor::bytes("B"));
        let choice = look_ahead(g, eps, b, LookAheadDefault::None);
        let tail = g.add_ctor("tail", Ctor::bytes("T"));
        seq(g, "s", vec![choice, tail])
    });
    grammar.finalize().unwrap();

    let choice = grammar.lookup("choice").unwrap();
    let tail_token = grammar
        .get(grammar.lookup("tail").unwrap())
        .token_id()
        .unwrap();
    let (lah1, _) = lahs_of(&grammar, choice);
    assert!(lah1.contains(&tail_token.0));
}

#[test]
fn both_nullable_alternatives_conflict() {
    let mut grammar = grammar_with_start(|g| {
        let e1 = g.add_production(Production::new("e1", ProductionKind::Epsilon));
        let e2 = g.add_production(Production::new("e2", ProductionKind::Epsilon));
        look_ahead(g, e1, e2, LookAheadDefault::None)
    });
    let errors = grammar.finalize().unwrap_err();
    assert!(
        errors
            .iter()
            .any(|d| d.message().contains("match empty")),
        "{errors:?}"
    );
}

#[test]
fn alternative_without_tokens_needs_a_default() {
    let build = |default| {
        grammar_with_start(|g| {
            let var = g.add_production(Production::new(
                "var",
                ProductionKind::Variable {
                    ty: ParseType::UInt {
                        bits: 8,
                        order: wiregram_core::ByteOrder::Big,
                    },
                    attrs: AttributeSet::new(),
                },
            ));
            let b = g.add_ctor("b", Ctor::bytes("B"));
            look_ahead(g, var, b, default)
        })
    };

    let errors = build(LookAheadDefault::None).finalize().unwrap_err();
    assert!(
        errors
            .iter()
            .any(|d| d.message().contains("no look-ahead token")),
        "{errors:?}"
    );

    assert!(build(LookAheadDefault::First).finalize().is_ok());
}

#[test]
fn unreachable_production_warns() {
    let mut grammar = grammar_with_start(|g| g.add_ctor("a", Ctor::bytes("A")));
    grammar.add_ctor("orphan", Ctor::bytes("X"));

    let warnings = grammar.finalize().unwrap();
    assert!(
        warnings
            .iter()
            .any(|d| d.is_warning() && d.message().contains("unreachable")),
        "{warnings:?}"
    );
}
