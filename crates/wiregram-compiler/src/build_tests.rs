use wiregram_core::{AttrKind, Attribute, Expr, ParseType};

use crate::build::build_grammar;
use crate::grammar::{Grammar, ProductionKind, WhileMode};
use crate::test_util::{literal, request_line, sync_records, u8_type};
use crate::unit::{FieldDescription, FieldItem, UnitDescription};

fn unit_body(grammar: &Grammar, name: &str) -> Vec<wiregram_core::ProductionId> {
    let id = grammar.lookup(name).unwrap();
    match &grammar.get(id).kind {
        ProductionKind::Unit { def: Some(def), .. } => def.body.clone(),
        other => panic!("expected canonical unit, got {other:?}"),
    }
}

#[test]
fn start_is_the_first_unit() {
    let grammar = build_grammar(&[request_line()]).unwrap();
    let start = grammar.start().unwrap();
    let unit = grammar.lookup("RequestLine").unwrap();
    assert_eq!(grammar.deref(start), unit);
}

#[test]
fn fields_and_separators_lower_to_productions() {
    let grammar = build_grammar(&[request_line()]).unwrap();

    let body = unit_body(&grammar, "RequestLine");
    assert_eq!(body.len(), 7);

    // Named fields carry a field marker, separators do not.
    assert!(grammar.get(body[0]).field.is_some());
    assert!(grammar.get(body[1]).field.is_none());

    // Equal separators intern to one token.
    let sep1 = grammar.get(body[1]).token_id().unwrap();
    let sep2 = grammar.get(body[3]).token_id().unwrap();
    assert_eq!(sep1, sep2);
}

#[test]
fn unit_field_table_covers_named_fields_only() {
    let grammar = build_grammar(&[request_line()]).unwrap();
    let id = grammar.lookup("RequestLine").unwrap();
    let ProductionKind::Unit { def: Some(def), .. } = &grammar.get(id).kind else {
        panic!("not a unit");
    };
    let names: Vec<_> = def.fields.iter().map(|f| f.info.name.as_str()).collect();
    assert_eq!(names, ["method", "uri", "version"]);
}

#[test]
fn transient_field_wraps_in_skip() {
    let unit = UnitDescription::new("U").with_field(
        FieldDescription::new("data", FieldItem::Type(ParseType::Bytes))
            .with_attributes(
                [
                    Attribute::new(AttrKind::Transient),
                    Attribute::with_expr(AttrKind::Size, Expr::uint(4)),
                ]
                .into_iter()
                .collect(),
            ),
    );
    let grammar = build_grammar(&[unit]).unwrap();
    let body = unit_body(&grammar, "U");
    assert!(matches!(
        grammar.get(body[0]).kind,
        ProductionKind::Skip { .. }
    ));
}

#[test]
fn guard_wraps_in_conditional_block() {
    let unit = UnitDescription::new("U").with_field(
        FieldDescription::new("opt", FieldItem::Type(u8_type()))
            .with_guard(Expr::boolean(true)),
    );
    let grammar = build_grammar(&[unit]).unwrap();
    let body = unit_body(&grammar, "U");
    assert!(matches!(
        &grammar.get(body[0]).kind,
        ProductionKind::Block {
            condition: Some(_),
            ..
        }
    ));
}

#[test]
fn size_on_non_bytes_needs_a_boundary_block() {
    let unit = UnitDescription::new("U").with_field(
        FieldDescription::new("n", FieldItem::Type(u8_type())).with_attributes(
            [Attribute::with_expr(AttrKind::Size, Expr::uint(1))]
                .into_iter()
                .collect(),
        ),
    );
    let grammar = build_grammar(&[unit]).unwrap();
    let body = unit_body(&grammar, "U");
    match &grammar.get(body[0]).kind {
        ProductionKind::Block { attrs, .. } => assert!(attrs.has(AttrKind::Size)),
        other => panic!("expected boundary block, got {other:?}"),
    }
}

#[test]
fn size_on_plain_bytes_stays_inline() {
    let unit = UnitDescription::new("U").with_field(
        FieldDescription::new("data", FieldItem::Type(ParseType::Bytes)).with_attributes(
            [Attribute::with_expr(AttrKind::Size, Expr::uint(4))]
                .into_iter()
                .collect(),
        ),
    );
    let grammar = build_grammar(&[unit]).unwrap();
    let body = unit_body(&grammar, "U");
    match &grammar.get(body[0]).kind {
        ProductionKind::Variable { attrs, .. } => assert!(attrs.has(AttrKind::Size)),
        other => panic!("expected a bare variable, got {other:?}"),
    }
}

#[test]
fn forward_unit_references_resolve_through_deferred() {
    let a = UnitDescription::new("A").with_field(FieldDescription::new(
        "next",
        FieldItem::Unit {
            name: "B".to_string(),
            args: Vec::new(),
        },
    ));
    let b = UnitDescription::new("B")
        .with_field(FieldDescription::new("tag", FieldItem::Type(u8_type())));

    let grammar = build_grammar(&[a, b]).unwrap();
    let body = unit_body(&grammar, "A");
    let ProductionKind::Unit {
        target: Some(target),
        def: None,
        ..
    } = &grammar.get(body[0]).kind
    else {
        panic!("expected unit embed");
    };
    assert_eq!(grammar.deref(*target), grammar.lookup("B").unwrap());
}

#[test]
fn unknown_unit_type_is_an_error() {
    let unit = UnitDescription::new("U").with_field(FieldDescription::new(
        "x",
        FieldItem::Unit {
            name: "Missing".to_string(),
            args: Vec::new(),
        },
    ));
    let errors = build_grammar(&[unit]).unwrap_err();
    assert!(
        errors
            .iter()
            .any(|d| d.message().contains("unknown unit type")),
        "{errors:?}"
    );
}

#[test]
fn duplicate_unit_names_are_an_error() {
    let u1 = UnitDescription::new("U").with_field(literal("A"));
    let u2 = UnitDescription::new("U").with_field(literal("B"));
    let errors = build_grammar(&[u1, u2]).unwrap_err();
    assert!(
        errors
            .iter()
            .any(|d| d.message().contains("duplicate unit type")),
        "{errors:?}"
    );
}

#[test]
fn sync_on_a_repeated_field_wraps_each_element() {
    let grammar = build_grammar(&sync_records()).unwrap();
    let body = unit_body(&grammar, "Records");

    // The loop sits outside; each element parse is the sync region.
    let ProductionKind::While {
        mode: WhileMode::Eod,
        body: element,
    } = &grammar.get(body[0]).kind
    else {
        panic!("expected eod loop, got {:?}", grammar.get(body[0]).kind);
    };
    let ProductionKind::Block { body: inner, attrs, .. } = &grammar.get(*element).kind else {
        panic!("expected sync block");
    };
    assert!(attrs.has(AttrKind::Synchronize));
    assert!(matches!(
        &grammar.get(inner[0]).kind,
        ProductionKind::Unit { def: None, .. }
    ));
}
