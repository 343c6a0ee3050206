use wiregram_core::{BlockId, Bytes, Expr, FieldId, ParseType, PlanId, TokenId};

use crate::dump::dump;
use crate::module::{FieldInfo, Literal, LiteralValue, Module, Plan, RegexDef, RegexId};
use crate::step::{BytesAttrs, LoopKind, RegexMode, Step};

fn request_line_module() -> Module {
    let mut module = Module::default();
    module.regexes.push(RegexDef {
        pattern: "[A-Z]+".to_string(),
    });
    module.literals.push(Literal {
        value: LiteralValue::Bytes(Bytes::from(" ")),
        origin: None,
    });
    module.literals.push(Literal {
        value: LiteralValue::Regex(RegexId(0)),
        origin: None,
    });

    let plan = Plan {
        name: "Request".to_string(),
        params: vec![],
        root: BlockId(0),
        blocks: vec![vec![
            Step::MatchRegex {
                regex: RegexId(0),
                mode: RegexMode::Exact,
            },
            Step::AssignField {
                field: FieldId(0),
                source: None,
                convert: None,
                requires: None,
            },
            Step::MatchLiteral { token: TokenId(0) },
        ]],
        fields: vec![FieldInfo {
            name: "method".to_string(),
            transient: false,
            anonymous: false,
            default: None,
            location: None,
        }],
        hooks: vec![],
        sync_token: None,
    };
    module.plans.push(plan);
    module.entries.insert("Request".to_string(), PlanId(0));
    module
}

#[test]
fn entry_lookup() {
    let module = request_line_module();
    assert_eq!(module.entry("Request"), Some(PlanId(0)));
    assert_eq!(module.entry("Response"), None);
}

#[test]
fn table_lookups() {
    let module = request_line_module();
    assert!(matches!(
        module.literal(TokenId(0)).value,
        LiteralValue::Bytes(_)
    ));
    assert_eq!(module.regex(RegexId(0)).pattern, "[A-Z]+");
    assert_eq!(module.plan(PlanId(0)).step_count(), 3);
}

#[test]
fn dump_renders_tables_and_blocks() {
    let module = request_line_module();
    insta::assert_snapshot!(dump(&module), @r#"
    literals:
      t0 = b" "
      t1 = /[A-Z]+/
    regexes:
      r0 = /[A-Z]+/
    unit Request (root b0):
      f0 = method
      b0:
        match-regex /[A-Z]+/ exact
        assign f0
        match-literal t0
    "#);
}

#[test]
fn loop_step_dump() {
    let mut module = request_line_module();
    let plan = &mut module.plans[0];
    plan.blocks.push(vec![Step::MatchType {
        ty: ParseType::UInt {
            bits: 8,
            order: wiregram_core::ByteOrder::Big,
        },
        bytes: BytesAttrs::default(),
    }]);
    plan.blocks[0].push(Step::Loop {
        kind: LoopKind::Counter(Expr::uint(3)),
        body: BlockId(1),
        collect: true,
    });

    let rendered = dump(&module);
    assert!(rendered.contains("loop counter"), "{rendered}");
    assert!(rendered.contains("match-type uint8"), "{rendered}");
    assert!(rendered.contains("body=b1 collect"), "{rendered}");
}
