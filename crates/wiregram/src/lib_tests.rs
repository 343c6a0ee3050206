use crate::{
    AttrKind, Attribute, Ctor, Driver, FieldDescription, FieldItem, Manifest, ParserEntry,
    ParserSet, PortSpec, Protocol, RepeatSpec, UnitDescription, Value,
};
use wiregram_core::{ByteOrder, Expr, ParseType};

fn u8_type() -> ParseType {
    ParseType::UInt {
        bits: 8,
        order: ByteOrder::Big,
    }
}

fn literal(text: &str) -> FieldDescription {
    FieldDescription::anonymous_item(FieldItem::Ctor(Ctor::bytes(text)))
}

fn request_line() -> Vec<UnitDescription> {
    vec![
        UnitDescription::new("RequestLine")
            .with_field(FieldDescription::new(
                "method",
                FieldItem::Ctor(Ctor::regex("[A-Z]+")),
            ))
            .with_field(literal(" "))
            .with_field(FieldDescription::new(
                "uri",
                FieldItem::Ctor(Ctor::regex("[^ ]+")),
            ))
            .with_field(literal(" "))
            .with_field(literal("HTTP/"))
            .with_field(FieldDescription::new(
                "version",
                FieldItem::Ctor(Ctor::regex(r"[0-9]+\.[0-9]+")),
            ))
            .with_field(literal("\r\n")),
    ]
}

#[test]
fn compile_and_parse_end_to_end() {
    let parsers = ParserSet::compile(&request_line()).unwrap();
    assert!(parsers.warnings().is_empty());

    let unit = parsers
        .parse("RequestLine", b"GET /index HTTP/1.0\r\n")
        .unwrap();
    insta::assert_snapshot!(serde_json::to_string(&unit).unwrap(), @r#"{"method":"GET","uri":"/index","version":"1.0"}"#);
}

#[test]
fn every_split_of_the_input_parses_identically() {
    let parsers = ParserSet::compile(&request_line()).unwrap();
    let input = b"POST /submit HTTP/1.1\r\n";
    let reference = parsers.parse("RequestLine", input).unwrap();

    for split in 1..input.len() {
        let mut driver = parsers.driver("RequestLine").unwrap();
        driver.process(&input[..split]).unwrap();
        driver.process(&input[split..]).unwrap();
        let unit = driver.finish().unwrap();
        assert_eq!(unit, reference, "split at {split}");
    }
}

#[test]
fn artifact_round_trip_preserves_behavior() {
    let parsers = ParserSet::compile(&request_line()).unwrap();
    let manifest = Manifest::new(1_700_000_000, false, true).with_parser(ParserEntry {
        name: "http".to_string(),
        mime_types: vec!["message/http".to_string()],
        ports: vec![PortSpec {
            port: 80,
            protocol: Protocol::Tcp,
        }],
        entry: "RequestLine".to_string(),
    });
    let bytes = parsers.into_artifact(manifest).to_bytes().unwrap();

    let reopened = ParserSet::open(&bytes).unwrap();
    let unit = reopened
        .parse("RequestLine", b"GET / HTTP/1.0\r\n")
        .unwrap();
    assert_eq!(unit.get("method"), Some(&Value::bytes("GET")));
}

#[test]
fn corrupted_artifact_is_rejected_with_a_reason() {
    let parsers = ParserSet::compile(&request_line()).unwrap();
    let mut bytes = parsers
        .into_artifact(Manifest::new(0, false, false))
        .to_bytes()
        .unwrap();
    bytes[0] = b'?';
    let err = ParserSet::open(&bytes).unwrap_err();
    assert!(err.to_string().contains("magic"), "{err}");
}

#[test]
fn compile_errors_render_readably() {
    // Two alternatives that both start with "A".
    let unit = UnitDescription::new("Conflicted").with_field(
        FieldDescription::anonymous_item(FieldItem::Alternative {
            first: vec![literal("A"), literal("x")],
            second: vec![literal("A"), literal("y")],
            default: crate::LookAheadDefault::None,
        }),
    );
    let errors = ParserSet::compile(&[unit]).unwrap_err();
    let rendered = crate::DiagnosticsPrinter::new(&errors).render();
    assert!(rendered.contains("look-ahead conflict"), "{rendered}");
}

#[test]
fn length_prefixed_records_stream_across_process_calls() {
    let record = UnitDescription::new("Record")
        .with_field(FieldDescription::new("len", FieldItem::Type(u8_type())))
        .with_field(
            FieldDescription::new("payload", FieldItem::Type(ParseType::Bytes))
                .with_attributes(
                    [Attribute::with_expr(
                        AttrKind::Size,
                        Expr::FieldRef("len".to_string()),
                    )]
                    .into_iter()
                    .collect(),
                ),
        );
    let stream = UnitDescription::new("Records").with_field(
        FieldDescription::new(
            "records",
            FieldItem::Unit {
                name: "Record".to_string(),
                args: Vec::new(),
            },
        )
        .with_repeat(RepeatSpec::Eod),
    );

    let parsers = ParserSet::compile(&[stream, record]).unwrap();
    let mut driver: Driver = parsers.driver("Records").unwrap();
    driver.process(&[0x02, b'h'][..]).unwrap();
    driver.process(&[b'i', 0x01][..]).unwrap();
    driver.process(&[b'!'][..]).unwrap();
    let unit = driver.finish().unwrap();

    let Some(Value::Vector(records)) = unit.get("records") else {
        panic!("expected records vector");
    };
    assert_eq!(records.len(), 2);
}
