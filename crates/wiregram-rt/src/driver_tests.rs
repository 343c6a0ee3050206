use std::sync::Arc;

use wiregram_compiler::compile;
use wiregram_compiler::grammar::Ctor;
use wiregram_compiler::unit::{FieldDescription, FieldItem, RepeatSpec, UnitDescription};
use wiregram_core::{
    AttrKind, Attribute, ByteOrder, Expr, ParseType, Result, UnitValue, Value,
};
use wiregram_plan::{LookAheadDefault, Module};

use crate::driver::{parse, Driver, DriverStatus};
use crate::machine::MachineConfig;

fn u8_type() -> ParseType {
    ParseType::UInt {
        bits: 8,
        order: ByteOrder::Big,
    }
}

fn module_of(units: &[UnitDescription]) -> Arc<Module> {
    Arc::new(compile(units).expect("grammar compiles").module)
}

fn literal(text: &str) -> FieldDescription {
    FieldDescription::anonymous_item(FieldItem::Ctor(Ctor::bytes(text)))
}

fn regex_field(name: &str, pattern: &str) -> FieldDescription {
    FieldDescription::new(name, FieldItem::Ctor(Ctor::regex(pattern)))
}

/// `method:/[A-Z]+/ " " uri:/[^ ]+/ " " "HTTP/" version:/[0-9]+\.[0-9]+/ "\r\n"`
fn request_line() -> Vec<UnitDescription> {
    vec![
        UnitDescription::new("RequestLine")
            .with_field(regex_field("method", "[A-Z]+"))
            .with_field(literal(" "))
            .with_field(regex_field("uri", "[^ ]+"))
            .with_field(literal(" "))
            .with_field(literal("HTTP/"))
            .with_field(regex_field("version", r"[0-9]+\.[0-9]+"))
            .with_field(literal("\r\n")),
    ]
}

fn sync_records() -> Vec<UnitDescription> {
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
        .with_attributes(
            [Attribute::new(AttrKind::Synchronize)].into_iter().collect(),
        )
        .with_repeat(RepeatSpec::Eod),
    );
    vec![stream, record]
}

fn parse_all(units: &[UnitDescription], input: &[u8]) -> Result<UnitValue> {
    parse(module_of(units), &units[0].name, input)
}

#[test]
fn request_line_parses_to_structured_fields() {
    let parsed = parse_all(&request_line(), b"GET /index HTTP/1.0\r\n").unwrap();
    insta::assert_snapshot!(serde_json::to_string(&parsed).unwrap(), @r#"{"method":"GET","uri":"/index","version":"1.0"}"#);
}

#[test]
fn missing_terminator_over_frozen_stream_fails() {
    let err = parse_all(&request_line(), b"GET /index HTTP/1.0").unwrap_err();
    assert!(err.is_recoverable(), "{err:?}");
    assert!(err.to_string().contains("expected"), "{err}");
}

#[test]
fn one_byte_chunks_parse_like_one_big_chunk() {
    let module = module_of(&request_line());
    let whole = parse(Arc::clone(&module), "RequestLine", b"GET /index HTTP/1.0\r\n").unwrap();

    let mut driver = Driver::new(module, "RequestLine").unwrap();
    for &b in b"GET /index HTTP/1.0\r\n" {
        driver.process(vec![b]).unwrap();
    }
    let chunked = driver.finish().unwrap();

    assert_eq!(whole, chunked);
}

#[test]
fn look_ahead_dispatches_on_the_first_token() {
    // Msg = "A" tag:u8 | "B" tag:u8
    let msg = UnitDescription::new("Msg").with_field(FieldDescription::anonymous_item(
        FieldItem::Alternative {
            first: vec![literal("A"), FieldDescription::new("a_tag", FieldItem::Type(u8_type()))],
            second: vec![literal("B"), FieldDescription::new("b_tag", FieldItem::Type(u8_type()))],
            default: LookAheadDefault::None,
        },
    ));

    let parsed = parse_all(&[msg.clone()], b"A\x42").unwrap();
    assert_eq!(parsed.get("a_tag"), Some(&Value::UInt(0x42)));
    assert_eq!(parsed.get("b_tag"), None);

    let parsed = parse_all(&[msg.clone()], b"B\x17").unwrap();
    assert_eq!(parsed.get("b_tag"), Some(&Value::UInt(0x17)));

    let err = parse_all(&[msg], b"C\x42").unwrap_err();
    assert!(
        err.to_string().contains("no look-ahead alternative"),
        "{err}"
    );
}

#[test]
fn resync_skips_garbage_between_records() {
    // 03 AA BB CC | FF (garbage) | 02 DD EE
    let input = [0x03, 0xaa, 0xbb, 0xcc, 0xff, 0x02, 0xdd, 0xee];
    let parsed = parse_all(&sync_records(), &input).unwrap();

    let Some(Value::Vector(records)) = parsed.get("records") else {
        panic!("expected record vector");
    };
    assert_eq!(records.len(), 2);
    let Value::Unit(first) = &records[0] else {
        panic!("expected unit");
    };
    assert_eq!(first.get("payload"), Some(&Value::bytes(&[0xaa, 0xbb, 0xcc][..])));
    let Value::Unit(second) = &records[1] else {
        panic!("expected unit");
    };
    assert_eq!(second.get("payload"), Some(&Value::bytes(&[0xdd, 0xee][..])));
}

#[test]
fn unrecoverable_garbage_surfaces_the_error() {
    // Trailing garbage that never parses as a record.
    let input = [0x02, 0xaa, 0xbb, 0xff];
    let err = parse_all(&sync_records(), &input).unwrap_err();
    assert!(err.is_recoverable(), "{err:?}");
}

#[test]
fn empty_input_against_nullable_start_yields_empty_unit() {
    let unit = UnitDescription::new("Maybe").with_field(
        FieldDescription::new("items", FieldItem::Type(u8_type()))
            .with_repeat(RepeatSpec::Eod),
    );
    let parsed = parse_all(&[unit], b"").unwrap();
    assert_eq!(parsed.get("items"), Some(&Value::Vector(vec![])));
}

#[test]
fn empty_input_against_non_nullable_start_fails() {
    let unit = UnitDescription::new("Strict")
        .with_field(FieldDescription::new("v", FieldItem::Type(u8_type())));
    let err = parse_all(&[unit], b"").unwrap_err();
    assert!(err.is_recoverable(), "{err:?}");
}

#[test]
fn finished_driver_rejects_input_until_reset() {
    let module = module_of(&request_line());
    let mut driver = Driver::new(module, "RequestLine").unwrap();
    let status = driver.process(&b"GET / HTTP/1.0\r\n"[..]).unwrap();
    assert_eq!(status, DriverStatus::Finished);

    assert!(driver.process(&b"more"[..]).is_err());

    driver.reset().unwrap();
    driver.process(&b"PUT /x HTTP/1.1\r\n"[..]).unwrap();
    let parsed = driver.finish().unwrap();
    assert_eq!(parsed.get("method"), Some(&Value::bytes("PUT")));
}

#[test]
fn failed_driver_latches_until_reset() {
    let module = module_of(&request_line());
    let mut driver = Driver::new(module, "RequestLine").unwrap();
    driver.process(&b"123 broken\r\n"[..]).unwrap_err();

    // Every further call reports the original failure.
    let err = driver.process(&b"GET / HTTP/1.0\r\n"[..]).unwrap_err();
    assert!(err.is_recoverable());

    driver.reset().unwrap();
    driver.process(&b"GET / HTTP/1.0\r\n"[..]).unwrap();
    driver.finish().unwrap();
}

#[test]
fn parser_info_reports_public_fields() {
    let module = module_of(&request_line());
    let driver = Driver::new(module, "RequestLine").unwrap();
    let info = driver.parser_info();
    assert_eq!(info.name, "RequestLine");
    assert_eq!(info.fields, ["method", "uri", "version"]);
}

#[test]
fn unknown_parser_name_is_a_context_mismatch() {
    let module = module_of(&request_line());
    let err = Driver::new(module, "Nope").unwrap_err();
    assert!(err.to_string().contains("no parser named"), "{err}");
}

#[test]
fn auto_trim_releases_consumed_input() {
    let module = module_of(&request_line());
    let mut driver = Driver::with_hosts(
        module,
        "RequestLine",
        Box::new(crate::hooks::NoopHost),
        Box::new(crate::hooks::NoopHost),
        MachineConfig::default().with_auto_trim(true),
    )
    .unwrap();

    driver.process(&b"GET /index "[..]).unwrap();
    assert!(driver.bytes_consumed() >= 11);
    driver.process(&b"HTTP/1.0\r\n"[..]).unwrap();
    driver.finish().unwrap();
}
