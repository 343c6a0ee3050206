//! Shared fixtures for compiler tests.

use wiregram_core::{AttrKind, Attribute, ByteOrder, Expr, ParseType};

use crate::grammar::Ctor;
use crate::unit::{FieldDescription, FieldItem, RepeatSpec, UnitDescription};

pub(crate) fn u8_type() -> ParseType {
    ParseType::UInt {
        bits: 8,
        order: ByteOrder::Big,
    }
}

pub(crate) fn literal(text: &str) -> FieldDescription {
    FieldDescription::anonymous_item(FieldItem::Ctor(Ctor::bytes(text)))
}

pub(crate) fn regex_field(name: &str, pattern: &str) -> FieldDescription {
    FieldDescription::new(name, FieldItem::Ctor(Ctor::regex(pattern)))
}

/// The HTTP-like request line:
/// `method:/[A-Z]+/ " " uri:/[^ ]+/ " " "HTTP/" version:/[0-9]+\.[0-9]+/ "\r\n"`.
pub(crate) fn request_line() -> UnitDescription {
    UnitDescription::new("RequestLine")
        .with_field(regex_field("method", "[A-Z]+"))
        .with_field(literal(" "))
        .with_field(regex_field("uri", "[^ ]+"))
        .with_field(literal(" "))
        .with_field(literal("HTTP/"))
        .with_field(regex_field("version", r"[0-9]+\.[0-9]+"))
        .with_field(literal("\r\n"))
}

/// `record[] &eod &synchronize` where
/// `record = { len: u8; payload: bytes &size=self.len; }`.
pub(crate) fn sync_records() -> Vec<UnitDescription> {
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
