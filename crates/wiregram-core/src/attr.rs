//! Field and block attributes recognized by the core.

use serde::{Deserialize, Serialize};

use crate::expr::Expr;
use crate::location::Location;

/// The closed set of attributes the parser-generation core understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrKind {
    /// `&size=E`: bound the inner view to exactly E bytes.
    Size,
    /// `&max-size=E`: bound the inner view to at most E bytes.
    MaxSize,
    /// `&parse-at=E`: parse starting at absolute offset E.
    ParseAt,
    /// `&parse-from=E`: parse from a secondary data source.
    ParseFrom,
    /// `&until=E`: container terminator, exclusive.
    Until,
    /// `&until-including=E`: container terminator, inclusive.
    UntilIncluding,
    /// `&while=E`: continue while E holds.
    While,
    /// `&eod`: container runs to end-of-data.
    Eod,
    /// `&count=E`: parse exactly E elements.
    Count,
    /// `&chunked`: deliver incremental chunks to hooks.
    Chunked,
    /// `&synchronize`: enable resynchronization on parse error.
    Synchronize,
    /// `&convert=E`: replace the parsed value with E.
    Convert,
    /// `&type=E`: select the parsing variant.
    Type,
    /// `&byte-order=E`.
    ByteOrder,
    /// `&bit-order=E`.
    BitOrder,
    /// `&ipv4`.
    IPv4,
    /// `&ipv6`.
    IPv6,
    /// `&transient`: match without storing.
    Transient,
    /// `&anonymous`: no externally visible name.
    Anonymous,
    /// `&optional`.
    Optional,
    /// `&default=E`.
    Default,
    /// `&requires=E`: post-parse assertion.
    Requires,
}

impl std::fmt::Display for AttrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AttrKind::Size => "&size",
            AttrKind::MaxSize => "&max-size",
            AttrKind::ParseAt => "&parse-at",
            AttrKind::ParseFrom => "&parse-from",
            AttrKind::Until => "&until",
            AttrKind::UntilIncluding => "&until-including",
            AttrKind::While => "&while",
            AttrKind::Eod => "&eod",
            AttrKind::Count => "&count",
            AttrKind::Chunked => "&chunked",
            AttrKind::Synchronize => "&synchronize",
            AttrKind::Convert => "&convert",
            AttrKind::Type => "&type",
            AttrKind::ByteOrder => "&byte-order",
            AttrKind::BitOrder => "&bit-order",
            AttrKind::IPv4 => "&ipv4",
            AttrKind::IPv6 => "&ipv6",
            AttrKind::Transient => "&transient",
            AttrKind::Anonymous => "&anonymous",
            AttrKind::Optional => "&optional",
            AttrKind::Default => "&default",
            AttrKind::Requires => "&requires",
        };
        f.write_str(name)
    }
}

/// One attribute instance, possibly carrying an argument expression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub kind: AttrKind,
    pub expr: Option<Expr>,
    pub location: Option<Location>,
}

impl Attribute {
    pub fn new(kind: AttrKind) -> Self {
        Self {
            kind,
            expr: None,
            location: None,
        }
    }

    pub fn with_expr(kind: AttrKind, expr: Expr) -> Self {
        Self {
            kind,
            expr: Some(expr),
            location: None,
        }
    }
}

/// The attributes attached to a field, block, or unit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSet(Vec<Attribute>);

impl AttributeSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, attr: Attribute) {
        self.0.push(attr);
    }

    pub fn has(&self, kind: AttrKind) -> bool {
        self.0.iter().any(|a| a.kind == kind)
    }

    pub fn get(&self, kind: AttrKind) -> Option<&Attribute> {
        self.0.iter().find(|a| a.kind == kind)
    }

    /// The argument expression of `kind`, if the attribute is present.
    pub fn expr(&self, kind: AttrKind) -> Option<&Expr> {
        self.get(kind).and_then(|a| a.expr.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.0.iter()
    }
}

impl FromIterator<Attribute> for AttributeSet {
    fn from_iter<T: IntoIterator<Item = Attribute>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
