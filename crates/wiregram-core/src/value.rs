//! Runtime values produced by a parse.
//!
//! `Value` and `UnitValue` serialize untagged for readable host output;
//! that form is write-only. Values persisted inside compiled plans go
//! through the tagged [`codec`] instead, which round-trips through
//! non-self-describing formats.

use std::net::IpAddr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// An owned byte string with readable debug and JSON output.
///
/// Non-printable bytes render as `\xNN` escapes so snapshot output stays
/// legible for text-heavy protocols. The escaping is reversible, so
/// `Bytes` deserializes from the same escaped form.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Bytes(Vec<u8>);

impl Bytes {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self(data.into())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    fn escaped(&self) -> String {
        let mut out = String::with_capacity(self.0.len());
        for &b in &self.0 {
            match b {
                b'\\' => out.push_str("\\\\"),
                b'\r' => out.push_str("\\r"),
                b'\n' => out.push_str("\\n"),
                b'\t' => out.push_str("\\t"),
                0x20..=0x7e => out.push(b as char),
                _ => out.push_str(&format!("\\x{b:02x}")),
            }
        }
        out
    }

    /// Inverse of `escaped`. The escaped form is pure ASCII.
    fn unescape(text: &str) -> Result<Self, String> {
        let bytes = text.as_bytes();
        let mut out = Vec::with_capacity(bytes.len());
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] != b'\\' {
                out.push(bytes[i]);
                i += 1;
                continue;
            }
            match bytes.get(i + 1) {
                Some(b'\\') => out.push(b'\\'),
                Some(b'r') => out.push(b'\r'),
                Some(b'n') => out.push(b'\n'),
                Some(b't') => out.push(b'\t'),
                Some(b'x') => {
                    let hex = text
                        .get(i + 2..i + 4)
                        .ok_or_else(|| "truncated \\x escape".to_string())?;
                    let value = u8::from_str_radix(hex, 16)
                        .map_err(|_| format!("invalid \\x escape `{hex}`"))?;
                    out.push(value);
                    i += 4;
                    continue;
                }
                Some(&other) => {
                    return Err(format!("unknown escape `\\{}`", other as char));
                }
                None => {
                    return Err("dangling backslash".to_string());
                }
            }
            i += 2;
        }
        Ok(Self(out))
    }
}

impl std::ops::Deref for Bytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for Bytes {
    fn from(data: &[u8]) -> Self {
        Self(data.to_vec())
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

impl From<&str> for Bytes {
    fn from(data: &str) -> Self {
        Self(data.as_bytes().to_vec())
    }
}

impl std::fmt::Debug for Bytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b\"{}\"", self.escaped())
    }
}

impl std::fmt::Display for Bytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.escaped())
    }
}

impl Serialize for Bytes {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.escaped())
    }
}

impl<'de> Deserialize<'de> for Bytes {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::unescape(&text).map_err(serde::de::Error::custom)
    }
}

/// A structured value surfaced to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Missing optional value. Serializes to `null`.
    Null,
    Bool(bool),
    UInt(u64),
    Int(i64),
    Real(f64),
    Bytes(Bytes),
    /// An IPv4 or IPv6 address.
    Address(IpAddr),
    /// A list, from a repeated field.
    Vector(Vec<Value>),
    /// A nested unit.
    Unit(UnitValue),
}

impl Value {
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Value::Bytes(data.into())
    }

    /// Numeric view used by counter and boundary expressions.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

/// Parse state of a single unit field.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldState {
    /// Not yet reached by the parse.
    #[default]
    Absent,
    /// Matched, value stored.
    Present(Value),
    /// Matched, value discarded.
    Skipped,
}

impl FieldState {
    pub fn value(&self) -> Option<&Value> {
        match self {
            FieldState::Present(v) => Some(v),
            _ => None,
        }
    }
}

/// An ordered record of named fields being populated by a parse.
///
/// Serialization includes only fields that are present; absent and
/// skipped fields are omitted, matching what the host observes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnitValue {
    type_name: String,
    fields: IndexMap<String, FieldState>,
}

impl UnitValue {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Store a parsed value, transitioning the field to `Present`.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), FieldState::Present(value));
    }

    /// Mark a field matched-but-discarded.
    pub fn set_skipped(&mut self, name: impl Into<String>) {
        self.fields.insert(name.into(), FieldState::Skipped);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).and_then(FieldState::value)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        match self.fields.get_mut(name) {
            Some(FieldState::Present(v)) => Some(v),
            _ => None,
        }
    }

    pub fn state(&self, name: &str) -> &FieldState {
        static ABSENT: FieldState = FieldState::Absent;
        self.fields.get(name).unwrap_or(&ABSENT)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldState)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Serialize for UnitValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let present = self.fields.iter().filter_map(|(k, v)| match v {
            FieldState::Present(value) => Some((k, value)),
            _ => None,
        });
        let mut map = serializer.serialize_map(None)?;
        for (k, v) in present {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Tagged wire codec for values embedded in compiled plans.
///
/// `Value`'s own `Serialize` is the untagged display form and has no
/// inverse; anything that must survive an artifact round-trip uses this
/// module through `#[serde(with = "...")]`. The representation is a
/// plainly tagged mirror, so it works with postcard as well as JSON.
pub mod codec {
    use std::net::IpAddr;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{Bytes, FieldState, UnitValue, Value};

    #[derive(Serialize, Deserialize)]
    enum Repr {
        Null,
        Bool(bool),
        UInt(u64),
        Int(i64),
        Real(f64),
        Bytes(Bytes),
        Address(IpAddr),
        Vector(Vec<Repr>),
        Unit(UnitRepr),
    }

    #[derive(Serialize, Deserialize)]
    struct UnitRepr {
        type_name: String,
        fields: Vec<(String, SlotRepr)>,
    }

    /// Absent slots are not stored; a missing entry reads back as
    /// absent, which is the same observable state.
    #[derive(Serialize, Deserialize)]
    enum SlotRepr {
        Present(Repr),
        Skipped,
    }

    fn to_repr(value: &Value) -> Repr {
        match value {
            Value::Null => Repr::Null,
            Value::Bool(v) => Repr::Bool(*v),
            Value::UInt(v) => Repr::UInt(*v),
            Value::Int(v) => Repr::Int(*v),
            Value::Real(v) => Repr::Real(*v),
            Value::Bytes(b) => Repr::Bytes(b.clone()),
            Value::Address(a) => Repr::Address(*a),
            Value::Vector(items) => Repr::Vector(items.iter().map(to_repr).collect()),
            Value::Unit(unit) => Repr::Unit(UnitRepr {
                type_name: unit.type_name().to_string(),
                fields: unit
                    .iter()
                    .filter_map(|(name, state)| match state {
                        FieldState::Present(v) => {
                            Some((name.to_string(), SlotRepr::Present(to_repr(v))))
                        }
                        FieldState::Skipped => {
                            Some((name.to_string(), SlotRepr::Skipped))
                        }
                        FieldState::Absent => None,
                    })
                    .collect(),
            }),
        }
    }

    fn from_repr(repr: Repr) -> Value {
        match repr {
            Repr::Null => Value::Null,
            Repr::Bool(v) => Value::Bool(v),
            Repr::UInt(v) => Value::UInt(v),
            Repr::Int(v) => Value::Int(v),
            Repr::Real(v) => Value::Real(v),
            Repr::Bytes(b) => Value::Bytes(b),
            Repr::Address(a) => Value::Address(a),
            Repr::Vector(items) => {
                Value::Vector(items.into_iter().map(from_repr).collect())
            }
            Repr::Unit(unit) => {
                let mut value = UnitValue::new(unit.type_name);
                for (name, slot) in unit.fields {
                    match slot {
                        SlotRepr::Present(v) => value.set(name, from_repr(v)),
                        SlotRepr::Skipped => value.set_skipped(name),
                    }
                }
                Value::Unit(value)
            }
        }
    }

    pub fn serialize<S: Serializer>(value: &Value, serializer: S) -> Result<S::Ok, S::Error> {
        to_repr(value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
        Ok(from_repr(Repr::deserialize(deserializer)?))
    }
}
