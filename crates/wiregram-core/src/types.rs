//! Parseable primitive types and their storage attributes.

use serde::{Deserialize, Serialize};

/// Byte order for multi-byte primitives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
    /// Alias for big-endian, kept distinct for diagnostics.
    Network,
    /// The host's native order.
    Host,
}

impl ByteOrder {
    /// Resolve aliases to a concrete order.
    pub fn concrete(self) -> ByteOrder {
        match self {
            ByteOrder::Network => ByteOrder::Big,
            ByteOrder::Host => {
                if cfg!(target_endian = "little") {
                    ByteOrder::Little
                } else {
                    ByteOrder::Big
                }
            }
            other => other,
        }
    }
}

/// Bit numbering inside a bitfield carrier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitOrder {
    #[default]
    Lsb0,
    Msb0,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RealFormat {
    Single,
    Double,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressFamily {
    IPv4,
    IPv6,
}

/// A named bit range within a bitfield, inclusive on both ends.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitRange {
    pub name: String,
    pub low: u8,
    pub high: u8,
}

/// A primitive type the runtime knows how to decode from raw bytes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ParseType {
    /// Unsigned integer of 8, 16, 32, or 64 bits.
    UInt { bits: u8, order: ByteOrder },
    /// Signed two's-complement integer of 8, 16, 32, or 64 bits.
    SInt { bits: u8, order: ByteOrder },
    /// IEEE-754 binary32 or binary64.
    Real { format: RealFormat, order: ByteOrder },
    /// Fixed-width carrier with named sub-ranges.
    Bitfield {
        bits: u8,
        order: ByteOrder,
        bit_order: BitOrder,
        ranges: Vec<BitRange>,
    },
    /// IPv4 (4 bytes) or IPv6 (16 bytes) address.
    Address { family: AddressFamily, order: ByteOrder },
    /// A run of raw bytes; length comes from attributes, never the type.
    Bytes,
}

impl ParseType {
    /// Wire size in bytes, when derivable from the type alone.
    pub fn fixed_size(&self) -> Option<u64> {
        match self {
            ParseType::UInt { bits, .. }
            | ParseType::SInt { bits, .. }
            | ParseType::Bitfield { bits, .. } => Some(u64::from(*bits) / 8),
            ParseType::Real { format, .. } => Some(match format {
                RealFormat::Single => 4,
                RealFormat::Double => 8,
            }),
            ParseType::Address { family, .. } => Some(match family {
                AddressFamily::IPv4 => 4,
                AddressFamily::IPv6 => 16,
            }),
            ParseType::Bytes => None,
        }
    }
}

impl std::fmt::Display for ParseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseType::UInt { bits, .. } => write!(f, "uint{bits}"),
            ParseType::SInt { bits, .. } => write!(f, "int{bits}"),
            ParseType::Real {
                format: RealFormat::Single,
                ..
            } => write!(f, "real32"),
            ParseType::Real {
                format: RealFormat::Double,
                ..
            } => write!(f, "real64"),
            ParseType::Bitfield { bits, .. } => write!(f, "bitfield{bits}"),
            ParseType::Address {
                family: AddressFamily::IPv4,
                ..
            } => write!(f, "addr4"),
            ParseType::Address {
                family: AddressFamily::IPv6,
                ..
            } => write!(f, "addr6"),
            ParseType::Bytes => write!(f, "bytes"),
        }
    }
}
