//! Decoding of fixed-size primitives from raw bytes.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use wiregram_core::{
    AddressFamily, BitOrder, BitRange, ByteOrder, ParseError, ParseType, RealFormat, Result,
    UnitValue, Value,
};

/// Wire size of a fixed-size type. `Bytes` has no inherent size.
pub fn fixed_size(ty: &ParseType) -> Option<u64> {
    ty.fixed_size()
}

/// Decode a fixed-size primitive. `bytes` must be exactly the wire
/// size.
pub fn decode_fixed(ty: &ParseType, bytes: &[u8]) -> Result<Value> {
    match ty {
        ParseType::UInt { bits, order } => Ok(Value::UInt(read_uint(bytes, *bits, *order)?)),
        ParseType::SInt { bits, order } => {
            let raw = read_uint(bytes, *bits, *order)?;
            Ok(Value::Int(sign_extend(raw, *bits)))
        }
        ParseType::Real { format, order } => decode_real(bytes, *format, *order),
        ParseType::Bitfield {
            bits,
            order,
            bit_order,
            ranges,
        } => decode_bitfield(bytes, *bits, *order, *bit_order, ranges),
        ParseType::Address { family, order } => decode_address(bytes, *family, *order),
        ParseType::Bytes => Err(ParseError::Internal(
            "bytes fields have no fixed size".to_string(),
        )),
    }
}

fn read_uint(bytes: &[u8], bits: u8, order: ByteOrder) -> Result<u64> {
    let n = usize::from(bits / 8);
    if bytes.len() != n || !matches!(bits, 8 | 16 | 32 | 64) {
        return Err(ParseError::Internal(format!(
            "integer decode expects {n} bytes, got {}",
            bytes.len()
        )));
    }
    let mut value: u64 = 0;
    match order.concrete() {
        ByteOrder::Little => {
            for &b in bytes.iter().rev() {
                value = (value << 8) | u64::from(b);
            }
        }
        _ => {
            for &b in bytes {
                value = (value << 8) | u64::from(b);
            }
        }
    }
    Ok(value)
}

fn sign_extend(raw: u64, bits: u8) -> i64 {
    let shift = 64 - u32::from(bits);
    ((raw << shift) as i64) >> shift
}

fn decode_real(bytes: &[u8], format: RealFormat, order: ByteOrder) -> Result<Value> {
    match format {
        RealFormat::Single => {
            let raw = read_uint(bytes, 32, order)? as u32;
            Ok(Value::Real(f64::from(f32::from_bits(raw))))
        }
        RealFormat::Double => {
            let raw = read_uint(bytes, 64, order)?;
            Ok(Value::Real(f64::from_bits(raw)))
        }
    }
}

fn decode_address(bytes: &[u8], family: AddressFamily, order: ByteOrder) -> Result<Value> {
    match family {
        AddressFamily::IPv4 => {
            let raw = read_uint(bytes, 32, order)? as u32;
            Ok(Value::Address(IpAddr::V4(Ipv4Addr::from_bits(raw))))
        }
        AddressFamily::IPv6 => {
            if bytes.len() != 16 {
                return Err(ParseError::Internal(
                    "IPv6 decode expects 16 bytes".to_string(),
                ));
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(bytes);
            if order.concrete() == ByteOrder::Little {
                octets.reverse();
            }
            Ok(Value::Address(IpAddr::V6(Ipv6Addr::from(octets))))
        }
    }
}

/// A bitfield decodes to a unit-like record with one member per named
/// range.
fn decode_bitfield(
    bytes: &[u8],
    bits: u8,
    order: ByteOrder,
    bit_order: BitOrder,
    ranges: &[BitRange],
) -> Result<Value> {
    let carrier = read_uint(bytes, bits, order)?;
    let mut record = UnitValue::new("bitfield");
    for range in ranges {
        record.set(
            range.name.clone(),
            Value::UInt(extract_bits(carrier, bits, bit_order, range)?),
        );
    }
    Ok(Value::Unit(record))
}

fn extract_bits(carrier: u64, bits: u8, bit_order: BitOrder, range: &BitRange) -> Result<u64> {
    if range.low > range.high || range.high >= bits {
        return Err(ParseError::OutOfRange(format!(
            "bit range {}..{} exceeds a {bits}-bit carrier",
            range.low, range.high
        )));
    }
    let width = range.high - range.low + 1;
    let mask = if width == 64 { u64::MAX } else { (1 << width) - 1 };
    let shift = match bit_order {
        BitOrder::Lsb0 => range.low,
        BitOrder::Msb0 => bits - 1 - range.high,
    };
    Ok((carrier >> shift) & mask)
}

/// Encode an integer literal in its wire format, for literal matching.
pub fn encode_uint(value: u64, ty: &ParseType) -> Result<Vec<u8>> {
    let ParseType::UInt { bits, order } = ty else {
        return Err(ParseError::Internal(
            "integer literal with non-integer type".to_string(),
        ));
    };
    let n = usize::from(bits / 8);
    let mut out = vec![0u8; n];
    match order.concrete() {
        ByteOrder::Little => {
            for (i, byte) in out.iter_mut().enumerate() {
                *byte = (value >> (8 * i)) as u8;
            }
        }
        _ => {
            for (i, byte) in out.iter_mut().enumerate() {
                *byte = (value >> (8 * (n - 1 - i))) as u8;
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u16be() -> ParseType {
        ParseType::UInt {
            bits: 16,
            order: ByteOrder::Big,
        }
    }

    #[test]
    fn uint_byte_orders() {
        let be = decode_fixed(&u16be(), &[0x01, 0x02]).unwrap();
        assert_eq!(be, Value::UInt(0x0102));

        let le = decode_fixed(
            &ParseType::UInt {
                bits: 16,
                order: ByteOrder::Little,
            },
            &[0x01, 0x02],
        )
        .unwrap();
        assert_eq!(le, Value::UInt(0x0201));
    }

    #[test]
    fn signed_values_sign_extend() {
        let v = decode_fixed(
            &ParseType::SInt {
                bits: 8,
                order: ByteOrder::Big,
            },
            &[0xff],
        )
        .unwrap();
        assert_eq!(v, Value::Int(-1));
    }

    #[test]
    fn ipv4_address() {
        let v = decode_fixed(
            &ParseType::Address {
                family: AddressFamily::IPv4,
                order: ByteOrder::Big,
            },
            &[192, 168, 0, 1],
        )
        .unwrap();
        assert_eq!(v, Value::Address("192.168.0.1".parse().unwrap()));
    }

    #[test]
    fn bitfield_lsb0_and_msb0() {
        let ranges = vec![
            BitRange {
                name: "low".to_string(),
                low: 0,
                high: 3,
            },
            BitRange {
                name: "high".to_string(),
                low: 4,
                high: 7,
            },
        ];
        let lsb = decode_fixed(
            &ParseType::Bitfield {
                bits: 8,
                order: ByteOrder::Big,
                bit_order: BitOrder::Lsb0,
                ranges: ranges.clone(),
            },
            &[0xab],
        )
        .unwrap();
        let Value::Unit(record) = lsb else {
            panic!("expected record")
        };
        assert_eq!(record.get("low"), Some(&Value::UInt(0xb)));
        assert_eq!(record.get("high"), Some(&Value::UInt(0xa)));

        let msb = decode_fixed(
            &ParseType::Bitfield {
                bits: 8,
                order: ByteOrder::Big,
                bit_order: BitOrder::Msb0,
                ranges,
            },
            &[0xab],
        )
        .unwrap();
        let Value::Unit(record) = msb else {
            panic!("expected record")
        };
        assert_eq!(record.get("low"), Some(&Value::UInt(0xa)));
        assert_eq!(record.get("high"), Some(&Value::UInt(0xb)));
    }

    #[test]
    fn uint_literals_encode_to_wire_bytes() {
        assert_eq!(encode_uint(0x0102, &u16be()).unwrap(), vec![0x01, 0x02]);
        assert_eq!(
            encode_uint(
                0x0102,
                &ParseType::UInt {
                    bits: 16,
                    order: ByteOrder::Little,
                }
            )
            .unwrap(),
            vec![0x02, 0x01]
        );
    }

    #[test]
    fn real_single() {
        let bytes = 1.5f32.to_bits().to_be_bytes();
        let v = decode_real(&bytes, RealFormat::Single, ByteOrder::Big).unwrap();
        assert_eq!(v, Value::Real(1.5));
    }
}
