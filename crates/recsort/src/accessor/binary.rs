//! Big-endian binary fields: `FI` (signed two's complement) and `BI`
//! (unsigned), 1 to 8 bytes wide.

use rust_decimal::Decimal;

use super::{from_integral, integral, CodecError};

/// Decodes a signed big-endian integer.
pub fn decode_signed(bytes: &[u8]) -> Result<Decimal, CodecError> {
    let Some(&first) = bytes.first() else {
        return Ok(Decimal::ZERO);
    };
    let fill: i128 = if first & 0x80 != 0 { -1 } else { 0 };
    let value = bytes
        .iter()
        .fold(fill, |acc, &b| (acc << 8) | i128::from(b));
    from_integral(value)
}

/// Decodes an unsigned big-endian integer.
pub fn decode_unsigned(bytes: &[u8]) -> Result<Decimal, CodecError> {
    let value = bytes
        .iter()
        .fold(0i128, |acc, &b| (acc << 8) | i128::from(b));
    from_integral(value)
}

/// Encodes a signed value, range-checked against the field width.
pub fn encode_signed(value: Decimal, target: &mut [u8]) -> Result<(), CodecError> {
    let bits = target.len() as u32 * 8;
    let n = in_range(value, target.len(), |n| {
        let limit = 1i128 << bits.saturating_sub(1);
        bits > 0 && n >= -limit && n < limit
    })?;
    write_be(n, target);
    Ok(())
}

/// Encodes an unsigned value, range-checked against the field width.
pub fn encode_unsigned(value: Decimal, target: &mut [u8]) -> Result<(), CodecError> {
    let bits = target.len() as u32 * 8;
    let n = in_range(value, target.len(), |n| n >= 0 && n < (1i128 << bits))?;
    write_be(n, target);
    Ok(())
}

fn in_range(
    value: Decimal,
    length: usize,
    fits: impl Fn(i128) -> bool,
) -> Result<i128, CodecError> {
    integral(value)
        .filter(|&n| length <= 8 && fits(n))
        .ok_or_else(|| CodecError::Overflow {
            value: value.to_string(),
            length,
        })
}

fn write_be(n: i128, target: &mut [u8]) {
    let bytes = n.to_be_bytes();
    let skip = bytes.len() - target.len();
    target.copy_from_slice(&bytes[skip..]);
}
