//! Packed decimal (`PD`) fields.
//!
//! Two BCD digits per byte; the low nibble of the last byte is the sign.
//! An `n`-byte field holds `2n - 1` digits.
//!
//! Example: +12345 in 3 bytes is `0x12 0x34 0x5C`.

use rust_decimal::Decimal;

use super::{from_integral, integral, CodecError};

const POSITIVE: u8 = 0x0C;
const NEGATIVE: u8 = 0x0D;

fn is_negative_sign(nibble: u8) -> Result<bool, CodecError> {
    match nibble {
        0x0A | 0x0C | 0x0E | 0x0F => Ok(false),
        0x0B | 0x0D => Ok(true),
        other => Err(CodecError::BadSign(other)),
    }
}

/// Decodes a packed decimal.
pub fn unpack(bytes: &[u8]) -> Result<Decimal, CodecError> {
    let Some((&last, leading)) = bytes.split_last() else {
        return Ok(Decimal::ZERO);
    };

    let mut value: i128 = 0;
    let mut push = |nibble: u8, byte: u8| -> Result<(), CodecError> {
        if nibble > 9 {
            return Err(CodecError::BadDigit { nibble, byte });
        }
        value = value * 10 + i128::from(nibble);
        Ok(())
    };
    for &byte in leading {
        push(byte >> 4, byte)?;
        push(byte & 0x0F, byte)?;
    }
    push(last >> 4, last)?;

    let negative = is_negative_sign(last & 0x0F)?;
    from_integral(if negative { -value } else { value })
}

/// Encodes `value` into `target` with a preferred `C`/`D` sign.
pub fn pack(value: Decimal, target: &mut [u8]) -> Result<(), CodecError> {
    let length = target.len();
    let overflow = || CodecError::Overflow {
        value: value.to_string(),
        length,
    };
    let Some(n) = integral(value) else {
        return Err(overflow());
    };
    if target.is_empty() {
        return Err(overflow());
    }

    let mut magnitude = n.unsigned_abs();
    let sign = if n < 0 { NEGATIVE } else { POSITIVE };

    // Fill nibbles right to left, starting just left of the sign.
    let mut nibbles = vec![0u8; target.len() * 2];
    let (sign_slot, digit_slots) = nibbles.split_last_mut().ok_or_else(overflow)?;
    *sign_slot = sign;
    for slot in digit_slots.iter_mut().rev() {
        *slot = (magnitude % 10) as u8;
        magnitude /= 10;
    }
    if magnitude != 0 {
        return Err(overflow());
    }

    for (byte, pair) in target.iter_mut().zip(nibbles.chunks(2)) {
        *byte = (pair[0] << 4) | pair[1];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: i64, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        pack(Decimal::from(value), &mut out).unwrap();
        out
    }

    #[test]
    fn test_pack_positive() {
        assert_eq!(encode(12345, 3), vec![0x12, 0x34, 0x5C]);
    }

    #[test]
    fn test_pack_negative() {
        assert_eq!(encode(-12345, 3), vec![0x12, 0x34, 0x5D]);
    }

    #[test]
    fn test_pack_pads_high_digits() {
        assert_eq!(encode(42, 4), vec![0x00, 0x00, 0x04, 0x2C]);
        assert_eq!(encode(0, 1), vec![0x0C]);
    }

    #[test]
    fn test_unpack_sign_nibbles() {
        assert_eq!(unpack(&[0x12, 0x3C]).unwrap(), Decimal::from(123));
        assert_eq!(unpack(&[0x12, 0x3F]).unwrap(), Decimal::from(123));
        assert_eq!(unpack(&[0x12, 0x3A]).unwrap(), Decimal::from(123));
        assert_eq!(unpack(&[0x12, 0x3E]).unwrap(), Decimal::from(123));
        assert_eq!(unpack(&[0x12, 0x3D]).unwrap(), Decimal::from(-123));
        assert_eq!(unpack(&[0x12, 0x3B]).unwrap(), Decimal::from(-123));
    }

    #[test]
    fn test_unpack_invalid() {
        assert_eq!(unpack(&[0x12, 0x34]), Err(CodecError::BadSign(0x4)));
        assert!(matches!(
            unpack(&[0x1A, 0x3C]),
            Err(CodecError::BadDigit { nibble: 0xA, .. })
        ));
    }

    #[test]
    fn test_overflow() {
        let mut out = [0u8; 2];
        assert!(pack(Decimal::from(999), &mut out).is_ok());
        assert_eq!(out, [0x99, 0x9C]);
        assert!(matches!(
            pack(Decimal::from(1000), &mut out),
            Err(CodecError::Overflow { length: 2, .. })
        ));
    }

    #[test]
    fn test_max_width() {
        let mut out = [0u8; 14];
        let big = Decimal::from_i128_with_scale(-999_999_999_999_999_999_999_999_999, 0);
        pack(big, &mut out).unwrap();
        assert_eq!(unpack(&out).unwrap(), big);
    }
}
