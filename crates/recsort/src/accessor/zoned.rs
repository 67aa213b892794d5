//! Zoned decimal (`ZD`) fields.
//!
//! One digit per byte in the low nibble. The high nibble of the last byte
//! carries the sign:
//!
//! | Encoding | digit zone | positive | negative |
//! |----------|------------|----------|----------|
//! | ASCII    | `0x3`      | `0x3`    | `0x7` (`p`..`y`) |
//! | EBCDIC   | `0xF`      | `0xC`    | `0xD`    |
//!
//! On input any `B` or `D` sign zone reads as negative, as does `7` in
//! ASCII data. Zones of the other bytes are not checked.

use rust_decimal::Decimal;

use super::{from_integral, integral, CodecError};
use crate::encoding::Encoding;

/// Decodes a zoned decimal.
pub fn unzone(bytes: &[u8], encoding: Encoding) -> Result<Decimal, CodecError> {
    let mut value: i128 = 0;
    for &byte in bytes {
        let digit = byte & 0x0F;
        if digit > 9 {
            return Err(CodecError::BadDigit {
                nibble: digit,
                byte,
            });
        }
        value = value * 10 + i128::from(digit);
    }

    let negative = bytes
        .last()
        .is_some_and(|&last| encoding.is_negative_zone(last >> 4));
    from_integral(if negative { -value } else { value })
}

/// Encodes `value` right-aligned into `target`, zero-filled.
pub fn zone(value: Decimal, target: &mut [u8], encoding: Encoding) -> Result<(), CodecError> {
    let length = target.len();
    let overflow = || CodecError::Overflow {
        value: value.to_string(),
        length,
    };
    let Some(n) = integral(value) else {
        return Err(overflow());
    };
    let negative = n < 0;
    let mut magnitude = n.unsigned_abs();

    let digit_zone = encoding.digit_zone() << 4;
    let len = target.len();
    let mut digits = vec![0u8; len];
    for slot in digits.iter_mut().rev() {
        *slot = (magnitude % 10) as u8;
        magnitude /= 10;
    }
    if magnitude != 0 {
        return Err(overflow());
    }

    for (byte, digit) in target.iter_mut().zip(&digits) {
        *byte = digit_zone | digit;
    }
    if let Some(last) = target.last_mut() {
        let zone = if negative {
            encoding.negative_zone()
        } else {
            encoding.positive_zone()
        };
        *last = (zone << 4) | (*last & 0x0F);
    }
    Ok(())
}
