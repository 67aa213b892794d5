//! Display encodings and character-key collation.
//!
//! Records carry text either in ASCII or in EBCDIC (code page 037). The
//! encoding decides the space byte used for padding, how quoted card
//! literals become bytes, and the zone nibbles of zoned decimals.
//!
//! A [`Collation`] maps every byte of the display encoding to a sort
//! weight. Without a separate sort encoding the weight is the byte itself,
//! which is the native `CH` order. With one, bytes are translated into the
//! sort encoding first, so EBCDIC data can be ordered the ASCII way and the
//! other way round.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// EBCDIC substitute byte for characters with no mapping.
const EBCDIC_SUBSTITUTE: u8 = 0x3F;

/// Code page 037 to Latin-1, indexed by EBCDIC byte.
///
/// CP037 covers exactly the 256 Latin-1 code points, so the table is a
/// bijection and `LATIN1_TO_CP037` is its inverse.
const CP037_TO_LATIN1: [u8; 256] = [
    0x00, 0x01, 0x02, 0x03, 0x9C, 0x09, 0x86, 0x7F, 0x97, 0x8D, 0x8E, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
    0x10, 0x11, 0x12, 0x13, 0x9D, 0x85, 0x08, 0x87, 0x18, 0x19, 0x92, 0x8F, 0x1C, 0x1D, 0x1E, 0x1F,
    0x80, 0x81, 0x82, 0x83, 0x84, 0x0A, 0x17, 0x1B, 0x88, 0x89, 0x8A, 0x8B, 0x8C, 0x05, 0x06, 0x07,
    0x90, 0x91, 0x16, 0x93, 0x94, 0x95, 0x96, 0x04, 0x98, 0x99, 0x9A, 0x9B, 0x14, 0x15, 0x9E, 0x1A,
    0x20, 0xA0, 0xE2, 0xE4, 0xE0, 0xE1, 0xE3, 0xE5, 0xE7, 0xF1, 0xA2, 0x2E, 0x3C, 0x28, 0x2B, 0x7C,
    0x26, 0xE9, 0xEA, 0xEB, 0xE8, 0xED, 0xEE, 0xEF, 0xEC, 0xDF, 0x21, 0x24, 0x2A, 0x29, 0x3B, 0xAC,
    0x2D, 0x2F, 0xC2, 0xC4, 0xC0, 0xC1, 0xC3, 0xC5, 0xC7, 0xD1, 0xA6, 0x2C, 0x25, 0x5F, 0x3E, 0x3F,
    0xF8, 0xC9, 0xCA, 0xCB, 0xC8, 0xCD, 0xCE, 0xCF, 0xCC, 0x60, 0x3A, 0x23, 0x40, 0x27, 0x3D, 0x22,
    0xD8, 0x61, 0x62, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0xAB, 0xBB, 0xF0, 0xFD, 0xFE, 0xB1,
    0xB0, 0x6A, 0x6B, 0x6C, 0x6D, 0x6E, 0x6F, 0x70, 0x71, 0x72, 0xAA, 0xBA, 0xE6, 0xB8, 0xC6, 0xA4,
    0xB5, 0x7E, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7A, 0xA1, 0xBF, 0xD0, 0xDD, 0xDE, 0xAE,
    0x5E, 0xA3, 0xA5, 0xB7, 0xA9, 0xA7, 0xB6, 0xBC, 0xBD, 0xBE, 0x5B, 0x5D, 0xAF, 0xA8, 0xB4, 0xD7,
    0x7B, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0xAD, 0xF4, 0xF6, 0xF2, 0xF3, 0xF5,
    0x7D, 0x4A, 0x4B, 0x4C, 0x4D, 0x4E, 0x4F, 0x50, 0x51, 0x52, 0xB9, 0xFB, 0xFC, 0xF9, 0xFA, 0xFF,
    0x5C, 0xF7, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5A, 0xB2, 0xD4, 0xD6, 0xD2, 0xD3, 0xD5,
    0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0xB3, 0xDB, 0xDC, 0xD9, 0xDA, 0x9F,
];

const LATIN1_TO_CP037: [u8; 256] = invert(&CP037_TO_LATIN1);

const fn invert(table: &[u8; 256]) -> [u8; 256] {
    let mut inverse = [0u8; 256];
    let mut byte = 0;
    while byte < 256 {
        inverse[table[byte] as usize] = byte as u8;
        byte += 1;
    }
    inverse
}

/// Text encoding of record data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Ascii,
    Ebcdic,
}

impl Encoding {
    /// Parses an encoding name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "ascii" => Some(Encoding::Ascii),
            "ebcdic" | "cp037" => Some(Encoding::Ebcdic),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Ascii => "ascii",
            Encoding::Ebcdic => "ebcdic",
        }
    }

    /// The blank byte used for padding.
    pub fn space(&self) -> u8 {
        match self {
            Encoding::Ascii => b' ',
            Encoding::Ebcdic => 0x40,
        }
    }

    /// Zone nibble of an unsigned zoned digit.
    pub fn digit_zone(&self) -> u8 {
        match self {
            Encoding::Ascii => 0x3,
            Encoding::Ebcdic => 0xF,
        }
    }

    /// Zone written into the last byte of a non-negative zoned value.
    pub fn positive_zone(&self) -> u8 {
        match self {
            Encoding::Ascii => 0x3,
            Encoding::Ebcdic => 0xC,
        }
    }

    /// Zone written into the last byte of a negative zoned value.
    pub fn negative_zone(&self) -> u8 {
        match self {
            Encoding::Ascii => 0x7,
            Encoding::Ebcdic => 0xD,
        }
    }

    /// Whether a sign zone read from data means negative.
    pub fn is_negative_zone(&self, zone: u8) -> bool {
        match zone {
            0xD | 0xB => true,
            0x7 => *self == Encoding::Ascii,
            _ => false,
        }
    }

    /// Encodes one character; unmapped characters become the substitute.
    pub fn encode_char(&self, c: char) -> u8 {
        match self {
            Encoding::Ascii => u8::try_from(u32::from(c)).unwrap_or(b'?'),
            Encoding::Ebcdic => ebcdic_byte(c).unwrap_or(EBCDIC_SUBSTITUTE),
        }
    }

    /// Decodes one byte; bytes above 0x7F read as Latin-1 in ASCII mode.
    pub fn decode_byte(&self, byte: u8) -> char {
        match self {
            Encoding::Ascii => char::from(byte),
            Encoding::Ebcdic => ebcdic_char(byte),
        }
    }

    pub fn encode_str(&self, text: &str) -> Vec<u8> {
        text.chars().map(|c| self.encode_char(c)).collect()
    }

    pub fn decode(&self, bytes: &[u8]) -> String {
        bytes.iter().map(|&b| self.decode_byte(b)).collect()
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn ebcdic_char(byte: u8) -> char {
    char::from(CP037_TO_LATIN1[usize::from(byte)])
}

fn ebcdic_byte(c: char) -> Option<u8> {
    u8::try_from(u32::from(c))
        .ok()
        .map(|latin1| LATIN1_TO_CP037[usize::from(latin1)])
}

/// Sort weights for character keys.
///
/// Weights are 16 bits wide: the translated byte in the high half and the
/// original byte in the low half, so distinct bytes never share a weight.
#[derive(Clone, PartialEq, Eq)]
pub struct Collation {
    weights: [u16; 256],
    native: bool,
}

impl Collation {
    /// Raw byte order.
    pub fn native() -> Self {
        let mut weights = [0u16; 256];
        for (byte, weight) in weights.iter_mut().enumerate() {
            *weight = (byte as u16) << 8;
        }
        Self {
            weights,
            native: true,
        }
    }

    /// Collation for data in `encoding` ordered as `sort_encoding` would be.
    pub fn new(encoding: Encoding, sort_encoding: Option<Encoding>) -> Self {
        let target = match sort_encoding {
            Some(target) if target != encoding => target,
            _ => return Self::native(),
        };
        let mut weights = [0u16; 256];
        for (byte, weight) in weights.iter_mut().enumerate() {
            let translated = target.encode_char(encoding.decode_byte(byte as u8));
            *weight = (u16::from(translated) << 8) | byte as u16;
        }
        Self {
            weights,
            native: false,
        }
    }

    pub fn is_native(&self) -> bool {
        self.native
    }

    pub fn weight(&self, byte: u8) -> u16 {
        self.weights[byte as usize]
    }

    /// Compares two byte strings weight by weight, shorter prefix first.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        if self.native {
            return a.cmp(b);
        }
        a.iter()
            .map(|&x| self.weight(x))
            .cmp(b.iter().map(|&y| self.weight(y)))
    }
}

impl Default for Collation {
    fn default() -> Self {
        Self::native()
    }
}

impl fmt::Debug for Collation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collation")
            .field("native", &self.native)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ebcdic_letters_and_digits() {
        let bytes = Encoding::Ebcdic.encode_str("Az9 a");
        assert_eq!(bytes, vec![0xC1, 0xA9, 0xF9, 0x40, 0x81]);
        assert_eq!(Encoding::Ebcdic.decode(&bytes), "Az9 a");
    }

    #[test]
    fn test_ebcdic_punctuation() {
        let text = "$*(),.-/:'=";
        let bytes = Encoding::Ebcdic.encode_str(text);
        assert_eq!(bytes[0], 0x5B);
        assert_eq!(Encoding::Ebcdic.decode(&bytes), text);
    }

    #[test]
    fn test_full_code_page() {
        for byte in 0..=255u8 {
            let c = Encoding::Ebcdic.decode_byte(byte);
            assert_eq!(Encoding::Ebcdic.encode_char(c), byte);
        }
        assert_eq!(Encoding::Ebcdic.decode_byte(0x00), '\0');
        assert_eq!(Encoding::Ebcdic.decode_byte(0x25), '\n');
        assert_eq!(Encoding::Ebcdic.decode_byte(0x4A), '¢');
        assert_eq!(Encoding::Ebcdic.decode_byte(0x51), 'é');
        assert_eq!(Encoding::Ebcdic.decode_byte(0x9F), '¤');
        assert_eq!(Encoding::Ebcdic.encode_char('Ñ'), 0x69);
        assert_eq!(Encoding::Ebcdic.encode_str("{}[]"), vec![0xC0, 0xD0, 0xBA, 0xBB]);
    }

    #[test]
    fn test_unmapped_characters() {
        assert_eq!(Encoding::Ebcdic.encode_char('€'), 0x3F);
        assert_eq!(Encoding::Ascii.encode_char('€'), b'?');
    }

    #[test]
    fn test_zones() {
        assert_eq!(Encoding::Ascii.space(), 0x20);
        assert_eq!(Encoding::Ebcdic.space(), 0x40);
        assert!(Encoding::Ascii.is_negative_zone(0x7));
        assert!(!Encoding::Ebcdic.is_negative_zone(0x7));
        assert!(Encoding::Ebcdic.is_negative_zone(0xB));
        assert!(!Encoding::Ebcdic.is_negative_zone(0xC));
    }

    #[test]
    fn test_native_collation_is_byte_order() {
        let c = Collation::new(Encoding::Ascii, None);
        assert!(c.is_native());
        assert_eq!(c.compare(b"abc", b"abd"), Ordering::Less);
        assert_eq!(c.compare(b"ab", b"abc"), Ordering::Less);
        assert!(Collation::new(Encoding::Ebcdic, Some(Encoding::Ebcdic)).is_native());
    }

    #[test]
    fn test_ascii_data_in_ebcdic_order() {
        // EBCDIC puts lowercase before uppercase and letters before digits.
        let c = Collation::new(Encoding::Ascii, Some(Encoding::Ebcdic));
        assert_eq!(c.compare(b"abc", b"ABC"), Ordering::Less);
        assert_eq!(c.compare(b"ZZZ", b"111"), Ordering::Less);
        assert_eq!(c.compare(b"abc", b"abc"), Ordering::Equal);
    }

    #[test]
    fn test_ebcdic_data_in_ascii_order() {
        let c = Collation::new(Encoding::Ebcdic, Some(Encoding::Ascii));
        let digits = Encoding::Ebcdic.encode_str("123");
        let upper = Encoding::Ebcdic.encode_str("ABC");
        assert_eq!(c.compare(&digits, &upper), Ordering::Less);
    }

    #[test]
    fn test_encoding_names() {
        assert_eq!(Encoding::from_name("EBCDIC"), Some(Encoding::Ebcdic));
        assert_eq!(Encoding::from_name("cp037"), Some(Encoding::Ebcdic));
        assert_eq!(Encoding::from_name("latin1"), None);
        assert_eq!(Encoding::Ascii.to_string(), "ascii");
    }
}
