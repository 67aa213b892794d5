//! INREC/OUTREC record reformatting.
//!
//! A formatter is an ordered list of sub-formatters that build the output
//! record left to right:
//!
//! - `[n]C'text'` repeats a literal `n` times
//! - `[n]X'hex'` repeats bytes; `nX` alone inserts `n` blanks
//! - `nZ` inserts `n` binary zeros
//! - `start,length` copies input bytes
//! - `start,length,fmt,EDIT=(mask)|Mn[,SIGNS=(..)][,LENGTH=n]` edits a
//!   numeric field
//!
//! Any sub-formatter may carry a `col:` prefix naming its 1-based output
//! column. Gaps are filled with blanks; earlier columns are overlaid.

use crate::accessor::{FieldAccessor, FieldFormat};
use crate::comparer::field_detail;
use crate::config::SortConfig;
use crate::encoding::Encoding;
use crate::error::Result;
use crate::filter::parse_hex;
use crate::lexer::{Lexer, Token};

pub mod edit;

pub use edit::{Edit, EditMask, SignPair};

/// What a sub-formatter writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    /// Input bytes copied verbatim.
    Copy(FieldAccessor),
    /// Constant bytes.
    Constant(Vec<u8>),
    /// A numeric field rendered through an edit mask.
    Edit { field: FieldAccessor, edit: Edit },
}

/// One output item with its optional column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubFormatter {
    /// 1-based output column; `None` continues after the previous item.
    pub column: Option<usize>,
    pub item: Item,
}

/// Compiled INREC/OUTREC/BUILD specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formatter {
    items: Vec<SubFormatter>,
    encoding: Encoding,
}

impl Formatter {
    pub fn new(items: Vec<SubFormatter>, encoding: Encoding) -> Self {
        Self { items, encoding }
    }

    /// Parses `[FIELDS=|BUILD=|OUTREC=|INREC=] ["("] item ("," item)* [")"]`.
    pub fn parse(text: &str, config: &SortConfig) -> Result<Self> {
        let mut lexer = Lexer::new(text)?;
        for prefix in ["FIELDS=", "BUILD=", "OUTREC=", "INREC="] {
            if lexer.eat_prefix(prefix)? {
                break;
            }
        }
        let formatter = parse_formatter(&mut lexer, config)?;
        if !lexer.at_end() {
            return Err(lexer.error("unexpected trailing input"));
        }
        Ok(formatter)
    }

    pub fn items(&self) -> &[SubFormatter] {
        &self.items
    }

    /// Builds the output record for `record`.
    pub fn format(&self, record: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(record.len());
        let mut cursor = 0;
        for sub in &self.items {
            if let Some(column) = sub.column {
                cursor = column - 1;
            }
            let bytes = match &sub.item {
                Item::Copy(field) => field.bytes(record)?.to_vec(),
                Item::Constant(bytes) => bytes.clone(),
                Item::Edit { field, edit } => {
                    let value = field.decimal(record)?;
                    self.encoding.encode_str(&edit.apply(value))
                }
            };
            self.write_at(&mut out, cursor, &bytes);
            cursor += bytes.len();
        }
        Ok(out)
    }

    /// Checks that every referenced field exists in `record` and decodes.
    pub fn validate(&self, record: &[u8]) -> Result<()> {
        self.items.iter().try_for_each(|sub| match &sub.item {
            Item::Copy(field) => field.bytes(record).map(|_| ()),
            Item::Constant(_) => Ok(()),
            Item::Edit { field, .. } => field.validate(record),
        })
    }

    fn write_at(&self, out: &mut Vec<u8>, at: usize, bytes: &[u8]) {
        if out.len() < at {
            out.resize(at, self.encoding.space());
        }
        let overlap = (out.len() - at).min(bytes.len());
        out[at..at + overlap].copy_from_slice(&bytes[..overlap]);
        out.extend_from_slice(&bytes[overlap..]);
    }
}

/// Parses a parenthesized or bare item list, stopping before `)` of an
/// enclosing group, a `;`, or the end of input.
pub(crate) fn parse_formatter(lexer: &mut Lexer<'_>, config: &SortConfig) -> Result<Formatter> {
    let parenthesized = lexer.eat(&Token::LParen)?;
    let mut items = Vec::new();
    while !(lexer.at_end() || lexer.is(&Token::RParen) || lexer.is(&Token::Semicolon)) {
        if !parenthesized && lexer.word().is_some_and(is_outfil_keyword) {
            break;
        }
        items.push(parse_item(lexer, config)?);
    }
    if items.is_empty() {
        return Err(lexer.error("expected at least one output item"));
    }
    if parenthesized {
        lexer.expect(&Token::RParen)?;
    }
    Ok(Formatter::new(items, config.encoding))
}

/// Words that open a new OUTFIL operand.
pub(crate) fn is_outfil_keyword(word: &str) -> bool {
    ["INCLUDE=", "OMIT=", "OUTREC=", "BUILD=", "FNAMES="]
        .iter()
        .any(|k| word.starts_with(k))
}

/// Splits a `[n]K` word into its repeat count and kind letter.
fn repeat_of(word: &str, kind: char) -> Option<Option<usize>> {
    let digits = word.strip_suffix(kind)?;
    if digits.is_empty() {
        Some(None)
    } else if digits.bytes().all(|b| b.is_ascii_digit()) {
        digits.parse().ok().map(Some)
    } else {
        None
    }
}

fn parse_item(lexer: &mut Lexer<'_>, config: &SortConfig) -> Result<SubFormatter> {
    let index = lexer.index();
    let mut word = lexer.expect_word()?;

    let mut column = None;
    if let Some((col, rest)) = word.split_once(':') {
        let col = col
            .parse::<usize>()
            .ok()
            .filter(|c| *c >= 1)
            .ok_or_else(|| lexer.error_at("output column must be a number from 1", index))?;
        column = Some(col);
        word = if rest.is_empty() {
            lexer.expect_word()?
        } else {
            rest.to_string()
        };
    }

    let literal = matches!(lexer.current(), Some(Token::Literal(_)));
    let item = if let (Some(count), true) = (repeat_of(&word, 'C'), literal) {
        let n = repeat(lexer, count, index)?;
        let text = lexer.expect_literal()?;
        Item::Constant(config.encoding.encode_str(&text).repeat(n))
    } else if let Some(count) = repeat_of(&word, 'X') {
        let n = repeat(lexer, count, index)?;
        if literal {
            let at = lexer.index();
            let text = lexer.expect_literal()?;
            let bytes = parse_hex(&text)
                .ok_or_else(|| lexer.error_at("hex constant needs an even number of hex digits", at))?;
            Item::Constant(bytes.repeat(n))
        } else {
            Item::Constant(vec![config.encoding.space(); n])
        }
    } else if let Some(count) = repeat_of(&word, 'Z') {
        Item::Constant(vec![0u8; repeat(lexer, count, index)?])
    } else if let Ok(position) = word.parse::<usize>() {
        let length = lexer.expect_number()?;
        parse_field_item(lexer, config, position, length, index)?
    } else {
        return Err(lexer.error_at(format!("unrecognized output item '{word}'"), index));
    };

    Ok(SubFormatter { column, item })
}

fn repeat(lexer: &Lexer<'_>, count: Option<usize>, index: usize) -> Result<usize> {
    match count {
        Some(0) => Err(lexer.error_at("repeat count must be at least 1", index)),
        Some(n) => Ok(n),
        None => Ok(1),
    }
}

fn parse_field_item(
    lexer: &mut Lexer<'_>,
    config: &SortConfig,
    position: usize,
    length: usize,
    index: usize,
) -> Result<Item> {
    let format = match lexer.word().and_then(FieldFormat::from_code) {
        Some(format) => {
            lexer.advance()?;
            Some(format)
        }
        None => None,
    };

    let mut mask = None;
    let mut signs = None;
    let mut out_length = None;
    loop {
        let Some(word) = lexer.word() else { break };
        if word == "EDIT=" {
            lexer.advance()?;
            mask = Some(EditMask::custom(&parse_group(lexer)?.join(",")));
        } else if word == "SIGNS=" {
            lexer.advance()?;
            signs = Some(parse_group(lexer)?);
        } else if let Some(n) = word.strip_prefix("LENGTH=") {
            let n = n
                .parse::<usize>()
                .ok()
                .filter(|n| *n >= 1)
                .ok_or_else(|| lexer.error("LENGTH= needs a positive number"))?;
            out_length = Some(n);
            lexer.advance()?;
        } else if let Some(predefined) = EditMask::predefined(word) {
            mask = Some(predefined);
            lexer.advance()?;
        } else {
            break;
        }
    }

    let Some(format) = format else {
        if mask.is_some() || signs.is_some() || out_length.is_some() {
            return Err(lexer.error_at("edit needs a numeric field format", index));
        }
        let field = FieldAccessor::new(position, length, FieldFormat::Ch, config.encoding)
            .map_err(|e| lexer.error_at(field_detail(e), index))?;
        return Ok(Item::Copy(field));
    };

    if format.is_text() {
        return Err(lexer.error_at(
            format!("edit needs a numeric field format, got {format}"),
            index,
        ));
    }
    let mut mask =
        mask.ok_or_else(|| lexer.error_at("numeric field needs EDIT=(mask) or Mn", index))?;
    if let Some(signs) = signs {
        mask = mask
            .with_signs(&signs)
            .map_err(|detail| lexer.error_at(detail, index))?;
    }
    let field = FieldAccessor::new(position, length, format, config.encoding)
        .map_err(|e| lexer.error_at(field_detail(e), index))?;
    Ok(Item::Edit {
        field,
        edit: Edit::new(mask, out_length),
    })
}

/// Reads `( value ... )`, where values are words or quoted literals.
fn parse_group(lexer: &mut Lexer<'_>) -> Result<Vec<String>> {
    lexer.expect(&Token::LParen)?;
    let mut values = Vec::new();
    loop {
        match lexer.current() {
            Some(Token::Word(w)) => values.push(w.clone()),
            Some(Token::Literal(s)) => values.push(s.clone()),
            Some(Token::RParen) => break,
            _ => return Err(lexer.error("expected ')'")),
        }
        lexer.advance()?;
    }
    lexer.advance()?;
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SortError;

    fn format(spec: &str, record: &[u8]) -> Vec<u8> {
        Formatter::parse(spec, &SortConfig::default())
            .unwrap()
            .format(record)
            .unwrap()
    }

    #[test]
    fn test_field_copy() {
        assert_eq!(format("BUILD=(1,3)", b"abcdef"), b"abc");
        assert_eq!(format("BUILD=1,3", b"abcdef"), b"abc");
        assert_eq!(format("OUTREC=2,2,C'-'", b"abcdef"), b"bc-");
        assert_eq!(format("FIELDS=4:1,1", b"abcdef"), b"   a");
        assert_eq!(format("FIELDS=(3,2,1,2)", b"abcdef"), b"cdab");
    }

    #[test]
    fn test_literal_repeat_and_column() {
        assert_eq!(format("(1,3,5C'X',9:6,2)", b"abcdefgh"), b"abcXXXXXfg");
    }

    #[test]
    fn test_column_pads_with_blanks() {
        assert_eq!(format("(1,2,6:C'Z')", b"ab"), b"ab   Z");
    }

    #[test]
    fn test_column_overlays() {
        assert_eq!(format("(1,6,2:C'XY')", b"abcdef"), b"aXYdef");
        // The cursor continues after the overlay.
        assert_eq!(format("(1,6,2:C'X',C'Y')", b"abcdef"), b"aXYdef");
    }

    #[test]
    fn test_spaces_hex_and_zeros() {
        assert_eq!(format("(1,1,3X,1,1)", b"a"), b"a   a");
        assert_eq!(format("(X'C1C2',2X'00')", b""), vec![0xC1, 0xC2, 0, 0]);
        assert_eq!(format("(2Z,C'A')", b""), vec![0, 0, b'A']);
    }

    #[test]
    fn test_escaped_quote_literal() {
        assert_eq!(format("(C'IT''S')", b""), b"IT'S");
    }

    #[test]
    fn test_edit_predefined() {
        assert_eq!(format("(1,5,ZD,M11)", b"00042"), b"000000000000042");
        assert_eq!(format("(1,3,ZD,M4,LENGTH=6)", b"01q"), b" -0.11");
    }

    #[test]
    fn test_edit_custom_mask() {
        assert_eq!(format("(1,5,ZD,EDIT=(IIT.TT))", b"12345"), b"123.45");
        assert_eq!(format("(1,7,ZD,EDIT=(I,IIT.TT))", b"0123456"), b"1,234.56");
        assert_eq!(
            format("(1,3,ZD,EDIT=(SIIT),SIGNS=(+,-))", b"12u"),
            b"-125"
        );
    }

    #[test]
    fn test_edit_packed_field() {
        assert_eq!(format("(1,2,PD,EDIT=(IIT))", &[0x12, 0x3D]), b"123");
    }

    #[test]
    fn test_copy_past_end_is_error() {
        let f = Formatter::parse("(1,10)", &SortConfig::default()).unwrap();
        assert!(matches!(
            f.format(b"short"),
            Err(SortError::RecordTooShort { .. })
        ));
    }

    #[test]
    fn test_parse_errors() {
        let config = SortConfig::default();
        // Edits need a numeric format and a mask.
        assert!(Formatter::parse("(1,3,CH,M4)", &config).is_err());
        assert!(Formatter::parse("(1,3,ZD)", &config).is_err());
        assert!(Formatter::parse("(1,3,EDIT=(IIT))", &config).is_err());
        assert!(Formatter::parse("(1,3,ZD,M4,SIGNS=(A,B,C))", &config).is_err());
        assert!(Formatter::parse("(0C'A')", &config).is_err());
        assert!(Formatter::parse("(0:1,3)", &config).is_err());
        assert!(Formatter::parse("(1,3", &config).is_err());
        assert!(Formatter::parse("(QQ)", &config).is_err());
        assert!(Formatter::parse("()", &config).is_err());
    }

    #[test]
    fn test_ebcdic_constants() {
        let config = SortConfig::default().with_encoding(Encoding::Ebcdic);
        let f = Formatter::parse("(C'A',2X,3:1,1)", &config).unwrap();
        assert_eq!(f.format(&[0xF1]).unwrap(), vec![0xC1, 0x40, 0xF1]);
    }

    #[test]
    fn test_validate() {
        let f = Formatter::parse("(1,2,C'-',3,2,ZD,M11)", &SortConfig::default()).unwrap();
        assert!(f.validate(b"ab12").is_ok());
        assert!(matches!(
            f.validate(b"ab1"),
            Err(SortError::RecordTooShort { .. })
        ));
        assert!(matches!(
            f.validate(b"ab1:"),
            Err(SortError::InvalidNumeric { .. })
        ));
    }
}
