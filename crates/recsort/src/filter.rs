//! INCLUDE/OMIT record filtering.
//!
//! Conditions compare two accessors:
//!
//! ```text
//! cond := "(" cond ")" [AND|OR cond]
//!       | accessor op accessor [AND|OR cond]
//! ```
//!
//! Chains nest to the right, so `A OR B AND C` reads as `A OR (B AND C)`.

use std::cmp::Ordering;

use crate::accessor::{parse_decimal, Accessor, FieldFormat};
use crate::comparer::field_detail;
use crate::config::SortConfig;
use crate::encoding::Encoding;
use crate::error::{Result, SortError};
use crate::formatter::is_outfil_keyword;
use crate::lexer::{default_format, Lexer, Token};

/// Comparison operators for conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "EQ" => Some(CompareOp::Eq),
            "NE" => Some(CompareOp::Ne),
            "GT" => Some(CompareOp::Gt),
            "GE" => Some(CompareOp::Ge),
            "LT" => Some(CompareOp::Lt),
            "LE" => Some(CompareOp::Le),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CompareOp::Eq => "EQ",
            CompareOp::Ne => "NE",
            CompareOp::Gt => "GT",
            CompareOp::Ge => "GE",
            CompareOp::Lt => "LT",
            CompareOp::Le => "LE",
        }
    }

    pub fn test(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
        }
    }
}

/// How the two sides of a condition are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareClass {
    /// Byte-wise, the shorter side padded with blanks.
    Text,
    /// By decoded value.
    Numeric,
}

impl CompareClass {
    /// Text if either side is a `CH`/`SS` field, or both sides are
    /// constants and one is a quoted or hex literal.
    pub fn of(left: &Accessor, right: &Accessor) -> Self {
        let text_field = left.is_text_field() || right.is_text_field();
        let literal_constants = left.is_constant()
            && right.is_constant()
            && (left.is_literal() || right.is_literal());
        if text_field || literal_constants {
            CompareClass::Text
        } else {
            CompareClass::Numeric
        }
    }
}

/// One `accessor op accessor` test.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub left: Accessor,
    pub op: CompareOp,
    pub right: Accessor,
    pub class: CompareClass,
    pub encoding: Encoding,
}

impl Condition {
    pub fn new(left: Accessor, op: CompareOp, right: Accessor, encoding: Encoding) -> Self {
        let class = CompareClass::of(&left, &right);
        Self {
            left,
            op,
            right,
            class,
            encoding,
        }
    }

    pub fn evaluate(&self, record: &[u8]) -> Result<bool> {
        match self.class {
            CompareClass::Numeric => {
                let a = self.left.decimal(record, self.encoding)?;
                let b = self.right.decimal(record, self.encoding)?;
                Ok(self.op.test(a.cmp(&b)))
            }
            CompareClass::Text => {
                let a = self.left.text(record, self.encoding)?;
                let b = self.right.text(record, self.encoding)?;
                if matches!(self.op, CompareOp::Eq | CompareOp::Ne) {
                    if let Some(found) = self.substring_match(&a, &b) {
                        return Ok(found == (self.op == CompareOp::Eq));
                    }
                }
                let ordering = padded_compare(&a, &b, self.encoding.space());
                Ok(self.op.test(ordering))
            }
        }
    }

    /// `SS` fields test whether the other side occurs anywhere in them.
    fn substring_match(&self, a: &[u8], b: &[u8]) -> Option<bool> {
        let is_ss = |acc: &Accessor| {
            acc.as_field()
                .is_some_and(|f| f.format() == FieldFormat::Ss)
        };
        let (haystack, needle) = if is_ss(&self.left) && !is_ss(&self.right) {
            (a, b)
        } else if is_ss(&self.right) && !is_ss(&self.left) {
            (b, a)
        } else {
            return None;
        };
        Some(contains(haystack, needle))
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

fn padded_compare(a: &[u8], b: &[u8], pad: u8) -> Ordering {
    let len = a.len().max(b.len());
    let byte = |s: &[u8], i: usize| s.get(i).copied().unwrap_or(pad);
    (0..len)
        .map(|i| byte(a, i).cmp(&byte(b, i)))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Boolean tree of conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare(Condition),
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    /// Parses a condition operand: `[FORMAT=f,] [COND=] cond [,FORMAT=f]`.
    pub fn parse(text: &str, config: &SortConfig) -> Result<Self> {
        let default = default_format(text)?;
        let mut lexer = Lexer::new(text)?;
        lexer.skip_format()?;
        lexer.eat_prefix("COND=")?;
        let filter = parse_condition(&mut lexer, default, config)?;
        lexer.skip_format()?;
        if !lexer.at_end() {
            return Err(lexer.error("unexpected trailing input"));
        }
        Ok(filter)
    }

    /// Combines INCLUDE and OMIT operands into one filter.
    pub fn from_cards(
        include: Option<&str>,
        omit: Option<&str>,
        config: &SortConfig,
    ) -> Result<Option<Self>> {
        let include = include.map(|t| Filter::parse(t, config)).transpose()?;
        let omit = omit
            .map(|t| Filter::parse(t, config))
            .transpose()?
            .map(Filter::negate);
        Ok(match (include, omit) {
            (Some(inc), Some(om)) => Some(Filter::And(Box::new(inc), Box::new(om))),
            (inc, om) => inc.or(om),
        })
    }

    pub fn negate(self) -> Self {
        Filter::Not(Box::new(self))
    }

    /// True when the record passes.
    pub fn evaluate(&self, record: &[u8]) -> Result<bool> {
        match self {
            Filter::Compare(condition) => condition.evaluate(record),
            Filter::And(a, b) => Ok(a.evaluate(record)? && b.evaluate(record)?),
            Filter::Or(a, b) => Ok(a.evaluate(record)? || b.evaluate(record)?),
            Filter::Not(inner) => Ok(!inner.evaluate(record)?),
        }
    }
}

/// Parses `cond`, leaving the lexer on the first token after it.
pub(crate) fn parse_condition(
    lexer: &mut Lexer<'_>,
    default: Option<FieldFormat>,
    config: &SortConfig,
) -> Result<Filter> {
    let left = if lexer.eat(&Token::LParen)? {
        let inner = parse_condition(lexer, default, config)?;
        lexer.expect(&Token::RParen)?;
        inner
    } else {
        parse_comparison(lexer, default, config)?
    };

    if lexer.eat_word("AND")? || lexer.eat_word("&")? {
        let right = parse_condition(lexer, default, config)?;
        Ok(Filter::And(Box::new(left), Box::new(right)))
    } else if lexer.eat_word("OR")? || lexer.eat_word("|")? {
        let right = parse_condition(lexer, default, config)?;
        Ok(Filter::Or(Box::new(left), Box::new(right)))
    } else {
        Ok(left)
    }
}

fn parse_comparison(
    lexer: &mut Lexer<'_>,
    default: Option<FieldFormat>,
    config: &SortConfig,
) -> Result<Filter> {
    let left = parse_accessor(lexer, default, config)?;
    let op = lexer
        .word()
        .and_then(CompareOp::from_code)
        .ok_or_else(|| lexer.error("expected a comparison operator (EQ, NE, GT, GE, LT, LE)"))?;
    lexer.advance()?;
    let right = parse_accessor(lexer, default, config)?;
    Ok(Filter::Compare(Condition::new(
        left,
        op,
        right,
        config.encoding,
    )))
}

fn ends_accessor(lexer: &Lexer<'_>) -> bool {
    match lexer.current() {
        None | Some(Token::LParen | Token::RParen | Token::Semicolon) => true,
        Some(Token::Literal(_)) => false,
        Some(Token::Word(w)) => {
            matches!(w.as_str(), "AND" | "OR" | "&" | "|")
                || CompareOp::from_code(w).is_some()
                || w.starts_with("FORMAT=")
                || is_outfil_keyword(w)
        }
    }
}

fn parse_accessor(
    lexer: &mut Lexer<'_>,
    default: Option<FieldFormat>,
    config: &SortConfig,
) -> Result<Accessor> {
    let index = lexer.index();
    let mut tokens = Vec::new();
    while !ends_accessor(lexer) {
        if let Some(token) = lexer.current() {
            tokens.push((lexer.index(), token.clone()));
        }
        lexer.advance()?;
    }

    let word = |i: usize| match tokens.get(i) {
        Some((_, Token::Word(w))) => Some(w.as_str()),
        _ => None,
    };

    match tokens.as_slice() {
        [] => Err(lexer.error_at("expected a field or constant", index)),
        [(at, Token::Word(w))] => parse_decimal(w)
            .map(Accessor::Decimal)
            .ok_or_else(|| lexer.error_at(format!("'{w}' is not a decimal constant"), *at)),
        [(_, Token::Word(kind)), (_, Token::Literal(text))] if kind == "C" => {
            Ok(Accessor::Text(config.encoding.encode_str(text)))
        }
        [(_, Token::Word(kind)), (at, Token::Literal(text))] if kind == "X" => {
            parse_hex(text).map(Accessor::hex).ok_or_else(|| {
                lexer.error_at("hex constant needs an even number of hex digits", *at)
            })
        }
        [_, _] | [_, _, _] => {
            let number = |i: usize| word(i).and_then(|w| w.parse::<usize>().ok());
            let (Some(position), Some(length)) = (number(0), number(1)) else {
                return Err(lexer.error_at("expected start,length[,format]", index));
            };
            let format = match tokens.get(2) {
                Some((at, Token::Word(code))) => FieldFormat::from_code(code)
                    .ok_or_else(|| SortError::unrecognized_format(code, *at, lexer.source()))?,
                Some((at, _)) => return Err(lexer.error_at("expected a field format", *at)),
                None => default.ok_or_else(|| {
                    lexer.error_at("field has no format and no FORMAT= default", index)
                })?,
            };
            Accessor::field(position, length, format, config.encoding)
                .map_err(|e| lexer.error_at(field_detail(e), index))
        }
        [.., (at, _)] => Err(lexer.error_at("too many tokens in field reference", *at)),
    }
}

/// Decodes the body of an `X'...'` literal.
pub(crate) fn parse_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| text.get(i..i + 2).and_then(|h| u8::from_str_radix(h, 16).ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(text: &str) -> Filter {
        Filter::parse(text, &SortConfig::default()).unwrap()
    }

    fn passes(text: &str, record: &[u8]) -> bool {
        filter(text).evaluate(record).unwrap()
    }

    #[test]
    fn test_compare_op_codes() {
        assert_eq!(CompareOp::from_code("EQ"), Some(CompareOp::Eq));
        assert_eq!(CompareOp::from_code("LE"), Some(CompareOp::Le));
        assert_eq!(CompareOp::from_code("eq"), None);
        assert_eq!(CompareOp::Ge.code(), "GE");
    }

    #[test]
    fn test_character_condition() {
        assert!(passes("COND=(1,3,CH,EQ,C'ABC')", b"ABCDEF"));
        assert!(!passes("COND=(1,3,CH,EQ,C'XYZ')", b"ABCDEF"));
        assert!(passes("(4,3,CH,GT,C'ABC')", b"ABCDEF"));
    }

    #[test]
    fn test_text_padding() {
        // The shorter side is padded with blanks.
        assert!(passes("COND=(1,5,CH,EQ,C'AB')", b"AB   "));
        assert!(!passes("COND=(1,5,CH,EQ,C'AB')", b"AB  X"));
    }

    #[test]
    fn test_numeric_condition() {
        assert!(passes("COND=(1,3,ZD,GT,50)", b"100"));
        assert!(!passes("COND=(1,3,ZD,GT,500)", b"100"));
        assert!(passes("COND=(1,3,ZD,LT,-1)", b"01q"));
        assert!(passes("COND=(1,2,BI,EQ,X'0102')", &[0x01, 0x02]));
    }

    #[test]
    fn test_field_to_field() {
        assert!(passes("COND=(1,2,ZD,EQ,3,2,ZD)", b"0707"));
        assert!(passes("COND=(1,2,CH,LT,3,2,CH)", b"AABB"));
    }

    #[test]
    fn test_default_format() {
        assert!(passes("FORMAT=ZD,COND=(1,3,GE,100)", b"100"));
        assert!(passes("COND=(1,3,GE,100),FORMAT=ZD", b"100"));
        assert!(Filter::parse("COND=(1,3,GE,100)", &SortConfig::default()).is_err());
    }

    #[test]
    fn test_substring_search() {
        assert!(passes("COND=(1,10,SS,EQ,C'CAT')", b"THE CAT SAT"));
        assert!(!passes("COND=(1,10,SS,EQ,C'DOG')", b"THE CAT SAT"));
        assert!(passes("COND=(1,10,SS,NE,C'DOG')", b"THE CAT SAT"));
    }

    #[test]
    fn test_right_nesting() {
        // A OR B AND C reads as A OR (B AND C).
        let f = filter("COND=(1,1,CH,EQ,C'A',OR,2,1,CH,EQ,C'B',AND,3,1,CH,EQ,C'C')");
        match &f {
            Filter::Or(_, right) => assert!(matches!(**right, Filter::And(_, _))),
            other => panic!("unexpected tree: {other:?}"),
        }
        assert!(f.evaluate(b"AXX").unwrap());
        assert!(f.evaluate(b"XBC").unwrap());
        assert!(!f.evaluate(b"XBX").unwrap());
    }

    #[test]
    fn test_grouping() {
        let f = filter("COND=((1,1,CH,EQ,C'A',OR,2,1,CH,EQ,C'B'),AND,3,1,CH,EQ,C'C')");
        assert!(matches!(f, Filter::And(_, _)));
        assert!(!f.evaluate(b"AXX").unwrap());
        assert!(f.evaluate(b"AXC").unwrap());
    }

    #[test]
    fn test_constant_classes() {
        // Two decimal constants compare numerically; a literal makes it text.
        assert!(passes("COND=(9,LT,10)", b""));
        assert!(!passes("COND=(C'9',LT,10)", b""));
    }

    #[test]
    fn test_include_omit_cards() {
        let config = SortConfig::default();
        let omit = Filter::from_cards(None, Some("COND=(1,1,CH,EQ,C'A')"), &config)
            .unwrap()
            .unwrap();
        assert!(matches!(omit, Filter::Not(_)));
        assert!(!omit.evaluate(b"A").unwrap());
        assert!(omit.evaluate(b"B").unwrap());

        let both = Filter::from_cards(
            Some("COND=(1,1,CH,GE,C'B')"),
            Some("COND=(1,1,CH,EQ,C'C')"),
            &config,
        )
        .unwrap()
        .unwrap();
        assert!(both.evaluate(b"B").unwrap());
        assert!(!both.evaluate(b"C").unwrap());
        assert!(!both.evaluate(b"A").unwrap());

        assert!(Filter::from_cards(None, None, &config).unwrap().is_none());
    }

    #[test]
    fn test_ebcdic_literal() {
        let config = SortConfig::default().with_encoding(Encoding::Ebcdic);
        let f = Filter::parse("COND=(1,2,CH,EQ,C'AB')", &config).unwrap();
        assert!(f.evaluate(&[0xC1, 0xC2]).unwrap());
        assert!(!f.evaluate(b"AB").unwrap());
    }

    #[test]
    fn test_unparenthesized_condition() {
        let f = filter("COND=1,1,CH,EQ,C'A'");
        assert!(f.evaluate(b"A").unwrap());
        assert!(!f.evaluate(b"B").unwrap());
    }

    #[test]
    fn test_ebcdic_numeric_literal() {
        let config = SortConfig::default().with_encoding(Encoding::Ebcdic);
        let f = Filter::parse("COND=(1,1,ZD,EQ,C'5')", &config).unwrap();
        assert!(f.evaluate(&[0xF5]).unwrap());
        assert!(!f.evaluate(&[0xF6]).unwrap());
    }

    #[test]
    fn test_short_record_is_error() {
        let f = filter("COND=(5,3,CH,EQ,C'ABC')");
        assert!(matches!(
            f.evaluate(b"ABC"),
            Err(SortError::RecordTooShort { .. })
        ));
    }

    #[test]
    fn test_parse_errors() {
        let config = SortConfig::default();
        assert!(Filter::parse("COND=(1,3,CH,XX,C'A')", &config).is_err());
        assert!(Filter::parse("COND=(1,3,CH,EQ,C'A'", &config).is_err());
        assert!(Filter::parse("COND=(1,3,CH,EQ,X'ABC')", &config).is_err());
        assert!(matches!(
            Filter::parse("COND=(1,3,QQ,EQ,C'A')", &config),
            Err(SortError::UnrecognizedFormat { .. })
        ));
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("00FFa0"), Some(vec![0x00, 0xFF, 0xA0]));
        assert_eq!(parse_hex("F"), None);
        assert_eq!(parse_hex("GG"), None);
    }
}
