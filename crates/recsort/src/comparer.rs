//! Sort keys and the composite record comparer.

use std::cmp::Ordering;

use crate::accessor::{FieldAccessor, FieldFormat};
use crate::config::SortConfig;
use crate::encoding::Collation;
use crate::error::{Result, SortError};
use crate::lexer::{default_format, Lexer, Token};

/// Sort order for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

impl Direction {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "A" => Some(Direction::Ascending),
            "D" => Some(Direction::Descending),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Direction::Ascending => "A",
            Direction::Descending => "D",
        }
    }

    pub fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    }
}

/// One sort key: a field and its direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: FieldAccessor,
    pub direction: Direction,
}

impl SortKey {
    pub fn new(field: FieldAccessor, direction: Direction) -> Self {
        Self { field, direction }
    }

    /// Compares the key in two records, before applying the direction.
    ///
    /// Undecodable or missing fields sort low; the engine rejects such
    /// records before they are compared.
    fn compare_ascending(&self, a: &[u8], b: &[u8], collation: &Collation) -> Ordering {
        if self.field.format().is_text() {
            match (self.field.bytes(a).ok(), self.field.bytes(b).ok()) {
                (Some(x), Some(y)) => collation.compare(x, y),
                (x, y) => x.cmp(&y),
            }
        } else {
            self.field.decimal(a).ok().cmp(&self.field.decimal(b).ok())
        }
    }
}

/// Ordered list of sort keys, compared left to right.
#[derive(Debug, Clone)]
pub struct Comparer {
    keys: Vec<SortKey>,
    collation: Collation,
}

impl Comparer {
    pub fn new(keys: Vec<SortKey>, collation: Collation) -> Self {
        Self { keys, collation }
    }

    /// Comparer over a single key.
    pub fn single(key: SortKey, collation: Collation) -> Self {
        Self::new(vec![key], collation)
    }

    /// Parses a `FIELDS=` operand. `FIELDS=COPY` yields `None`.
    ///
    /// ```text
    /// [FORMAT=f,] [FIELDS=] ["("] field ("," field)* [")"] [,FORMAT=f]
    /// field = start length [format] [A|D]
    /// ```
    pub fn parse(text: &str, config: &SortConfig) -> Result<Option<Self>> {
        let default = default_format(text)?;
        let mut lexer = Lexer::new(text)?;
        lexer.skip_format()?;
        if lexer.eat_word("FIELDS=COPY")? || lexer.eat_word("COPY")? {
            lexer.skip_format()?;
            return expect_end(&lexer).map(|_| None);
        }
        lexer.eat_prefix("FIELDS=")?;
        if lexer.eat_word("COPY")? {
            return expect_end(&lexer).map(|_| None);
        }

        let parenthesized = lexer.eat(&Token::LParen)?;
        let mut keys = Vec::new();
        loop {
            let at_stop = lexer.at_end()
                || lexer.is(&Token::RParen)
                || lexer.word().is_some_and(|w| w.starts_with("FORMAT="));
            if at_stop {
                break;
            }
            keys.push(parse_key(&mut lexer, default, config)?);
        }
        if keys.is_empty() {
            return Err(lexer.error("expected at least one sort field"));
        }
        if parenthesized {
            lexer.expect(&Token::RParen)?;
        }
        lexer.skip_format()?;
        expect_end(&lexer)?;

        Ok(Some(Self::new(keys, config.collation())))
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn collation(&self) -> &Collation {
        &self.collation
    }

    /// Compares two records key by key, stopping at the first difference.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        for key in &self.keys {
            let ordering = key
                .direction
                .apply(key.compare_ascending(a, b, &self.collation));
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Checks that every key exists in `record` and decodes.
    pub fn validate(&self, record: &[u8]) -> Result<()> {
        self.keys.iter().try_for_each(|key| key.field.validate(record))
    }
}

fn expect_end(lexer: &Lexer<'_>) -> Result<()> {
    if lexer.at_end() {
        Ok(())
    } else {
        Err(lexer.error("unexpected trailing input"))
    }
}

fn parse_key(
    lexer: &mut Lexer<'_>,
    default: Option<FieldFormat>,
    config: &SortConfig,
) -> Result<SortKey> {
    let index = lexer.index();
    let position = lexer.expect_number()?;
    let length = lexer.expect_number()?;

    let mut format = default;
    if let Some(word) = lexer.word() {
        if Direction::from_code(word).is_none() && word.parse::<usize>().is_err() {
            let code_index = lexer.index();
            let code = word.to_string();
            format = Some(
                FieldFormat::from_code(&code)
                    .ok_or_else(|| SortError::unrecognized_format(&code, code_index, lexer.source()))?,
            );
            lexer.advance()?;
        }
    }
    let format =
        format.ok_or_else(|| lexer.error_at("field has no format and no FORMAT= default", index))?;

    let direction = match lexer.word().and_then(Direction::from_code) {
        Some(direction) => {
            lexer.advance()?;
            direction
        }
        None => Direction::Ascending,
    };

    let field = FieldAccessor::new(position, length, format, config.encoding)
        .map_err(|e| lexer.error_at(field_detail(e), index))?;
    Ok(SortKey::new(field, direction))
}

/// Message of a field construction error, for re-raising as a parse error.
pub(crate) fn field_detail(error: SortError) -> String {
    match error {
        SortError::Config { detail } => detail,
        other => other.to_string(),
    }
}
