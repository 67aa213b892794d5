//! SUM statement: aggregation of records with equal keys.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use tracing::warn;

use crate::accessor::{FieldAccessor, FieldFormat};
use crate::comparer::{field_detail, Comparer};
use crate::config::SortConfig;
use crate::error::{Result, SortError};
use crate::lexer::{default_format, Lexer, Token};

/// What SUM does with records whose keys compare equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SumSpec {
    /// `FIELDS=NONE`: keep the first record of each key.
    SkipDuplicates,
    /// Add these numeric fields into the first record of each key.
    Fields(Vec<FieldAccessor>),
}

impl SumSpec {
    /// Parses a SUM operand.
    ///
    /// ```text
    /// [FORMAT=f,] FIELDS=("(" field ("," field)* ")" | NONE) [,FORMAT=f]
    /// field = start length [format]
    /// ```
    pub fn parse(text: &str, config: &SortConfig) -> Result<Self> {
        let default = default_format(text)?;
        let mut lexer = Lexer::new(text)?;
        lexer.skip_format()?;

        let spec = if lexer.eat_word("FIELDS=NONE")? || lexer.eat_word("NONE")? {
            SumSpec::SkipDuplicates
        } else {
            lexer.eat_prefix("FIELDS=")?;
            let parenthesized = lexer.eat(&Token::LParen)?;
            let spec = if lexer.eat_word("NONE")? {
                SumSpec::SkipDuplicates
            } else {
                let mut fields = Vec::new();
                while !(lexer.at_end()
                    || lexer.is(&Token::RParen)
                    || lexer.word().is_some_and(|w| w.starts_with("FORMAT=")))
                {
                    fields.push(parse_field(&mut lexer, default, config)?);
                }
                if fields.is_empty() {
                    return Err(lexer.error("expected NONE or at least one field"));
                }
                SumSpec::Fields(fields)
            };
            if parenthesized {
                lexer.expect(&Token::RParen)?;
            }
            spec
        };

        lexer.skip_format()?;
        if !lexer.at_end() {
            return Err(lexer.error("unexpected trailing input"));
        }
        Ok(spec)
    }

    /// Checks that every summed field exists in `record` and decodes.
    pub fn validate(&self, record: &[u8]) -> Result<()> {
        match self {
            SumSpec::SkipDuplicates => Ok(()),
            SumSpec::Fields(fields) => fields.iter().try_for_each(|f| f.validate(record)),
        }
    }
}

fn parse_field(
    lexer: &mut Lexer<'_>,
    default: Option<FieldFormat>,
    config: &SortConfig,
) -> Result<FieldAccessor> {
    let index = lexer.index();
    let position = lexer.expect_number()?;
    let length = lexer.expect_number()?;

    let mut format = default;
    if let Some(code) = lexer
        .word()
        .filter(|w| w.parse::<usize>().is_err())
        .map(str::to_string)
    {
        let code_index = lexer.index();
        format = Some(FieldFormat::from_code(&code).ok_or_else(|| {
            SortError::unrecognized_format(&code, code_index, lexer.source())
        })?);
        lexer.advance()?;
    }
    let format =
        format.ok_or_else(|| lexer.error_at("field has no format and no FORMAT= default", index))?;
    if format.is_text() {
        return Err(lexer.error_at(format!("SUM fields must be numeric, got {format}"), index));
    }
    FieldAccessor::new(position, length, format, config.encoding)
        .map_err(|e| lexer.error_at(field_detail(e), index))
}

/// Streams sorted records and emits one record per run of equal keys.
pub struct SumAggregator<'a> {
    spec: &'a SumSpec,
    comparer: &'a Comparer,
    pending: Option<Vec<u8>>,
    summed: u64,
    overflows: u64,
}

impl<'a> SumAggregator<'a> {
    pub fn new(spec: &'a SumSpec, comparer: &'a Comparer) -> Self {
        Self {
            spec,
            comparer,
            pending: None,
            summed: 0,
            overflows: 0,
        }
    }

    /// Feeds the next record; returns a finished record when a key ends.
    pub fn push(&mut self, record: Vec<u8>) -> Result<Option<Vec<u8>>> {
        let Some(pending) = self.pending.take() else {
            self.pending = Some(record);
            return Ok(None);
        };

        if self.comparer.compare(&pending, &record) != Ordering::Equal {
            self.pending = Some(record);
            return Ok(Some(pending));
        }

        match self.spec {
            SumSpec::SkipDuplicates => {
                self.summed += 1;
                self.pending = Some(pending);
                Ok(None)
            }
            SumSpec::Fields(fields) => match add_fields(fields, &pending, &record)? {
                Some(total) => {
                    self.summed += 1;
                    self.pending = Some(total);
                    Ok(None)
                }
                None => {
                    self.overflows += 1;
                    warn!("SUM overflow; record written without summing");
                    self.pending = Some(record);
                    Ok(Some(pending))
                }
            },
        }
    }

    /// Emits the last pending record.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        self.pending.take()
    }

    /// Records folded into an earlier one.
    pub fn summed(&self) -> u64 {
        self.summed
    }

    /// Sums abandoned because a total did not fit its field.
    pub fn overflows(&self) -> u64 {
        self.overflows
    }
}

/// Adds `record`'s fields into a copy of `pending`; `None` on overflow.
fn add_fields(
    fields: &[FieldAccessor],
    pending: &[u8],
    record: &[u8],
) -> Result<Option<Vec<u8>>> {
    let mut total = pending.to_vec();
    for field in fields {
        let a: Decimal = field.decimal(pending)?;
        let b = field.decimal(record)?;
        let Some(sum) = a.checked_add(b) else {
            return Ok(None);
        };
        match field.store(&mut total, sum) {
            Ok(()) => {}
            Err(SortError::Overflow { .. }) => return Ok(None),
            Err(e) => return Err(e),
        }
    }
    Ok(Some(total))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comparer(text: &str) -> Comparer {
        Comparer::parse(text, &SortConfig::default())
            .unwrap()
            .unwrap()
    }

    fn run(spec: &SumSpec, comparer: &Comparer, records: &[&[u8]]) -> (Vec<Vec<u8>>, u64) {
        let mut agg = SumAggregator::new(spec, comparer);
        let mut out = Vec::new();
        for r in records {
            if let Some(done) = agg.push(r.to_vec()).unwrap() {
                out.push(done);
            }
        }
        out.extend(agg.finish());
        (out, agg.summed())
    }

    #[test]
    fn test_parse_none() {
        let config = SortConfig::default();
        assert_eq!(
            SumSpec::parse("FIELDS=NONE", &config).unwrap(),
            SumSpec::SkipDuplicates
        );
        assert_eq!(SumSpec::parse("NONE", &config).unwrap(), SumSpec::SkipDuplicates);
        assert_eq!(
            SumSpec::parse("FIELDS=(NONE)", &config).unwrap(),
            SumSpec::SkipDuplicates
        );
    }

    #[test]
    fn test_parse_fields() {
        let config = SortConfig::default();
        match SumSpec::parse("FIELDS=(5,3,ZD,9,2,PD)", &config).unwrap() {
            SumSpec::Fields(fields) => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].format(), FieldFormat::Zd);
                assert_eq!(fields[1].position(), 9);
            }
            other => panic!("unexpected spec: {other:?}"),
        }
        match SumSpec::parse("FORMAT=BI,FIELDS=(1,4)", &config).unwrap() {
            SumSpec::Fields(fields) => assert_eq!(fields[0].format(), FieldFormat::Bi),
            other => panic!("unexpected spec: {other:?}"),
        }
        match SumSpec::parse("FIELDS=5,3,ZD", &config).unwrap() {
            SumSpec::Fields(fields) => assert_eq!(fields[0].position(), 5),
            other => panic!("unexpected spec: {other:?}"),
        }
    }

    #[test]
    fn test_parse_errors() {
        let config = SortConfig::default();
        assert!(SumSpec::parse("FIELDS=(1,3,CH)", &config).is_err());
        assert!(SumSpec::parse("FIELDS=(1,3)", &config).is_err());
        assert!(matches!(
            SumSpec::parse("FIELDS=(1,3,XY)", &config),
            Err(SortError::UnrecognizedFormat { .. })
        ));
        assert!(SumSpec::parse("FIELDS=()", &config).is_err());
    }

    #[test]
    fn test_sum_zoned_fields() {
        let spec = SumSpec::parse("FIELDS=(4,3,ZD)", &SortConfig::default()).unwrap();
        let cmp = comparer("FIELDS=(1,3,CH,A)");
        let (out, summed) = run(&spec, &cmp, &[b"AAA010", b"AAA020", b"BBB005", b"BBB001"]);
        assert_eq!(out, vec![b"AAA030".to_vec(), b"BBB006".to_vec()]);
        assert_eq!(summed, 2);
    }

    #[test]
    fn test_skip_duplicates_keeps_first() {
        let spec = SumSpec::SkipDuplicates;
        let cmp = comparer("FIELDS=(1,1,CH,A)");
        let (out, summed) = run(&spec, &cmp, &[b"A1", b"A2", b"B3", b"C4", b"C5"]);
        assert_eq!(out, vec![b"A1".to_vec(), b"B3".to_vec(), b"C4".to_vec()]);
        assert_eq!(summed, 2);
    }

    #[test]
    fn test_overflow_leaves_records_unsummed() {
        let spec = SumSpec::parse("FIELDS=(2,2,ZD)", &SortConfig::default()).unwrap();
        let cmp = comparer("FIELDS=(1,1,CH,A)");
        let mut agg = SumAggregator::new(&spec, &cmp);
        assert_eq!(agg.push(b"A60".to_vec()).unwrap(), None);
        // 60 + 50 does not fit two digits.
        assert_eq!(agg.push(b"A50".to_vec()).unwrap(), Some(b"A60".to_vec()));
        assert_eq!(agg.push(b"A10".to_vec()).unwrap(), None);
        assert_eq!(agg.finish(), Some(b"A60".to_vec()));
        assert_eq!(agg.overflows(), 1);
        assert_eq!(agg.summed(), 1);
    }

    #[test]
    fn test_validate() {
        let spec = SumSpec::parse("FIELDS=(2,2,PD)", &SortConfig::default()).unwrap();
        assert!(spec.validate(&[0x00, 0x01, 0x2C]).is_ok());
        assert!(spec.validate(&[0x00, 0x01, 0x23]).is_err());
        assert!(spec.validate(&[0x00]).is_err());
        assert!(SumSpec::SkipDuplicates.validate(b"").is_ok());
    }
}
