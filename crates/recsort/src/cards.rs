//! Parser for SYSIN-style control statement decks.
//!
//! ```text
//! * Daily totals
//!  SORT FIELDS=(1,8,CH,A)
//!  INCLUDE COND=(10,1,CH,EQ,C'Y')
//!  SUM FIELDS=(12,7,ZD)
//! ```
//!
//! Each statement is a keyword followed by its operand. Lines starting with
//! `*` are comments. An indented line whose first word is not a statement
//! keyword continues the previous statement.

use tracing::warn;

use crate::comparer::Comparer;
use crate::config::SortConfig;
use crate::error::{Result, SortError};
use crate::filter::Filter;
use crate::formatter::Formatter;
use crate::outfil::{parse_outfil, OutputSpec};
use crate::sum::SumSpec;

const STATEMENT_KEYWORDS: [&str; 9] = [
    "SORT", "MERGE", "INCLUDE", "OMIT", "INREC", "OUTREC", "SUM", "OUTFIL", "OPTION",
];

/// What the engine does with the records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Order all records by the comparer.
    #[default]
    Sort,
    /// Interleave inputs that are each already in comparer order.
    Merge,
    /// Keep arrival order.
    Copy,
}

/// Compiled control statements.
#[derive(Debug, Clone, Default)]
pub struct ControlStatements {
    pub mode: Mode,
    /// SORT or MERGE keys; `None` for `FIELDS=COPY`.
    pub comparer: Option<Comparer>,
    /// INCLUDE and OMIT combined.
    pub filter: Option<Filter>,
    pub inrec: Option<Formatter>,
    pub outrec: Option<Formatter>,
    pub sum: Option<SumSpec>,
    /// OUTFIL destinations in statement order.
    pub outputs: Vec<OutputSpec>,
    /// Set by `OPTION EQUALS` or `OPTION NOEQUALS`.
    pub stable: Option<bool>,
}

/// Parses a control statement deck.
pub fn parse_control_statements(input: &str, config: &SortConfig) -> Result<ControlStatements> {
    let mut result = ControlStatements::default();
    let mut include = None;
    let mut omit = None;
    let mut keyed = false;
    let mut copy_option = false;

    for statement in normalize_continuations(input) {
        let (keyword, operand) = match statement.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim_start()),
            None => (statement.as_str(), ""),
        };
        let offset = statement.len() - operand.len();
        let anchor = |e: SortError| e.within(offset, &statement);
        let duplicate = || SortError::parse(format!("duplicate {keyword} statement"), 0, &statement);

        match keyword {
            "SORT" | "MERGE" => {
                if keyed {
                    return Err(duplicate());
                }
                keyed = true;
                result.comparer = Comparer::parse(operand, config).map_err(anchor)?;
                result.mode = match (&result.comparer, keyword) {
                    (None, _) => Mode::Copy,
                    (Some(_), "MERGE") => Mode::Merge,
                    (Some(_), _) => Mode::Sort,
                };
            }
            "INCLUDE" | "OMIT" => {
                let slot = if keyword == "INCLUDE" { &mut include } else { &mut omit };
                if slot.is_some() {
                    return Err(duplicate());
                }
                *slot = Some(Filter::parse(operand, config).map_err(anchor)?);
            }
            "INREC" | "OUTREC" => {
                let slot = if keyword == "INREC" {
                    &mut result.inrec
                } else {
                    &mut result.outrec
                };
                if slot.is_some() {
                    return Err(duplicate());
                }
                *slot = Some(Formatter::parse(operand, config).map_err(anchor)?);
            }
            "SUM" => {
                if result.sum.is_some() {
                    return Err(duplicate());
                }
                result.sum = Some(SumSpec::parse(operand, config).map_err(anchor)?);
            }
            "OUTFIL" => {
                result
                    .outputs
                    .extend(parse_outfil(operand, config).map_err(anchor)?);
            }
            "OPTION" => {
                for word in operand.split(|c: char| c == ',' || c.is_whitespace()) {
                    match word {
                        "" => {}
                        "COPY" => copy_option = true,
                        "EQUALS" => result.stable = Some(true),
                        "NOEQUALS" => result.stable = Some(false),
                        other => warn!(option = other, "ignoring unsupported OPTION"),
                    }
                }
            }
            _ => {
                return Err(SortError::parse(
                    format!("unknown statement '{keyword}'"),
                    0,
                    &statement,
                ))
            }
        }
    }

    result.filter = match (include, omit) {
        (Some(inc), Some(om)) => Some(Filter::And(Box::new(inc), Box::new(om.negate()))),
        (inc, om) => inc.or(om.map(Filter::negate)),
    };
    if copy_option || !keyed {
        result.mode = Mode::Copy;
        result.comparer = None;
    }
    Ok(result)
}

/// True when the first word of a trimmed line is a statement keyword.
fn is_statement_keyword(trimmed: &str) -> bool {
    let first = trimmed.split_whitespace().next().unwrap_or_default();
    STATEMENT_KEYWORDS.contains(&first)
}

/// Joins continuation lines and drops comments and blank lines.
///
/// A line that is not indented always starts a new statement. An indented
/// line starts one only when it begins with a statement keyword.
fn normalize_continuations(input: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in input.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('*') {
            continue;
        }

        let is_indented = line.starts_with(' ') || line.starts_with('\t');
        if is_indented && !is_statement_keyword(trimmed) && !current.is_empty() {
            current.push(' ');
            current.push_str(trimmed);
        } else {
            if !current.is_empty() {
                statements.push(std::mem::take(&mut current));
            }
            current = trimmed.to_string();
        }
    }

    if !current.is_empty() {
        statements.push(current);
    }
    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::FieldFormat;
    use crate::comparer::Direction;

    fn parse(input: &str) -> ControlStatements {
        parse_control_statements(input, &SortConfig::default()).unwrap()
    }

    #[test]
    fn test_parse_sort_fields() {
        let result = parse("SORT FIELDS=(1,10,CH,A,15,5,ZD,D)");
        assert_eq!(result.mode, Mode::Sort);

        let comparer = result.comparer.unwrap();
        let keys = comparer.keys();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].field.position(), 1);
        assert_eq!(keys[0].field.length(), 10);
        assert_eq!(keys[0].field.format(), FieldFormat::Ch);
        assert_eq!(keys[0].direction, Direction::Ascending);
        assert_eq!(keys[1].field.position(), 15);
        assert_eq!(keys[1].field.format(), FieldFormat::Zd);
        assert_eq!(keys[1].direction, Direction::Descending);
    }

    #[test]
    fn test_parse_include_condition() {
        let result = parse("SORT FIELDS=(1,1,CH,A)\nINCLUDE COND=(10,2,CH,EQ,C'NY')");
        let filter = result.filter.unwrap();
        assert!(filter.evaluate(b"xxxxxxxxxNY").unwrap());
        assert!(!filter.evaluate(b"xxxxxxxxxCA").unwrap());
    }

    #[test]
    fn test_include_and_omit() {
        let result = parse(
            "SORT FIELDS=(1,1,CH,A)\n\
             INCLUDE COND=(1,1,CH,GE,C'B')\n\
             OMIT COND=(1,1,CH,EQ,C'C')",
        );
        let filter = result.filter.unwrap();
        assert!(!filter.evaluate(b"A").unwrap());
        assert!(filter.evaluate(b"B").unwrap());
        assert!(!filter.evaluate(b"C").unwrap());
    }

    #[test]
    fn test_parse_outrec_and_inrec() {
        let result = parse("SORT FIELDS=COPY\nINREC BUILD=(2,2)\nOUTREC FIELDS=(1,1,C'!')");
        assert_eq!(result.mode, Mode::Copy);
        assert!(result.comparer.is_none());
        assert_eq!(result.inrec.unwrap().format(b"abc").unwrap(), b"bc");
        assert_eq!(result.outrec.unwrap().format(b"bc").unwrap(), b"b!");
    }

    #[test]
    fn test_parse_copy_mode() {
        let result = parse("OPTION COPY");
        assert_eq!(result.mode, Mode::Copy);

        // OPTION COPY wins over SORT keys.
        let result = parse("SORT FIELDS=(1,1,CH,A)\nOPTION COPY");
        assert_eq!(result.mode, Mode::Copy);
        assert!(result.comparer.is_none());
    }

    #[test]
    fn test_parse_merge() {
        let result = parse("MERGE FIELDS=(1,4,BI,A)");
        assert_eq!(result.mode, Mode::Merge);
        assert!(result.comparer.is_some());
    }

    #[test]
    fn test_parse_options() {
        assert_eq!(parse("OPTION EQUALS").stable, Some(true));
        assert_eq!(parse("OPTION NOEQUALS,DYNALLOC").stable, Some(false));
        assert_eq!(parse("SORT FIELDS=(1,1,CH,A)").stable, None);
    }

    #[test]
    fn test_parse_sum_fields_none() {
        let result = parse("SORT FIELDS=(1,1,CH,A)\nSUM FIELDS=NONE");
        assert_eq!(result.sum, Some(SumSpec::SkipDuplicates));
    }

    #[test]
    fn test_parse_outfil_statements() {
        let result = parse(
            " SORT FIELDS=(1,1,CH,A)\n \
             OUTFIL FNAMES=A,INCLUDE=(1,1,CH,EQ,C'A')\n \
             OUTFIL FNAMES=B,OMIT=(1,1,CH,EQ,C'A')",
        );
        assert_eq!(result.outputs.len(), 2);
        assert_eq!(result.outputs[0].name.as_deref(), Some("A"));
        assert_eq!(result.outputs[1].name.as_deref(), Some("B"));
    }

    #[test]
    fn test_invalid_sort_fields() {
        let result = parse_control_statements("SORT FIELDS=(1,10,XX,A)", &SortConfig::default());
        match result {
            Err(SortError::UnrecognizedFormat { code, index, src, .. }) => {
                assert_eq!(code, "XX");
                assert_eq!(&src[index..index + 2], "XX");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_and_duplicate_statements() {
        let config = SortConfig::default();
        assert!(parse_control_statements("RECORD TYPE=F", &config).is_err());
        assert!(
            parse_control_statements("SORT FIELDS=(1,1,CH,A)\nSORT FIELDS=(2,1,CH,A)", &config)
                .is_err()
        );
    }

    /// Multi-line control cards where both SORT and INCLUDE are indented
    /// (as in inline SYSIN data) are separate statements.
    #[test]
    fn test_multiline_sort_and_include() {
        let input = " SORT FIELDS=(1,10,CH,A)\n INCLUDE COND=(20,2,CH,EQ,C'NY')\n";
        let result = parse(input);
        assert_eq!(result.comparer.unwrap().keys().len(), 1);
        assert!(result.filter.is_some());
    }

    #[test]
    fn test_continuation_and_comments() {
        let input = "* header comment\n SORT FIELDS=(1,5,CH,A,\n               7,3,ZD,D)\n\n";
        let result = parse(input);
        assert_eq!(result.comparer.unwrap().keys().len(), 2);
    }
}
