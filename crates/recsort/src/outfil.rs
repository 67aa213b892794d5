//! OUTFIL destinations.
//!
//! ```text
//! OUTFIL FNAMES=HIGH,INCLUDE=(1,1,CH,EQ,C'H'),BUILD=(1,10);
//!        FNAMES=REST,OMIT=(1,1,CH,EQ,C'H')
//! ```
//!
//! Each `;`-separated block names one output sink. Sinks are fed in the
//! order their blocks appear.

use crate::config::SortConfig;
use crate::error::Result;
use crate::filter::{parse_condition, Filter};
use crate::formatter::{parse_formatter, Formatter};
use crate::lexer::{default_format, Lexer, Token};

/// One output destination with its own selection and layout.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutputSpec {
    /// `FNAMES=` label, used only in logs and stats.
    pub name: Option<String>,
    pub filter: Option<Filter>,
    pub formatter: Option<Formatter>,
}

impl OutputSpec {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_formatter(mut self, formatter: Formatter) -> Self {
        self.formatter = Some(formatter);
        self
    }

    /// True when `record` belongs to this destination.
    pub fn accepts(&self, record: &[u8]) -> Result<bool> {
        match &self.filter {
            Some(filter) => filter.evaluate(record),
            None => Ok(true),
        }
    }

    /// Label for logs: the `FNAMES=` value or the 1-based position.
    pub fn label(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("OUT{}", index + 1))
    }
}

/// Parses an OUTFIL operand into one spec per `;`-separated block.
pub fn parse_outfil(text: &str, config: &SortConfig) -> Result<Vec<OutputSpec>> {
    let default = default_format(text)?;
    let mut lexer = Lexer::new(text)?;
    let mut specs = Vec::new();

    loop {
        while lexer.eat(&Token::Semicolon)? {}
        if lexer.at_end() {
            break;
        }

        let mut spec = OutputSpec::new();
        let mut include = None;
        let mut omit = None;
        while !(lexer.at_end() || lexer.is(&Token::Semicolon)) {
            let index = lexer.index();
            let word = match lexer.word() {
                Some(word) => word.to_string(),
                None => return Err(lexer.error("expected an OUTFIL operand")),
            };
            if lexer.eat_prefix("INCLUDE=")? || lexer.eat_prefix("OMIT=")? {
                let slot = if word.starts_with("INCLUDE=") { &mut include } else { &mut omit };
                if slot.is_some() {
                    return Err(lexer.error_at(format!("duplicate {word}"), index));
                }
                *slot = Some(parse_condition(&mut lexer, default, config)?);
            } else if lexer.eat_prefix("OUTREC=")? || lexer.eat_prefix("BUILD=")? {
                if spec.formatter.is_some() {
                    return Err(lexer.error_at(format!("duplicate {word}"), index));
                }
                spec.formatter = Some(parse_formatter(&mut lexer, config)?);
            } else if let Some(name) = word.strip_prefix("FNAMES=") {
                lexer.advance()?;
                spec.name = Some(match name {
                    "" => lexer.expect_word()?,
                    name => name.to_string(),
                });
            } else if word.starts_with("FORMAT=") {
                lexer.advance()?;
            } else {
                return Err(lexer.error_at(
                    format!(
                        "unexpected '{word}' in OUTFIL; expected INCLUDE=, OMIT=, OUTREC=, BUILD= or FNAMES="
                    ),
                    index,
                ));
            }
        }

        spec.filter = match (include, omit) {
            (Some(inc), Some(om)) => Some(Filter::And(Box::new(inc), Box::new(om.negate()))),
            (Some(inc), None) => Some(inc),
            (None, Some(om)) => Some(om.negate()),
            (None, None) => None,
        };
        specs.push(spec);
    }

    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SortError;

    fn parse(text: &str) -> Vec<OutputSpec> {
        parse_outfil(text, &SortConfig::default()).unwrap()
    }

    #[test]
    fn test_single_block() {
        let specs = parse("FNAMES=HIGH,INCLUDE=(1,1,CH,EQ,C'H'),BUILD=(1,3)");
        assert_eq!(specs.len(), 1);
        let spec = &specs[0];
        assert_eq!(spec.name.as_deref(), Some("HIGH"));
        assert!(spec.accepts(b"Habc").unwrap());
        assert!(!spec.accepts(b"Labc").unwrap());
        let formatter = spec.formatter.as_ref().unwrap();
        assert_eq!(formatter.format(b"Habcdef").unwrap(), b"Hab");
    }

    #[test]
    fn test_blocks_split_on_semicolon() {
        let specs = parse("INCLUDE=(1,1,CH,EQ,C'A');OMIT=(1,1,CH,EQ,C'A');");
        assert_eq!(specs.len(), 2);
        assert!(specs[0].accepts(b"A").unwrap());
        assert!(!specs[1].accepts(b"A").unwrap());
        assert!(specs[1].accepts(b"B").unwrap());
    }

    #[test]
    fn test_include_and_omit_combine() {
        let specs = parse("INCLUDE=(1,1,CH,GE,C'B'),OMIT=(1,1,CH,EQ,C'C')");
        let spec = &specs[0];
        assert!(!spec.accepts(b"A").unwrap());
        assert!(spec.accepts(b"B").unwrap());
        assert!(!spec.accepts(b"C").unwrap());
        assert!(spec.accepts(b"D").unwrap());
    }

    #[test]
    fn test_unparenthesized_build_stops_at_keyword() {
        let specs = parse("BUILD=1,2,C'-' FNAMES=OUT");
        assert_eq!(specs[0].name.as_deref(), Some("OUT"));
        let formatter = specs[0].formatter.as_ref().unwrap();
        assert_eq!(formatter.format(b"xyz").unwrap(), b"xy-");
    }

    #[test]
    fn test_unparenthesized_operands_after_keyword() {
        let specs = parse("INCLUDE=1,1,CH,EQ,C'A' OUTREC=2,2 FNAMES=A;OMIT=1,1,CH,EQ,C'A'");
        assert_eq!(specs.len(), 2);
        assert!(specs[0].accepts(b"Axy").unwrap());
        assert!(!specs[0].accepts(b"Bxy").unwrap());
        let formatter = specs[0].formatter.as_ref().unwrap();
        assert_eq!(formatter.format(b"Axy").unwrap(), b"xy");
        assert!(!specs[1].accepts(b"Axy").unwrap());
    }

    #[test]
    fn test_empty_block_has_no_filter() {
        let specs = parse("FNAMES=ALL");
        assert!(specs[0].filter.is_none());
        assert!(specs[0].formatter.is_none());
        assert_eq!(specs[0].label(0), "ALL");
        assert_eq!(OutputSpec::new().label(2), "OUT3");
    }

    #[test]
    fn test_default_format() {
        let specs = parse("INCLUDE=(1,2,GT,5),FORMAT=ZD");
        assert!(specs[0].accepts(b"07").unwrap());
        assert!(!specs[0].accepts(b"03").unwrap());
    }

    #[test]
    fn test_errors() {
        let config = SortConfig::default();
        assert!(matches!(
            parse_outfil("SPLIT", &config),
            Err(SortError::Parse { index: 0, .. })
        ));
        assert!(parse_outfil("BUILD=(1,2),OUTREC=(1,2)", &config).is_err());
        assert!(parse_outfil("INCLUDE=(1,1,CH,EQ", &config).is_err());
    }
}
