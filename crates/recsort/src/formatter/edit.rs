//! Numeric edit masks.
//!
//! Mask characters:
//! - `I` is a digit, blank while no significant digit has been shown
//! - `T` is a digit, always shown
//! - a leading `S` is a floating sign placed just left of the first shown
//!   character; a trailing `S` is a sign after the body
//! - anything else is a literal, blank until the first significant digit
//!
//! Digits come from the unscaled magnitude of the value, right-aligned in
//! the mask. High-order digits that do not fit are dropped.

use rust_decimal::Decimal;

/// Positive and negative renderings of a sign position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignPair {
    pub positive: String,
    pub negative: String,
}

impl SignPair {
    pub fn new(positive: &str, negative: &str) -> Self {
        Self {
            positive: positive.to_string(),
            negative: negative.to_string(),
        }
    }

    fn pick(&self, negative: bool) -> &str {
        if negative {
            &self.negative
        } else {
            &self.positive
        }
    }

    fn width(&self) -> usize {
        self.positive.chars().count().max(self.negative.chars().count())
    }
}

impl Default for SignPair {
    fn default() -> Self {
        Self::new(" ", "-")
    }
}

type SignSpec = Option<(&'static str, &'static str)>;

/// DFSORT predefined masks `M0` to `M26`: pattern, leading and trailing signs.
const PREDEFINED: [(&str, SignSpec, SignSpec); 27] = [
    ("IIIIIIIIIIIIIITS", None, Some((" ", "-"))),
    ("TTTTTTTTTTTTTTTS", None, Some((" ", "-"))),
    ("II,III,III,III,IIT.TTS", None, Some((" ", "-"))),
    ("II,III,III,III,IIT.TTS", None, Some(("  ", "CR"))),
    ("SII,III,III,III,IIT.TT", Some(("+", "-")), None),
    ("SII,III,III,III,IIT.TTS", Some((" ", "(")), Some((" ", ")"))),
    ("III-TTT-TTTT", None, None),
    ("TTT-TT-TTTT", None, None),
    ("IT:TT:TT", None, None),
    ("IT/TT/TT", None, None),
    ("IIIIIIIIIIIIIIT", None, None),
    ("TTTTTTTTTTTTTTT", None, None),
    ("SI,III,III,III,III,IIT", Some((" ", "-")), None),
    ("SI.III.III.III.III.IIT", Some((" ", "-")), None),
    ("SI III III III III IITS", Some((" ", "(")), Some((" ", ")"))),
    ("I III III III III IITS", None, Some((" ", "-"))),
    ("SI III III III III IIT", Some((" ", "-")), None),
    ("SI'III'III'III'III'IIT", Some((" ", "-")), None),
    ("SII,III,III,III,IIT.TT", Some((" ", "-")), None),
    ("SII.III.III.III.IIT,TT", Some((" ", "-")), None),
    ("SII III III III IIT,TTS", Some((" ", "(")), Some((" ", ")"))),
    ("II III III III IIT,TTS", None, Some((" ", "-"))),
    ("SII III III III IIT,TT", Some((" ", "-")), None),
    ("SII'III'III'III'IIT.TT", Some((" ", "-")), None),
    ("SII'III'III'III'IIT,TT", Some((" ", "-")), None),
    ("SIIIIIIIIIIIIIIT", Some((" ", "-")), None),
    ("STTTTTTTTTTTTTTT", Some(("+", "-")), None),
];

/// A compiled edit mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditMask {
    body: String,
    leading: Option<SignPair>,
    trailing: Option<SignPair>,
}

impl EditMask {
    /// Mask from a pattern; sign positions default to blank and `-`.
    pub fn custom(pattern: &str) -> Self {
        let (body, has_leading, has_trailing) = split_signs(pattern);
        Self {
            body: body.to_string(),
            leading: has_leading.then(SignPair::default),
            trailing: has_trailing.then(SignPair::default),
        }
    }

    /// One of `M0`..`M26`.
    pub fn predefined(name: &str) -> Option<Self> {
        let index: usize = name.strip_prefix('M')?.parse().ok()?;
        let (pattern, leading, trailing) = PREDEFINED.get(index)?;
        let (body, _, _) = split_signs(pattern);
        let pair = |spec: &SignSpec| spec.map(|(p, n)| SignPair::new(p, n));
        Some(Self {
            body: body.to_string(),
            leading: pair(leading),
            trailing: pair(trailing),
        })
    }

    /// Applies a `SIGNS=` operand.
    ///
    /// One or two values replace the leading pair when the mask has a
    /// leading sign, otherwise the trailing pair. Four values set
    /// leading positive, leading negative, trailing positive and trailing
    /// negative.
    pub fn with_signs(mut self, signs: &[String]) -> Result<Self, String> {
        match signs {
            [lp, ln, tp, tn] => {
                self.leading = Some(SignPair::new(lp, ln));
                self.trailing = Some(SignPair::new(tp, tn));
            }
            [p] | [p, _] => {
                let slot = if self.leading.is_some() {
                    &mut self.leading
                } else {
                    &mut self.trailing
                };
                let current = slot.take().unwrap_or_default();
                let negative = signs.get(1).map_or(current.negative, |n| n.clone());
                *slot = Some(SignPair::new(p, &negative));
            }
            _ => return Err(format!("SIGNS takes 1, 2 or 4 values, got {}", signs.len())),
        }
        Ok(self)
    }

    /// Number of digit positions.
    pub fn digits(&self) -> usize {
        self.body.chars().filter(|c| matches!(c, 'I' | 'T')).count()
    }

    /// Renders `value` through the mask.
    pub fn apply(&self, value: Decimal) -> String {
        let negative = value.is_sign_negative() && !value.is_zero();
        let magnitude = value.mantissa().unsigned_abs().to_string();
        let width = self.digits();
        let digits: Vec<char> = if magnitude.len() >= width {
            magnitude[magnitude.len() - width..].chars().collect()
        } else {
            let mut padded = vec!['0'; width - magnitude.len()];
            padded.extend(magnitude.chars());
            padded
        };

        let mut body = String::with_capacity(self.body.len());
        let mut next = digits.iter();
        let mut significant = false;
        for c in self.body.chars() {
            match c {
                'I' | 'T' => {
                    let d = next.next().copied().unwrap_or('0');
                    significant |= c == 'T' || d != '0';
                    body.push(if significant { d } else { ' ' });
                }
                literal => body.push(if significant { literal } else { ' ' }),
            }
        }

        let mut out = match &self.leading {
            Some(pair) => {
                let floated = format!("{}{}", pair.pick(negative), body.trim_start());
                let width = body.chars().count() + pair.width();
                format!("{floated:>width$}")
            }
            None => body,
        };
        if let Some(pair) = &self.trailing {
            let width = pair.width();
            out.push_str(&format!("{:<width$}", pair.pick(negative)));
        }
        out
    }
}

fn split_signs(pattern: &str) -> (&str, bool, bool) {
    let (body, leading) = match pattern.strip_prefix('S') {
        Some(rest) => (rest, true),
        None => (pattern, false),
    };
    match body.strip_suffix('S') {
        Some(rest) => (rest, leading, true),
        None => (body, leading, false),
    }
}

/// An edit mask plus optional `LENGTH=` output width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub mask: EditMask,
    pub length: Option<usize>,
}

impl Edit {
    pub fn new(mask: EditMask, length: Option<usize>) -> Self {
        Self { mask, length }
    }

    /// Edited text, right-aligned into `length` when set.
    pub fn apply(&self, value: Decimal) -> String {
        let text = self.mask.apply(value);
        match self.length {
            Some(length) => {
                let count = text.chars().count();
                if count >= length {
                    text.chars().skip(count - length).collect()
                } else {
                    format!("{text:>length$}")
                }
            }
            None => text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(name: &str, value: i64) -> String {
        EditMask::predefined(name).unwrap().apply(Decimal::from(value))
    }

    #[test]
    fn test_suppression_and_always_shown() {
        let mask = EditMask::custom("IIIIIII.TT");
        assert_eq!(mask.apply(Decimal::from(12345)), "    123.45");
        assert_eq!(mask.apply(Decimal::ZERO), "        00");
        assert_eq!(EditMask::custom("IIII").apply(Decimal::ZERO), "    ");
    }

    #[test]
    fn test_truncates_high_order_digits() {
        assert_eq!(EditMask::custom("TTT").apply(Decimal::from(12345)), "345");
    }

    #[test]
    fn test_unscaled_digits() {
        assert_eq!(
            EditMask::custom("IIT.TT").apply(Decimal::new(1234, 2)),
            " 12.34"
        );
    }

    #[test]
    fn test_trailing_sign() {
        assert_eq!(m("M0", -42), "             42-");
        assert_eq!(m("M0", 42), "             42 ");
        assert_eq!(m("M3", -12345), "               123.45CR");
        assert_eq!(m("M3", 12345), "               123.45  ");
    }

    #[test]
    fn test_floating_leading_sign() {
        assert_eq!(m("M4", 12345), "               +123.45");
        assert_eq!(m("M4", -5), "                 -0.05");
        assert_eq!(m("M26", -7), "-000000000000007");
    }

    #[test]
    fn test_parenthesized_negative() {
        assert_eq!(m("M5", -12345), "               (123.45)");
        assert_eq!(m("M5", 12345), "                123.45 ");
    }

    #[test]
    fn test_grouping_masks() {
        assert_eq!(m("M2", 123456789), "         1,234,567.89 ");
        assert_eq!(m("M12", 1234567), "             1,234,567");
        assert_eq!(m("M8", 123456), "12:34:56");
        assert_eq!(m("M9", 10203), " 1/02/03");
        assert_eq!(m("M6", 5551234567), "555-123-4567");
        assert_eq!(m("M11", 42), "000000000000042");
    }

    #[test]
    fn test_unknown_predefined() {
        assert!(EditMask::predefined("M27").is_none());
        assert!(EditMask::predefined("MX").is_none());
        assert!(EditMask::predefined("12").is_none());
    }

    #[test]
    fn test_custom_signs() {
        let mask = EditMask::custom("SIIT")
            .with_signs(&["+".to_string(), "-".to_string()])
            .unwrap();
        assert_eq!(mask.apply(Decimal::from(12)), " +12");
        assert_eq!(mask.apply(Decimal::from(-12)), " -12");

        let mask = EditMask::custom("IITS")
            .with_signs(&["".to_string(), "DB".to_string()])
            .unwrap();
        assert_eq!(mask.apply(Decimal::from(-12)), " 12DB");
        assert_eq!(mask.apply(Decimal::from(12)), " 12  ");

        let four: Vec<String> = ["<", ">", "+", "-"].iter().map(|s| s.to_string()).collect();
        let mask = EditMask::custom("IIT").with_signs(&four).unwrap();
        assert_eq!(mask.apply(Decimal::from(-3)), "  >3-");

        assert!(EditMask::custom("IIT")
            .with_signs(&["a".into(), "b".into(), "c".into()])
            .is_err());
    }

    #[test]
    fn test_length() {
        let edit = Edit::new(EditMask::custom("IIIT"), Some(6));
        assert_eq!(edit.apply(Decimal::from(42)), "    42");
        let edit = Edit::new(EditMask::predefined("M4").unwrap(), Some(5));
        assert_eq!(edit.apply(Decimal::from(-12345)), "23.45");
    }
}
