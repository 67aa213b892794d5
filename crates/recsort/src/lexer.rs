//! Pull-based tokenizer for control card operands.
//!
//! Cards such as `FIELDS=(1,5,CH,A,7,3,ZD,D)` are read one token at a time.
//! Parentheses and semicolons are tokens of their own. Blanks and commas
//! only separate words, so `1,5,CH` and `1 5 CH` lex the same way. A quote
//! starts a literal; `''` inside a literal stands for one quote.
//! Keywords are case-sensitive, as on the mainframe.

use std::iter::Peekable;
use std::str::CharIndices;

use crate::accessor::FieldFormat;
use crate::error::{Result, SortError};

/// A single card token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Unquoted run of characters, e.g. `FIELDS=`, `12`, `5C`, `9:6`.
    Word(String),
    /// Contents of a quoted literal, quotes removed.
    Literal(String),
    LParen,
    RParen,
    Semicolon,
}

fn is_separator(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n' | ',')
}

fn ends_word(c: char) -> bool {
    is_separator(c) || matches!(c, '(' | ')' | ';' | '\'')
}

/// Token cursor over one card operand text.
pub struct Lexer<'a> {
    src: &'a str,
    chars: Peekable<CharIndices<'a>>,
    current: Option<Token>,
    index: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer positioned on the first token.
    pub fn new(src: &'a str) -> Result<Self> {
        let mut lexer = Self {
            src,
            chars: src.char_indices().peekable(),
            current: None,
            index: 0,
        };
        lexer.advance()?;
        Ok(lexer)
    }

    /// The full text being tokenized.
    pub fn source(&self) -> &'a str {
        self.src
    }

    /// The current token, or `None` at end of input.
    pub fn current(&self) -> Option<&Token> {
        self.current.as_ref()
    }

    /// Byte offset of the current token (input length at end of input).
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn at_end(&self) -> bool {
        self.current.is_none()
    }

    /// Moves to the next token.
    pub fn advance(&mut self) -> Result<()> {
        while let Some(&(_, c)) = self.chars.peek() {
            if is_separator(c) {
                self.chars.next();
            } else {
                break;
            }
        }

        let Some(&(start, c)) = self.chars.peek() else {
            self.current = None;
            self.index = self.src.len();
            return Ok(());
        };
        self.index = start;

        let token = match c {
            '(' => {
                self.chars.next();
                Token::LParen
            }
            ')' => {
                self.chars.next();
                Token::RParen
            }
            ';' => {
                self.chars.next();
                Token::Semicolon
            }
            '\'' => {
                self.chars.next();
                Token::Literal(self.read_literal(start)?)
            }
            _ => {
                let mut word = String::new();
                while let Some(&(_, c)) = self.chars.peek() {
                    if ends_word(c) {
                        break;
                    }
                    word.push(c);
                    self.chars.next();
                }
                Token::Word(word)
            }
        };
        self.current = Some(token);
        Ok(())
    }

    fn read_literal(&mut self, start: usize) -> Result<String> {
        let mut text = String::new();
        loop {
            match self.chars.next() {
                Some((_, '\'')) => {
                    if matches!(self.chars.peek(), Some(&(_, '\''))) {
                        text.push('\'');
                        self.chars.next();
                    } else {
                        return Ok(text);
                    }
                }
                Some((_, c)) => text.push(c),
                None => return Err(SortError::parse("unterminated literal", start, self.src)),
            }
        }
    }

    /// Builds a parse error at the current token.
    pub fn error(&self, message: impl Into<String>) -> SortError {
        SortError::parse(message, self.index, self.src)
    }

    /// Builds a parse error at an earlier token index.
    pub fn error_at(&self, message: impl Into<String>, index: usize) -> SortError {
        SortError::parse(message, index, self.src)
    }

    /// The current word, if the current token is one.
    pub fn word(&self) -> Option<&str> {
        match &self.current {
            Some(Token::Word(w)) => Some(w),
            _ => None,
        }
    }

    pub fn is_word(&self, expected: &str) -> bool {
        self.word() == Some(expected)
    }

    pub fn is(&self, expected: &Token) -> bool {
        self.current.as_ref() == Some(expected)
    }

    /// Consumes `expected` if it is the current token.
    pub fn eat(&mut self, expected: &Token) -> Result<bool> {
        if self.is(expected) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Consumes the current word if it equals `expected`.
    pub fn eat_word(&mut self, expected: &str) -> Result<bool> {
        if self.is_word(expected) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Consumes a `KEY=` prefix of the current word.
    ///
    /// In `BUILD=1,3` the first operand is glued to the keyword; the rest of
    /// the word (`1`) becomes the current token.
    pub fn eat_prefix(&mut self, prefix: &str) -> Result<bool> {
        let rest = match self.word().and_then(|w| w.strip_prefix(prefix)) {
            Some(rest) => rest.to_string(),
            None => return Ok(false),
        };
        if rest.is_empty() {
            self.advance()?;
        } else {
            self.index += prefix.len();
            self.current = Some(Token::Word(rest));
        }
        Ok(true)
    }

    pub fn expect(&mut self, expected: &Token) -> Result<()> {
        if self.eat(expected)? {
            Ok(())
        } else {
            Err(self.error(format!("expected {}", describe(expected))))
        }
    }

    pub fn expect_word(&mut self) -> Result<String> {
        match self.current.take() {
            Some(Token::Word(w)) => {
                self.advance()?;
                Ok(w)
            }
            other => {
                self.current = other;
                Err(self.error("expected a word"))
            }
        }
    }

    /// Consumes an unsigned decimal number.
    pub fn expect_number(&mut self) -> Result<usize> {
        match self.word().and_then(|w| w.parse::<usize>().ok()) {
            Some(n) => {
                self.advance()?;
                Ok(n)
            }
            None => Err(self.error("expected a number")),
        }
    }

    pub fn expect_literal(&mut self) -> Result<String> {
        match self.current.take() {
            Some(Token::Literal(s)) => {
                self.advance()?;
                Ok(s)
            }
            other => {
                self.current = other;
                Err(self.error("expected a quoted literal"))
            }
        }
    }

    /// Consumes an optional `FORMAT=xx` word; the value is read by
    /// [`default_format`] beforehand.
    pub fn skip_format(&mut self) -> Result<bool> {
        if self.word().is_some_and(|w| w.starts_with("FORMAT=")) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Word(w) => format!("'{w}'"),
        Token::Literal(_) => "a quoted literal".to_string(),
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
        Token::Semicolon => "';'".to_string(),
    }
}

/// Finds a `FORMAT=xx` default anywhere in a card, prefix or suffix.
pub fn default_format(src: &str) -> Result<Option<FieldFormat>> {
    let mut lexer = Lexer::new(src)?;
    while let Some(token) = lexer.current() {
        if let Token::Word(w) = token {
            if let Some(code) = w.strip_prefix("FORMAT=") {
                let index = lexer.index() + "FORMAT=".len();
                return FieldFormat::from_code(code)
                    .map(Some)
                    .ok_or_else(|| SortError::unrecognized_format(code, index, src));
            }
        }
        lexer.advance()?;
    }
    Ok(None)
}
