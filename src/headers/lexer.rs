use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use super::ParseError;

/// A token of the header grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A double-quoted string, with escapes resolved.
    String(String),
    /// The text of a number, e.g. `-12.50`.
    Number(String),
    True,
    False,
    Null,
    Equals,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::String(s) => write!(f, "string \"{s}\""),
            Token::Number(n) => write!(f, "number {n}"),
            Token::True => f.write_str("true"),
            Token::False => f.write_str("false"),
            Token::Null => f.write_str("null"),
            Token::Equals => f.write_str("'='"),
            Token::Comma => f.write_str("','"),
        }
    }
}

/// Lazily splits header text into tokens.
///
/// Yields `(position, token)` pairs where `position` is the byte offset of the
/// token start. The first error ends the stream. Creating a new lexer over the
/// same text starts again from the beginning.
pub struct Lexer<'a> {
    text: &'a str,
    chars: Peekable<CharIndices<'a>>,
    failed: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.char_indices().peekable(),
            failed: false,
        }
    }

    fn string(&mut self, start: usize) -> Result<Token, ParseError> {
        let mut value = String::new();
        loop {
            match self.chars.next() {
                Some((_, '"')) => return Ok(Token::String(value)),
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, c @ ('"' | '\\'))) => value.push(c),
                    Some((_, c)) => {
                        value.push('\\');
                        value.push(c);
                    }
                    None => break,
                },
                Some((_, c)) => value.push(c),
                None => break,
            }
        }
        Err(ParseError::new("Unterminated string", start))
    }

    fn number(&mut self, start: usize) -> Result<Token, ParseError> {
        let mut end = start + 1;
        let first = self.text[start..].starts_with('-');
        let int_digits = self.digits(&mut end);
        if first && int_digits == 0 {
            return Err(ParseError::new("Expected digit after '-'", start));
        }
        if let Some(&(dot, '.')) = self.chars.peek() {
            self.chars.next();
            end = dot + 1;
            if self.digits(&mut end) == 0 {
                return Err(ParseError::new("Expected digit after decimal point", dot));
            }
        }
        Ok(Token::Number(self.text[start..end].to_string()))
    }

    /// Consumes ASCII digits, advancing `end`. Returns how many were read.
    fn digits(&mut self, end: &mut usize) -> usize {
        let mut count = 0;
        while let Some(&(i, c)) = self.chars.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            self.chars.next();
            *end = i + 1;
            count += 1;
        }
        count
    }

    fn literal(&mut self, start: usize) -> Result<Token, ParseError> {
        let mut end = start + 1;
        while let Some(&(i, c)) = self.chars.peek() {
            if !c.is_ascii_alphabetic() {
                break;
            }
            self.chars.next();
            end = i + 1;
        }
        match &self.text[start..end] {
            "true" => Ok(Token::True),
            "false" => Ok(Token::False),
            "null" => Ok(Token::Null),
            other => Err(ParseError::new(format!("Unexpected literal '{other}'"), start)),
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<(usize, Token), ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let (start, c) = self.chars.next()?;
        let result = match c {
            '=' => Ok(Token::Equals),
            ',' => Ok(Token::Comma),
            '"' => self.string(start),
            '-' | '0'..='9' => self.number(start),
            c if c.is_ascii_alphabetic() => self.literal(start),
            c => Err(ParseError::new(format!("Unexpected character '{c}'"), start)),
        };
        if result.is_err() {
            self.failed = true;
        }
        Some(result.map(|token| (start, token)))
    }
}
