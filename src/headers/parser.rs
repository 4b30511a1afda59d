use rust_decimal::Decimal;
use std::str::FromStr;

use super::lexer::{Lexer, Token};
use super::{HeaderValue, ParseError};

#[derive(Debug, Clone, Copy)]
enum State {
    Start,
    AfterPair,
    Done,
}

/// Lazily parses `"key"=value,...` into `(key, value)` pairs.
///
/// Pairs come out in source order and duplicates are kept. The first error is
/// yielded once, after which the iterator is exhausted.
pub struct Parser<'a> {
    tokens: Lexer<'a>,
    len: usize,
    state: State,
}

impl<'a> Parser<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            tokens: Lexer::new(text),
            len: text.len(),
            state: State::Start,
        }
    }

    fn next_token(&mut self) -> Result<Option<(usize, Token)>, ParseError> {
        self.tokens.next().transpose()
    }

    fn pair(&mut self, first: Option<(usize, Token)>) -> Result<(String, HeaderValue), ParseError> {
        let key = match first {
            Some((_, Token::String(key))) => key,
            Some((pos, other)) => {
                return Err(ParseError::new(format!("Expected a string for key but was {other}"), pos))
            }
            None => return Err(ParseError::new("Expected a string for key but was end of input", self.len)),
        };

        match self.next_token()? {
            Some((_, Token::Equals)) => {}
            Some((pos, other)) => {
                return Err(ParseError::new(format!("Expected equals after \"{key}\" but was {other}"), pos))
            }
            None => {
                return Err(ParseError::new(
                    format!("Expected equals after \"{key}\" but was end of input"),
                    self.len,
                ))
            }
        }

        let value = match self.next_token()? {
            Some((_, Token::String(s))) => HeaderValue::String(s),
            Some((pos, Token::Number(n))) => number(&n, pos)?,
            Some((_, Token::True)) => HeaderValue::Bool(true),
            Some((_, Token::False)) => HeaderValue::Bool(false),
            Some((_, Token::Null)) => HeaderValue::Null,
            Some((pos, other)) => {
                return Err(ParseError::new(format!("Expected value after \"{key}\"= but was {other}"), pos))
            }
            None => {
                return Err(ParseError::new(
                    format!("Expected value after \"{key}\"= but was end of input"),
                    self.len,
                ))
            }
        };
        Ok((key, value))
    }

    fn step(&mut self) -> Result<Option<(String, HeaderValue)>, ParseError> {
        match self.state {
            State::Done => Ok(None),
            State::Start => match self.next_token()? {
                None => Ok(None),
                first => self.pair(first).map(Some),
            },
            State::AfterPair => match self.next_token()? {
                None => Ok(None),
                Some((_, Token::Comma)) => {
                    let first = self.next_token()?;
                    self.pair(first).map(Some)
                }
                Some((pos, other)) => Err(ParseError::new(format!("Expected comma but was {other}"), pos)),
            },
        }
    }
}

impl Iterator for Parser<'_> {
    type Item = Result<(String, HeaderValue), ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.step() {
            Ok(Some(pair)) => {
                self.state = State::AfterPair;
                Some(Ok(pair))
            }
            Ok(None) => {
                self.state = State::Done;
                None
            }
            Err(e) => {
                self.state = State::Done;
                Some(Err(e))
            }
        }
    }
}

fn number(text: &str, pos: usize) -> Result<HeaderValue, ParseError> {
    if !text.contains('.') {
        if let Ok(i) = text.parse::<i64>() {
            return Ok(HeaderValue::Int(i));
        }
    }
    Decimal::from_str(text)
        .map(HeaderValue::Decimal)
        .map_err(|e| ParseError::new(format!("Invalid number {text}: {e}"), pos))
}
