//! Codec for the header extension: `"key"=value` pairs separated by commas.
//!
//! ```text
//! pairs := (pair (',' pair)*)?
//! pair  := STRING '=' value
//! value := STRING | NUMBER | true | false | null
//! ```
//!
//! Strings are double-quoted with `\"` and `\\` escapes. Numbers are an
//! optional `-`, digits, and an optional `.` followed by at least one digit;
//! they decode to integers or decimals, never floats. No whitespace is
//! accepted between tokens.

mod lexer;
mod parser;
pub(crate) mod timespan;
mod value;

pub use lexer::{Lexer, Token};
pub use parser::Parser;
pub use value::HeaderValue;

use thiserror::Error;

/// Header key carrying the message priority. Never written to the extension.
pub const PRIORITY: &str = "Priority";
/// Header key carrying the time to live. Never written to the extension.
pub const TIME_TO_LIVE: &str = "TimeToLive";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// A malformed header extension.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} at position {position}")]
pub struct ParseError {
    /// What was expected and what was found.
    pub message: String,
    /// Byte offset into the decoded text.
    pub position: usize,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Parses header text into pairs, in source order.
pub fn parse(text: &str) -> Result<Vec<(String, HeaderValue)>, ParseError> {
    Parser::new(text).collect()
}

/// Decodes a UTF-8 extension blob. A leading byte order mark is ignored and an
/// empty blob decodes to no pairs.
pub fn decode(bytes: &[u8]) -> Result<Vec<(String, HeaderValue)>, ParseError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ParseError::new("Extension is not valid UTF-8", e.valid_up_to()))?;
    parse(text)
}

// ============================================================================
// Encoding
// ============================================================================

/// Encodes pairs as extension text, skipping `Priority` and `TimeToLive`.
pub fn encode<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a HeaderValue)>,
{
    let mut out = String::new();
    for (key, value) in pairs {
        if key == PRIORITY || key == TIME_TO_LIVE {
            continue;
        }
        if !out.is_empty() {
            out.push(',');
        }
        push_quoted(&mut out, key);
        out.push('=');
        match value {
            HeaderValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            HeaderValue::Null => out.push_str("null"),
            HeaderValue::Int(i) => out.push_str(&i.to_string()),
            HeaderValue::Decimal(d) => out.push_str(&d.to_string()),
            other => push_quoted(&mut out, &other.to_string()),
        }
    }
    out
}

/// Encodes pairs as the UTF-8 bytes stored in a native extension (no BOM).
pub fn encode_to_vec<'a, I>(pairs: I) -> Vec<u8>
where
    I: IntoIterator<Item = (&'a str, &'a HeaderValue)>,
{
    encode(pairs).into_bytes()
}

fn push_quoted(out: &mut String, text: &str) {
    out.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}
