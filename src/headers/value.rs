use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt;
use std::time::Duration;
use url::Url;

use super::timespan;

/// A single header value.
///
/// Numbers decoded from the wire become [`HeaderValue::Int`] when they have no
/// fractional part and fit in an `i64`, and [`HeaderValue::Decimal`] otherwise.
/// The two compare numerically, so `Int(2) == Decimal(2.0)`.
#[derive(Debug, Clone)]
pub enum HeaderValue {
    String(String),
    Int(i64),
    Decimal(Decimal),
    Bool(bool),
    Null,
    Uri(Url),
    Duration(Duration),
}

impl HeaderValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HeaderValue::Int(i) => Some(*i),
            HeaderValue::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            HeaderValue::Int(i) => Some(Decimal::from(*i)),
            HeaderValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HeaderValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, HeaderValue::Null)
    }
}

impl PartialEq for HeaderValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HeaderValue::String(a), HeaderValue::String(b)) => a == b,
            (HeaderValue::Int(a), HeaderValue::Int(b)) => a == b,
            (HeaderValue::Decimal(a), HeaderValue::Decimal(b)) => a == b,
            (HeaderValue::Int(a), HeaderValue::Decimal(b)) | (HeaderValue::Decimal(b), HeaderValue::Int(a)) => {
                Decimal::from(*a) == *b
            }
            (HeaderValue::Bool(a), HeaderValue::Bool(b)) => a == b,
            (HeaderValue::Null, HeaderValue::Null) => true,
            (HeaderValue::Uri(a), HeaderValue::Uri(b)) => a == b,
            (HeaderValue::Duration(a), HeaderValue::Duration(b)) => a == b,
            _ => false,
        }
    }
}

/// Renders the value as its text form, without quoting.
impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::String(s) => f.write_str(s),
            HeaderValue::Int(i) => write!(f, "{i}"),
            HeaderValue::Decimal(d) => write!(f, "{d}"),
            HeaderValue::Bool(b) => write!(f, "{b}"),
            HeaderValue::Null => f.write_str("null"),
            HeaderValue::Uri(u) => f.write_str(u.as_str()),
            HeaderValue::Duration(d) => f.write_str(&timespan::format(*d)),
        }
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::String(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::String(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::Int(value)
    }
}

impl From<i32> for HeaderValue {
    fn from(value: i32) -> Self {
        HeaderValue::Int(value.into())
    }
}

impl From<Decimal> for HeaderValue {
    fn from(value: Decimal) -> Self {
        HeaderValue::Decimal(value)
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        HeaderValue::Bool(value)
    }
}

impl From<Url> for HeaderValue {
    fn from(value: Url) -> Self {
        HeaderValue::Uri(value)
    }
}

impl From<Duration> for HeaderValue {
    fn from(value: Duration) -> Self {
        HeaderValue::Duration(value)
    }
}
