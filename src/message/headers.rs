use rust_decimal::prelude::ToPrimitive;
use std::time::Duration;
use url::Url;

use crate::error::Error;
use crate::headers::{timespan, HeaderValue};

pub const CONTENT_TYPE: &str = "ContentType";
pub const PRIORITY: &str = crate::headers::PRIORITY;
pub const TIME_TO_LIVE: &str = crate::headers::TIME_TO_LIVE;
pub const REPLY_TO: &str = "ReplyTo";

/// Highest priority a message may carry.
pub const MAX_PRIORITY: u8 = 31;

/// Well known `ContentType` values.
pub mod content_types {
    pub const PLAIN_TEXT: &str = "text/plain";
    pub const XML: &str = "text/xml";
    pub const JSON: &str = "application/json";
    pub const BINARY: &str = "application/octet-stream";
}

/// Message headers.
///
/// Keys are unique; [`insert()`](Self::insert) replaces an existing value in
/// place. Iteration and encoding follow insertion order, but equality does not
/// depend on it.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<(String, HeaderValue)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds headers from decoded pairs. A repeated key keeps its first
    /// position and its last value.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, HeaderValue)>,
    {
        let mut headers = Self::new();
        for (key, value) in pairs {
            headers.insert(key, value);
        }
        headers
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<HeaderValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<HeaderValue> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    // ============================================================================
    // Typed Accessors
    // ============================================================================

    pub fn content_type(&self) -> Option<&str> {
        self.get(CONTENT_TYPE).and_then(HeaderValue::as_str)
    }

    /// Sets the content type. `None` or a blank value removes it.
    pub fn set_content_type(&mut self, value: Option<&str>) {
        match value.filter(|v| !v.trim().is_empty()) {
            Some(v) => self.insert(CONTENT_TYPE, v),
            None => {
                self.remove(CONTENT_TYPE);
            }
        }
    }

    /// Reads the priority, accepting an integer or numeric text.
    ///
    /// Fails with [`Error::InvalidPriority`] if the stored value is out of
    /// range.
    pub fn priority(&self) -> Result<Option<u8>, Error> {
        let raw = match self.get(PRIORITY) {
            None | Some(HeaderValue::Null) => return Ok(None),
            Some(HeaderValue::String(s)) => match s.trim().parse::<i64>() {
                Ok(p) => p,
                Err(_) => return Ok(None),
            },
            Some(value) => match value.as_i64() {
                Some(p) => p,
                None => return Ok(None),
            },
        };
        validate_priority(raw).map(Some)
    }

    pub fn set_priority(&mut self, value: Option<i64>) -> Result<(), Error> {
        match value {
            Some(p) => {
                let p = validate_priority(p)?;
                self.insert(PRIORITY, i64::from(p));
            }
            None => {
                self.remove(PRIORITY);
            }
        }
        Ok(())
    }

    /// Reads the time to live from a duration, timespan text, or a number of
    /// seconds.
    pub fn time_to_live(&self) -> Option<Duration> {
        match self.get(TIME_TO_LIVE)? {
            HeaderValue::Duration(d) => Some(*d),
            HeaderValue::String(s) => timespan::parse(s),
            other => {
                let secs = other.as_decimal()?;
                let millis = (secs * rust_decimal::Decimal::from(1000)).trunc();
                millis.to_u64().map(Duration::from_millis)
            }
        }
    }

    pub fn set_time_to_live(&mut self, value: Option<Duration>) {
        match value {
            Some(d) => self.insert(TIME_TO_LIVE, d),
            None => {
                self.remove(TIME_TO_LIVE);
            }
        }
    }

    /// Reads the reply address from a URI value or URI text.
    pub fn reply_to(&self) -> Option<Url> {
        match self.get(REPLY_TO)? {
            HeaderValue::Uri(u) => Some(u.clone()),
            HeaderValue::String(s) => Url::parse(s).ok(),
            _ => None,
        }
    }

    pub fn set_reply_to(&mut self, value: Option<Url>) {
        match value {
            Some(u) => self.insert(REPLY_TO, u),
            None => {
                self.remove(REPLY_TO);
            }
        }
    }
}

fn validate_priority(value: i64) -> Result<u8, Error> {
    u8::try_from(value)
        .ok()
        .filter(|p| *p <= MAX_PRIORITY)
        .ok_or(Error::InvalidPriority(value))
}

impl PartialEq for Headers {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K: Into<String>, V: Into<HeaderValue>> FromIterator<(K, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::from_pairs(iter.into_iter().map(|(k, v)| (k.into(), v.into())))
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a str, &'a HeaderValue);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a HeaderValue)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
