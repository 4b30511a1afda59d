//! The transport-neutral message model.
//!
//! A [`Message`] is built by the application and consumed by
//! [`Messaging::send()`](crate::Messaging::send). Received messages are exposed
//! through the [`ReadOnlyMessage`] trait, implemented by each backend over its
//! native message.

mod headers;

pub use headers::{content_types, Headers, CONTENT_TYPE, MAX_PRIORITY, PRIORITY, REPLY_TO, TIME_TO_LIVE};

use bytes::Bytes;
use downcast_rs::{impl_downcast, Downcast};
use std::fmt::Debug;

use crate::error::Error;

// ============================================================================
// Body
// ============================================================================

/// A message payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Bytes(Bytes),
    Text(String),
}

impl Body {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Bytes(b) => b,
            Body::Text(t) => t.as_bytes(),
        }
    }

    /// Returns the text of a text body, or of a byte body holding valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Bytes(b) => std::str::from_utf8(b).ok(),
            Body::Text(t) => Some(t),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for Body {
    fn from(value: &str) -> Self {
        Body::Text(value.to_string())
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Body::Text(value)
    }
}

impl From<Bytes> for Body {
    fn from(value: Bytes) -> Self {
        Body::Bytes(value)
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Body::Bytes(value.into())
    }
}

// ============================================================================
// Message
// ============================================================================

/// An outgoing message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    subject: Option<String>,
    headers: Headers,
    body: Option<Body>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`set_subject()`](Self::set_subject).
    pub fn with_subject(mut self, subject: &str) -> Result<Self, Error> {
        self.set_subject(Some(subject))?;
        Ok(self)
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, key: &str, value: impl Into<crate::HeaderValue>) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Sets the subject, which must start with `/`.
    pub fn set_subject(&mut self, subject: Option<&str>) -> Result<(), Error> {
        match subject {
            Some(s) if !s.starts_with('/') => Err(Error::InvalidSubject(s.to_string())),
            s => {
                self.subject = s.map(str::to_string);
                Ok(())
            }
        }
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn set_body(&mut self, body: Option<Body>) {
        self.body = body;
    }

    pub(crate) fn into_parts(self) -> (Option<String>, Headers, Option<Body>) {
        (self.subject, self.headers, self.body)
    }
}

// ============================================================================
// ReadOnlyMessage Trait
// ============================================================================

/// A received message.
///
/// Owns the native message and, for transactional receives, the transaction
/// it was received under. [`acknowledge()`](Self::acknowledge) commits the
/// transaction; dropping an unacknowledged message aborts it so the transport
/// redelivers. Use `downcast_ref::<T>()` to reach backend-specific details.
pub trait ReadOnlyMessage: Send + Sync + Debug + Downcast {
    fn subject(&self) -> Option<&str>;

    /// Returns `true` if any header would be reported. Does not decode them.
    fn has_headers(&self) -> bool;

    /// Headers, decoded on first access and cached.
    fn headers(&self) -> Result<&Headers, Error>;

    fn body(&self) -> Option<&Body>;

    /// Confirms the message. Calling it again has no effect.
    fn acknowledge(&self) -> Result<(), Error>;

    /// Copies the message into a new outgoing [`Message`], e.g. to forward it.
    fn to_message(&self) -> Result<Message, Error> {
        let mut msg = Message::new();
        msg.set_subject(self.subject())?;
        *msg.headers_mut() = self.headers()?.clone();
        msg.set_body(self.body().cloned());
        Ok(msg)
    }
}

impl_downcast!(ReadOnlyMessage);
