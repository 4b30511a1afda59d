use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::debug;
use url::Url;

use super::convert::{body_from_bus, headers_from_bus, BODY_FIELD};
use super::from_bus_subject;
use crate::error::Error;
use crate::message::{Body, Headers, ReadOnlyMessage};
use crate::native::{BusListener, BusMessage};

/// A message received from the bus.
///
/// Acknowledging a certified message confirms it to the sender; for other
/// messages it does nothing.
pub struct BusReceivedMessage {
    msg: BusMessage,
    listener: Arc<dyn BusListener>,
    source: Url,
    subject: String,
    body: Option<Body>,
    headers: OnceLock<Headers>,
    acknowledged: AtomicBool,
}

impl BusReceivedMessage {
    pub fn new(msg: BusMessage, listener: Arc<dyn BusListener>, source: Url) -> Self {
        Self {
            subject: from_bus_subject(&msg.send_subject),
            body: body_from_bus(&msg),
            msg,
            listener,
            source,
            headers: OnceLock::new(),
            acknowledged: AtomicBool::new(false),
        }
    }

    /// The underlying bus message.
    pub fn native(&self) -> &BusMessage {
        &self.msg
    }

    pub fn is_certified(&self) -> bool {
        self.msg.sequence.is_some()
    }
}

impl ReadOnlyMessage for BusReceivedMessage {
    fn subject(&self) -> Option<&str> {
        Some(&self.subject)
    }

    fn has_headers(&self) -> bool {
        self.msg.reply_subject.is_some() || self.msg.fields.iter().any(|f| f.name != BODY_FIELD)
    }

    fn headers(&self) -> Result<&Headers, Error> {
        Ok(self.headers.get_or_init(|| headers_from_bus(&self.msg, &self.source)))
    }

    fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    fn acknowledge(&self) -> Result<(), Error> {
        if !self.is_certified() || self.acknowledged.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(e) = self.listener.confirm(&self.msg) {
            self.acknowledged.store(false, Ordering::SeqCst);
            return Err(e.into());
        }
        debug!(subject = %self.msg.send_subject, sequence = ?self.msg.sequence, "Confirmed message");
        Ok(())
    }
}

impl std::fmt::Debug for BusReceivedMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusReceivedMessage")
            .field("subject", &self.subject)
            .field("sequence", &self.msg.sequence)
            .finish()
    }
}
