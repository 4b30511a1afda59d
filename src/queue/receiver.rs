use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use super::read_only::QueueMessage;
use crate::address::AddressCodec;
use crate::error::Error;
use crate::native::{Cursor, NativeError, NativeMessage, NativeQueue, NativeTransaction, PeekAction};

/// Which message labels a [`Receiver`] accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectFilter {
    Any,
    Exact(String),
    OneOf(Vec<String>),
}

impl SubjectFilter {
    pub fn matches(&self, label: Option<&str>) -> bool {
        match self {
            SubjectFilter::Any => true,
            SubjectFilter::Exact(subject) => label == Some(subject.as_str()),
            SubjectFilter::OneOf(subjects) => label.is_some_and(|l| subjects.iter().any(|s| s == l)),
        }
    }
}

enum Mode {
    Unfiltered,
    Filtered { cursor: Cursor, filter: SubjectFilter },
}

/// Peek-then-receive over one native queue.
///
/// Without a filter the receiver reads from the head of the queue. With one,
/// it walks the queue with a cursor, skipping messages whose label does not
/// match, and picks up where the last peek left off.
///
/// Receives run under a transaction when the queue is transactional. As with
/// [`QueueSender`](super::QueueSender), a rejected transaction mode is flipped
/// and the receive retried once.
pub struct Receiver {
    queue: Arc<dyn NativeQueue>,
    codec: Arc<AddressCodec>,
    mode: Mode,
    is_transactional: AtomicBool,
}

impl Receiver {
    /// Creates a receiver. [`SubjectFilter::Any`] reads without a cursor.
    pub fn new(queue: Arc<dyn NativeQueue>, codec: Arc<AddressCodec>, filter: SubjectFilter) -> Result<Self, Error> {
        let is_transactional = queue.is_transactional()?;
        let mode = match filter {
            SubjectFilter::Any => Mode::Unfiltered,
            filter => Mode::Filtered {
                cursor: queue.create_cursor()?,
                filter,
            },
        };
        Ok(Self {
            queue,
            codec,
            mode,
            is_transactional: AtomicBool::new(is_transactional),
        })
    }

    pub fn filter(&self) -> SubjectFilter {
        match &self.mode {
            Mode::Unfiltered => SubjectFilter::Any,
            Mode::Filtered { filter, .. } => filter.clone(),
        }
    }

    pub fn is_transactional(&self) -> bool {
        self.is_transactional.load(Ordering::SeqCst)
    }

    /// Waits up to `timeout` for a matching message without removing it.
    pub fn peek(&mut self, timeout: Duration) -> Result<Option<NativeMessage>, Error> {
        let (cursor, filter) = match &self.mode {
            Mode::Unfiltered => return ok_unless_timeout(self.queue.peek(timeout, None)),
            Mode::Filtered { cursor, filter } => (cursor, filter),
        };

        let started = Instant::now();
        let mut action = PeekAction::Current;
        loop {
            // Once the time is up, keep walking only what is already queued.
            let remaining = timeout.saturating_sub(started.elapsed());
            let Some(msg) = ok_unless_timeout(self.queue.peek(remaining, Some((cursor, action))))? else {
                return Ok(None);
            };
            if filter.matches(msg.label.as_deref()) {
                trace!(label = ?msg.label, "Peeked matching message");
                return Ok(Some(msg));
            }
            trace!(label = ?msg.label, "Skipping message");
            action = PeekAction::Next;
        }
    }

    /// Removes the message found by the last [`peek()`](Self::peek) without
    /// waiting. Returns `None` if it has already gone.
    pub fn receive(&mut self) -> Result<Option<QueueMessage>, Error> {
        match self.receive_once() {
            Err(e) if e.is_transaction_usage() => {
                let now = !self.is_transactional.fetch_xor(true, Ordering::SeqCst);
                warn!(address = self.queue.address(), transactional = now, "Transaction mode rejected, retrying receive");
                self.receive_once()
            }
            result => result,
        }
    }

    fn receive_once(&mut self) -> Result<Option<QueueMessage>, Error> {
        // The peeked message may have been taken by another consumer, leaving
        // the cursor on one that does not match.
        if let Mode::Filtered { cursor, filter } = &self.mode {
            match ok_unless_timeout(self.queue.peek(Duration::ZERO, Some((cursor, PeekAction::Current))))? {
                Some(msg) if filter.matches(msg.label.as_deref()) => {}
                other => {
                    trace!(label = ?other.and_then(|m| m.label), "Peeked message is gone");
                    return Ok(None);
                }
            }
        }

        let mut txn = if self.is_transactional() {
            Some(self.queue.begin_transaction()?)
        } else {
            None
        };
        let cursor = match &self.mode {
            Mode::Unfiltered => None,
            Mode::Filtered { cursor, .. } => Some(cursor),
        };

        let result = match txn.as_mut() {
            Some(t) => self.queue.receive(Duration::ZERO, cursor, Some(t.as_mut())),
            None => self.queue.receive(Duration::ZERO, cursor, None),
        };
        let native = match result {
            Ok(native) => native,
            Err(e) => {
                if let Some(mut t) = txn {
                    let _ = t.abort();
                }
                // Another consumer took the peeked message.
                if e.is_timeout() {
                    return Ok(None);
                }
                return Err(e.into());
            }
        };

        if let Mode::Filtered { filter, .. } = &self.mode {
            if !filter.matches(native.label.as_deref()) {
                return self.put_back(native, txn).map(|()| None);
            }
        }
        debug!(label = ?native.label, transactional = txn.is_some(), "Received message");
        Ok(Some(QueueMessage::new(native, txn, self.codec.clone())))
    }

    /// Returns a message the filter does not accept to the queue. A
    /// transactional receive is aborted; otherwise the message is sent again.
    fn put_back(&self, native: NativeMessage, txn: Option<Box<dyn NativeTransaction>>) -> Result<(), Error> {
        match txn {
            Some(mut txn) => {
                debug!(label = ?native.label, "Received a message outside the filter, aborting");
                txn.abort()?;
            }
            None => {
                warn!(label = ?native.label, "Received a message outside the filter, requeueing");
                self.queue.send(native, None)?;
            }
        }
        Ok(())
    }

    /// Peeks then receives.
    pub fn poll(&mut self, timeout: Duration) -> Result<Option<QueueMessage>, Error> {
        if self.peek(timeout)?.is_none() {
            return Ok(None);
        }
        self.receive()
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        if let Mode::Filtered { cursor, .. } = &self.mode {
            self.queue.close_cursor(cursor);
        }
    }
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("address", &self.queue.address())
            .field("filter", &self.filter())
            .field("transactional", &self.is_transactional())
            .finish()
    }
}

fn ok_unless_timeout(result: Result<NativeMessage, NativeError>) -> Result<Option<NativeMessage>, Error> {
    match result {
        Ok(msg) => Ok(Some(msg)),
        Err(e) if e.is_timeout() => Ok(None),
        Err(e) => Err(e.into()),
    }
}
