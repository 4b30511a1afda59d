//! Native transport interfaces.
//!
//! The queue and bus backends talk to their transports only through the traits
//! in this module. [`MemoryQueueSystem`] and [`MemoryBus`] are complete
//! in-process implementations, used by the tests and the demo.

mod bus;
mod memory;
mod memory_bus;
mod queue;

pub use bus::{BusConnector, BusField, BusListener, BusMessage, BusMode, BusTransport, FieldValue, ServiceConfig};
pub use memory::{MemoryQueue, MemoryQueueSystem, MemoryTransaction};
pub use memory_bus::{subject_matches, MemoryBus};
pub use queue::{
    Cursor, NativeMessage, NativeQueue, NativeTransaction, PeekAction, QueueOpener, NORMAL_PRIORITY,
};

use std::fmt;
use thiserror::Error;

/// Category of a native failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeErrorKind {
    /// Nothing arrived within the timeout.
    Timeout,
    /// The transaction mode of the call does not match the queue.
    TransactionUsage,
    /// The handle or listener has been closed.
    Closed,
    /// The queue or service does not exist.
    NotFound,
    Other,
}

impl fmt::Display for NativeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            NativeErrorKind::Timeout => "timeout",
            NativeErrorKind::TransactionUsage => "transaction usage",
            NativeErrorKind::Closed => "closed",
            NativeErrorKind::NotFound => "not found",
            NativeErrorKind::Other => "other",
        };
        f.write_str(text)
    }
}

/// A failure reported by a native transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct NativeError {
    pub kind: NativeErrorKind,
    pub message: String,
}

impl NativeError {
    pub fn new(kind: NativeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout() -> Self {
        Self::new(NativeErrorKind::Timeout, "timed out")
    }

    pub fn closed(what: &str) -> Self {
        Self::new(NativeErrorKind::Closed, format!("{what} is closed"))
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == NativeErrorKind::Timeout
    }

    pub fn is_transaction_usage(&self) -> bool {
        self.kind == NativeErrorKind::TransactionUsage
    }
}
