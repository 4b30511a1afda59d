use downcast_rs::{impl_downcast, Downcast};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use super::NativeError;
use crate::message::Body;

/// Priority of a message that did not ask for one.
pub const NORMAL_PRIORITY: u8 = 3;

/// A message in native queue form.
#[derive(Debug, Clone)]
pub struct NativeMessage {
    /// The subject, used as the filter key on shared queues.
    pub label: Option<String>,
    pub body: Option<Body>,
    /// Encoded extension headers.
    pub extension: Vec<u8>,
    pub priority: u8,
    /// `None` means the message never expires.
    pub time_to_be_received: Option<Duration>,
    pub response_queue: Option<Arc<dyn NativeQueue>>,
    pub recoverable: bool,
}

impl Default for NativeMessage {
    fn default() -> Self {
        Self {
            label: None,
            body: None,
            extension: Vec::new(),
            priority: NORMAL_PRIORITY,
            time_to_be_received: None,
            response_queue: None,
            recoverable: true,
        }
    }
}

/// Where a cursor peek looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeekAction {
    /// The message under the cursor, or the first one after it if that
    /// message is gone.
    Current,
    /// The message after the cursor.
    Next,
}

/// A position in a queue, owned by the queue that created it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor {
    id: u64,
}

impl Cursor {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// An open native queue handle.
///
/// Blocking calls report an empty queue as a [`Timeout`] error once the
/// timeout elapses.
///
/// [`Timeout`]: super::NativeErrorKind::Timeout
pub trait NativeQueue: Send + Sync + Debug {
    /// The native address the handle was opened with.
    fn address(&self) -> &str;

    /// Asks the transport whether the queue is transactional.
    fn is_transactional(&self) -> Result<bool, NativeError>;

    /// The multicast group the queue is bound to, if any.
    fn multicast_address(&self) -> Option<String>;

    /// Returns a copy of a message without removing it. With a cursor, moves
    /// the cursor to the message returned.
    fn peek(
        &self,
        timeout: Duration,
        cursor: Option<(&Cursor, PeekAction)>,
    ) -> Result<NativeMessage, NativeError>;

    /// Removes and returns a message, from the head or from under the cursor.
    fn receive(
        &self,
        timeout: Duration,
        cursor: Option<&Cursor>,
        txn: Option<&mut dyn NativeTransaction>,
    ) -> Result<NativeMessage, NativeError>;

    fn send(&self, msg: NativeMessage, txn: Option<&mut dyn NativeTransaction>) -> Result<(), NativeError>;

    fn create_cursor(&self) -> Result<Cursor, NativeError>;

    fn close_cursor(&self, cursor: &Cursor);

    fn begin_transaction(&self) -> Result<Box<dyn NativeTransaction>, NativeError>;

    /// Releases the handle. Further calls fail with a closed error. Closing
    /// an already closed handle has no effect.
    fn close(&self);
}

/// A native transaction.
pub trait NativeTransaction: Send + Debug + Downcast {
    fn commit(&mut self) -> Result<(), NativeError>;
    fn abort(&mut self) -> Result<(), NativeError>;
}

impl_downcast!(NativeTransaction);

/// Opens native queue handles by address.
pub trait QueueOpener: Send + Sync + Debug {
    fn open(&self, address: &str) -> Result<Arc<dyn NativeQueue>, NativeError>;
}
