use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, warn};

use super::convert::headers_from_native;
use crate::address::AddressCodec;
use crate::error::Error;
use crate::headers::ParseError;
use crate::message::{Body, Headers, ReadOnlyMessage};
use crate::native::{NativeMessage, NativeTransaction};

/// A message received from a native queue.
///
/// Holds the transaction of a transactional receive until
/// [`acknowledge()`](ReadOnlyMessage::acknowledge) commits it. Dropping the
/// message unacknowledged aborts the transaction, returning the message to
/// the queue.
pub struct QueueMessage {
    native: NativeMessage,
    codec: Arc<AddressCodec>,
    headers: OnceLock<Result<Headers, ParseError>>,
    txn: Mutex<Option<Box<dyn NativeTransaction>>>,
}

impl QueueMessage {
    pub(crate) fn new(native: NativeMessage, txn: Option<Box<dyn NativeTransaction>>, codec: Arc<AddressCodec>) -> Self {
        Self {
            native,
            codec,
            headers: OnceLock::new(),
            txn: Mutex::new(txn),
        }
    }

    /// The underlying native message.
    pub fn native(&self) -> &NativeMessage {
        &self.native
    }

    /// Returns `true` while a transaction is waiting for acknowledgement.
    pub fn is_pending(&self) -> bool {
        self.txn.lock().unwrap().is_some()
    }
}

impl ReadOnlyMessage for QueueMessage {
    fn subject(&self) -> Option<&str> {
        self.native.label.as_deref()
    }

    /// Always `true`: `Priority` is reported for every queue message.
    fn has_headers(&self) -> bool {
        true
    }

    fn headers(&self) -> Result<&Headers, Error> {
        self.headers
            .get_or_init(|| headers_from_native(&self.native, &self.codec))
            .as_ref()
            .map_err(|e| Error::Parse(e.clone()))
    }

    fn body(&self) -> Option<&Body> {
        self.native.body.as_ref()
    }

    fn acknowledge(&self) -> Result<(), Error> {
        let txn = self.txn.lock().unwrap().take();
        if let Some(mut txn) = txn {
            txn.commit()?;
            debug!(label = ?self.native.label, "Committed receive");
        }
        Ok(())
    }
}

impl Drop for QueueMessage {
    fn drop(&mut self) {
        let txn = match self.txn.get_mut() {
            Ok(txn) => txn.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(mut txn) = txn {
            match txn.abort() {
                Ok(()) => debug!(label = ?self.native.label, "Aborted unacknowledged receive"),
                Err(e) => warn!(error = %e, "Failed to abort unacknowledged receive"),
            }
        }
    }
}

impl std::fmt::Debug for QueueMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueMessage")
            .field("label", &self.native.label)
            .field("priority", &self.native.priority)
            .field("pending", &self.is_pending())
            .finish()
    }
}
