use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::cache::QueueCache;
use super::convert::to_native;
use crate::address::QueueDetails;
use crate::error::Error;
use crate::message::Message;
use crate::native::{NativeMessage, NativeQueue};

/// Sends messages to one native queue.
///
/// Starts in the transaction mode the queue reports. If the transport then
/// rejects that mode, the mode is flipped and the send retried once; the
/// flipped mode sticks for later sends.
#[derive(Debug)]
pub struct QueueSender {
    queue: Arc<dyn NativeQueue>,
    details: QueueDetails,
    cache: Arc<QueueCache>,
    is_transactional: AtomicBool,
}

impl QueueSender {
    pub fn new(queue: Arc<dyn NativeQueue>, details: QueueDetails, cache: Arc<QueueCache>) -> Result<Self, Error> {
        let is_transactional = queue.is_transactional()?;
        Ok(Self {
            queue,
            details,
            cache,
            is_transactional: AtomicBool::new(is_transactional),
        })
    }

    pub fn is_transactional(&self) -> bool {
        self.is_transactional.load(Ordering::SeqCst)
    }

    #[instrument(skip(self, msg), fields(address = %self.details.queue_name))]
    pub fn send(&self, msg: Message) -> Result<(), Error> {
        let native = to_native(msg, &self.details, &self.cache)?;
        match self.send_native(native.clone()) {
            Err(e) if e.is_transaction_usage() => {
                let now = !self.is_transactional.fetch_xor(true, Ordering::SeqCst);
                warn!(transactional = now, "Transaction mode rejected, retrying send");
                self.send_native(native)
            }
            result => result,
        }
    }

    fn send_native(&self, native: NativeMessage) -> Result<(), Error> {
        if !self.is_transactional() {
            self.queue.send(native, None)?;
            debug!("Sent message");
            return Ok(());
        }

        let mut txn = self.queue.begin_transaction()?;
        if let Err(e) = self.queue.send(native, Some(txn.as_mut())) {
            let _ = txn.abort();
            return Err(e.into());
        }
        txn.commit()?;
        debug!("Sent message in transaction");
        Ok(())
    }
}
