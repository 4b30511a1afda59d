use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use super::{QueueCache, QueueSender, Receiver, SubjectFilter};
use crate::address::{AddressCodec, QueueDetails};
use crate::error::Error;
use crate::factory::{Messaging, Received};
use crate::message::Message;
use crate::native::NativeQueue;

/// Point-to-point access to one queue URI.
///
/// If the URI names a subject, only messages labelled with it are received.
pub struct QueueMessaging {
    address: Url,
    details: QueueDetails,
    sender: QueueSender,
    receiver: Mutex<Receiver>,
    closed: AtomicBool,
}

impl QueueMessaging {
    pub fn new(
        address: Url,
        details: QueueDetails,
        queue: Arc<dyn NativeQueue>,
        codec: Arc<AddressCodec>,
        cache: Arc<QueueCache>,
    ) -> Result<Self, Error> {
        let filter = match &details.subject {
            Some(subject) => SubjectFilter::Exact(subject.clone()),
            None => SubjectFilter::Any,
        };
        let receiver = Receiver::new(queue.clone(), codec, filter)?;
        let sender = QueueSender::new(queue, details.clone(), cache)?;
        Ok(Self {
            address,
            details,
            sender,
            receiver: Mutex::new(receiver),
            closed: AtomicBool::new(false),
        })
    }

    pub fn details(&self) -> &QueueDetails {
        &self.details
    }

    fn check_open(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::ObjectDisposed("queue messaging"))
        } else {
            Ok(())
        }
    }
}

impl Messaging for QueueMessaging {
    fn address(&self) -> &Url {
        &self.address
    }

    fn send(&self, msg: Message) -> Result<(), Error> {
        self.check_open()?;
        self.sender.send(msg)
    }

    #[instrument(skip(self), fields(address = %self.address))]
    fn receive(&self, timeout: Duration) -> Result<Received, Error> {
        self.check_open()?;
        let received = self.receiver.lock().unwrap().poll(timeout)?;
        Ok(received.map(|msg| Box::new(msg) as _))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(address = %self.address, "Closed queue messaging");
        }
    }
}
