use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use super::{to_bus, to_bus_subject, BusReceivedMessage};
use crate::error::Error;
use crate::factory::{Messaging, Received};
use crate::message::Message;
use crate::native::{BusListener, BusTransport};

/// Point-to-point access to one bus subject.
///
/// Listening starts on the first [`receive()`](Messaging::receive), so an
/// instance used only for sending queues nothing.
pub struct BusMessaging {
    address: Url,
    transport: Arc<dyn BusTransport>,
    listener: Mutex<Option<Arc<dyn BusListener>>>,
    closed: AtomicBool,
}

impl BusMessaging {
    pub fn new(address: Url, transport: Arc<dyn BusTransport>) -> Self {
        Self {
            address,
            transport,
            listener: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listener.lock().unwrap().is_some()
    }

    fn check_open(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::ObjectDisposed("bus messaging"))
        } else {
            Ok(())
        }
    }

    fn listener(&self) -> Result<Arc<dyn BusListener>, Error> {
        let mut slot = self.listener.lock().unwrap();
        if let Some(listener) = slot.as_ref() {
            return Ok(listener.clone());
        }
        let subject = to_bus_subject(self.address.path());
        if subject.is_empty() {
            return Err(Error::InvalidSubject(self.address.path().to_string()));
        }
        let listener = self.transport.create_listener(&subject)?;
        debug!(subject = %subject, "Started listening");
        *slot = Some(listener.clone());
        Ok(listener)
    }
}

impl Messaging for BusMessaging {
    fn address(&self) -> &Url {
        &self.address
    }

    #[instrument(skip(self, msg), fields(address = %self.address))]
    fn send(&self, msg: Message) -> Result<(), Error> {
        self.check_open()?;
        let bus = to_bus(msg, &self.address)?;
        debug!(subject = %bus.send_subject, "Publishing");
        self.transport.send(bus)?;
        Ok(())
    }

    #[instrument(skip(self), fields(address = %self.address))]
    fn receive(&self, timeout: Duration) -> Result<Received, Error> {
        self.check_open()?;
        let listener = self.listener()?;
        if !listener.peek(timeout)? {
            return Ok(None);
        }
        Ok(listener
            .take()
            .map(|msg| Box::new(BusReceivedMessage::new(msg, listener.clone(), self.address.clone())) as _))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(listener) = self.listener.lock().unwrap().take() {
            listener.close();
        }
        self.transport.close();
    }
}
