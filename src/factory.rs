//! Backend-neutral messaging traits and the composite factory.

use futures::channel::oneshot;
use std::future::Future;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::dispatch::Callback;
use crate::error::Error;
use crate::message::{Message, ReadOnlyMessage};

/// Result of a receive: `None` when nothing arrived in time.
pub type Received = Option<Box<dyn ReadOnlyMessage>>;

// ============================================================================
// Messaging Traits
// ============================================================================

/// Point-to-point access to one address.
pub trait Messaging: Send + Sync {
    fn address(&self) -> &Url;

    /// Sends a message to the address. The message is consumed.
    fn send(&self, msg: Message) -> Result<(), Error>;

    /// Waits up to `timeout` for a message on the address.
    fn receive(&self, timeout: Duration) -> Result<Received, Error>;

    /// Releases the backend resources. Later calls fail with
    /// [`Error::ObjectDisposed`].
    fn close(&self);
}

/// Many subscriptions served from one address by a caller-driven dispatch
/// loop.
pub trait MultiSubjectMessaging: Send + Sync {
    fn address(&self) -> &Url;

    fn send(&self, msg: Message) -> Result<(), Error>;

    /// Registers a callback for a subject (`/a/b`). `None` means the subject
    /// of the address itself.
    fn subscribe(&self, subject: Option<&str>, callback: Callback) -> Result<(), Error>;

    /// Removes a subscription. The callback is matched by identity, so pass a
    /// clone of the `Arc` given to [`subscribe()`](Self::subscribe). Returns
    /// `false` if no such subscription exists.
    fn unsubscribe(&self, subject: Option<&str>, callback: &Callback) -> Result<bool, Error>;

    /// Delivers at most one message to one matching subscription, waiting up
    /// to `timeout`. Returns `true` if a callback ran.
    fn dispatch_message(&self, timeout: Duration) -> Result<bool, Error>;

    fn close(&self);
}

/// Creates messaging objects for the addresses a backend understands.
///
/// `Ok(None)` means the address belongs to some other backend.
pub trait MessagingFactory: Send + Sync {
    fn try_create(&self, address: &Url) -> Result<Option<Box<dyn Messaging>>, Error>;

    fn try_create_multi_subject(&self, address: &Url) -> Result<Option<Box<dyn MultiSubjectMessaging>>, Error>;
}

/// Runs [`Messaging::receive()`] on a helper thread and resolves when it
/// returns.
pub fn receive_async(
    messaging: Arc<dyn Messaging>,
    timeout: Duration,
) -> impl Future<Output = Result<Received, Error>> {
    let (tx, rx) = oneshot::channel();
    let spawned = thread::Builder::new()
        .name("mqlink-receive".to_string())
        .spawn(move || {
            let result = messaging.receive(timeout);
            if tx.send(result).is_err() {
                debug!("Receive completed after the caller went away");
            }
        });

    async move {
        if let Err(e) = spawned {
            return Err(Error::Io(e));
        }
        match rx.await {
            Ok(result) => result,
            Err(oneshot::Canceled) => Err(Error::ObjectDisposed("receive thread")),
        }
    }
}

// ============================================================================
// CompositeMessagingFactory
// ============================================================================

/// Tries each factory in order; the first that recognises the address wins.
///
/// A factory that reports [`Error::InvalidAddress`] is treated like one that
/// returned `Ok(None)`. Any other error stops the search.
pub struct CompositeMessagingFactory {
    factories: Vec<Box<dyn MessagingFactory>>,
}

impl CompositeMessagingFactory {
    /// Fails with [`Error::NoFactories`] if `factories` is empty.
    pub fn new(factories: Vec<Box<dyn MessagingFactory>>) -> Result<Self, Error> {
        if factories.is_empty() {
            return Err(Error::NoFactories);
        }
        Ok(Self { factories })
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Like [`try_create()`](MessagingFactory::try_create), but an address no
    /// factory recognises is an error.
    pub fn create(&self, address: &Url) -> Result<Box<dyn Messaging>, Error> {
        self.try_create(address)?.ok_or_else(|| unrecognised(address))
    }

    pub fn create_multi_subject(&self, address: &Url) -> Result<Box<dyn MultiSubjectMessaging>, Error> {
        self.try_create_multi_subject(address)?
            .ok_or_else(|| unrecognised(address))
    }

    fn first<T, F>(&self, address: &Url, create: F) -> Result<Option<T>, Error>
    where
        F: Fn(&dyn MessagingFactory) -> Result<Option<T>, Error>,
    {
        for (index, factory) in self.factories.iter().enumerate() {
            match create(factory.as_ref()) {
                Ok(Some(created)) => {
                    info!(address = %address, index, "Created messaging");
                    return Ok(Some(created));
                }
                Ok(None) => {}
                Err(Error::InvalidAddress { reason, .. }) => {
                    debug!(address = %address, index, reason = %reason, "Factory rejected address");
                }
                Err(e) => {
                    warn!(address = %address, index, error = %e, "Factory failed");
                    return Err(e);
                }
            }
        }
        Ok(None)
    }
}

impl MessagingFactory for CompositeMessagingFactory {
    #[instrument(skip(self), fields(address = %address))]
    fn try_create(&self, address: &Url) -> Result<Option<Box<dyn Messaging>>, Error> {
        self.first(address, |f| f.try_create(address))
    }

    #[instrument(skip(self), fields(address = %address))]
    fn try_create_multi_subject(&self, address: &Url) -> Result<Option<Box<dyn MultiSubjectMessaging>>, Error> {
        self.first(address, |f| f.try_create_multi_subject(address))
    }
}

fn unrecognised(address: &Url) -> Error {
    Error::InvalidAddress {
        uri: address.to_string(),
        reason: "no messaging factory recognises this address".to_string(),
    }
}
