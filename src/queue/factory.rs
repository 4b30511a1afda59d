use ::config::Config;
use std::sync::Arc;
use tracing::{debug, instrument};
use url::Url;

use super::{QueueCache, QueueMessaging};
use crate::address::{require_queue_name, AddressCodec, QueueDetails};
use crate::dispatch::QueueDispatcher;
use crate::error::Error;
use crate::factory::{Messaging, MessagingFactory, MultiSubjectMessaging};
use crate::native::{NativeQueue, QueueOpener};

/// Creates queue messaging for `msmq*` addresses.
///
/// Addresses with another scheme are left to other factories. An `msmq*`
/// address that does not map onto a queue fails with
/// [`Error::InvalidAddress`].
///
/// Every messaging object it creates shares one [`QueueCache`], so each native
/// queue is opened once.
///
/// # Configuration Keys
///
/// - `machine_name`: See [`AddressCodec::new()`]
/// - `queue_cache_ttl_secs`: See [`QueueCache::new()`]
pub struct QueueMessagingFactory {
    codec: Arc<AddressCodec>,
    cache: Arc<QueueCache>,
}

impl QueueMessagingFactory {
    pub fn new(config: &Config, opener: Arc<dyn QueueOpener>) -> Result<Self, Error> {
        Self::new_named(config, "", opener)
    }

    /// Creates a factory with configuration namespacing, see
    /// [`new()`](Self::new).
    pub fn new_named(config: &Config, name: &str, opener: Arc<dyn QueueOpener>) -> Result<Self, Error> {
        Ok(Self {
            codec: Arc::new(AddressCodec::new_named(config, name)?),
            cache: Arc::new(QueueCache::new_named(config, name, opener)?),
        })
    }

    pub fn codec(&self) -> &Arc<AddressCodec> {
        &self.codec
    }

    pub fn cache(&self) -> &Arc<QueueCache> {
        &self.cache
    }

    /// Closes every cached queue handle.
    pub fn close(&self) {
        self.cache.close();
    }

    fn open(&self, address: &Url) -> Result<Option<(QueueDetails, Arc<dyn NativeQueue>)>, Error> {
        if !address.scheme().starts_with("msmq") {
            debug!("Not a queue address");
            return Ok(None);
        }
        let details = require_queue_name(address)?;
        let queue = self.cache.get_or_add(&details.queue_name)?;
        Ok(Some((details, queue)))
    }
}

impl MessagingFactory for QueueMessagingFactory {
    #[instrument(skip(self), fields(address = %address))]
    fn try_create(&self, address: &Url) -> Result<Option<Box<dyn Messaging>>, Error> {
        let Some((details, queue)) = self.open(address)? else {
            return Ok(None);
        };
        let messaging = QueueMessaging::new(address.clone(), details, queue, self.codec.clone(), self.cache.clone())?;
        Ok(Some(Box::new(messaging)))
    }

    #[instrument(skip(self), fields(address = %address))]
    fn try_create_multi_subject(&self, address: &Url) -> Result<Option<Box<dyn MultiSubjectMessaging>>, Error> {
        let Some((details, queue)) = self.open(address)? else {
            return Ok(None);
        };
        let dispatcher = QueueDispatcher::new(address.clone(), details, queue, self.codec.clone(), self.cache.clone())?;
        Ok(Some(Box::new(dispatcher)))
    }
}
