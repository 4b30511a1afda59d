use ::config::Config;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, trace, warn};

use crate::error::Error;
use crate::native::{Cursor, NativeError, NativeMessage, NativeQueue, NativeTransaction, PeekAction, QueueOpener};

struct CacheEntry {
    queue: Arc<dyn NativeQueue>,
    last_access: Instant,
}

/// Open native queue handles, keyed by native address.
///
/// Entries expire after a sliding period without access (20 minutes unless
/// configured otherwise). The handles given out close the native queue when
/// the last of them is dropped, so an evicted handle is closed right away if
/// nobody holds it, and otherwise when its last holder lets go.
/// [`close()`](Self::close) closes every handle still cached.
///
/// Addresses are compared ignoring ASCII case.
pub struct QueueCache {
    opener: Arc<dyn QueueOpener>,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
    closed: AtomicBool,
}

impl QueueCache {
    /// Creates a cache from configuration.
    ///
    /// # Configuration Keys
    ///
    /// - `queue_cache_ttl_secs`: Sliding expiry in seconds (defaults to 1200)
    pub fn new(config: &Config, opener: Arc<dyn QueueOpener>) -> Result<Self, Error> {
        Self::new_named(config, "", opener)
    }

    /// Creates a cache with configuration namespacing, see [`new()`](Self::new).
    pub fn new_named(config: &Config, name: &str, opener: Arc<dyn QueueOpener>) -> Result<Self, Error> {
        let ttl = crate::config::queue_cache_ttl(config, name)?;
        Ok(Self::with_ttl(opener, ttl))
    }

    pub fn with_ttl(opener: Arc<dyn QueueOpener>, ttl: Duration) -> Self {
        Self {
            opener,
            ttl,
            entries: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of cached handles, expired or not.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the handle for an address, opening it on first use.
    ///
    /// The handle is opened without holding the cache lock. If another caller
    /// cached a handle for the same address in the meantime, that one is
    /// returned and the freshly opened one is closed.
    #[instrument(skip(self))]
    pub fn get_or_add(&self, address: &str) -> Result<Arc<dyn NativeQueue>, Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ObjectDisposed("queue cache"));
        }
        let key = address.to_ascii_lowercase();
        self.evict_expired();

        if let Some(entry) = self.entries.lock().unwrap().get_mut(&key) {
            entry.last_access = Instant::now();
            return Ok(entry.queue.clone());
        }

        let opened = self.opener.open(address)?;

        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(&key) {
            warn!(address, "Lost race opening queue, closing duplicate handle");
            entry.last_access = Instant::now();
            let existing = entry.queue.clone();
            drop(entries);
            opened.close();
            return Ok(existing);
        }
        info!(address, "Cached queue handle");
        let queue: Arc<dyn NativeQueue> = Arc::new(CachedQueue { inner: opened });
        entries.insert(
            key,
            CacheEntry {
                queue: queue.clone(),
                last_access: Instant::now(),
            },
        );
        Ok(queue)
    }

    /// Removes entries not accessed within the expiry period. Returns how many
    /// were removed.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<(String, CacheEntry)> = {
            let mut entries = self.entries.lock().unwrap();
            let keys: Vec<String> = entries
                .iter()
                .filter(|(_, e)| now.duration_since(e.last_access) >= self.ttl)
                .map(|(k, _)| k.clone())
                .collect();
            keys.into_iter()
                .filter_map(|k| entries.remove(&k).map(|e| (k, e)))
                .collect()
        };

        let count = expired.len();
        for (address, entry) in expired {
            let held = Arc::strong_count(&entry.queue) - 1;
            debug!(address = %address, held, "Evicted queue handle");
        }
        count
    }

    /// Closes every cached handle. Later lookups fail with
    /// [`Error::ObjectDisposed`].
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let entries: Vec<CacheEntry> = self.entries.lock().unwrap().drain().map(|(_, e)| e).collect();
        info!(count = entries.len(), "Closing queue cache");
        for entry in entries {
            entry.queue.close();
        }
    }
}

impl std::fmt::Debug for QueueCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueCache")
            .field("ttl", &self.ttl)
            .field("len", &self.len())
            .finish()
    }
}

// ============================================================================
// CachedQueue
// ============================================================================

/// A cached handle. Closes the native queue once the cache and every
/// borrower have dropped it.
#[derive(Debug)]
struct CachedQueue {
    inner: Arc<dyn NativeQueue>,
}

impl NativeQueue for CachedQueue {
    fn address(&self) -> &str {
        self.inner.address()
    }

    fn is_transactional(&self) -> Result<bool, NativeError> {
        self.inner.is_transactional()
    }

    fn multicast_address(&self) -> Option<String> {
        self.inner.multicast_address()
    }

    fn peek(
        &self,
        timeout: Duration,
        cursor: Option<(&Cursor, PeekAction)>,
    ) -> Result<NativeMessage, NativeError> {
        self.inner.peek(timeout, cursor)
    }

    fn receive(
        &self,
        timeout: Duration,
        cursor: Option<&Cursor>,
        txn: Option<&mut dyn NativeTransaction>,
    ) -> Result<NativeMessage, NativeError> {
        self.inner.receive(timeout, cursor, txn)
    }

    fn send(&self, msg: NativeMessage, txn: Option<&mut dyn NativeTransaction>) -> Result<(), NativeError> {
        self.inner.send(msg, txn)
    }

    fn create_cursor(&self) -> Result<Cursor, NativeError> {
        self.inner.create_cursor()
    }

    fn close_cursor(&self, cursor: &Cursor) {
        self.inner.close_cursor(cursor)
    }

    fn begin_transaction(&self) -> Result<Box<dyn NativeTransaction>, NativeError> {
        self.inner.begin_transaction()
    }

    fn close(&self) {
        self.inner.close()
    }
}

impl Drop for CachedQueue {
    fn drop(&mut self) {
        trace!(address = self.inner.address(), "Closing released queue handle");
        self.inner.close();
    }
}
