//! Multi-subject dispatch.
//!
//! Both dispatchers keep their subscriptions in a [`SubscriptionTable`] and
//! take the table lock only for bookkeeping, never across a blocking peek.
//!
//! - [`QueueDispatcher`] serves every subscription from one shared native
//!   queue through a single filtered receiver.
//! - [`ListenerDispatcher`] keeps one bus listener per subject and a peek
//!   thread per subscription with at most one peek outstanding.

mod listener;
mod queue;
mod router;

pub use listener::ListenerDispatcher;
pub use queue::QueueDispatcher;
pub use router::SubjectRouter;

use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::message::ReadOnlyMessage;

/// Called with each message dispatched to a subscription.
///
/// The callback owns the message; dropping a transactional message without
/// acknowledging it returns it to the queue.
pub type Callback = Arc<dyn Fn(Box<dyn ReadOnlyMessage>) + Send + Sync>;

/// Returns `true` if both handles point at the same callback.
pub fn same_callback(a: &Callback, b: &Callback) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Identifies one subscription for the lifetime of its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

pub struct Subscription {
    pub id: SubscriptionId,
    /// `None` accepts any subject.
    pub subject: Option<String>,
    pub callback: Callback,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("subject", &self.subject)
            .finish()
    }
}

/// An immutable view of the subscriptions at some generation.
pub type Snapshot = Arc<Vec<Arc<Subscription>>>;

/// Subscriptions in registration order.
///
/// Every change swaps in a new immutable snapshot and bumps the generation,
/// so a dispatcher can work from a snapshot without holding the lock and
/// notice later that it is stale.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    next_id: u64,
    generation: u64,
    snapshot: Snapshot,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn snapshot(&self) -> (u64, Snapshot) {
        (self.generation, self.snapshot.clone())
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    pub fn add(&mut self, subject: Option<String>, callback: Callback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        let mut next = Vec::clone(&self.snapshot);
        next.push(Arc::new(Subscription { id, subject, callback }));
        self.swap(next);
        id
    }

    /// Removes the first subscription with this subject and callback.
    pub fn remove(&mut self, subject: Option<&str>, callback: &Callback) -> Option<Arc<Subscription>> {
        let index = self
            .snapshot
            .iter()
            .position(|s| s.subject.as_deref() == subject && same_callback(&s.callback, callback))?;
        let mut next = Vec::clone(&self.snapshot);
        let removed = next.remove(index);
        self.swap(next);
        Some(removed)
    }

    /// Removes everything, returning what was there.
    pub fn clear(&mut self) -> Snapshot {
        let old = self.snapshot.clone();
        self.swap(Vec::new());
        old
    }

    fn swap(&mut self, next: Vec<Arc<Subscription>>) {
        self.snapshot = Arc::new(next);
        self.generation += 1;
    }
}

/// Normalises a subscription subject, falling back to the address subject.
pub(crate) fn resolve_subject(subject: Option<&str>, default: Option<&str>) -> Result<Option<String>, Error> {
    match subject.or(default) {
        Some(s) if !s.starts_with('/') => Err(Error::InvalidSubject(s.to_string())),
        s => Ok(s.map(str::to_string)),
    }
}
