use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, instrument, trace, warn};
use url::Url;

use super::{resolve_subject, Callback, Subscription, SubscriptionTable};
use crate::address::{AddressCodec, QueueDetails};
use crate::error::Error;
use crate::factory::MultiSubjectMessaging;
use crate::message::{Message, ReadOnlyMessage};
use crate::native::NativeQueue;
use crate::queue::{QueueCache, QueueSender, Receiver, SubjectFilter};

#[derive(Default)]
struct Scan {
    /// Table generation the receiver was built for.
    generation: Option<u64>,
    receiver: Option<Receiver>,
}

/// Dispatches messages from one shared native queue to subscriptions keyed
/// by message label.
///
/// A single subscription reads its subject directly. Several subscriptions
/// share one filtered receiver that accepts any registered subject; each
/// message goes to the first subscription registered for its exact label,
/// or failing that to the first subscription without a subject.
pub struct QueueDispatcher {
    address: Url,
    details: QueueDetails,
    queue: Arc<dyn NativeQueue>,
    codec: Arc<AddressCodec>,
    sender: QueueSender,
    table: Mutex<SubscriptionTable>,
    scan: Mutex<Scan>,
    closed: AtomicBool,
}

impl QueueDispatcher {
    pub fn new(
        address: Url,
        details: QueueDetails,
        queue: Arc<dyn NativeQueue>,
        codec: Arc<AddressCodec>,
        cache: Arc<QueueCache>,
    ) -> Result<Self, Error> {
        let sender = QueueSender::new(queue.clone(), details.clone(), cache)?;
        Ok(Self {
            address,
            details,
            queue,
            codec,
            sender,
            table: Mutex::new(SubscriptionTable::new()),
            scan: Mutex::new(Scan::default()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn subscription_count(&self) -> usize {
        self.table.lock().unwrap().len()
    }

    fn check_open(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::ObjectDisposed("queue dispatcher"))
        } else {
            Ok(())
        }
    }
}

fn filter_for(subscriptions: &[Arc<Subscription>]) -> SubjectFilter {
    let mut subjects = Vec::with_capacity(subscriptions.len());
    for sub in subscriptions {
        match &sub.subject {
            None => return SubjectFilter::Any,
            Some(s) if !subjects.contains(s) => subjects.push(s.clone()),
            Some(_) => {}
        }
    }
    if subjects.len() == 1 {
        SubjectFilter::Exact(subjects.remove(0))
    } else {
        SubjectFilter::OneOf(subjects)
    }
}

fn target<'a>(subscriptions: &'a [Arc<Subscription>], label: Option<&str>) -> Option<&'a Arc<Subscription>> {
    subscriptions
        .iter()
        .find(|s| label.is_some() && s.subject.as_deref() == label)
        .or_else(|| subscriptions.iter().find(|s| s.subject.is_none()))
}

impl MultiSubjectMessaging for QueueDispatcher {
    fn address(&self) -> &Url {
        &self.address
    }

    fn send(&self, msg: Message) -> Result<(), Error> {
        self.check_open()?;
        self.sender.send(msg)
    }

    fn subscribe(&self, subject: Option<&str>, callback: Callback) -> Result<(), Error> {
        let subject = resolve_subject(subject, self.details.subject.as_deref())?;
        let mut table = self.table.lock().unwrap();
        self.check_open()?;
        let id = table.add(subject.clone(), callback);
        debug!(?id, ?subject, "Subscribed");
        Ok(())
    }

    fn unsubscribe(&self, subject: Option<&str>, callback: &Callback) -> Result<bool, Error> {
        let subject = resolve_subject(subject, self.details.subject.as_deref())?;
        let mut table = self.table.lock().unwrap();
        self.check_open()?;
        let removed = table.remove(subject.as_deref(), callback);
        debug!(?subject, removed = removed.is_some(), "Unsubscribed");
        Ok(removed.is_some())
    }

    #[instrument(skip(self), fields(address = %self.address))]
    fn dispatch_message(&self, timeout: Duration) -> Result<bool, Error> {
        self.check_open()?;
        let (generation, subscriptions) = self.table.lock().unwrap().snapshot();
        if subscriptions.is_empty() {
            return Ok(false);
        }

        let mut scan = self.scan.lock().unwrap();
        if self.closed.load(Ordering::SeqCst) {
            scan.receiver = None;
            return Err(Error::ObjectDisposed("queue dispatcher"));
        }
        if scan.generation != Some(generation) {
            let filter = filter_for(&subscriptions);
            trace!(?filter, generation, "Rebuilding receiver");
            scan.receiver = Some(Receiver::new(self.queue.clone(), self.codec.clone(), filter)?);
            scan.generation = Some(generation);
        }
        let Some(receiver) = scan.receiver.as_mut() else {
            return Ok(false);
        };
        let Some(msg) = receiver.poll(timeout)? else {
            return Ok(false);
        };
        drop(scan);

        match target(&subscriptions, msg.subject()) {
            Some(sub) => {
                trace!(id = ?sub.id, label = ?msg.subject(), "Dispatching");
                (sub.callback)(Box::new(msg));
                Ok(true)
            }
            None => {
                warn!(label = ?msg.subject(), "No subscription for received message");
                Ok(false)
            }
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let removed = self.table.lock().unwrap().clear();
        debug!(subscriptions = removed.len(), "Closed queue dispatcher");
    }
}
