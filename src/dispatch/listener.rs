use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, trace, warn};
use url::Url;

use super::{resolve_subject, Callback, SubjectRouter, Subscription, SubscriptionId, SubscriptionTable};
use crate::bus::{to_bus, to_bus_subject, BusReceivedMessage};
use crate::error::Error;
use crate::factory::MultiSubjectMessaging;
use crate::message::Message;
use crate::native::{BusListener, BusTransport, NativeError};

/// Result of one asynchronous peek, tagged with the ticket it was started
/// under so that completions for removed subscriptions can be ignored.
struct Completion {
    id: SubscriptionId,
    ticket: u64,
    result: Result<bool, NativeError>,
}

/// A peek for the peek thread to run.
struct PeekRequest {
    id: SubscriptionId,
    ticket: u64,
    timeout: Duration,
}

/// The peek thread of one subscription. It runs one peek per request and
/// exits once its request channel is dropped.
struct Peeker {
    listener: Arc<dyn BusListener>,
    requests: mpsc::Sender<PeekRequest>,
    handle: JoinHandle<()>,
}

impl Peeker {
    fn spawn(listener: Arc<dyn BusListener>, completions: mpsc::Sender<Completion>) -> Result<Self, Error> {
        let (requests, pending) = mpsc::channel::<PeekRequest>();
        let peeking = listener.clone();
        let handle = thread::Builder::new()
            .name("mqlink-peek".to_string())
            .spawn(move || {
                for request in pending {
                    let result = peeking.peek(request.timeout);
                    let completion = Completion {
                        id: request.id,
                        ticket: request.ticket,
                        result,
                    };
                    if completions.send(completion).is_err() {
                        break;
                    }
                }
            })?;
        Ok(Self {
            listener,
            requests,
            handle,
        })
    }
}

struct State {
    table: SubscriptionTable,
    router: SubjectRouter,
    peekers: HashMap<SubscriptionId, Peeker>,
    /// Peek threads of removed subscriptions still finishing a peek on a
    /// listener that stays open for other subscriptions.
    retired: Vec<JoinHandle<()>>,
    /// Subscriptions with a peek in flight, and its ticket.
    outstanding: HashMap<SubscriptionId, u64>,
    next_ticket: u64,
    /// Dropped on close, so a waiting dispatch sees the channel disconnect.
    completions_tx: Option<mpsc::Sender<Completion>>,
}

impl State {
    fn reap_retired(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) = self.retired.drain(..).partition(JoinHandle::is_finished);
        self.retired = running;
        for handle in finished {
            let _ = handle.join();
        }
    }
}

/// Dispatches bus messages to subscriptions, one listener per subject.
///
/// Each subscription has a peek thread and at most one peek in flight. A
/// dispatch call first delivers any peek that completed since the last call,
/// then starts peeks for idle subscriptions and waits for the first to find a
/// message. Subscriptions to the same subject share a listener and so compete
/// for its messages.
pub struct ListenerDispatcher {
    address: Url,
    transport: Arc<dyn BusTransport>,
    state: Mutex<State>,
    completions: Mutex<mpsc::Receiver<Completion>>,
    closed: AtomicBool,
}

impl ListenerDispatcher {
    pub fn new(address: Url, transport: Arc<dyn BusTransport>) -> Self {
        let (completions_tx, completions_rx) = mpsc::channel();
        Self {
            address,
            transport: transport.clone(),
            state: Mutex::new(State {
                table: SubscriptionTable::new(),
                router: SubjectRouter::new(transport),
                peekers: HashMap::new(),
                retired: Vec::new(),
                outstanding: HashMap::new(),
                next_ticket: 0,
                completions_tx: Some(completions_tx),
            }),
            completions: Mutex::new(completions_rx),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of subjects currently being listened to.
    pub fn active_subjects(&self) -> usize {
        self.state.lock().unwrap().router.active_subjects()
    }

    /// Number of subscriptions with a peek in flight.
    pub fn outstanding_peeks(&self) -> usize {
        self.state.lock().unwrap().outstanding.len()
    }

    /// Number of peek threads still running.
    pub fn peek_threads(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        state.reap_retired();
        state.peekers.len() + state.retired.len()
    }

    fn check_open(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::ObjectDisposed("listener dispatcher"))
        } else {
            Ok(())
        }
    }

    fn default_subject(&self) -> Option<&str> {
        Some(self.address.path()).filter(|p| *p != "/" && !p.is_empty())
    }

    /// Starts a peek for every subscription without one.
    fn start_peeks(&self, timeout: Duration) {
        let mut state = self.state.lock().unwrap();
        state.reap_retired();
        let (_, subscriptions) = state.table.snapshot();
        for sub in subscriptions.iter() {
            if state.outstanding.contains_key(&sub.id) {
                continue;
            }
            let ticket = state.next_ticket;
            let Some(peeker) = state.peekers.get(&sub.id) else {
                continue;
            };
            let request = PeekRequest {
                id: sub.id,
                ticket,
                timeout,
            };
            if peeker.requests.send(request).is_err() {
                debug!(id = ?sub.id, "Peek thread has exited");
                continue;
            }
            state.next_ticket += 1;
            state.outstanding.insert(sub.id, ticket);
            trace!(id = ?sub.id, ticket, "Started peek");
        }
    }

    /// Clears the slot of a completed peek and, if it found a message,
    /// delivers it. Returns `true` if a callback ran.
    fn complete(&self, completion: Completion) -> bool {
        let (sub, listener): (Arc<Subscription>, Arc<dyn BusListener>) = {
            let mut state = self.state.lock().unwrap();
            match state.outstanding.get(&completion.id) {
                Some(ticket) if *ticket == completion.ticket => {
                    state.outstanding.remove(&completion.id);
                }
                _ => return false,
            }
            match completion.result {
                Ok(true) => {}
                Ok(false) => return false,
                Err(e) => {
                    debug!(id = ?completion.id, error = %e, "Peek failed");
                    return false;
                }
            }
            let (_, subscriptions) = state.table.snapshot();
            let Some(sub) = subscriptions.iter().find(|s| s.id == completion.id).cloned() else {
                return false;
            };
            let Some(listener) = state.peekers.get(&completion.id).map(|p| p.listener.clone()) else {
                return false;
            };
            (sub, listener)
        };

        let Some(msg) = listener.take() else {
            trace!(id = ?sub.id, "Message taken by another subscription");
            return false;
        };
        trace!(id = ?sub.id, subject = %msg.send_subject, "Dispatching");
        (sub.callback)(Box::new(BusReceivedMessage::new(msg, listener, self.address.clone())));
        true
    }
}

impl MultiSubjectMessaging for ListenerDispatcher {
    fn address(&self) -> &Url {
        &self.address
    }

    fn send(&self, msg: Message) -> Result<(), Error> {
        self.check_open()?;
        self.transport.send(to_bus(msg, &self.address)?)?;
        Ok(())
    }

    fn subscribe(&self, subject: Option<&str>, callback: Callback) -> Result<(), Error> {
        let subject = resolve_subject(subject, self.default_subject())?
            .ok_or_else(|| Error::InvalidSubject(String::new()))?;
        let bus_subject = to_bus_subject(&subject);
        let mut state = self.state.lock().unwrap();
        self.check_open()?;
        let Some(completions) = state.completions_tx.clone() else {
            return Err(Error::ObjectDisposed("listener dispatcher"));
        };
        let listener = state.router.acquire(&bus_subject)?;
        let peeker = match Peeker::spawn(listener, completions) {
            Ok(peeker) => peeker,
            Err(e) => {
                state.router.release(&bus_subject);
                return Err(e);
            }
        };
        let id = state.table.add(Some(subject.clone()), callback);
        state.peekers.insert(id, peeker);
        debug!(?id, subject = %subject, "Subscribed");
        Ok(())
    }

    fn unsubscribe(&self, subject: Option<&str>, callback: &Callback) -> Result<bool, Error> {
        let Some(subject) = resolve_subject(subject, self.default_subject())? else {
            return Ok(false);
        };
        let mut state = self.state.lock().unwrap();
        self.check_open()?;
        let Some(removed) = state.table.remove(Some(&subject), callback) else {
            return Ok(false);
        };
        state.outstanding.remove(&removed.id);
        let closed = state.router.release(&to_bus_subject(&subject));
        if let Some(peeker) = state.peekers.remove(&removed.id) {
            drop(peeker.requests);
            if closed {
                // The listener is closed, so any peek in flight returns now.
                let _ = peeker.handle.join();
            } else {
                state.retired.push(peeker.handle);
            }
        }
        debug!(id = ?removed.id, subject = %subject, "Unsubscribed");
        Ok(true)
    }

    #[instrument(skip(self), fields(address = %self.address))]
    fn dispatch_message(&self, timeout: Duration) -> Result<bool, Error> {
        self.check_open()?;
        let completions = self.completions.lock().unwrap();

        while let Ok(completion) = completions.try_recv() {
            if self.complete(completion) {
                return Ok(true);
            }
        }

        self.start_peeks(timeout);

        let deadline = Instant::now().checked_add(timeout);
        loop {
            let wait = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => Duration::from_secs(3600),
            };
            match completions.recv_timeout(wait) {
                Ok(completion) => {
                    if self.complete(completion) {
                        return Ok(true);
                    }
                }
                Err(RecvTimeoutError::Timeout) => return Ok(false),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::ObjectDisposed("listener dispatcher"))
                }
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(false);
            }
            self.check_open()?;
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let (removed, peekers, retired) = {
            let mut state = self.state.lock().unwrap();
            let removed = state.table.clear();
            state.outstanding.clear();
            state.router.close_all();
            let peekers: Vec<Peeker> = state.peekers.drain().map(|(_, p)| p).collect();
            let retired = std::mem::take(&mut state.retired);
            state.completions_tx = None;
            (removed, peekers, retired)
        };
        self.transport.close();

        // Closed listeners end any peek in flight, so the threads exit
        // promptly once their request channels are gone.
        let handles = peekers
            .into_iter()
            .map(|p| p.handle)
            .chain(retired);
        for handle in handles {
            if handle.join().is_err() {
                warn!("Peek thread panicked");
            }
        }
        debug!(subscriptions = removed.len(), "Closed listener dispatcher");
    }
}

impl Drop for ListenerDispatcher {
    fn drop(&mut self) {
        self.close();
    }
}
