use downcast_rs::Downcast;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::trace;

use super::{Cursor, NativeError, NativeErrorKind, NativeMessage, NativeQueue, NativeTransaction, PeekAction, QueueOpener};

// ============================================================================
// Queue State
// ============================================================================

#[derive(Debug, Default)]
struct Inner {
    next_seq: u64,
    messages: BTreeMap<u64, NativeMessage>,
    /// Cursor id to the sequence number it points at.
    cursors: HashMap<u64, Option<u64>>,
    next_cursor: u64,
}

#[derive(Debug)]
struct QueueState {
    transactional: bool,
    multicast: Option<String>,
    inner: Mutex<Inner>,
    available: Condvar,
    commits: AtomicUsize,
    aborts: AtomicUsize,
    misreport_transactional: AtomicBool,
}

impl QueueState {
    fn new(transactional: bool, multicast: Option<String>) -> Self {
        Self {
            transactional,
            multicast,
            inner: Mutex::new(Inner::default()),
            available: Condvar::new(),
            commits: AtomicUsize::new(0),
            aborts: AtomicUsize::new(0),
            misreport_transactional: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    fn push(&self, msg: NativeMessage) {
        let mut inner = self.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.messages.insert(seq, msg);
        self.available.notify_all();
    }

    fn restore(&self, seq: u64, msg: NativeMessage) {
        self.lock().messages.insert(seq, msg);
        self.available.notify_all();
    }

    fn check_mode(&self, transactional: bool) -> Result<(), NativeError> {
        if transactional == self.transactional {
            Ok(())
        } else {
            Err(NativeError::new(
                NativeErrorKind::TransactionUsage,
                format!(
                    "queue is {}transactional",
                    if self.transactional { "" } else { "not " }
                ),
            ))
        }
    }
}

// ============================================================================
// MemoryQueueSystem
// ============================================================================

/// An in-process queue transport.
///
/// Queues are created up front and looked up by native address, ignoring
/// ASCII case. Messages are kept in send order. A transactional receive
/// that is aborted puts the message back at its original position.
#[derive(Debug, Default)]
pub struct MemoryQueueSystem {
    queues: Mutex<HashMap<String, Arc<QueueState>>>,
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

impl MemoryQueueSystem {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn create_queue(&self, address: &str, transactional: bool) {
        self.insert(address, QueueState::new(transactional, None));
    }

    /// Creates a queue bound to a multicast group (`host:port`).
    pub fn create_multicast_queue(&self, address: &str, multicast: &str) {
        self.insert(address, QueueState::new(false, Some(multicast.to_string())));
    }

    fn insert(&self, address: &str, state: QueueState) {
        self.queues
            .lock()
            .unwrap()
            .insert(address.to_ascii_lowercase(), Arc::new(state));
    }

    fn state(&self, address: &str) -> Option<Arc<QueueState>> {
        self.queues
            .lock()
            .unwrap()
            .get(&address.to_ascii_lowercase())
            .cloned()
    }

    /// Number of messages waiting in a queue.
    pub fn len(&self, address: &str) -> usize {
        self.state(address).map_or(0, |s| s.lock().messages.len())
    }

    /// Labels of the waiting messages, in queue order.
    pub fn labels(&self, address: &str) -> Vec<Option<String>> {
        self.state(address).map_or_else(Vec::new, |s| {
            s.lock().messages.values().map(|m| m.label.clone()).collect()
        })
    }

    /// Number of transactions begun on a queue that were committed.
    pub fn commits(&self, address: &str) -> usize {
        self.state(address).map_or(0, |s| s.commits.load(Ordering::SeqCst))
    }

    /// Number of transactions begun on a queue that were aborted.
    pub fn aborts(&self, address: &str) -> usize {
        self.state(address).map_or(0, |s| s.aborts.load(Ordering::SeqCst))
    }

    /// Makes [`NativeQueue::is_transactional()`] report the wrong answer.
    pub fn set_misreport_transactional(&self, address: &str, misreport: bool) {
        if let Some(s) = self.state(address) {
            s.misreport_transactional.store(misreport, Ordering::SeqCst);
        }
    }

    /// Handles opened so far.
    pub fn opened_handles(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Handles closed so far.
    pub fn closed_handles(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl QueueOpener for MemoryQueueSystem {
    fn open(&self, address: &str) -> Result<Arc<dyn NativeQueue>, NativeError> {
        let state = self.state(address).ok_or_else(|| {
            NativeError::new(NativeErrorKind::NotFound, format!("queue '{address}' does not exist"))
        })?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        trace!(address, "Opened memory queue");
        Ok(Arc::new(MemoryQueue {
            address: address.to_string(),
            state,
            closed: AtomicBool::new(false),
            closed_count: self.closed.clone(),
        }))
    }
}

// ============================================================================
// MemoryQueue
// ============================================================================

/// A handle onto a [`MemoryQueueSystem`] queue.
#[derive(Debug)]
pub struct MemoryQueue {
    address: String,
    state: Arc<QueueState>,
    closed: AtomicBool,
    closed_count: Arc<AtomicUsize>,
}

impl MemoryQueue {
    fn check_open(&self) -> Result<(), NativeError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(NativeError::closed(&self.address))
        } else {
            Ok(())
        }
    }

    /// Blocks until `find` yields a value or the timeout elapses.
    fn wait_for<T, F>(&self, timeout: Duration, mut find: F) -> Result<T, NativeError>
    where
        F: FnMut(&mut Inner) -> Result<Option<T>, NativeError>,
    {
        let deadline = Instant::now().checked_add(timeout);
        let mut inner = self.state.lock();
        loop {
            self.check_open()?;
            if let Some(found) = find(&mut *inner)? {
                return Ok(found);
            }
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(NativeError::timeout());
                    }
                    deadline - now
                }
                None => Duration::from_secs(3600),
            };
            inner = self.state.available.wait_timeout(inner, wait).unwrap().0;
        }
    }
}

fn cursor_position(inner: &Inner, cursor: &Cursor) -> Result<Option<u64>, NativeError> {
    inner
        .cursors
        .get(&cursor.id())
        .copied()
        .ok_or_else(|| NativeError::new(NativeErrorKind::Other, format!("unknown cursor {}", cursor.id())))
}

/// The first sequence number at or after `from`.
fn at_or_after(inner: &Inner, from: Option<u64>) -> Option<u64> {
    inner.messages.range(from.unwrap_or(0)..).next().map(|(seq, _)| *seq)
}

impl NativeQueue for MemoryQueue {
    fn address(&self) -> &str {
        &self.address
    }

    fn is_transactional(&self) -> Result<bool, NativeError> {
        self.check_open()?;
        let misreport = self.state.misreport_transactional.load(Ordering::SeqCst);
        Ok(self.state.transactional != misreport)
    }

    fn multicast_address(&self) -> Option<String> {
        self.state.multicast.clone()
    }

    fn peek(
        &self,
        timeout: Duration,
        cursor: Option<(&Cursor, PeekAction)>,
    ) -> Result<NativeMessage, NativeError> {
        self.wait_for(timeout, |inner| {
            let Some((cursor, action)) = cursor else {
                return Ok(inner.messages.values().next().cloned());
            };
            let position = cursor_position(inner, cursor)?;
            let from = match (action, position) {
                (PeekAction::Next, Some(p)) => Some(p + 1),
                (_, p) => p,
            };
            let Some(seq) = at_or_after(inner, from) else {
                return Ok(None);
            };
            inner.cursors.insert(cursor.id(), Some(seq));
            Ok(inner.messages.get(&seq).cloned())
        })
    }

    fn receive(
        &self,
        timeout: Duration,
        cursor: Option<&Cursor>,
        txn: Option<&mut dyn NativeTransaction>,
    ) -> Result<NativeMessage, NativeError> {
        self.state.check_mode(txn.is_some())?;
        let (seq, msg) = self.wait_for(timeout, |inner| {
            let seq = match cursor {
                Some(cursor) => {
                    let position = cursor_position(inner, cursor)?;
                    at_or_after(inner, position)
                }
                None => at_or_after(inner, None),
            };
            Ok(seq.and_then(|seq| inner.messages.remove(&seq).map(|m| (seq, m))))
        })?;

        if let Some(txn) = txn {
            let Some(txn) = txn.as_any_mut().downcast_mut::<MemoryTransaction>() else {
                self.state.restore(seq, msg);
                return Err(NativeError::new(NativeErrorKind::Other, "foreign transaction"));
            };
            txn.received.push((self.state.clone(), seq, msg.clone()));
        }
        Ok(msg)
    }

    fn send(&self, msg: NativeMessage, txn: Option<&mut dyn NativeTransaction>) -> Result<(), NativeError> {
        self.check_open()?;
        self.state.check_mode(txn.is_some())?;
        match txn {
            Some(txn) => {
                let txn = txn
                    .as_any_mut()
                    .downcast_mut::<MemoryTransaction>()
                    .ok_or_else(|| NativeError::new(NativeErrorKind::Other, "foreign transaction"))?;
                txn.sent.push((self.state.clone(), msg));
            }
            None => self.state.push(msg),
        }
        Ok(())
    }

    fn create_cursor(&self) -> Result<Cursor, NativeError> {
        self.check_open()?;
        let mut inner = self.state.lock();
        let id = inner.next_cursor;
        inner.next_cursor += 1;
        inner.cursors.insert(id, None);
        Ok(Cursor::new(id))
    }

    fn close_cursor(&self, cursor: &Cursor) {
        self.state.lock().cursors.remove(&cursor.id());
    }

    fn begin_transaction(&self) -> Result<Box<dyn NativeTransaction>, NativeError> {
        self.check_open()?;
        Ok(Box::new(MemoryTransaction {
            owner: self.state.clone(),
            received: Vec::new(),
            sent: Vec::new(),
            done: false,
        }))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.closed_count.fetch_add(1, Ordering::SeqCst);
            self.state.available.notify_all();
        }
    }
}

// ============================================================================
// MemoryTransaction
// ============================================================================

/// A transaction over [`MemoryQueue`]s. Dropping it unfinished aborts it.
#[derive(Debug)]
pub struct MemoryTransaction {
    owner: Arc<QueueState>,
    received: Vec<(Arc<QueueState>, u64, NativeMessage)>,
    sent: Vec<(Arc<QueueState>, NativeMessage)>,
    done: bool,
}

impl MemoryTransaction {
    fn finish(&mut self) -> Result<(), NativeError> {
        if self.done {
            return Err(NativeError::new(NativeErrorKind::Other, "transaction already finished"));
        }
        self.done = true;
        Ok(())
    }
}

impl NativeTransaction for MemoryTransaction {
    fn commit(&mut self) -> Result<(), NativeError> {
        self.finish()?;
        self.received.clear();
        for (state, msg) in self.sent.drain(..) {
            state.push(msg);
        }
        self.owner.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn abort(&mut self) -> Result<(), NativeError> {
        self.finish()?;
        self.sent.clear();
        for (state, seq, msg) in self.received.drain(..) {
            state.restore(seq, msg);
        }
        self.owner.aborts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.abort();
        }
    }
}
