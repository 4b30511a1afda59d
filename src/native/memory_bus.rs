use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};
use tracing::trace;

use super::{BusConnector, BusListener, BusMessage, BusMode, BusTransport, NativeError, NativeErrorKind, ServiceConfig};

/// Returns `true` if a dotted subject matches a listener pattern.
///
/// `*` matches exactly one element and a trailing `>` matches one or more.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern = pattern.split('.');
    let mut subject = subject.split('.');
    loop {
        match (pattern.next(), subject.next()) {
            (Some(">"), Some(_)) => return pattern.next().is_none(),
            (Some("*"), Some(_)) => {}
            (Some(p), Some(s)) if p == s => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

// ============================================================================
// Hub
// ============================================================================

#[derive(Debug, Default)]
struct Hub {
    listeners: Mutex<Vec<Weak<MemoryListener>>>,
    confirmed: Mutex<Vec<(String, u64)>>,
    next_sequence: AtomicU64,
}

/// An in-process bus, one hub per service.
#[derive(Debug, Default)]
pub struct MemoryBus {
    hubs: Mutex<HashMap<String, Arc<Hub>>>,
    connections: Mutex<Vec<(String, ServiceConfig)>>,
}

impl MemoryBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn hub(&self, service: &str) -> Arc<Hub> {
        self.hubs
            .lock()
            .unwrap()
            .entry(service.to_string())
            .or_default()
            .clone()
    }

    /// `(subject, sequence)` of every certified message confirmed on a service.
    pub fn confirmations(&self, service: &str) -> Vec<(String, u64)> {
        self.hub(service).confirmed.lock().unwrap().clone()
    }

    /// Every `connect()` call so far, with the settings used.
    pub fn connections(&self) -> Vec<(String, ServiceConfig)> {
        self.connections.lock().unwrap().clone()
    }

    /// Number of open listeners on a service.
    pub fn listener_count(&self, service: &str) -> usize {
        self.hub(service)
            .listeners
            .lock()
            .unwrap()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|l| !l.closed.load(Ordering::SeqCst))
            .count()
    }
}

impl BusConnector for MemoryBus {
    fn connect(&self, service: &str, config: &ServiceConfig) -> Result<Arc<dyn BusTransport>, NativeError> {
        self.connections
            .lock()
            .unwrap()
            .push((service.to_string(), config.clone()));
        Ok(Arc::new(MemoryBusTransport {
            hub: self.hub(service),
            certified: matches!(config.mode, BusMode::Certified { .. }),
            closed: AtomicBool::new(false),
        }))
    }
}

// ============================================================================
// Transport
// ============================================================================

#[derive(Debug)]
struct MemoryBusTransport {
    hub: Arc<Hub>,
    certified: bool,
    closed: AtomicBool,
}

impl BusTransport for MemoryBusTransport {
    fn send(&self, mut msg: BusMessage) -> Result<(), NativeError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(NativeError::closed("bus transport"));
        }
        if self.certified {
            msg.sequence = Some(self.hub.next_sequence.fetch_add(1, Ordering::SeqCst) + 1);
        }
        let mut listeners = self.hub.listeners.lock().unwrap();
        listeners.retain(|l| l.strong_count() > 0);
        for listener in listeners.iter().filter_map(Weak::upgrade) {
            if subject_matches(&listener.subject, &msg.send_subject) {
                listener.deliver(msg.clone());
            }
        }
        trace!(subject = %msg.send_subject, "Published bus message");
        Ok(())
    }

    fn create_listener(&self, subject: &str) -> Result<Arc<dyn BusListener>, NativeError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(NativeError::closed("bus transport"));
        }
        if subject.is_empty() {
            return Err(NativeError::new(NativeErrorKind::Other, "empty subject"));
        }
        let listener = Arc::new(MemoryListener {
            subject: subject.to_string(),
            hub: self.hub.clone(),
            inbox: Mutex::new(VecDeque::new()),
            arrived: Condvar::new(),
            closed: AtomicBool::new(false),
        });
        self.hub.listeners.lock().unwrap().push(Arc::downgrade(&listener));
        Ok(listener)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// Listener
// ============================================================================

#[derive(Debug)]
struct MemoryListener {
    subject: String,
    hub: Arc<Hub>,
    inbox: Mutex<VecDeque<BusMessage>>,
    arrived: Condvar,
    closed: AtomicBool,
}

impl MemoryListener {
    fn deliver(&self, msg: BusMessage) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        self.inbox.lock().unwrap().push_back(msg);
        self.arrived.notify_all();
    }
}

impl BusListener for MemoryListener {
    fn subject(&self) -> &str {
        &self.subject
    }

    fn peek(&self, timeout: Duration) -> Result<bool, NativeError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut inbox = self.inbox.lock().unwrap();
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(NativeError::closed("bus listener"));
            }
            if !inbox.is_empty() {
                return Ok(true);
            }
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    deadline - now
                }
                None => Duration::from_secs(3600),
            };
            inbox = self.arrived.wait_timeout(inbox, wait).unwrap().0;
        }
    }

    fn take(&self) -> Option<BusMessage> {
        self.inbox.lock().unwrap().pop_front()
    }

    fn confirm(&self, msg: &BusMessage) -> Result<(), NativeError> {
        let sequence = msg
            .sequence
            .ok_or_else(|| NativeError::new(NativeErrorKind::Other, "message is not certified"))?;
        self.hub
            .confirmed
            .lock()
            .unwrap()
            .push((msg.send_subject.clone(), sequence));
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.inbox.lock().unwrap().clear();
        self.arrived.notify_all();
    }
}
