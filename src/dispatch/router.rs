use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::Error;
use crate::native::{BusListener, BusTransport};

struct Route {
    listener: Arc<dyn BusListener>,
    refs: usize,
}

/// Reference-counted bus listeners, one per subject.
///
/// The first [`acquire()`](Self::acquire) of a subject starts listening and
/// the last [`release()`](Self::release) stops, so nothing is queued for
/// subjects nobody is subscribed to.
pub struct SubjectRouter {
    transport: Arc<dyn BusTransport>,
    routes: HashMap<String, Route>,
}

impl SubjectRouter {
    pub fn new(transport: Arc<dyn BusTransport>) -> Self {
        Self {
            transport,
            routes: HashMap::new(),
        }
    }

    /// Returns the listener for a bus subject, creating it on first use.
    pub fn acquire(&mut self, subject: &str) -> Result<Arc<dyn BusListener>, Error> {
        if let Some(route) = self.routes.get_mut(subject) {
            route.refs += 1;
            return Ok(route.listener.clone());
        }
        let listener = self.transport.create_listener(subject)?;
        debug!(subject, "Resumed subject");
        self.routes.insert(
            subject.to_string(),
            Route {
                listener: listener.clone(),
                refs: 1,
            },
        );
        Ok(listener)
    }

    /// Drops one reference. Returns `true` if that was the last one and the
    /// listener was closed.
    pub fn release(&mut self, subject: &str) -> bool {
        let Some(route) = self.routes.get_mut(subject) else {
            return false;
        };
        route.refs -= 1;
        if route.refs > 0 {
            return false;
        }
        if let Some(route) = self.routes.remove(subject) {
            route.listener.close();
        }
        debug!(subject, "Paused subject");
        true
    }

    pub fn listener(&self, subject: &str) -> Option<Arc<dyn BusListener>> {
        self.routes.get(subject).map(|r| r.listener.clone())
    }

    pub fn refs(&self, subject: &str) -> usize {
        self.routes.get(subject).map_or(0, |r| r.refs)
    }

    pub fn active_subjects(&self) -> usize {
        self.routes.len()
    }

    pub fn close_all(&mut self) {
        for (_, route) in self.routes.drain() {
            route.listener.close();
        }
    }
}
