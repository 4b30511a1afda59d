use ::config::Config;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::error::Error;
use crate::factory::MultiSubjectMessaging;

/// Drives [`MultiSubjectMessaging::dispatch_message()`] on a background
/// thread.
///
/// Each iteration dispatches one message, waiting at most one poll interval.
/// When nothing was dispatched the thread sleeps out the rest of the interval,
/// so an idle dispatcher is not polled in a tight loop. The loop ends when
/// [`stop()`](Self::stop) is called or the dispatcher is closed.
pub struct Worker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Starts a worker.
    ///
    /// # Configuration Keys
    ///
    /// - `poll_interval_ms`: Longest wait per dispatch (defaults to 100)
    pub fn start(messaging: Arc<dyn MultiSubjectMessaging>, config: &Config) -> Result<Self, Error> {
        Self::start_named(messaging, config, "")
    }

    /// Starts a worker with configuration namespacing, see
    /// [`start()`](Self::start).
    pub fn start_named(messaging: Arc<dyn MultiSubjectMessaging>, config: &Config, name: &str) -> Result<Self, Error> {
        let interval = crate::config::poll_interval(config, name)?;
        Self::with_interval(messaging, interval)
    }

    pub fn with_interval(messaging: Arc<dyn MultiSubjectMessaging>, interval: Duration) -> Result<Self, Error> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = thread::Builder::new()
            .name("mqlink-worker".to_string())
            .spawn(move || run(messaging.as_ref(), &flag, interval))?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Asks the loop to finish after the current dispatch.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stops the loop and waits for the thread to exit.
    pub fn join(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Worker thread panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(messaging: &dyn MultiSubjectMessaging, stop: &AtomicBool, interval: Duration) {
    let address = messaging.address().clone();
    info!(address = %address, ?interval, "Worker started");
    while !stop.load(Ordering::SeqCst) {
        let started = Instant::now();
        match messaging.dispatch_message(interval) {
            Ok(true) => continue,
            Ok(false) => {}
            Err(Error::ObjectDisposed(what)) => {
                debug!(what, "Dispatcher closed");
                break;
            }
            Err(e) => error!(address = %address, error = %e, "Dispatch failed"),
        }
        if let Some(rest) = interval.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }
    info!(address = %address, "Worker stopped");
}
