//! Shared helpers for the integration tests.
//!
//! # Running with tracing
//!
//! Use TEST_LOG environment variable to control tracing verbosity (like -v, -vv, -vvv):
//!
//! ```bash
//! TEST_LOG=1 cargo test dispatcher -- --nocapture   # info
//! TEST_LOG=2 cargo test dispatcher -- --nocapture   # debug
//! TEST_LOG=3 cargo test dispatcher -- --nocapture   # trace
//! ```

#![allow(dead_code)]

use mqlink::native::{MemoryBus, MemoryQueueSystem};
use mqlink::prelude::*;
use std::sync::{Arc, Mutex, Once};
use url::Url;

static INIT: Once = Once::new();

// ============================================================================
// Tracing Initialization
// ============================================================================

/// Initialize tracing based on TEST_LOG environment variable
///
/// Verbosity levels (like -v, -vv, -vvv):
/// - TEST_LOG=1: Info level
/// - TEST_LOG=2: Debug level
/// - TEST_LOG=3: Trace level
pub fn init_tracing() {
    INIT.call_once(|| {
        if let Ok(level_str) = std::env::var("TEST_LOG") {
            let verbosity = level_str.parse::<u8>().unwrap_or(0);

            if verbosity > 0 {
                let level = match verbosity {
                    1 => "info",
                    2 => "debug",
                    _ => "trace", // 3 or more
                };

                let filter = format!("mqlink={}", level);
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                    .with_target(true)
                    .with_writer(std::io::stderr)
                    .with_test_writer()
                    .try_init();
            }
        }
    });
}

// ============================================================================
// Helper Functions
// ============================================================================

pub fn url(text: &str) -> Url {
    Url::parse(text).unwrap()
}

pub fn empty_config() -> config::Config {
    config::Config::builder()
        .set_default("machine_name", "testhost")
        .unwrap()
        .build()
        .unwrap()
}

/// Native address of `msmq://localhost/private$/{name}`.
pub fn private_queue(name: &str) -> String {
    format!(".\\private$\\{name}")
}

pub fn queue_factory(system: &Arc<MemoryQueueSystem>) -> QueueMessagingFactory {
    QueueMessagingFactory::new(&empty_config(), system.clone()).unwrap()
}

pub fn bus_factory(bus: &Arc<MemoryBus>, config: &config::Config) -> BusMessagingFactory {
    BusMessagingFactory::new(config, bus.clone())
}

/// A callback that records the subject and text body of every message it is
/// given, acknowledging each one.
pub fn recorder() -> (Callback, Arc<Mutex<Vec<(Option<String>, Option<String>)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback: Callback = Arc::new(move |msg: Box<dyn ReadOnlyMessage>| {
        let text = msg.body().and_then(|b| b.as_text()).map(str::to_string);
        sink.lock().unwrap().push((msg.subject().map(str::to_string), text));
        msg.acknowledge().unwrap();
    });
    (callback, seen)
}

pub fn text_message(subject: Option<&str>, text: &str) -> Message {
    let msg = Message::new().with_body(text);
    match subject {
        Some(s) => msg.with_subject(s).unwrap(),
        None => msg,
    }
}
