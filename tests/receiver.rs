//! Peek-then-receive, label filtering and the acknowledge lifecycle.

mod common;

use common::*;
use mqlink::native::{MemoryQueueSystem, NativeMessage, NativeQueue};
use mqlink::queue::{QueueCache, QueueMessage, QueueSender, Receiver, SubjectFilter};
use mqlink::{AddressCodec, Error, ReadOnlyMessage};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SHORT: Duration = Duration::from_millis(50);

struct Fixture {
    system: Arc<MemoryQueueSystem>,
    queue: Arc<dyn NativeQueue>,
    sender: QueueSender,
    codec: Arc<AddressCodec>,
    address: String,
}

impl Fixture {
    fn new(transactional: bool) -> Self {
        init_tracing();
        let system = MemoryQueueSystem::new();
        let address = private_queue("work");
        system.create_queue(&address, transactional);
        let cache = Arc::new(QueueCache::with_ttl(system.clone(), Duration::from_secs(60)));
        let queue = cache.get_or_add(&address).unwrap();
        let details = mqlink::address::uri_to_queue_name(&url("msmq://localhost/private$/work"));
        let sender = QueueSender::new(queue.clone(), details, cache).unwrap();
        Self {
            system,
            queue,
            sender,
            codec: Arc::new(AddressCodec::with_machine_name("testhost")),
            address,
        }
    }

    fn send(&self, subject: &str, text: &str) {
        self.sender.send(text_message(Some(subject), text)).unwrap();
    }

    fn receiver(&self, filter: SubjectFilter) -> Receiver {
        Receiver::new(self.queue.clone(), self.codec.clone(), filter).unwrap()
    }
}

fn text(msg: &QueueMessage) -> &str {
    msg.body().and_then(|b| b.as_text()).unwrap()
}

// ============================================================================
// Unfiltered
// ============================================================================

#[test]
fn receives_in_queue_order() {
    let fx = Fixture::new(false);
    fx.send("/a", "one");
    fx.send("/b", "two");
    let mut receiver = fx.receiver(SubjectFilter::Any);

    assert_eq!(text(&receiver.poll(SHORT).unwrap().unwrap()), "one");
    assert_eq!(text(&receiver.poll(SHORT).unwrap().unwrap()), "two");
    assert!(receiver.poll(SHORT).unwrap().is_none());
}

#[test]
fn timeout_is_not_an_error() {
    let fx = Fixture::new(false);
    let mut receiver = fx.receiver(SubjectFilter::Any);

    let started = Instant::now();
    assert!(receiver.poll(SHORT).unwrap().is_none());
    assert!(started.elapsed() >= SHORT);
}

#[test]
fn receive_without_peeked_message_is_none() {
    let fx = Fixture::new(false);
    let mut receiver = fx.receiver(SubjectFilter::Any);
    assert!(receiver.receive().unwrap().is_none());
}

// ============================================================================
// Filtered
// ============================================================================

#[test]
fn filtered_receive_skips_other_labels() {
    let fx = Fixture::new(false);
    fx.send("/a", "first a");
    fx.send("/b", "only b");
    fx.send("/a", "second a");
    let mut receiver = fx.receiver(SubjectFilter::Exact("/a".to_string()));

    assert_eq!(text(&receiver.poll(SHORT).unwrap().unwrap()), "first a");
    assert_eq!(text(&receiver.poll(SHORT).unwrap().unwrap()), "second a");
    assert!(receiver.poll(SHORT).unwrap().is_none());

    assert_eq!(fx.system.labels(&fx.address), vec![Some("/b".to_string())]);
}

#[test]
fn filtered_peek_resumes_after_new_arrivals() {
    let fx = Fixture::new(false);
    fx.send("/b", "skip me");
    let mut receiver = fx.receiver(SubjectFilter::OneOf(vec!["/a".to_string(), "/c".to_string()]));
    assert!(receiver.poll(SHORT).unwrap().is_none());

    fx.send("/c", "found");
    let msg = receiver.poll(SHORT).unwrap().unwrap();
    assert_eq!(msg.subject(), Some("/c"));
}

#[test]
fn filtered_receive_after_the_peeked_message_was_taken_is_none() {
    let fx = Fixture::new(false);
    fx.send("/a", "wanted");
    fx.send("/b", "other");
    let mut filtered = fx.receiver(SubjectFilter::Exact("/a".to_string()));
    let mut other = fx.receiver(SubjectFilter::Any);

    assert!(filtered.peek(SHORT).unwrap().is_some());
    let stolen = other.poll(SHORT).unwrap().unwrap();
    assert_eq!(text(&stolen), "wanted");
    stolen.acknowledge().unwrap();

    assert!(filtered.receive().unwrap().is_none());
    assert_eq!(fx.system.labels(&fx.address), vec![Some("/b".to_string())]);
}

#[test]
fn transactional_filtered_receive_after_the_peeked_message_was_taken_is_none() {
    let fx = Fixture::new(true);
    fx.send("/a", "wanted");
    fx.send("/b", "other");
    let mut filtered = fx.receiver(SubjectFilter::Exact("/a".to_string()));
    let mut other = fx.receiver(SubjectFilter::Any);

    assert!(filtered.peek(SHORT).unwrap().is_some());
    other.poll(SHORT).unwrap().unwrap().acknowledge().unwrap();

    assert!(filtered.receive().unwrap().is_none());
    assert_eq!(fx.system.labels(&fx.address), vec![Some("/b".to_string())]);
    assert_eq!(fx.system.aborts(&fx.address), 0);

    // A later match is still found.
    fx.send("/a", "again");
    let msg = filtered.poll(SHORT).unwrap().unwrap();
    assert_eq!(text(&msg), "again");
}

#[test]
fn zero_timeout_poll_looks_at_the_queue() {
    let fx = Fixture::new(false);
    fx.send("/b", "skip me");
    fx.send("/a", "ready");
    let mut filtered = fx.receiver(SubjectFilter::Exact("/a".to_string()));
    let mut unfiltered = fx.receiver(SubjectFilter::Any);

    let msg = filtered.poll(Duration::ZERO).unwrap().unwrap();
    assert_eq!(text(&msg), "ready");
    assert!(filtered.poll(Duration::ZERO).unwrap().is_none());

    let msg = unfiltered.poll(Duration::ZERO).unwrap().unwrap();
    assert_eq!(text(&msg), "skip me");
}

#[test]
fn filter_matches_labels() {
    assert!(SubjectFilter::Any.matches(None));
    assert!(SubjectFilter::Exact("/a".to_string()).matches(Some("/a")));
    assert!(!SubjectFilter::Exact("/a".to_string()).matches(None));
    assert!(!SubjectFilter::OneOf(vec!["/a".to_string()]).matches(Some("/b")));
}

// ============================================================================
// Acknowledge Lifecycle
// ============================================================================

#[test]
fn acknowledge_commits_once() {
    let fx = Fixture::new(true);
    fx.send("/a", "one");
    let sent_commits = fx.system.commits(&fx.address);
    let mut receiver = fx.receiver(SubjectFilter::Any);

    let msg = receiver.poll(SHORT).unwrap().unwrap();
    assert!(msg.is_pending());
    msg.acknowledge().unwrap();
    msg.acknowledge().unwrap();
    assert!(!msg.is_pending());
    drop(msg);

    assert_eq!(fx.system.commits(&fx.address), sent_commits + 1);
    assert_eq!(fx.system.aborts(&fx.address), 0);
    assert_eq!(fx.system.len(&fx.address), 0);
}

#[test]
fn dropping_unacknowledged_message_aborts() {
    let fx = Fixture::new(true);
    fx.send("/a", "one");
    let mut receiver = fx.receiver(SubjectFilter::Any);

    let msg = receiver.poll(SHORT).unwrap().unwrap();
    assert_eq!(fx.system.len(&fx.address), 0);
    drop(msg);

    assert_eq!(fx.system.aborts(&fx.address), 1);
    assert_eq!(fx.system.len(&fx.address), 1);

    // Redelivered.
    let msg = receiver.poll(SHORT).unwrap().unwrap();
    assert_eq!(text(&msg), "one");
}

#[test]
fn non_transactional_messages_have_nothing_to_commit() {
    let fx = Fixture::new(false);
    fx.send("/a", "one");
    let mut receiver = fx.receiver(SubjectFilter::Any);

    let msg = receiver.poll(SHORT).unwrap().unwrap();
    assert!(!msg.is_pending());
    msg.acknowledge().unwrap();
    drop(msg);
    assert_eq!(fx.system.len(&fx.address), 0);
}

#[test]
fn receive_flips_transaction_mode_when_rejected() {
    let fx = Fixture::new(true);
    fx.send("/a", "one");
    fx.system.set_misreport_transactional(&fx.address, true);
    let mut receiver = fx.receiver(SubjectFilter::Any);
    assert!(!receiver.is_transactional());

    let msg = receiver.poll(SHORT).unwrap().unwrap();
    assert!(receiver.is_transactional());
    assert!(msg.is_pending());
    msg.acknowledge().unwrap();
}

// ============================================================================
// Received Headers
// ============================================================================

#[test]
fn plain_message_reports_normal_priority_only() {
    let fx = Fixture::new(false);
    fx.queue.send(NativeMessage::default(), None).unwrap();
    let mut receiver = fx.receiver(SubjectFilter::Any);

    let msg = receiver.poll(SHORT).unwrap().unwrap();
    assert!(msg.has_headers());
    let headers = msg.headers().unwrap();
    assert_eq!(headers.len(), 1);
    assert_eq!(headers.priority().unwrap(), Some(3));
    assert_eq!(headers.time_to_live(), None);
}

#[test]
fn extension_values_are_headers() {
    let fx = Fixture::new(false);
    let native = NativeMessage {
        extension: b"\"first\"=true".to_vec(),
        time_to_be_received: Some(Duration::from_secs(180)),
        ..NativeMessage::default()
    };
    fx.queue.send(native, None).unwrap();
    let mut receiver = fx.receiver(SubjectFilter::Any);

    let msg = receiver.poll(SHORT).unwrap().unwrap();
    let headers = msg.headers().unwrap();
    assert_eq!(headers.len(), 3);
    assert_eq!(headers.get("first").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(headers.time_to_live(), Some(Duration::from_secs(180)));
}

#[test]
fn malformed_extension_fails_only_that_message() {
    let fx = Fixture::new(false);
    let native = NativeMessage {
        label: Some("/bad".to_string()),
        extension: b"\"first\"=".to_vec(),
        ..NativeMessage::default()
    };
    fx.queue.send(native, None).unwrap();
    fx.send("/good", "fine");
    let mut receiver = fx.receiver(SubjectFilter::Any);

    let bad = receiver.poll(SHORT).unwrap().unwrap();
    assert_eq!(bad.subject(), Some("/bad"));
    assert!(matches!(bad.headers(), Err(Error::Parse(_))));
    assert!(matches!(bad.headers(), Err(Error::Parse(_))));

    let good = receiver.poll(SHORT).unwrap().unwrap();
    assert_eq!(good.headers().unwrap().len(), 1);
}

#[test]
fn to_message_copies_the_received_message() {
    let fx = Fixture::new(false);
    fx.sender
        .send(text_message(Some("/a"), "one").with_header("hello", "world"))
        .unwrap();
    let mut receiver = fx.receiver(SubjectFilter::Any);

    let copy = receiver.poll(SHORT).unwrap().unwrap().to_message().unwrap();
    assert_eq!(copy.subject(), Some("/a"));
    assert_eq!(copy.headers().get("hello").and_then(|v| v.as_str()), Some("world"));
    assert_eq!(copy.body().and_then(|b| b.as_text()), Some("one"));
}
