//! The publish/subscribe backend: conversion, messaging and listener dispatch.

mod common;

use common::*;
use bytes::Bytes;
use mqlink::bus::{body_from_bus, headers_from_bus, to_bus, BODY_FIELD, REPLY_TO_FIELD};
use mqlink::dispatch::SubjectRouter;
use mqlink::message::content_types;
use mqlink::native::{BusConnector, BusMessage, BusMode, FieldValue, MemoryBus, ServiceConfig};
use mqlink::prelude::*;
use mqlink::{BusReceivedMessage, ListenerDispatcher};
use std::sync::Arc;
use std::time::Duration;

const SHORT: Duration = Duration::from_millis(50);
const LONG: Duration = Duration::from_secs(5);

fn source() -> url::Url {
    url("rv://service/test/topic")
}

fn reliable() -> ServiceConfig {
    ServiceConfig {
        network: None,
        daemon: None,
        mode: BusMode::Reliable,
    }
}

// ============================================================================
// Outgoing Conversion
// ============================================================================

#[test]
fn converts_string_body() {
    let bus = to_bus(Message::new().with_body("hello world"), &source()).unwrap();
    assert_eq!(bus.field(BODY_FIELD), Some(&FieldValue::String("hello world".to_string())));
}

#[test]
fn converts_byte_body() {
    let bus = to_bus(Message::new().with_body(b"hello world".to_vec()), &source()).unwrap();
    assert_eq!(bus.field(BODY_FIELD), Some(&FieldValue::Bytes(Bytes::from_static(b"hello world"))));
}

#[test]
fn converts_subject_replacing_slashes_with_dots() {
    let msg = Message::new().with_subject("/other/topic").unwrap();
    assert_eq!(to_bus(msg, &source()).unwrap().send_subject, "other.topic");

    // Without a subject the address path is used.
    assert_eq!(to_bus(Message::new(), &source()).unwrap().send_subject, "test.topic");
}

#[test]
fn empty_subject_is_rejected() {
    let err = to_bus(Message::new(), &url("rv://service/")).unwrap_err();
    assert!(matches!(err, Error::InvalidSubject(_)));
}

#[test]
fn reply_to_on_same_service_becomes_reply_subject() {
    let mut msg = Message::new();
    msg.headers_mut().set_reply_to(Some(url("rv://service/other/topic")));
    let bus = to_bus(msg, &source()).unwrap();
    assert_eq!(bus.reply_subject.as_deref(), Some("other.topic"));
    assert_eq!(bus.field(REPLY_TO_FIELD), None);
}

#[test]
fn reply_to_elsewhere_becomes_field() {
    let mut msg = Message::new();
    msg.headers_mut().set_reply_to(Some(url("msmq://host/private$/replies")));
    let bus = to_bus(msg, &source()).unwrap();
    assert_eq!(bus.reply_subject, None);
    assert_eq!(
        bus.field(REPLY_TO_FIELD),
        Some(&FieldValue::String("msmq://host/private$/replies".to_string()))
    );

    let mut msg = Message::new();
    msg.headers_mut().set_reply_to(Some(url("rv://elsewhere/other")));
    assert!(to_bus(msg, &source()).unwrap().reply_subject.is_none());
}

#[test]
fn converts_headers_to_fields() {
    let mut msg = Message::new().with_header("custom1", "hello").with_header("count", 7);
    msg.headers_mut().set_content_type(Some(content_types::PLAIN_TEXT));
    msg.headers_mut().set_priority(Some(1)).unwrap();
    msg.headers_mut().set_time_to_live(Some(Duration::from_secs(60)));
    msg.headers_mut().insert("nothing", HeaderValue::Null);

    let bus = to_bus(msg, &source()).unwrap();

    assert_eq!(bus.field("custom1"), Some(&FieldValue::String("hello".to_string())));
    assert_eq!(bus.field("count"), Some(&FieldValue::Int(7)));
    assert_eq!(bus.field("ContentType"), Some(&FieldValue::String("text/plain".to_string())));
    assert_eq!(bus.field("Priority"), Some(&FieldValue::Int(1)));
    assert_eq!(bus.field("TimeToLive"), Some(&FieldValue::String("00:01:00".to_string())));
    assert_eq!(bus.field("nothing"), None);
}

// ============================================================================
// Incoming Conversion
// ============================================================================

fn with_field(name: &str, value: FieldValue) -> BusMessage {
    let mut msg = BusMessage {
        send_subject: "test.topic".to_string(),
        ..BusMessage::default()
    };
    msg.add_field(name, value);
    msg
}

#[test]
fn reads_content_type() {
    for kind in [
        content_types::JSON,
        content_types::XML,
        content_types::BINARY,
        content_types::PLAIN_TEXT,
    ] {
        let headers = headers_from_bus(&with_field("ContentType", FieldValue::String(kind.to_string())), &source());
        assert_eq!(headers.content_type(), Some(kind));
        assert_eq!(headers.len(), 1);
    }
}

#[test]
fn reads_time_to_live() {
    let empty = headers_from_bus(&BusMessage::default(), &source());
    assert_eq!(empty.time_to_live(), None);
    assert!(empty.is_empty());

    let headers = headers_from_bus(&with_field("TimeToLive", FieldValue::String("00:01:00".to_string())), &source());
    assert_eq!(headers.time_to_live(), Some(Duration::from_secs(60)));
    assert_eq!(headers.len(), 1);
}

#[test]
fn reads_priority_from_int_or_text() {
    let empty = headers_from_bus(&BusMessage::default(), &source());
    assert_eq!(empty.priority().unwrap(), None);

    let headers = headers_from_bus(&with_field("Priority", FieldValue::Int(1)), &source());
    assert_eq!(headers.priority().unwrap(), Some(1));

    let headers = headers_from_bus(&with_field("Priority", FieldValue::String("1".to_string())), &source());
    assert_eq!(headers.priority().unwrap(), Some(1));
}

#[test]
fn body_is_not_a_header() {
    let msg = with_field(BODY_FIELD, FieldValue::String("value".to_string()));
    let headers = headers_from_bus(&msg, &source());
    assert!(!headers.contains_key(BODY_FIELD));
    assert!(headers.is_empty());
    assert_eq!(body_from_bus(&msg).unwrap().as_text(), Some("value"));
}

#[test]
fn reply_field_wins_over_reply_subject() {
    let mut msg = with_field(REPLY_TO_FIELD, FieldValue::String("msmq://host/private$/replies".to_string()));
    msg.reply_subject = Some("other.topic".to_string());
    let headers = headers_from_bus(&msg, &source());
    assert_eq!(headers.reply_to(), Some(url("msmq://host/private$/replies")));

    msg.fields.clear();
    let headers = headers_from_bus(&msg, &source());
    assert_eq!(headers.reply_to(), Some(url("rv://service/other/topic")));
}

// ============================================================================
// Messaging
// ============================================================================

fn bus_config() -> config::Config {
    config::Config::builder()
        .set_default("daemon", "tcp:7500")
        .unwrap()
        .set_default("certified.cm_name", "orders-cm")
        .unwrap()
        .set_default("certified.network", ";239.1.1.1")
        .unwrap()
        .build()
        .unwrap()
}

#[test]
fn sends_and_receives_on_a_subject() {
    init_tracing();
    let bus = MemoryBus::new();
    let factory = bus_factory(&bus, &bus_config());
    let messaging = factory.try_create(&source()).unwrap().unwrap();

    // Listening starts with the first receive.
    assert!(messaging.receive(SHORT).unwrap().is_none());
    messaging.send(text_message(None, "hello")).unwrap();

    let msg = messaging.receive(LONG).unwrap().unwrap();
    assert_eq!(msg.subject(), Some("/test/topic"));
    assert_eq!(msg.body().and_then(|b| b.as_text()), Some("hello"));
    assert!(!msg.has_headers());
    msg.acknowledge().unwrap();

    assert_eq!(
        bus.connections(),
        vec![(
            "service".to_string(),
            ServiceConfig {
                network: None,
                daemon: Some("tcp:7500".to_string()),
                mode: BusMode::Reliable,
            }
        )]
    );
}

#[test]
fn ipc_scheme_selects_ipc_mode() {
    let bus = MemoryBus::new();
    let factory = bus_factory(&bus, &bus_config());
    factory.try_create(&url("rv+ipc://service/test")).unwrap().unwrap();
    assert_eq!(bus.connections()[0].1.mode, BusMode::Ipc);
}

#[test]
fn certified_messages_are_confirmed_once() {
    init_tracing();
    let bus = MemoryBus::new();
    let factory = bus_factory(&bus, &bus_config());
    let messaging = factory.try_create(&url("rv+cm://certified/orders")).unwrap().unwrap();

    let settings = &bus.connections()[0].1;
    assert_eq!(settings.mode, BusMode::Certified { name: "orders-cm".to_string() });
    assert_eq!(settings.network.as_deref(), Some(";239.1.1.1"));

    assert!(messaging.receive(SHORT).unwrap().is_none());
    messaging.send(text_message(None, "order")).unwrap();
    let msg = messaging.receive(LONG).unwrap().unwrap();
    let received = msg.downcast_ref::<BusReceivedMessage>().unwrap();
    assert!(received.is_certified());

    msg.acknowledge().unwrap();
    msg.acknowledge().unwrap();
    assert_eq!(bus.confirmations("certified"), vec![("orders".to_string(), 1)]);
}

#[test]
fn certified_without_name_is_not_supported() {
    let bus = MemoryBus::new();
    let factory = bus_factory(&bus, &bus_config());
    let err = factory.try_create(&url("rv+cm://service/orders")).err().unwrap();
    assert!(matches!(err, Error::NotSupported(_)));

    let err = factory.try_create(&url("rv+foo://service/orders")).err().unwrap();
    assert!(matches!(err, Error::NotSupported(_)));
    assert!(bus.connections().is_empty());
}

#[test]
fn other_schemes_are_left_alone() {
    let bus = MemoryBus::new();
    let factory = bus_factory(&bus, &bus_config());
    assert!(factory.try_create(&url("msmq://host/queue")).unwrap().is_none());
    assert!(factory.try_create_multi_subject(&url("msmq://host/queue")).unwrap().is_none());
}

#[test]
fn closed_messaging_is_disposed() {
    let bus = MemoryBus::new();
    let factory = bus_factory(&bus, &bus_config());
    let messaging = factory.try_create(&source()).unwrap().unwrap();
    assert!(messaging.receive(SHORT).unwrap().is_none());
    assert_eq!(bus.listener_count("service"), 1);

    messaging.close();
    assert_eq!(bus.listener_count("service"), 0);
    assert!(matches!(messaging.receive(SHORT), Err(Error::ObjectDisposed(_))));
    assert!(matches!(messaging.send(Message::new()), Err(Error::ObjectDisposed(_))));
}

// ============================================================================
// Listener Dispatch
// ============================================================================

fn dispatcher(bus: &Arc<MemoryBus>) -> ListenerDispatcher {
    let transport = bus.connect("service", &reliable()).unwrap();
    ListenerDispatcher::new(url("rv://service/root"), transport)
}

#[test]
fn dispatches_each_subject_to_its_subscription() {
    init_tracing();
    let bus = MemoryBus::new();
    let dispatcher = dispatcher(&bus);
    let (on_a, seen_a) = recorder();
    let (on_b, seen_b) = recorder();
    dispatcher.subscribe(Some("/a"), on_a).unwrap();
    dispatcher.subscribe(Some("/b/c"), on_b).unwrap();
    assert_eq!(bus.listener_count("service"), 2);

    dispatcher.send(text_message(Some("/b/c"), "for b")).unwrap();
    assert!(dispatcher.dispatch_message(LONG).unwrap());
    dispatcher.send(text_message(Some("/a"), "for a")).unwrap();
    assert!(dispatcher.dispatch_message(LONG).unwrap());

    assert_eq!(seen_a.lock().unwrap()[0].1.as_deref(), Some("for a"));
    assert_eq!(seen_b.lock().unwrap()[0], (Some("/b/c".to_string()), Some("for b".to_string())));
}

#[test]
fn one_peek_in_flight_per_subscription() {
    let bus = MemoryBus::new();
    let dispatcher = dispatcher(&bus);
    let (on_a, _) = recorder();
    let (on_b, _) = recorder();
    dispatcher.subscribe(Some("/a"), on_a).unwrap();
    dispatcher.subscribe(Some("/b"), on_b).unwrap();

    for _ in 0..3 {
        assert!(!dispatcher.dispatch_message(SHORT).unwrap());
        assert!(dispatcher.outstanding_peeks() <= 2);
    }
}

#[test]
fn nothing_published_times_out() {
    let bus = MemoryBus::new();
    let dispatcher = dispatcher(&bus);
    let (on_a, seen) = recorder();
    dispatcher.subscribe(Some("/a"), on_a).unwrap();

    assert!(!dispatcher.dispatch_message(SHORT).unwrap());
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn same_subject_shares_a_listener() {
    let bus = MemoryBus::new();
    let dispatcher = dispatcher(&bus);
    let (first, _) = recorder();
    let (second, _) = recorder();
    dispatcher.subscribe(Some("/a"), first.clone()).unwrap();
    dispatcher.subscribe(Some("/a"), second.clone()).unwrap();
    assert_eq!(dispatcher.active_subjects(), 1);
    assert_eq!(bus.listener_count("service"), 1);

    assert!(dispatcher.unsubscribe(Some("/a"), &first).unwrap());
    assert_eq!(dispatcher.active_subjects(), 1);
    assert!(dispatcher.unsubscribe(Some("/a"), &second).unwrap());
    assert_eq!(dispatcher.active_subjects(), 0);
    assert_eq!(bus.listener_count("service"), 0);
    assert!(!dispatcher.unsubscribe(Some("/a"), &second).unwrap());
}

#[test]
fn default_subscription_uses_address_path() {
    let bus = MemoryBus::new();
    let dispatcher = dispatcher(&bus);
    let (on_root, seen) = recorder();
    dispatcher.subscribe(None, on_root).unwrap();

    dispatcher.send(text_message(None, "to root")).unwrap();
    assert!(dispatcher.dispatch_message(LONG).unwrap());
    assert_eq!(seen.lock().unwrap()[0].0.as_deref(), Some("/root"));
}

#[test]
fn closed_listener_dispatcher_is_disposed() {
    let bus = MemoryBus::new();
    let dispatcher = dispatcher(&bus);
    let (on_a, _) = recorder();
    dispatcher.subscribe(Some("/a"), on_a.clone()).unwrap();
    dispatcher.close();

    assert_eq!(bus.listener_count("service"), 0);
    assert!(matches!(dispatcher.dispatch_message(SHORT), Err(Error::ObjectDisposed(_))));
    assert!(matches!(dispatcher.subscribe(Some("/a"), on_a), Err(Error::ObjectDisposed(_))));
}

#[test]
fn peek_threads_follow_subscriptions() {
    let bus = MemoryBus::new();
    let dispatcher = dispatcher(&bus);
    let (on_a, _) = recorder();
    let (on_b, _) = recorder();
    dispatcher.subscribe(Some("/a"), on_a.clone()).unwrap();
    dispatcher.subscribe(Some("/b"), on_b).unwrap();
    assert_eq!(dispatcher.peek_threads(), 2);

    for _ in 0..5 {
        assert!(!dispatcher.dispatch_message(SHORT).unwrap());
        assert_eq!(dispatcher.peek_threads(), 2);
    }

    assert!(dispatcher.unsubscribe(Some("/a"), &on_a).unwrap());
    assert_eq!(dispatcher.peek_threads(), 1);

    dispatcher.close();
    assert_eq!(dispatcher.peek_threads(), 0);
}

#[test]
fn close_ends_peeks_in_flight() {
    let bus = MemoryBus::new();
    let dispatcher = Arc::new(dispatcher(&bus));
    let (on_a, seen_a) = recorder();
    dispatcher.subscribe(Some("/a"), on_a).unwrap();

    let waiting = dispatcher.clone();
    let dispatching = std::thread::spawn(move || waiting.dispatch_message(LONG));
    std::thread::sleep(SHORT);

    let started = std::time::Instant::now();
    dispatcher.close();
    assert!(started.elapsed() < LONG / 2);
    assert_eq!(dispatcher.peek_threads(), 0);

    let result = dispatching.join().unwrap();
    assert!(matches!(result, Err(Error::ObjectDisposed(_))));
    assert!(seen_a.lock().unwrap().is_empty());
}

// ============================================================================
// Subject Router
// ============================================================================

#[test]
fn router_listens_while_referenced() {
    let bus = MemoryBus::new();
    let transport = bus.connect("service", &reliable()).unwrap();
    let mut router = SubjectRouter::new(transport);

    let first = router.acquire("a.b").unwrap();
    let second = router.acquire("a.b").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(router.refs("a.b"), 2);
    assert_eq!(bus.listener_count("service"), 1);

    assert!(!router.release("a.b"));
    assert_eq!(bus.listener_count("service"), 1);
    assert!(router.release("a.b"));
    assert_eq!(bus.listener_count("service"), 0);
    assert!(router.listener("a.b").is_none());
    assert!(!router.release("a.b"));
}
