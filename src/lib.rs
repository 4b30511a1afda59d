//! mqlink - URI-addressed messaging over native queues and a publish/subscribe
//! bus
//!
//! mqlink hides the native transports behind one set of traits. Callers name
//! an endpoint with a URI (`msmq://host/private$/orders`, `rv://svc/orders`),
//! ask a [`MessagingFactory`] for a [`Messaging`] or
//! [`MultiSubjectMessaging`] object, and exchange [`Message`]s carrying a
//! subject, typed headers and a body.
//!
//! The transports themselves are reached only through the traits in
//! [`native`]. In-process implementations ([`native::MemoryQueueSystem`],
//! [`native::MemoryBus`]) are included.

// Internal-only modules
pub(crate) mod config;
pub(crate) mod error;
pub(crate) mod factory;
pub(crate) mod worker;

// Backends and codecs, public for their free functions and native types
pub mod address;
pub mod bus;
pub mod dispatch;
pub mod headers;
pub mod message;
pub mod native;
pub mod queue;

// These are the intended public API
pub use address::{AddressCodec, QueueDetails};
pub use bus::{BusMessaging, BusMessagingFactory, BusReceivedMessage};
pub use dispatch::{Callback, ListenerDispatcher, QueueDispatcher};
pub use error::Error;
pub use factory::{
    receive_async, CompositeMessagingFactory, Messaging, MessagingFactory, MultiSubjectMessaging, Received,
};
pub use headers::{HeaderValue, ParseError};
pub use message::{Body, Headers, Message, ReadOnlyMessage};
pub use queue::{QueueMessage, QueueMessaging, QueueMessagingFactory};
pub use worker::Worker;

/// Convenient re-exports of commonly used types.
pub mod prelude {
    pub use crate::error::Error;
    pub use crate::factory::{
        receive_async, CompositeMessagingFactory, Messaging, MessagingFactory, MultiSubjectMessaging,
    };
    pub use crate::headers::HeaderValue;
    pub use crate::message::{content_types, Body, Headers, Message, ReadOnlyMessage};
    pub use crate::worker::Worker;
    pub use crate::{BusMessagingFactory, Callback, QueueMessagingFactory};
}
