//! The native queue backend (`msmq*` URIs).
//!
//! Handles are opened through a [`QueueOpener`](crate::native::QueueOpener)
//! and shared through a [`QueueCache`]. A URI path beyond the queue name is a
//! subject: it becomes the label of sent messages and the label filter of
//! receives, so several subjects can share one physical queue.

mod cache;
mod convert;
mod factory;
mod messaging;
mod read_only;
mod receiver;
mod sender;

pub use cache::QueueCache;
pub use convert::{headers_from_native, to_native};
pub use factory::QueueMessagingFactory;
pub use messaging::QueueMessaging;
pub use read_only::QueueMessage;
pub use receiver::{Receiver, SubjectFilter};
pub use sender::QueueSender;
