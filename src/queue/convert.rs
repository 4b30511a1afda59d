//! Conversion between [`Message`] and [`NativeMessage`].

use tracing::{trace, warn};

use super::cache::QueueCache;
use crate::address::{uri_to_queue_name, AddressCodec, QueueDetails};
use crate::error::Error;
use crate::headers::{self, ParseError};
use crate::message::{Headers, Message, REPLY_TO};
use crate::native::{NativeMessage, NORMAL_PRIORITY};

/// Builds the native form of an outgoing message.
///
/// `Priority` and `TimeToLive` become native fields. A `ReplyTo` that maps to
/// a queue becomes the response queue; one that does not is kept in the
/// extension as text so the receiver still sees it. Everything else goes into
/// the extension.
pub fn to_native(msg: Message, details: &QueueDetails, cache: &QueueCache) -> Result<NativeMessage, Error> {
    let (subject, mut headers, body) = msg.into_parts();

    let priority = headers.priority()?.unwrap_or(NORMAL_PRIORITY);
    let time_to_be_received = headers.time_to_live();

    let mut response_queue = None;
    if let Some(reply_to) = headers.reply_to() {
        let reply = uri_to_queue_name(&reply_to);
        if reply.is_valid() {
            match cache.get_or_add(&reply.queue_name) {
                Ok(queue) => {
                    headers.remove(REPLY_TO);
                    response_queue = Some(queue);
                }
                Err(e) => warn!(reply_to = %reply_to, error = %e, "Cannot open reply queue, keeping ReplyTo header"),
            }
        }
    }

    let extension = headers::encode_to_vec(headers.iter());
    trace!(len = extension.len(), priority, "Converted message to native form");

    Ok(NativeMessage {
        label: subject.or_else(|| details.subject.clone()),
        body,
        extension,
        priority,
        time_to_be_received,
        response_queue,
        recoverable: details.recoverable,
    })
}

/// Reconstructs the headers of a received native message.
///
/// `Priority` (always present) comes first, then `TimeToLive` (when the
/// message expires), then the decoded extension. `ReplyTo` is taken from the
/// response queue when it has one that maps onto a URI, and otherwise from
/// the extension.
pub fn headers_from_native(native: &NativeMessage, codec: &AddressCodec) -> Result<Headers, ParseError> {
    let mut headers = Headers::new();
    headers.insert(crate::message::PRIORITY, i64::from(native.priority));
    if let Some(ttl) = native.time_to_be_received {
        headers.set_time_to_live(Some(ttl));
    }
    for (key, value) in headers::decode(&native.extension)? {
        headers.insert(key, value);
    }
    if let Some(queue) = &native.response_queue {
        let multicast = queue.multicast_address();
        match codec.queue_name_to_uri(queue.address(), multicast.as_deref()) {
            Some(uri) => headers.set_reply_to(Some(uri)),
            None => warn!(address = queue.address(), "Response queue has no URI form"),
        }
    }
    Ok(headers)
}
