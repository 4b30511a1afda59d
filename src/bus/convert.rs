use rust_decimal::Decimal;
use tracing::trace;
use url::Url;

use super::{from_bus_subject, is_bus_scheme, to_bus_subject};
use crate::error::Error;
use crate::headers::{timespan, HeaderValue};
use crate::message::{Body, Headers, Message, REPLY_TO};
use crate::native::{BusMessage, FieldValue};

/// Field carrying a reply address that is not on the sending service.
pub const REPLY_TO_FIELD: &str = "X-ReplyTo";
/// Field carrying the message body.
pub const BODY_FIELD: &str = "Body";

/// Builds the bus form of an outgoing message sent through `source`.
///
/// A `ReplyTo` on the same bus service becomes the reply subject, any other
/// becomes an `X-ReplyTo` field. Headers become fields of the matching type,
/// with `TimeToLive` written as timespan text. Null headers have no field
/// type and are dropped.
pub fn to_bus(msg: Message, source: &Url) -> Result<BusMessage, Error> {
    let (subject, headers, body) = msg.into_parts();

    let send_subject = to_bus_subject(subject.as_deref().unwrap_or(source.path()));
    if send_subject.is_empty() {
        return Err(Error::InvalidSubject(String::new()));
    }
    let mut bus = BusMessage {
        send_subject,
        ..BusMessage::default()
    };

    if let Some(reply_to) = headers.reply_to() {
        if same_service(source, &reply_to) {
            bus.reply_subject = Some(to_bus_subject(reply_to.path()));
        } else {
            bus.add_field(REPLY_TO_FIELD, FieldValue::String(reply_to.to_string()));
        }
    }

    for (key, value) in headers.iter() {
        if key == REPLY_TO {
            continue;
        }
        let field = match value {
            HeaderValue::String(s) => FieldValue::String(s.clone()),
            HeaderValue::Int(i) => FieldValue::Int(*i),
            HeaderValue::Decimal(d) => FieldValue::Decimal(*d),
            HeaderValue::Bool(b) => FieldValue::Bool(*b),
            HeaderValue::Uri(u) => FieldValue::String(u.to_string()),
            HeaderValue::Duration(d) => FieldValue::String(timespan::format(*d)),
            HeaderValue::Null => {
                trace!(key, "Dropping null header");
                continue;
            }
        };
        bus.add_field(key, field);
    }

    match body {
        Some(Body::Bytes(b)) => bus.add_field(BODY_FIELD, FieldValue::Bytes(b)),
        Some(Body::Text(t)) => bus.add_field(BODY_FIELD, FieldValue::String(t)),
        None => {}
    }
    Ok(bus)
}

fn same_service(source: &Url, reply_to: &Url) -> bool {
    is_bus_scheme(source.scheme())
        && is_bus_scheme(reply_to.scheme())
        && source.host_str() == reply_to.host_str()
        && source.port() == reply_to.port()
}

/// Reconstructs the headers of a received bus message.
///
/// Every field except `Body` is a header. `ReplyTo` comes from a non-blank
/// `X-ReplyTo` field, else from the reply subject resolved against `source`.
pub fn headers_from_bus(msg: &BusMessage, source: &Url) -> Headers {
    let mut headers = Headers::new();
    if let Some(reply) = msg.reply_subject.as_deref().filter(|r| !r.trim().is_empty()) {
        if let Ok(uri) = source.join(&from_bus_subject(reply)) {
            headers.set_reply_to(Some(uri));
        }
    }
    for field in &msg.fields {
        if field.name == BODY_FIELD {
            continue;
        }
        if field.name == REPLY_TO_FIELD {
            if let FieldValue::String(s) = &field.value {
                if let Ok(uri) = Url::parse(s.trim()) {
                    headers.set_reply_to(Some(uri));
                    continue;
                }
            }
        }
        headers.insert(field.name.clone(), header_value(&field.value));
    }
    headers
}

fn header_value(value: &FieldValue) -> HeaderValue {
    match value {
        FieldValue::String(s) => HeaderValue::String(s.clone()),
        FieldValue::Int(i) => HeaderValue::Int(*i),
        FieldValue::Decimal(d) => HeaderValue::Decimal(*d),
        FieldValue::Float(f) => match Decimal::try_from(*f) {
            Ok(d) => HeaderValue::Decimal(d),
            Err(_) => HeaderValue::String(f.to_string()),
        },
        FieldValue::Bool(b) => HeaderValue::Bool(*b),
        FieldValue::Bytes(b) => HeaderValue::String(String::from_utf8_lossy(b).into_owned()),
    }
}

/// The `Body` field, if present.
pub fn body_from_bus(msg: &BusMessage) -> Option<Body> {
    match msg.field(BODY_FIELD)? {
        FieldValue::Bytes(b) => Some(Body::Bytes(b.clone())),
        FieldValue::String(s) => Some(Body::Text(s.clone())),
        other => Some(Body::Text(header_value(other).to_string())),
    }
}
