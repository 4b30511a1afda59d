//! The publish/subscribe bus backend (`rv`, `rv+ipc` and `rv+cm` URIs).
//!
//! URI paths map onto dotted bus subjects: `rv://svc/orders/new` publishes on
//! `orders.new`. The URI host (and port, if any) names the bus service.

mod convert;
mod factory;
mod messaging;
mod read_only;

pub use convert::{body_from_bus, headers_from_bus, to_bus, BODY_FIELD, REPLY_TO_FIELD};
pub use factory::BusMessagingFactory;
pub use messaging::BusMessaging;
pub use read_only::BusReceivedMessage;

/// `/a/b` to `a.b`.
pub fn to_bus_subject(path: &str) -> String {
    path.trim_start_matches('/').replace('/', ".")
}

/// `a.b` to `/a/b`.
pub fn from_bus_subject(subject: &str) -> String {
    format!("/{}", subject.replace('.', "/"))
}

/// Returns `true` for `rv` and any `rv+*` scheme.
pub fn is_bus_scheme(scheme: &str) -> bool {
    scheme == "rv" || scheme.starts_with("rv+")
}

/// The service a bus URI connects to: its host, plus `:port` when present.
pub fn service_name(address: &url::Url) -> String {
    let host = address.host_str().unwrap_or_default();
    match address.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}
