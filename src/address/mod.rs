//! Translation between `msmq*` URIs and native queue addresses.
//!
//! The forward direction ([`uri_to_queue_name`]) is total: it never fails, and
//! reports unknown schemes or path shapes as invalid [`QueueDetails`]. The
//! inverse direction ([`AddressCodec::queue_name_to_uri`]) is best effort.
//!
//! | scheme       | native address                                       |
//! |--------------|------------------------------------------------------|
//! | `msmq`       | `{host}\[private$\]{queue}`                          |
//! | `msmq+os`    | `FORMATNAME:DIRECT=OS:{host}\[private$\]{queue}`     |
//! | `msmq+tcp`   | `FORMATNAME:DIRECT=TCP:{host}\[private$\]{queue}`    |
//! | `msmq+http`  | `FORMATNAME:DIRECT=HTTP://{host}/msmq/[private$\]{queue}`  |
//! | `msmq+https` | `FORMATNAME:DIRECT=HTTPS://{host}/msmq/[private$\]{queue}` |
//! | `msmq+pgm`   | `FORMATNAME:MULTICAST={host}:{port}`                 |

mod format_name;

pub use format_name::FormatName;

use ::config::Config;
use tracing::trace;
use url::Url;

use crate::error::Error;

pub(crate) const PRIVATE_SEGMENT: &str = "private$";
pub(crate) const LOCAL_HOST: &str = ".";

// ============================================================================
// QueueDetails
// ============================================================================

/// The native view of a queue URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDetails {
    /// Native address, including any `;subqueue` suffix. Empty when the URI was
    /// not recognised.
    pub queue_name: String,
    /// The URI fragment, if any.
    pub subqueue: Option<String>,
    /// Path segments after the queue name, exposed with a leading `/`. Used as
    /// the message label filter on shared queues.
    pub subject: Option<String>,
    /// `false` iff the URI carries `express=true`.
    pub recoverable: bool,
}

impl QueueDetails {
    fn invalid() -> Self {
        Self {
            queue_name: String::new(),
            subqueue: None,
            subject: None,
            recoverable: true,
        }
    }

    /// Returns `true` if the URI mapped onto a native address.
    pub fn is_valid(&self) -> bool {
        !self.queue_name.is_empty()
    }
}

// ============================================================================
// Forward Mapping
// ============================================================================

/// Maps a queue URI onto its native address.
///
/// Never fails. An unrecognised scheme, or a path without a queue segment,
/// yields details for which [`QueueDetails::is_valid`] is `false`.
pub fn uri_to_queue_name(uri: &Url) -> QueueDetails {
    let Some(segments) = uri.path_segments() else {
        return QueueDetails::invalid();
    };
    let mut segments = segments.peekable();

    let private = segments
        .next_if(|s| s.eq_ignore_ascii_case(PRIVATE_SEGMENT))
        .is_some();
    let queue = match segments.next() {
        Some(q) if !q.is_empty() => q,
        _ => return QueueDetails::invalid(),
    };
    let topic: Vec<&str> = segments.collect();
    let subject = if topic.iter().all(|s| s.is_empty()) {
        None
    } else {
        Some(format!("/{}", topic.join("/")))
    };

    let mut host = uri.host_str().unwrap_or_default();
    if private && host.eq_ignore_ascii_case("localhost") {
        host = LOCAL_HOST;
    }

    let prefix = if private { "private$\\" } else { "" };
    let mut name = match uri.scheme() {
        "msmq" => format!("{host}\\{prefix}{queue}"),
        "msmq+os" => format!("FORMATNAME:DIRECT=OS:{host}\\{prefix}{queue}"),
        "msmq+tcp" => format!("FORMATNAME:DIRECT=TCP:{host}\\{prefix}{queue}"),
        "msmq+http" => format!("FORMATNAME:DIRECT=HTTP://{host}/msmq/{prefix}{queue}"),
        "msmq+https" => format!("FORMATNAME:DIRECT=HTTPS://{host}/msmq/{prefix}{queue}"),
        "msmq+pgm" => match uri.port() {
            Some(port) => format!("FORMATNAME:MULTICAST={host}:{port}"),
            None => return QueueDetails::invalid(),
        },
        _ => return QueueDetails::invalid(),
    };

    let subqueue = uri.fragment().filter(|f| !f.is_empty()).map(str::to_string);
    if let Some(sub) = &subqueue {
        name.push(';');
        name.push_str(sub);
    }

    let express = uri
        .query_pairs()
        .any(|(k, v)| k == "express" && v.eq_ignore_ascii_case("true"));

    trace!(uri = %uri, queue_name = %name, "Mapped URI to queue name");
    QueueDetails {
        queue_name: name,
        subqueue,
        subject,
        recoverable: !express,
    }
}

/// Like [`uri_to_queue_name`], but rejects unrecognised URIs.
pub(crate) fn require_queue_name(uri: &Url) -> Result<QueueDetails, Error> {
    let details = uri_to_queue_name(uri);
    if details.is_valid() {
        Ok(details)
    } else {
        Err(Error::InvalidAddress {
            uri: uri.to_string(),
            reason: format!("scheme '{}' or path is not a queue address", uri.scheme()),
        })
    }
}

// ============================================================================
// AddressCodec
// ============================================================================

/// Bidirectional address translation bound to a local machine name.
///
/// The machine name replaces the `.` host when a native address is rendered as
/// a URI.
#[derive(Debug, Clone)]
pub struct AddressCodec {
    machine_name: String,
}

impl AddressCodec {
    /// Creates a codec from configuration.
    ///
    /// # Configuration Keys
    ///
    /// - `machine_name`: Name of the local machine (defaults to the
    ///   `COMPUTERNAME` or `HOSTNAME` environment variable, else `localhost`)
    pub fn new(config: &Config) -> Result<Self, Error> {
        Self::new_named(config, "")
    }

    /// Creates a codec with configuration namespacing, see
    /// [`new()`](Self::new).
    pub fn new_named(config: &Config, name: &str) -> Result<Self, Error> {
        Ok(Self::with_machine_name(crate::config::machine_name(config, name)?))
    }

    /// Creates a codec with an explicit machine name.
    pub fn with_machine_name(machine_name: impl Into<String>) -> Self {
        Self {
            machine_name: machine_name.into(),
        }
    }

    /// The name substituted for the `.` host.
    pub fn machine_name(&self) -> &str {
        &self.machine_name
    }

    /// See [`uri_to_queue_name`].
    pub fn uri_to_queue_name(&self, uri: &Url) -> QueueDetails {
        uri_to_queue_name(uri)
    }

    /// Maps a native address back onto a URI.
    ///
    /// `multicast` is the multicast address the queue is bound to, if any. When
    /// it is non-empty a `DIRECT=OS` address is rendered as `msmq+pgm` so that
    /// replies go to the multicast group rather than the local queue.
    ///
    /// Returns `None` for anything that is not a recognised native address.
    pub fn queue_name_to_uri(&self, native: &str, multicast: Option<&str>) -> Option<Url> {
        let parsed = FormatName::parse(native)?;
        let uri = parsed.to_uri(&self.machine_name, multicast.filter(|m| !m.is_empty()))?;
        trace!(native, uri = %uri, "Mapped queue name to URI");
        Some(uri)
    }
}
