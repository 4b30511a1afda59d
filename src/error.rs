use crate::headers::ParseError;
use crate::native::NativeError;
use thiserror::Error;

/// The error type for mqlink operations.
///
/// Covers address translation, header decoding, native transport failures and
/// lifecycle misuse. A receive that times out is not an error; it is reported
/// as `Ok(None)` by the receiving APIs.
///
/// [`Error::InvalidAddress`] is the only variant a
/// [`CompositeMessagingFactory`](crate::CompositeMessagingFactory) treats as
/// "try the next factory" when raised from address translation. Everything else
/// is propagated to the caller unchanged.
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // I/O Errors
    // ============================================================================

    /// Low-level I/O error from the operating system, e.g. failing to spawn a
    /// thread.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ============================================================================
    // Addressing Errors
    // ============================================================================

    /// The URI could not be translated into a native address.
    #[error("Invalid address '{uri}': {reason}")]
    InvalidAddress {
        /// The offending URI, as given.
        uri: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A message subject that does not start with `/`.
    #[error("Invalid subject '{0}': subjects must start with '/'")]
    InvalidSubject(String),

    // ============================================================================
    // Message Errors
    // ============================================================================

    /// The header extension of a received message could not be decoded.
    ///
    /// Scoped to the message being read; the receiver itself stays usable.
    #[error("Header parse error: {0}")]
    Parse(#[from] ParseError),

    /// A priority outside `0..=31`.
    #[error("Invalid priority {0}, expected a value between 0 and 31")]
    InvalidPriority(i64),

    // ============================================================================
    // Transport Errors
    // ============================================================================

    /// Failure reported by the native queue or bus transport.
    #[error("Native transport error: {0}")]
    Native(#[from] NativeError),

    /// Operation attempted on a closed messaging object or dispatcher.
    #[error("Object disposed: {0}")]
    ObjectDisposed(&'static str),

    /// The address was recognised but the requested mode is not available.
    #[error("Not supported: {0}")]
    NotSupported(String),

    // ============================================================================
    // Configuration Errors
    // ============================================================================

    /// Configuration file parsing or key lookup failed.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A composite factory was built from an empty list.
    #[error("At least one messaging factory is required")]
    NoFactories,
}

impl Error {
    /// Returns `true` if this is a native timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Native(e) if e.is_timeout())
    }

    /// Returns `true` if the native transport refused the transaction mode.
    pub fn is_transaction_usage(&self) -> bool {
        matches!(self, Error::Native(e) if e.is_transaction_usage())
    }
}
