use bytes::Bytes;
use rust_decimal::Decimal;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use super::NativeError;

/// A typed field of a [`BusMessage`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Decimal(Decimal),
    Float(f64),
    Bool(bool),
    Bytes(Bytes),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BusField {
    pub name: String,
    pub value: FieldValue,
}

/// A message in bus form: dotted subjects and a list of named fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BusMessage {
    pub send_subject: String,
    pub reply_subject: Option<String>,
    pub fields: Vec<BusField>,
    /// Sequence number assigned by a certified transport.
    pub sequence: Option<u64>,
}

impl BusMessage {
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    pub fn add_field(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.push(BusField {
            name: name.into(),
            value,
        });
    }
}

/// Delivery guarantee of a bus connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusMode {
    /// Best effort multicast.
    Reliable,
    /// Reliable, restricted to the local host.
    Ipc,
    /// Certified delivery under the given correspondent name. Messages must be
    /// confirmed explicitly.
    Certified { name: String },
}

/// Connection settings for one bus service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub network: Option<String>,
    pub daemon: Option<String>,
    pub mode: BusMode,
}

/// A connection to a bus service.
pub trait BusTransport: Send + Sync + Debug {
    fn send(&self, msg: BusMessage) -> Result<(), NativeError>;

    /// Starts listening on a subject, which may contain wildcards. Each listener
    /// queues its messages separately.
    fn create_listener(&self, subject: &str) -> Result<Arc<dyn BusListener>, NativeError>;

    fn close(&self);
}

/// Messages arriving on one subject.
pub trait BusListener: Send + Sync + Debug {
    fn subject(&self) -> &str;

    /// Waits until a message is queued. Returns `false` if none arrived within
    /// the timeout.
    fn peek(&self, timeout: Duration) -> Result<bool, NativeError>;

    /// Takes the next queued message without waiting.
    fn take(&self) -> Option<BusMessage>;

    /// Confirms a certified message.
    fn confirm(&self, msg: &BusMessage) -> Result<(), NativeError>;

    fn close(&self);
}

/// Opens connections to bus services.
pub trait BusConnector: Send + Sync + Debug {
    fn connect(&self, service: &str, config: &ServiceConfig) -> Result<Arc<dyn BusTransport>, NativeError>;
}
