//! The duplex-socket collaborator the connection manager drives.
//!
//! A [`Transport`] creates [`Socket`] handles. Each handle is tagged with a
//! [`HandleId`], and every lifecycle callback for that handle is delivered
//! to the manager as a [`TransportEvent`] carrying the same ID, so callbacks
//! from a handle that has since been replaced can be recognised and dropped.

use std::fmt;

use url::Url;

use crate::error::Result;

/// Identifies one connection attempt. IDs increase monotonically within a
/// manager and are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Readiness of a socket handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReadyState {
    /// The handshake has not completed yet.
    #[default]
    Connecting,
    /// Ready for traffic.
    Open,
    /// A close was requested and is in progress.
    Closing,
    /// The connection is gone.
    Closed,
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Open => write!(f, "Open"),
            Self::Closing => write!(f, "Closing"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// A message payload, passed through without interpretation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// A UTF-8 text message.
    Text(String),
    /// A binary message.
    Binary(Vec<u8>),
}

impl Message {
    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(data)
    }
}

/// A lifecycle callback from one socket handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// The handle became ready for traffic.
    Ready,
    /// A message arrived.
    Message(Message),
    /// The transport reported a failure. A `Closed` event normally follows.
    Error(String),
    /// The handle is closed and will deliver nothing further.
    Closed,
}

impl TransportEvent {
    /// Short name of the event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Message(_) => "message",
            Self::Error(_) => "error",
            Self::Closed => "closed",
        }
    }
}

/// One live duplex connection attempt.
pub trait Socket {
    /// Current readiness, as observed right now.
    fn ready_state(&self) -> ReadyState;

    /// Queue a message for delivery.
    fn send(&self, message: Message) -> Result<()>;

    /// Request the connection to close. Completion is reported through a
    /// `Closed` event.
    fn close(&self);
}

/// Creates socket handles.
pub trait Transport {
    /// The handle type this transport produces.
    type Socket: Socket;

    /// Fails with [`NetworkError::TransportUnavailable`] if the transport
    /// cannot be used in the current environment.
    ///
    /// [`NetworkError::TransportUnavailable`]: crate::NetworkError::TransportUnavailable
    fn check_available(&self) -> Result<()> {
        Ok(())
    }

    /// Start connecting to `url`. Events for the new handle must carry `id`.
    fn connect(&mut self, id: HandleId, url: &Url) -> Result<Self::Socket>;
}
