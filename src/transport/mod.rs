//! Transport handles
//!
//! The broker never touches sockets directly. Each connection is represented
//! by a [`Transport`]: an opaque handle that can queue an outgoing frame and
//! request closure. Writes are fire-and-forget; a failed write is reported to
//! the caller and never blocks the broker.
//!
//! ```text
//!   socket task ──frames──► Broker::process_message(&transport, frame)
//!        ▲                                │
//!        │                                ▼
//!   OutboundQueue ◄──── transport.send() / transport.close()
//! ```

pub mod channel;

use std::fmt;

use bytes::Bytes;

pub use channel::{ChannelTransport, Outbound, OutboundQueue};

/// Identity of a transport connection
///
/// Assigned by the transport layer, unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Create a connection ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.as_u64())
    }
}

/// A single message exchanged with a client
///
/// Cheap to clone for fan-out: binary payloads are reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text message
    Text(String),
    /// Binary message
    Binary(Bytes),
}

impl Frame {
    /// Text content, if this is a text frame
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Frame::Text(text) => Some(text),
            Frame::Binary(_) => None,
        }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(data) => data.len(),
        }
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Frame::Text(text)
    }
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        Frame::Text(text.to_owned())
    }
}

impl From<Bytes> for Frame {
    fn from(data: Bytes) -> Self {
        Frame::Binary(data)
    }
}

/// Failure to queue an outgoing frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The connection is closed or closing
    #[error("transport closed")]
    Closed,
    /// The outbound queue is full; the frame was dropped
    #[error("outbound queue full")]
    Full,
}

/// Handle to one client connection
///
/// A device exclusively owns its transport for its lifetime. Implementations
/// must not block: `send` either queues the frame or fails immediately.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Connection identity, the key used to resolve close events
    fn id(&self) -> ConnectionId;

    /// Queue a frame for delivery
    fn send(&self, frame: Frame) -> Result<(), TransportError>;

    /// Request that the connection be closed
    ///
    /// The owning socket task reports the closure back to the broker, which
    /// performs the teardown.
    fn close(&self);

    /// Whether closure has been requested
    fn is_closed(&self) -> bool;
}
