//! Error types
//!
//! [`BrokerError`] covers everything a client can provoke with a bad frame.
//! None of its variants are fatal: the broker logs them and keeps serving.
//! [`Error`] is the server-layer error for socket and handshake failures.

use crate::transport::ConnectionId;

/// Result alias for server-layer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Server-layer error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// WebSocket upgrade did not complete in time
    #[error("WebSocket handshake timed out")]
    HandshakeTimeout,

    /// Broker rejected an operation
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Error taxonomy for broker operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// Frame is not a well-formed envelope
    #[error("malformed envelope: {0}")]
    Parse(String),

    /// Envelope is well-formed but its content is not acceptable
    #[error("invalid message: {0}")]
    Validation(String),

    /// Sender/receiver config without a supported data type
    #[error("invalid data type: {0}")]
    InvalidDataType(String),

    /// No device is bound to this connection
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// No sender or receiver carries this name
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    /// Connection already has a device bound to it
    #[error("connection {0} is already registered")]
    AlreadyRegistered(ConnectionId),

    /// The link table lost its symmetry
    #[error("link table inconsistent: {0}")]
    InternalConsistency(String),
}
