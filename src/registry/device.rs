//! Device records
//!
//! A device is a registered endpoint bound to exactly one transport.
//! Senders and receivers carry a data type and take part in the link graph;
//! controllers only observe topology.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::transport::{ConnectionId, Transport};

/// Registration sequence number
///
/// Never reused, so it also orders devices by registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(u64);

impl DeviceId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device-{}", self.0)
    }
}

/// Device role, serialized as the wire `mode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Originates data frames
    #[serde(rename = "send")]
    Sender,
    /// Consumes forwarded data frames
    #[serde(rename = "receive")]
    Receiver,
    /// Dashboard client
    #[serde(rename = "controller")]
    Controller,
}

impl Role {
    /// Wire name of this role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Sender => "send",
            Role::Receiver => "receive",
            Role::Controller => "controller",
        }
    }

    /// Parse a wire `mode` value
    pub fn from_mode(mode: &str) -> Option<Self> {
        match mode {
            "send" => Some(Role::Sender),
            "receive" => Some(Role::Receiver),
            "controller" => Some(Role::Controller),
            _ => None,
        }
    }

    /// Whether devices of this role take part in the link graph
    pub fn is_graph_participant(&self) -> bool {
        !matches!(self, Role::Controller)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of data a sender produces or a receiver expects
///
/// Linked devices are never checked for matching data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Pulse,
    Text,
    Number,
    Boolean,
}

impl DataType {
    /// All supported data types
    pub const ALL: [DataType; 4] = [
        DataType::Pulse,
        DataType::Text,
        DataType::Number,
        DataType::Boolean,
    ];

    /// Wire name of this data type
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Pulse => "pulse",
            DataType::Text => "text",
            DataType::Number => "number",
            DataType::Boolean => "boolean",
        }
    }

    /// Parse a wire `dataType` value
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role-specific device data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Sender { data_type: DataType },
    Receiver { data_type: DataType },
    Controller,
}

impl DeviceKind {
    pub fn role(&self) -> Role {
        match self {
            DeviceKind::Sender { .. } => Role::Sender,
            DeviceKind::Receiver { .. } => Role::Receiver,
            DeviceKind::Controller => Role::Controller,
        }
    }

    pub fn data_type(&self) -> Option<DataType> {
        match self {
            DeviceKind::Sender { data_type } | DeviceKind::Receiver { data_type } => {
                Some(*data_type)
            }
            DeviceKind::Controller => None,
        }
    }
}

/// A registered endpoint
#[derive(Debug, Clone)]
pub struct Device {
    /// Registration identity
    pub id: DeviceId,

    /// Assigned name, unique among senders and receivers
    pub name: String,

    /// Role and data type
    pub kind: DeviceKind,

    /// Owned transport handle
    pub transport: Arc<dyn Transport>,
}

impl Device {
    pub fn role(&self) -> Role {
        self.kind.role()
    }

    pub fn data_type(&self) -> Option<DataType> {
        self.kind.data_type()
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.transport.id()
    }
}
