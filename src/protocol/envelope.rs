//! Inbound envelope parsing
//!
//! A frame is parsed in two steps: first into the generic
//! `{messageType, messageContent}` shape (failures are
//! [`BrokerError::Parse`]), then into a typed [`ControlMessage`] according to
//! the message type (failures are [`BrokerError::Validation`] or
//! [`BrokerError::InvalidDataType`]).

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::constants::*;
use crate::error::BrokerError;
use crate::registry::{DataType, DeviceKind, Role};

/// Generic envelope before type-specific validation
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Envelope {
    #[serde(rename = "messageType")]
    pub message_type: String,

    #[serde(rename = "messageContent")]
    pub message_content: Map<String, Value>,
}

impl Envelope {
    /// Parse raw frame text into an envelope
    pub fn parse(raw: &str) -> Result<Self, BrokerError> {
        serde_json::from_str(raw).map_err(|e| BrokerError::Parse(e.to_string()))
    }
}

/// Registration request carried by a `config` envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRequest {
    /// Requested name, possibly empty
    pub name: String,
    /// Requested role and data type
    pub kind: DeviceKind,
}

/// Link change carried by a `new connection` envelope
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LinkRequest {
    pub receiver: String,
    pub sender: String,
    pub remove: bool,
}

/// Forced disconnect carried by a `disconnection` envelope
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DisconnectRequest {
    pub name: String,
}

/// A validated control message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    Config(ConfigRequest),
    NewConnection(LinkRequest),
    Disconnection(DisconnectRequest),
}

impl ControlMessage {
    /// Parse and validate raw frame text
    pub fn parse(raw: &str) -> Result<Self, BrokerError> {
        Self::from_envelope(Envelope::parse(raw)?)
    }

    /// Validate an already parsed envelope
    pub fn from_envelope(envelope: Envelope) -> Result<Self, BrokerError> {
        let content = envelope.message_content;

        match envelope.message_type.as_str() {
            MSG_CONFIG => parse_config(content).map(ControlMessage::Config),
            MSG_NEW_CONNECTION => {
                decode(MSG_NEW_CONNECTION, content).map(ControlMessage::NewConnection)
            }
            MSG_DISCONNECTION => {
                decode(MSG_DISCONNECTION, content).map(ControlMessage::Disconnection)
            }
            other => Err(BrokerError::Validation(format!(
                "unrecognised message type {other:?}"
            ))),
        }
    }

    /// Wire name of this message's type
    pub fn message_type(&self) -> &'static str {
        match self {
            ControlMessage::Config(_) => MSG_CONFIG,
            ControlMessage::NewConnection(_) => MSG_NEW_CONNECTION,
            ControlMessage::Disconnection(_) => MSG_DISCONNECTION,
        }
    }
}

/// Decode strictly typed content
fn decode<T: DeserializeOwned>(
    message_type: &str,
    content: Map<String, Value>,
) -> Result<T, BrokerError> {
    serde_json::from_value(Value::Object(content))
        .map_err(|e| BrokerError::Validation(format!("{message_type}: {e}")))
}

fn parse_config(content: Map<String, Value>) -> Result<ConfigRequest, BrokerError> {
    // `device` is sent by clients but carries nothing the broker uses.
    let name = match content.get("name") {
        Some(Value::String(name)) => name.clone(),
        Some(_) => return Err(BrokerError::Validation("config: name must be a string".into())),
        None => return Err(BrokerError::Validation("config: missing name".into())),
    };

    let role = match content.get("mode") {
        Some(Value::String(mode)) => Role::from_mode(mode)
            .ok_or_else(|| BrokerError::Validation(format!("config: unrecognised mode {mode:?}")))?,
        Some(_) => return Err(BrokerError::Validation("config: mode must be a string".into())),
        None => return Err(BrokerError::Validation("config: missing mode".into())),
    };

    let kind = match role {
        Role::Controller => DeviceKind::Controller,
        Role::Sender => DeviceKind::Sender {
            data_type: parse_data_type(content.get("dataType"))?,
        },
        Role::Receiver => DeviceKind::Receiver {
            data_type: parse_data_type(content.get("dataType"))?,
        },
    };

    Ok(ConfigRequest { name, kind })
}

fn parse_data_type(value: Option<&Value>) -> Result<DataType, BrokerError> {
    match value {
        Some(Value::String(raw)) => {
            DataType::parse(raw).ok_or_else(|| BrokerError::InvalidDataType(raw.clone()))
        }
        Some(other) => Err(BrokerError::InvalidDataType(other.to_string())),
        None => Err(BrokerError::InvalidDataType("no data type set".into())),
    }
}
