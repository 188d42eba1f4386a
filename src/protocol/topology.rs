//! Outbound topology snapshot (`connUpdate`)

use serde::Serialize;

use super::constants::MSG_CONN_UPDATE;
use crate::registry::{DataType, Role};

/// A linked peer as seen from one side of a link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerSummary {
    pub name: String,
    pub mode: Role,
    pub data_type: Option<DataType>,
}

/// One sender or receiver with its links
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    pub name: String,
    pub mode: Role,
    pub data_type: Option<DataType>,
    pub connections: Vec<PeerSummary>,
}

/// Full topology in registry order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    pub sender_list: Vec<DeviceSummary>,
    pub receiver_list: Vec<DeviceSummary>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnUpdate<'a> {
    message_type: &'static str,
    message_content: &'a Topology,
}

impl Topology {
    /// Serialize as a `connUpdate` envelope
    pub fn to_conn_update(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&ConnUpdate {
            message_type: MSG_CONN_UPDATE,
            message_content: self,
        })
    }
}
