//! Controller broadcast
//!
//! Builds the topology from the registry and pushes it to every controller as
//! a `connUpdate` envelope. Delivery is per controller: a failed write to one
//! is logged and the rest still receive the update.

use super::BrokerState;
use crate::protocol::{DeviceSummary, PeerSummary, Topology};
use crate::registry::{Device, DeviceRegistry};
use crate::transport::{Frame, Transport};

/// Build the topology snapshot in registry order
pub fn snapshot(registry: &DeviceRegistry) -> Topology {
    Topology {
        sender_list: registry.senders().map(|d| summarize(registry, d)).collect(),
        receiver_list: registry.receivers().map(|d| summarize(registry, d)).collect(),
    }
}

fn summarize(registry: &DeviceRegistry, device: &Device) -> DeviceSummary {
    DeviceSummary {
        name: device.name.clone(),
        mode: device.role(),
        data_type: device.data_type(),
        connections: registry
            .linked_peers(device)
            .into_iter()
            .map(|peer| PeerSummary {
                name: peer.name.clone(),
                mode: peer.role(),
                data_type: peer.data_type(),
            })
            .collect(),
    }
}

impl BrokerState {
    /// Broadcast the current topology to every controller
    ///
    /// Returns the number of controllers the update was queued for.
    pub(super) fn refresh(&mut self) -> usize {
        let topology = snapshot(&self.registry);
        let encoded = match topology.to_conn_update() {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode topology update");
                return 0;
            }
        };

        let mut delivered = 0;
        for controller in self.registry.controllers() {
            match controller.transport.send(Frame::Text(encoded.clone())) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        connection = %controller.connection_id(),
                        name = %controller.name,
                        error = %e,
                        "Failed to deliver topology update"
                    );
                }
            }
        }

        self.counters.broadcasts += 1;

        tracing::debug!(
            senders = topology.sender_list.len(),
            receivers = topology.receiver_list.len(),
            controllers = delivered,
            "Topology broadcast"
        );

        delivered
    }

    /// Send the current topology to a single transport
    pub(super) fn send_snapshot(&self, transport: &dyn Transport) {
        let encoded = match snapshot(&self.registry).to_conn_update() {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode topology snapshot");
                return;
            }
        };

        if let Err(e) = transport.send(Frame::Text(encoded)) {
            tracing::warn!(
                connection = %transport.id(),
                error = %e,
                "Failed to deliver topology snapshot"
            );
        }
    }
}
