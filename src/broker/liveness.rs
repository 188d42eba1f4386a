//! Liveness monitor
//!
//! Each sweep first evicts every device still waiting on the previous round's
//! ping, then pings everyone that remains. A device therefore has one full
//! sweep interval to answer before it is evicted on the following sweep.
//!
//! Pending pings are keyed by [`DeviceId`], which is never reused: a name
//! freed by teardown and taken by a new device does not inherit the old
//! device's pending ping.

use std::sync::Arc;

use indexmap::IndexMap;

use super::BrokerState;
use crate::protocol::PING_TOKEN;
use crate::registry::{DeviceId, Role};
use crate::transport::Frame;

/// Devices awaiting a pong from the current round
#[derive(Debug, Default)]
pub struct LivenessMonitor {
    pending: IndexMap<DeviceId, String>,
}

impl LivenessMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a ping was sent to a device
    pub fn expect_pong(&mut self, id: DeviceId, name: &str) {
        self.pending.insert(id, name.to_owned());
    }

    /// Clear a device's pending ping
    ///
    /// Returns false if nothing was pending.
    pub fn handle_pong(&mut self, id: DeviceId) -> bool {
        self.pending.shift_remove(&id).is_some()
    }

    /// Forget a device that has been torn down
    pub fn forget(&mut self, id: DeviceId) {
        self.pending.shift_remove(&id);
    }

    /// Take every pending entry, leaving the set empty
    pub fn take_pending(&mut self) -> Vec<(DeviceId, String)> {
        self.pending.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Names of devices evicted for not answering the previous round
    pub evicted: Vec<String>,
    /// Number of devices pinged in the new round
    pub pinged: usize,
}

impl BrokerState {
    pub(super) fn sweep(&mut self) -> SweepReport {
        let mut report = SweepReport::default();

        for (id, name) in self.liveness.take_pending() {
            // Already gone through another path.
            let Some(device) = self.registry.get(id) else {
                tracing::trace!(device = %id, name = %name, "Pending ping for removed device");
                continue;
            };

            let connection = device.connection_id();
            let transport = Arc::clone(&device.transport);

            tracing::info!(
                connection = %connection,
                name = %name,
                mode = %device.role(),
                "Evicting unresponsive device"
            );

            match self.teardown(connection) {
                Ok(teardown) => {
                    transport.close();
                    self.counters.evictions += 1;
                    report.evicted.push(teardown.device.name);
                }
                Err(e) => {
                    tracing::warn!(connection = %connection, error = %e, "Eviction failed");
                }
            }
        }

        for role in [Role::Sender, Role::Receiver, Role::Controller] {
            for device in self.registry.with_role(role) {
                if let Err(e) = device.transport.send(Frame::from(PING_TOKEN)) {
                    tracing::debug!(
                        connection = %device.connection_id(),
                        name = %device.name,
                        error = %e,
                        "Failed to send ping"
                    );
                }
                self.liveness.expect_pong(device.id, &device.name);
                report.pinged += 1;
            }
        }

        tracing::debug!(
            evicted = report.evicted.len(),
            pinged = report.pinged,
            "Liveness sweep complete"
        );

        report
    }

    pub(super) fn handle_pong(&mut self, id: DeviceId, name: &str) {
        if self.liveness.handle_pong(id) {
            tracing::trace!(name = %name, "Pong received");
        } else {
            tracing::trace!(name = %name, "Unsolicited pong");
        }
    }
}
