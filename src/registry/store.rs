//! Device registry implementation
//!
//! One keyed map from [`DeviceId`] to [`Device`] holds senders, receivers and
//! controllers alike. Two indexes sit beside it: connection → device (used to
//! resolve frames and close events) and name → device (the combined
//! sender/receiver namespace). Links live in the [`LinkTable`].
//!
//! The registry is plain data. Callers serialize access to it; see
//! [`crate::broker::Broker`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::config::RegistryConfig;
use super::device::{Device, DeviceId, DeviceKind, Role};
use super::links::LinkTable;
use crate::error::BrokerError;
use crate::protocol::ConfigRequest;
use crate::transport::{ConnectionId, Transport};

/// Result of tearing down a device
#[derive(Debug)]
pub struct Teardown {
    /// The removed device
    pub device: Device,
    /// Number of back-links removed from peers
    pub links_removed: usize,
}

/// Registry of connected devices and their links
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    /// All devices in registration order
    devices: BTreeMap<DeviceId, Device>,

    /// Transport handle -> device
    by_connection: HashMap<ConnectionId, DeviceId>,

    /// Sender and receiver names -> device
    by_name: HashMap<String, DeviceId>,

    links: LinkTable,

    next_id: u64,

    config: RegistryConfig,
}

impl DeviceRegistry {
    /// Create a registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            devices: BTreeMap::new(),
            by_connection: HashMap::new(),
            by_name: HashMap::new(),
            links: LinkTable::new(),
            next_id: 1,
            config,
        }
    }

    /// Pick a name that no sender or receiver holds
    ///
    /// An empty request starts from the configured default name. On
    /// collision the candidate becomes the *requested* name followed by a
    /// counter starting at 0, so two unnamed devices become `"1"` then `"0"`,
    /// and a third becomes `"2"`.
    pub fn unique_name(&self, requested: &str) -> String {
        let mut candidate = if requested.is_empty() {
            self.config.default_name.clone()
        } else {
            requested.to_owned()
        };

        let mut suffix: u64 = 0;
        while self.by_name.contains_key(&candidate) {
            candidate = format!("{requested}{suffix}");
            suffix += 1;
        }

        candidate
    }

    /// Register a device on a transport
    ///
    /// Fails with [`BrokerError::AlreadyRegistered`] if the transport is
    /// already bound to a device. Broadcasting the new topology is left to
    /// the caller.
    pub fn configure_client(
        &mut self,
        request: ConfigRequest,
        transport: Arc<dyn Transport>,
    ) -> Result<&Device, BrokerError> {
        let connection = transport.id();
        if self.by_connection.contains_key(&connection) {
            return Err(BrokerError::AlreadyRegistered(connection));
        }

        let name = self.unique_name(&request.name);
        let id = DeviceId::new(self.next_id);
        self.next_id += 1;

        let device = Device {
            id,
            name: name.clone(),
            kind: request.kind,
            transport,
        };

        if device.role().is_graph_participant() {
            self.by_name.insert(name.clone(), id);
        }
        self.by_connection.insert(connection, id);

        tracing::info!(
            connection = %connection,
            device = %id,
            name = %name,
            requested = %request.name,
            mode = %device.role(),
            data_type = ?device.data_type(),
            "Device registered"
        );

        Ok(self.devices.entry(id).or_insert(device))
    }

    /// Tear down the device owning a transport
    ///
    /// Removes every link of a sender or receiver from both ends, then the
    /// device itself. Fails with [`BrokerError::UnknownConnection`] if no
    /// device owns the transport.
    pub fn close_connection(&mut self, connection: ConnectionId) -> Result<Teardown, BrokerError> {
        let id = self
            .by_connection
            .remove(&connection)
            .ok_or(BrokerError::UnknownConnection(connection))?;

        let device = self.devices.remove(&id).ok_or_else(|| {
            BrokerError::InternalConsistency(format!(
                "{connection} indexed to missing {id}"
            ))
        })?;

        let links_removed = match device.kind {
            DeviceKind::Sender { .. } => self.links.remove_sender(&device.name),
            DeviceKind::Receiver { .. } => self.links.remove_receiver(&device.name),
            DeviceKind::Controller => 0,
        };

        if device.role().is_graph_participant() {
            self.by_name.remove(&device.name);
        }

        tracing::info!(
            connection = %connection,
            name = %device.name,
            mode = %device.role(),
            links_removed = links_removed,
            "Device removed"
        );

        Ok(Teardown {
            device,
            links_removed,
        })
    }

    /// Create or remove the link between a sender and a receiver
    ///
    /// Returns `Ok(true)` when the link table changed. Creating an existing
    /// link, removing a missing one, or naming a device that is not a
    /// registered sender/receiver of the right role returns `Ok(false)`
    /// without mutation.
    pub fn update_connections(
        &mut self,
        receiver: &str,
        sender: &str,
        remove: bool,
    ) -> Result<bool, BrokerError> {
        let exists = self.links.contains(sender, receiver);

        match (exists, remove) {
            (true, true) => {
                let removed = self.links.remove(sender, receiver)?;
                if removed {
                    tracing::info!(sender = %sender, receiver = %receiver, "Link removed");
                }
                Ok(removed)
            }
            (false, false) => {
                if self.find_with_role(sender, Role::Sender).is_none()
                    || self.find_with_role(receiver, Role::Receiver).is_none()
                {
                    tracing::debug!(
                        sender = %sender,
                        receiver = %receiver,
                        "Link rejected: endpoint not registered"
                    );
                    return Ok(false);
                }

                let inserted = self.links.insert(sender, receiver);
                if inserted {
                    tracing::info!(sender = %sender, receiver = %receiver, "Link created");
                }
                Ok(inserted)
            }
            (true, false) | (false, true) => {
                tracing::debug!(
                    sender = %sender,
                    receiver = %receiver,
                    exists = exists,
                    remove = remove,
                    "Link change is a no-op"
                );
                Ok(false)
            }
        }
    }

    /// Find a sender or receiver by name
    pub fn find_by_name(&self, name: &str) -> Option<&Device> {
        self.by_name.get(name).and_then(|id| self.devices.get(id))
    }

    fn find_with_role(&self, name: &str, role: Role) -> Option<&Device> {
        self.find_by_name(name).filter(|device| device.role() == role)
    }

    pub fn get(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(&id)
    }

    /// Device bound to a transport
    pub fn device_by_connection(&self, connection: ConnectionId) -> Option<&Device> {
        self.by_connection
            .get(&connection)
            .and_then(|id| self.devices.get(id))
    }

    /// All devices in registration order
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// Devices of one role in registration order
    pub fn with_role(&self, role: Role) -> impl Iterator<Item = &Device> {
        self.devices.values().filter(move |device| device.role() == role)
    }

    pub fn senders(&self) -> impl Iterator<Item = &Device> {
        self.with_role(Role::Sender)
    }

    pub fn receivers(&self) -> impl Iterator<Item = &Device> {
        self.with_role(Role::Receiver)
    }

    pub fn controllers(&self) -> impl Iterator<Item = &Device> {
        self.with_role(Role::Controller)
    }

    pub fn links(&self) -> &LinkTable {
        &self.links
    }

    #[cfg(test)]
    pub(crate) fn links_mut(&mut self) -> &mut LinkTable {
        &mut self.links
    }

    /// Peers linked to a sender or receiver, in link order
    pub fn linked_peers<'a>(&'a self, device: &'a Device) -> Vec<&'a Device> {
        let names: Box<dyn Iterator<Item = &'a str> + 'a> = match device.role() {
            Role::Sender => Box::new(self.links.receivers_of(&device.name)),
            Role::Receiver => Box::new(self.links.senders_of(&device.name)),
            Role::Controller => return Vec::new(),
        };

        names.filter_map(|name| self.find_by_name(name)).collect()
    }

    /// Transports of every receiver linked to a sender
    pub fn linked_receivers(&self, sender: &str) -> Vec<Arc<dyn Transport>> {
        self.links
            .receivers_of(sender)
            .filter_map(|name| self.find_by_name(name))
            .map(|device| Arc::clone(&device.transport))
            .collect()
    }

    /// Number of registered devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
