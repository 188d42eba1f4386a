//! Inbound frame dispatch
//!
//! How a frame is handled depends on what is bound to its transport:
//!
//! | Bound device | `"_ping"` | anything else                    |
//! |--------------|-----------|----------------------------------|
//! | sender       | pong      | forwarded to linked receivers    |
//! | receiver     | pong      | ignored                          |
//! | controller   | pong      | parsed as a control envelope     |
//! | none         | dropped   | parsed as a control envelope     |
//!
//! Senders and receivers never reach envelope parsing once registered.

use std::sync::Arc;

use super::BrokerState;
use crate::error::BrokerError;
use crate::protocol::{ConfigRequest, ControlMessage, LinkRequest, PING_TOKEN};
use crate::registry::{DeviceId, DeviceKind};
use crate::transport::{Frame, Transport};

fn is_ping(frame: &Frame) -> bool {
    frame.as_text() == Some(PING_TOKEN)
}

impl BrokerState {
    pub(super) fn process_message(&mut self, transport: &Arc<dyn Transport>, frame: Frame) {
        let bound = self
            .registry
            .device_by_connection(transport.id())
            .map(|device| (device.id, device.kind, device.name.clone()));

        match bound {
            Some((id, DeviceKind::Sender { .. }, name)) => self.on_sender_frame(id, &name, frame),
            Some((id, DeviceKind::Receiver { .. }, name)) => {
                self.on_receiver_frame(id, &name, frame)
            }
            Some((id, DeviceKind::Controller, name)) if is_ping(&frame) => {
                self.handle_pong(id, &name)
            }
            _ => self.dispatch(transport, frame),
        }
    }

    fn on_sender_frame(&mut self, id: DeviceId, name: &str, frame: Frame) {
        if is_ping(&frame) {
            self.handle_pong(id, name);
            return;
        }

        let receivers = self.registry.linked_receivers(name);
        let mut delivered = 0u64;

        for receiver in &receivers {
            match receiver.send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    self.counters.forward_failures += 1;
                    tracing::warn!(
                        sender = %name,
                        receiver = %receiver.id(),
                        error = %e,
                        "Failed to forward data frame"
                    );
                }
            }
        }

        self.counters.frames_forwarded += delivered;

        tracing::trace!(
            sender = %name,
            bytes = frame.len(),
            receivers = receivers.len(),
            delivered = delivered,
            "Data frame forwarded"
        );
    }

    fn on_receiver_frame(&mut self, id: DeviceId, name: &str, frame: Frame) {
        if is_ping(&frame) {
            self.handle_pong(id, name);
        } else {
            tracing::trace!(receiver = %name, bytes = frame.len(), "Ignoring frame from receiver");
        }
    }

    fn dispatch(&mut self, transport: &Arc<dyn Transport>, frame: Frame) {
        let connection = transport.id();

        let text = match frame {
            Frame::Text(text) => text,
            Frame::Binary(data) => {
                let e = BrokerError::Parse(format!("binary frame of {} bytes", data.len()));
                tracing::warn!(connection = %connection, error = %e, "Dropping control frame");
                return;
            }
        };

        if text == PING_TOKEN {
            let e = BrokerError::UnknownConnection(connection);
            tracing::warn!(error = %e, "Pong from unregistered connection");
            return;
        }

        let message = match ControlMessage::parse(&text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(connection = %connection, error = %e, "Dropping control frame");
                return;
            }
        };

        tracing::debug!(
            connection = %connection,
            message_type = message.message_type(),
            "Control message received"
        );

        match message {
            ControlMessage::Config(request) => match self.configure_client(request, transport) {
                Ok(name) => {
                    tracing::debug!(connection = %connection, name = %name, "Config accepted");
                }
                Err(e) => {
                    tracing::warn!(connection = %connection, error = %e, "Config rejected");
                }
            },
            ControlMessage::NewConnection(request) => {
                self.update_connections(&request);
            }
            ControlMessage::Disconnection(request) => {
                self.disconnect(&request.name);
            }
        }
    }

    /// Register a device and announce it
    ///
    /// Senders and receivers trigger a broadcast. A controller gets the
    /// current topology on its own transport when initial snapshots are on.
    pub(super) fn configure_client(
        &mut self,
        request: ConfigRequest,
        transport: &Arc<dyn Transport>,
    ) -> Result<String, BrokerError> {
        let (role, name) = self
            .registry
            .configure_client(request, Arc::clone(transport))
            .map(|device| (device.role(), device.name.clone()))?;

        if role.is_graph_participant() {
            self.refresh();
        } else if self.initial_snapshot {
            self.send_snapshot(transport.as_ref());
        }

        Ok(name)
    }

    /// Apply a link change and broadcast on success
    pub(super) fn update_connections(&mut self, request: &LinkRequest) -> bool {
        match self
            .registry
            .update_connections(&request.receiver, &request.sender, request.remove)
        {
            Ok(true) => {
                self.refresh();
                true
            }
            Ok(false) => {
                tracing::warn!(
                    sender = %request.sender,
                    receiver = %request.receiver,
                    remove = request.remove,
                    "Link request rejected"
                );
                false
            }
            Err(e) => {
                tracing::error!(
                    sender = %request.sender,
                    receiver = %request.receiver,
                    error = %e,
                    "Link table symmetry violated"
                );
                false
            }
        }
    }

    /// Force-close a sender or receiver by name
    ///
    /// Only the transport is closed here; the teardown runs when the
    /// transport reports the closure.
    pub(super) fn disconnect(&mut self, name: &str) -> bool {
        match self.registry.find_by_name(name) {
            Some(device) => {
                tracing::info!(
                    connection = %device.connection_id(),
                    name = %name,
                    "Forcing disconnect"
                );
                device.transport.close();
                true
            }
            None => {
                let e = BrokerError::UnknownDevice(name.to_owned());
                tracing::warn!(error = %e, "Disconnect rejected");
                false
            }
        }
    }
}
