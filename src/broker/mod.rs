//! Connection broker
//!
//! [`Broker`] is the single serialization domain for all broker state: the
//! device registry, the link table, and the liveness monitor sit behind one
//! `tokio::sync::Mutex`. Every operation (a frame, a close event, a sweep)
//! takes the lock once and runs to completion, so no operation can observe a
//! half-updated link pair.
//!
//! # Architecture
//!
//! ```text
//!   socket task ──frame──► Broker::process_message
//!                                │
//!                 ┌──────────────┼────────────────────┐
//!                 │ sender data  │ control envelope   │ "_ping"
//!                 ▼              ▼                    ▼
//!         linked receivers   Dispatcher          LivenessMonitor
//!           (fan-out)        config / link /
//!                            disconnection
//!                                │
//!                                ▼
//!                      Controller broadcast (connUpdate)
//!
//!   socket closed ──► Broker::close_connection ──► teardown ──► broadcast
//!   sweep timer   ──► Broker::sweep ──► evict silent devices, ping the rest
//! ```
//!
//! Transport writes never block: a failed write to one peer is logged and
//! the loop moves on to the next.

pub mod broadcast;
pub mod config;
pub mod dispatch;
pub mod liveness;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

use crate::error::BrokerError;
use crate::protocol::{ConfigRequest, LinkRequest, Topology};
use crate::registry::{DeviceRegistry, Teardown};
use crate::stats::{BrokerCounters, BrokerStats};
use crate::transport::{ConnectionId, Frame, Transport};

pub use broadcast::snapshot;
pub use config::BrokerConfig;
pub use liveness::{LivenessMonitor, SweepReport};

/// State guarded by the broker lock
#[derive(Debug)]
pub(crate) struct BrokerState {
    registry: DeviceRegistry,
    liveness: LivenessMonitor,
    counters: BrokerCounters,
    initial_snapshot: bool,
}

impl BrokerState {
    fn new(config: BrokerConfig) -> Self {
        Self {
            initial_snapshot: config.initial_snapshot,
            registry: DeviceRegistry::with_config(config.registry),
            liveness: LivenessMonitor::new(),
            counters: BrokerCounters::default(),
        }
    }

    /// Common teardown for close events, forced disconnects and evictions
    fn teardown(&mut self, connection: ConnectionId) -> Result<Teardown, BrokerError> {
        let teardown = self.registry.close_connection(connection)?;
        self.liveness.forget(teardown.device.id);

        if teardown.device.role().is_graph_participant() {
            self.refresh();
        }

        Ok(teardown)
    }
}

/// Runtime broker between senders, receivers and controllers
#[derive(Debug)]
pub struct Broker {
    state: Mutex<BrokerState>,
    sweep_interval: Duration,
}

impl Broker {
    /// Create a broker with default configuration
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    /// Create a broker with custom configuration
    pub fn with_config(config: BrokerConfig) -> Self {
        Self {
            sweep_interval: config.sweep_interval,
            state: Mutex::new(BrokerState::new(config)),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Handle one inbound frame from a transport
    ///
    /// Must be called for every frame the transport receives. Never fails:
    /// rejected frames are logged and dropped, and the connection stays open.
    pub async fn process_message(&self, transport: &Arc<dyn Transport>, frame: Frame) {
        self.state.lock().await.process_message(transport, frame);
    }

    /// Handle a transport closure
    ///
    /// Must be called whenever a transport closes. Returns false if no device
    /// was bound to it (closed before registering, or already evicted).
    pub async fn close_connection(&self, connection: ConnectionId) -> bool {
        match self.state.lock().await.teardown(connection) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Close for unbound connection");
                false
            }
        }
    }

    /// Register a device on a transport, returning its assigned name
    pub async fn configure_client(
        &self,
        request: ConfigRequest,
        transport: &Arc<dyn Transport>,
    ) -> Result<String, BrokerError> {
        self.state.lock().await.configure_client(request, transport)
    }

    /// Create or remove a sender/receiver link
    pub async fn update_connections(&self, receiver: &str, sender: &str, remove: bool) -> bool {
        let request = LinkRequest {
            receiver: receiver.to_owned(),
            sender: sender.to_owned(),
            remove,
        };
        self.state.lock().await.update_connections(&request)
    }

    /// Force-close the transport of a sender or receiver
    pub async fn disconnect(&self, name: &str) -> bool {
        self.state.lock().await.disconnect(name)
    }

    /// Broadcast the current topology to every controller
    pub async fn refresh(&self) -> usize {
        self.state.lock().await.refresh()
    }

    /// Run one liveness sweep
    pub async fn sweep(&self) -> SweepReport {
        self.state.lock().await.sweep()
    }

    /// Current topology snapshot
    pub async fn topology(&self) -> Topology {
        snapshot(&self.state.lock().await.registry)
    }

    /// Current statistics
    pub async fn stats(&self) -> BrokerStats {
        let state = self.state.lock().await;

        BrokerStats {
            senders: state.registry.senders().count(),
            receivers: state.registry.receivers().count(),
            controllers: state.registry.controllers().count(),
            links: state.registry.links().len(),
            pending_pings: state.liveness.len(),
            counters: state.counters.clone(),
        }
    }

    /// Spawn the periodic liveness sweep
    ///
    /// The first sweep runs immediately. Returns a handle that can be used to
    /// abort the task.
    pub fn spawn_sweep_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let broker = Arc::clone(self);
        let period = broker.sweep_interval().max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                broker.sweep().await;
            }
        })
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::protocol::PING_TOKEN;
    use crate::registry::{DataType, DeviceKind};
    use crate::transport::{ChannelTransport, OutboundQueue};

    struct Client {
        transport: Arc<dyn Transport>,
        queue: OutboundQueue,
    }

    impl Client {
        fn new(id: u64) -> Self {
            let (transport, queue) = ChannelTransport::new(ConnectionId::new(id), 64);
            Self {
                transport: Arc::new(transport),
                queue,
            }
        }

        fn id(&self) -> ConnectionId {
            self.transport.id()
        }

        async fn send(&self, broker: &Broker, text: &str) {
            broker.process_message(&self.transport, Frame::from(text)).await;
        }

        async fn config(&self, broker: &Broker, name: &str, mode: &str, data_type: Option<&str>) {
            let mut content = serde_json::json!({"device": "test", "name": name, "mode": mode});
            if let Some(data_type) = data_type {
                content["dataType"] = Value::from(data_type);
            }
            let envelope = serde_json::json!({"messageType": "config", "messageContent": content});
            self.send(broker, &envelope.to_string()).await;
        }

        async fn link(&self, broker: &Broker, receiver: &str, sender: &str, remove: bool) {
            let envelope = serde_json::json!({
                "messageType": "new connection",
                "messageContent": {"receiver": receiver, "sender": sender, "remove": remove}
            });
            self.send(broker, &envelope.to_string()).await;
        }

        fn texts(&mut self) -> Vec<String> {
            self.queue
                .drain()
                .into_iter()
                .filter_map(|frame| frame.as_text().map(str::to_owned))
                .collect()
        }

        fn last_update(&mut self) -> Option<Value> {
            self.texts()
                .into_iter()
                .filter_map(|text| serde_json::from_str::<Value>(&text).ok())
                .filter(|value| value["messageType"] == "connUpdate")
                .last()
        }
    }

    #[tokio::test]
    async fn test_sender_data_fans_out() {
        let broker = Broker::new();
        let bulb = Client::new(1);
        let mut lamp = Client::new(2);
        let mut strip = Client::new(3);
        let mut idle = Client::new(4);
        let dash = Client::new(5);

        bulb.config(&broker, "bulb", "send", Some("boolean")).await;
        lamp.config(&broker, "lamp", "receive", Some("boolean")).await;
        strip.config(&broker, "strip", "receive", Some("text")).await;
        idle.config(&broker, "idle", "receive", Some("boolean")).await;
        dash.config(&broker, "dash", "controller", None).await;
        dash.link(&broker, "lamp", "bulb", false).await;
        dash.link(&broker, "strip", "bulb", false).await;

        bulb.send(&broker, "true").await;

        assert_eq!(lamp.texts(), vec!["true"]);
        assert_eq!(strip.texts(), vec!["true"]);
        assert!(idle.texts().is_empty());
        assert_eq!(broker.stats().await.counters.frames_forwarded, 2);
    }

    #[tokio::test]
    async fn test_failed_write_does_not_stop_fan_out() {
        let broker = Broker::new();
        let bulb = Client::new(1);
        let first = Client::new(2);
        let mut second = Client::new(3);
        let dash = Client::new(4);

        bulb.config(&broker, "bulb", "send", Some("pulse")).await;
        first.config(&broker, "first", "receive", Some("pulse")).await;
        second.config(&broker, "second", "receive", Some("pulse")).await;
        dash.config(&broker, "dash", "controller", None).await;
        dash.link(&broker, "first", "bulb", false).await;
        dash.link(&broker, "second", "bulb", false).await;

        // First receiver's socket task is gone
        drop(first.queue);

        bulb.send(&broker, "1").await;

        assert_eq!(second.texts(), vec!["1"]);
        let stats = broker.stats().await;
        assert_eq!(stats.counters.frames_forwarded, 1);
        assert_eq!(stats.counters.forward_failures, 1);
    }

    #[tokio::test]
    async fn test_binary_data_forwarded_verbatim() {
        let broker = Broker::new();
        let bulb = Client::new(1);
        let mut lamp = Client::new(2);

        bulb.config(&broker, "bulb", "send", Some("number")).await;
        lamp.config(&broker, "lamp", "receive", Some("number")).await;
        assert!(broker.update_connections("lamp", "bulb", false).await);

        let payload = bytes::Bytes::from_static(&[0, 1, 2, 255]);
        broker
            .process_message(&bulb.transport, Frame::Binary(payload.clone()))
            .await;

        assert_eq!(lamp.queue.drain(), vec![Frame::Binary(payload)]);
    }

    #[tokio::test]
    async fn test_registered_sender_bypasses_dispatcher() {
        let broker = Broker::new();
        let bulb = Client::new(1);
        let mut lamp = Client::new(2);

        bulb.config(&broker, "bulb", "send", Some("text")).await;
        lamp.config(&broker, "lamp", "receive", Some("text")).await;
        broker.update_connections("lamp", "bulb", false).await;

        // Looks like a control envelope, but senders only produce data
        let envelope = r#"{"messageType":"disconnection","messageContent":{"name":"lamp"}}"#;
        bulb.send(&broker, envelope).await;

        assert!(!lamp.transport.is_closed());
        assert_eq!(lamp.texts(), vec![envelope]);
    }

    #[tokio::test]
    async fn test_receiver_frames_ignored() {
        let broker = Broker::new();
        let bulb = Client::new(1);
        let lamp = Client::new(2);
        let mut dash = Client::new(3);

        bulb.config(&broker, "bulb", "send", Some("text")).await;
        lamp.config(&broker, "lamp", "receive", Some("text")).await;
        dash.config(&broker, "dash", "controller", None).await;
        broker.update_connections("lamp", "bulb", false).await;
        dash.texts();

        let envelope = r#"{"messageType":"new connection","messageContent":{"receiver":"lamp","sender":"bulb","remove":true}}"#;
        lamp.send(&broker, envelope).await;

        assert_eq!(broker.stats().await.links, 1);
        assert!(dash.texts().is_empty());
    }

    #[tokio::test]
    async fn test_config_broadcasts_to_controllers() {
        let broker = Broker::new();
        let mut dash = Client::new(1);
        let mut other = Client::new(2);
        let bulb = Client::new(3);

        dash.config(&broker, "dash", "controller", None).await;
        other.config(&broker, "dash", "controller", None).await;
        dash.texts();
        other.texts();

        bulb.config(&broker, "bulb", "send", Some("boolean")).await;

        for controller in [&mut dash, &mut other] {
            let update = controller.last_update().unwrap();
            let senders = update["messageContent"]["senderList"].as_array().unwrap();
            assert_eq!(senders.len(), 1);
            assert_eq!(senders[0]["name"], "bulb");
            assert_eq!(senders[0]["mode"], "send");
            assert_eq!(senders[0]["dataType"], "boolean");
        }
    }

    #[tokio::test]
    async fn test_controller_gets_initial_snapshot() {
        let broker = Broker::new();
        let bulb = Client::new(1);
        let mut dash = Client::new(2);

        bulb.config(&broker, "bulb", "send", Some("boolean")).await;
        dash.config(&broker, "dash", "controller", None).await;

        let update = dash.last_update().unwrap();
        assert_eq!(update["messageContent"]["senderList"][0]["name"], "bulb");
    }

    #[tokio::test]
    async fn test_initial_snapshot_can_be_disabled() {
        let broker = Broker::with_config(BrokerConfig::default().initial_snapshot(false));
        let mut dash = Client::new(1);

        dash.config(&broker, "dash", "controller", None).await;

        assert!(dash.texts().is_empty());
        assert_eq!(broker.stats().await.controllers, 1);
    }

    #[tokio::test]
    async fn test_rejected_config_creates_nothing() {
        let broker = Broker::new();
        let mut dash = Client::new(1);
        let device = Client::new(2);

        dash.config(&broker, "dash", "controller", None).await;
        dash.texts();

        device.config(&broker, "bulb", "send", Some("colour")).await;
        device.config(&broker, "bulb", "send", None).await;
        device.config(&broker, "bulb", "teleport", Some("text")).await;

        let stats = broker.stats().await;
        assert_eq!(stats.senders, 0);
        assert!(dash.texts().is_empty());

        // Still unregistered, so a valid config is accepted afterwards
        device.config(&broker, "bulb", "send", Some("text")).await;
        assert_eq!(broker.stats().await.senders, 1);
    }

    #[tokio::test]
    async fn test_malformed_frames_leave_connection_open() {
        let broker = Broker::new();
        let client = Client::new(1);

        client.send(&broker, "{not json").await;
        client.send(&broker, r#"{"messageType":"config"}"#).await;
        client.send(&broker, r#"{"messageType":"shutdown","messageContent":{}}"#).await;
        broker
            .process_message(&client.transport, Frame::Binary(bytes::Bytes::from_static(b"x")))
            .await;

        assert!(!client.transport.is_closed());
        assert_eq!(broker.stats().await.devices(), 0);
    }

    #[tokio::test]
    async fn test_link_changes_broadcast_only_on_success() {
        let broker = Broker::new();
        let bulb = Client::new(1);
        let lamp = Client::new(2);
        let mut dash = Client::new(3);

        bulb.config(&broker, "bulb", "send", Some("boolean")).await;
        lamp.config(&broker, "lamp", "receive", Some("boolean")).await;
        dash.config(&broker, "dash", "controller", None).await;
        dash.texts();

        dash.link(&broker, "lamp", "bulb", false).await;
        let update = dash.last_update().unwrap();
        assert_eq!(update["messageContent"]["receiverList"][0]["connections"][0]["name"], "bulb");

        dash.link(&broker, "lamp", "bulb", false).await;
        assert!(dash.texts().is_empty());

        dash.link(&broker, "ghost", "bulb", false).await;
        assert!(dash.texts().is_empty());

        dash.link(&broker, "lamp", "bulb", true).await;
        let update = dash.last_update().unwrap();
        assert_eq!(
            update["messageContent"]["receiverList"][0]["connections"],
            serde_json::json!([])
        );
    }

    #[tokio::test]
    async fn test_failed_controller_write_does_not_stop_broadcast() {
        let broker = Broker::new();
        let first = Client::new(1);
        let mut second = Client::new(2);
        let bulb = Client::new(3);

        first.config(&broker, "first", "controller", None).await;
        second.config(&broker, "second", "controller", None).await;
        second.texts();

        // First controller's socket task is gone
        drop(first.queue);

        bulb.config(&broker, "bulb", "send", Some("boolean")).await;

        let updates: Vec<Value> = second
            .texts()
            .into_iter()
            .filter_map(|text| serde_json::from_str::<Value>(&text).ok())
            .filter(|value| value["messageType"] == "connUpdate")
            .collect();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0]["messageContent"]["senderList"][0]["name"], "bulb");

        // The broken controller stays registered until its close is reported
        assert_eq!(broker.stats().await.controllers, 2);
        assert_eq!(broker.refresh().await, 1);
    }

    #[tokio::test]
    async fn test_one_sided_link_is_rejected_without_broadcast() {
        let broker = Broker::new();
        let bulb = Client::new(1);
        let lamp = Client::new(2);
        let mut dash = Client::new(3);

        bulb.config(&broker, "bulb", "send", Some("boolean")).await;
        lamp.config(&broker, "lamp", "receive", Some("boolean")).await;
        dash.config(&broker, "dash", "controller", None).await;
        assert!(broker.update_connections("lamp", "bulb", false).await);
        dash.texts();

        broker
            .state
            .lock()
            .await
            .registry
            .links_mut()
            .drop_receiver_side("lamp");
        let broadcasts = broker.stats().await.counters.broadcasts;

        assert!(!broker.update_connections("lamp", "bulb", true).await);

        assert!(dash.texts().is_empty());
        let stats = broker.stats().await;
        assert_eq!(stats.counters.broadcasts, broadcasts);
        // Sender side is still cleared so the table converges
        assert_eq!(stats.links, 0);
        assert!(!bulb.transport.is_closed());
        assert!(!lamp.transport.is_closed());
    }

    #[tokio::test]
    async fn test_disconnection_closes_transport_then_tears_down() {
        let broker = Broker::new();
        let bulb = Client::new(1);
        let lamp = Client::new(2);
        let mut dash = Client::new(3);

        bulb.config(&broker, "bulb", "send", Some("boolean")).await;
        lamp.config(&broker, "lamp", "receive", Some("boolean")).await;
        dash.config(&broker, "dash", "controller", None).await;
        broker.update_connections("lamp", "bulb", false).await;
        dash.texts();

        dash.send(
            &broker,
            r#"{"messageType":"disconnection","messageContent":{"name":"bulb"}}"#,
        )
        .await;

        assert!(bulb.transport.is_closed());
        assert!(bulb.queue.close_requested());
        // Record stays until the transport reports the closure
        assert_eq!(broker.stats().await.senders, 1);

        assert!(broker.close_connection(bulb.id()).await);
        let update = dash.last_update().unwrap();
        assert_eq!(update["messageContent"]["senderList"], serde_json::json!([]));
        assert_eq!(
            update["messageContent"]["receiverList"][0]["connections"],
            serde_json::json!([])
        );

        // Duplicate close is harmless
        assert!(!broker.close_connection(bulb.id()).await);
    }

    #[tokio::test]
    async fn test_disconnect_unknown_name() {
        let broker = Broker::new();
        let dash = Client::new(1);
        dash.config(&broker, "dash", "controller", None).await;

        assert!(!broker.disconnect("ghost").await);
        // Controllers are not addressable by disconnect
        assert!(!broker.disconnect("dash").await);
        assert!(!dash.transport.is_closed());
    }

    #[tokio::test]
    async fn test_controller_close_does_not_broadcast() {
        let broker = Broker::new();
        let mut watcher = Client::new(1);
        let leaving = Client::new(2);

        watcher.config(&broker, "a", "controller", None).await;
        leaving.config(&broker, "b", "controller", None).await;
        watcher.texts();

        assert!(broker.close_connection(leaving.id()).await);
        assert!(watcher.texts().is_empty());
        assert_eq!(broker.stats().await.controllers, 1);
    }

    #[tokio::test]
    async fn test_second_config_rejected() {
        let broker = Broker::new();
        let dash = Client::new(1);

        assert_ok!(
            broker
                .configure_client(
                    ConfigRequest {
                        name: "dash".into(),
                        kind: DeviceKind::Controller
                    },
                    &dash.transport
                )
                .await
        );
        assert_err!(
            broker
                .configure_client(
                    ConfigRequest {
                        name: "bulb".into(),
                        kind: DeviceKind::Sender {
                            data_type: DataType::Text
                        }
                    },
                    &dash.transport
                )
                .await
        );
        assert_eq!(broker.stats().await.devices(), 1);
    }

    #[tokio::test]
    async fn test_sweep_evicts_on_second_sweep() {
        let broker = Broker::new();
        let silent = Client::new(1);
        let mut chatty = Client::new(2);
        let mut dash = Client::new(3);

        silent.config(&broker, "silent", "send", Some("pulse")).await;
        chatty.config(&broker, "chatty", "receive", Some("pulse")).await;
        dash.config(&broker, "dash", "controller", None).await;

        let first = broker.sweep().await;
        assert!(first.evicted.is_empty());
        assert_eq!(first.pinged, 3);
        assert_eq!(chatty.texts(), vec![PING_TOKEN]);
        assert!(dash.texts().iter().any(|t| t == PING_TOKEN));

        chatty.send(&broker, PING_TOKEN).await;
        dash.send(&broker, PING_TOKEN).await;
        assert_eq!(broker.stats().await.pending_pings, 1);

        let second = broker.sweep().await;
        assert_eq!(second.evicted, vec!["silent".to_string()]);
        assert_eq!(second.pinged, 2);
        assert!(silent.transport.is_closed());

        let stats = broker.stats().await;
        assert_eq!(stats.senders, 0);
        assert_eq!(stats.counters.evictions, 1);

        // The evicted transport's own close event is a no-op
        assert!(!broker.close_connection(silent.id()).await);
    }

    #[tokio::test]
    async fn test_pong_resets_eviction_clock() {
        let broker = Broker::new();
        let device = Client::new(1);
        device.config(&broker, "lamp", "receive", Some("text")).await;

        broker.sweep().await;
        device.send(&broker, PING_TOKEN).await;
        assert!(broker.sweep().await.evicted.is_empty());
        device.send(&broker, PING_TOKEN).await;
        assert!(broker.sweep().await.evicted.is_empty());

        // Silent from here on: pinged by the sweep above, evicted by the next
        assert_eq!(broker.sweep().await.evicted, vec!["lamp".to_string()]);
    }

    #[tokio::test]
    async fn test_device_registered_between_sweeps_gets_full_interval() {
        let broker = Broker::new();
        let old = Client::new(1);
        old.config(&broker, "lamp", "receive", Some("text")).await;
        broker.sweep().await;

        // Old device leaves, new one takes the same name before the next sweep
        assert!(broker.close_connection(old.id()).await);
        let new = Client::new(2);
        new.config(&broker, "lamp", "receive", Some("text")).await;

        assert!(broker.sweep().await.evicted.is_empty());
        assert_eq!(broker.stats().await.receivers, 1);
    }

    #[tokio::test]
    async fn test_ping_from_unregistered_connection_is_dropped() {
        let broker = Broker::new();
        let stranger = Client::new(1);

        stranger.send(&broker, PING_TOKEN).await;

        assert!(!stranger.transport.is_closed());
        assert_eq!(broker.stats().await.devices(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_task_runs_on_interval() {
        let config = BrokerConfig::default().sweep_interval(Duration::from_secs(5));
        let broker = Arc::new(Broker::with_config(config));
        assert_eq!(broker.sweep_interval(), Duration::from_secs(5));
        let silent = Client::new(1);
        silent.config(&broker, "silent", "send", Some("text")).await;

        let handle = broker.spawn_sweep_task();

        // First tick fires immediately and pings
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(broker.stats().await.pending_pings, 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(broker.stats().await.senders, 0);

        handle.abort();
    }
}
