//! # aether-broker
//!
//! Runtime broker for IoT devices. Senders publish data frames, receivers
//! consume them, and dashboard controllers decide which sender feeds which
//! receiver. All parties talk to the broker over persistent WebSocket
//! connections.
//!
//! - **Registry**: connected devices, unique names, transport lookup
//! - **Link graph**: symmetric sender/receiver links, fan-out of data frames
//! - **Controller broadcast**: `connUpdate` topology snapshots
//! - **Liveness**: periodic `"_ping"` sweeps that evict silent devices
//!
//! ## Example
//!
//! ```no_run
//! use aether_broker::{BrokerServer, ServerConfig};
//!
//! # async fn example() -> aether_broker::Result<()> {
//! let addr = "127.0.0.1:8080".parse().unwrap();
//! let server = BrokerServer::new(ServerConfig::with_addr(addr));
//! server.run().await?;
//! # Ok(())
//! # }
//! ```
//!
//! The broker can also be driven without sockets through any
//! [`Transport`] implementation:
//!
//! ```
//! use std::sync::Arc;
//! use aether_broker::{Broker, ChannelTransport, ConnectionId, Frame, Transport};
//!
//! # async fn example() {
//! let broker = Broker::new();
//! let (transport, mut queue) = ChannelTransport::new(ConnectionId::new(1), 16);
//! let transport: Arc<dyn Transport> = Arc::new(transport);
//!
//! let config = r#"{"messageType":"config","messageContent":{"name":"dash","mode":"controller"}}"#;
//! broker.process_message(&transport, Frame::from(config)).await;
//!
//! // Controllers receive the current topology on registration
//! assert!(queue.try_recv().is_some());
//! # }
//! ```

pub mod broker;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod stats;
pub mod transport;

pub use broker::{Broker, BrokerConfig, SweepReport};
pub use error::{BrokerError, Error, Result};
pub use protocol::{ControlMessage, Topology};
pub use registry::{DataType, DeviceRegistry, RegistryConfig, Role};
pub use server::{BrokerServer, ServerConfig};
pub use stats::BrokerStats;
pub use transport::{ChannelTransport, ConnectionId, Frame, OutboundQueue, Transport};
