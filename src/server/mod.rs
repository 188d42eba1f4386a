//! WebSocket server
//!
//! Accepts TCP connections, upgrades them to WebSocket, and connects each one
//! to the broker through a [`crate::transport::ChannelTransport`].

pub mod config;
pub mod connection;
pub mod listener;

pub use config::ServerConfig;
pub use listener::BrokerServer;
