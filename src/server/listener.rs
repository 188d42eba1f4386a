//! Broker server listener
//!
//! Handles the TCP accept loop and spawns connection handlers.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::broker::{Broker, BrokerConfig};
use crate::error::Result;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::transport::ConnectionId;

/// WebSocket front end for a [`Broker`]
pub struct BrokerServer {
    config: ServerConfig,
    broker: Arc<Broker>,
    next_connection_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl BrokerServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self::with_broker_config(config, BrokerConfig::default())
    }

    /// Create a new server with custom broker configuration
    pub fn with_broker_config(config: ServerConfig, broker_config: BrokerConfig) -> Self {
        Self::with_broker(config, Arc::new(Broker::with_config(broker_config)))
    }

    /// Create a new server around an existing broker
    pub fn with_broker(config: ServerConfig, broker: Arc<Broker>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            broker,
            next_connection_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Get a reference to the broker
    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// Accepts connections until the process exits. Fails only if the
    /// listener cannot bind.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "Broker listening");

        let sweep = self.broker.spawn_sweep_task();

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        };

        // Stop the sweep task on shutdown
        sweep.abort();

        result
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        tracing::info!(addr = %listener.local_addr()?, "Broker listening");

        let sweep = self.broker.spawn_sweep_task();
        let result = self.accept_loop(&listener).await;
        sweep.abort();

        result
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match Arc::clone(sem).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let id = ConnectionId::new(self.next_connection_id.fetch_add(1, Ordering::Relaxed));

        tracing::debug!(connection = %id, peer = %peer_addr, "New connection");

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let config = self.config.clone();
        let broker = Arc::clone(&self.broker);

        tokio::spawn(async move {
            let _permit = permit;
            let mut connection = Connection::new(id, socket, peer_addr, config, broker);

            if let Err(e) = connection.run().await {
                tracing::debug!(connection = %id, error = %e, "Connection error");
            }

            tracing::debug!(connection = %id, "Connection closed");
        });
    }
}
