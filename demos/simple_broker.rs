//! Simple broker server
//!
//! Run with: cargo run --example simple_broker [BIND_ADDR] [SWEEP_SECS]
//!
//! Examples:
//!   cargo run --example simple_broker                     # binds to 0.0.0.0:8080
//!   cargo run --example simple_broker 127.0.0.1:9000      # custom address
//!   cargo run --example simple_broker 127.0.0.1:9000 30   # sweep every 30s
//!
//! ## Trying it out
//!
//! With websocat, in three terminals:
//!
//!   # controller
//!   websocat ws://localhost:8080
//!   {"messageType":"config","messageContent":{"name":"dash","mode":"controller"}}
//!
//!   # receiver
//!   websocat ws://localhost:8080
//!   {"messageType":"config","messageContent":{"name":"switch","mode":"receive","dataType":"boolean"}}
//!
//!   # sender
//!   websocat ws://localhost:8080
//!   {"messageType":"config","messageContent":{"name":"bulb","mode":"send","dataType":"boolean"}}
//!
//! Then link them from the controller:
//!
//!   {"messageType":"new connection","messageContent":{"receiver":"switch","sender":"bulb","remove":false}}
//!
//! Anything the sender types now shows up at the receiver. Clients must
//! answer each "_ping" with "_ping" or they are dropped on the next sweep.

use std::net::SocketAddr;
use std::time::Duration;

use aether_broker::{BrokerConfig, BrokerServer, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);

    let addr: SocketAddr = match args.next() {
        Some(arg) => arg.parse()?,
        None => "0.0.0.0:8080".parse()?,
    };

    let mut broker_config = BrokerConfig::default();
    if let Some(secs) = args.next() {
        broker_config = broker_config.sweep_interval(Duration::from_secs(secs.parse()?));
    }

    let server = BrokerServer::with_broker_config(ServerConfig::with_addr(addr), broker_config);

    let broker = std::sync::Arc::clone(server.broker());
    let stats_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            ticker.tick().await;
            let stats = broker.stats().await;
            tracing::info!(
                senders = stats.senders,
                receivers = stats.receivers,
                controllers = stats.controllers,
                links = stats.links,
                forwarded = stats.counters.frames_forwarded,
                evictions = stats.counters.evictions,
                "Broker stats"
            );
        }
    });

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    stats_task.abort();
    Ok(())
}
