//! Broker configuration

use std::time::Duration;

use crate::registry::RegistryConfig;

/// Configuration for the broker, its registry and the liveness sweep
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Registry settings
    pub registry: RegistryConfig,

    /// Interval between liveness sweeps
    ///
    /// A silent device is evicted on the second sweep after its last pong.
    pub sweep_interval: Duration,

    /// Send the current topology to a controller as soon as it registers
    pub initial_snapshot: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            sweep_interval: Duration::from_secs(10),
            initial_snapshot: true,
        }
    }
}

impl BrokerConfig {
    /// Set the registry configuration
    pub fn registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    /// Set the liveness sweep interval
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Enable or disable the snapshot sent to newly registered controllers
    pub fn initial_snapshot(mut self, enabled: bool) -> Self {
        self.initial_snapshot = enabled;
        self
    }
}
