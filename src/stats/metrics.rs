//! Broker statistics

/// Lifetime counters, updated under the broker lock
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerCounters {
    /// Data frames delivered to receivers
    pub frames_forwarded: u64,
    /// Data frames that could not be queued for a receiver
    pub forward_failures: u64,
    /// Devices evicted by the liveness sweep
    pub evictions: u64,
    /// Topology broadcasts issued
    pub broadcasts: u64,
}

/// Point-in-time view of the broker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub senders: usize,
    pub receivers: usize,
    pub controllers: usize,
    /// Sender/receiver links
    pub links: usize,
    /// Devices that have not answered the current ping round
    pub pending_pings: usize,
    pub counters: BrokerCounters,
}

impl BrokerStats {
    /// Total registered devices
    pub fn devices(&self) -> usize {
        self.senders + self.receivers + self.controllers
    }
}
