//! Wire protocol constants

/// Liveness probe, sent bare (no envelope) in both directions
pub const PING_TOKEN: &str = "_ping";

/// Client registration (client → broker)
pub const MSG_CONFIG: &str = "config";

/// Link create/remove (controller → broker)
pub const MSG_NEW_CONNECTION: &str = "new connection";

/// Forced disconnect (controller → broker)
pub const MSG_DISCONNECTION: &str = "disconnection";

/// Topology snapshot (broker → controller)
pub const MSG_CONN_UPDATE: &str = "connUpdate";
