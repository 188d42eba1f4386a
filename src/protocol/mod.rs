//! Broker wire protocol
//!
//! All structured traffic is a JSON text envelope:
//!
//! ```text
//! {"messageType": <string>, "messageContent": <object>}
//! ```
//!
//! | messageType      | Direction           | Content                                   |
//! |------------------|---------------------|-------------------------------------------|
//! | `config`         | client → broker     | `{name, mode, dataType?}`                 |
//! | `new connection` | controller → broker | `{receiver, sender, remove}`              |
//! | `disconnection`  | controller → broker | `{name}`                                  |
//! | `connUpdate`     | broker → controller | `{senderList, receiverList}`              |
//!
//! The bare token `"_ping"` is the liveness probe and its reply. Data frames
//! from registered senders are opaque and forwarded verbatim.

pub mod constants;
pub mod envelope;
pub mod topology;

pub use constants::PING_TOKEN;
pub use envelope::{ConfigRequest, ControlMessage, DisconnectRequest, Envelope, LinkRequest};
pub use topology::{DeviceSummary, PeerSummary, Topology};
