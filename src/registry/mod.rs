//! Device registry and link graph
//!
//! The registry owns every connected device and the symmetric links between
//! senders and receivers. It enforces:
//!
//! - names are unique across senders and receivers (controllers may share)
//! - a link exists on the sender's side iff it exists on the receiver's side
//! - each transport is bound to at most one device
//!
//! # Architecture
//!
//! ```text
//!                        DeviceRegistry
//!        ┌──────────────────────────────────────────────┐
//!        │ devices:       BTreeMap<DeviceId, Device>    │
//!        │ by_connection: HashMap<ConnectionId, Id>     │
//!        │ by_name:       HashMap<String, Id>           │
//!        │ links:         LinkTable                     │
//!        │   by_sender:   name -> IndexSet<receiver>    │
//!        │   by_receiver: name -> IndexSet<sender>      │
//!        └──────────────────────────────────────────────┘
//! ```
//!
//! Data types of linked devices are never compared.

pub mod config;
pub mod device;
pub mod links;
pub mod store;

pub use config::RegistryConfig;
pub use device::{DataType, Device, DeviceId, DeviceKind, Role};
pub use links::LinkTable;
pub use store::{DeviceRegistry, Teardown};
