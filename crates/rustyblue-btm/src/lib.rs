//! RustyBlue BTM - the Bluetooth device manager layer
//!
//! This library sits between the HCI transport and the profile layers. It
//! keeps the device records and the ACL link table, runs inquiry and LE
//! discovery, and drives the controller's LE lists (white list, resolving
//! list) and the vendor offloads (advertising filter, multi-advertising,
//! batch scan).
//!
//! Everything hangs off one [`Btm`] context. The embedder supplies the HCI
//! transport, controller capabilities, timers and an upward event sink, and
//! feeds HCI events back in through the `on_*` methods.

pub mod acl;
pub mod ble;
pub mod btm;
pub mod callbacks;
pub mod config;
pub mod controller;
pub mod dev;
pub mod error;
pub mod hci;
pub mod inq;
pub mod queue;
pub mod timer;
pub mod types;
pub mod uuid;

#[cfg(test)]
mod test_utils;

// Re-export common types for convenience
pub use btm::Btm;
pub use callbacks::{BtmEvents, BusyLevelUpdate, Completion, NoopEvents};
pub use config::BtmConfig;
pub use controller::Controller;
pub use error::{BtmError, BtmResult, BtmStatus, HciError, Issued};
pub use hci::{HciCommand, HciTransport};
pub use timer::{BtmTimer, TimerService};
pub use types::{AddressType, BdAddr, BdName, DevClass, DeviceType, LinkRole, Transport};
pub use uuid::Uuid;
