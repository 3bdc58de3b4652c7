//! Device record store
//!
//! Keeps one [`DeviceRecord`] per remote peer, addressable by address or by
//! HCI handle. The pool is bounded; when it is full the oldest unpaired record
//! is recycled first.

pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

pub use store::{AddressResolver, DeviceRecordStore};
pub use types::{
    ActiveAddr, BleRecord, BondType, ConnParams, ControllerLists, DeviceInfo, DeviceRecord,
    SecFlags, MAX_FEATURE_PAGES,
};

use log::warn;

use crate::btm::Btm;
use crate::hci::HciCommand;
use crate::types::{AddressType, BdAddr, DeviceType, Transport};

impl Btm {
    /// Restore a bonded device; false when the pool has no free slot
    pub fn add_device(&mut self, info: DeviceInfo) -> bool {
        self.devices.add(info)
    }

    /// Forget a device on one transport
    ///
    /// Refused while an ACL link on that transport is up.
    pub fn delete_device(&mut self, bd_addr: BdAddr, transport: Transport) -> bool {
        if self.acl.find(&bd_addr, transport).is_some() {
            warn!("delete_device: {} still connected", bd_addr);
            return false;
        }

        let Some(record) = self.devices.find(&bd_addr) else {
            return true;
        };

        if transport == Transport::BrEdr && record.link_key.is_some() {
            let addr = record.bd_addr;
            // Best effort; the record is released either way
            if self
                .send(HciCommand::DeleteStoredLinkKey { bd_addr: addr, delete_all: false })
                .is_err()
            {
                warn!("delete_device: could not delete stored link key for {}", addr);
            }
        }

        self.devices.free_transport(&bd_addr, transport)
    }

    /// Device type and LE address type of a known device
    pub fn read_dev_info(&self, bd_addr: &BdAddr) -> Option<(DeviceType, AddressType)> {
        self.devices.find(bd_addr).map(|record| (record.device_type, record.ble.ble_addr_type))
    }

    pub fn sec_flags(&self, bd_addr: &BdAddr) -> Option<SecFlags> {
        self.devices.find(bd_addr).map(|record| record.sec_flags)
    }

    /// Reset the security flags of a device, e.g. before re-pairing
    pub fn clear_security_flags(&mut self, bd_addr: &BdAddr) -> bool {
        self.devices.clear_security_flags(bd_addr)
    }

    /// Record a pairing outcome for an LE peer and merge duplicate records
    pub fn update_ble_identity(
        &mut self,
        bd_addr: BdAddr,
        identity_type: AddressType,
        identity: BdAddr,
        irk: Option<crate::types::Irk>,
    ) {
        let idx = self.devices.find_or_allocate_index(bd_addr);
        if let Some(record) = self.devices.get_mut(idx) {
            record.ble.static_addr = Some((identity_type, identity));
            if let Some(irk) = irk {
                record.ble.irk = Some(irk);
            }
        }
        self.devices.consolidate(idx);
    }
}
