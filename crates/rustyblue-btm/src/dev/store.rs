//! Bounded pool of device records

use log::{debug, info};

use super::types::*;
use crate::types::{BdAddr, DeviceType, Irk, Transport};

/// Resolves a resolvable private address against an IRK
///
/// The AES based `ah` function lives with the security layer; the store only
/// needs a yes/no answer.
pub trait AddressResolver {
    fn resolves(&self, irk: &Irk, rpa: &BdAddr) -> bool;
}

/// Slot arena of [`DeviceRecord`]s
///
/// Slots are reused after release so an index stays valid for as long as its
/// record lives.
pub struct DeviceRecordStore {
    records: Vec<Option<DeviceRecord>>,
    capacity: usize,
    next_timestamp: u32,
    resolver: Option<Box<dyn AddressResolver>>,
}

impl DeviceRecordStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { records: Vec::with_capacity(capacity), capacity, next_timestamp: 0, resolver: None }
    }

    pub fn set_resolver(&mut self, resolver: Box<dyn AddressResolver>) {
        self.resolver = Some(resolver);
    }

    /// Number of records in use
    pub fn len(&self) -> usize {
        self.records.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.records.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DeviceRecord> {
        self.records.iter_mut().flatten()
    }

    pub fn get(&self, idx: usize) -> Option<&DeviceRecord> {
        self.records.get(idx).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut DeviceRecord> {
        self.records.get_mut(idx).and_then(Option::as_mut)
    }

    fn matches(&self, record: &DeviceRecord, addr: &BdAddr) -> bool {
        if record.bd_addr == *addr
            || record.ble.pseudo_addr == *addr
            || record.ble.cur_rand_addr == Some(*addr)
            || record.ble.static_addr.map(|(_, a)| a) == Some(*addr)
        {
            return true;
        }

        match (&self.resolver, record.ble.irk) {
            (Some(resolver), Some(irk)) if addr.is_rpa() => resolver.resolves(&irk, addr),
            _ => false,
        }
    }

    pub fn find_index(&self, addr: &BdAddr) -> Option<usize> {
        self.records
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|record| self.matches(record, addr)))
    }

    pub fn find(&self, addr: &BdAddr) -> Option<&DeviceRecord> {
        self.find_index(addr).and_then(|idx| self.get(idx))
    }

    pub fn find_mut(&mut self, addr: &BdAddr) -> Option<&mut DeviceRecord> {
        let idx = self.find_index(addr)?;
        self.get_mut(idx)
    }

    pub fn find_index_by_handle(&self, handle: u16) -> Option<usize> {
        self.records.iter().position(|slot| {
            slot.as_ref().is_some_and(|record| {
                record.hci_handle == Some(handle) || record.ble_hci_handle == Some(handle)
            })
        })
    }

    pub fn find_by_handle(&self, handle: u16) -> Option<&DeviceRecord> {
        self.find_index_by_handle(handle).and_then(|idx| self.get(idx))
    }

    pub fn find_by_handle_mut(&mut self, handle: u16) -> Option<&mut DeviceRecord> {
        let idx = self.find_index_by_handle(handle)?;
        self.get_mut(idx)
    }

    fn next_timestamp(&mut self) -> u32 {
        let ts = self.next_timestamp;
        self.next_timestamp = self.next_timestamp.wrapping_add(1);
        ts
    }

    /// Claim an empty slot without evicting anything
    fn alloc_free_slot(&mut self, addr: BdAddr) -> Option<usize> {
        let idx = match self.records.iter().position(Option::is_none) {
            Some(idx) => idx,
            None if self.records.len() < self.capacity => {
                self.records.push(None);
                self.records.len() - 1
            }
            None => return None,
        };

        let timestamp = self.next_timestamp();
        self.records[idx] = Some(DeviceRecord::new(addr, timestamp));
        Some(idx)
    }

    /// Oldest unpaired record, else the oldest record overall
    fn eviction_candidate(&self) -> Option<usize> {
        let oldest = |paired_ok: bool| {
            self.records
                .iter()
                .enumerate()
                .filter_map(|(idx, slot)| slot.as_ref().map(|record| (idx, record)))
                .filter(|(_, record)| paired_ok || !record.is_paired())
                .min_by_key(|(_, record)| record.timestamp)
                .map(|(idx, _)| idx)
        };

        oldest(false).or_else(|| oldest(true))
    }

    /// Index of the record for `addr`, allocating one if needed
    pub fn find_or_allocate_index(&mut self, addr: BdAddr) -> usize {
        if let Some(idx) = self.find_index(&addr) {
            return idx;
        }

        if let Some(idx) = self.alloc_free_slot(addr) {
            debug!("allocated device record {} for {}", idx, addr);
            return idx;
        }

        // The pool is never empty here, capacity is at least one
        let idx = self.eviction_candidate().unwrap_or(0);
        if let Some(old) = &self.records[idx] {
            info!("evicting device record {} ({}) for {}", idx, old.bd_addr, addr);
        }
        let timestamp = self.next_timestamp();
        self.records[idx] = Some(DeviceRecord::new(addr, timestamp));
        idx
    }

    pub fn find_or_allocate(&mut self, addr: BdAddr) -> &mut DeviceRecord {
        let idx = self.find_or_allocate_index(addr);
        let timestamp = self.next_timestamp;
        self.records[idx].get_or_insert_with(|| DeviceRecord::new(addr, timestamp))
    }

    /// Insert or update a device from persisted bonding data
    ///
    /// Never evicts: returns false when the pool has no free slot.
    pub fn add(&mut self, info: DeviceInfo) -> bool {
        let idx = match self.find_index(&info.bd_addr) {
            Some(idx) => idx,
            None => match self.alloc_free_slot(info.bd_addr) {
                Some(idx) => idx,
                None => {
                    info!("no free device record for {}", info.bd_addr);
                    return false;
                }
            },
        };

        let Some(record) = self.get_mut(idx) else {
            return false;
        };

        if let Some(dev_class) = info.dev_class {
            record.dev_class = dev_class;
        }
        if let Some(name) = info.name {
            record.name = Some(name);
            record.sec_flags |= SecFlags::NAME_KNOWN;
        }
        if let Some(features) = info.features {
            record.features[0] = features;
            record.num_read_pages = record.num_read_pages.max(1);
        }
        record.trusted_mask = info.trusted_mask;
        if let Some(key) = info.link_key {
            record.link_key = Some(key);
            record.key_type = info.key_type;
            record.sec_flags |= SecFlags::LINK_KEY_KNOWN;
            record.bond_type = BondType::Persistent;
        }
        record.io_cap = info.io_cap;
        record.pin_code_length = info.pin_code_length;
        record.sc_support = info.sc_support;
        true
    }

    /// Release the record for `addr`
    pub fn remove(&mut self, addr: &BdAddr) -> bool {
        match self.find_index(addr) {
            Some(idx) => {
                self.records[idx] = None;
                true
            }
            None => false,
        }
    }

    /// Forget one transport of a device, releasing the record when nothing is left
    pub fn free_transport(&mut self, addr: &BdAddr, transport: Transport) -> bool {
        let Some(idx) = self.find_index(addr) else {
            return false;
        };
        let Some(record) = self.get_mut(idx) else {
            return false;
        };

        let release = match (record.device_type, transport) {
            (DeviceType::Dual, Transport::BrEdr) => {
                record.device_type = DeviceType::Ble;
                record.link_key = None;
                record.hci_handle = None;
                record.sec_flags &= !(SecFlags::AUTHORIZED
                    | SecFlags::AUTHENTICATED
                    | SecFlags::ENCRYPTED
                    | SecFlags::LINK_KEY_KNOWN
                    | SecFlags::LINK_KEY_AUTHED);
                false
            }
            (DeviceType::Dual, Transport::Le) => {
                record.device_type = DeviceType::BrEdr;
                record.ble_hci_handle = None;
                record.ble = BleRecord { pseudo_addr: record.bd_addr, ..Default::default() };
                record.sec_flags &= !(SecFlags::LE_AUTHORIZATION
                    | SecFlags::LE_AUTHENTICATED
                    | SecFlags::LE_ENCRYPTED
                    | SecFlags::LE_LINK_KEY_KNOWN
                    | SecFlags::LE_LINK_KEY_AUTHED);
                false
            }
            _ => true,
        };

        if release {
            self.records[idx] = None;
        }
        true
    }

    /// Fold any other record describing the same peer into `target`
    pub fn consolidate(&mut self, target: usize) {
        let Some(target_rec) = self.get(target).cloned() else {
            return;
        };

        let duplicates: Vec<usize> = self
            .records
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != target)
            .filter_map(|(idx, slot)| slot.as_ref().map(|record| (idx, record)))
            .filter(|(_, record)| {
                record.bd_addr == target_rec.bd_addr
                    || self.matches(&target_rec, &record.bd_addr)
                    || self.matches(record, &target_rec.bd_addr)
            })
            .map(|(idx, _)| idx)
            .collect();

        for idx in duplicates {
            let Some(dup) = self.records[idx].take() else {
                continue;
            };
            info!("consolidating device record {} ({}) into {}", idx, dup.bd_addr, target);

            if let Some(record) = self.get_mut(target) {
                record.device_type = record.device_type.union(dup.device_type);
                record.sec_flags |= dup.sec_flags;
                if record.hci_handle.is_none() {
                    record.hci_handle = dup.hci_handle;
                }
                if record.ble_hci_handle.is_none() {
                    record.ble_hci_handle = dup.ble_hci_handle;
                }
                if !record.ble.is_populated() && dup.ble.is_populated() {
                    record.ble = dup.ble;
                }
                if record.link_key.is_none() {
                    record.link_key = dup.link_key;
                    record.key_type = dup.key_type;
                }
                if record.name.is_none() {
                    record.name = dup.name;
                }
            }
        }
    }

    /// Reset security and bond state without dropping the record
    pub fn clear_security_flags(&mut self, addr: &BdAddr) -> bool {
        match self.find_mut(addr) {
            Some(record) => {
                record.sec_flags = SecFlags::empty();
                record.bond_type = BondType::Unknown;
                true
            }
            None => false,
        }
    }
}
