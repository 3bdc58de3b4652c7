use super::*;
use crate::types::{BdAddr, DeviceType, Transport};

fn addr(last: u8) -> BdAddr {
    BdAddr::new([last, 0x22, 0x33, 0x44, 0x55, 0x66])
}

fn pair(store: &mut DeviceRecordStore, a: BdAddr) {
    let record = store.find_or_allocate(a);
    record.link_key = Some([0xAA; 16]);
    record.sec_flags |= SecFlags::LINK_KEY_KNOWN;
}

#[test]
fn test_find_or_allocate_is_unique() {
    let mut store = DeviceRecordStore::new(4);

    for _ in 0..3 {
        store.find_or_allocate(addr(1));
        store.find_or_allocate(addr(2));
        store.find_or_allocate(addr(1));
    }

    assert_eq!(store.len(), 2);
    assert_eq!(store.iter().filter(|r| r.bd_addr == addr(1)).count(), 1);
}

#[test]
fn test_timestamps_increase() {
    let mut store = DeviceRecordStore::new(4);
    let first = store.find_or_allocate(addr(1)).timestamp;
    let second = store.find_or_allocate(addr(2)).timestamp;
    assert!(second > first);
}

#[test]
fn test_evicts_oldest_unpaired() {
    let mut store = DeviceRecordStore::new(3);
    store.find_or_allocate(addr(1));
    store.find_or_allocate(addr(2));
    store.find_or_allocate(addr(3));

    store.find_or_allocate(addr(4));

    // addr(1) had the smallest timestamp
    assert_eq!(store.len(), 3);
    assert!(store.find(&addr(1)).is_none());
    assert!(store.find(&addr(2)).is_some());
    assert!(store.find(&addr(4)).is_some());
}

#[test]
fn test_eviction_spares_paired_devices() {
    let mut store = DeviceRecordStore::new(3);
    pair(&mut store, addr(1));
    store.find_or_allocate(addr(2));
    pair(&mut store, addr(3));

    store.find_or_allocate(addr(4));

    // Oldest unpaired record goes, not the older paired one
    assert!(store.find(&addr(1)).is_some());
    assert!(store.find(&addr(2)).is_none());
}

#[test]
fn test_eviction_when_all_paired() {
    let mut store = DeviceRecordStore::new(2);
    pair(&mut store, addr(1));
    pair(&mut store, addr(2));

    store.find_or_allocate(addr(3));

    assert!(store.find(&addr(1)).is_none());
    assert!(store.find(&addr(2)).is_some());
    assert!(store.find(&addr(3)).is_some());
}

#[test]
fn test_released_slot_is_reused() {
    let mut store = DeviceRecordStore::new(2);
    let first = store.find_or_allocate_index(addr(1));
    store.find_or_allocate_index(addr(2));

    assert!(store.remove(&addr(1)));
    assert_eq!(store.find_or_allocate_index(addr(3)), first);
    assert!(store.find(&addr(2)).is_some());
}

#[test]
fn test_add_does_not_evict() {
    let mut store = DeviceRecordStore::new(1);
    store.find_or_allocate(addr(1));

    let info = DeviceInfo { bd_addr: addr(2), link_key: Some([1; 16]), ..Default::default() };
    assert!(!store.add(info));

    // Updating an existing record still works
    let info = DeviceInfo { bd_addr: addr(1), link_key: Some([1; 16]), key_type: 4, ..Default::default() };
    assert!(store.add(info));
    let record = store.find(&addr(1)).unwrap();
    assert!(record.is_paired());
    assert_eq!(record.key_type, 4);
    assert_eq!(record.bond_type, BondType::Persistent);
}

#[test]
fn test_find_by_handle() {
    let mut store = DeviceRecordStore::new(4);
    store.find_or_allocate(addr(1)).hci_handle = Some(0x10);
    store.find_or_allocate(addr(2)).ble_hci_handle = Some(0x20);

    assert_eq!(store.find_by_handle(0x10).unwrap().bd_addr, addr(1));
    assert_eq!(store.find_by_handle(0x20).unwrap().bd_addr, addr(2));
    assert!(store.find_by_handle(0x30).is_none());
}

struct AcceptAll;

impl AddressResolver for AcceptAll {
    fn resolves(&self, irk: &crate::types::Irk, _rpa: &BdAddr) -> bool {
        irk[0] == 0x5A
    }
}

#[test]
fn test_find_resolves_rpa() {
    let mut store = DeviceRecordStore::new(4);
    store.set_resolver(Box::new(AcceptAll));
    store.find_or_allocate(addr(1)).ble.irk = Some([0x5A; 16]);

    let rpa = BdAddr::new([1, 2, 3, 4, 5, 0x4B]);
    assert_eq!(store.find(&rpa).unwrap().bd_addr, addr(1));

    // A non-resolvable random address never goes through the resolver
    let nrpa = BdAddr::new([1, 2, 3, 4, 5, 0x0B]);
    assert!(store.find(&nrpa).is_none());
}

#[test]
fn test_consolidate_merges_rpa_record() {
    let mut store = DeviceRecordStore::new(4);
    store.set_resolver(Box::new(AcceptAll));

    let rpa = BdAddr::new([1, 2, 3, 4, 5, 0x4B]);
    {
        let record = store.find_or_allocate(rpa);
        record.device_type = DeviceType::Ble;
        record.ble_hci_handle = Some(0x40);
        record.sec_flags |= SecFlags::LE_ENCRYPTED;
    }
    let target = store.find_or_allocate_index(addr(1));
    {
        let record = store.get_mut(target).unwrap();
        record.ble.irk = Some([0x5A; 16]);
        record.hci_handle = Some(0x01);
    }

    store.consolidate(target);

    assert_eq!(store.len(), 1);
    let record = store.get(target).unwrap();
    assert_eq!(record.device_type, DeviceType::Dual);
    assert_eq!(record.ble_hci_handle, Some(0x40));
    assert!(record.sec_flags.contains(SecFlags::LE_ENCRYPTED));
}

#[test]
fn test_free_transport_keeps_dual_record() {
    let mut store = DeviceRecordStore::new(4);
    {
        let record = store.find_or_allocate(addr(1));
        record.device_type = DeviceType::Dual;
        record.sec_flags = SecFlags::LINK_KEY_KNOWN | SecFlags::LE_LINK_KEY_KNOWN;
    }

    assert!(store.free_transport(&addr(1), Transport::BrEdr));
    let record = store.find(&addr(1)).unwrap();
    assert_eq!(record.device_type, DeviceType::Ble);
    assert!(!record.sec_flags.contains(SecFlags::LINK_KEY_KNOWN));

    assert!(store.free_transport(&addr(1), Transport::Le));
    assert!(store.find(&addr(1)).is_none());
}

#[test]
fn test_clear_security_flags() {
    let mut store = DeviceRecordStore::new(2);
    pair(&mut store, addr(1));
    assert!(store.clear_security_flags(&addr(1)));
    assert!(!store.find(&addr(1)).unwrap().is_paired());
    assert!(!store.clear_security_flags(&addr(9)));
}
