//! Device record types

use bitflags::bitflags;

use crate::types::{AddressType, BdAddr, BdName, DevClass, DeviceType, Irk, LinkKey};

/// Number of LMP feature pages kept per device (pages 0..=2)
pub const MAX_FEATURE_PAGES: usize = 3;

bitflags! {
    /// Security state of a remote device
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SecFlags: u32 {
        const AUTHORIZED = 0x0001;
        const AUTHENTICATED = 0x0002;
        const ENCRYPTED = 0x0004;
        const NAME_KNOWN = 0x0008;
        const LINK_KEY_KNOWN = 0x0010;
        const LINK_KEY_AUTHED = 0x0020;
        const ROLE_SWITCHED = 0x0040;
        const LE_AUTHORIZATION = 0x0100;
        const LE_AUTHENTICATED = 0x0200;
        const LE_ENCRYPTED = 0x0400;
        const LE_NAME_KNOWN = 0x0800;
        const LE_LINK_KEY_KNOWN = 0x1000;
        const LE_LINK_KEY_AUTHED = 0x2000;
        const PIN_16_DIGIT_AUTHED = 0x4000;
    }
}

bitflags! {
    /// Controller lists a device currently sits in
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ControllerLists: u8 {
        const WHITE_LIST = 0x01;
        const RESOLVING_LIST = 0x02;
    }
}

/// How long a bond is meant to survive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BondType {
    #[default]
    Unknown,
    Persistent,
    Temporary,
}

/// Which LE address of the peer is currently in use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveAddr {
    #[default]
    Pseudo,
    Rpa,
    Static,
}

/// Preferred LE connection parameters, in controller units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnParams {
    pub min_conn_int: u16,
    pub max_conn_int: u16,
    pub slave_latency: u16,
    pub supervision_tout: u16,
}

/// LE specific part of a device record
#[derive(Debug, Clone, Default)]
pub struct BleRecord {
    /// Address the upper layers know the device by
    pub pseudo_addr: BdAddr,
    pub ble_addr_type: AddressType,
    /// Identity address learned during pairing
    pub static_addr: Option<(AddressType, BdAddr)>,
    /// Most recent resolvable private address seen
    pub cur_rand_addr: Option<BdAddr>,
    pub active_addr: ActiveAddr,
    pub irk: Option<Irk>,
    pub in_controller_list: ControllerLists,
    pub resolving_list_index: u8,
    pub conn_params: Option<ConnParams>,
}

impl BleRecord {
    pub fn is_populated(&self) -> bool {
        self.irk.is_some() || self.static_addr.is_some() || self.cur_rand_addr.is_some()
    }
}

/// One remote peer's identity and security state
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub bd_addr: BdAddr,
    pub dev_class: DevClass,
    pub name: Option<BdName>,
    pub features: [[u8; 8]; MAX_FEATURE_PAGES],
    /// Feature pages read from the peer so far, 0 when none are cached
    pub num_read_pages: u8,
    pub link_key: Option<LinkKey>,
    pub key_type: u8,
    pub trusted_mask: u32,
    pub io_cap: u8,
    pub pin_code_length: u8,
    pub sc_support: bool,
    /// Peer supports secure simple pairing on both controller and host
    pub ssp_capable: bool,
    pub sec_flags: SecFlags,
    pub bond_type: BondType,
    pub device_type: DeviceType,
    pub hci_handle: Option<u16>,
    pub ble_hci_handle: Option<u16>,
    pub ble: BleRecord,
    /// Allocation order; lower is older
    pub timestamp: u32,
}

impl DeviceRecord {
    pub fn new(bd_addr: BdAddr, timestamp: u32) -> Self {
        Self {
            bd_addr,
            dev_class: [0; 3],
            name: None,
            features: [[0; 8]; MAX_FEATURE_PAGES],
            num_read_pages: 0,
            link_key: None,
            key_type: 0,
            trusted_mask: 0,
            io_cap: 0,
            pin_code_length: 0,
            sc_support: false,
            ssp_capable: false,
            sec_flags: SecFlags::empty(),
            bond_type: BondType::Unknown,
            device_type: DeviceType::BrEdr,
            hci_handle: None,
            ble_hci_handle: None,
            ble: BleRecord { pseudo_addr: bd_addr, ..Default::default() },
            timestamp,
        }
    }

    /// A link key exists on either transport
    pub fn is_paired(&self) -> bool {
        self.sec_flags.intersects(SecFlags::LINK_KEY_KNOWN | SecFlags::LE_LINK_KEY_KNOWN)
    }

    /// True when feature pages are cached and can skip a remote read
    pub fn has_cached_features(&self) -> bool {
        self.num_read_pages >= 1 && self.num_read_pages as usize <= MAX_FEATURE_PAGES
    }

    /// Derive the peer's pairing capabilities from its feature pages
    pub fn apply_peer_sec_caps(&mut self) {
        use crate::hci::constants::*;

        let host_page = (self.num_read_pages > 1).then_some(&self.features[1]);
        self.ssp_capable = feature_supported(&self.features[0], LMP_SIMPLE_PAIRING)
            && host_page.is_some_and(|page| feature_supported(page, LMP_HOST_SSP));
        self.sc_support =
            host_page.is_some_and(|page| feature_supported(page, LMP_HOST_SECURE_CONNECTIONS));
    }
}

/// Full device info used to restore a bonded device
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    pub bd_addr: BdAddr,
    pub dev_class: Option<DevClass>,
    pub name: Option<BdName>,
    pub features: Option<[u8; 8]>,
    pub trusted_mask: u32,
    pub link_key: Option<LinkKey>,
    pub key_type: u8,
    pub io_cap: u8,
    pub pin_code_length: u8,
    pub sc_support: bool,
}
