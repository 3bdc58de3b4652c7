//! Core value types shared across the BTM layer

use std::fmt;

/// BD_ADDR length in bytes
pub const BD_ADDR_LEN: usize = 6;
/// Class of device length in bytes
pub const DEV_CLASS_LEN: usize = 3;
/// Maximum remote name length (including the terminator slot)
pub const BD_NAME_LEN: usize = 248;
/// Link key length in bytes
pub const LINK_KEY_LEN: usize = 16;

pub type DevClass = [u8; DEV_CLASS_LEN];
pub type LinkKey = [u8; LINK_KEY_LEN];
pub type Irk = [u8; 16];

/// Bluetooth device address, stored little-endian as it appears on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BdAddr {
    pub bytes: [u8; BD_ADDR_LEN],
}

impl BdAddr {
    pub const ANY: BdAddr = BdAddr { bytes: [0; BD_ADDR_LEN] };

    pub const fn new(bytes: [u8; BD_ADDR_LEN]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() >= BD_ADDR_LEN {
            let mut bytes = [0u8; BD_ADDR_LEN];
            bytes.copy_from_slice(&slice[0..BD_ADDR_LEN]);
            Some(Self { bytes })
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Top two bits of the most significant byte are `01` for a resolvable private address
    pub fn is_rpa(&self) -> bool {
        self.bytes[5] & 0xC0 == 0x40
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.bytes[5],
            self.bytes[4],
            self.bytes[3],
            self.bytes[2],
            self.bytes[1],
            self.bytes[0]
        )
    }
}

/// LE address type as carried in HCI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressType {
    #[default]
    Public,
    Random,
    PublicIdentity,
    RandomIdentity,
}

impl From<u8> for AddressType {
    fn from(value: u8) -> Self {
        match value {
            0x01 => AddressType::Random,
            0x02 => AddressType::PublicIdentity,
            0x03 => AddressType::RandomIdentity,
            _ => AddressType::Public,
        }
    }
}

impl From<AddressType> for u8 {
    fn from(value: AddressType) -> Self {
        match value {
            AddressType::Public => 0x00,
            AddressType::Random => 0x01,
            AddressType::PublicIdentity => 0x02,
            AddressType::RandomIdentity => 0x03,
        }
    }
}

/// Transport a link or operation runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    BrEdr,
    Le,
}

/// Local role on an ACL link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkRole {
    Master,
    Slave,
}

impl LinkRole {
    pub fn opposite(self) -> Self {
        match self {
            LinkRole::Master => LinkRole::Slave,
            LinkRole::Slave => LinkRole::Master,
        }
    }

    pub fn to_hci(self) -> u8 {
        match self {
            LinkRole::Master => crate::hci::constants::HCI_ROLE_MASTER,
            LinkRole::Slave => crate::hci::constants::HCI_ROLE_SLAVE,
        }
    }
}

/// Power mode of a classic link as last reported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerMode {
    #[default]
    Active,
    Hold,
    Sniff,
    Park,
}

/// Which radios a remote device has been seen on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceType {
    #[default]
    BrEdr,
    Ble,
    Dual,
}

impl DeviceType {
    /// Combine two observations of the same peer
    pub fn union(self, other: DeviceType) -> DeviceType {
        if self == other {
            self
        } else {
            DeviceType::Dual
        }
    }
}

/// Remote device name, bounded to [`BD_NAME_LEN`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BdName(String);

impl BdName {
    pub fn new(name: &str) -> Self {
        let mut end = name.len().min(BD_NAME_LEN - 1);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        Self(name[..end].to_string())
    }

    /// Decode a NUL terminated name as carried in a remote name event
    pub fn from_bytes(raw: &[u8]) -> Self {
        let len = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Self::new(&String::from_utf8_lossy(&raw[..len]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bd_addr_display() {
        let addr = BdAddr::new([0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA]);
        assert_eq!(addr.to_string(), "AA:BB:CC:DD:EE:FF");
        assert!(BdAddr::from_slice(&[1, 2, 3]).is_none());
    }

    #[test]
    fn test_rpa_detection() {
        assert!(BdAddr::new([0, 0, 0, 0, 0, 0x4A]).is_rpa());
        assert!(!BdAddr::new([0, 0, 0, 0, 0, 0xCA]).is_rpa());
    }

    #[test]
    fn test_bd_name_bounds() {
        let long = "x".repeat(400);
        assert_eq!(BdName::new(&long).as_str().len(), BD_NAME_LEN - 1);
        assert_eq!(BdName::from_bytes(b"phone\0garbage").as_str(), "phone");
    }

    #[test]
    fn test_device_type_union() {
        assert_eq!(DeviceType::Ble.union(DeviceType::BrEdr), DeviceType::Dual);
        assert_eq!(DeviceType::Ble.union(DeviceType::Ble), DeviceType::Ble);
    }
}
