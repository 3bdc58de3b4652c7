use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Bluetooth service UUID
///
/// Stored as 128 bits in little-endian order, the way UUIDs appear in EIR,
/// advertising data and vendor commands. 16 and 32-bit UUIDs are expanded
/// over the Bluetooth base UUID.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Uuid {
    bytes: [u8; 16],
}

/// "00000000-0000-1000-8000-00805F9B34FB" in little-endian order
const BASE_UUID_BYTES: [u8; 16] = [
    0xFB, 0x34, 0x9B, 0x5F, 0x80, 0x00, 0x00, 0x80, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Where a short UUID sits inside the base UUID
const BASE_OFFSET: usize = 12;

/// Encoded width of a UUID on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UuidSize {
    Bits16 = 2,
    Bits32 = 4,
    Bits128 = 16,
}

impl UuidSize {
    pub fn byte_len(self) -> usize {
        self as usize
    }
}

impl Uuid {
    pub const fn from_bytes_le(bytes: [u8; 16]) -> Self {
        Uuid { bytes }
    }

    pub const fn from_u16(uuid16: u16) -> Self {
        let mut bytes = BASE_UUID_BYTES;
        bytes[BASE_OFFSET] = uuid16 as u8;
        bytes[BASE_OFFSET + 1] = (uuid16 >> 8) as u8;
        Uuid { bytes }
    }

    pub const fn from_u32(uuid32: u32) -> Self {
        let mut bytes = BASE_UUID_BYTES;
        bytes[BASE_OFFSET] = uuid32 as u8;
        bytes[BASE_OFFSET + 1] = (uuid32 >> 8) as u8;
        bytes[BASE_OFFSET + 2] = (uuid32 >> 16) as u8;
        bytes[BASE_OFFSET + 3] = (uuid32 >> 24) as u8;
        Uuid { bytes }
    }

    /// Decode a 2, 4 or 16 byte little-endian UUID
    pub fn try_from_slice_le(slice: &[u8]) -> Option<Self> {
        match slice.len() {
            2 => Some(Uuid::from_u16(u16::from_le_bytes([slice[0], slice[1]]))),
            4 => Some(Uuid::from_u32(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))),
            16 => {
                let mut bytes = [0u8; 16];
                bytes.copy_from_slice(slice);
                Some(Uuid::from_bytes_le(bytes))
            }
            _ => None,
        }
    }

    pub const fn as_bytes_le(&self) -> &[u8; 16] {
        &self.bytes
    }

    fn is_sig_assigned(&self) -> bool {
        self.bytes[0..BASE_OFFSET] == BASE_UUID_BYTES[0..BASE_OFFSET]
    }

    /// The 16-bit form, if this UUID has one
    pub fn as_u16(&self) -> Option<u16> {
        if self.is_sig_assigned() && self.bytes[BASE_OFFSET + 2] == 0 && self.bytes[BASE_OFFSET + 3] == 0
        {
            Some(u16::from_le_bytes([self.bytes[BASE_OFFSET], self.bytes[BASE_OFFSET + 1]]))
        } else {
            None
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        if self.is_sig_assigned() {
            Some(u32::from_le_bytes([
                self.bytes[BASE_OFFSET],
                self.bytes[BASE_OFFSET + 1],
                self.bytes[BASE_OFFSET + 2],
                self.bytes[BASE_OFFSET + 3],
            ]))
        } else {
            None
        }
    }

    /// Shortest wire width that represents this UUID
    pub fn shortest_size(&self) -> UuidSize {
        if self.as_u16().is_some() {
            UuidSize::Bits16
        } else if self.as_u32().is_some() {
            UuidSize::Bits32
        } else {
            UuidSize::Bits128
        }
    }

    /// Little-endian encoding in the shortest width
    pub fn to_le_vec(&self) -> Vec<u8> {
        match self.shortest_size() {
            UuidSize::Bits16 => self.bytes[BASE_OFFSET..BASE_OFFSET + 2].to_vec(),
            UuidSize::Bits32 => self.bytes[BASE_OFFSET..BASE_OFFSET + 4].to_vec(),
            UuidSize::Bits128 => self.bytes.to_vec(),
        }
    }
}

impl From<u16> for Uuid {
    fn from(uuid16: u16) -> Self {
        Uuid::from_u16(uuid16)
    }
}

impl From<u32> for Uuid {
    fn from(uuid32: u32) -> Self {
        Uuid::from_u32(uuid32)
    }
}

impl PartialEq<u16> for Uuid {
    fn eq(&self, other: &u16) -> bool {
        self.as_u16() == Some(*other)
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut b = self.bytes;
        b.reverse();
        write!(
            f,
            "{}-{}-{}-{}-{}",
            hex::encode(&b[0..4]),
            hex::encode(&b[4..6]),
            hex::encode(&b[6..8]),
            hex::encode(&b[8..10]),
            hex::encode(&b[10..16])
        )
    }
}

impl fmt::Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.as_u16(), self.as_u32()) {
            (Some(short), _) => write!(f, "Uuid(0x{:04X})", short),
            (None, Some(long)) => write!(f, "Uuid(0x{:08X})", long),
            _ => fmt::Display::fmt(self, f),
        }
    }
}

#[derive(Debug)]
pub enum UuidParseError {
    InvalidLength,
    InvalidFormat,
    HexError(hex::FromHexError),
}

impl From<hex::FromHexError> for UuidParseError {
    fn from(err: hex::FromHexError) -> Self {
        UuidParseError::HexError(err)
    }
}

impl From<ParseIntError> for UuidParseError {
    fn from(_: ParseIntError) -> Self {
        UuidParseError::InvalidFormat
    }
}

impl FromStr for Uuid {
    type Err = UuidParseError;

    /// Accepts "110A", "0000110A" or the full form with or without hyphens
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned: String = s.chars().filter(|c| c.is_ascii_hexdigit()).collect();

        match cleaned.len() {
            4 => Ok(Uuid::from_u16(u16::from_str_radix(&cleaned, 16)?)),
            8 => Ok(Uuid::from_u32(u32::from_str_radix(&cleaned, 16)?)),
            32 => {
                let mut bytes = [0u8; 16];
                hex::decode_to_slice(&cleaned, &mut bytes)?;
                bytes.reverse();
                Ok(Uuid::from_bytes_le(bytes))
            }
            _ => Err(UuidParseError::InvalidLength),
        }
    }
}
