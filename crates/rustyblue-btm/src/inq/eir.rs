//! Extended inquiry response parsing
//!
//! EIR and LE advertising data share one layout: a run of
//! `length | type | data` structures where `length` covers type and data.
//! Service UUIDs found in an EIR are folded into [`EirServices`], a bitmap
//! keyed by [`EIR_UUID_LOOKUP`].

use log::{debug, trace};

use crate::inq::types::{EirSearchResult, InqResults};
use crate::uuid::{Uuid, UuidSize};

/// Longest EIR payload a controller delivers
pub const EXT_INQ_RESPONSE_LEN: usize = 240;

pub const EIR_FLAGS_TYPE: u8 = 0x01;
pub const EIR_MORE_16BITS_UUID_TYPE: u8 = 0x02;
pub const EIR_COMPLETE_16BITS_UUID_TYPE: u8 = 0x03;
pub const EIR_MORE_32BITS_UUID_TYPE: u8 = 0x04;
pub const EIR_COMPLETE_32BITS_UUID_TYPE: u8 = 0x05;
pub const EIR_MORE_128BITS_UUID_TYPE: u8 = 0x06;
pub const EIR_COMPLETE_128BITS_UUID_TYPE: u8 = 0x07;
pub const EIR_SHORTENED_LOCAL_NAME_TYPE: u8 = 0x08;
pub const EIR_COMPLETE_LOCAL_NAME_TYPE: u8 = 0x09;
pub const EIR_TX_POWER_LEVEL_TYPE: u8 = 0x0A;
pub const EIR_MANUFACTURER_SPECIFIC_TYPE: u8 = 0xFF;

/// Services tracked in the EIR bitmap, by bit position
pub const EIR_UUID_LOOKUP: [u16; 46] = [
    0x1000, // service discovery server
    0x1101, // serial port
    0x1102, // LAN access using PPP
    0x1103, // dial-up networking
    0x1104, // IrMC sync
    0x1105, // OBEX object push
    0x1106, // OBEX file transfer
    0x1107, // IrMC sync command
    0x1108, // headset
    0x1109, // cordless telephony
    0x110A, // audio source
    0x110B, // audio sink
    0x110C, // AV remote control target
    0x110E, // AV remote control
    0x1110, // intercom
    0x1111, // fax
    0x1112, // headset audio gateway
    0x1115, // PANU
    0x1116, // NAP
    0x1117, // GN
    0x1118, // direct printing
    0x111A, // imaging
    0x111B, // imaging responder
    0x111C, // imaging automatic archive
    0x111D, // imaging referenced objects
    0x111E, // handsfree
    0x111F, // handsfree audio gateway
    0x1120, // direct printing reference objects
    0x1122, // basic printing
    0x1123, // printing status
    0x1124, // human interface device
    0x1125, // hardcopy cable replacement
    0x1126, // HCRP print
    0x1127, // HCRP scan
    0x112D, // SIM access
    0x112E, // phonebook access client
    0x112F, // phonebook access server
    0x1130, // phonebook access
    0x1131, // headset HS
    0x1200, // PnP information
    0x1303, // video source
    0x1304, // video sink
    0x1132, // message access server
    0x1133, // message notification server
    0x1401, // HDP source
    0x1402, // HDP sink
];

fn service_index(uuid16: u16) -> Option<usize> {
    EIR_UUID_LOOKUP.iter().position(|&known| known == uuid16)
}

/// Bitmap of well-known services, one bit per [`EIR_UUID_LOOKUP`] entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct EirServices(u64);

impl EirServices {
    pub const fn empty() -> Self {
        EirServices(0)
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// False for services outside the lookup table
    pub fn has(&self, uuid16: u16) -> bool {
        service_index(uuid16).is_some_and(|idx| self.0 & (1 << idx) != 0)
    }

    /// Unknown services are ignored
    pub fn add(&mut self, uuid16: u16) {
        if let Some(idx) = service_index(uuid16) {
            self.0 |= 1 << idx;
        }
    }

    pub fn remove(&mut self, uuid16: u16) {
        if let Some(idx) = service_index(uuid16) {
            self.0 &= !(1 << idx);
        }
    }

    /// Up to `max` set services and the EIR list type they should be sent as
    ///
    /// The type is "more" when services beyond `max` were left out.
    pub fn supported_services(&self, max: usize) -> (Vec<u16>, u8) {
        let mut out = Vec::new();
        for (idx, &uuid16) in EIR_UUID_LOOKUP.iter().enumerate() {
            if self.0 & (1 << idx) == 0 {
                continue;
            }
            if out.len() == max {
                return (out, EIR_MORE_16BITS_UUID_TYPE);
            }
            out.push(uuid16);
        }
        (out, EIR_COMPLETE_16BITS_UUID_TYPE)
    }
}

/// Iterator over the `(type, data)` structures of EIR or advertising data
///
/// Stops at the first zero length or at a structure that runs past the end.
pub struct AdStructures<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let length = *self.data.get(self.pos)? as usize;
        if length == 0 || self.pos + length >= self.data.len() {
            return None;
        }
        let ad_type = self.data[self.pos + 1];
        let body = &self.data[self.pos + 2..self.pos + 1 + length];
        self.pos += 1 + length;
        Some((ad_type, body))
    }
}

pub fn ad_structures(data: &[u8]) -> AdStructures<'_> {
    let end = data.len().min(EXT_INQ_RESPONSE_LEN);
    AdStructures { data: &data[..end], pos: 0 }
}

/// Find the first structure of `eir_type`
pub fn check_eir_data(eir: &[u8], eir_type: u8) -> Option<&[u8]> {
    ad_structures(eir).find(|(t, _)| *t == eir_type).map(|(_, body)| body)
}

fn list_types(size: UuidSize) -> (u8, u8) {
    match size {
        UuidSize::Bits16 => (EIR_COMPLETE_16BITS_UUID_TYPE, EIR_MORE_16BITS_UUID_TYPE),
        UuidSize::Bits32 => (EIR_COMPLETE_32BITS_UUID_TYPE, EIR_MORE_32BITS_UUID_TYPE),
        UuidSize::Bits128 => (EIR_COMPLETE_128BITS_UUID_TYPE, EIR_MORE_128BITS_UUID_TYPE),
    }
}

/// Raw UUID list of one width, preferring the complete list over the partial one
fn raw_uuid_list(eir: &[u8], size: UuidSize) -> Option<(u8, &[u8])> {
    let (complete, more) = list_types(size);
    check_eir_data(eir, complete)
        .map(|body| (complete, body))
        .or_else(|| check_eir_data(eir, more).map(|body| (more, body)))
}

/// UUIDs of one width listed in an EIR, with the list type they came from
///
/// At most `max` UUIDs are returned.
pub fn get_eir_uuid_list(eir: &[u8], size: UuidSize, max: usize) -> Option<(u8, Vec<Uuid>)> {
    let (list_type, body) = raw_uuid_list(eir, size)?;
    let total = body.len() / size.byte_len();
    if total > max {
        debug!("EIR lists {} UUIDs, returning {}", total, max);
    }

    let uuids: Vec<Uuid> = body
        .chunks_exact(size.byte_len())
        .take(max)
        .filter_map(Uuid::try_from_slice_le)
        .collect();
    if size == UuidSize::Bits128 {
        for uuid in &uuids {
            trace!("EIR UUID128 {}", hex::encode(uuid.as_bytes_le()));
        }
    }
    Some((list_type, uuids))
}

/// Collapse a 16, 32 or 128-bit UUID to its 16-bit form; 0 if it has none
pub fn uuid_to_uuid16(raw: &[u8]) -> u16 {
    Uuid::try_from_slice_le(raw).and_then(|uuid| uuid.as_u16()).unwrap_or(0)
}

/// Known services in an EIR and whether the 16-bit list was complete
pub fn parse_eir_services(eir: &[u8]) -> (EirServices, bool) {
    let mut services = EirServices::empty();
    let mut complete = false;

    for size in [UuidSize::Bits16, UuidSize::Bits32, UuidSize::Bits128] {
        let Some((list_type, body)) = raw_uuid_list(eir, size) else {
            continue;
        };
        if size == UuidSize::Bits16 {
            complete = list_type == EIR_COMPLETE_16BITS_UUID_TYPE;
        }
        for raw in body.chunks_exact(size.byte_len()) {
            match uuid_to_uuid16(raw) {
                0 => {}
                uuid16 => services.add(uuid16),
            }
        }
    }
    (services, complete)
}

pub fn has_eir_service(services: &EirServices, uuid16: u16) -> bool {
    services.has(uuid16)
}

/// Whether a discovered device offers a service, judged from its EIR
pub fn has_inquiry_eir_service(results: &InqResults, uuid16: u16) -> EirSearchResult {
    if results.eir_uuids.has(uuid16) {
        EirSearchResult::Found
    } else if results.eir_complete_list {
        EirSearchResult::NotFound
    } else {
        EirSearchResult::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_eir() -> Vec<u8> {
        let mut eir = vec![
            0x05, EIR_COMPLETE_16BITS_UUID_TYPE, 0x0B, 0x11, 0x1E, 0x11, // audio sink, handsfree
            0x05, EIR_MORE_32BITS_UUID_TYPE, 0x05, 0x11, 0x00, 0x00, // object push
            0x11, EIR_MORE_128BITS_UUID_TYPE,
        ];
        let mut pbap = [
            0xFB, 0x34, 0x9B, 0x5F, 0x80, 0x00, 0x00, 0x80, 0x00, 0x10, 0x00, 0x00, 0x2F, 0x11, 0x00,
            0x00,
        ];
        eir.extend_from_slice(&pbap);
        pbap[0] = 0x00;
        eir.extend_from_slice(&[0x11, EIR_COMPLETE_128BITS_UUID_TYPE]);
        eir.extend_from_slice(&pbap);
        eir.extend_from_slice(&[0x04, EIR_COMPLETE_LOCAL_NAME_TYPE, b'c', b'a', b'r', 0x00, 0x00]);
        eir
    }

    #[test]
    fn test_check_eir_data() {
        let eir = sample_eir();
        assert_eq!(check_eir_data(&eir, EIR_COMPLETE_LOCAL_NAME_TYPE), Some(&b"car"[..]));
        assert_eq!(check_eir_data(&eir, EIR_TX_POWER_LEVEL_TYPE), None);
        // Truncated structure is not returned
        assert_eq!(check_eir_data(&[0x05, 0x09, b'a'], EIR_COMPLETE_LOCAL_NAME_TYPE), None);
    }

    #[test]
    fn test_parse_eir_services() {
        let (services, complete) = parse_eir_services(&sample_eir());
        assert!(complete);
        assert!(services.has(0x110B));
        assert!(services.has(0x111E));
        assert!(services.has(0x1105));
        assert!(!services.has(0x1101));
    }

    #[test]
    fn test_uuid128_prefers_complete_list() {
        let (list_type, uuids) = get_eir_uuid_list(&sample_eir(), UuidSize::Bits128, 4).unwrap();
        assert_eq!(list_type, EIR_COMPLETE_128BITS_UUID_TYPE);
        assert_eq!(uuids.len(), 1);
        // Not on the base UUID, so it has no 16-bit form
        assert_eq!(uuids[0].as_u16(), None);
    }

    #[test]
    fn test_uuid_list_respects_max() {
        let (list_type, uuids) = get_eir_uuid_list(&sample_eir(), UuidSize::Bits16, 1).unwrap();
        assert_eq!(list_type, EIR_COMPLETE_16BITS_UUID_TYPE);
        assert_eq!(uuids, vec![Uuid::from_u16(0x110B)]);
        assert!(get_eir_uuid_list(&[], UuidSize::Bits32, 4).is_none());
    }

    #[test]
    fn test_uuid_to_uuid16() {
        assert_eq!(uuid_to_uuid16(&[0x08, 0x11]), 0x1108);
        assert_eq!(uuid_to_uuid16(&[0x08, 0x11, 0x00, 0x00]), 0x1108);
        assert_eq!(uuid_to_uuid16(&[0x08, 0x11, 0x01, 0x00]), 0);
    }

    #[test]
    fn test_service_bitmap() {
        let mut services = EirServices::empty();
        services.add(0x1108);
        services.add(0x1402);
        services.add(0xBEEF);
        assert!(services.has(0x1402));

        let (list, list_type) = services.supported_services(1);
        assert_eq!(list, vec![0x1108]);
        assert_eq!(list_type, EIR_MORE_16BITS_UUID_TYPE);
        let (list, list_type) = services.supported_services(8);
        assert_eq!(list, vec![0x1108, 0x1402]);
        assert_eq!(list_type, EIR_COMPLETE_16BITS_UUID_TYPE);

        services.remove(0x1108);
        assert!(!services.has(0x1108));
    }

    #[test]
    fn test_has_inquiry_eir_service() {
        let mut results = InqResults::default();
        results.eir_uuids.add(0x110A);
        assert_eq!(has_inquiry_eir_service(&results, 0x110A), EirSearchResult::Found);
        assert_eq!(has_inquiry_eir_service(&results, 0x110B), EirSearchResult::Unknown);
        results.eir_complete_list = true;
        assert_eq!(has_inquiry_eir_service(&results, 0x110B), EirSearchResult::NotFound);
    }
}
