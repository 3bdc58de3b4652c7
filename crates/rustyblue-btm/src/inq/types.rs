use bitflags::bitflags;

use crate::error::BtmStatus;
use crate::hci::constants::{
    EVT_EXTENDED_INQUIRY_RESULT, EVT_INQUIRY_RESULT, EVT_INQUIRY_RESULT_WITH_RSSI,
    HCI_FILTER_COND_BD_ADDR, HCI_FILTER_COND_DEVICE_CLASS, HCI_FILTER_COND_NEW_DEVICE,
};
use crate::inq::eir::EirServices;
use crate::types::{AddressType, BdAddr, BdName, DevClass, DeviceType};

/// General inquiry access code
pub const GENERAL_INQ_LAP: u32 = 0x9E8B33;
/// Limited inquiry access code
pub const LIMITED_INQ_LAP: u32 = 0x9E8B00;

/// Set on a clock offset learned from an inquiry response
pub const CLOCK_OFFSET_VALID: u16 = 0x8000;

/// Inquiry length bounds in 1.28 s units
pub const MIN_INQUIRY_LEN: u8 = 0x01;
pub const MAX_INQUIRY_LEN: u8 = 0x30;

/// Periodic inquiry delay bounds in 1.28 s units
pub const PER_INQ_MIN_MIN_PERIOD: u16 = 0x0002;
pub const PER_INQ_MAX_MIN_PERIOD: u16 = 0xFFFE;
pub const PER_INQ_MIN_MAX_PERIOD: u16 = 0x0003;

/// LE scan timing used while an LE inquiry runs (0.625 ms units)
pub const LOW_LATENCY_SCAN_INT: u16 = 8000;
pub const LOW_LATENCY_SCAN_WIN: u16 = 8000;

/// LE scan timing used by observe (0.625 ms units)
pub const OBSERVE_SCAN_INT: u16 = 0x0800;
pub const OBSERVE_SCAN_WIN: u16 = 0x0024;

bitflags! {
    /// Requested inquiry modes; also the set of modes still running
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InqMode: u8 {
        const GENERAL = 0x01;
        const LIMITED = 0x02;
        const PERIODIC = 0x08;
        const LE_GENERAL = 0x10;
        const LE_LIMITED = 0x20;

        const BR_MASK = Self::GENERAL.bits() | Self::LIMITED.bits();
        const LE_MASK = Self::LE_GENERAL.bits() | Self::LE_LIMITED.bits();
        const BR_ACTIVE_MASK = Self::BR_MASK.bits() | Self::PERIODIC.bits();
    }
}

/// Condition applied to classic inquiry results by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InqFilter {
    #[default]
    Clear,
    DeviceClass { dev_class: DevClass, mask: DevClass },
    BdAddr(BdAddr),
}

impl InqFilter {
    pub fn condition_type(&self) -> u8 {
        match self {
            InqFilter::Clear => HCI_FILTER_COND_NEW_DEVICE,
            InqFilter::DeviceClass { .. } => HCI_FILTER_COND_DEVICE_CLASS,
            InqFilter::BdAddr(_) => HCI_FILTER_COND_BD_ADDR,
        }
    }

    pub fn condition(&self) -> Vec<u8> {
        match self {
            InqFilter::Clear => Vec::new(),
            InqFilter::DeviceClass { dev_class, mask } => {
                let mut cond = dev_class.to_vec();
                cond.extend_from_slice(mask);
                cond
            }
            InqFilter::BdAddr(addr) => addr.as_slice().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InqParams {
    pub mode: InqMode,
    /// Inquiry length in 1.28 s units
    pub duration: u8,
    /// Stop after this many distinct devices; 0 means unlimited
    pub max_resps: u8,
    pub filter: InqFilter,
}

impl Default for InqParams {
    fn default() -> Self {
        Self { mode: InqMode::GENERAL, duration: 10, max_resps: 0, filter: InqFilter::Clear }
    }
}

/// Where the classic inquiry is in its filter/start sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InqState {
    #[default]
    Inactive,
    /// Clearing the previous filter before a new one is set
    ClearFilter,
    /// Writing the filter; the inquiry starts once it completes
    SetFilter,
    Active,
}

/// Which procedure owns the shared results database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanType {
    #[default]
    None,
    General,
    LeObserve,
}

/// Layout of an inquiry result event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InqResultMode {
    Standard,
    WithRssi,
    Extended,
}

impl InqResultMode {
    pub fn from_event_code(code: u8) -> Option<Self> {
        match code {
            EVT_INQUIRY_RESULT => Some(InqResultMode::Standard),
            EVT_INQUIRY_RESULT_WITH_RSSI => Some(InqResultMode::WithRssi),
            EVT_EXTENDED_INQUIRY_RESULT => Some(InqResultMode::Extended),
            _ => None,
        }
    }
}

/// What is known about one discovered device
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InqResults {
    pub remote_addr: BdAddr,
    pub page_scan_rep_mode: u8,
    pub page_scan_per_mode: u8,
    pub page_scan_mode: u8,
    pub dev_class: DevClass,
    /// Includes [`CLOCK_OFFSET_VALID`] once learned from a response
    pub clock_offset: u16,
    /// `None` for standard results, which carry no RSSI
    pub rssi: Option<i8>,
    pub eir_uuids: EirServices,
    /// The EIR carried a complete 16-bit service list
    pub eir_complete_list: bool,
    pub device_type: DeviceType,
    pub ble_addr_type: Option<AddressType>,
    pub ble_evt_type: Option<u8>,
    /// AD flags byte from the last advertisement
    pub ble_flags: u8,
}

/// One slot of the inquiry database
#[derive(Debug, Clone, Default)]
pub struct InqDbEntry {
    pub results: InqResults,
    /// Monotonic tick of the last fresh response; oldest is recycled first
    pub time_of_resp: u64,
    /// Session counter the entry was last filled in
    pub inq_count: u32,
    pub eir_received: bool,
    /// LE: the scan response for this device has been seen
    pub scan_rsp: bool,
    /// Set by the application once it has resolved the name itself
    pub appl_knows_rem_name: bool,
}

/// Delivered once an inquiry session ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InqCompletion {
    pub status: BtmStatus,
    pub num_resp: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteName {
    pub status: BtmStatus,
    pub hci_status: u8,
    pub bd_addr: BdAddr,
    pub name: BdName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxPowerResult {
    pub status: BtmStatus,
    pub hci_status: u8,
    pub tx_power: i8,
}

/// Outcome of looking a service up in a result's EIR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EirSearchResult {
    Found,
    NotFound,
    /// The service list was incomplete and did not mention the service
    Unknown,
}

/// One LE advertising report as delivered by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeAdvReport {
    pub evt_type: u8,
    pub addr_type: AddressType,
    pub bd_addr: BdAddr,
    pub data: Vec<u8>,
    pub rssi: i8,
}

/// LE advertising event types
pub const BLE_EVT_CONN_ADV: u8 = 0x00;
pub const BLE_EVT_CONN_DIR_ADV: u8 = 0x01;
pub const BLE_EVT_DISC_ADV: u8 = 0x02;
pub const BLE_EVT_NON_CONN_ADV: u8 = 0x03;
pub const BLE_EVT_SCAN_RSP: u8 = 0x04;

/// AD flags bits
pub const BLE_LIMIT_DISC_FLAG: u8 = 0x01;
pub const BLE_GEN_DISC_FLAG: u8 = 0x02;
pub const BLE_BREDR_NOT_SPT: u8 = 0x04;

/// Called for every reported device with the raw EIR/advertising data, if any
pub type InqResultsCallback = Box<dyn FnMut(&InqResults, Option<&[u8]>)>;
