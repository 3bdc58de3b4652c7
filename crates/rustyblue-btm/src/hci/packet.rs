//! HCI command structures and serialization
//!
//! Every command the BTM layer issues is a variant of [`HciCommand`]. The
//! transport gets the typed value and can call [`HciCommand::to_packet`] when
//! it needs wire bytes.

use crate::hci::constants::*;
use crate::types::{BdAddr, Irk};

/// Commands issued by the BTM layer
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HciCommand {
    // Link Control Commands (OGF: 0x01)
    Inquiry { lap: u32, duration: u8, max_resps: u8 },
    InquiryCancel,
    PeriodicInquiryMode {
        max_delay: u16,
        min_delay: u16,
        lap: u32,
        duration: u8,
        max_resps: u8,
    },
    ExitPeriodicInquiryMode,
    Disconnect { handle: u16, reason: u8 },
    ChangeConnPacketType { handle: u16, packet_types: u16 },
    SetConnEncryption { handle: u16, enable: bool },
    RemoteNameRequest {
        bd_addr: BdAddr,
        page_scan_rep_mode: u8,
        page_scan_mode: u8,
        clock_offset: u16,
    },
    RemoteNameRequestCancel { bd_addr: BdAddr },
    ReadRemoteFeatures { handle: u16 },
    ReadRemoteExtFeatures { handle: u16, page: u8 },
    ReadRemoteVersion { handle: u16 },
    ReadClockOffset { handle: u16 },

    // Link Policy Commands (OGF: 0x02)
    ExitSniffMode { handle: u16 },
    ExitParkMode { handle: u16 },
    SwitchRole { bd_addr: BdAddr, role: u8 },
    WriteLinkPolicy { handle: u16, policy: u16 },

    // Host Controller Commands (OGF: 0x03)
    SetEventFilter { filter_type: u8, condition_type: u8, condition: Vec<u8> },
    DeleteStoredLinkKey { bd_addr: BdAddr, delete_all: bool },
    WriteLinkSupervisionTimeout { handle: u16, timeout: u16 },
    ReadInqRspTxPower,

    // Status Parameters (OGF: 0x05)
    ReadLinkQuality { handle: u16 },
    ReadRssi { handle: u16 },

    // LE Commands (OGF: 0x08)
    LeSetAdvertisingEnable { enable: bool },
    LeSetScanParameters {
        scan_type: u8,
        scan_interval: u16,
        scan_window: u16,
        own_address_type: u8,
        filter_policy: u8,
    },
    LeSetScanEnable { enable: bool, filter_duplicates: bool },
    LeCreateConnection {
        scan_interval: u16,
        scan_window: u16,
        initiator_filter_policy: u8,
        peer_addr_type: u8,
        peer_addr: BdAddr,
        own_addr_type: u8,
        conn_interval_min: u16,
        conn_interval_max: u16,
        conn_latency: u16,
        supervision_timeout: u16,
    },
    LeCreateConnectionCancel,
    LeClearWhiteList,
    LeAddDeviceToWhiteList { addr_type: u8, bd_addr: BdAddr },
    LeRemoveDeviceFromWhiteList { addr_type: u8, bd_addr: BdAddr },
    LeReadRemoteFeatures { handle: u16 },
    LeAddDeviceToResolvingList {
        peer_addr_type: u8,
        peer_addr: BdAddr,
        peer_irk: Irk,
        local_irk: Irk,
    },
    LeRemoveDeviceFromResolvingList { peer_addr_type: u8, peer_addr: BdAddr },
    LeClearResolvingList,
    LeReadPeerResolvableAddress { peer_addr_type: u8, peer_addr: BdAddr },
    LeSetAddressResolutionEnable { enable: bool },

    // Vendor Specific Commands (OGF: 0x3F)
    Vendor { ocf: u16, params: Vec<u8> },
}

fn push_lap(params: &mut Vec<u8>, lap: u32) {
    params.extend_from_slice(&lap.to_le_bytes()[..3]);
}

impl HciCommand {
    /// Get the OGF and OCF for this command
    pub fn opcode_parts(&self) -> (u8, u16) {
        match self {
            // Link Control Commands
            Self::Inquiry { .. } => (OGF_LINK_CTL, OCF_INQUIRY),
            Self::InquiryCancel => (OGF_LINK_CTL, OCF_INQUIRY_CANCEL),
            Self::PeriodicInquiryMode { .. } => (OGF_LINK_CTL, OCF_PERIODIC_INQUIRY_MODE),
            Self::ExitPeriodicInquiryMode => (OGF_LINK_CTL, OCF_EXIT_PERIODIC_INQUIRY_MODE),
            Self::Disconnect { .. } => (OGF_LINK_CTL, OCF_DISCONNECT),
            Self::ChangeConnPacketType { .. } => (OGF_LINK_CTL, OCF_CHANGE_CONN_PACKET_TYPE),
            Self::SetConnEncryption { .. } => (OGF_LINK_CTL, OCF_SET_CONN_ENCRYPTION),
            Self::RemoteNameRequest { .. } => (OGF_LINK_CTL, OCF_REMOTE_NAME_REQUEST),
            Self::RemoteNameRequestCancel { .. } => (OGF_LINK_CTL, OCF_REMOTE_NAME_REQUEST_CANCEL),
            Self::ReadRemoteFeatures { .. } => (OGF_LINK_CTL, OCF_READ_REMOTE_FEATURES),
            Self::ReadRemoteExtFeatures { .. } => (OGF_LINK_CTL, OCF_READ_REMOTE_EXT_FEATURES),
            Self::ReadRemoteVersion { .. } => (OGF_LINK_CTL, OCF_READ_REMOTE_VERSION),
            Self::ReadClockOffset { .. } => (OGF_LINK_CTL, OCF_READ_CLOCK_OFFSET),

            // Link Policy Commands
            Self::ExitSniffMode { .. } => (OGF_LINK_POLICY, OCF_EXIT_SNIFF_MODE),
            Self::ExitParkMode { .. } => (OGF_LINK_POLICY, OCF_EXIT_PARK_MODE),
            Self::SwitchRole { .. } => (OGF_LINK_POLICY, OCF_SWITCH_ROLE),
            Self::WriteLinkPolicy { .. } => (OGF_LINK_POLICY, OCF_WRITE_LINK_POLICY),

            // Host Controller Commands
            Self::SetEventFilter { .. } => (OGF_HOST_CTL, OCF_SET_EVENT_FILTER),
            Self::DeleteStoredLinkKey { .. } => (OGF_HOST_CTL, OCF_DELETE_STORED_LINK_KEY),
            Self::WriteLinkSupervisionTimeout { .. } => {
                (OGF_HOST_CTL, OCF_WRITE_LINK_SUPERVISION_TIMEOUT)
            }
            Self::ReadInqRspTxPower => (OGF_HOST_CTL, OCF_READ_INQ_RSP_TX_POWER),

            // Status Parameters
            Self::ReadLinkQuality { .. } => (OGF_STATUS_PARAM, OCF_READ_LINK_QUALITY),
            Self::ReadRssi { .. } => (OGF_STATUS_PARAM, OCF_READ_RSSI),

            // LE Commands
            Self::LeSetAdvertisingEnable { .. } => (OGF_LE, OCF_LE_SET_ADVERTISING_ENABLE),
            Self::LeSetScanParameters { .. } => (OGF_LE, OCF_LE_SET_SCAN_PARAMETERS),
            Self::LeSetScanEnable { .. } => (OGF_LE, OCF_LE_SET_SCAN_ENABLE),
            Self::LeCreateConnection { .. } => (OGF_LE, OCF_LE_CREATE_CONNECTION),
            Self::LeCreateConnectionCancel => (OGF_LE, OCF_LE_CREATE_CONNECTION_CANCEL),
            Self::LeClearWhiteList => (OGF_LE, OCF_LE_CLEAR_WHITE_LIST),
            Self::LeAddDeviceToWhiteList { .. } => (OGF_LE, OCF_LE_ADD_DEVICE_TO_WHITE_LIST),
            Self::LeRemoveDeviceFromWhiteList { .. } => {
                (OGF_LE, OCF_LE_REMOVE_DEVICE_FROM_WHITE_LIST)
            }
            Self::LeReadRemoteFeatures { .. } => (OGF_LE, OCF_LE_READ_REMOTE_FEATURES),
            Self::LeAddDeviceToResolvingList { .. } => {
                (OGF_LE, OCF_LE_ADD_DEVICE_TO_RESOLVING_LIST)
            }
            Self::LeRemoveDeviceFromResolvingList { .. } => {
                (OGF_LE, OCF_LE_REMOVE_DEVICE_FROM_RESOLVING_LIST)
            }
            Self::LeClearResolvingList => (OGF_LE, OCF_LE_CLEAR_RESOLVING_LIST),
            Self::LeReadPeerResolvableAddress { .. } => {
                (OGF_LE, OCF_LE_READ_PEER_RESOLVABLE_ADDRESS)
            }
            Self::LeSetAddressResolutionEnable { .. } => {
                (OGF_LE, OCF_LE_SET_ADDRESS_RESOLUTION_ENABLE)
            }

            Self::Vendor { ocf, .. } => (OGF_VENDOR, *ocf),
        }
    }

    /// Full 16-bit opcode
    pub fn opcode(&self) -> u16 {
        let (ogf, ocf) = self.opcode_parts();
        ((ogf as u16) << 10) | (ocf & 0x3ff)
    }

    /// Convert the command to its raw parameter bytes
    fn parameters(&self) -> Vec<u8> {
        match self {
            Self::InquiryCancel
            | Self::ExitPeriodicInquiryMode
            | Self::ReadInqRspTxPower
            | Self::LeCreateConnectionCancel
            | Self::LeClearWhiteList
            | Self::LeClearResolvingList => vec![],

            Self::Inquiry { lap, duration, max_resps } => {
                let mut params = Vec::with_capacity(5);
                push_lap(&mut params, *lap);
                params.push(*duration);
                params.push(*max_resps);
                params
            }

            Self::PeriodicInquiryMode { max_delay, min_delay, lap, duration, max_resps } => {
                let mut params = Vec::with_capacity(9);
                params.extend_from_slice(&max_delay.to_le_bytes());
                params.extend_from_slice(&min_delay.to_le_bytes());
                push_lap(&mut params, *lap);
                params.push(*duration);
                params.push(*max_resps);
                params
            }

            Self::Disconnect { handle, reason } => {
                let mut params = Vec::with_capacity(3);
                params.extend_from_slice(&handle.to_le_bytes());
                params.push(*reason);
                params
            }

            Self::ChangeConnPacketType { handle, packet_types } => {
                let mut params = Vec::with_capacity(4);
                params.extend_from_slice(&handle.to_le_bytes());
                params.extend_from_slice(&packet_types.to_le_bytes());
                params
            }

            Self::SetConnEncryption { handle, enable } => {
                let mut params = Vec::with_capacity(3);
                params.extend_from_slice(&handle.to_le_bytes());
                params.push(*enable as u8);
                params
            }

            Self::RemoteNameRequest { bd_addr, page_scan_rep_mode, page_scan_mode, clock_offset } => {
                let mut params = Vec::with_capacity(10);
                params.extend_from_slice(bd_addr.as_slice());
                params.push(*page_scan_rep_mode);
                params.push(*page_scan_mode);
                params.extend_from_slice(&clock_offset.to_le_bytes());
                params
            }

            Self::RemoteNameRequestCancel { bd_addr } => bd_addr.as_slice().to_vec(),

            Self::ReadRemoteFeatures { handle }
            | Self::ReadRemoteVersion { handle }
            | Self::ReadClockOffset { handle }
            | Self::ExitSniffMode { handle }
            | Self::ExitParkMode { handle }
            | Self::ReadLinkQuality { handle }
            | Self::ReadRssi { handle }
            | Self::LeReadRemoteFeatures { handle } => handle.to_le_bytes().to_vec(),

            Self::ReadRemoteExtFeatures { handle, page } => {
                let mut params = handle.to_le_bytes().to_vec();
                params.push(*page);
                params
            }

            Self::SwitchRole { bd_addr, role } => {
                let mut params = bd_addr.as_slice().to_vec();
                params.push(*role);
                params
            }

            Self::WriteLinkPolicy { handle, policy } => {
                let mut params = handle.to_le_bytes().to_vec();
                params.extend_from_slice(&policy.to_le_bytes());
                params
            }

            Self::SetEventFilter { filter_type, condition_type, condition } => {
                let mut params = vec![*filter_type];
                if *filter_type != HCI_FILTER_CLEAR_ALL {
                    params.push(*condition_type);
                    params.extend_from_slice(condition);
                }
                params
            }

            Self::DeleteStoredLinkKey { bd_addr, delete_all } => {
                let mut params = bd_addr.as_slice().to_vec();
                params.push(*delete_all as u8);
                params
            }

            Self::WriteLinkSupervisionTimeout { handle, timeout } => {
                let mut params = handle.to_le_bytes().to_vec();
                params.extend_from_slice(&timeout.to_le_bytes());
                params
            }

            Self::LeSetAdvertisingEnable { enable } => vec![*enable as u8],

            Self::LeSetScanParameters {
                scan_type,
                scan_interval,
                scan_window,
                own_address_type,
                filter_policy,
            } => {
                let mut params = Vec::with_capacity(7);
                params.push(*scan_type);
                params.extend_from_slice(&scan_interval.to_le_bytes());
                params.extend_from_slice(&scan_window.to_le_bytes());
                params.push(*own_address_type);
                params.push(*filter_policy);
                params
            }

            Self::LeSetScanEnable { enable, filter_duplicates } => {
                vec![*enable as u8, *filter_duplicates as u8]
            }

            Self::LeCreateConnection {
                scan_interval,
                scan_window,
                initiator_filter_policy,
                peer_addr_type,
                peer_addr,
                own_addr_type,
                conn_interval_min,
                conn_interval_max,
                conn_latency,
                supervision_timeout,
            } => {
                let mut params = Vec::with_capacity(25);
                params.extend_from_slice(&scan_interval.to_le_bytes());
                params.extend_from_slice(&scan_window.to_le_bytes());
                params.push(*initiator_filter_policy);
                params.push(*peer_addr_type);
                params.extend_from_slice(peer_addr.as_slice());
                params.push(*own_addr_type);
                params.extend_from_slice(&conn_interval_min.to_le_bytes());
                params.extend_from_slice(&conn_interval_max.to_le_bytes());
                params.extend_from_slice(&conn_latency.to_le_bytes());
                params.extend_from_slice(&supervision_timeout.to_le_bytes());
                // Min/max CE length
                params.extend_from_slice(&[0, 0, 0, 0]);
                params
            }

            Self::LeAddDeviceToWhiteList { addr_type, bd_addr }
            | Self::LeRemoveDeviceFromWhiteList { addr_type, bd_addr }
            | Self::LeRemoveDeviceFromResolvingList { peer_addr_type: addr_type, peer_addr: bd_addr }
            | Self::LeReadPeerResolvableAddress { peer_addr_type: addr_type, peer_addr: bd_addr } => {
                let mut params = vec![*addr_type];
                params.extend_from_slice(bd_addr.as_slice());
                params
            }

            Self::LeAddDeviceToResolvingList { peer_addr_type, peer_addr, peer_irk, local_irk } => {
                let mut params = Vec::with_capacity(39);
                params.push(*peer_addr_type);
                params.extend_from_slice(peer_addr.as_slice());
                params.extend_from_slice(peer_irk);
                params.extend_from_slice(local_irk);
                params
            }

            Self::LeSetAddressResolutionEnable { enable } => vec![*enable as u8],

            Self::Vendor { params, .. } => params.clone(),
        }
    }

    /// Convert the command to a raw HCI packet
    pub fn to_packet(&self) -> Vec<u8> {
        let params = self.parameters();

        let mut packet = vec![HCI_COMMAND_PKT];
        packet.extend_from_slice(&self.opcode().to_le_bytes());
        packet.push(params.len().min(HCI_MAX_PARAM_LEN) as u8);
        packet.extend_from_slice(&params[..params.len().min(HCI_MAX_PARAM_LEN)]);
        packet
    }
}
