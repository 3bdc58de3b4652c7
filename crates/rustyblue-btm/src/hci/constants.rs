//! HCI protocol constants
//!
//! This module contains the opcodes, status codes and LMP feature bit positions
//! used by the BTM layer.

// HCI packet types
pub const HCI_COMMAND_PKT: u8 = 0x01;

// Maximum size of HCI command parameters
pub const HCI_MAX_PARAM_LEN: usize = 255;

// Common OGF (Opcode Group Field) values
pub const OGF_LINK_CTL: u8 = 0x01;
pub const OGF_LINK_POLICY: u8 = 0x02;
pub const OGF_HOST_CTL: u8 = 0x03;
pub const OGF_STATUS_PARAM: u8 = 0x05;
pub const OGF_LE: u8 = 0x08;
pub const OGF_VENDOR: u8 = 0x3F;

// Link Control Commands (OGF: 0x01)
pub const OCF_INQUIRY: u16 = 0x0001;
pub const OCF_INQUIRY_CANCEL: u16 = 0x0002;
pub const OCF_PERIODIC_INQUIRY_MODE: u16 = 0x0003;
pub const OCF_EXIT_PERIODIC_INQUIRY_MODE: u16 = 0x0004;
pub const OCF_DISCONNECT: u16 = 0x0006;
pub const OCF_CHANGE_CONN_PACKET_TYPE: u16 = 0x000F;
pub const OCF_SET_CONN_ENCRYPTION: u16 = 0x0013;
pub const OCF_REMOTE_NAME_REQUEST: u16 = 0x0019;
pub const OCF_REMOTE_NAME_REQUEST_CANCEL: u16 = 0x001A;
pub const OCF_READ_REMOTE_FEATURES: u16 = 0x001B;
pub const OCF_READ_REMOTE_EXT_FEATURES: u16 = 0x001C;
pub const OCF_READ_REMOTE_VERSION: u16 = 0x001D;
pub const OCF_READ_CLOCK_OFFSET: u16 = 0x001F;

// Link Policy Commands (OGF: 0x02)
pub const OCF_EXIT_SNIFF_MODE: u16 = 0x0004;
pub const OCF_EXIT_PARK_MODE: u16 = 0x0006;
pub const OCF_SWITCH_ROLE: u16 = 0x000B;
pub const OCF_WRITE_LINK_POLICY: u16 = 0x000D;

// Host Controller Commands (OGF: 0x03)
pub const OCF_SET_EVENT_FILTER: u16 = 0x0005;
pub const OCF_DELETE_STORED_LINK_KEY: u16 = 0x0012;
pub const OCF_WRITE_LINK_SUPERVISION_TIMEOUT: u16 = 0x0037;
pub const OCF_READ_INQ_RSP_TX_POWER: u16 = 0x0058;

// Status Parameters (OGF: 0x05)
pub const OCF_READ_LINK_QUALITY: u16 = 0x0003;
pub const OCF_READ_RSSI: u16 = 0x0005;

// LE Command OCF values (OGF: 0x08)
pub const OCF_LE_SET_ADVERTISING_ENABLE: u16 = 0x000A;
pub const OCF_LE_SET_SCAN_PARAMETERS: u16 = 0x000B;
pub const OCF_LE_SET_SCAN_ENABLE: u16 = 0x000C;
pub const OCF_LE_CREATE_CONNECTION: u16 = 0x000D;
pub const OCF_LE_CREATE_CONNECTION_CANCEL: u16 = 0x000E;
pub const OCF_LE_CLEAR_WHITE_LIST: u16 = 0x0010;
pub const OCF_LE_ADD_DEVICE_TO_WHITE_LIST: u16 = 0x0011;
pub const OCF_LE_REMOVE_DEVICE_FROM_WHITE_LIST: u16 = 0x0012;
pub const OCF_LE_READ_REMOTE_FEATURES: u16 = 0x0016;
pub const OCF_LE_ADD_DEVICE_TO_RESOLVING_LIST: u16 = 0x0027;
pub const OCF_LE_REMOVE_DEVICE_FROM_RESOLVING_LIST: u16 = 0x0028;
pub const OCF_LE_CLEAR_RESOLVING_LIST: u16 = 0x0029;
pub const OCF_LE_READ_PEER_RESOLVABLE_ADDRESS: u16 = 0x002B;
pub const OCF_LE_SET_ADDRESS_RESOLUTION_ENABLE: u16 = 0x002D;

// Vendor specific commands (OGF: 0x3F)
pub const OCF_VSC_MULTI_ADV: u16 = 0x0154;
pub const OCF_VSC_RPA_OFFLOAD: u16 = 0x0155;
pub const OCF_VSC_BATCH_SCAN: u16 = 0x0156;
pub const OCF_VSC_ADV_FILTER: u16 = 0x0157;

// HCI Events
pub const EVT_INQUIRY_RESULT: u8 = 0x02;
pub const EVT_INQUIRY_RESULT_WITH_RSSI: u8 = 0x22;
pub const EVT_EXTENDED_INQUIRY_RESULT: u8 = 0x2F;

// HCI status codes
pub const HCI_SUCCESS: u8 = 0x00;
pub const HCI_ERR_NO_CONNECTION: u8 = 0x02;
pub const HCI_ERR_HOST_TIMEOUT: u8 = 0x10;
pub const HCI_ERR_UNSUPPORTED_VALUE: u8 = 0x11;
pub const HCI_ERR_PEER_USER: u8 = 0x13;
pub const HCI_ERR_CONN_CAUSE_LOCAL_HOST: u8 = 0x16;
pub const HCI_ERR_UNSPECIFIED: u8 = 0x1F;

// Link roles
pub const HCI_ROLE_MASTER: u8 = 0x00;
pub const HCI_ROLE_SLAVE: u8 = 0x01;

// Event filter types and conditions
pub const HCI_FILTER_CLEAR_ALL: u8 = 0x00;
pub const HCI_FILTER_INQUIRY_RESULT: u8 = 0x01;
pub const HCI_FILTER_COND_NEW_DEVICE: u8 = 0x00;
pub const HCI_FILTER_COND_DEVICE_CLASS: u8 = 0x01;
pub const HCI_FILTER_COND_BD_ADDR: u8 = 0x02;

// Page scan defaults
pub const HCI_PAGE_SCAN_REP_MODE_R1: u8 = 0x01;
pub const HCI_MANDATARY_PAGE_SCAN_MODE: u8 = 0x00;

// LMP feature page 0 bit positions (byte, mask)
pub const LMP_3_SLOT_PACKETS: (usize, u8) = (0, 0x01);
pub const LMP_5_SLOT_PACKETS: (usize, u8) = (0, 0x02);
pub const LMP_ENCRYPTION: (usize, u8) = (0, 0x04);
pub const LMP_SWITCH: (usize, u8) = (0, 0x20);
pub const LMP_SNIFF_MODE: (usize, u8) = (0, 0x80);
pub const LMP_EDR_ACL_2MPS: (usize, u8) = (3, 0x02);
pub const LMP_EDR_ACL_3MPS: (usize, u8) = (3, 0x04);
pub const LMP_INQ_RSSI: (usize, u8) = (3, 0x40);
pub const LMP_3_SLOT_EDR_ACL: (usize, u8) = (4, 0x80);
pub const LMP_5_SLOT_EDR_ACL: (usize, u8) = (5, 0x01);
pub const LMP_PAUSE_ENCRYPTION: (usize, u8) = (5, 0x04);
pub const LMP_EXTENDED_INQ_RSP: (usize, u8) = (6, 0x01);
pub const LMP_SIMPLE_PAIRING: (usize, u8) = (6, 0x08);
pub const LMP_EXTENDED_FEATURES: (usize, u8) = (7, 0x80);

// LMP feature page 1 (host features)
pub const LMP_HOST_SSP: (usize, u8) = (0, 0x01);
pub const LMP_HOST_SECURE_CONNECTIONS: (usize, u8) = (0, 0x08);

// LE feature bits
pub const LE_SLAVE_INIT_FEAT_EXCHANGE: (usize, u8) = (0, 0x08);

/// Check an LMP feature bit in an 8-byte feature page
pub fn feature_supported(page: &[u8; 8], bit: (usize, u8)) -> bool {
    page[bit.0] & bit.1 != 0
}
