//! Unit tests for HCI command serialization

use super::constants::*;
use super::packet::*;
use crate::types::BdAddr;

#[test]
fn test_hci_command_serialization() {
    // Inquiry with the general LAP
    let command = HciCommand::Inquiry { lap: 0x9E8B33, duration: 0x08, max_resps: 0 };
    let packet = command.to_packet();

    assert_eq!(packet[0], HCI_COMMAND_PKT);

    // Opcode: Inquiry (0x0401)
    let opcode = u16::from_le_bytes([packet[1], packet[2]]);
    assert_eq!(opcode, 0x0401);

    // Param length: 5
    assert_eq!(packet[3], 5);
    assert_eq!(&packet[4..7], &[0x33, 0x8B, 0x9E]);
    assert_eq!(packet[7], 0x08);
    assert_eq!(packet[8], 0);

    // Switch role
    let addr = BdAddr::new([1, 2, 3, 4, 5, 6]);
    let command = HciCommand::SwitchRole { bd_addr: addr, role: HCI_ROLE_SLAVE };
    let packet = command.to_packet();

    let opcode = u16::from_le_bytes([packet[1], packet[2]]);
    assert_eq!(opcode, 0x080B); // OGF_LINK_POLICY << 10 | OCF_SWITCH_ROLE
    assert_eq!(packet[3], 7);
    assert_eq!(&packet[4..10], &[1, 2, 3, 4, 5, 6]);
    assert_eq!(packet[10], HCI_ROLE_SLAVE);

    // Disconnect
    let command = HciCommand::Disconnect { handle: 0x0040, reason: 0x13 };
    let packet = command.to_packet();

    let opcode = u16::from_le_bytes([packet[1], packet[2]]);
    assert_eq!(opcode, 0x0406);
    assert_eq!(packet[3], 3);
    assert_eq!(u16::from_le_bytes([packet[4], packet[5]]), 0x0040);
    assert_eq!(packet[6], 0x13);
}

#[test]
fn test_vendor_command_opcode() {
    let command = HciCommand::Vendor { ocf: OCF_VSC_BATCH_SCAN, params: vec![0x04, 0x01] };

    // OGF 0x3F occupies the top six bits
    assert_eq!(command.opcode(), 0xFD56);
    assert_eq!(command.to_packet(), vec![HCI_COMMAND_PKT, 0x56, 0xFD, 2, 0x04, 0x01]);
}

#[test]
fn test_event_filter_clear_has_no_condition() {
    let command = HciCommand::SetEventFilter {
        filter_type: HCI_FILTER_CLEAR_ALL,
        condition_type: HCI_FILTER_COND_BD_ADDR,
        condition: vec![1, 2, 3, 4, 5, 6],
    };
    assert_eq!(command.to_packet()[3], 1);

    let command = HciCommand::SetEventFilter {
        filter_type: HCI_FILTER_INQUIRY_RESULT,
        condition_type: HCI_FILTER_COND_BD_ADDR,
        condition: vec![1, 2, 3, 4, 5, 6],
    };
    assert_eq!(command.to_packet()[3], 8);
}

#[test]
fn test_feature_bits() {
    let mut page = [0u8; 8];
    assert!(!feature_supported(&page, LMP_SWITCH));
    page[0] = 0x20;
    assert!(feature_supported(&page, LMP_SWITCH));
    page[7] = 0x80;
    assert!(feature_supported(&page, LMP_EXTENDED_FEATURES));
}
