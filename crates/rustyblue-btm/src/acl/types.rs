//! ACL link types

use bitflags::bitflags;

use crate::dev::MAX_FEATURE_PAGES;
use crate::error::BtmStatus;
use crate::types::{BdAddr, BdName, DevClass, LinkRole, PowerMode, Transport};

/// Default LMP version assumed until the remote version is read (4.0)
pub const DEFAULT_LMP_VERSION: u8 = 0x06;

/// Busy level reported while paging or inquiring
pub const BUSY_LEVEL_PAGING_OR_INQUIRY: u8 = 10;

bitflags! {
    /// ACL packet type mask as used by HCI_Change_Connection_Packet_Type
    ///
    /// The `NO_*` bits are inverted: setting one forbids that EDR packet.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PacketTypes: u16 {
        const NO_2_DH1 = 0x0002;
        const NO_3_DH1 = 0x0004;
        const DM1 = 0x0008;
        const DH1 = 0x0010;
        const NO_2_DH3 = 0x0100;
        const NO_3_DH3 = 0x0200;
        const DM3 = 0x0400;
        const DH3 = 0x0800;
        const NO_2_DH5 = 0x1000;
        const NO_3_DH5 = 0x2000;
        const DM5 = 0x4000;
        const DH5 = 0x8000;
    }
}

impl PacketTypes {
    /// Basic rate packets
    pub const SUPPORTED: PacketTypes = PacketTypes::DM1
        .union(PacketTypes::DH1)
        .union(PacketTypes::DM3)
        .union(PacketTypes::DH3)
        .union(PacketTypes::DM5)
        .union(PacketTypes::DH5);

    /// EDR exclusion bits
    pub const EXCEPTION: PacketTypes = PacketTypes::NO_2_DH1
        .union(PacketTypes::NO_3_DH1)
        .union(PacketTypes::NO_2_DH3)
        .union(PacketTypes::NO_3_DH3)
        .union(PacketTypes::NO_2_DH5)
        .union(PacketTypes::NO_3_DH5);

    /// Largest ACL payload this mask allows
    pub fn max_packet_size(self) -> u16 {
        if !self.contains(PacketTypes::NO_3_DH5) {
            1021
        } else if !self.contains(PacketTypes::NO_2_DH5) {
            679
        } else if !self.contains(PacketTypes::NO_3_DH3) {
            552
        } else if !self.contains(PacketTypes::NO_2_DH3) {
            367
        } else if !self.contains(PacketTypes::NO_3_DH1) {
            83
        } else if !self.contains(PacketTypes::NO_2_DH1) {
            54
        } else if self.contains(PacketTypes::DH5) {
            339
        } else if self.contains(PacketTypes::DM5) {
            224
        } else if self.contains(PacketTypes::DH3) {
            183
        } else if self.contains(PacketTypes::DM3) {
            121
        } else if self.contains(PacketTypes::DH1) {
            27
        } else {
            17
        }
    }
}

bitflags! {
    /// HCI link policy settings
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LinkPolicy: u16 {
        const ROLE_SWITCH = 0x0001;
        const HOLD = 0x0002;
        const SNIFF = 0x0004;
        const PARK = 0x0008;
    }
}

/// Role switch sub-state of one link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwitchState {
    #[default]
    Idle,
    /// Waiting for the link to leave sniff/park
    ModeChange,
    /// Waiting for encryption to turn off
    EncryptionOff,
    /// Switch issued with encryption temporarily off
    Switching,
    /// Waiting for encryption to come back on
    EncryptionOn,
    /// Switch issued directly
    InProgress,
}

impl SwitchState {
    pub fn is_idle(self) -> bool {
        self == SwitchState::Idle
    }
}

/// Disconnect deferral around a role switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RsDiscPending {
    #[default]
    NotPending,
    /// Role switch in flight
    Pending,
    /// A disconnect arrived during the switch and must be sent afterwards
    /// with the carried reason
    DiscPending(u8),
}

/// Events feeding the busy level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyEvent {
    AclUp,
    AclDown,
    Paging,
    PagingDone,
    Inquiry,
    InquiryCancel,
    InquiryDone,
}

/// Activity reported alongside a busy level change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusyActivity {
    #[default]
    None,
    InquiryStarted,
    InquiryCancelled,
    InquiryComplete,
    PagingStarted,
    PagingComplete,
}

/// Busy level bookkeeping
#[derive(Debug, Clone, Copy, Default)]
pub struct BusyState {
    pub is_paging: bool,
    pub is_inquiry: bool,
    pub last_level: u8,
}

/// One active or being-established ACL link
#[derive(Debug, Clone)]
pub struct AclConn {
    pub remote_addr: BdAddr,
    pub hci_handle: u16,
    pub transport: Transport,
    pub link_role: LinkRole,
    pub dev_class: DevClass,
    pub name: Option<BdName>,
    pub peer_features: [[u8; 8]; MAX_FEATURE_PAGES],
    pub num_read_pages: u8,
    pub peer_le_features: [u8; 8],
    pub lmp_version: u8,
    pub manufacturer: u16,
    pub lmp_subversion: u16,
    pub clock_offset: u16,
    pub power_mode: PowerMode,
    pub switch_state: SwitchState,
    pub rs_disc_pending: RsDiscPending,
    pub link_super_tout: u16,
    pub pkt_types_mask: PacketTypes,
    pub link_policy: LinkPolicy,
    pub sco_active: bool,
    pub link_up_issued: bool,
}

impl AclConn {
    pub fn new(
        remote_addr: BdAddr,
        hci_handle: u16,
        link_role: LinkRole,
        transport: Transport,
        link_super_tout: u16,
    ) -> Self {
        Self {
            remote_addr,
            hci_handle,
            transport,
            link_role,
            dev_class: [0; 3],
            name: None,
            peer_features: [[0; 8]; MAX_FEATURE_PAGES],
            num_read_pages: 0,
            peer_le_features: [0; 8],
            lmp_version: DEFAULT_LMP_VERSION,
            manufacturer: 0,
            lmp_subversion: 0,
            clock_offset: 0,
            power_mode: PowerMode::Active,
            switch_state: SwitchState::Idle,
            rs_disc_pending: RsDiscPending::NotPending,
            link_super_tout,
            pkt_types_mask: PacketTypes::empty(),
            link_policy: LinkPolicy::empty(),
            sco_active: false,
            link_up_issued: false,
        }
    }
}

/// Outcome of a role switch request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleSwitchResult {
    pub remote_addr: BdAddr,
    pub role: LinkRole,
    pub hci_status: u8,
}

/// Outcome of an RSSI read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RssiResult {
    pub status: BtmStatus,
    pub hci_status: u8,
    pub rem_bda: BdAddr,
    pub rssi: i8,
}

/// Outcome of a link quality read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkQualityResult {
    pub status: BtmStatus,
    pub hci_status: u8,
    pub rem_bda: BdAddr,
    pub link_quality: u8,
}
