//! Tunables of the BTM layer

use std::time::Duration;

use crate::acl::{LinkPolicy, PacketTypes};
use crate::types::Irk;

/// Table sizes, defaults and timeouts
#[derive(Debug, Clone)]
pub struct BtmConfig {
    /// Device records held before the oldest one is recycled
    pub max_device_records: usize,
    pub max_acl_links: usize,
    pub max_inq_db: usize,
    /// Depth of each vendor command completion queue
    pub async_queue_depth: usize,
    /// Pending white-list operations held while the list is in use
    pub max_bg_conn_pending: usize,
    /// Link supervision timeout in 0.625 ms slots
    pub link_supervision_timeout: u16,
    pub default_link_policy: LinkPolicy,
    pub default_packet_types: PacketTypes,
    /// Re-report an already seen device within one inquiry session
    pub inq_report_dup: bool,
    pub remote_name_timeout: Duration,
    /// LE names are read over GATT by the layer above
    pub ble_remote_name_timeout: Duration,
    pub rssi_timeout: Duration,
    pub link_quality_timeout: Duration,
    pub tx_power_timeout: Duration,
    /// Local identity key handed to the controller with resolving-list entries
    pub local_irk: Irk,
}

impl Default for BtmConfig {
    fn default() -> Self {
        Self {
            max_device_records: 15,
            max_acl_links: 7,
            max_inq_db: 40,
            async_queue_depth: 5,
            max_bg_conn_pending: 8,
            link_supervision_timeout: 0x7D00,
            default_link_policy: LinkPolicy::ROLE_SWITCH | LinkPolicy::SNIFF,
            default_packet_types: PacketTypes::DM1
                | PacketTypes::DH1
                | PacketTypes::DM3
                | PacketTypes::DH3
                | PacketTypes::DM5
                | PacketTypes::DH5,
            inq_report_dup: true,
            remote_name_timeout: Duration::from_secs(40),
            ble_remote_name_timeout: Duration::from_secs(30),
            rssi_timeout: Duration::from_secs(3),
            link_quality_timeout: Duration::from_secs(3),
            tx_power_timeout: Duration::from_secs(3),
            local_irk: [0; 16],
        }
    }
}
