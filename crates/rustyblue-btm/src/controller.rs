//! Local controller capability queries
//!
//! The BTM layer reads what the controller supports through this trait rather
//! than caching the raw HCI_Read_Local_* replies itself.

use crate::hci::constants::*;

/// Capabilities and state of the local controller
pub trait Controller {
    /// True once the controller has completed reset and is accepting commands
    fn is_up(&self) -> bool;

    /// LMP feature page 0 of the local controller
    fn bredr_features(&self) -> [u8; 8];

    /// LE feature page of the local controller
    fn le_features(&self) -> [u8; 8];

    fn supports_ble(&self) -> bool;

    /// Controller implements LL privacy (resolving list)
    fn supports_ble_privacy(&self) -> bool;

    /// ACL packet types the controller accepts (HCI packet type mask)
    fn acl_packet_types(&self) -> u16;

    fn white_list_size(&self) -> u8;

    fn resolving_list_size(&self) -> u8;

    /// Slots of the vendor IRK list, 0 when the vendor offload is absent
    fn vendor_irk_list_size(&self) -> u8 {
        0
    }

    /// Number of vendor multi-advertising instances, 0 when absent
    fn multi_adv_instances(&self) -> u8 {
        0
    }

    /// Number of vendor advertising filters, 0 when absent
    fn adv_filter_count(&self) -> u8 {
        0
    }

    /// Bytes of vendor batch-scan storage, 0 when absent
    fn batch_scan_storage(&self) -> u16 {
        0
    }

    fn supports_role_switch(&self) -> bool {
        feature_supported(&self.bredr_features(), LMP_SWITCH)
    }

    fn supports_rssi_with_inquiry(&self) -> bool {
        feature_supported(&self.bredr_features(), LMP_INQ_RSSI)
    }

    fn supports_extended_inquiry_response(&self) -> bool {
        feature_supported(&self.bredr_features(), LMP_EXTENDED_INQ_RSP)
    }

    fn supports_reading_remote_ext_features(&self) -> bool {
        feature_supported(&self.bredr_features(), LMP_EXTENDED_FEATURES)
    }

    /// Controller can pause encryption without tearing it down
    fn supports_encryption_pause(&self) -> bool {
        feature_supported(&self.bredr_features(), LMP_PAUSE_ENCRYPTION)
    }

    fn supports_ble_slave_init_feature_exchange(&self) -> bool {
        feature_supported(&self.le_features(), LE_SLAVE_INIT_FEAT_EXCHANGE)
    }
}
