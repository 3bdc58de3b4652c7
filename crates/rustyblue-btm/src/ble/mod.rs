//! BLE controller list and vendor offload managers
//!
//! The white list and resolving list are shared with the controller's own
//! scanning, advertising and initiating, so both managers pause whatever is
//! using a list before touching it. The vendor managers (advertising filter,
//! multi-advertising, batch scan) each keep a [`CorrelatedQueue`] of what
//! they have issued and match completions to it by order.
//!
//! [`CorrelatedQueue`]: crate::queue::CorrelatedQueue

pub mod adv_filter;
pub mod batch_scan;
pub mod bgconn;
pub mod multi_adv;
pub mod privacy;
pub mod scan;

use log::{debug, warn};

use crate::btm::Btm;
use crate::error::BtmResult;
use crate::hci::HciCommand;

pub use adv_filter::{
    AdvFilterManager, AdvFilterResult, FilterAction, FilterCondType, FilterCondition, FilterParams,
};
pub use batch_scan::{
    BatchScanManager, BatchScanMode, BatchScanParams, BatchScanReports, BatchScanResult, BatchScanState,
    DiscardRule,
};
pub use bgconn::{BgConnManager, BgConnType, LeConnState, WhiteListOp, WlState};
pub use multi_adv::{AdvInstState, MultiAdvEvent, MultiAdvEvt, MultiAdvManager, MultiAdvParams};
pub use privacy::{PrivacyManager, PrivacyMode, ResolvingListEvent, ResolvingListOp};
pub use scan::{LeScanState, ScanActivity, ScanParams};

/// Vendor event sub-codes
pub const VSE_SUBCODE_BLE_THRESHOLD: u8 = 0x54;
pub const VSE_SUBCODE_BLE_MULTI_ADV_STATE_CHANGE: u8 = 0x55;

/// Legacy advertising as far as the list managers care
#[derive(Debug, Default, Clone, Copy)]
pub struct LeAdvState {
    pub(crate) enabled: bool,
    pub(crate) white_list: bool,
}

impl LeAdvState {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Split a vendor command complete into (status, sub-opcode, rest)
pub(crate) fn split_vsc_complete(params: &[u8]) -> Option<(u8, u8, &[u8])> {
    match params {
        [status, sub_opcode, rest @ ..] => Some((*status, *sub_opcode, rest)),
        _ => None,
    }
}

impl Btm {
    pub fn le_adv(&self) -> &LeAdvState {
        &self.le_adv
    }

    /// Turn legacy advertising on or off
    ///
    /// `white_list` marks the advertising filter policy as using the white
    /// list, which makes advertising a white-list user.
    pub fn set_le_advertising(&mut self, enable: bool, white_list: bool) -> BtmResult {
        self.send(HciCommand::LeSetAdvertisingEnable { enable })?;
        self.le_adv.enabled = enable;
        self.le_adv.white_list = enable && white_list;
        self.bgconn.wl_state.set(bgconn::WlState::ADV, self.le_adv.white_list);
        Ok(crate::error::Issued::Done)
    }

    /// Pause advertising without forgetting it was on
    pub(crate) fn le_adv_suspend(&mut self) -> bool {
        if !self.le_adv.enabled {
            return false;
        }
        if let Err(err) = self.send(HciCommand::LeSetAdvertisingEnable { enable: false }) {
            warn!("advertising disable failed: {}", err);
            return false;
        }
        self.le_adv.enabled = false;
        true
    }

    pub(crate) fn le_adv_resume(&mut self) {
        if self.le_adv.enabled {
            return;
        }
        match self.send(HciCommand::LeSetAdvertisingEnable { enable: true }) {
            Ok(()) => self.le_adv.enabled = true,
            Err(err) => warn!("advertising enable failed: {}", err),
        }
    }

    /// Entry point for HCI vendor-specific events
    pub fn on_vendor_event(&mut self, params: &[u8]) {
        let Some((&sub_code, rest)) = params.split_first() else {
            return;
        };
        match sub_code {
            VSE_SUBCODE_BLE_THRESHOLD => self.on_batch_scan_threshold_event(rest),
            VSE_SUBCODE_BLE_MULTI_ADV_STATE_CHANGE => self.on_multi_adv_state_change(rest),
            _ => debug!("vendor event {:#04x} ignored", sub_code),
        }
    }
}
