//! The BTM context object
//!
//! [`Btm`] owns every table of the layer and the handles to the controller,
//! the HCI transport, the timer service and the upper layer. All entry points
//! take `&mut self`; the embedder serialises events onto one task.

use log::warn;

use crate::acl::AclTable;
use crate::ble::adv_filter::AdvFilterManager;
use crate::ble::batch_scan::BatchScanManager;
use crate::ble::bgconn::BgConnManager;
use crate::ble::multi_adv::MultiAdvManager;
use crate::ble::privacy::{PrivacyManager, PrivacyMode};
use crate::ble::scan::LeScanState;
use crate::ble::LeAdvState;
use crate::callbacks::BtmEvents;
use crate::config::BtmConfig;
use crate::controller::Controller;
use crate::dev::{AddressResolver, DeviceRecordStore};
use crate::error::BtmResult;
use crate::hci::{HciCommand, HciTransport};
use crate::inq::InquiryEngine;
use crate::timer::{BtmTimer, TimerService};

pub struct Btm {
    pub(crate) config: BtmConfig,
    pub(crate) hci: Box<dyn HciTransport>,
    pub(crate) controller: Box<dyn Controller>,
    pub(crate) timers: Box<dyn TimerService>,
    pub(crate) events: Box<dyn BtmEvents>,
    pub(crate) devices: DeviceRecordStore,
    pub(crate) acl: AclTable,
    pub(crate) inq: InquiryEngine,
    pub(crate) le_scan: LeScanState,
    pub(crate) le_adv: LeAdvState,
    pub(crate) bgconn: BgConnManager,
    pub(crate) privacy: PrivacyManager,
    pub(crate) adv_filter: AdvFilterManager,
    pub(crate) multi_adv: MultiAdvManager,
    pub(crate) batch_scan: BatchScanManager,
}

impl Btm {
    pub fn new(
        config: BtmConfig,
        hci: impl HciTransport + 'static,
        controller: impl Controller + 'static,
        timers: impl TimerService + 'static,
        events: impl BtmEvents + 'static,
    ) -> Self {
        let depth = config.async_queue_depth;
        let (privacy_mode, rl_size) = if controller.supports_ble_privacy() {
            (PrivacyMode::Standard, controller.resolving_list_size())
        } else if controller.vendor_irk_list_size() > 0 {
            (PrivacyMode::Vendor, controller.vendor_irk_list_size())
        } else {
            (PrivacyMode::Unsupported, 0)
        };
        Self {
            devices: DeviceRecordStore::new(config.max_device_records),
            acl: AclTable::new(config.max_acl_links),
            inq: InquiryEngine::new(config.max_inq_db, config.inq_report_dup),
            le_scan: LeScanState::default(),
            le_adv: LeAdvState::default(),
            bgconn: BgConnManager::new(config.max_bg_conn_pending, controller.white_list_size()),
            privacy: PrivacyManager::new(depth, privacy_mode, rl_size),
            adv_filter: AdvFilterManager::new(depth),
            multi_adv: MultiAdvManager::new(controller.multi_adv_instances(), depth),
            batch_scan: BatchScanManager::new(depth),
            config,
            hci: Box::new(hci),
            controller: Box::new(controller),
            timers: Box::new(timers),
            events: Box::new(events),
        }
    }

    pub fn config(&self) -> &BtmConfig {
        &self.config
    }

    pub fn devices(&self) -> &DeviceRecordStore {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut DeviceRecordStore {
        &mut self.devices
    }

    pub fn acl(&self) -> &AclTable {
        &self.acl
    }

    /// Install the IRK matcher used for RPA lookups
    pub fn set_address_resolver(&mut self, resolver: impl AddressResolver + 'static) {
        self.devices.set_resolver(Box::new(resolver));
    }

    /// Put a command on the wire; transport errors become `NoResources`
    pub(crate) fn send(&mut self, command: HciCommand) -> BtmResult<()> {
        self.hci.send_command(command).map_err(|err| {
            warn!("HCI send failed: {}", err);
            err.into()
        })
    }

    /// A timer armed through the [`TimerService`] fired
    pub fn on_timer_expired(&mut self, timer: BtmTimer) {
        match timer {
            BtmTimer::RemoteName => self.remote_name_timeout(),
            BtmTimer::Rssi => self.rssi_timeout(),
            BtmTimer::LinkQuality => self.link_quality_timeout(),
            BtmTimer::InqTxPower => self.tx_power_timeout(),
            BtmTimer::LeInquiry => self.stop_le_inquiry(),
            BtmTimer::LeObserve => self.finish_observe(),
        }
    }
}
