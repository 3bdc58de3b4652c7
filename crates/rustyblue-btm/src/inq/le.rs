//! LE inquiry and observe on the shared scanner

use std::time::Duration;

use log::{debug, info, warn};

use crate::acl::BusyEvent;
use crate::ble::scan::{ScanActivity, ScanParams, SCAN_FILTER_ACCEPT_ALL, SCAN_TYPE_ACTIVE};
use crate::btm::Btm;
use crate::callbacks::Completion;
use crate::error::{BtmError, BtmResult, BtmStatus, Issued};
use crate::hci::HciCommand;
use crate::inq::eir::{check_eir_data, EIR_FLAGS_TYPE};
use crate::inq::types::*;
use crate::timer::BtmTimer;
use crate::types::{AddressType, DeviceType};

/// LE inquiry length is given in the same 1.28 s units as classic
const INQUIRY_LEN_UNIT_MS: u64 = 1280;

impl Btm {
    pub(crate) fn start_le_inquiry(&mut self, mode: InqMode, duration: u8) -> BtmResult<()> {
        let activity = self.le_scan.activity;
        if activity.intersects(ScanActivity::INQUIRY_MASK | ScanActivity::SELECTIVE_CONN) {
            debug!("LE scanner busy: {:?}", activity);
            return Err(BtmError::Busy);
        }

        self.le_scan_start(ScanParams {
            scan_type: SCAN_TYPE_ACTIVE,
            interval: LOW_LATENCY_SCAN_INT,
            window: LOW_LATENCY_SCAN_WIN,
            filter_policy: SCAN_FILTER_ACCEPT_ALL,
        })?;

        let mode = mode & InqMode::LE_MASK;
        self.inq.active |= mode;
        self.le_scan.activity |= ScanActivity::from_bits_truncate(mode.bits());
        if duration != 0 {
            let timeout = Duration::from_millis(u64::from(duration) * INQUIRY_LEN_UNIT_MS);
            self.timers.start(BtmTimer::LeInquiry, timeout);
        }
        Ok(())
    }

    /// End the LE half of an inquiry
    pub(crate) fn stop_le_inquiry(&mut self) {
        self.timers.stop(BtmTimer::LeInquiry);
        self.le_scan.activity.remove(ScanActivity::INQUIRY_MASK);
        self.le_scan_release();
        self.process_inq_complete(BtmStatus::Success, InqMode::LE_MASK);
    }

    /// Report every advertisement heard, without touching classic inquiry
    ///
    /// `duration` of zero observes until [`Btm::stop_ble_observe`].
    pub fn start_ble_observe(
        &mut self,
        duration: Duration,
        results_cb: InqResultsCallback,
        cmpl_cb: Option<Completion<InqCompletion>>,
    ) -> BtmResult {
        if !self.controller.supports_ble() {
            return Err(BtmError::IllegalValue);
        }
        if self.le_scan.activity.contains(ScanActivity::OBSERVE) {
            return Err(BtmError::WrongMode);
        }

        if !self.le_scan.enabled {
            self.le_scan_start(ScanParams {
                scan_type: SCAN_TYPE_ACTIVE,
                interval: OBSERVE_SCAN_INT,
                window: OBSERVE_SCAN_WIN,
                filter_policy: SCAN_FILTER_ACCEPT_ALL,
            })?;
        }

        info!("LE observe start");
        self.inq.obs_results_cb = Some(results_cb);
        self.inq.obs_cmpl_cb = cmpl_cb;
        self.le_scan.activity |= ScanActivity::OBSERVE;
        if !self.inq.is_active() {
            self.inq.scan_type = ScanType::LeObserve;
        }
        if !duration.is_zero() {
            self.timers.start(BtmTimer::LeObserve, duration);
        }
        Ok(Issued::Started)
    }

    pub fn stop_ble_observe(&mut self) -> BtmResult {
        let running = self.le_scan.activity.contains(ScanActivity::OBSERVE);
        // A parked observe is still the caller's to stop
        if !running && self.inq.obs_results_cb.is_none() {
            return Err(BtmError::WrongMode);
        }
        self.finish_observe();
        Ok(Issued::Done)
    }

    pub(crate) fn finish_observe(&mut self) {
        let running = self.le_scan.activity.contains(ScanActivity::OBSERVE);
        if !running && self.inq.obs_results_cb.is_none() {
            return;
        }
        info!("LE observe stop");
        self.timers.stop(BtmTimer::LeObserve);
        if running {
            self.le_scan.activity.remove(ScanActivity::OBSERVE);
            self.le_scan_release();
        }
        if self.inq.scan_type == ScanType::LeObserve {
            self.inq.scan_type = ScanType::None;
        }

        self.inq.obs_results_cb = None;
        let completion = self.inq.completion(BtmStatus::Success);
        if let Some(callback) = self.inq.obs_cmpl_cb.take() {
            callback(completion);
        }
    }

    /// Park a running observe so an inquiry can have the scanner
    pub(crate) fn preempt_observe(&mut self) {
        debug!("LE observe pre-empted by inquiry");
        self.timers.stop(BtmTimer::LeObserve);
        self.le_scan.activity.remove(ScanActivity::OBSERVE);
        self.le_scan_release();
    }

    /// Restart an observe parked by [`Btm::preempt_observe`]
    pub(crate) fn resume_observe(&mut self) {
        if self.le_scan.activity.contains(ScanActivity::OBSERVE) {
            return;
        }
        let Some(results_cb) = self.inq.obs_results_cb.take() else {
            return;
        };
        let cmpl_cb = self.inq.obs_cmpl_cb.take();
        debug!("resuming LE observe");
        if let Err(err) = self.start_ble_observe(Duration::ZERO, results_cb, cmpl_cb) {
            warn!("LE observe not resumed: {}", err);
        }
    }

    /// Merge one advertisement into the inquiry database and report it
    pub(crate) fn process_le_inquiry_report(&mut self, report: &LeAdvReport) {
        let activity = self.le_scan.activity;
        let inquiring = activity.intersects(ScanActivity::INQUIRY_MASK);
        let observing = activity.contains(ScanActivity::OBSERVE);
        let addr = report.bd_addr;
        let existing = self.inq.find_index(&addr);

        // Observe alone reports every advertisement; inquiry once per device
        let mut update = true;
        if inquiring && !self.inq.mark_seen(addr) {
            let le_complete = existing
                .and_then(|idx| self.inq.get(idx))
                .is_some_and(|e| e.results.device_type != DeviceType::BrEdr && e.scan_rsp);
            if le_complete {
                if !observing {
                    return;
                }
                update = false;
            }
        }

        let counter = self.inq.counter;
        let idx = match existing {
            Some(idx) => idx,
            None => self.inq.alloc(addr),
        };
        let Some(entry) = self.inq.get_mut(idx) else {
            return;
        };

        let first_this_session = entry.inq_count != counter;
        entry.results.rssi = Some(report.rssi);
        entry.results.ble_addr_type = Some(report.addr_type);
        entry.results.device_type = if first_this_session {
            DeviceType::Ble
        } else {
            entry.results.device_type.union(DeviceType::Ble)
        };
        entry.inq_count = counter;
        // Active scanning: connectable and scannable adverts are followed by a scan response
        entry.scan_rsp = !matches!(report.evt_type, BLE_EVT_CONN_ADV | BLE_EVT_DISC_ADV);
        if report.evt_type != BLE_EVT_SCAN_RSP {
            entry.results.ble_evt_type = Some(report.evt_type);
        }

        let flags = check_eir_data(&report.data, EIR_FLAGS_TYPE).and_then(|f| f.first().copied());
        if let Some(flags) = flags {
            entry.results.ble_flags = flags;
            if flags & BLE_BREDR_NOT_SPT == 0
                && report.evt_type != BLE_EVT_CONN_DIR_ADV
                && report.addr_type != AddressType::Random
            {
                entry.results.device_type = DeviceType::Dual;
            }
        }
        let ble_flags = entry.results.ble_flags;
        let le_done = entry.scan_rsp;
        let results = entry.results.clone();

        if first_this_session {
            self.inq.num_resp = self.inq.num_resp.saturating_add(1);
        }

        let discoverable = if activity.contains(ScanActivity::INQUIRY_GENERAL) {
            ble_flags & (BLE_GEN_DISC_FLAG | BLE_LIMIT_DISC_FLAG) != 0
        } else {
            ble_flags & BLE_LIMIT_DISC_FLAG != 0
        };

        if inquiring && update && discoverable {
            if let Some(callback) = self.inq.results_cb.as_mut() {
                callback(&results, Some(&report.data));
            }
        }
        if observing {
            if let Some(callback) = self.inq.obs_results_cb.as_mut() {
                callback(&results, Some(&report.data));
            }
        }

        let max_resps = self.inq.params.max_resps;
        if inquiring && max_resps != 0 && self.inq.num_resp == max_resps && le_done {
            info!("inquiry response cap of {} reached on LE", max_resps);
            let classic = self.inq.active.intersects(InqMode::BR_MASK)
                && !self.inq.active.contains(InqMode::PERIODIC);
            if classic {
                if let Err(err) = self.send(HciCommand::InquiryCancel) {
                    warn!("inquiry cancel not sent: {}", err);
                }
            }
            self.stop_le_inquiry();
            self.update_busy_level(BusyEvent::InquiryDone);
        }
    }
}
