//! Inquiry and discovery
//!
//! A classic inquiry first programs the controller's inquiry event filter,
//! then starts the inquiry proper:
//!
//! ```text
//! Inactive -> ClearFilter -> SetFilter -> Active -> Inactive
//!          \-----------------/
//! ```
//!
//! An LE inquiry runs on the LE scanner next to it. Results of both land in
//! one bounded database; a session counter separates this session's entries
//! from stale ones. Within a session a device is reported once, and again
//! only when its RSSI improves or its EIR arrives late.

pub mod db;
pub mod eir;
mod le;
pub mod types;


pub use db::InquiryEngine;
pub use eir::{
    check_eir_data, get_eir_uuid_list, has_eir_service, has_inquiry_eir_service, EirServices,
};
pub use types::{
    EirSearchResult, InqCompletion, InqDbEntry, InqFilter, InqMode, InqParams, InqResultMode,
    InqResults, InqResultsCallback, InqState, LeAdvReport, RemoteName, ScanType, TxPowerResult,
};

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, info, warn};

use crate::acl::BusyEvent;
use crate::btm::Btm;
use crate::callbacks::Completion;
use crate::dev::SecFlags;
use crate::error::{BtmError, BtmResult, BtmStatus, Issued};
use crate::hci::constants::*;
use crate::hci::HciCommand;
use crate::inq::db::PendingRemoteName;
use crate::inq::eir::parse_eir_services;
use crate::inq::types::*;
use crate::timer::BtmTimer;
use crate::types::{BdAddr, BdName, DevClass, DeviceType, Transport};

/// One device record of an inquiry result event
struct InqRecord {
    bd_addr: BdAddr,
    page_scan_rep_mode: u8,
    page_scan_per_mode: u8,
    page_scan_mode: u8,
    dev_class: DevClass,
    clock_offset: u16,
    rssi: Option<i8>,
}

fn read_record(cursor: &mut Cursor<&[u8]>, mode: InqResultMode) -> std::io::Result<InqRecord> {
    let mut bd_addr = [0u8; 6];
    cursor.read_exact(&mut bd_addr)?;
    let page_scan_rep_mode = cursor.read_u8()?;
    let page_scan_per_mode = cursor.read_u8()?;
    let page_scan_mode = match mode {
        InqResultMode::Standard => cursor.read_u8()?,
        _ => 0,
    };
    // Class of device arrives least significant byte first
    let mut dev_class = [0u8; 3];
    cursor.read_exact(&mut dev_class)?;
    dev_class.reverse();
    let clock_offset = cursor.read_u16::<LittleEndian>()?;
    let rssi = match mode {
        InqResultMode::Standard => None,
        _ => Some(cursor.read_i8()?),
    };

    Ok(InqRecord {
        bd_addr: BdAddr::new(bd_addr),
        page_scan_rep_mode,
        page_scan_per_mode,
        page_scan_mode,
        dev_class,
        clock_offset,
        rssi,
    })
}

impl Btm {
    pub fn inquiry(&self) -> &InquiryEngine {
        &self.inq
    }

    /// Modes of the inquiry in progress, empty when idle
    pub fn is_inquiry_active(&self) -> InqMode {
        self.inq.active
    }

    /// Start a classic and/or LE inquiry
    ///
    /// `results_cb` sees every reported device; `cmpl_cb` fires once when the
    /// last requested mode finishes.
    pub fn start_inquiry(
        &mut self,
        params: InqParams,
        results_cb: InqResultsCallback,
        cmpl_cb: Completion<InqCompletion>,
    ) -> BtmResult {
        if self.inq.is_active() || self.inq.filter_active {
            return Err(BtmError::Busy);
        }
        if !self.controller.is_up() {
            return Err(BtmError::WrongMode);
        }

        let br_mode = params.mode & InqMode::BR_MASK;
        let le_mode = params.mode & InqMode::LE_MASK;
        let valid = br_mode == InqMode::GENERAL
            || br_mode == InqMode::LIMITED
            || le_mode == InqMode::LE_GENERAL
            || le_mode == InqMode::LE_LIMITED;
        if !valid {
            return Err(BtmError::IllegalValue);
        }

        // An observe gives way and comes back once this inquiry is over
        if self.inq.scan_type == ScanType::LeObserve {
            self.preempt_observe();
        }
        self.inq.scan_type = ScanType::General;

        info!("start inquiry mode {:?} duration {} max_resps {}", params.mode, params.duration, params.max_resps);
        self.inq.params = params;
        self.inq.params.mode = br_mode | le_mode;
        self.inq.state = InqState::Active;
        self.inq.results_cb = Some(results_cb);
        self.inq.cmpl_cb = Some(cmpl_cb);
        self.inq.num_resp = 0;
        self.inq.active = br_mode | le_mode;

        let mut result = Ok(Issued::Started);
        if !le_mode.is_empty() {
            let le_result = if self.controller.supports_ble() {
                self.start_le_inquiry(le_mode, params.duration)
            } else {
                Err(BtmError::IllegalValue)
            };
            if let Err(err) = le_result {
                warn!("LE inquiry not started: {}", err);
                self.inq.params.mode.remove(InqMode::LE_MASK);
                self.inq.active.remove(InqMode::LE_MASK);
                result = Err(err);
            }
        }

        if br_mode.is_empty() {
            if result.is_err() {
                self.reset_inquiry();
            }
            return result;
        }

        self.inq.state = match params.filter {
            InqFilter::Clear => InqState::SetFilter,
            _ => InqState::ClearFilter,
        };
        if let Err(err) = self.set_inq_event_filter(InqFilter::Clear) {
            self.inq.params.mode.remove(InqMode::BR_MASK);
            self.inq.active.remove(InqMode::BR_MASK);
            self.inq.state = InqState::Inactive;
            if !self.inq.is_active() {
                self.reset_inquiry();
            }
            return Err(err);
        }
        Ok(Issued::Started)
    }

    fn reset_inquiry(&mut self) {
        self.inq.state = InqState::Inactive;
        self.inq.active = InqMode::empty();
        self.inq.results_cb = None;
        self.inq.cmpl_cb = None;
        self.inq.scan_type = ScanType::None;
    }

    /// Start periodic inquiry; runs until [`Btm::cancel_periodic_inquiry`]
    ///
    /// Delays are in 1.28 s units and must satisfy
    /// `duration < min_delay < max_delay`.
    pub fn set_periodic_inquiry_mode(
        &mut self,
        params: InqParams,
        max_delay: u16,
        min_delay: u16,
        results_cb: InqResultsCallback,
    ) -> BtmResult {
        if !self.controller.is_up() {
            return Err(BtmError::WrongMode);
        }
        if self.inq.is_active() || self.inq.filter_active {
            return Err(BtmError::Busy);
        }
        if params.mode != InqMode::GENERAL && params.mode != InqMode::LIMITED {
            return Err(BtmError::IllegalValue);
        }
        let duration = u16::from(params.duration);
        let valid = (MIN_INQUIRY_LEN..=MAX_INQUIRY_LEN).contains(&params.duration)
            && (PER_INQ_MIN_MIN_PERIOD..=PER_INQ_MAX_MIN_PERIOD).contains(&min_delay)
            && max_delay >= PER_INQ_MIN_MAX_PERIOD
            && min_delay > duration
            && max_delay > min_delay;
        if !valid {
            return Err(BtmError::IllegalValue);
        }

        info!("periodic inquiry min {} max {} duration {}", min_delay, max_delay, params.duration);
        self.inq.params = params;
        self.inq.per_min_delay = min_delay;
        self.inq.per_max_delay = max_delay;
        self.inq.num_resp = 0;
        self.inq.results_cb = Some(results_cb);
        self.inq.cmpl_cb = None;
        self.inq.active = params.mode | InqMode::PERIODIC;

        self.inq.state = match params.filter {
            InqFilter::Clear => InqState::SetFilter,
            _ => InqState::ClearFilter,
        };
        if let Err(err) = self.set_inq_event_filter(InqFilter::Clear) {
            self.reset_inquiry();
            return Err(err);
        }
        Ok(Issued::Started)
    }

    pub fn cancel_periodic_inquiry(&mut self) -> BtmResult {
        if !self.controller.is_up() {
            return Err(BtmError::WrongMode);
        }
        if !self.inq.active.contains(InqMode::PERIODIC) {
            return Ok(Issued::Done);
        }

        self.inq.active = InqMode::empty();
        self.inq.state = InqState::Inactive;
        self.inq.results_cb = None;
        let result = self.send(HciCommand::ExitPeriodicInquiryMode).map(|_| Issued::Done);

        // A filter completion still on its way belongs to the cancelled run
        if self.inq.filter_active {
            self.inq.filter_active = false;
            self.inq.pending_filt_complete_event += 1;
        }
        self.inq.counter += 1;
        result
    }

    /// Stop a running one-shot inquiry; its completion callback is dropped
    pub fn cancel_inquiry(&mut self) -> BtmResult {
        if !self.controller.is_up() {
            return Err(BtmError::WrongMode);
        }
        let active = self.inq.active;
        if !active.intersects(InqMode::BR_MASK | InqMode::LE_MASK) || active.contains(InqMode::PERIODIC) {
            return Ok(Issued::Done);
        }

        info!("cancel inquiry");
        self.inq.active = InqMode::empty();
        self.inq.state = InqState::Inactive;
        self.inq.results_cb = None;
        self.inq.cmpl_cb = None;

        let mut result = Ok(Issued::Done);
        if self.inq.filter_active {
            self.inq.filter_active = false;
            self.inq.pending_filt_complete_event += 1;
        } else {
            if self.inq.params.mode.intersects(InqMode::BR_MASK) {
                result = self.send(HciCommand::InquiryCancel).map(|_| Issued::Done);
            }
            if self.inq.params.mode.intersects(InqMode::LE_MASK) {
                self.stop_le_inquiry();
            }
        }

        self.inq.counter += 1;
        self.inq.clear_seen();
        result
    }

    fn set_inq_event_filter(&mut self, filter: InqFilter) -> BtmResult<()> {
        debug!("inquiry event filter {:?}", filter);
        self.inq.filter_active = true;
        let result = self.send(HciCommand::SetEventFilter {
            filter_type: HCI_FILTER_INQUIRY_RESULT,
            condition_type: filter.condition_type(),
            condition: filter.condition(),
        });
        if result.is_err() {
            self.inq.filter_active = false;
        }
        result
    }

    /// Command complete for HCI_Set_Event_Filter
    pub fn on_event_filter_complete(&mut self, hci_status: u8) {
        if self.inq.pending_filt_complete_event > 0 {
            self.inq.pending_filt_complete_event -= 1;
            return;
        }
        if !self.inq.filter_active {
            return;
        }

        if hci_status != HCI_SUCCESS {
            warn!("inquiry event filter failed: {:#04x}", hci_status);
            self.inq.filter_active = false;
            self.process_inq_complete(BtmStatus::ErrProcessing, InqMode::BR_MASK);
            self.inq.active.remove(InqMode::BR_ACTIVE_MASK);
            self.inq.state = InqState::Inactive;
            return;
        }

        match self.inq.state {
            InqState::ClearFilter => {
                let filter = self.inq.params.filter;
                match self.set_inq_event_filter(filter) {
                    Ok(()) => self.inq.state = InqState::SetFilter,
                    Err(_) => self.process_inq_complete(BtmStatus::NoResources, InqMode::BR_MASK),
                }
            }
            InqState::SetFilter => {
                self.inq.filter_active = false;
                self.inq.state = InqState::Active;
                self.initiate_inquiry();
            }
            state => {
                debug!("event filter complete in state {:?}", state);
                self.inq.filter_active = false;
            }
        }
    }

    fn initiate_inquiry(&mut self) {
        self.update_busy_level(BusyEvent::Inquiry);

        let capacity = u8::try_from(self.inq.capacity()).unwrap_or(u8::MAX);
        if self.inq.params.max_resps > capacity {
            self.inq.params.max_resps = capacity;
        }
        let lap = if self.inq.active.contains(InqMode::LIMITED) { LIMITED_INQ_LAP } else { GENERAL_INQ_LAP };
        let duration = self.inq.params.duration;

        let command = if self.inq.active.contains(InqMode::PERIODIC) {
            HciCommand::PeriodicInquiryMode {
                max_delay: self.inq.per_max_delay,
                min_delay: self.inq.per_min_delay,
                lap,
                duration,
                max_resps: self.inq.params.max_resps,
            }
        } else {
            self.inq.clear_seen();
            // The cap is enforced here so the controller never stops early
            HciCommand::Inquiry { lap, duration, max_resps: 0 }
        };

        if self.send(command).is_err() {
            self.process_inq_complete(BtmStatus::NoResources, InqMode::BR_MASK);
        }
    }

    /// Inquiry Result, Inquiry Result with RSSI and Extended Inquiry Result events
    pub fn on_inquiry_result(&mut self, mode: InqResultMode, params: &[u8]) {
        if !self.inq.active.intersects(InqMode::BR_ACTIVE_MASK) {
            return;
        }

        let mut cursor = Cursor::new(params);
        let Ok(num_resp) = cursor.read_u8() else {
            return;
        };

        for _ in 0..num_resp {
            let record = match read_record(&mut cursor, mode) {
                Ok(record) => record,
                Err(_) => {
                    warn!("truncated inquiry result ({} bytes)", params.len());
                    return;
                }
            };
            let eir: &[u8] = match mode {
                InqResultMode::Extended => {
                    let pos = cursor.position() as usize;
                    &params[pos.min(params.len())..]
                }
                _ => &[],
            };
            if !self.process_inq_record(mode, record, eir) {
                return;
            }
        }
    }

    /// Store one classic result; false once the response cap drops the rest
    fn process_inq_record(&mut self, mode: InqResultMode, record: InqRecord, eir: &[u8]) -> bool {
        let max_resps = self.inq.params.max_resps;
        let periodic = self.inq.active.contains(InqMode::PERIODIC);
        let addr = record.bd_addr;
        let existing = self.inq.find_index(&addr);

        if max_resps != 0 && self.inq.num_resp >= max_resps {
            let known_classic = existing
                .and_then(|idx| self.inq.get(idx))
                .is_some_and(|e| e.results.device_type != DeviceType::Ble);
            if existing.is_none() || known_classic {
                warn!("inquiry result for {} dropped, {} responses already", addr, max_resps);
                return false;
            }
        }

        // Periodic runs rely on the session counter alone
        let seen = !periodic && !self.inq.mark_seen(addr);
        let mut update = false;
        if seen {
            let Some(entry) = existing.and_then(|idx| self.inq.get(idx)) else {
                return true;
            };
            let rssi_improved = match (record.rssi, entry.results.rssi) {
                (Some(new), Some(old)) => new > old,
                (Some(_), None) => true,
                _ => false,
            };
            if self.inq.report_dup && rssi_improved {
                update = true;
            } else if mode == InqResultMode::Extended && !entry.eir_received {
                update = true;
            } else {
                return true;
            }
        }

        let counter = self.inq.counter;
        let (idx, is_new) = match existing {
            None => (self.inq.alloc(addr), true),
            Some(idx) => {
                let stale = self
                    .inq
                    .get(idx)
                    .is_some_and(|e| e.inq_count != counter || e.results.device_type != DeviceType::BrEdr);
                (idx, stale)
            }
        };

        let tick = self.inq.next_tick();
        let mut cap_reached = false;
        let Some(entry) = self.inq.get_mut(idx) else {
            return true;
        };
        entry.results.rssi = record.rssi;

        if is_new {
            entry.results.page_scan_rep_mode = record.page_scan_rep_mode;
            entry.results.page_scan_per_mode = record.page_scan_per_mode;
            entry.results.page_scan_mode = record.page_scan_mode;
            entry.results.dev_class = record.dev_class;
            entry.results.clock_offset = record.clock_offset | CLOCK_OFFSET_VALID;
            entry.time_of_resp = tick;
            entry.appl_knows_rem_name = false;

            let counted = entry.inq_count != counter;
            if counted {
                entry.results.device_type = DeviceType::BrEdr;
                entry.eir_received = false;
                entry.scan_rsp = false;
            } else {
                entry.results.device_type = entry.results.device_type.union(DeviceType::BrEdr);
            }
            entry.inq_count = counter;

            let le_done = entry.results.device_type == DeviceType::Dual && entry.scan_rsp;
            if counted {
                self.inq.num_resp += 1;
            }
            let le_mode = self.inq.params.mode.intersects(InqMode::LE_MASK);
            cap_reached = !periodic
                && max_resps != 0
                && self.inq.num_resp == max_resps
                && (!le_mode || le_done);
        }

        if is_new || update {
            let eir_data = match mode {
                InqResultMode::Extended => {
                    if let Some(entry) = self.inq.get_mut(idx) {
                        let (services, complete) = parse_eir_services(eir);
                        entry.results.eir_uuids = services;
                        entry.results.eir_complete_list = complete;
                        entry.eir_received = eir.first().is_some_and(|&len| len != 0);
                    }
                    Some(eir)
                }
                _ => None,
            };

            if let Some(results) = self.inq.get(idx).map(|e| e.results.clone()) {
                if let Some(callback) = self.inq.results_cb.as_mut() {
                    callback(&results, eir_data);
                }
            }
        }

        if cap_reached {
            info!("inquiry response cap of {} reached", max_resps);
            if let Err(err) = self.send(HciCommand::InquiryCancel) {
                warn!("inquiry cancel not sent: {}", err);
            }
            if self.inq.params.mode.intersects(InqMode::LE_MASK) {
                self.stop_le_inquiry();
            }
            self.update_busy_level(BusyEvent::InquiryDone);
        }
        true
    }

    /// Inquiry Complete event
    pub fn on_inquiry_complete(&mut self, hci_status: u8) {
        self.process_inq_complete(BtmStatus::from_hci(hci_status), InqMode::BR_MASK);
    }

    /// Command complete for HCI_Inquiry_Cancel
    pub fn on_inquiry_cancel_complete(&mut self, hci_status: u8) {
        self.update_busy_level(BusyEvent::InquiryCancel);
        self.process_inq_complete(BtmStatus::from_hci(hci_status), InqMode::BR_MASK);
    }

    /// One inquiry mode finished; ends the session once none is left
    pub(crate) fn process_inq_complete(&mut self, status: BtmStatus, mode: InqMode) {
        self.inq.params.mode.remove(mode);
        self.update_busy_level(BusyEvent::InquiryDone);

        let status = if status.is_success() { BtmStatus::Success } else { BtmStatus::ErrProcessing };

        if self.inq.is_active()
            && !self.inq.active.contains(InqMode::PERIODIC)
            && self.inq.params.mode.is_empty()
        {
            self.inq.state = InqState::Inactive;
            self.inq.counter += 1;
            self.inq.clear_seen();

            if status.is_success() && self.controller.supports_rssi_with_inquiry() {
                self.inq.sort_by_rssi();
            }

            self.inq.results_cb = None;
            self.inq.active = InqMode::empty();
            let completion = self.inq.completion(status);
            info!("inquiry complete: {:?}, {} responses", status, completion.num_resp);
            if let Some(callback) = self.inq.cmpl_cb.take() {
                callback(completion);
            }
        }

        if self.inq.params.mode.is_empty() && self.inq.scan_type == ScanType::General {
            self.inq.scan_type = ScanType::None;
            self.resume_observe();
        }
    }

    /// Drop one entry, or all of them, from the inquiry database
    pub fn clear_inq_db(&mut self, bd_addr: Option<&BdAddr>) -> BtmResult {
        if self.inq.is_active() || self.inq.filter_active {
            return Err(BtmError::Busy);
        }
        self.inq.clear(bd_addr);
        Ok(Issued::Done)
    }

    pub fn inq_db_read(&self, bd_addr: &BdAddr) -> Option<&InqResults> {
        self.inq.find(bd_addr).map(|e| &e.results)
    }

    pub fn inq_db_first(&self) -> Option<&InqResults> {
        self.inq.first()
    }

    pub fn inq_db_next(&self, bd_addr: &BdAddr) -> Option<&InqResults> {
        self.inq.next_after(bd_addr)
    }

    // ---------------------------------------------------------------------
    // Remote name
    // ---------------------------------------------------------------------

    /// Read the user-friendly name of a peer
    ///
    /// Classic names come from HCI_Remote_Name_Request; LE names are read by
    /// the layer above through [`BtmEvents::on_le_remote_name_request`](crate::BtmEvents::on_le_remote_name_request).
    pub fn read_remote_name(
        &mut self,
        bd_addr: BdAddr,
        transport: Transport,
        callback: Completion<RemoteName>,
    ) -> BtmResult {
        let failed = |callback: Completion<RemoteName>, err: BtmError| -> BtmResult {
            callback(RemoteName { status: err.into(), hci_status: 0, bd_addr, name: BdName::default() });
            Err(err)
        };

        if !self.controller.is_up() {
            return failed(callback, BtmError::WrongMode);
        }
        if transport == Transport::Le {
            if !self.controller.supports_ble() {
                return failed(callback, BtmError::ErrProcessing);
            }
            let evt_type = self.inq.find(&bd_addr).and_then(|e| e.results.ble_evt_type);
            if evt_type.is_some_and(|evt| evt != BLE_EVT_CONN_ADV && evt != BLE_EVT_CONN_DIR_ADV) {
                debug!("{} is not connectable, no LE name read", bd_addr);
                return failed(callback, BtmError::ErrProcessing);
            }
        }
        if self.inq.remname.is_some() {
            return failed(callback, BtmError::Busy);
        }

        if transport == Transport::Le {
            self.timers.start(BtmTimer::RemoteName, self.config.ble_remote_name_timeout);
            self.inq.remname = Some(PendingRemoteName { bd_addr, transport, callback });
            self.events.on_le_remote_name_request(bd_addr);
            return Ok(Issued::Started);
        }

        let command = match self.inq.find(&bd_addr) {
            Some(entry) => HciCommand::RemoteNameRequest {
                bd_addr,
                page_scan_rep_mode: entry.results.page_scan_rep_mode,
                page_scan_mode: entry.results.page_scan_mode,
                clock_offset: entry.results.clock_offset | CLOCK_OFFSET_VALID,
            },
            None => HciCommand::RemoteNameRequest {
                bd_addr,
                page_scan_rep_mode: HCI_PAGE_SCAN_REP_MODE_R1,
                page_scan_mode: HCI_MANDATARY_PAGE_SCAN_MODE,
                clock_offset: 0,
            },
        };

        self.timers.start(BtmTimer::RemoteName, self.config.remote_name_timeout);
        if let Err(err) = self.send(command) {
            self.timers.stop(BtmTimer::RemoteName);
            return failed(callback, err);
        }
        self.inq.remname = Some(PendingRemoteName { bd_addr, transport, callback });
        Ok(Issued::Started)
    }

    pub fn cancel_remote_name(&mut self) -> BtmResult {
        let Some(pending) = self.inq.remname.as_ref() else {
            return Err(BtmError::WrongMode);
        };
        let bd_addr = pending.bd_addr;

        if pending.transport == Transport::Le {
            self.timers.stop(BtmTimer::RemoteName);
            self.inq.remname = None;
            self.events.on_le_remote_name_cancel(bd_addr);
            return Ok(Issued::Started);
        }

        // The controller answers with a failed Remote Name Request Complete
        self.send(HciCommand::RemoteNameRequestCancel { bd_addr })?;
        Ok(Issued::Started)
    }

    /// Remote Name Request Complete event
    ///
    /// `bd_addr` is `None` when the controller did not say which request
    /// failed; the pending one is completed regardless.
    pub fn on_remote_name(&mut self, hci_status: u8, bd_addr: Option<BdAddr>, name: &[u8]) {
        let matches = match (&self.inq.remname, bd_addr) {
            (Some(pending), Some(addr)) => pending.bd_addr == addr,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !matches {
            return;
        }
        let Some(pending) = self.inq.remname.take() else {
            return;
        };
        self.timers.stop(BtmTimer::RemoteName);

        let mut result = RemoteName {
            status: BtmStatus::ErrProcessing,
            hci_status,
            bd_addr: pending.bd_addr,
            name: BdName::default(),
        };
        if hci_status == HCI_SUCCESS {
            result.status = BtmStatus::Success;
            result.name = BdName::from_bytes(name);

            if let Some(record) = self.devices.find_mut(&pending.bd_addr) {
                record.name = Some(result.name.clone());
                record.sec_flags |= match pending.transport {
                    Transport::Le => SecFlags::LE_NAME_KNOWN,
                    Transport::BrEdr => SecFlags::NAME_KNOWN,
                };
            }
        } else if pending.transport == Transport::Le && hci_status == HCI_ERR_UNSPECIFIED {
            self.events.on_le_remote_name_cancel(pending.bd_addr);
        }

        debug!("remote name for {}: {:?} {:?}", pending.bd_addr, result.status, result.name.as_str());
        (pending.callback)(result);
    }

    /// Name read over GATT finished; `None` if it failed
    pub fn on_le_remote_name(&mut self, bd_addr: BdAddr, name: Option<&[u8]>) {
        match name {
            Some(name) => self.on_remote_name(HCI_SUCCESS, Some(bd_addr), name),
            None => self.on_remote_name(HCI_ERR_HOST_TIMEOUT, Some(bd_addr), &[]),
        }
    }

    pub(crate) fn remote_name_timeout(&mut self) {
        if let Some(bd_addr) = self.inq.remname.as_ref().map(|p| p.bd_addr) {
            warn!("remote name request for {} timed out", bd_addr);
            self.on_remote_name(HCI_ERR_UNSPECIFIED, Some(bd_addr), &[]);
        }
    }

    // ---------------------------------------------------------------------
    // Inquiry response TX power
    // ---------------------------------------------------------------------

    pub fn read_inquiry_rsp_tx_power(&mut self, callback: Completion<TxPowerResult>) -> BtmResult {
        if self.inq.tx_power_cb.is_some() {
            return Err(BtmError::Busy);
        }

        self.timers.start(BtmTimer::InqTxPower, self.config.tx_power_timeout);
        if let Err(err) = self.send(HciCommand::ReadInqRspTxPower) {
            self.timers.stop(BtmTimer::InqTxPower);
            return Err(err);
        }
        self.inq.tx_power_cb = Some(callback);
        Ok(Issued::Started)
    }

    /// Command complete for HCI_Read_Inquiry_Response_Transmit_Power_Level
    pub fn on_read_inq_tx_power_complete(&mut self, params: &[u8]) {
        self.timers.stop(BtmTimer::InqTxPower);
        let Some(callback) = self.inq.tx_power_cb.take() else {
            return;
        };

        let mut result = TxPowerResult { status: BtmStatus::ErrProcessing, hci_status: 0, tx_power: 0 };
        let mut cursor = Cursor::new(params);
        if let (Ok(hci_status), Ok(tx_power)) = (cursor.read_u8(), cursor.read_i8()) {
            result.hci_status = hci_status;
            if hci_status == HCI_SUCCESS {
                result.status = BtmStatus::Success;
                result.tx_power = tx_power;
            }
        }
        callback(result);
    }

    pub(crate) fn tx_power_timeout(&mut self) {
        if let Some(callback) = self.inq.tx_power_cb.take() {
            warn!("inquiry response TX power read timed out");
            callback(TxPowerResult {
                status: BtmStatus::ErrProcessing,
                hci_status: HCI_ERR_UNSPECIFIED,
                tx_power: 0,
            });
        }
    }
}
