//! Vendor batch scanning
//!
//! The controller scans on its own and stores what it hears; the host sets
//! the storage split, starts and stops the scan, and pulls the stored
//! reports. A report read is repeated until the controller says nothing is
//! left, and the caller gets the whole lot in one callback.

use log::{debug, error, info, warn};

use crate::btm::Btm;
use crate::callbacks::Completion;
use crate::error::{BtmError, BtmResult, BtmStatus, Issued};
use crate::hci::constants::OCF_VSC_BATCH_SCAN;
use crate::hci::HciCommand;
use crate::queue::{CorrelatedQueue, PendingOp};

pub const BATCH_SUB_ENB_DISAB_CUST_FEATURE: u8 = 0x01;
pub const BATCH_SUB_SET_STORAGE_PARAM: u8 = 0x02;
pub const BATCH_SUB_SET_PARAMS: u8 = 0x03;
pub const BATCH_SUB_READ_RESULTS: u8 = 0x04;

/// Feature state of the vendor batch scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchScanState {
    #[default]
    Invalid,
    EnableCalled,
    Enabled,
    DisableCalled,
    Disabled,
}

impl BatchScanState {
    /// State after the feature enable/disable command completes
    fn on_feature_complete(self, success: bool) -> Self {
        match (self, success) {
            (Self::EnableCalled, true) => Self::Enabled,
            (Self::EnableCalled, false) => Self::Invalid,
            (Self::DisableCalled, true) => Self::Disabled,
            (Self::DisableCalled, false) => Self::Enabled,
            (state, _) => {
                error!("batch scan feature completion in state {:?}", state);
                state
            }
        }
    }

    fn is_enabled(self) -> bool {
        matches!(self, Self::EnableCalled | Self::Enabled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchScanMode {
    Disable = 0,
    /// Truncated results
    Pass = 1,
    /// Full results
    Active = 2,
    PassActive = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardRule {
    Oldest = 0,
    WeakestRssi = 1,
}

/// How the controller scans while batching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchScanParams {
    pub mode: BatchScanMode,
    /// 0.625 ms units
    pub scan_interval: u32,
    pub scan_window: u32,
    pub discard_rule: DiscardRule,
    pub own_addr_type: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchScanEvt {
    Config,
    Enable,
    Disable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchScanResult {
    pub evt: BatchScanEvt,
    pub status: BtmStatus,
    pub ref_value: u32,
}

/// Every record read out in one [`Btm::batch_scan_read_reports`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchScanReports {
    pub status: BtmStatus,
    pub mode: BatchScanMode,
    pub report_format: u8,
    pub num_records: u16,
    pub data: Vec<u8>,
    pub ref_value: u32,
}

enum PendingBatch {
    Feature { enable: bool },
    Setup { evt: BatchScanEvt, callback: Option<Completion<BatchScanResult>> },
    Read,
}

/// Report read in progress
struct ReadAccum {
    reports: BatchScanReports,
    callback: Completion<BatchScanReports>,
}

pub struct BatchScanManager {
    queue: CorrelatedQueue<PendingBatch>,
    state: BatchScanState,
    read: Option<ReadAccum>,
}

impl BatchScanManager {
    pub fn new(depth: usize) -> Self {
        Self { queue: CorrelatedQueue::new("batch scan", depth), state: BatchScanState::Invalid, read: None }
    }

    pub fn state(&self) -> BatchScanState {
        self.state
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_reading(&self) -> bool {
        self.read.is_some()
    }
}

impl Btm {
    pub fn batch_scan(&self) -> &BatchScanManager {
        &self.batch_scan
    }

    fn issue_batch_scan(&mut self, params: Vec<u8>, pending: PendingBatch, ref_value: u32) -> BtmResult<()> {
        let sub_opcode = params[0];
        debug!("batch scan command {}", hex::encode(&params));
        self.send(HciCommand::Vendor { ocf: OCF_VSC_BATCH_SCAN, params })?;
        self.batch_scan.queue.enqueue(sub_opcode, ref_value, pending)
    }

    /// Reserve room for `commands` plus a feature enable if one is needed
    fn batch_scan_prepare(&self, commands: usize) -> BtmResult<bool> {
        if self.controller.batch_scan_storage() == 0 {
            return Err(BtmError::ModeUnsupported);
        }
        let needs_enable = !self.batch_scan.state.is_enabled();
        self.batch_scan.queue.reserve_many(commands + usize::from(needs_enable))?;
        Ok(needs_enable)
    }

    fn batch_scan_feature(&mut self, enable: bool) -> BtmResult<()> {
        self.issue_batch_scan(
            vec![BATCH_SUB_ENB_DISAB_CUST_FEATURE, enable as u8],
            PendingBatch::Feature { enable },
            0,
        )?;
        self.batch_scan.state =
            if enable { BatchScanState::EnableCalled } else { BatchScanState::DisableCalled };
        Ok(())
    }

    /// Split controller storage and set the notification threshold
    ///
    /// `notify_threshold` is a percentage of storage use.
    pub fn batch_scan_set_storage(
        &mut self,
        max_full_pct: u8,
        max_trunc_pct: u8,
        notify_threshold: u8,
        ref_value: u32,
        callback: Option<Completion<BatchScanResult>>,
    ) -> BtmResult {
        if u16::from(max_full_pct) + u16::from(max_trunc_pct) > 100 || notify_threshold > 100 {
            return Err(BtmError::IllegalValue);
        }
        if self.batch_scan_prepare(1)? {
            self.batch_scan_feature(true)?;
        }
        self.issue_batch_scan(
            vec![BATCH_SUB_SET_STORAGE_PARAM, max_full_pct, max_trunc_pct, notify_threshold],
            PendingBatch::Setup { evt: BatchScanEvt::Config, callback },
            ref_value,
        )?;
        Ok(Issued::Started)
    }

    /// Start the controller scanning into its storage
    pub fn batch_scan_enable(
        &mut self,
        scan: BatchScanParams,
        ref_value: u32,
        callback: Option<Completion<BatchScanResult>>,
    ) -> BtmResult {
        if scan.mode == BatchScanMode::Disable || scan.scan_window == 0 || scan.scan_window > scan.scan_interval {
            return Err(BtmError::IllegalValue);
        }
        if self.batch_scan_prepare(1)? {
            self.batch_scan_feature(true)?;
        }

        let mut params = vec![BATCH_SUB_SET_PARAMS, scan.mode as u8];
        params.extend_from_slice(&scan.scan_interval.to_le_bytes());
        params.extend_from_slice(&scan.scan_window.to_le_bytes());
        params.push(scan.own_addr_type);
        params.push(scan.discard_rule as u8);
        self.issue_batch_scan(params, PendingBatch::Setup { evt: BatchScanEvt::Enable, callback }, ref_value)?;
        info!("batch scan enable mode {:?}", scan.mode);
        Ok(Issued::Started)
    }

    /// Stop batch scanning and switch the vendor feature off
    pub fn batch_scan_disable(
        &mut self,
        ref_value: u32,
        callback: Option<Completion<BatchScanResult>>,
    ) -> BtmResult {
        if self.controller.batch_scan_storage() == 0 {
            return Err(BtmError::ModeUnsupported);
        }
        if !self.batch_scan.state.is_enabled() {
            return Err(BtmError::WrongMode);
        }
        self.batch_scan.queue.reserve_many(2)?;

        let mut params = vec![BATCH_SUB_SET_PARAMS, BatchScanMode::Disable as u8];
        params.extend_from_slice(&[0; 10]);
        self.issue_batch_scan(params, PendingBatch::Setup { evt: BatchScanEvt::Disable, callback }, ref_value)?;
        self.batch_scan_feature(false)?;
        info!("batch scan disable");
        Ok(Issued::Started)
    }

    /// Pull every stored report of `mode` out of the controller
    pub fn batch_scan_read_reports(
        &mut self,
        mode: BatchScanMode,
        ref_value: u32,
        callback: Completion<BatchScanReports>,
    ) -> BtmResult {
        if !matches!(mode, BatchScanMode::Pass | BatchScanMode::Active) {
            return Err(BtmError::IllegalValue);
        }
        if self.controller.batch_scan_storage() == 0 {
            return Err(BtmError::ModeUnsupported);
        }
        if !self.batch_scan.state.is_enabled() {
            return Err(BtmError::WrongMode);
        }
        if self.batch_scan.read.is_some() {
            return Err(BtmError::Busy);
        }
        self.batch_scan.queue.reserve()?;

        self.issue_batch_scan(vec![BATCH_SUB_READ_RESULTS, mode as u8], PendingBatch::Read, ref_value)?;
        self.batch_scan.read = Some(ReadAccum {
            reports: BatchScanReports {
                status: BtmStatus::Success,
                mode,
                report_format: mode as u8,
                num_records: 0,
                data: Vec::new(),
                ref_value,
            },
            callback,
        });
        Ok(Issued::Started)
    }

    /// Completion of the vendor batch scan command
    pub fn on_batch_scan_vsc_complete(&mut self, params: &[u8]) {
        let Some((hci_status, sub_opcode, rest)) = super::split_vsc_complete(params) else {
            warn!("short batch scan completion: {}", hex::encode(params));
            if let Some(op) = self.batch_scan.queue.discard_head() {
                self.complete_batch_op(op, BtmStatus::ErrProcessing, &[]);
            }
            return;
        };
        match self.batch_scan.queue.dequeue(sub_opcode) {
            Ok(op) => self.complete_batch_op(op, BtmStatus::from_hci(hci_status), rest),
            Err(Some(discarded)) => self.complete_batch_op(discarded, BtmStatus::ErrProcessing, &[]),
            Err(None) => {}
        }
    }

    fn complete_batch_op(&mut self, op: PendingOp<PendingBatch>, status: BtmStatus, rest: &[u8]) {
        match op.payload {
            PendingBatch::Feature { enable } => {
                let state = self.batch_scan.state.on_feature_complete(status.is_success());
                debug!("batch scan feature {} -> {:?}", if enable { "on" } else { "off" }, state);
                self.batch_scan.state = state;
            }
            PendingBatch::Setup { evt, callback } => {
                if !status.is_success() {
                    warn!("batch scan {:?} failed: {:?}", evt, status);
                }
                if let Some(callback) = callback {
                    callback(BatchScanResult { evt, status, ref_value: op.ref_value });
                }
            }
            PendingBatch::Read => self.on_batch_scan_read(status, rest),
        }
    }

    fn on_batch_scan_read(&mut self, status: BtmStatus, rest: &[u8]) {
        let Some(mut accum) = self.batch_scan.read.take() else {
            warn!("batch scan read completion with no read in progress");
            return;
        };

        // report format, record count, records
        let fragment = match rest {
            [format, count, data @ ..] if status.is_success() => Some((*format, *count, data)),
            _ => None,
        };
        let Some((format, count, data)) = fragment else {
            // Abort and hand over what was gathered so far
            accum.reports.status =
                if status.is_success() { BtmStatus::ErrProcessing } else { status };
            (accum.callback)(accum.reports);
            return;
        };

        if count == 0 {
            debug!("batch scan read done, {} records", accum.reports.num_records);
            (accum.callback)(accum.reports);
            return;
        }

        accum.reports.report_format = format;
        accum.reports.num_records += u16::from(count);
        accum.reports.data.extend_from_slice(data);

        let mode = accum.reports.mode;
        let ref_value = accum.reports.ref_value;
        let next = self.batch_scan.queue.reserve().and_then(|()| {
            self.issue_batch_scan(vec![BATCH_SUB_READ_RESULTS, mode as u8], PendingBatch::Read, ref_value)
        });
        match next {
            Ok(()) => self.batch_scan.read = Some(accum),
            Err(err) => {
                warn!("batch scan follow-up read not sent: {}", err);
                accum.reports.status = err.into();
                (accum.callback)(accum.reports);
            }
        }
    }

    pub(crate) fn on_batch_scan_threshold_event(&mut self, _params: &[u8]) {
        info!("batch scan storage threshold reached");
        self.events.on_batch_scan_threshold();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BtmConfig;
    use crate::test_utils::{harness, harness_with, Captured, Event, Harness};

    fn sub_opcodes(hci: &crate::test_utils::MockHci) -> Vec<u8> {
        hci.take()
            .iter()
            .filter_map(|c| match c {
                HciCommand::Vendor { ocf: OCF_VSC_BATCH_SCAN, params } => params.first().copied(),
                _ => None,
            })
            .collect()
    }

    fn scan(mode: BatchScanMode, scan_interval: u32, scan_window: u32) -> BatchScanParams {
        BatchScanParams { mode, scan_interval, scan_window, discard_rule: DiscardRule::Oldest, own_addr_type: 0 }
    }

    fn enabled() -> Harness {
        let h = harness();
        let mut btm = h.btm;
        btm.batch_scan_set_storage(50, 50, 95, 0, None).unwrap();
        btm.on_batch_scan_vsc_complete(&[0, BATCH_SUB_ENB_DISAB_CUST_FEATURE]);
        btm.on_batch_scan_vsc_complete(&[0, BATCH_SUB_SET_STORAGE_PARAM]);
        h.hci.clear();
        Harness { btm, ..h }
    }

    #[test]
    fn test_storage_enables_feature_first() {
        let Harness { mut btm, hci, .. } = harness();
        let done = Captured::new();
        assert_eq!(btm.batch_scan_set_storage(40, 40, 90, 3, Some(done.callback())), Ok(Issued::Started));
        assert_eq!(sub_opcodes(&hci), vec![BATCH_SUB_ENB_DISAB_CUST_FEATURE, BATCH_SUB_SET_STORAGE_PARAM]);
        assert_eq!(btm.batch_scan().state(), BatchScanState::EnableCalled);

        btm.on_batch_scan_vsc_complete(&[0, BATCH_SUB_ENB_DISAB_CUST_FEATURE]);
        assert_eq!(btm.batch_scan().state(), BatchScanState::Enabled);
        btm.on_batch_scan_vsc_complete(&[0, BATCH_SUB_SET_STORAGE_PARAM]);
        assert_eq!(
            done.values(),
            vec![BatchScanResult { evt: BatchScanEvt::Config, status: BtmStatus::Success, ref_value: 3 }]
        );

        // Already enabled: no second feature command
        btm.batch_scan_set_storage(40, 40, 90, 4, None).unwrap();
        assert_eq!(sub_opcodes(&hci), vec![BATCH_SUB_SET_STORAGE_PARAM]);
    }

    #[test]
    fn test_fifo_correlation() {
        let Harness { mut btm, .. } = enabled();
        let a = Captured::new();
        let b = Captured::new();
        let c = Captured::new();
        btm.batch_scan_set_storage(10, 10, 50, 1, Some(a.callback())).unwrap();
        btm.batch_scan_enable(scan(BatchScanMode::Pass, 0x100, 0x50), 2, Some(b.callback())).unwrap();
        btm.batch_scan_set_storage(20, 20, 50, 3, Some(c.callback())).unwrap();

        btm.on_batch_scan_vsc_complete(&[0, BATCH_SUB_SET_STORAGE_PARAM]);
        btm.on_batch_scan_vsc_complete(&[0x01, BATCH_SUB_SET_PARAMS]);
        btm.on_batch_scan_vsc_complete(&[0, BATCH_SUB_SET_STORAGE_PARAM]);

        assert_eq!(a.values()[0].ref_value, 1);
        assert_eq!(b.values()[0].ref_value, 2);
        assert_eq!(b.values()[0].status, BtmStatus::ErrProcessing);
        assert_eq!(b.values()[0].evt, BatchScanEvt::Enable);
        assert_eq!(c.values()[0].ref_value, 3);
    }

    #[test]
    fn test_enable_params() {
        let Harness { mut btm, hci, .. } = enabled();
        let params = BatchScanParams {
            discard_rule: DiscardRule::WeakestRssi,
            own_addr_type: 1,
            ..scan(BatchScanMode::Active, 0x1000, 0x100)
        };
        btm.batch_scan_enable(params, 0, None).unwrap();
        assert_eq!(
            hci.take(),
            vec![HciCommand::Vendor {
                ocf: OCF_VSC_BATCH_SCAN,
                params: vec![BATCH_SUB_SET_PARAMS, 2, 0x00, 0x10, 0, 0, 0x00, 0x01, 0, 0, 1, 1],
            }]
        );
        assert_eq!(
            btm.batch_scan_enable(scan(BatchScanMode::Pass, 0x10, 0x20), 0, None),
            Err(BtmError::IllegalValue)
        );
    }

    #[test]
    fn test_disable() {
        let Harness { mut btm, hci, .. } = enabled();
        let done = Captured::new();
        btm.batch_scan_disable(5, Some(done.callback())).unwrap();
        assert_eq!(sub_opcodes(&hci), vec![BATCH_SUB_SET_PARAMS, BATCH_SUB_ENB_DISAB_CUST_FEATURE]);
        assert_eq!(btm.batch_scan().state(), BatchScanState::DisableCalled);

        btm.on_batch_scan_vsc_complete(&[0, BATCH_SUB_SET_PARAMS]);
        btm.on_batch_scan_vsc_complete(&[0, BATCH_SUB_ENB_DISAB_CUST_FEATURE]);
        assert_eq!(btm.batch_scan().state(), BatchScanState::Disabled);
        assert_eq!(done.values()[0].evt, BatchScanEvt::Disable);

        assert_eq!(btm.batch_scan_disable(0, None), Err(BtmError::WrongMode));
    }

    #[test]
    fn test_multi_fragment_read() {
        let Harness { mut btm, hci, .. } = enabled();
        let reports = Captured::new();
        btm.batch_scan_read_reports(BatchScanMode::Active, 9, reports.callback()).unwrap();
        assert_eq!(btm.batch_scan_read_reports(BatchScanMode::Active, 9, Box::new(|_| {})), Err(BtmError::Busy));

        btm.on_batch_scan_vsc_complete(&[0, BATCH_SUB_READ_RESULTS, 2, 2, 0xA1, 0xA2]);
        btm.on_batch_scan_vsc_complete(&[0, BATCH_SUB_READ_RESULTS, 2, 1, 0xB1]);
        assert!(reports.values().is_empty());
        btm.on_batch_scan_vsc_complete(&[0, BATCH_SUB_READ_RESULTS, 2, 0]);

        assert_eq!(sub_opcodes(&hci), vec![BATCH_SUB_READ_RESULTS; 3]);
        let got = &reports.values()[0];
        assert_eq!(got.num_records, 3);
        assert_eq!(got.data, vec![0xA1, 0xA2, 0xB1]);
        assert_eq!(got.ref_value, 9);
        assert_eq!(got.status, BtmStatus::Success);
        assert!(!btm.batch_scan().is_reading());
    }

    #[test]
    fn test_read_failure_delivers_partial() {
        let Harness { mut btm, .. } = enabled();
        let reports = Captured::new();
        btm.batch_scan_read_reports(BatchScanMode::Pass, 0, reports.callback()).unwrap();
        btm.on_batch_scan_vsc_complete(&[0, BATCH_SUB_READ_RESULTS, 1, 1, 0xC1]);
        btm.on_batch_scan_vsc_complete(&[0x1F, BATCH_SUB_READ_RESULTS]);

        let got = &reports.values()[0];
        assert_eq!(got.status, BtmStatus::ErrProcessing);
        assert_eq!(got.num_records, 1);
        assert_eq!(got.data, vec![0xC1]);
    }

    #[test]
    fn test_short_completion_fails_head() {
        let Harness { mut btm, .. } = enabled();
        let a = Captured::new();
        let b = Captured::new();
        btm.batch_scan_set_storage(10, 10, 50, 1, Some(a.callback())).unwrap();
        btm.batch_scan_set_storage(20, 20, 50, 2, Some(b.callback())).unwrap();

        // Unparseable: the head is failed, the next completion goes to B
        btm.on_batch_scan_vsc_complete(&[0x0C]);
        assert_eq!(
            a.values(),
            vec![BatchScanResult { evt: BatchScanEvt::Config, status: BtmStatus::ErrProcessing, ref_value: 1 }]
        );
        assert_eq!(btm.batch_scan().pending(), 1);

        btm.on_batch_scan_vsc_complete(&[0, BATCH_SUB_SET_STORAGE_PARAM]);
        assert_eq!(
            b.values(),
            vec![BatchScanResult { evt: BatchScanEvt::Config, status: BtmStatus::Success, ref_value: 2 }]
        );
        assert_eq!(a.values().len(), 1);
        assert_eq!(btm.batch_scan().pending(), 0);
    }

    #[test]
    fn test_mismatched_read_ends_read() {
        let Harness { mut btm, .. } = enabled();
        let reports = Captured::new();
        btm.batch_scan_read_reports(BatchScanMode::Pass, 4, reports.callback()).unwrap();
        btm.on_batch_scan_vsc_complete(&[0, BATCH_SUB_READ_RESULTS, 1, 1, 0xD1]);

        // Completion for another command while the follow-up read is at the head
        btm.on_batch_scan_vsc_complete(&[0, BATCH_SUB_SET_PARAMS]);
        assert_eq!(btm.batch_scan().pending(), 0);
        assert!(!btm.batch_scan().is_reading());

        let got = &reports.values()[0];
        assert_eq!(got.status, BtmStatus::ErrProcessing);
        assert_eq!(got.data, vec![0xD1]);
        assert_eq!(got.ref_value, 4);

        // A new read is accepted
        assert_eq!(
            btm.batch_scan_read_reports(BatchScanMode::Pass, 5, Box::new(|_| {})),
            Ok(Issued::Started)
        );
    }

    #[test]
    fn test_rejections() {
        let Harness { mut btm, .. } = harness();
        assert_eq!(
            btm.batch_scan_read_reports(BatchScanMode::Pass, 0, Box::new(|_| {})),
            Err(BtmError::WrongMode)
        );
        assert_eq!(btm.batch_scan_set_storage(60, 60, 10, 0, None), Err(BtmError::IllegalValue));

        let Harness { mut btm, .. } = harness_with(BtmConfig::default(), |c| c.batch_scan_storage = 0);
        assert_eq!(btm.batch_scan_set_storage(10, 10, 10, 0, None), Err(BtmError::ModeUnsupported));
    }

    #[test]
    fn test_threshold_event() {
        let Harness { mut btm, events, .. } = harness();
        btm.on_vendor_event(&[crate::ble::VSE_SUBCODE_BLE_THRESHOLD]);
        assert_eq!(events.events(), vec![Event::BatchScanThreshold]);
    }
}
