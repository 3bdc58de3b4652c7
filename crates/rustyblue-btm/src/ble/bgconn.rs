//! Background connection and white-list management
//!
//! The host keeps a mirror of the devices it wants in the controller white
//! list. Adds and removes are batched in a bounded pending list and only
//! written to the controller right before the list is used again, with every
//! white-list user (auto-connect, selective scan, advertising) paused first.

use std::collections::HashMap;

use bitflags::bitflags;
use log::{debug, info, warn};

use crate::ble::scan::{ScanActivity, ScanParams, SCAN_FILTER_WHITE_LIST, SCAN_TYPE_PASSIVE};
use crate::btm::Btm;
use crate::dev::ControllerLists;
use crate::error::{BtmError, BtmResult, BtmStatus, Issued};
use crate::hci::HciCommand;
use crate::inq::types::{BLE_EVT_CONN_ADV, BLE_EVT_CONN_DIR_ADV};
use crate::inq::LeAdvReport;
use crate::types::{AddressType, BdAddr, Transport};

/// Slow background scan, 0.625 ms units
pub const SCAN_SLOW_INT_1: u16 = 2048;
pub const SCAN_SLOW_WIN_1: u16 = 18;

/// Connection parameters used when initiating to the white list
pub const CONN_INT_MIN_DEF: u16 = 24;
pub const CONN_INT_MAX_DEF: u16 = 40;
pub const CONN_SLAVE_LATENCY_DEF: u16 = 0;
pub const CONN_TIMEOUT_DEF: u16 = 2000;

const INIT_FILTER_WHITE_LIST: u8 = 0x01;

bitflags! {
    /// White-list users currently running
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WlState: u8 {
        /// Auto-connect is initiating
        const INIT = 0x01;
        /// Selective connect is scanning
        const SCAN = 0x02;
        /// Advertising filters on the white list
        const ADV = 0x04;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BgConnType {
    #[default]
    None,
    Auto,
    Selective,
}

/// LE initiator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeConnState {
    #[default]
    Idle,
    BgConn,
    ConnCancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhiteListOp {
    Add,
    Remove,
    Clear,
}

/// Decides whether an advertiser seen by selective connect gets connected
pub type SelectCallback = Box<dyn FnMut(&BdAddr, &[u8]) -> bool>;

#[derive(Debug, Clone, Copy)]
struct BgConnDev {
    in_controller: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingWlOp {
    bd_addr: BdAddr,
    addr_type: AddressType,
    to_add: bool,
}

pub struct BgConnManager {
    background: HashMap<BdAddr, BgConnDev>,
    pending: Vec<PendingWlOp>,
    max_pending: usize,
    /// Commands sent and not yet completed, oldest first
    in_flight: Vec<WhiteListOp>,
    pub(crate) wl_state: WlState,
    pub(crate) conn_type: BgConnType,
    pub(crate) conn_state: LeConnState,
    white_list_size: u8,
    pub(crate) avail: u8,
    select_cb: Option<SelectCallback>,
}

impl BgConnManager {
    pub fn new(max_pending: usize, white_list_size: u8) -> Self {
        Self {
            background: HashMap::new(),
            pending: Vec::with_capacity(max_pending),
            max_pending,
            in_flight: Vec::new(),
            wl_state: WlState::empty(),
            conn_type: BgConnType::None,
            conn_state: LeConnState::Idle,
            white_list_size,
            avail: white_list_size,
            select_cb: None,
        }
    }

    pub fn wl_state(&self) -> WlState {
        self.wl_state
    }

    pub fn conn_type(&self) -> BgConnType {
        self.conn_type
    }

    pub fn conn_state(&self) -> LeConnState {
        self.conn_state
    }

    /// Free white-list slots as last reported by completions
    pub fn avail(&self) -> u8 {
        self.avail
    }

    pub fn pending_ops(&self) -> usize {
        self.pending.len()
    }

    pub fn contains(&self, addr: &BdAddr) -> bool {
        self.background.contains_key(addr)
    }

    /// The device is already written to the controller list
    pub fn in_controller(&self, addr: &BdAddr) -> bool {
        self.background.get(addr).is_some_and(|dev| dev.in_controller)
    }

    fn queued_adds(&self) -> usize {
        self.pending.iter().filter(|p| p.to_add).count()
    }

    /// Queue an add or remove and bring the mirror up to date
    fn queue_op(&mut self, op: PendingWlOp) -> bool {
        match self.pending.iter().position(|p| p.bd_addr == op.bd_addr) {
            // Opposite requests cancel out; the controller list stays as it is
            Some(idx) if self.pending[idx].to_add != op.to_add => {
                self.pending.remove(idx);
            }
            Some(_) => {}
            None if self.pending.len() >= self.max_pending => return false,
            None => self.pending.push(op),
        }

        if op.to_add {
            let in_controller = self.pending.iter().all(|p| p.bd_addr != op.bd_addr);
            self.background.entry(op.bd_addr).or_insert(BgConnDev { in_controller });
        } else {
            self.background.remove(&op.bd_addr);
        }
        true
    }
}

impl Btm {
    pub fn bgconn(&self) -> &BgConnManager {
        &self.bgconn
    }

    /// Add `bd_addr` to, or remove it from, the background connection list
    pub fn update_white_list(&mut self, to_add: bool, bd_addr: BdAddr) -> BtmResult {
        if !self.controller.supports_ble() {
            return Err(BtmError::ModeUnsupported);
        }
        let known = self.bgconn.contains(&bd_addr);
        if to_add {
            if self.bgconn.in_controller(&bd_addr) {
                return Ok(Issued::Done);
            }
            if !known && usize::from(self.bgconn.avail) <= self.bgconn.queued_adds() {
                debug!("white list full, {} not added", bd_addr);
                return Err(BtmError::NoResources);
            }
        } else if !known {
            return Err(BtmError::UnknownAddr);
        }

        let addr_type = self.white_list_addr_type(&bd_addr);
        let op = PendingWlOp { bd_addr, addr_type, to_add };

        let suspended = self.suspend_wl_activity();
        let queued = self.bgconn.queue_op(op);
        self.resume_wl_activity(suspended);

        if !queued {
            warn!("white-list pending ops full");
            return Err(BtmError::NoResources);
        }
        Ok(Issued::Done)
    }

    /// Empty the controller white list and the host mirror
    pub fn clear_white_list(&mut self) -> BtmResult {
        if !self.controller.supports_ble() {
            return Err(BtmError::ModeUnsupported);
        }
        let suspended = self.suspend_wl_activity();
        let sent = self.send(HciCommand::LeClearWhiteList);
        if sent.is_ok() {
            self.bgconn.in_flight.push(WhiteListOp::Clear);
            self.bgconn.pending.clear();
            self.bgconn.background.clear();
        }
        self.resume_wl_activity(suspended);
        sent.map(|()| Issued::Started)
    }

    /// Something in the mirror still has no LE link
    pub fn is_bg_conn_pending(&self) -> bool {
        self.bgconn
            .background
            .keys()
            .any(|addr| self.acl.find(addr, Transport::Le).is_none())
    }

    /// Pick how the white list is used to connect
    pub fn set_bg_conn_type(
        &mut self,
        conn_type: BgConnType,
        select_cb: Option<SelectCallback>,
    ) -> BtmResult {
        if !self.controller.supports_ble() {
            return Err(BtmError::ModeUnsupported);
        }
        debug!("bg conn type {:?} -> {:?}", self.bgconn.conn_type, conn_type);
        if conn_type == self.bgconn.conn_type {
            if conn_type == BgConnType::Selective {
                self.bgconn.select_cb = select_cb;
            }
            return Ok(Issued::Done);
        }

        match self.bgconn.conn_type {
            BgConnType::Auto => {
                self.start_auto_conn(false);
            }
            BgConnType::Selective => {
                self.start_select_conn(false);
                self.bgconn.select_cb = None;
            }
            BgConnType::None => {}
        }

        match conn_type {
            BgConnType::Auto => {
                self.bgconn.conn_type = conn_type;
                self.start_auto_conn(true);
            }
            BgConnType::Selective => {
                if self.le_scan.activity.intersects(ScanActivity::INQUIRY_MASK | ScanActivity::OBSERVE)
                {
                    self.bgconn.conn_type = BgConnType::None;
                    return Err(BtmError::Busy);
                }
                self.bgconn.select_cb = select_cb;
                self.bgconn.conn_type = conn_type;
                self.start_select_conn(true);
            }
            BgConnType::None => self.bgconn.conn_type = conn_type,
        }
        Ok(Issued::Done)
    }

    fn white_list_addr_type(&self, bd_addr: &BdAddr) -> AddressType {
        let Some(record) = self.devices.find(bd_addr) else {
            return AddressType::Public;
        };
        match record.ble.static_addr {
            Some((addr_type, _))
                if record.ble.in_controller_list.contains(ControllerLists::RESOLVING_LIST) =>
            {
                addr_type
            }
            _ => record.ble.ble_addr_type,
        }
    }

    /// Write the batched adds and removes to the controller
    pub(crate) fn execute_wl_ops(&mut self) {
        let ops = std::mem::take(&mut self.bgconn.pending);
        for op in ops {
            let command = if op.to_add {
                HciCommand::LeAddDeviceToWhiteList { addr_type: op.addr_type.into(), bd_addr: op.bd_addr }
            } else {
                HciCommand::LeRemoveDeviceFromWhiteList { addr_type: op.addr_type.into(), bd_addr: op.bd_addr }
            };
            if let Err(err) = self.send(command) {
                warn!("white-list update for {} not sent: {}", op.bd_addr, err);
                continue;
            }

            if op.to_add {
                self.bgconn.in_flight.push(WhiteListOp::Add);
                if let Some(dev) = self.bgconn.background.get_mut(&op.bd_addr) {
                    dev.in_controller = true;
                }
            } else {
                self.bgconn.in_flight.push(WhiteListOp::Remove);
            }
            if let Some(record) = self.devices.find_mut(&op.bd_addr) {
                record.ble.in_controller_list.set(ControllerLists::WHITE_LIST, op.to_add);
            }
        }
    }

    /// Start or stop initiating to the whole white list
    pub(crate) fn start_auto_conn(&mut self, start: bool) -> bool {
        if start {
            if self.bgconn.conn_state != LeConnState::Idle {
                return false;
            }
            self.execute_wl_ops();
            if !self.is_bg_conn_pending() {
                return false;
            }
            let sent = self.send(HciCommand::LeCreateConnection {
                scan_interval: SCAN_SLOW_INT_1,
                scan_window: SCAN_SLOW_WIN_1,
                initiator_filter_policy: INIT_FILTER_WHITE_LIST,
                peer_addr_type: 0,
                peer_addr: BdAddr::ANY,
                own_addr_type: self.le_scan.own_addr_type,
                conn_interval_min: CONN_INT_MIN_DEF,
                conn_interval_max: CONN_INT_MAX_DEF,
                conn_latency: CONN_SLAVE_LATENCY_DEF,
                supervision_timeout: CONN_TIMEOUT_DEF,
            });
            if let Err(err) = sent {
                warn!("auto connect not started: {}", err);
                return false;
            }
            info!("auto connect started");
            self.bgconn.conn_state = LeConnState::BgConn;
            self.bgconn.wl_state.insert(WlState::INIT);
            true
        } else {
            if self.bgconn.conn_state != LeConnState::BgConn {
                return false;
            }
            if let Err(err) = self.send(HciCommand::LeCreateConnectionCancel) {
                warn!("auto connect cancel not sent: {}", err);
                return false;
            }
            debug!("auto connect stopped");
            self.bgconn.conn_state = LeConnState::ConnCancel;
            self.bgconn.wl_state.remove(WlState::INIT);
            true
        }
    }

    /// Start or stop the passive white-list scan of selective connect
    pub(crate) fn start_select_conn(&mut self, start: bool) -> bool {
        if start {
            if self.le_scan.activity.intersects(ScanActivity::INQUIRY_MASK | ScanActivity::OBSERVE) {
                debug!("selective connect waits for the scanner");
                return false;
            }
            self.execute_wl_ops();
            let started = self.le_scan_start(ScanParams {
                scan_type: SCAN_TYPE_PASSIVE,
                interval: SCAN_SLOW_INT_1,
                window: SCAN_SLOW_WIN_1,
                filter_policy: SCAN_FILTER_WHITE_LIST,
            });
            if let Err(err) = started {
                warn!("selective connect not started: {}", err);
                return false;
            }
            self.le_scan.activity.insert(ScanActivity::SELECTIVE_CONN);
            self.bgconn.wl_state.insert(WlState::SCAN);
            true
        } else {
            if !self.le_scan.activity.contains(ScanActivity::SELECTIVE_CONN) {
                return false;
            }
            self.le_scan.activity.remove(ScanActivity::SELECTIVE_CONN);
            self.bgconn.wl_state.remove(WlState::SCAN);
            self.le_scan_release();
            true
        }
    }

    /// Stop whichever background connect runs; true if one was stopped
    pub(crate) fn suspend_bg_conn(&mut self) -> bool {
        match self.bgconn.conn_type {
            BgConnType::Auto => self.start_auto_conn(false),
            BgConnType::Selective => self.start_select_conn(false),
            BgConnType::None => false,
        }
    }

    pub(crate) fn resume_bg_conn(&mut self) -> bool {
        match self.bgconn.conn_type {
            BgConnType::Auto => self.start_auto_conn(true),
            BgConnType::Selective => self.start_select_conn(true),
            BgConnType::None => false,
        }
    }

    /// Pause every white-list user, returning what was running
    pub(crate) fn suspend_wl_activity(&mut self) -> WlState {
        let state = self.bgconn.wl_state;
        if state.contains(WlState::INIT) {
            self.start_auto_conn(false);
        }
        if state.contains(WlState::SCAN) {
            self.start_select_conn(false);
        }
        if state.contains(WlState::ADV) {
            self.le_adv_suspend();
        }
        state
    }

    pub(crate) fn resume_wl_activity(&mut self, state: WlState) {
        self.resume_bg_conn();
        if state.contains(WlState::ADV) {
            self.le_adv_resume();
        }
    }

    /// Completion of an LE white-list command
    pub fn on_white_list_complete(&mut self, op: WhiteListOp, hci_status: u8) {
        match self.bgconn.in_flight.first() {
            Some(head) if *head == op => {
                self.bgconn.in_flight.remove(0);
            }
            head => {
                warn!("white-list completion {:?} does not match {:?}", op, head);
                return;
            }
        }

        let status = BtmStatus::from_hci(hci_status);
        if status.is_success() {
            let bgconn = &mut self.bgconn;
            match op {
                WhiteListOp::Add => bgconn.avail = bgconn.avail.saturating_sub(1),
                WhiteListOp::Remove => {
                    bgconn.avail = bgconn.avail.saturating_add(1).min(bgconn.white_list_size)
                }
                WhiteListOp::Clear => bgconn.avail = bgconn.white_list_size,
            }
        } else {
            warn!("white-list {:?} failed: {:#04x}", op, hci_status);
        }
        self.events.on_white_list_complete(op, status);
    }

    /// An LE connection attempt finished (success or not)
    pub fn on_le_conn_complete(&mut self, hci_status: u8, bd_addr: BdAddr) {
        debug!("LE connection complete {} status {:#04x}", bd_addr, hci_status);
        if self.bgconn.conn_state != LeConnState::Idle {
            self.bgconn.conn_state = LeConnState::Idle;
            self.bgconn.wl_state.remove(WlState::INIT);
        }
        if self.bgconn.conn_type == BgConnType::Auto {
            self.start_auto_conn(true);
        }
    }

    /// Drop `bd_addr` from the background list unless it is connected
    pub fn bg_conn_cancel_if_disconnected(&mut self, bd_addr: BdAddr) {
        if self.bgconn.conn_state != LeConnState::BgConn || !self.bgconn.contains(&bd_addr) {
            return;
        }
        if self.acl.find(&bd_addr, Transport::Le).is_none() {
            if let Err(err) = self.update_white_list(false, bd_addr) {
                warn!("{} not removed from white list: {}", bd_addr, err);
            }
        }
    }

    /// Offer a white-listed advertiser to the selection callback
    pub(crate) fn process_selective_conn_report(&mut self, report: &LeAdvReport) {
        if !matches!(report.evt_type, BLE_EVT_CONN_ADV | BLE_EVT_CONN_DIR_ADV) {
            return;
        }
        let Some(select) = self.bgconn.select_cb.as_mut() else {
            return;
        };
        if select(&report.bd_addr, &report.data) {
            info!("selective connect chose {}", report.bd_addr);
            self.events.on_le_select_conn(report.bd_addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::test_utils::{addr, harness, Event, Harness};

    fn is_wl_add(c: &HciCommand) -> bool {
        matches!(c, HciCommand::LeAddDeviceToWhiteList { .. })
    }

    fn is_create_conn(c: &HciCommand) -> bool {
        matches!(c, HciCommand::LeCreateConnection { .. })
    }

    #[test]
    fn test_ops_batched_until_used() {
        let Harness { mut btm, hci, .. } = harness();
        btm.update_white_list(true, addr(1)).unwrap();
        btm.update_white_list(true, addr(2)).unwrap();

        assert!(hci.sent().is_empty());
        assert_eq!(btm.bgconn().pending_ops(), 2);
        assert!(btm.is_bg_conn_pending());

        btm.set_bg_conn_type(BgConnType::Auto, None).unwrap();
        let sent = hci.take();
        assert_eq!(sent.iter().filter(|c| is_wl_add(c)).count(), 2);
        // The list is flushed before the initiator uses it
        assert!(is_create_conn(sent.last().unwrap()));
        assert_eq!(btm.bgconn().pending_ops(), 0);
        assert!(btm.bgconn().in_controller(&addr(1)));
        assert_eq!(btm.bgconn().wl_state(), WlState::INIT);
        assert_eq!(btm.bgconn().conn_state(), LeConnState::BgConn);
    }

    #[test]
    fn test_auto_conn_targets_white_list() {
        let Harness { mut btm, hci, .. } = harness();
        btm.update_white_list(true, addr(1)).unwrap();
        btm.set_bg_conn_type(BgConnType::Auto, None).unwrap();

        let create = hci.sent().into_iter().find(is_create_conn).unwrap();
        match create {
            HciCommand::LeCreateConnection {
                initiator_filter_policy,
                peer_addr,
                scan_interval,
                scan_window,
                ..
            } => {
                assert_eq!(initiator_filter_policy, INIT_FILTER_WHITE_LIST);
                assert_eq!(peer_addr, BdAddr::ANY);
                assert_eq!((scan_interval, scan_window), (SCAN_SLOW_INT_1, SCAN_SLOW_WIN_1));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_auto_conn_waits_for_devices() {
        let Harness { mut btm, hci, .. } = harness();
        btm.set_bg_conn_type(BgConnType::Auto, None).unwrap();
        assert!(hci.sent().is_empty());
        assert_eq!(btm.bgconn().conn_state(), LeConnState::Idle);

        // Adding a device resumes the background connect
        btm.update_white_list(true, addr(1)).unwrap();
        assert_eq!(hci.count(is_wl_add), 1);
        assert_eq!(hci.count(is_create_conn), 1);
    }

    #[test]
    fn test_update_suspends_auto_conn() {
        let Harness { mut btm, hci, .. } = harness();
        btm.update_white_list(true, addr(1)).unwrap();
        btm.set_bg_conn_type(BgConnType::Auto, None).unwrap();
        hci.clear();

        btm.update_white_list(true, addr(2)).unwrap();
        let sent = hci.take();
        assert_eq!(sent[0], HciCommand::LeCreateConnectionCancel);
        // Cancel must complete before the initiator restarts
        assert_eq!(sent.len(), 1);
        assert_eq!(btm.bgconn().conn_state(), LeConnState::ConnCancel);

        btm.on_le_conn_complete(0x02, BdAddr::ANY);
        let sent = hci.take();
        assert!(is_wl_add(&sent[0]));
        assert!(is_create_conn(&sent[1]));
    }

    #[test]
    fn test_pending_ops_coalesce_and_bound() {
        let config = crate::config::BtmConfig { max_bg_conn_pending: 2, ..Default::default() };
        let Harness { mut btm, .. } = crate::test_utils::harness_with(config, |c| c.white_list_size = 8);

        btm.update_white_list(true, addr(1)).unwrap();
        btm.update_white_list(true, addr(1)).unwrap();
        btm.update_white_list(true, addr(2)).unwrap();
        assert_eq!(btm.bgconn().pending_ops(), 2);
        assert_eq!(btm.update_white_list(true, addr(3)), Err(BtmError::NoResources));
        assert!(!btm.bgconn().contains(&addr(3)));

        // Removing a device never written just forgets it
        btm.update_white_list(false, addr(2)).unwrap();
        assert_eq!(btm.bgconn().pending_ops(), 1);
        assert!(!btm.bgconn().contains(&addr(2)));
        assert_eq!(btm.update_white_list(false, addr(2)), Err(BtmError::UnknownAddr));
    }

    #[test]
    fn test_white_list_capacity() {
        let Harness { mut btm, events, .. } =
            crate::test_utils::harness_with(Default::default(), |c| c.white_list_size = 1);
        btm.update_white_list(true, addr(1)).unwrap();
        btm.set_bg_conn_type(BgConnType::Auto, None).unwrap();
        btm.on_white_list_complete(WhiteListOp::Add, 0);

        assert_eq!(btm.bgconn().avail(), 0);
        assert_eq!(btm.update_white_list(true, addr(2)), Err(BtmError::NoResources));
        assert!(events.events().contains(&Event::WhiteListComplete(WhiteListOp::Add, BtmStatus::Success)));

        // Completions out of order are dropped
        btm.on_white_list_complete(WhiteListOp::Remove, 0);
        assert_eq!(btm.bgconn().avail(), 0);
    }

    #[test]
    fn test_remove_and_clear() {
        let Harness { mut btm, hci, .. } = harness();
        btm.update_white_list(true, addr(1)).unwrap();
        btm.set_bg_conn_type(BgConnType::Auto, None).unwrap();
        btm.on_white_list_complete(WhiteListOp::Add, 0);
        btm.on_le_conn_complete(0, addr(1));
        assert_eq!(btm.bgconn().avail(), 3);

        btm.update_white_list(false, addr(1)).unwrap();
        assert!(!btm.is_bg_conn_pending());
        // The removal is written once the initiator has stopped
        btm.on_le_conn_complete(0x02, BdAddr::ANY);
        assert_eq!(btm.bgconn().conn_state(), LeConnState::Idle);
        assert_eq!(hci.count(|c| matches!(c, HciCommand::LeRemoveDeviceFromWhiteList { .. })), 1);
        btm.on_white_list_complete(WhiteListOp::Remove, 0);
        assert_eq!(btm.bgconn().avail(), 4);

        // Written straight away while auto connect is idle
        btm.update_white_list(true, addr(2)).unwrap();
        btm.on_white_list_complete(WhiteListOp::Add, 0);
        assert_eq!(btm.bgconn().avail(), 3);

        assert_eq!(btm.clear_white_list(), Ok(Issued::Started));
        assert!(!btm.bgconn().contains(&addr(2)));
        assert_eq!(btm.bgconn().pending_ops(), 0);
        btm.on_white_list_complete(WhiteListOp::Clear, 0);
        assert_eq!(btm.bgconn().avail(), 4);
    }

    #[test]
    fn test_selective_conn() {
        let Harness { mut btm, hci, events, .. } = harness();
        btm.update_white_list(true, addr(1)).unwrap();

        let offered = Rc::new(RefCell::new(Vec::new()));
        let sink = offered.clone();
        let select: SelectCallback = Box::new(move |addr, _data| {
            sink.borrow_mut().push(*addr);
            true
        });
        btm.set_bg_conn_type(BgConnType::Selective, Some(select)).unwrap();

        assert!(btm.le_scan().is_enabled());
        assert_eq!(btm.le_scan().params().unwrap().filter_policy, SCAN_FILTER_WHITE_LIST);
        assert_eq!(btm.le_scan().params().unwrap().scan_type, SCAN_TYPE_PASSIVE);
        assert_eq!(btm.bgconn().wl_state(), WlState::SCAN);
        assert_eq!(hci.count(is_wl_add), 1);

        let mut report = LeAdvReport {
            evt_type: BLE_EVT_CONN_ADV,
            addr_type: AddressType::Public,
            bd_addr: addr(1),
            data: vec![],
            rssi: -50,
        };
        btm.on_le_adv_report(&report);
        report.evt_type = crate::inq::types::BLE_EVT_NON_CONN_ADV;
        btm.on_le_adv_report(&report);

        assert_eq!(*offered.borrow(), vec![addr(1)]);
        assert_eq!(events.events(), vec![Event::LeSelectConn(addr(1))]);

        btm.set_bg_conn_type(BgConnType::None, None).unwrap();
        assert!(!btm.le_scan().is_enabled());
        assert!(btm.le_scan().activity().is_empty());
    }

    #[test]
    fn test_selective_conn_busy_while_inquiring() {
        let Harness { mut btm, .. } = harness();
        btm.le_scan.activity.insert(ScanActivity::INQUIRY_GENERAL);
        assert_eq!(btm.set_bg_conn_type(BgConnType::Selective, None), Err(BtmError::Busy));
        assert_eq!(btm.bgconn().conn_type(), BgConnType::None);
    }

    #[test]
    fn test_advertising_paused_for_update() {
        let Harness { mut btm, hci, .. } = harness();
        btm.set_le_advertising(true, true).unwrap();
        assert_eq!(btm.bgconn().wl_state(), WlState::ADV);
        hci.clear();

        btm.update_white_list(true, addr(1)).unwrap();
        assert_eq!(
            hci.take(),
            vec![
                HciCommand::LeSetAdvertisingEnable { enable: false },
                HciCommand::LeSetAdvertisingEnable { enable: true },
            ]
        );
        assert!(btm.le_adv().is_enabled());
    }

    #[test]
    fn test_no_ble() {
        let Harness { mut btm, .. } = crate::test_utils::harness_with(Default::default(), |c| c.ble = false);
        assert_eq!(btm.update_white_list(true, addr(1)), Err(BtmError::ModeUnsupported));
        assert_eq!(btm.set_bg_conn_type(BgConnType::Auto, None), Err(BtmError::ModeUnsupported));
    }
}
