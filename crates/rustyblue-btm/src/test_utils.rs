//! Mocks shared by the unit tests
//!
//! Each mock is a cheap handle over `Rc<RefCell<..>>` so a test keeps one
//! clone for inspection while [`Btm`] owns the other.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::time::Duration;

use crate::acl::PacketTypes;
use crate::ble::{ResolvingListEvent, WhiteListOp};
use crate::btm::Btm;
use crate::callbacks::{BtmEvents, BusyLevelUpdate, Completion};
use crate::config::BtmConfig;
use crate::controller::Controller;
use crate::error::{BtmStatus, HciError};
use crate::hci::{HciCommand, HciTransport};
use crate::timer::{BtmTimer, TimerService};
use crate::types::{BdAddr, LinkRole, Transport};

#[derive(Default)]
struct HciState {
    sent: Vec<HciCommand>,
    reject: bool,
}

/// Records every command; optionally rejects them all
#[derive(Clone, Default)]
pub struct MockHci {
    state: Rc<RefCell<HciState>>,
}

impl MockHci {
    pub fn sent(&self) -> Vec<HciCommand> {
        self.state.borrow().sent.clone()
    }

    pub fn take(&self) -> Vec<HciCommand> {
        std::mem::take(&mut self.state.borrow_mut().sent)
    }

    pub fn clear(&self) {
        self.state.borrow_mut().sent.clear();
    }

    pub fn set_reject(&self, reject: bool) {
        self.state.borrow_mut().reject = reject;
    }

    pub fn count(&self, pred: impl Fn(&HciCommand) -> bool) -> usize {
        self.state.borrow().sent.iter().filter(|c| pred(c)).count()
    }
}

impl HciTransport for MockHci {
    fn send_command(&mut self, command: HciCommand) -> Result<(), HciError> {
        let mut state = self.state.borrow_mut();
        if state.reject {
            return Err(HciError::QueueFull);
        }
        state.sent.push(command);
        Ok(())
    }
}

/// Settable controller capabilities
pub struct ControllerState {
    pub up: bool,
    pub bredr_features: [u8; 8],
    pub le_features: [u8; 8],
    pub ble: bool,
    pub privacy: bool,
    pub acl_packet_types: u16,
    pub white_list_size: u8,
    pub resolving_list_size: u8,
    pub vendor_irk_list_size: u8,
    pub multi_adv_instances: u8,
    pub adv_filter_count: u8,
    pub batch_scan_storage: u16,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            up: true,
            // 3/5 slot, encryption, switch, sniff | EDR 2/3M, RSSI inquiry |
            // 3-slot EDR | 5-slot EDR, pause encryption | EIR, SSP | ext features
            bredr_features: [0xA7, 0x00, 0x00, 0x46, 0x80, 0x05, 0x09, 0x80],
            le_features: [0x08, 0, 0, 0, 0, 0, 0, 0],
            ble: true,
            privacy: true,
            acl_packet_types: PacketTypes::SUPPORTED.bits(),
            white_list_size: 4,
            resolving_list_size: 4,
            vendor_irk_list_size: 4,
            multi_adv_instances: 4,
            adv_filter_count: 4,
            batch_scan_storage: 1024,
        }
    }
}

#[derive(Clone, Default)]
pub struct MockController {
    state: Rc<RefCell<ControllerState>>,
}

impl MockController {
    pub fn with(&self, f: impl FnOnce(&mut ControllerState)) {
        f(&mut self.state.borrow_mut());
    }
}

impl Controller for MockController {
    fn is_up(&self) -> bool {
        self.state.borrow().up
    }

    fn bredr_features(&self) -> [u8; 8] {
        self.state.borrow().bredr_features
    }

    fn le_features(&self) -> [u8; 8] {
        self.state.borrow().le_features
    }

    fn supports_ble(&self) -> bool {
        self.state.borrow().ble
    }

    fn supports_ble_privacy(&self) -> bool {
        self.state.borrow().privacy
    }

    fn acl_packet_types(&self) -> u16 {
        self.state.borrow().acl_packet_types
    }

    fn white_list_size(&self) -> u8 {
        self.state.borrow().white_list_size
    }

    fn resolving_list_size(&self) -> u8 {
        self.state.borrow().resolving_list_size
    }

    fn vendor_irk_list_size(&self) -> u8 {
        self.state.borrow().vendor_irk_list_size
    }

    fn multi_adv_instances(&self) -> u8 {
        self.state.borrow().multi_adv_instances
    }

    fn adv_filter_count(&self) -> u8 {
        self.state.borrow().adv_filter_count
    }

    fn batch_scan_storage(&self) -> u16 {
        self.state.borrow().batch_scan_storage
    }
}

/// Tracks which timers are armed
#[derive(Clone, Default)]
pub struct MockTimers {
    armed: Rc<RefCell<HashSet<BtmTimer>>>,
}

impl MockTimers {
    pub fn is_armed(&self, timer: BtmTimer) -> bool {
        self.armed.borrow().contains(&timer)
    }
}

impl TimerService for MockTimers {
    fn start(&mut self, timer: BtmTimer, _timeout: Duration) {
        self.armed.borrow_mut().insert(timer);
    }

    fn stop(&mut self, timer: BtmTimer) {
        self.armed.borrow_mut().remove(&timer);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    BusyLevel(BusyLevelUpdate),
    LinkUp(BdAddr, u16, Transport),
    LinkDown(BdAddr, u16, Transport),
    RoleChanged(BdAddr, LinkRole, u8),
    Collision(BdAddr),
    LeRemoteNameRequest(BdAddr),
    LeRemoteNameCancel(BdAddr),
    WhiteListComplete(WhiteListOp, BtmStatus),
    LeSelectConn(BdAddr),
    ResolvingList(ResolvingListEvent),
    BatchScanThreshold,
}

/// Captures every upward notification
#[derive(Clone, Default)]
pub struct RecordingEvents {
    log: Rc<RefCell<Vec<Event>>>,
}

impl RecordingEvents {
    pub fn events(&self) -> Vec<Event> {
        self.log.borrow().clone()
    }

    pub fn clear(&self) {
        self.log.borrow_mut().clear();
    }

    pub fn busy_levels(&self) -> Vec<BusyLevelUpdate> {
        self.log
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::BusyLevel(update) => Some(*update),
                _ => None,
            })
            .collect()
    }
}

impl BtmEvents for RecordingEvents {
    fn on_busy_level(&mut self, update: BusyLevelUpdate) {
        self.log.borrow_mut().push(Event::BusyLevel(update));
    }

    fn on_link_up(&mut self, bd_addr: BdAddr, handle: u16, transport: Transport) {
        self.log.borrow_mut().push(Event::LinkUp(bd_addr, handle, transport));
    }

    fn on_link_down(&mut self, bd_addr: BdAddr, handle: u16, transport: Transport) {
        self.log.borrow_mut().push(Event::LinkDown(bd_addr, handle, transport));
    }

    fn on_role_changed(&mut self, bd_addr: BdAddr, new_role: LinkRole, hci_status: u8) {
        self.log.borrow_mut().push(Event::RoleChanged(bd_addr, new_role, hci_status));
    }

    fn on_connection_collision(&mut self, bd_addr: BdAddr) {
        self.log.borrow_mut().push(Event::Collision(bd_addr));
    }

    fn on_le_remote_name_request(&mut self, bd_addr: BdAddr) {
        self.log.borrow_mut().push(Event::LeRemoteNameRequest(bd_addr));
    }

    fn on_le_remote_name_cancel(&mut self, bd_addr: BdAddr) {
        self.log.borrow_mut().push(Event::LeRemoteNameCancel(bd_addr));
    }

    fn on_white_list_complete(&mut self, op: WhiteListOp, status: BtmStatus) {
        self.log.borrow_mut().push(Event::WhiteListComplete(op, status));
    }

    fn on_le_select_conn(&mut self, bd_addr: BdAddr) {
        self.log.borrow_mut().push(Event::LeSelectConn(bd_addr));
    }

    fn on_resolving_list(&mut self, event: ResolvingListEvent) {
        self.log.borrow_mut().push(Event::ResolvingList(event));
    }

    fn on_batch_scan_threshold(&mut self) {
        self.log.borrow_mut().push(Event::BatchScanThreshold);
    }
}

/// A [`Btm`] wired to mocks, with handles kept for inspection
pub struct Harness {
    pub btm: Btm,
    pub hci: MockHci,
    pub controller: MockController,
    pub timers: MockTimers,
    pub events: RecordingEvents,
}

pub fn harness() -> Harness {
    harness_with(BtmConfig::default(), |_| {})
}

pub fn harness_with(config: BtmConfig, setup: impl FnOnce(&mut ControllerState)) -> Harness {
    let hci = MockHci::default();
    let controller = MockController::default();
    controller.with(setup);
    let timers = MockTimers::default();
    let events = RecordingEvents::default();
    let btm = Btm::new(config, hci.clone(), controller.clone(), timers.clone(), events.clone());
    Harness { btm, hci, controller, timers, events }
}

/// Collects values handed to a completion callback
pub struct Captured<T>(Rc<RefCell<Vec<T>>>);

impl<T: Clone + 'static> Captured<T> {
    pub fn new() -> Self {
        Captured(Rc::new(RefCell::new(Vec::new())))
    }

    pub fn callback(&self) -> Completion<T> {
        let sink = self.0.clone();
        Box::new(move |value| sink.borrow_mut().push(value))
    }

    pub fn values(&self) -> Vec<T> {
        self.0.borrow().clone()
    }
}

pub fn addr(last: u8) -> BdAddr {
    BdAddr::new([last, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA])
}
