//! Resolving list (controller address resolution)
//!
//! Controllers with LL privacy get the standard resolving-list commands.
//! Older controllers may offer a vendor IRK list instead, addressed by slot;
//! a bitmap tracks which slots are taken. Either way every command is
//! correlated with its completion through a [`CorrelatedQueue`], and the list
//! is only touched while advertising, scanning and background connect are
//! paused.

use bitflags::bitflags;
use log::{debug, info, warn};

use crate::btm::Btm;
use crate::dev::ControllerLists;
use crate::error::{BtmError, BtmResult, BtmStatus, Issued};
use crate::hci::constants::OCF_VSC_RPA_OFFLOAD;
use crate::hci::HciCommand;
use crate::queue::{CorrelatedQueue, PendingOp};
use crate::types::{AddressType, BdAddr};

/// Sub-opcodes of the vendor RPA offload command; also used to key the
/// standard commands in the pending queue
pub const RPA_SUB_ENABLE: u8 = 0x01;
pub const RPA_SUB_ADD_IRK: u8 = 0x02;
pub const RPA_SUB_REMOVE_IRK: u8 = 0x03;
pub const RPA_SUB_CLEAR_IRK: u8 = 0x04;
pub const RPA_SUB_READ_IRK: u8 = 0x05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivacyMode {
    /// Controller implements the standard resolving list
    Standard,
    /// Vendor IRK list only
    Vendor,
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvingListOp {
    Add,
    Remove,
    Clear,
    Read,
    SetResolution,
}

impl ResolvingListOp {
    fn from_sub_opcode(sub_opcode: u8) -> Option<Self> {
        match sub_opcode {
            RPA_SUB_ENABLE => Some(Self::SetResolution),
            RPA_SUB_ADD_IRK => Some(Self::Add),
            RPA_SUB_REMOVE_IRK => Some(Self::Remove),
            RPA_SUB_CLEAR_IRK => Some(Self::Clear),
            RPA_SUB_READ_IRK => Some(Self::Read),
            _ => None,
        }
    }
}

/// Completion of a resolving-list operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvingListEvent {
    pub op: ResolvingListOp,
    pub status: BtmStatus,
    /// Device the operation was about, if any
    pub bd_addr: Option<BdAddr>,
    /// Address returned by a read
    pub rpa: Option<BdAddr>,
}

bitflags! {
    /// Activities paused around a resolving-list change
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SuspendedActivity: u8 {
        const ADV = 0x01;
        const SCAN = 0x02;
        const BG_CONN = 0x04;
    }
}

/// Payload kept with each issued command
#[derive(Debug, Clone, Copy)]
struct PendingRl {
    bd_addr: Option<BdAddr>,
    enable: bool,
}

pub struct PrivacyManager {
    mode: PrivacyMode,
    queue: CorrelatedQueue<PendingRl>,
    max_size: u8,
    avail: u8,
    /// Occupied vendor IRK slots, one bit per slot
    irk_slots: Vec<u8>,
    resolution_enabled: bool,
}

impl PrivacyManager {
    pub fn new(depth: usize, mode: PrivacyMode, size: u8) -> Self {
        let size = if mode == PrivacyMode::Unsupported { 0 } else { size };
        Self {
            mode,
            queue: CorrelatedQueue::new("resolving list", depth),
            max_size: size,
            avail: size,
            irk_slots: vec![0; usize::from(size).div_ceil(8)],
            resolution_enabled: false,
        }
    }

    pub fn mode(&self) -> PrivacyMode {
        self.mode
    }

    /// Free entries in the controller list
    pub fn avail(&self) -> u8 {
        self.avail
    }

    pub fn is_resolution_enabled(&self) -> bool {
        self.resolution_enabled
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Lowest free vendor slot
    fn free_slot(&self) -> Option<u8> {
        (0..self.max_size).find(|&slot| !self.slot_taken(slot))
    }

    pub fn slot_taken(&self, slot: u8) -> bool {
        let (byte, bit) = (usize::from(slot / 8), slot % 8);
        self.irk_slots.get(byte).is_some_and(|b| b & (1 << bit) != 0)
    }

    fn set_slot(&mut self, slot: u8, taken: bool) {
        let (byte, bit) = (usize::from(slot / 8), slot % 8);
        if let Some(b) = self.irk_slots.get_mut(byte) {
            if taken {
                *b |= 1 << bit;
            } else {
                *b &= !(1 << bit);
            }
        }
    }
}

impl Btm {
    pub fn privacy(&self) -> &PrivacyManager {
        &self.privacy
    }

    fn check_privacy(&self) -> BtmResult<()> {
        match self.privacy.mode {
            PrivacyMode::Unsupported => Err(BtmError::ModeUnsupported),
            _ => self.privacy.queue.reserve(),
        }
    }

    /// Identity the controller should match for a bonded device
    fn identity_of(&self, bd_addr: &BdAddr) -> BtmResult<(AddressType, BdAddr)> {
        let record = self.devices.find(bd_addr).ok_or(BtmError::UnknownAddr)?;
        Ok(record.ble.static_addr.unwrap_or((record.ble.ble_addr_type, *bd_addr)))
    }

    /// Put a bonded device's IRK into the controller resolving list
    pub fn resolving_list_load_dev(&mut self, bd_addr: BdAddr) -> BtmResult {
        self.check_privacy()?;
        let record = self.devices.find(&bd_addr).ok_or(BtmError::UnknownAddr)?;
        let irk = record.ble.irk.ok_or(BtmError::IllegalValue)?;
        if record.ble.in_controller_list.contains(ControllerLists::RESOLVING_LIST) {
            return Ok(Issued::Done);
        }
        if self.privacy.avail == 0 {
            debug!("resolving list full, {} not loaded", bd_addr);
            return Err(BtmError::NoResources);
        }

        let (addr_type, identity) = self.identity_of(&bd_addr)?;
        let command = match self.privacy.mode {
            PrivacyMode::Standard => HciCommand::LeAddDeviceToResolvingList {
                peer_addr_type: addr_type.into(),
                peer_addr: identity,
                peer_irk: irk,
                local_irk: self.config.local_irk,
            },
            _ => {
                let mut params = vec![RPA_SUB_ADD_IRK];
                params.extend_from_slice(&irk);
                params.push(addr_type.into());
                params.extend_from_slice(identity.as_slice());
                HciCommand::Vendor { ocf: OCF_VSC_RPA_OFFLOAD, params }
            }
        };
        info!("resolving list add {}", bd_addr);
        self.issue_rl_command(RPA_SUB_ADD_IRK, command, PendingRl { bd_addr: Some(bd_addr), enable: false })
    }

    pub fn resolving_list_remove_dev(&mut self, bd_addr: BdAddr) -> BtmResult {
        self.check_privacy()?;
        let record = self.devices.find(&bd_addr).ok_or(BtmError::UnknownAddr)?;
        if !record.ble.in_controller_list.contains(ControllerLists::RESOLVING_LIST) {
            return Err(BtmError::IllegalValue);
        }

        let (addr_type, identity) = self.identity_of(&bd_addr)?;
        let command = match self.privacy.mode {
            PrivacyMode::Standard => HciCommand::LeRemoveDeviceFromResolvingList {
                peer_addr_type: addr_type.into(),
                peer_addr: identity,
            },
            _ => {
                let mut params = vec![RPA_SUB_REMOVE_IRK, addr_type.into()];
                params.extend_from_slice(identity.as_slice());
                HciCommand::Vendor { ocf: OCF_VSC_RPA_OFFLOAD, params }
            }
        };
        info!("resolving list remove {}", bd_addr);
        self.issue_rl_command(RPA_SUB_REMOVE_IRK, command, PendingRl { bd_addr: Some(bd_addr), enable: false })
    }

    pub fn clear_resolving_list(&mut self) -> BtmResult {
        self.check_privacy()?;
        let command = match self.privacy.mode {
            PrivacyMode::Standard => HciCommand::LeClearResolvingList,
            _ => HciCommand::Vendor { ocf: OCF_VSC_RPA_OFFLOAD, params: vec![RPA_SUB_CLEAR_IRK] },
        };
        self.issue_rl_command(RPA_SUB_CLEAR_IRK, command, PendingRl { bd_addr: None, enable: false })
    }

    /// Ask the controller which RPA it currently resolves for a device
    pub fn read_resolving_list_entry(&mut self, bd_addr: BdAddr) -> BtmResult {
        self.check_privacy()?;
        let record = self.devices.find(&bd_addr).ok_or(BtmError::UnknownAddr)?;
        if !record.ble.in_controller_list.contains(ControllerLists::RESOLVING_LIST) {
            return Err(BtmError::IllegalValue);
        }
        let slot = record.ble.resolving_list_index;

        let (addr_type, identity) = self.identity_of(&bd_addr)?;
        let command = match self.privacy.mode {
            PrivacyMode::Standard => HciCommand::LeReadPeerResolvableAddress {
                peer_addr_type: addr_type.into(),
                peer_addr: identity,
            },
            _ => HciCommand::Vendor { ocf: OCF_VSC_RPA_OFFLOAD, params: vec![RPA_SUB_READ_IRK, slot] },
        };
        // Reads leave the list alone, nothing to pause
        self.send(command)?;
        self.privacy
            .queue
            .enqueue(RPA_SUB_READ_IRK, 0, PendingRl { bd_addr: Some(bd_addr), enable: false })?;
        Ok(Issued::Started)
    }

    /// Turn controller address resolution on or off
    pub fn set_address_resolution(&mut self, enable: bool) -> BtmResult {
        self.check_privacy()?;
        let command = match self.privacy.mode {
            PrivacyMode::Standard => HciCommand::LeSetAddressResolutionEnable { enable },
            _ => HciCommand::Vendor { ocf: OCF_VSC_RPA_OFFLOAD, params: vec![RPA_SUB_ENABLE, enable as u8] },
        };
        self.issue_rl_command(RPA_SUB_ENABLE, command, PendingRl { bd_addr: None, enable })
    }

    fn issue_rl_command(&mut self, sub_opcode: u8, command: HciCommand, pending: PendingRl) -> BtmResult {
        let suspended = self.suspend_resolving_list_activity();
        let sent = self.send(command);
        if sent.is_ok() {
            // Room was checked up front
            if let Err(err) = self.privacy.queue.enqueue(sub_opcode, 0, pending) {
                warn!("resolving list op not tracked: {}", err);
            }
        }
        self.resume_resolving_list_activity(suspended);
        sent.map(|()| Issued::Started)
    }

    /// Pause advertising, scanning and background connect, in that order
    pub(crate) fn suspend_resolving_list_activity(&mut self) -> SuspendedActivity {
        let mut suspended = SuspendedActivity::empty();
        if self.le_adv_suspend() {
            suspended |= SuspendedActivity::ADV;
        }
        if self.le_scan.enabled {
            match self.le_scan_stop() {
                Ok(()) => suspended |= SuspendedActivity::SCAN,
                Err(err) => warn!("scan not paused: {}", err),
            }
        }
        if self.suspend_bg_conn() {
            suspended |= SuspendedActivity::BG_CONN;
        }
        if !suspended.is_empty() {
            debug!("resolving list suspended {:?}", suspended);
        }
        suspended
    }

    pub(crate) fn resume_resolving_list_activity(&mut self, suspended: SuspendedActivity) {
        if suspended.contains(SuspendedActivity::ADV) {
            self.le_adv_resume();
        }
        if suspended.contains(SuspendedActivity::SCAN) {
            self.le_scan_resume();
        }
        if suspended.contains(SuspendedActivity::BG_CONN) {
            self.resume_bg_conn();
        }
    }

    /// Completion of a standard resolving-list command
    ///
    /// `params` is the return parameter block after the status byte.
    pub fn on_resolving_list_complete(&mut self, op: ResolvingListOp, hci_status: u8, params: &[u8]) {
        let sub_opcode = match op {
            ResolvingListOp::Add => RPA_SUB_ADD_IRK,
            ResolvingListOp::Remove => RPA_SUB_REMOVE_IRK,
            ResolvingListOp::Clear => RPA_SUB_CLEAR_IRK,
            ResolvingListOp::Read => RPA_SUB_READ_IRK,
            ResolvingListOp::SetResolution => RPA_SUB_ENABLE,
        };
        let rpa = match op {
            ResolvingListOp::Read => BdAddr::from_slice(params),
            _ => None,
        };
        self.process_rl_complete(sub_opcode, hci_status, None, rpa);
    }

    /// Completion of the vendor RPA offload command
    pub fn on_vendor_rpa_complete(&mut self, params: &[u8]) {
        let Some((hci_status, sub_opcode, rest)) = super::split_vsc_complete(params) else {
            warn!("short RPA offload completion: {}", hex::encode(params));
            if let Some(pending) = self.privacy.queue.discard_head() {
                self.complete_rl_op(pending, BtmStatus::ErrProcessing, None, None);
            }
            return;
        };
        let (avail, rpa) = match sub_opcode {
            RPA_SUB_ADD_IRK | RPA_SUB_REMOVE_IRK => (rest.first().copied(), None),
            // slot, irk, identity type, identity, current rpa
            RPA_SUB_READ_IRK => (None, rest.get(24..30).and_then(BdAddr::from_slice)),
            _ => (None, None),
        };
        self.process_rl_complete(sub_opcode, hci_status, avail, rpa);
    }

    fn process_rl_complete(
        &mut self,
        sub_opcode: u8,
        hci_status: u8,
        avail: Option<u8>,
        rpa: Option<BdAddr>,
    ) {
        match self.privacy.queue.dequeue(sub_opcode) {
            Ok(pending) => self.complete_rl_op(pending, BtmStatus::from_hci(hci_status), avail, rpa),
            Err(Some(discarded)) => self.complete_rl_op(discarded, BtmStatus::ErrProcessing, None, None),
            Err(None) => {}
        }
    }

    fn complete_rl_op(
        &mut self,
        pending: PendingOp<PendingRl>,
        status: BtmStatus,
        avail: Option<u8>,
        rpa: Option<BdAddr>,
    ) {
        let Some(op) = ResolvingListOp::from_sub_opcode(pending.sub_opcode) else {
            warn!("unknown RPA offload sub-opcode {:#04x}", pending.sub_opcode);
            return;
        };
        let bd_addr = pending.payload.bd_addr;

        if status.is_success() {
            match op {
                ResolvingListOp::Add => self.rl_entry_added(bd_addr, avail),
                ResolvingListOp::Remove => self.rl_entry_removed(bd_addr, avail),
                ResolvingListOp::Clear => {
                    self.privacy.avail = self.privacy.max_size;
                    self.privacy.irk_slots.fill(0);
                    for record in self.devices.iter_mut() {
                        record.ble.in_controller_list.remove(ControllerLists::RESOLVING_LIST);
                    }
                }
                ResolvingListOp::SetResolution => {
                    self.privacy.resolution_enabled = pending.payload.enable;
                }
                ResolvingListOp::Read => {}
            }
        } else {
            warn!("resolving list {:?} failed: {:?}", op, status);
        }

        let rpa = if status.is_success() { rpa } else { None };
        self.events.on_resolving_list(ResolvingListEvent { op, status, bd_addr, rpa });
    }

    fn rl_entry_added(&mut self, bd_addr: Option<BdAddr>, avail: Option<u8>) {
        let vendor = self.privacy.mode == PrivacyMode::Vendor;
        self.privacy.avail = match avail {
            Some(avail) if vendor => avail,
            _ => self.privacy.avail.saturating_sub(1),
        };
        let slot = if vendor { self.privacy.free_slot() } else { None };
        if let Some(slot) = slot {
            self.privacy.set_slot(slot, true);
        }
        if let Some(record) = bd_addr.and_then(|addr| self.devices.find_mut(&addr)) {
            record.ble.in_controller_list.insert(ControllerLists::RESOLVING_LIST);
            if let Some(slot) = slot {
                record.ble.resolving_list_index = slot;
            }
        }
    }

    fn rl_entry_removed(&mut self, bd_addr: Option<BdAddr>, avail: Option<u8>) {
        let vendor = self.privacy.mode == PrivacyMode::Vendor;
        self.privacy.avail = match avail {
            Some(avail) if vendor => avail,
            _ => self.privacy.avail.saturating_add(1).min(self.privacy.max_size),
        };
        if let Some(record) = bd_addr.and_then(|addr| self.devices.find_mut(&addr)) {
            record.ble.in_controller_list.remove(ControllerLists::RESOLVING_LIST);
            if vendor {
                let slot = record.ble.resolving_list_index;
                self.privacy.set_slot(slot, false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::bgconn::BgConnType;
    use crate::config::BtmConfig;
    use crate::test_utils::{addr, harness, harness_with, Event, Harness};

    fn bonded(btm: &mut Btm, last: u8) -> BdAddr {
        let bd_addr = addr(last);
        let record = btm.devices_mut().find_or_allocate(bd_addr);
        record.ble.irk = Some([last; 16]);
        record.ble.static_addr = Some((AddressType::PublicIdentity, bd_addr));
        bd_addr
    }

    fn vendor_harness() -> Harness {
        harness_with(BtmConfig::default(), |c| c.privacy = false)
    }

    fn rl_events(events: &[Event]) -> Vec<ResolvingListEvent> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::ResolvingList(event) => Some(*event),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_standard_add() {
        let Harness { mut btm, hci, events, .. } = harness();
        let dev = bonded(&mut btm, 1);
        assert_eq!(btm.privacy().mode(), PrivacyMode::Standard);

        assert_eq!(btm.resolving_list_load_dev(dev), Ok(Issued::Started));
        match &hci.sent()[0] {
            HciCommand::LeAddDeviceToResolvingList { peer_addr_type, peer_addr, peer_irk, .. } => {
                assert_eq!(*peer_addr_type, u8::from(AddressType::PublicIdentity));
                assert_eq!(*peer_addr, dev);
                assert_eq!(*peer_irk, [1; 16]);
            }
            other => panic!("unexpected {:?}", other),
        }

        btm.on_resolving_list_complete(ResolvingListOp::Add, 0, &[]);
        assert_eq!(btm.privacy().avail(), 3);
        let record = btm.devices().find(&dev).unwrap();
        assert!(record.ble.in_controller_list.contains(ControllerLists::RESOLVING_LIST));
        assert_eq!(
            rl_events(&events.events()),
            vec![ResolvingListEvent {
                op: ResolvingListOp::Add,
                status: BtmStatus::Success,
                bd_addr: Some(dev),
                rpa: None
            }]
        );

        // Already loaded
        hci.clear();
        assert_eq!(btm.resolving_list_load_dev(dev), Ok(Issued::Done));
        assert!(hci.sent().is_empty());
    }

    #[test]
    fn test_load_rejections() {
        let Harness { mut btm, .. } = harness();
        assert_eq!(btm.resolving_list_load_dev(addr(1)), Err(BtmError::UnknownAddr));
        btm.devices_mut().find_or_allocate(addr(2));
        assert_eq!(btm.resolving_list_load_dev(addr(2)), Err(BtmError::IllegalValue));
        assert_eq!(btm.resolving_list_remove_dev(addr(2)), Err(BtmError::IllegalValue));

        let Harness { mut btm, .. } = harness_with(BtmConfig::default(), |c| {
            c.privacy = false;
            c.vendor_irk_list_size = 0;
        });
        bonded(&mut btm, 1);
        assert_eq!(btm.resolving_list_load_dev(addr(1)), Err(BtmError::ModeUnsupported));
        assert_eq!(btm.clear_resolving_list(), Err(BtmError::ModeUnsupported));
    }

    #[test]
    fn test_list_full() {
        let Harness { mut btm, .. } = harness_with(BtmConfig::default(), |c| c.resolving_list_size = 1);
        let first = bonded(&mut btm, 1);
        let second = bonded(&mut btm, 2);
        btm.resolving_list_load_dev(first).unwrap();
        btm.on_resolving_list_complete(ResolvingListOp::Add, 0, &[]);
        assert_eq!(btm.resolving_list_load_dev(second), Err(BtmError::NoResources));
    }

    #[test]
    fn test_suspend_order() {
        let Harness { mut btm, hci, .. } = harness();
        btm.update_white_list(true, addr(9)).unwrap();
        btm.set_bg_conn_type(BgConnType::Selective, None).unwrap();
        btm.set_le_advertising(true, false).unwrap();
        let dev = bonded(&mut btm, 1);
        hci.clear();

        btm.resolving_list_load_dev(dev).unwrap();
        let sent = hci.take();
        assert_eq!(sent[0], HciCommand::LeSetAdvertisingEnable { enable: false });
        assert_eq!(sent[1], HciCommand::LeSetScanEnable { enable: false, filter_duplicates: false });
        assert!(matches!(sent[2], HciCommand::LeAddDeviceToResolvingList { .. }));
        assert_eq!(sent[3], HciCommand::LeSetAdvertisingEnable { enable: true });
        assert_eq!(sent[4], HciCommand::LeSetScanEnable { enable: true, filter_duplicates: true });
        assert_eq!(sent.len(), 5);

        assert!(btm.le_adv().is_enabled());
        assert!(btm.le_scan().is_enabled());
        assert!(btm.le_scan().activity().contains(crate::ble::scan::ScanActivity::SELECTIVE_CONN));
    }

    #[test]
    fn test_remove_and_read() {
        let Harness { mut btm, hci, events, .. } = harness();
        let dev = bonded(&mut btm, 1);
        btm.resolving_list_load_dev(dev).unwrap();
        btm.on_resolving_list_complete(ResolvingListOp::Add, 0, &[]);
        hci.clear();

        btm.read_resolving_list_entry(dev).unwrap();
        assert_eq!(
            hci.take(),
            vec![HciCommand::LeReadPeerResolvableAddress {
                peer_addr_type: AddressType::PublicIdentity.into(),
                peer_addr: dev
            }]
        );
        let rpa = BdAddr::new([1, 2, 3, 4, 5, 0x4A]);
        btm.on_resolving_list_complete(ResolvingListOp::Read, 0, rpa.as_slice());

        btm.resolving_list_remove_dev(dev).unwrap();
        btm.on_resolving_list_complete(ResolvingListOp::Remove, 0, &[]);
        assert_eq!(btm.privacy().avail(), 4);
        assert!(!btm
            .devices()
            .find(&dev)
            .unwrap()
            .ble
            .in_controller_list
            .contains(ControllerLists::RESOLVING_LIST));

        let seen = rl_events(&events.events());
        assert_eq!(seen[1].op, ResolvingListOp::Read);
        assert_eq!(seen[1].rpa, Some(rpa));
        assert_eq!(seen[2].op, ResolvingListOp::Remove);
    }

    #[test]
    fn test_vendor_slots() {
        let Harness { mut btm, hci, .. } = vendor_harness();
        assert_eq!(btm.privacy().mode(), PrivacyMode::Vendor);
        let first = bonded(&mut btm, 1);
        let second = bonded(&mut btm, 2);

        btm.resolving_list_load_dev(first).unwrap();
        btm.resolving_list_load_dev(second).unwrap();
        match &hci.sent()[0] {
            HciCommand::Vendor { ocf, params } => {
                assert_eq!(*ocf, OCF_VSC_RPA_OFFLOAD);
                assert_eq!(params[0], RPA_SUB_ADD_IRK);
                assert_eq!(&params[1..17], &[1; 16]);
            }
            other => panic!("unexpected {:?}", other),
        }

        // Vendor completions report the remaining room
        btm.on_vendor_rpa_complete(&[0, RPA_SUB_ADD_IRK, 3]);
        btm.on_vendor_rpa_complete(&[0, RPA_SUB_ADD_IRK, 2]);
        assert_eq!(btm.privacy().avail(), 2);
        assert!(btm.privacy().slot_taken(0));
        assert!(btm.privacy().slot_taken(1));
        assert_eq!(btm.devices().find(&second).unwrap().ble.resolving_list_index, 1);

        btm.resolving_list_remove_dev(first).unwrap();
        btm.on_vendor_rpa_complete(&[0, RPA_SUB_REMOVE_IRK, 3]);
        assert!(!btm.privacy().slot_taken(0));
        assert!(btm.privacy().slot_taken(1));

        hci.clear();
        btm.read_resolving_list_entry(second).unwrap();
        assert_eq!(
            hci.take(),
            vec![HciCommand::Vendor { ocf: OCF_VSC_RPA_OFFLOAD, params: vec![RPA_SUB_READ_IRK, 1] }]
        );
    }

    #[test]
    fn test_mismatched_completion_fails_head() {
        let Harness { mut btm, events, .. } = vendor_harness();
        let dev = bonded(&mut btm, 1);
        btm.resolving_list_load_dev(dev).unwrap();

        btm.on_vendor_rpa_complete(&[0, RPA_SUB_CLEAR_IRK]);
        assert_eq!(
            rl_events(&events.events()),
            vec![ResolvingListEvent {
                op: ResolvingListOp::Add,
                status: BtmStatus::ErrProcessing,
                bd_addr: Some(dev),
                rpa: None
            }]
        );
        assert_eq!(btm.privacy().pending(), 0);
        assert_eq!(btm.privacy().avail(), 4);
        events.clear();

        btm.on_vendor_rpa_complete(&[0]);
        assert!(events.events().is_empty());
    }

    #[test]
    fn test_short_completion_fails_head() {
        let Harness { mut btm, events, .. } = vendor_harness();
        let first = bonded(&mut btm, 1);
        let second = bonded(&mut btm, 2);
        btm.resolving_list_load_dev(first).unwrap();
        btm.resolving_list_load_dev(second).unwrap();
        assert_eq!(btm.privacy().pending(), 2);

        btm.on_vendor_rpa_complete(&[0]);
        assert_eq!(btm.privacy().pending(), 1);
        let failed = rl_events(&events.events());
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].status, BtmStatus::ErrProcessing);
        assert_eq!(failed[0].bd_addr, Some(first));

        // The second add gets the next completion
        btm.on_vendor_rpa_complete(&[0, RPA_SUB_ADD_IRK, 3]);
        assert_eq!(btm.privacy().pending(), 0);
        let last = *rl_events(&events.events()).last().unwrap();
        assert_eq!(last.status, BtmStatus::Success);
        assert_eq!(last.bd_addr, Some(second));
        assert!(!btm
            .devices()
            .find(&first)
            .unwrap()
            .ble
            .in_controller_list
            .contains(ControllerLists::RESOLVING_LIST));
        assert!(btm
            .devices()
            .find(&second)
            .unwrap()
            .ble
            .in_controller_list
            .contains(ControllerLists::RESOLVING_LIST));
    }

    #[test]
    fn test_address_resolution_and_clear() {
        let Harness { mut btm, hci, .. } = harness();
        let dev = bonded(&mut btm, 1);
        btm.resolving_list_load_dev(dev).unwrap();
        btm.set_address_resolution(true).unwrap();
        btm.clear_resolving_list().unwrap();
        assert_eq!(btm.privacy().pending(), 3);

        btm.on_resolving_list_complete(ResolvingListOp::Add, 0, &[]);
        btm.on_resolving_list_complete(ResolvingListOp::SetResolution, 0, &[]);
        assert!(btm.privacy().is_resolution_enabled());
        btm.on_resolving_list_complete(ResolvingListOp::Clear, 0, &[]);
        assert_eq!(btm.privacy().avail(), 4);
        assert!(!btm
            .devices()
            .find(&dev)
            .unwrap()
            .ble
            .in_controller_list
            .contains(ControllerLists::RESOLVING_LIST));
        assert!(hci.sent().contains(&HciCommand::LeSetAddressResolutionEnable { enable: true }));
    }

    #[test]
    fn test_failed_completion() {
        let Harness { mut btm, events, .. } = harness();
        let dev = bonded(&mut btm, 1);
        btm.resolving_list_load_dev(dev).unwrap();
        btm.on_resolving_list_complete(ResolvingListOp::Add, 0x07, &[]);

        assert_eq!(btm.privacy().avail(), 4);
        assert_eq!(rl_events(&events.events())[0].status, BtmStatus::ErrProcessing);
    }
}
