//! Vendor multi-advertising instances
//!
//! Instance 0 is the legacy advertiser; the vendor command drives instances
//! 1 and up. Each instance carries its own parameters, data and callback.

use log::{debug, info, warn};
use rand::RngCore;

use crate::btm::Btm;
use crate::error::{BtmError, BtmResult, BtmStatus, Issued};
use crate::hci::constants::OCF_VSC_MULTI_ADV;
use crate::hci::HciCommand;
use crate::queue::{CorrelatedQueue, PendingOp};
use crate::types::{AddressType, BdAddr};

pub const MULTI_ADV_SUB_SET_PARAM: u8 = 0x01;
pub const MULTI_ADV_SUB_WRITE_ADV_DATA: u8 = 0x02;
pub const MULTI_ADV_SUB_WRITE_SCAN_RSP_DATA: u8 = 0x03;
pub const MULTI_ADV_SUB_SET_RANDOM_ADDR: u8 = 0x04;
pub const MULTI_ADV_SUB_ENB: u8 = 0x05;

pub const ADV_DATA_MAX: usize = 31;

pub const ADV_TYPE_IND: u8 = 0x00;
pub const ADV_TYPE_DIRECT_IND: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiAdvEvt {
    Enabled,
    Disabled,
    ParamsSet,
    DataSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiAdvEvent {
    pub evt: MultiAdvEvt,
    pub inst_id: u8,
    pub status: BtmStatus,
}

pub type MultiAdvCallback = Box<dyn FnMut(MultiAdvEvent)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiAdvParams {
    /// 0.625 ms units
    pub adv_int_min: u16,
    pub adv_int_max: u16,
    pub adv_type: u8,
    pub channel_map: u8,
    pub adv_filter_policy: u8,
    pub tx_power: i8,
    /// `Random` gives the instance its own static random address
    pub own_addr_type: AddressType,
}

impl Default for MultiAdvParams {
    fn default() -> Self {
        Self {
            adv_int_min: 0x00A0,
            adv_int_max: 0x00F0,
            adv_type: ADV_TYPE_IND,
            channel_map: 0x07,
            adv_filter_policy: 0,
            tx_power: 0,
            own_addr_type: AddressType::Public,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdvInstState {
    #[default]
    Free,
    /// Allocated, not on air
    Idle,
    Advertising,
}

#[derive(Default)]
struct AdvInstance {
    state: AdvInstState,
    params: Option<MultiAdvParams>,
    random_addr: Option<BdAddr>,
    callback: Option<MultiAdvCallback>,
}

#[derive(Debug, Clone, Copy)]
struct PendingAdv {
    inst_id: u8,
    enable: bool,
    /// Report the completion to the instance callback
    notify: bool,
}

pub struct MultiAdvManager {
    /// Index `i` holds instance `i + 1`
    instances: Vec<AdvInstance>,
    queue: CorrelatedQueue<PendingAdv>,
}

impl MultiAdvManager {
    pub fn new(max_instances: u8, depth: usize) -> Self {
        let usable = usize::from(max_instances.saturating_sub(1));
        Self {
            instances: (0..usable).map(|_| AdvInstance::default()).collect(),
            queue: CorrelatedQueue::new("multi adv", depth),
        }
    }

    /// Instances available besides the legacy one
    pub fn capacity(&self) -> usize {
        self.instances.len()
    }

    pub fn state(&self, inst_id: u8) -> AdvInstState {
        self.instance(inst_id).map_or(AdvInstState::Free, |inst| inst.state)
    }

    pub fn random_addr(&self, inst_id: u8) -> Option<BdAddr> {
        self.instance(inst_id).and_then(|inst| inst.random_addr)
    }

    pub fn params(&self, inst_id: u8) -> Option<MultiAdvParams> {
        self.instance(inst_id).and_then(|inst| inst.params)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn instance(&self, inst_id: u8) -> Option<&AdvInstance> {
        self.instances.get(usize::from(inst_id).checked_sub(1)?)
    }

    fn instance_mut(&mut self, inst_id: u8) -> Option<&mut AdvInstance> {
        self.instances.get_mut(usize::from(inst_id).checked_sub(1)?)
    }

    fn in_use(&self, inst_id: u8) -> bool {
        self.state(inst_id) != AdvInstState::Free
    }

    fn allocate(&mut self) -> Option<u8> {
        let idx = self.instances.iter().position(|inst| inst.state == AdvInstState::Free)?;
        self.instances[idx].state = AdvInstState::Idle;
        u8::try_from(idx + 1).ok()
    }

    fn release(&mut self, inst_id: u8) {
        if let Some(inst) = self.instance_mut(inst_id) {
            *inst = AdvInstance::default();
        }
    }
}

fn static_random_addr() -> BdAddr {
    let mut bytes = [0u8; 6];
    rand::thread_rng().fill_bytes(&mut bytes);
    // Static random: top two bits set
    bytes[5] |= 0xC0;
    BdAddr::new(bytes)
}

fn set_param_command(inst_id: u8, params: &MultiAdvParams, own_addr: BdAddr) -> Vec<u8> {
    let mut cmd = vec![MULTI_ADV_SUB_SET_PARAM];
    cmd.extend_from_slice(&params.adv_int_min.to_le_bytes());
    cmd.extend_from_slice(&params.adv_int_max.to_le_bytes());
    cmd.push(params.adv_type);
    let own_type = match params.own_addr_type {
        AddressType::Random | AddressType::RandomIdentity => AddressType::Random,
        _ => AddressType::Public,
    };
    cmd.push(own_type.into());
    cmd.extend_from_slice(own_addr.as_slice());
    // No direct peer
    cmd.push(0);
    cmd.extend_from_slice(BdAddr::ANY.as_slice());
    cmd.push(params.channel_map);
    cmd.push(params.adv_filter_policy);
    cmd.push(inst_id);
    cmd.push(params.tx_power as u8);
    cmd
}

impl Btm {
    pub fn multi_adv(&self) -> &MultiAdvManager {
        &self.multi_adv
    }

    fn issue_multi_adv(&mut self, params: Vec<u8>, pending: PendingAdv) -> BtmResult<()> {
        let sub_opcode = params[0];
        debug!("multi adv inst {} command {}", pending.inst_id, hex::encode(&params));
        self.send(HciCommand::Vendor { ocf: OCF_VSC_MULTI_ADV, params })?;
        self.multi_adv.queue.enqueue(sub_opcode, u32::from(pending.inst_id), pending)
    }

    /// Allocate an instance and start advertising on it
    ///
    /// Returns the instance id; progress is reported through `callback`.
    pub fn multi_adv_enable(
        &mut self,
        params: MultiAdvParams,
        callback: MultiAdvCallback,
    ) -> BtmResult<u8> {
        if self.multi_adv.capacity() == 0 {
            return Err(BtmError::ModeUnsupported);
        }
        let random = matches!(params.own_addr_type, AddressType::Random | AddressType::RandomIdentity);
        self.multi_adv.queue.reserve_many(if random { 3 } else { 2 })?;
        let inst_id = self.multi_adv.allocate().ok_or(BtmError::NoResources)?;

        let mut own_addr = BdAddr::ANY;
        let mut commands = Vec::with_capacity(3);
        if random {
            own_addr = static_random_addr();
            let mut cmd = vec![MULTI_ADV_SUB_SET_RANDOM_ADDR];
            cmd.extend_from_slice(own_addr.as_slice());
            cmd.push(inst_id);
            commands.push((cmd, false));
        }
        commands.push((set_param_command(inst_id, &params, own_addr), false));
        commands.push((vec![MULTI_ADV_SUB_ENB, 1, inst_id], true));

        if let Some(inst) = self.multi_adv.instance_mut(inst_id) {
            inst.params = Some(params);
            inst.random_addr = random.then_some(own_addr);
            inst.callback = Some(callback);
        }

        for (idx, (cmd, enable)) in commands.into_iter().enumerate() {
            if let Err(err) = self.issue_multi_adv(cmd, PendingAdv { inst_id, enable, notify: true }) {
                if idx == 0 {
                    self.multi_adv.release(inst_id);
                }
                return Err(err);
            }
        }
        info!("multi adv instance {} starting", inst_id);
        Ok(inst_id)
    }

    /// Rewrite the parameters of a running instance
    pub fn multi_adv_update_params(&mut self, inst_id: u8, params: MultiAdvParams) -> BtmResult {
        if !self.multi_adv.in_use(inst_id) {
            return Err(BtmError::IllegalValue);
        }
        self.multi_adv.queue.reserve()?;
        let own_addr = self.multi_adv.random_addr(inst_id).unwrap_or(BdAddr::ANY);
        let cmd = set_param_command(inst_id, &params, own_addr);
        self.issue_multi_adv(cmd, PendingAdv { inst_id, enable: false, notify: true })?;
        if let Some(inst) = self.multi_adv.instance_mut(inst_id) {
            inst.params = Some(params);
        }
        Ok(Issued::Started)
    }

    /// Set the advertising or scan response payload of an instance
    pub fn multi_adv_write_data(&mut self, inst_id: u8, scan_rsp: bool, data: &[u8]) -> BtmResult {
        if !self.multi_adv.in_use(inst_id) || data.len() > ADV_DATA_MAX {
            return Err(BtmError::IllegalValue);
        }
        self.multi_adv.queue.reserve()?;
        let sub_opcode = if scan_rsp { MULTI_ADV_SUB_WRITE_SCAN_RSP_DATA } else { MULTI_ADV_SUB_WRITE_ADV_DATA };
        let mut cmd = vec![sub_opcode, data.len() as u8];
        cmd.extend_from_slice(data);
        cmd.resize(2 + ADV_DATA_MAX, 0);
        cmd.push(inst_id);
        self.issue_multi_adv(cmd, PendingAdv { inst_id, enable: false, notify: true })?;
        Ok(Issued::Started)
    }

    /// Stop an instance; it is freed once the controller confirms
    pub fn multi_adv_disable(&mut self, inst_id: u8) -> BtmResult {
        if !self.multi_adv.in_use(inst_id) {
            return Err(BtmError::IllegalValue);
        }
        self.multi_adv.queue.reserve()?;
        self.issue_multi_adv(
            vec![MULTI_ADV_SUB_ENB, 0, inst_id],
            PendingAdv { inst_id, enable: false, notify: true },
        )?;
        Ok(Issued::Started)
    }

    /// Completion of the vendor multi-advertising command
    pub fn on_multi_adv_vsc_complete(&mut self, params: &[u8]) {
        let Some((hci_status, sub_opcode, _)) = super::split_vsc_complete(params) else {
            warn!("short multi adv completion: {}", hex::encode(params));
            if let Some(op) = self.multi_adv.queue.discard_head() {
                self.complete_multi_adv_op(op, BtmStatus::ErrProcessing);
            }
            return;
        };
        match self.multi_adv.queue.dequeue(sub_opcode) {
            Ok(op) => self.complete_multi_adv_op(op, BtmStatus::from_hci(hci_status)),
            Err(Some(discarded)) => self.complete_multi_adv_op(discarded, BtmStatus::ErrProcessing),
            Err(None) => {}
        }
    }

    fn complete_multi_adv_op(&mut self, op: PendingOp<PendingAdv>, status: BtmStatus) {
        let sub_opcode = op.sub_opcode;
        let PendingAdv { inst_id, enable, notify } = op.payload;

        let evt = match sub_opcode {
            MULTI_ADV_SUB_ENB if enable => Some(MultiAdvEvt::Enabled),
            MULTI_ADV_SUB_ENB => Some(MultiAdvEvt::Disabled),
            MULTI_ADV_SUB_SET_PARAM => Some(MultiAdvEvt::ParamsSet),
            MULTI_ADV_SUB_WRITE_ADV_DATA | MULTI_ADV_SUB_WRITE_SCAN_RSP_DATA => Some(MultiAdvEvt::DataSet),
            _ => None,
        };

        let Some(inst) = self.multi_adv.instance_mut(inst_id) else {
            return;
        };
        if sub_opcode == MULTI_ADV_SUB_ENB && status.is_success() {
            inst.state = if enable { AdvInstState::Advertising } else { AdvInstState::Idle };
        }
        if let (Some(evt), true) = (evt, notify) {
            if let Some(callback) = inst.callback.as_mut() {
                callback(MultiAdvEvent { evt, inst_id, status });
            }
        }

        // An instance that was stopped, or never started, goes back to the pool
        let stopped = sub_opcode == MULTI_ADV_SUB_ENB && (status.is_success() != enable);
        if stopped && notify {
            debug!("multi adv instance {} released", inst_id);
            self.multi_adv.release(inst_id);
        }
    }

    /// Controller stopped an instance, normally because it got connected
    pub(crate) fn on_multi_adv_state_change(&mut self, params: &[u8]) {
        let &[inst_id, reason, ..] = params else {
            return;
        };
        debug!("multi adv instance {} state change reason {:#04x}", inst_id, reason);
        let Some(inst) = self.multi_adv.instance_mut(inst_id) else {
            return;
        };
        if inst.state != AdvInstState::Advertising {
            return;
        }
        inst.state = AdvInstState::Idle;
        let directed = inst.params.is_some_and(|p| p.adv_type == ADV_TYPE_DIRECT_IND);
        if directed {
            return;
        }

        // Undirected instances go back on air without telling the owner
        let reenable = PendingAdv { inst_id, enable: true, notify: false };
        let issued = match self.multi_adv.queue.reserve() {
            Ok(()) => self.issue_multi_adv(vec![MULTI_ADV_SUB_ENB, 1, inst_id], reenable),
            Err(err) => Err(err),
        };
        if let Err(err) = issued {
            warn!("multi adv instance {} not re-enabled: {}", inst_id, err);
        }
    }
}
