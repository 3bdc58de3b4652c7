//! Vendor advertising packet filters (APCF)
//!
//! A filter index groups conditions (address, service UUID, name...) with a
//! parameter block saying how they combine and when matches are delivered.
//! All commands share one vendor opcode and are told apart by sub-opcode.

use std::collections::HashSet;

use log::{debug, warn};

use crate::btm::Btm;
use crate::callbacks::Completion;
use crate::error::{BtmError, BtmResult, BtmStatus, Issued};
use crate::hci::constants::OCF_VSC_ADV_FILTER;
use crate::hci::HciCommand;
use crate::queue::{CorrelatedQueue, PendingOp};
use crate::types::{AddressType, BdAddr};
use crate::uuid::Uuid;

pub const PF_SUB_ENABLE: u8 = 0x00;
pub const PF_SUB_FEAT_SEL: u8 = 0x01;

/// Longest name or data pattern a condition can carry
pub const PF_STR_LEN_MAX: usize = 29;

/// What to do with a filter or condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAction {
    Add = 0,
    Delete = 1,
    Clear = 2,
}

impl FilterAction {
    fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Add),
            1 => Some(Self::Delete),
            2 => Some(Self::Clear),
            _ => None,
        }
    }
}

/// Condition kinds, numbered by their sub-opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterCondType {
    Addr = 0x02,
    ServiceUuid = 0x03,
    SolicitedUuid = 0x04,
    LocalName = 0x05,
    ManufacturerData = 0x06,
    ServiceData = 0x07,
}

impl FilterCondType {
    pub fn sub_opcode(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterCondition {
    Addr { bd_addr: BdAddr, addr_type: AddressType },
    ServiceUuid { uuid: Uuid, mask: Option<Uuid> },
    SolicitedUuid { uuid: Uuid, mask: Option<Uuid> },
    LocalName(Vec<u8>),
    ManufacturerData { company_id: u16, company_mask: u16, data: Vec<u8>, mask: Vec<u8> },
    ServiceData { data: Vec<u8>, mask: Vec<u8> },
}

impl FilterCondition {
    pub fn cond_type(&self) -> FilterCondType {
        match self {
            Self::Addr { .. } => FilterCondType::Addr,
            Self::ServiceUuid { .. } => FilterCondType::ServiceUuid,
            Self::SolicitedUuid { .. } => FilterCondType::SolicitedUuid,
            Self::LocalName(_) => FilterCondType::LocalName,
            Self::ManufacturerData { .. } => FilterCondType::ManufacturerData,
            Self::ServiceData { .. } => FilterCondType::ServiceData,
        }
    }

    /// Append the condition body; `None` if it cannot be expressed
    fn encode(&self, params: &mut Vec<u8>) -> Option<()> {
        match self {
            Self::Addr { bd_addr, addr_type } => {
                params.extend_from_slice(bd_addr.as_slice());
                params.push((*addr_type).into());
            }
            Self::ServiceUuid { uuid, mask } | Self::SolicitedUuid { uuid, mask } => {
                let size = uuid.shortest_size();
                let value = uuid.to_le_vec();
                params.extend_from_slice(&value);
                match mask {
                    Some(mask) => {
                        let mask = mask.as_bytes_le();
                        // Mask is sent at the width of the UUID
                        let mask = match size.byte_len() {
                            16 => &mask[..],
                            len => &mask[12..12 + len],
                        };
                        params.extend_from_slice(mask);
                    }
                    None => params.extend(std::iter::repeat(0xFF).take(size.byte_len())),
                }
            }
            Self::LocalName(name) => {
                if name.len() > PF_STR_LEN_MAX {
                    return None;
                }
                params.extend_from_slice(name);
            }
            Self::ManufacturerData { company_id, company_mask, data, mask } => {
                if data.len() + 2 > PF_STR_LEN_MAX || mask.len() != data.len() {
                    return None;
                }
                params.extend_from_slice(&company_id.to_le_bytes());
                params.extend_from_slice(data);
                params.extend_from_slice(&company_mask.to_le_bytes());
                params.extend_from_slice(mask);
            }
            Self::ServiceData { data, mask } => {
                if data.len() > PF_STR_LEN_MAX || mask.len() != data.len() {
                    return None;
                }
                params.extend_from_slice(data);
                params.extend_from_slice(mask);
            }
        }
        Some(())
    }
}

/// How the conditions of one filter index combine and report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterParams {
    /// Bitmask of condition kinds the filter uses
    pub feat_seln: u16,
    pub list_logic_type: u16,
    pub filt_logic_type: u8,
    pub rssi_high_thres: i8,
    pub delivery_mode: u8,
    /// Milliseconds
    pub found_timeout: u16,
    pub lost_timeout: u16,
    pub found_timeout_cnt: u8,
    pub num_of_tracking_entries: u16,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            feat_seln: 0,
            list_logic_type: 0,
            filt_logic_type: 0,
            rssi_high_thres: -128,
            delivery_mode: 0,
            found_timeout: 0,
            lost_timeout: 0,
            found_timeout_cnt: 0,
            num_of_tracking_entries: 0,
        }
    }
}

/// Outcome handed to the caller of a filter operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvFilterResult {
    pub action: FilterAction,
    /// Sub-opcode the completion answered
    pub sub_opcode: u8,
    /// Room left for this condition kind, as reported by the controller
    pub avail_space: u8,
    pub status: BtmStatus,
    pub ref_value: u32,
}

struct PendingFilter {
    action: FilterAction,
    filt_index: u8,
    callback: Option<Completion<AdvFilterResult>>,
}

pub struct AdvFilterManager {
    queue: CorrelatedQueue<PendingFilter>,
    enabled: bool,
    /// Filter indices with a parameter block set up
    filters: HashSet<u8>,
}

impl AdvFilterManager {
    pub fn new(depth: usize) -> Self {
        Self { queue: CorrelatedQueue::new("adv filter", depth), enabled: false, filters: HashSet::new() }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn has_filter(&self, filt_index: u8) -> bool {
        self.filters.contains(&filt_index)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl Btm {
    pub fn adv_filter(&self) -> &AdvFilterManager {
        &self.adv_filter
    }

    fn check_adv_filter(&self, filt_index: Option<u8>) -> BtmResult<()> {
        let count = self.controller.adv_filter_count();
        if count == 0 {
            return Err(BtmError::ModeUnsupported);
        }
        if filt_index.is_some_and(|idx| idx >= count) {
            return Err(BtmError::IllegalValue);
        }
        self.adv_filter.queue.reserve()
    }

    fn issue_adv_filter(
        &mut self,
        params: Vec<u8>,
        pending: PendingFilter,
        ref_value: u32,
    ) -> BtmResult {
        let sub_opcode = params[0];
        debug!("adv filter command {}", hex::encode(&params));
        self.send(HciCommand::Vendor { ocf: OCF_VSC_ADV_FILTER, params })?;
        self.adv_filter.queue.enqueue(sub_opcode, ref_value, pending)?;
        Ok(Issued::Started)
    }

    /// Switch packet filtering on or off as a whole
    pub fn adv_filter_enable(
        &mut self,
        enable: bool,
        ref_value: u32,
        callback: Option<Completion<AdvFilterResult>>,
    ) -> BtmResult {
        self.check_adv_filter(None)?;
        let action = if enable { FilterAction::Add } else { FilterAction::Delete };
        self.issue_adv_filter(
            vec![PF_SUB_ENABLE, enable as u8],
            PendingFilter { action, filt_index: 0, callback },
            ref_value,
        )
    }

    /// Add, delete or clear the parameter block of a filter index
    pub fn adv_filter_param_setup(
        &mut self,
        action: FilterAction,
        filt_index: u8,
        filt_params: Option<&FilterParams>,
        ref_value: u32,
        callback: Option<Completion<AdvFilterResult>>,
    ) -> BtmResult {
        self.check_adv_filter(Some(filt_index))?;
        let mut params = vec![PF_SUB_FEAT_SEL, action as u8];
        match action {
            FilterAction::Add => {
                let p = filt_params.ok_or(BtmError::IllegalValue)?;
                params.push(filt_index);
                params.extend_from_slice(&p.feat_seln.to_le_bytes());
                params.extend_from_slice(&p.list_logic_type.to_le_bytes());
                params.push(p.filt_logic_type);
                params.push(p.rssi_high_thres as u8);
                params.push(p.delivery_mode);
                params.extend_from_slice(&p.found_timeout.to_le_bytes());
                params.extend_from_slice(&p.lost_timeout.to_le_bytes());
                params.push(p.found_timeout_cnt);
                params.extend_from_slice(&p.num_of_tracking_entries.to_le_bytes());
            }
            FilterAction::Delete => params.push(filt_index),
            FilterAction::Clear => {}
        }
        self.issue_adv_filter(params, PendingFilter { action, filt_index, callback }, ref_value)
    }

    /// Add or delete one condition of a filter index
    pub fn adv_filter_cond(
        &mut self,
        action: FilterAction,
        filt_index: u8,
        cond: &FilterCondition,
        ref_value: u32,
        callback: Option<Completion<AdvFilterResult>>,
    ) -> BtmResult {
        if action == FilterAction::Clear {
            return self.adv_filter_clear_cond(filt_index, cond.cond_type(), ref_value, callback);
        }
        self.check_adv_filter(Some(filt_index))?;
        let mut params = vec![cond.cond_type().sub_opcode(), action as u8, filt_index];
        cond.encode(&mut params).ok_or(BtmError::IllegalValue)?;
        self.issue_adv_filter(params, PendingFilter { action, filt_index, callback }, ref_value)
    }

    /// Drop every condition of one kind from a filter index
    pub fn adv_filter_clear_cond(
        &mut self,
        filt_index: u8,
        cond_type: FilterCondType,
        ref_value: u32,
        callback: Option<Completion<AdvFilterResult>>,
    ) -> BtmResult {
        self.check_adv_filter(Some(filt_index))?;
        let params = vec![cond_type.sub_opcode(), FilterAction::Clear as u8, filt_index];
        let pending = PendingFilter { action: FilterAction::Clear, filt_index, callback };
        self.issue_adv_filter(params, pending, ref_value)
    }

    /// Remove a filter index together with all of its conditions
    pub fn adv_filter_clear_all(
        &mut self,
        filt_index: u8,
        ref_value: u32,
        callback: Option<Completion<AdvFilterResult>>,
    ) -> BtmResult {
        self.adv_filter_param_setup(FilterAction::Delete, filt_index, None, ref_value, callback)
    }

    /// Completion of the vendor advertising filter command
    pub fn on_adv_filter_vsc_complete(&mut self, params: &[u8]) {
        let Some((hci_status, sub_opcode, rest)) = super::split_vsc_complete(params) else {
            warn!("short adv filter completion: {}", hex::encode(params));
            if let Some(op) = self.adv_filter.queue.discard_head() {
                self.complete_adv_filter_op(op, BtmStatus::ErrProcessing, &[]);
            }
            return;
        };
        match self.adv_filter.queue.dequeue(sub_opcode) {
            Ok(op) => self.complete_adv_filter_op(op, BtmStatus::from_hci(hci_status), rest),
            Err(Some(discarded)) => {
                self.complete_adv_filter_op(discarded, BtmStatus::ErrProcessing, &[])
            }
            Err(None) => {}
        }
    }

    fn complete_adv_filter_op(&mut self, op: PendingOp<PendingFilter>, status: BtmStatus, rest: &[u8]) {
        let sub_opcode = op.sub_opcode;
        let pending = op.payload;

        let mut action = pending.action;
        let mut avail_space = 0;
        if sub_opcode == PF_SUB_ENABLE {
            if status.is_success() {
                self.adv_filter.enabled = action == FilterAction::Add;
            }
        } else {
            // action, available space
            if let Some(echoed) = rest.first().copied().and_then(FilterAction::from_wire) {
                action = echoed;
            }
            avail_space = rest.get(1).copied().unwrap_or(0);
        }

        if status.is_success() && sub_opcode == PF_SUB_FEAT_SEL {
            match action {
                FilterAction::Add => {
                    self.adv_filter.filters.insert(pending.filt_index);
                }
                FilterAction::Delete => {
                    self.adv_filter.filters.remove(&pending.filt_index);
                }
                FilterAction::Clear => self.adv_filter.filters.clear(),
            }
        }

        let result = AdvFilterResult { action, sub_opcode, avail_space, status, ref_value: op.ref_value };
        if let Some(callback) = pending.callback {
            callback(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BtmConfig;
    use crate::test_utils::{addr, harness, harness_with, Captured, Harness};

    fn vendor_params(command: &HciCommand) -> &[u8] {
        match command {
            HciCommand::Vendor { ocf: OCF_VSC_ADV_FILTER, params } => params,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_enable() {
        let Harness { mut btm, hci, .. } = harness();
        let done = Captured::new();
        assert_eq!(btm.adv_filter_enable(true, 7, Some(done.callback())), Ok(Issued::Started));
        assert_eq!(vendor_params(&hci.sent()[0]), &[PF_SUB_ENABLE, 1]);

        btm.on_adv_filter_vsc_complete(&[0, PF_SUB_ENABLE, 1]);
        assert!(btm.adv_filter().is_enabled());
        let result = done.values()[0];
        assert_eq!(result.ref_value, 7);
        assert_eq!(result.status, BtmStatus::Success);
    }

    #[test]
    fn test_param_setup_and_clear_all() {
        let Harness { mut btm, hci, .. } = harness();
        let filt_params = FilterParams { feat_seln: 0x01, ..Default::default() };
        btm.adv_filter_param_setup(FilterAction::Add, 1, Some(&filt_params), 0, None).unwrap();
        let params = vendor_params(&hci.sent()[0]).to_vec();
        assert_eq!(&params[..5], &[PF_SUB_FEAT_SEL, 0, 1, 0x01, 0x00]);

        btm.on_adv_filter_vsc_complete(&[0, PF_SUB_FEAT_SEL, 0, 3]);
        assert!(btm.adv_filter().has_filter(1));

        let done = Captured::new();
        btm.adv_filter_clear_all(1, 2, Some(done.callback())).unwrap();
        assert_eq!(vendor_params(&hci.sent()[1]), &[PF_SUB_FEAT_SEL, 1, 1]);
        btm.on_adv_filter_vsc_complete(&[0, PF_SUB_FEAT_SEL, 1, 4]);
        assert!(!btm.adv_filter().has_filter(1));
        assert_eq!(done.values()[0].avail_space, 4);
        assert_eq!(done.values()[0].action, FilterAction::Delete);
    }

    #[test]
    fn test_conditions() {
        let Harness { mut btm, hci, .. } = harness();
        let by_addr = FilterCondition::Addr { bd_addr: addr(1), addr_type: AddressType::Random };
        btm.adv_filter_cond(FilterAction::Add, 0, &by_addr, 0, None).unwrap();
        let params = vendor_params(&hci.sent()[0]).to_vec();
        assert_eq!(&params[..3], &[FilterCondType::Addr as u8, 0, 0]);
        assert_eq!(&params[3..9], addr(1).as_slice());
        assert_eq!(params[9], 1);

        let by_uuid = FilterCondition::ServiceUuid { uuid: Uuid::from_u16(0x180D), mask: None };
        btm.adv_filter_cond(FilterAction::Add, 0, &by_uuid, 0, None).unwrap();
        assert_eq!(
            vendor_params(&hci.sent()[1]),
            &[FilterCondType::ServiceUuid as u8, 0, 0, 0x0D, 0x18, 0xFF, 0xFF]
        );

        let by_name = FilterCondition::LocalName(b"heart".to_vec());
        btm.adv_filter_cond(FilterAction::Delete, 0, &by_name, 0, None).unwrap();
        assert_eq!(&vendor_params(&hci.sent()[2])[..3], &[FilterCondType::LocalName as u8, 1, 0]);

        btm.adv_filter_clear_cond(0, FilterCondType::ManufacturerData, 0, None).unwrap();
        assert_eq!(vendor_params(&hci.sent()[3]), &[FilterCondType::ManufacturerData as u8, 2, 0]);
        assert_eq!(btm.adv_filter().pending(), 4);
    }

    #[test]
    fn test_rejections() {
        let Harness { mut btm, hci, .. } = harness();
        let long_name = FilterCondition::LocalName(vec![b'a'; PF_STR_LEN_MAX + 1]);
        assert_eq!(
            btm.adv_filter_cond(FilterAction::Add, 0, &long_name, 0, None),
            Err(BtmError::IllegalValue)
        );
        let bad_mask = FilterCondition::ServiceData { data: vec![1, 2], mask: vec![0xFF] };
        assert_eq!(btm.adv_filter_cond(FilterAction::Add, 0, &bad_mask, 0, None), Err(BtmError::IllegalValue));
        // Index past the controller's filter count
        assert_eq!(
            btm.adv_filter_param_setup(FilterAction::Delete, 4, None, 0, None),
            Err(BtmError::IllegalValue)
        );
        assert_eq!(btm.adv_filter_param_setup(FilterAction::Add, 0, None, 0, None), Err(BtmError::IllegalValue));
        assert!(hci.sent().is_empty());

        let Harness { mut btm, .. } = harness_with(BtmConfig::default(), |c| c.adv_filter_count = 0);
        assert_eq!(btm.adv_filter_enable(true, 0, None), Err(BtmError::ModeUnsupported));
    }

    #[test]
    fn test_queue_full() {
        let Harness { mut btm, .. } = harness();
        for _ in 0..5 {
            btm.adv_filter_enable(true, 0, None).unwrap();
        }
        assert_eq!(btm.adv_filter_enable(true, 0, None), Err(BtmError::NoResources));
    }

    #[test]
    fn test_mismatch_fails_head() {
        let Harness { mut btm, .. } = harness();
        let first = Captured::new();
        let second = Captured::new();
        btm.adv_filter_enable(true, 1, Some(first.callback())).unwrap();
        btm.adv_filter_clear_cond(0, FilterCondType::Addr, 2, Some(second.callback())).unwrap();

        // Completion for the second command arrives first
        btm.on_adv_filter_vsc_complete(&[0, FilterCondType::Addr as u8, 2, 5]);
        assert_eq!(first.values()[0].status, BtmStatus::ErrProcessing);
        assert_eq!(first.values()[0].sub_opcode, PF_SUB_ENABLE);
        assert_eq!(first.values()[0].ref_value, 1);
        assert!(!btm.adv_filter().is_enabled());

        btm.on_adv_filter_vsc_complete(&[0, FilterCondType::Addr as u8, 2, 5]);
        assert_eq!(second.values()[0].ref_value, 2);
        assert_eq!(second.values()[0].action, FilterAction::Clear);
        assert_eq!(first.values().len(), 1);
    }

    #[test]
    fn test_short_completion_fails_head() {
        let Harness { mut btm, .. } = harness();
        let first = Captured::new();
        let second = Captured::new();
        btm.adv_filter_enable(true, 1, Some(first.callback())).unwrap();
        btm.adv_filter_enable(false, 2, Some(second.callback())).unwrap();

        btm.on_adv_filter_vsc_complete(&[0x0C]);
        assert_eq!(first.values()[0].status, BtmStatus::ErrProcessing);
        assert_eq!(btm.adv_filter().pending(), 1);

        // The next completion lines up with the second request
        btm.on_adv_filter_vsc_complete(&[0, PF_SUB_ENABLE]);
        assert_eq!(second.values()[0].ref_value, 2);
        assert_eq!(second.values()[0].status, BtmStatus::Success);
        assert_eq!(btm.adv_filter().pending(), 0);
        assert!(!btm.adv_filter().is_enabled());
    }
}
