use std::collections::HashSet;

use log::debug;

use crate::callbacks::Completion;
use crate::error::BtmStatus;
use crate::inq::types::{
    InqCompletion, InqDbEntry, InqMode, InqParams, InqResults, InqResultsCallback, InqState,
    ScanType, TxPowerResult,
};
use crate::inq::RemoteName;
use crate::types::{BdAddr, Transport};

/// A remote name request waiting for its completion event
pub(crate) struct PendingRemoteName {
    pub bd_addr: BdAddr,
    pub transport: Transport,
    pub callback: Completion<RemoteName>,
}

/// Inquiry control block and results database
///
/// The database is a fixed set of slots. A session counter tags entries so a
/// new inquiry overwrites stale data instead of merging with it.
pub struct InquiryEngine {
    db: Vec<Option<InqDbEntry>>,
    pub(crate) report_dup: bool,
    pub(crate) state: InqState,
    /// Modes still running; empty when idle
    pub(crate) active: InqMode,
    pub(crate) params: InqParams,
    /// A set-event-filter command is outstanding
    pub(crate) filter_active: bool,
    /// Filter completions to swallow after a cancel
    pub(crate) pending_filt_complete_event: u8,
    pub(crate) counter: u32,
    pub(crate) num_resp: u8,
    pub(crate) per_min_delay: u16,
    pub(crate) per_max_delay: u16,
    pub(crate) scan_type: ScanType,
    pub(crate) results_cb: Option<InqResultsCallback>,
    pub(crate) cmpl_cb: Option<Completion<InqCompletion>>,
    pub(crate) obs_results_cb: Option<InqResultsCallback>,
    pub(crate) obs_cmpl_cb: Option<Completion<InqCompletion>>,
    pub(crate) remname: Option<PendingRemoteName>,
    pub(crate) tx_power_cb: Option<Completion<TxPowerResult>>,
    /// Addresses reported this session, bounded by the database size
    seen: HashSet<BdAddr>,
    tick: u64,
}

impl InquiryEngine {
    pub fn new(max_db: usize, report_dup: bool) -> Self {
        Self {
            db: (0..max_db).map(|_| None).collect(),
            report_dup,
            state: InqState::Inactive,
            active: InqMode::empty(),
            params: InqParams::default(),
            filter_active: false,
            pending_filt_complete_event: 0,
            counter: 1,
            num_resp: 0,
            per_min_delay: 0,
            per_max_delay: 0,
            scan_type: ScanType::None,
            results_cb: None,
            cmpl_cb: None,
            obs_results_cb: None,
            obs_cmpl_cb: None,
            remname: None,
            tx_power_cb: None,
            seen: HashSet::with_capacity(max_db),
            tick: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.db.len()
    }

    pub fn len(&self) -> usize {
        self.db.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_active(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn state(&self) -> InqState {
        self.state
    }

    pub fn session_counter(&self) -> u32 {
        self.counter
    }

    pub fn find_index(&self, addr: &BdAddr) -> Option<usize> {
        self.db
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|e| e.results.remote_addr == *addr))
    }

    pub fn find(&self, addr: &BdAddr) -> Option<&InqDbEntry> {
        self.find_index(addr).and_then(|idx| self.get(idx))
    }

    pub fn get(&self, idx: usize) -> Option<&InqDbEntry> {
        self.db.get(idx).and_then(|slot| slot.as_ref())
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut InqDbEntry> {
        self.db.get_mut(idx).and_then(|slot| slot.as_mut())
    }

    pub(crate) fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Take a slot for `addr`: a free one, else the one with the oldest response
    pub fn alloc(&mut self, addr: BdAddr) -> usize {
        let idx = match self.db.iter().position(|slot| slot.is_none()) {
            Some(idx) => idx,
            None => self
                .db
                .iter()
                .enumerate()
                .min_by_key(|(_, slot)| slot.as_ref().map_or(0, |e| e.time_of_resp))
                .map_or(0, |(idx, _)| idx),
        };

        let time_of_resp = self.next_tick();
        self.db[idx] = Some(InqDbEntry {
            results: InqResults { remote_addr: addr, ..Default::default() },
            time_of_resp,
            ..Default::default()
        });
        idx
    }

    /// Drop one entry, or every entry when `addr` is `None`
    pub fn clear(&mut self, addr: Option<&BdAddr>) {
        for slot in self.db.iter_mut() {
            let matches = match (addr, slot.as_ref()) {
                (_, None) => false,
                (None, Some(_)) => true,
                (Some(addr), Some(entry)) => entry.results.remote_addr == *addr,
            };
            if matches {
                *slot = None;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &InqDbEntry> {
        self.db.iter().flatten()
    }

    pub fn first(&self) -> Option<&InqResults> {
        self.iter().next().map(|e| &e.results)
    }

    /// Entry following the one for `addr`, in slot order
    pub fn next_after(&self, addr: &BdAddr) -> Option<&InqResults> {
        let idx = self.find_index(addr)?;
        self.db[idx + 1..].iter().flatten().next().map(|e| &e.results)
    }

    /// Record `addr` for this session; false if it was already seen
    ///
    /// Once the set holds as many addresses as the database has slots, new
    /// addresses are no longer recorded and keep counting as unseen.
    pub(crate) fn mark_seen(&mut self, addr: BdAddr) -> bool {
        if self.seen.contains(&addr) {
            return false;
        }
        if self.seen.len() >= self.db.len() {
            debug!("inquiry seen list full, {} not recorded", addr);
            return true;
        }
        self.seen.insert(addr)
    }

    pub(crate) fn clear_seen(&mut self) {
        self.seen.clear();
    }

    /// Reorder the entries by descending RSSI; entries without RSSI go last
    pub fn sort_by_rssi(&mut self) {
        let mut entries: Vec<InqDbEntry> = self.db.iter_mut().filter_map(Option::take).collect();
        entries.sort_by(|a, b| b.results.rssi.cmp(&a.results.rssi));
        for (slot, entry) in self.db.iter_mut().zip(entries) {
            *slot = Some(entry);
        }
    }

    pub(crate) fn completion(&self, status: BtmStatus) -> InqCompletion {
        InqCompletion { status, num_resp: self.num_resp }
    }
}
