//! Bounded table of ACL links

use super::types::*;
use crate::callbacks::Completion;
use crate::types::{BdAddr, Transport};

/// Slot table of [`AclConn`]s plus the request state shared across links
pub struct AclTable {
    links: Vec<Option<AclConn>>,
    pub(crate) busy: BusyState,
    /// Outstanding role switch callback and its reference data
    pub(crate) switch_cb: Option<Completion<RoleSwitchResult>>,
    pub(crate) switch_ref: Option<RoleSwitchResult>,
    pub(crate) rssi_cb: Option<Completion<RssiResult>>,
    pub(crate) link_quality_cb: Option<Completion<LinkQualityResult>>,
}

impl AclTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            links: (0..capacity).map(|_| None).collect(),
            busy: BusyState::default(),
            switch_cb: None,
            switch_ref: None,
            rssi_cb: None,
            link_quality_cb: None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &AclConn> {
        self.links.iter().flatten()
    }

    pub fn num_links(&self) -> usize {
        self.iter().count()
    }

    pub fn get(&self, idx: usize) -> Option<&AclConn> {
        self.links.get(idx).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut AclConn> {
        self.links.get_mut(idx).and_then(Option::as_mut)
    }

    pub fn find_index(&self, addr: &BdAddr, transport: Transport) -> Option<usize> {
        self.links.iter().position(|slot| {
            slot.as_ref()
                .is_some_and(|conn| conn.remote_addr == *addr && conn.transport == transport)
        })
    }

    pub fn find(&self, addr: &BdAddr, transport: Transport) -> Option<&AclConn> {
        self.find_index(addr, transport).and_then(|idx| self.get(idx))
    }

    pub fn find_mut(&mut self, addr: &BdAddr, transport: Transport) -> Option<&mut AclConn> {
        let idx = self.find_index(addr, transport)?;
        self.get_mut(idx)
    }

    pub fn find_index_by_handle(&self, handle: u16) -> Option<usize> {
        self.links
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|conn| conn.hci_handle == handle))
    }

    pub fn find_by_handle(&self, handle: u16) -> Option<&AclConn> {
        self.find_index_by_handle(handle).and_then(|idx| self.get(idx))
    }

    /// Place a new link in a free slot
    pub fn alloc(&mut self, conn: AclConn) -> Option<usize> {
        let idx = self.links.iter().position(Option::is_none)?;
        self.links[idx] = Some(conn);
        Some(idx)
    }

    /// Clear a slot, returning what was in it
    pub fn release(&mut self, idx: usize) -> Option<AclConn> {
        self.links.get_mut(idx).and_then(Option::take)
    }

    /// Recompute the busy level for `event`
    ///
    /// Returns the new level and activity when either the level or the
    /// inquiry flag moved since the last notification.
    pub fn update_busy_level(&mut self, event: BusyEvent) -> Option<(u8, BusyActivity)> {
        let old_inquiry = self.busy.is_inquiry;

        let activity = match event {
            BusyEvent::AclUp | BusyEvent::AclDown => BusyActivity::None,
            BusyEvent::Paging => {
                self.busy.is_paging = true;
                BusyActivity::PagingStarted
            }
            BusyEvent::PagingDone => {
                self.busy.is_paging = false;
                BusyActivity::PagingComplete
            }
            BusyEvent::Inquiry => {
                self.busy.is_inquiry = true;
                BusyActivity::InquiryStarted
            }
            BusyEvent::InquiryCancel => {
                self.busy.is_inquiry = false;
                BusyActivity::InquiryCancelled
            }
            BusyEvent::InquiryDone => {
                self.busy.is_inquiry = false;
                BusyActivity::InquiryComplete
            }
        };

        let level = if self.busy.is_paging || self.busy.is_inquiry {
            BUSY_LEVEL_PAGING_OR_INQUIRY
        } else {
            self.num_links().min(u8::MAX as usize) as u8
        };

        if level != self.busy.last_level || old_inquiry != self.busy.is_inquiry {
            self.busy.last_level = level;
            Some((level, activity))
        } else {
            None
        }
    }
}
