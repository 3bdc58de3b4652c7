//! Upward notification interface
//!
//! Link-level notifications that are not tied to a single request go through
//! [`BtmEvents`]. Per-request completions (role switch, RSSI, remote name,
//! vendor commands...) are boxed closures passed to the request itself.

use crate::acl::BusyActivity;
use crate::ble::{ResolvingListEvent, WhiteListOp};
use crate::error::BtmStatus;
use crate::types::{BdAddr, LinkRole, Transport};

/// Busy level notification payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyLevelUpdate {
    /// 10 while paging or inquiring, otherwise the number of ACL links
    pub busy_level: u8,
    /// What moved the level this time
    pub activity: BusyActivity,
}

/// Link-level notifications; every method defaults to a no-op
pub trait BtmEvents {
    fn on_busy_level(&mut self, _update: BusyLevelUpdate) {}

    /// Feature exchange on a new link finished
    fn on_link_up(&mut self, _bd_addr: BdAddr, _handle: u16, _transport: Transport) {}

    fn on_link_down(&mut self, _bd_addr: BdAddr, _handle: u16, _transport: Transport) {}

    fn on_role_changed(&mut self, _bd_addr: BdAddr, _new_role: LinkRole, _hci_status: u8) {}

    /// Both sides tried to open a link at the same time
    fn on_connection_collision(&mut self, _bd_addr: BdAddr) {}

    /// Read the GAP device name of an LE peer; answer with
    /// [`Btm::on_le_remote_name`](crate::Btm::on_le_remote_name)
    fn on_le_remote_name_request(&mut self, _bd_addr: BdAddr) {}

    fn on_le_remote_name_cancel(&mut self, _bd_addr: BdAddr) {}

    fn on_white_list_complete(&mut self, _op: WhiteListOp, _status: BtmStatus) {}

    /// A white-listed device advertised during a selective connection
    /// scan; the layer above decides whether to connect
    fn on_le_select_conn(&mut self, _bd_addr: BdAddr) {}

    fn on_resolving_list(&mut self, _event: ResolvingListEvent) {}

    /// Batch-scan storage crossed its notification threshold
    fn on_batch_scan_threshold(&mut self) {}
}

/// Sink that drops every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvents;

impl BtmEvents for NoopEvents {}

/// One-shot completion callback
pub type Completion<T> = Box<dyn FnOnce(T)>;
