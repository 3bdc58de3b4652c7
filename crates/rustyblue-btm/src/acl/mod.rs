//! ACL link table
//!
//! Tracks every ACL link from the connection complete event until the
//! disconnection, walks the remote feature pages after a link comes up, and
//! drives the role switch sub-state machine:
//!
//! ```text
//! Idle -> ModeChange -> EncryptionOff -> Switching -> EncryptionOn -> Idle
//!                    \-> InProgress -----------------------------/
//! ```

pub mod table;
pub mod types;


pub use table::AclTable;
pub use types::{
    AclConn, BusyActivity, BusyEvent, BusyState, LinkPolicy, LinkQualityResult, PacketTypes,
    RoleSwitchResult, RssiResult, RsDiscPending, SwitchState, BUSY_LEVEL_PAGING_OR_INQUIRY,
};

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, error, info, warn};

use crate::btm::Btm;
use crate::callbacks::{BusyLevelUpdate, Completion};
use crate::dev::{SecFlags, MAX_FEATURE_PAGES};
use crate::error::{BtmError, BtmResult, BtmStatus, Issued};
use crate::hci::constants::*;
use crate::hci::HciCommand;
use crate::timer::BtmTimer;
use crate::types::{BdAddr, BdName, DevClass, DeviceType, LinkRole, PowerMode, Transport};

impl Btm {
    // ---------------------------------------------------------------------
    // Link lifecycle
    // ---------------------------------------------------------------------

    /// A link came up (or the controller repeated the notification)
    pub fn link_created(
        &mut self,
        bd_addr: BdAddr,
        dev_class: Option<DevClass>,
        name: Option<BdName>,
        hci_handle: u16,
        link_role: LinkRole,
        transport: Transport,
    ) {
        if let Some(idx) = self.acl.find_index(&bd_addr, transport) {
            if let Some(conn) = self.acl.get_mut(idx) {
                debug!("link_created: duplicate for {} handle {:#06x}", bd_addr, hci_handle);
                conn.hci_handle = hci_handle;
                conn.link_role = link_role;
            }
            if transport == Transport::BrEdr {
                self.apply_default_link_policy(idx);
            }
            return;
        }

        let mut conn = AclConn::new(
            bd_addr,
            hci_handle,
            link_role,
            transport,
            self.config.link_supervision_timeout,
        );
        if let Some(dev_class) = dev_class {
            conn.dev_class = dev_class;
        }
        conn.name = name;

        let Some(idx) = self.acl.alloc(conn) else {
            error!("link_created: no free ACL slot for {}", bd_addr);
            return;
        };
        info!("link_created: {} handle {:#06x} {:?} {:?}", bd_addr, hci_handle, transport, link_role);

        let is_new = self.devices.find(&bd_addr).is_none();
        let dev_idx = self.devices.find_or_allocate_index(bd_addr);
        let mut cached = None;
        if let Some(record) = self.devices.get_mut(dev_idx) {
            let seen_as = match transport {
                Transport::BrEdr => {
                    record.hci_handle = Some(hci_handle);
                    DeviceType::BrEdr
                }
                Transport::Le => {
                    record.ble_hci_handle = Some(hci_handle);
                    DeviceType::Ble
                }
            };
            record.device_type =
                if is_new { seen_as } else { record.device_type.union(seen_as) };
            if let Some(dev_class) = dev_class {
                record.dev_class = dev_class;
            }
            if record.has_cached_features() {
                cached = Some((record.features, record.num_read_pages));
            }
        }

        match transport {
            Transport::BrEdr => {
                if self.send(HciCommand::ReadClockOffset { handle: hci_handle }).is_err()
                    || self.send(HciCommand::ReadRemoteVersion { handle: hci_handle }).is_err()
                {
                    warn!("link_created: could not query {} version/clock offset", bd_addr);
                }

                if let Some((features, num_pages)) = cached {
                    debug!("link_created: using {} cached feature pages", num_pages);
                    if let Some(conn) = self.acl.get_mut(idx) {
                        conn.peer_features = features;
                        conn.num_read_pages = num_pages;
                    }
                    if let Some(record) = self.devices.get_mut(dev_idx) {
                        record.apply_peer_sec_caps();
                    }
                    self.establish_continue(idx);
                } else if self.send(HciCommand::ReadRemoteFeatures { handle: hci_handle }).is_err() {
                    warn!("link_created: remote features read not sent, continuing");
                    self.establish_continue(idx);
                }
            }
            Transport::Le => {
                let read_features = link_role == LinkRole::Master
                    || self.controller.supports_ble_slave_init_feature_exchange();
                if !read_features
                    || self.send(HciCommand::LeReadRemoteFeatures { handle: hci_handle }).is_err()
                {
                    self.establish_continue(idx);
                }
            }
        }
    }

    /// Page 0 of the remote LMP features arrived
    pub fn on_remote_features_complete(&mut self, hci_handle: u16, hci_status: u8, features: [u8; 8]) {
        let Some(idx) = self.acl.find_index_by_handle(hci_handle) else {
            warn!("remote features for unknown handle {:#06x}", hci_handle);
            return;
        };

        if hci_status != HCI_SUCCESS {
            warn!("remote features read failed ({:#04x})", hci_status);
            self.process_remote_ext_features(idx, 0);
            self.establish_continue(idx);
            return;
        }

        if let Some(conn) = self.acl.get_mut(idx) {
            conn.peer_features[0] = features;
        }

        if feature_supported(&features, LMP_EXTENDED_FEATURES)
            && self.controller.supports_reading_remote_ext_features()
            && self.send(HciCommand::ReadRemoteExtFeatures { handle: hci_handle, page: 1 }).is_ok()
        {
            return;
        }

        self.process_remote_ext_features(idx, 1);
        self.establish_continue(idx);
    }

    /// One extended feature page arrived
    pub fn on_remote_ext_features_complete(
        &mut self,
        hci_handle: u16,
        hci_status: u8,
        page_num: u8,
        max_page: u8,
        features: [u8; 8],
    ) {
        let Some(idx) = self.acl.find_index_by_handle(hci_handle) else {
            warn!("remote ext features for unknown handle {:#06x}", hci_handle);
            return;
        };

        let page = page_num as usize;
        if hci_status != HCI_SUCCESS || page == 0 || page >= MAX_FEATURE_PAGES {
            warn!("remote ext features page {} failed ({:#04x})", page_num, hci_status);
            self.process_remote_ext_features(idx, 1);
            self.establish_continue(idx);
            return;
        }

        if let Some(conn) = self.acl.get_mut(idx) {
            conn.peer_features[page] = features;
        }

        let last_page = (MAX_FEATURE_PAGES - 1) as u8;
        if page_num < max_page
            && page_num < last_page
            && self
                .send(HciCommand::ReadRemoteExtFeatures { handle: hci_handle, page: page_num + 1 })
                .is_ok()
        {
            return;
        }

        self.process_remote_ext_features(idx, page_num + 1);
        self.establish_continue(idx);
    }

    /// LE remote features arrived
    pub fn on_ble_remote_features_complete(&mut self, hci_handle: u16, hci_status: u8, features: [u8; 8]) {
        let Some(idx) = self.acl.find_index_by_handle(hci_handle) else {
            return;
        };
        if hci_status == HCI_SUCCESS {
            if let Some(conn) = self.acl.get_mut(idx) {
                conn.peer_le_features = features;
            }
        }
        self.establish_continue(idx);
    }

    /// Copy the pages read so far into the device record
    fn process_remote_ext_features(&mut self, idx: usize, num_pages: u8) {
        let Some(conn) = self.acl.get_mut(idx) else {
            return;
        };
        conn.num_read_pages = num_pages;
        let (addr, handle, features) = (conn.remote_addr, conn.hci_handle, conn.peer_features);

        let dev_idx = match self.devices.find_index_by_handle(handle) {
            Some(dev_idx) => dev_idx,
            None => self.devices.find_or_allocate_index(addr),
        };
        if let Some(record) = self.devices.get_mut(dev_idx) {
            record.features = features;
            record.num_read_pages = num_pages;
            record.apply_peer_sec_caps();
        }
    }

    /// Feature exchange is over: report the link up
    fn establish_continue(&mut self, idx: usize) {
        let Some(conn) = self.acl.get(idx) else {
            return;
        };
        let (addr, handle, transport) = (conn.remote_addr, conn.hci_handle, conn.transport);

        if transport == Transport::BrEdr {
            if let Err(err) = self.set_packet_types_at(idx, self.config.default_packet_types) {
                warn!("could not set packet types on {}: {}", addr, err);
            }
            self.apply_default_link_policy(idx);
        }

        if let Some(conn) = self.acl.get_mut(idx) {
            conn.link_up_issued = true;
        }
        self.events.on_link_up(addr, handle, transport);
        self.update_busy_level(BusyEvent::AclUp);
    }

    fn apply_default_link_policy(&mut self, idx: usize) {
        let policy = self.config.default_link_policy;
        if policy.is_empty() {
            return;
        }
        if let Err(err) = self.set_link_policy_at(idx, policy) {
            warn!("could not apply default link policy: {}", err);
        }
    }

    /// A link went down
    pub fn link_removed(&mut self, bd_addr: BdAddr, transport: Transport) {
        let Some(idx) = self.acl.find_index(&bd_addr, transport) else {
            return;
        };

        self.report_role_change(HCI_ERR_NO_CONNECTION, Some(bd_addr));

        let Some(conn) = self.acl.release(idx) else {
            return;
        };
        info!("link_removed: {} handle {:#06x}", bd_addr, conn.hci_handle);

        if let Some(record) = self.devices.find_mut(&bd_addr) {
            match transport {
                Transport::Le => {
                    record.ble_hci_handle = None;
                    record.sec_flags &= !(SecFlags::LE_ENCRYPTED | SecFlags::ROLE_SWITCHED);
                    if !record.sec_flags.contains(SecFlags::LE_LINK_KEY_KNOWN) {
                        record.sec_flags &=
                            !(SecFlags::LE_LINK_KEY_AUTHED | SecFlags::LE_AUTHENTICATED);
                    }
                }
                Transport::BrEdr => {
                    record.hci_handle = None;
                    record.sec_flags &= !(SecFlags::AUTHORIZED
                        | SecFlags::AUTHENTICATED
                        | SecFlags::ENCRYPTED
                        | SecFlags::ROLE_SWITCHED);
                }
            }
        }

        if conn.link_up_issued {
            self.events.on_link_down(bd_addr, conn.hci_handle, transport);
            self.update_busy_level(BusyEvent::AclDown);
        }
    }

    /// The controller reports a connection collision with `bd_addr`
    pub fn on_connection_collision(&mut self, bd_addr: BdAddr) {
        self.events.on_connection_collision(bd_addr);
    }

    pub fn is_acl_connected(&self, bd_addr: &BdAddr, transport: Transport) -> bool {
        self.acl.find(bd_addr, transport).is_some()
    }

    pub fn num_acl_links(&self) -> usize {
        self.acl.num_links()
    }

    /// Page 0 of the remote features, once read
    pub fn read_remote_features(&self, bd_addr: &BdAddr) -> Option<[u8; 8]> {
        self.acl
            .find(bd_addr, Transport::BrEdr)
            .filter(|conn| conn.num_read_pages > 0)
            .map(|conn| conn.peer_features[0])
    }

    pub fn link_role(&self, bd_addr: &BdAddr, transport: Transport) -> BtmResult<LinkRole> {
        self.acl.find(bd_addr, transport).map(|conn| conn.link_role).ok_or(BtmError::UnknownAddr)
    }

    /// Mark whether a SCO link rides on this ACL (blocks role switches)
    pub fn set_sco_active(&mut self, bd_addr: &BdAddr, active: bool) {
        if let Some(conn) = self.acl.find_mut(bd_addr, Transport::BrEdr) {
            conn.sco_active = active;
        }
    }

    /// Remote version information arrived
    pub fn on_remote_version_complete(
        &mut self,
        hci_handle: u16,
        hci_status: u8,
        lmp_version: u8,
        manufacturer: u16,
        lmp_subversion: u16,
    ) {
        if hci_status != HCI_SUCCESS {
            return;
        }
        if let Some(idx) = self.acl.find_index_by_handle(hci_handle) {
            if let Some(conn) = self.acl.get_mut(idx) {
                conn.lmp_version = lmp_version;
                conn.manufacturer = manufacturer;
                conn.lmp_subversion = lmp_subversion;
            }
        }
    }

    pub fn on_clock_offset_complete(&mut self, hci_handle: u16, hci_status: u8, clock_offset: u16) {
        if hci_status != HCI_SUCCESS {
            return;
        }
        if let Some(idx) = self.acl.find_index_by_handle(hci_handle) {
            if let Some(conn) = self.acl.get_mut(idx) {
                conn.clock_offset = clock_offset;
            }
        }
    }

    // ---------------------------------------------------------------------
    // Busy level
    // ---------------------------------------------------------------------

    /// Feed a paging/inquiry/ACL transition into the busy level
    pub fn update_busy_level(&mut self, event: BusyEvent) {
        if let Some((busy_level, activity)) = self.acl.update_busy_level(event) {
            debug!("busy level {} ({:?})", busy_level, activity);
            self.events.on_busy_level(BusyLevelUpdate { busy_level, activity });
        }
    }

    // ---------------------------------------------------------------------
    // Role switch
    // ---------------------------------------------------------------------

    fn epr_available(&self, conn: &AclConn) -> bool {
        feature_supported(&conn.peer_features[0], LMP_PAUSE_ENCRYPTION)
            && self.controller.supports_encryption_pause()
    }

    fn link_encrypted(&self, bd_addr: &BdAddr) -> bool {
        self.devices
            .find(bd_addr)
            .is_some_and(|record| record.sec_flags.contains(SecFlags::ENCRYPTED))
    }

    /// Ask for `new_role` on the classic link to `bd_addr`
    pub fn switch_role(
        &mut self,
        bd_addr: BdAddr,
        new_role: LinkRole,
        callback: Option<Completion<RoleSwitchResult>>,
    ) -> BtmResult {
        if !self.controller.supports_role_switch() {
            return Err(BtmError::ModeUnsupported);
        }

        if self.acl.switch_cb.is_some() && callback.is_some() {
            return Err(BtmError::Busy);
        }

        let Some(idx) = self.acl.find_index(&bd_addr, Transport::BrEdr) else {
            return Err(BtmError::UnknownAddr);
        };
        let Some(conn) = self.acl.get(idx) else {
            return Err(BtmError::UnknownAddr);
        };

        if conn.link_role == new_role {
            return Ok(Issued::Done);
        }
        if conn.sco_active {
            return Err(BtmError::NoResources);
        }
        if !conn.switch_state.is_idle() {
            debug!("switch_role: {} busy in {:?}", bd_addr, conn.switch_state);
            return Err(BtmError::Busy);
        }

        let handle = conn.hci_handle;
        let power_mode = conn.power_mode;
        let needs_encrypt_off = self.link_encrypted(&bd_addr) && !self.epr_available(conn);

        let next_state = match power_mode {
            PowerMode::Sniff | PowerMode::Park => {
                let wake = if power_mode == PowerMode::Sniff {
                    HciCommand::ExitSniffMode { handle }
                } else {
                    HciCommand::ExitParkMode { handle }
                };
                self.send(wake).map_err(|_| BtmError::WrongMode)?;
                SwitchState::ModeChange
            }
            _ if needs_encrypt_off => {
                self.send(HciCommand::SetConnEncryption { handle, enable: false })?;
                SwitchState::EncryptionOff
            }
            _ => {
                self.send(HciCommand::SwitchRole { bd_addr, role: new_role.to_hci() })?;
                SwitchState::InProgress
            }
        };

        if let Some(conn) = self.acl.get_mut(idx) {
            conn.switch_state = next_state;
            conn.rs_disc_pending = RsDiscPending::Pending;
        }

        self.acl.switch_ref = Some(RoleSwitchResult {
            remote_addr: bd_addr,
            role: new_role,
            hci_status: HCI_ERR_UNSUPPORTED_VALUE,
        });
        if callback.is_some() {
            self.acl.switch_cb = callback;
        }

        Ok(Issued::Started)
    }

    /// Fire the pending role switch callback if it belongs to `bd_addr`
    fn report_role_change(&mut self, hci_status: u8, bd_addr: Option<BdAddr>) {
        let Some(mut reference) = self.acl.switch_ref else {
            return;
        };
        if bd_addr.is_some_and(|addr| addr != reference.remote_addr) {
            return;
        }

        reference.hci_status = hci_status;
        self.acl.switch_ref = None;
        if let Some(callback) = self.acl.switch_cb.take() {
            callback(reference);
        }
    }

    /// Send the disconnect that was held back while the switch ran
    fn finish_switch(&mut self, idx: usize) {
        let Some(conn) = self.acl.get_mut(idx) else {
            return;
        };
        let deferred = std::mem::take(&mut conn.rs_disc_pending);
        let handle = conn.hci_handle;

        if let RsDiscPending::DiscPending(reason) = deferred {
            info!("sending disconnect deferred by role switch (reason {:#04x})", reason);
            if self.send(HciCommand::Disconnect { handle, reason }).is_err() {
                warn!("deferred disconnect for handle {:#06x} not sent", handle);
            }
        }
    }

    /// The controller finished a mode change on a link
    pub fn on_mode_change(&mut self, hci_handle: u16, hci_status: u8, mode: PowerMode) {
        let Some(idx) = self.acl.find_index_by_handle(hci_handle) else {
            return;
        };
        let Some(conn) = self.acl.get_mut(idx) else {
            return;
        };
        if hci_status == HCI_SUCCESS {
            conn.power_mode = mode;
        }
        if conn.switch_state == SwitchState::ModeChange {
            self.continue_role_switch(idx);
        }
    }

    /// Resume a role switch that was waiting for the link to wake up
    fn continue_role_switch(&mut self, idx: usize) {
        let Some(conn) = self.acl.get(idx) else {
            return;
        };
        let (addr, handle, role) = (conn.remote_addr, conn.hci_handle, conn.link_role);
        let needs_encrypt_off = self.link_encrypted(&addr) && !self.epr_available(conn);

        let (command, next_state) = if needs_encrypt_off {
            (HciCommand::SetConnEncryption { handle, enable: false }, SwitchState::EncryptionOff)
        } else {
            (
                HciCommand::SwitchRole { bd_addr: addr, role: role.opposite().to_hci() },
                SwitchState::InProgress,
            )
        };

        let sent = self.send(command).is_ok();
        if let Some(conn) = self.acl.get_mut(idx) {
            conn.switch_state = if sent { next_state } else { SwitchState::Idle };
        }
        if !sent {
            let status = self.acl.switch_ref.map_or(HCI_ERR_UNSPECIFIED, |r| r.hci_status);
            self.report_role_change(status, Some(addr));
        }
    }

    /// Encryption changed on a link
    pub fn on_encryption_change(&mut self, hci_handle: u16, hci_status: u8, encr_enable: bool) {
        let Some(idx) = self.acl.find_index_by_handle(hci_handle) else {
            return;
        };
        let Some(conn) = self.acl.get(idx) else {
            return;
        };
        let (addr, role, state) = (conn.remote_addr, conn.link_role, conn.switch_state);

        if hci_status == HCI_SUCCESS {
            if let Some(record) = self.devices.find_mut(&addr) {
                record.sec_flags.set(SecFlags::ENCRYPTED, encr_enable);
            }
        }

        match state {
            SwitchState::EncryptionOff => {
                let next = if encr_enable { SwitchState::InProgress } else { SwitchState::Switching };
                let sent = self
                    .send(HciCommand::SwitchRole { bd_addr: addr, role: role.opposite().to_hci() })
                    .is_ok();
                if let Some(conn) = self.acl.get_mut(idx) {
                    conn.switch_state = if sent { next } else { SwitchState::Idle };
                }
                if !sent {
                    let status = self.acl.switch_ref.map_or(HCI_ERR_UNSPECIFIED, |r| r.hci_status);
                    self.report_role_change(status, Some(addr));
                }
            }
            SwitchState::EncryptionOn => {
                if let Some(conn) = self.acl.get_mut(idx) {
                    conn.switch_state = SwitchState::Idle;
                }
                let status = self.acl.switch_ref.map_or(HCI_SUCCESS, |r| r.hci_status);
                self.report_role_change(status, Some(addr));
                self.events.on_role_changed(addr, role, status);
                self.finish_switch(idx);
            }
            _ => {}
        }
    }

    /// The controller reports a role change (or a failed attempt)
    pub fn on_role_changed(&mut self, hci_status: u8, bd_addr: BdAddr, new_role: LinkRole) {
        let Some(idx) = self.acl.find_index(&bd_addr, Transport::BrEdr) else {
            if hci_status != HCI_SUCCESS {
                self.report_role_change(hci_status, Some(bd_addr));
            }
            return;
        };

        if let Some(reference) = self.acl.switch_ref.as_mut() {
            if reference.remote_addr == bd_addr {
                reference.hci_status = hci_status;
            }
        }

        let Some(conn) = self.acl.get_mut(idx) else {
            return;
        };
        let role = if hci_status == HCI_SUCCESS {
            conn.link_role = new_role;
            new_role
        } else {
            conn.link_role
        };
        if let Some(reference) = self.acl.switch_ref.as_mut() {
            if reference.remote_addr == bd_addr {
                reference.role = role;
            }
        }

        let Some(conn) = self.acl.get(idx) else {
            return;
        };
        let (handle, state, super_tout) = (conn.hci_handle, conn.switch_state, conn.link_super_tout);

        if hci_status == HCI_SUCCESS && role == LinkRole::Master {
            let command = HciCommand::WriteLinkSupervisionTimeout { handle, timeout: super_tout };
            if self.send(command).is_err() {
                warn!("could not reapply supervision timeout on {}", bd_addr);
            }
        }

        if state == SwitchState::Switching
            && self.send(HciCommand::SetConnEncryption { handle, enable: true }).is_ok()
        {
            if let Some(conn) = self.acl.get_mut(idx) {
                conn.switch_state = SwitchState::EncryptionOn;
            }
            return;
        }

        if matches!(state, SwitchState::InProgress | SwitchState::Switching) {
            if let Some(conn) = self.acl.get_mut(idx) {
                conn.switch_state = SwitchState::Idle;
            }
        }

        self.report_role_change(hci_status, Some(bd_addr));
        self.events.on_role_changed(bd_addr, role, hci_status);
        self.finish_switch(idx);
    }

    /// Disconnect a link, holding the request back while a role switch runs
    pub fn disconnect(&mut self, hci_handle: u16, reason: u8) -> BtmResult {
        let Some(idx) = self.acl.find_index_by_handle(hci_handle) else {
            return Err(BtmError::UnknownAddr);
        };
        if let Some(conn) = self.acl.get_mut(idx) {
            if conn.rs_disc_pending == RsDiscPending::Pending {
                debug!("disconnect of {:#06x} deferred until role switch completes", hci_handle);
                conn.rs_disc_pending = RsDiscPending::DiscPending(reason);
                return Ok(Issued::Started);
            }
        }
        self.send(HciCommand::Disconnect { handle: hci_handle, reason })?;
        Ok(Issued::Started)
    }

    // ---------------------------------------------------------------------
    // Link parameters
    // ---------------------------------------------------------------------

    /// Restrict the packet types used on the classic link to `bd_addr`
    pub fn set_packet_types(&mut self, bd_addr: &BdAddr, requested: PacketTypes) -> BtmResult {
        let idx = self.acl.find_index(bd_addr, Transport::BrEdr).ok_or(BtmError::UnknownAddr)?;
        self.set_packet_types_at(idx, requested)
    }

    fn set_packet_types_at(&mut self, idx: usize, requested: PacketTypes) -> BtmResult {
        let conn = self.acl.get(idx).ok_or(BtmError::UnknownAddr)?;
        let local = PacketTypes::from_bits_truncate(self.controller.acl_packet_types());

        let mut types = (requested & PacketTypes::SUPPORTED & local)
            | (requested & PacketTypes::EXCEPTION)
            | (local & PacketTypes::EXCEPTION);
        types = restrict_to_peer(types, &conn.peer_features[0]);

        let handle = conn.hci_handle;
        self.send(HciCommand::ChangeConnPacketType { handle, packet_types: types.bits() })?;
        if let Some(conn) = self.acl.get_mut(idx) {
            conn.pkt_types_mask = types;
        }
        Ok(Issued::Started)
    }

    /// Largest ACL payload on the link to `bd_addr`
    pub fn max_packet_size(&self, bd_addr: &BdAddr) -> Option<u16> {
        self.acl
            .find(bd_addr, Transport::BrEdr)
            .map(|conn| conn.pkt_types_mask.max_packet_size())
    }

    pub fn set_link_policy(&mut self, bd_addr: &BdAddr, policy: LinkPolicy) -> BtmResult {
        let idx = self.acl.find_index(bd_addr, Transport::BrEdr).ok_or(BtmError::UnknownAddr)?;
        self.set_link_policy_at(idx, policy)
    }

    fn set_link_policy_at(&mut self, idx: usize, mut policy: LinkPolicy) -> BtmResult {
        let local = self.controller.bredr_features();
        if !feature_supported(&local, LMP_SWITCH) {
            policy.remove(LinkPolicy::ROLE_SWITCH);
        }
        if !feature_supported(&local, LMP_SNIFF_MODE) {
            policy.remove(LinkPolicy::SNIFF);
        }

        let conn = self.acl.get(idx).ok_or(BtmError::UnknownAddr)?;
        let handle = conn.hci_handle;
        self.send(HciCommand::WriteLinkPolicy { handle, policy: policy.bits() })?;
        if let Some(conn) = self.acl.get_mut(idx) {
            conn.link_policy = policy;
        }
        Ok(Issued::Started)
    }

    /// Supervision timeout is only written while we are master
    pub fn set_link_supervision_timeout(&mut self, bd_addr: &BdAddr, timeout: u16) -> BtmResult {
        let conn = self.acl.find_mut(bd_addr, Transport::BrEdr).ok_or(BtmError::UnknownAddr)?;
        conn.link_super_tout = timeout;
        if conn.link_role != LinkRole::Master {
            return Ok(Issued::Done);
        }
        let handle = conn.hci_handle;
        self.send(HciCommand::WriteLinkSupervisionTimeout { handle, timeout })?;
        Ok(Issued::Started)
    }

    pub fn link_supervision_timeout(&self, bd_addr: &BdAddr) -> BtmResult<u16> {
        self.acl
            .find(bd_addr, Transport::BrEdr)
            .map(|conn| conn.link_super_tout)
            .ok_or(BtmError::UnknownAddr)
    }

    // ---------------------------------------------------------------------
    // RSSI / link quality
    // ---------------------------------------------------------------------

    pub fn read_rssi(
        &mut self,
        bd_addr: BdAddr,
        transport: Transport,
        callback: Completion<RssiResult>,
    ) -> BtmResult {
        if self.acl.rssi_cb.is_some() {
            callback(RssiResult { status: BtmStatus::Busy, hci_status: 0, rem_bda: bd_addr, rssi: 0 });
            return Err(BtmError::Busy);
        }
        let handle = self
            .acl
            .find(&bd_addr, transport)
            .map(|conn| conn.hci_handle)
            .ok_or(BtmError::UnknownAddr)?;

        self.timers.start(BtmTimer::Rssi, self.config.rssi_timeout);
        if let Err(err) = self.send(HciCommand::ReadRssi { handle }) {
            self.timers.stop(BtmTimer::Rssi);
            callback(RssiResult { status: err.into(), hci_status: 0, rem_bda: bd_addr, rssi: 0 });
            return Err(err);
        }
        self.acl.rssi_cb = Some(callback);
        Ok(Issued::Started)
    }

    /// Command complete for HCI_Read_RSSI: status, handle, rssi
    pub fn on_read_rssi_complete(&mut self, params: &[u8]) {
        self.timers.stop(BtmTimer::Rssi);
        let Some(callback) = self.acl.rssi_cb.take() else {
            return;
        };

        let mut result =
            RssiResult { status: BtmStatus::ErrProcessing, hci_status: 0, rem_bda: BdAddr::ANY, rssi: 0 };
        let mut cursor = Cursor::new(params);
        if let (Ok(hci_status), Ok(handle), Ok(rssi)) = (
            cursor.read_u8(),
            cursor.read_u16::<LittleEndian>(),
            cursor.read_i8(),
        ) {
            result.hci_status = hci_status;
            if hci_status == HCI_SUCCESS {
                result.status = BtmStatus::Success;
                result.rssi = rssi;
                if let Some(conn) = self.acl.find_by_handle(handle & 0x0FFF) {
                    result.rem_bda = conn.remote_addr;
                }
            }
        }
        callback(result);
    }

    pub fn read_link_quality(
        &mut self,
        bd_addr: BdAddr,
        callback: Completion<LinkQualityResult>,
    ) -> BtmResult {
        if self.acl.link_quality_cb.is_some() {
            return Err(BtmError::Busy);
        }
        let handle = self
            .acl
            .find(&bd_addr, Transport::BrEdr)
            .map(|conn| conn.hci_handle)
            .ok_or(BtmError::UnknownAddr)?;

        self.timers.start(BtmTimer::LinkQuality, self.config.link_quality_timeout);
        if let Err(err) = self.send(HciCommand::ReadLinkQuality { handle }) {
            self.timers.stop(BtmTimer::LinkQuality);
            return Err(err);
        }
        self.acl.link_quality_cb = Some(callback);
        Ok(Issued::Started)
    }

    /// Command complete for HCI_Read_Link_Quality: status, handle, quality
    pub fn on_link_quality_complete(&mut self, params: &[u8]) {
        self.timers.stop(BtmTimer::LinkQuality);
        let Some(callback) = self.acl.link_quality_cb.take() else {
            return;
        };

        let mut result = LinkQualityResult {
            status: BtmStatus::ErrProcessing,
            hci_status: 0,
            rem_bda: BdAddr::ANY,
            link_quality: 0,
        };
        let mut cursor = Cursor::new(params);
        if let (Ok(hci_status), Ok(handle), Ok(quality)) =
            (cursor.read_u8(), cursor.read_u16::<LittleEndian>(), cursor.read_u8())
        {
            result.hci_status = hci_status;
            if hci_status == HCI_SUCCESS {
                result.status = BtmStatus::Success;
                result.link_quality = quality;
                if let Some(conn) = self.acl.find_by_handle(handle & 0x0FFF) {
                    result.rem_bda = conn.remote_addr;
                }
            }
        }
        callback(result);
    }

    pub(crate) fn rssi_timeout(&mut self) {
        if let Some(callback) = self.acl.rssi_cb.take() {
            callback(RssiResult {
                status: BtmStatus::ErrProcessing,
                hci_status: HCI_ERR_UNSPECIFIED,
                rem_bda: BdAddr::ANY,
                rssi: 0,
            });
        }
    }

    pub(crate) fn link_quality_timeout(&mut self) {
        if let Some(callback) = self.acl.link_quality_cb.take() {
            callback(LinkQualityResult {
                status: BtmStatus::ErrProcessing,
                hci_status: HCI_ERR_UNSPECIFIED,
                rem_bda: BdAddr::ANY,
                link_quality: 0,
            });
        }
    }
}

/// Drop packet types the peer's page 0 features rule out
fn restrict_to_peer(mut types: PacketTypes, peer: &[u8; 8]) -> PacketTypes {
    if !feature_supported(peer, LMP_3_SLOT_PACKETS) {
        types.remove(PacketTypes::DH3 | PacketTypes::DM3);
    }
    if !feature_supported(peer, LMP_5_SLOT_PACKETS) {
        types.remove(PacketTypes::DH5 | PacketTypes::DM5);
    }

    let edr_2m = feature_supported(peer, LMP_EDR_ACL_2MPS);
    let edr_3m = feature_supported(peer, LMP_EDR_ACL_3MPS);
    if !edr_2m {
        types |= PacketTypes::NO_2_DH1 | PacketTypes::NO_2_DH3 | PacketTypes::NO_2_DH5;
    }
    if !edr_3m {
        types |= PacketTypes::NO_3_DH1 | PacketTypes::NO_3_DH3 | PacketTypes::NO_3_DH5;
    }
    if edr_2m || edr_3m {
        if !feature_supported(peer, LMP_3_SLOT_EDR_ACL) {
            types |= PacketTypes::NO_2_DH3 | PacketTypes::NO_3_DH3;
        }
        if !feature_supported(peer, LMP_5_SLOT_EDR_ACL) {
            types |= PacketTypes::NO_2_DH5 | PacketTypes::NO_3_DH5;
        }
    }
    types
}
