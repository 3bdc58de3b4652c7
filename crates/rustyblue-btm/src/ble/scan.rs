//! LE scan ownership
//!
//! LE inquiry, observe and selective connect all run on the one controller
//! scanner. [`ScanActivity`] records who is using it; the scanner is started
//! by the first user and stopped once the last one goes away.

use bitflags::bitflags;
use log::{debug, warn};

use crate::btm::Btm;
use crate::error::BtmResult;
use crate::hci::HciCommand;
use crate::inq::LeAdvReport;
use crate::types::{AddressType, BdAddr};

pub const SCAN_TYPE_PASSIVE: u8 = 0x00;
pub const SCAN_TYPE_ACTIVE: u8 = 0x01;

pub const SCAN_FILTER_ACCEPT_ALL: u8 = 0x00;
pub const SCAN_FILTER_WHITE_LIST: u8 = 0x01;

bitflags! {
    /// Users of the LE scanner
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ScanActivity: u8 {
        const INQUIRY_GENERAL = 0x10;
        const INQUIRY_LIMITED = 0x20;
        const SELECTIVE_CONN = 0x40;
        const OBSERVE = 0x80;

        const INQUIRY_MASK = Self::INQUIRY_GENERAL.bits() | Self::INQUIRY_LIMITED.bits();
    }
}

/// Parameters written with LE_Set_Scan_Parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanParams {
    pub scan_type: u8,
    /// 0.625 ms units
    pub interval: u16,
    pub window: u16,
    pub filter_policy: u8,
}

#[derive(Debug, Default)]
pub struct LeScanState {
    pub(crate) activity: ScanActivity,
    pub(crate) params: Option<ScanParams>,
    pub(crate) enabled: bool,
    pub(crate) own_addr_type: u8,
}

impl LeScanState {
    pub fn activity(&self) -> ScanActivity {
        self.activity
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn params(&self) -> Option<ScanParams> {
        self.params
    }
}

/// Split an LE Advertising Report event (after the subevent code)
pub fn parse_adv_reports(params: &[u8]) -> Option<Vec<LeAdvReport>> {
    let (&num_reports, mut rest) = params.split_first()?;
    let mut reports = Vec::with_capacity(num_reports as usize);

    for _ in 0..num_reports {
        if rest.len() < 9 {
            return None;
        }
        let evt_type = rest[0];
        let addr_type = AddressType::from(rest[1]);
        let bd_addr = BdAddr::from_slice(&rest[2..8])?;
        let data_len = rest[8] as usize;
        if rest.len() < 9 + data_len + 1 {
            return None;
        }
        let data = rest[9..9 + data_len].to_vec();
        let rssi = rest[9 + data_len] as i8;

        reports.push(LeAdvReport { evt_type, addr_type, bd_addr, data, rssi });
        rest = &rest[10 + data_len..];
    }

    Some(reports)
}

impl Btm {
    pub fn le_scan(&self) -> &LeScanState {
        &self.le_scan
    }

    /// Run the scanner with `params`, restarting it if it runs with others
    pub(crate) fn le_scan_start(&mut self, params: ScanParams) -> BtmResult<()> {
        if self.le_scan.enabled {
            if self.le_scan.params == Some(params) {
                return Ok(());
            }
            self.le_scan_stop()?;
        }

        debug!(
            "LE scan start type {} interval {:#06x} window {:#06x} filter {}",
            params.scan_type, params.interval, params.window, params.filter_policy
        );
        self.send(HciCommand::LeSetScanParameters {
            scan_type: params.scan_type,
            scan_interval: params.interval,
            scan_window: params.window,
            own_address_type: self.le_scan.own_addr_type,
            filter_policy: params.filter_policy,
        })?;
        self.le_scan.params = Some(params);

        self.send(HciCommand::LeSetScanEnable { enable: true, filter_duplicates: true })?;
        self.le_scan.enabled = true;
        Ok(())
    }

    pub(crate) fn le_scan_stop(&mut self) -> BtmResult<()> {
        if !self.le_scan.enabled {
            return Ok(());
        }
        debug!("LE scan stop");
        self.send(HciCommand::LeSetScanEnable { enable: false, filter_duplicates: false })?;
        self.le_scan.enabled = false;
        Ok(())
    }

    /// Re-enable a scanner paused with its parameters still written
    pub(crate) fn le_scan_resume(&mut self) {
        if self.le_scan.enabled || self.le_scan.params.is_none() {
            return;
        }
        match self.send(HciCommand::LeSetScanEnable { enable: true, filter_duplicates: true }) {
            Ok(()) => self.le_scan.enabled = true,
            Err(err) => warn!("LE scan resume failed: {}", err),
        }
    }

    /// Stop the scanner if nobody uses it any more
    pub(crate) fn le_scan_release(&mut self) {
        if self.le_scan.activity.is_empty() {
            if let Err(err) = self.le_scan_stop() {
                warn!("LE scan disable failed: {}", err);
            }
        }
    }

    /// Entry point for LE Advertising Report events
    pub fn on_le_adv_report_event(&mut self, params: &[u8]) {
        let Some(reports) = parse_adv_reports(params) else {
            warn!("malformed LE advertising report ({} bytes)", params.len());
            return;
        };
        for report in reports {
            self.on_le_adv_report(&report);
        }
    }

    /// Hand one advertisement to every procedure using the scanner
    pub fn on_le_adv_report(&mut self, report: &LeAdvReport) {
        let activity = self.le_scan.activity;
        if activity.intersects(ScanActivity::INQUIRY_MASK | ScanActivity::OBSERVE) {
            self.process_le_inquiry_report(report);
        }
        if activity.contains(ScanActivity::SELECTIVE_CONN) {
            self.process_selective_conn_report(report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_adv_reports() {
        let mut params = vec![2];
        // Connectable advert with flags
        params.extend_from_slice(&[0x00, 0x00, 1, 2, 3, 4, 5, 6, 3, 0x02, 0x01, 0x06, 0xC4]);
        // Scan response, random address, no data
        params.extend_from_slice(&[0x04, 0x01, 7, 8, 9, 10, 11, 12, 0, 0xB0]);

        let reports = parse_adv_reports(&params).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].bd_addr, BdAddr::new([1, 2, 3, 4, 5, 6]));
        assert_eq!(reports[0].data, vec![0x02, 0x01, 0x06]);
        assert_eq!(reports[0].rssi, -60);
        assert_eq!(reports[1].addr_type, AddressType::Random);
        assert!(reports[1].data.is_empty());
    }

    #[test]
    fn test_parse_truncated_report() {
        assert!(parse_adv_reports(&[]).is_none());
        assert!(parse_adv_reports(&[1, 0x00, 0x00, 1, 2, 3]).is_none());
        // Data length runs past the end
        assert!(parse_adv_reports(&[1, 0x00, 0x00, 1, 2, 3, 4, 5, 6, 9, 0x02]).is_none());
    }
}
