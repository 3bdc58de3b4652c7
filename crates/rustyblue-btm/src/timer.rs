//! Software timers armed by the BTM layer
//!
//! The embedder owns the clock. It starts and stops timers on request and
//! calls [`Btm::on_timer_expired`](crate::Btm::on_timer_expired) when one fires.

use std::time::Duration;

/// Timers that guard a single outstanding request each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BtmTimer {
    RemoteName,
    Rssi,
    LinkQuality,
    InqTxPower,
    /// Duration of the LE half of an inquiry
    LeInquiry,
    LeObserve,
}

pub trait TimerService {
    /// Arm (or re-arm) a timer
    fn start(&mut self, timer: BtmTimer, timeout: Duration);

    /// Disarm a timer; a no-op if it is not running
    fn stop(&mut self, timer: BtmTimer);
}
