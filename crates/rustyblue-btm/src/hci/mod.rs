//! Bluetooth HCI (Host Controller Interface) command plumbing
//!
//! The BTM layer never talks to a socket directly. Commands go out through an
//! [`HciTransport`] supplied by the embedder, and the matching completion
//! events come back through the `on_*` entry points of [`Btm`](crate::Btm).

pub mod constants;
pub mod packet;

#[cfg(test)]
mod tests;

use crate::error::HciError;

pub use packet::HciCommand;

/// Outgoing command path to the controller
///
/// `Ok` means the command was queued and a completion event will follow.
/// Any `Err` is treated as "no resources" by the caller.
pub trait HciTransport {
    fn send_command(&mut self, command: HciCommand) -> Result<(), HciError>;
}
