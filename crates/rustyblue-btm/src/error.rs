//! Error and status types for the BTM layer
//!
//! Public entry points return [`BtmResult`]. Callback result structs carry the
//! flattened [`BtmStatus`] so the upper layer sees one closed enumeration.

use thiserror::Error;

/// Errors reported by an [`HciTransport`](crate::hci::HciTransport)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HciError {
    #[error("HCI command queue is full")]
    QueueFull,

    #[error("HCI command rejected by transport")]
    Rejected,

    #[error("Invalid parameter length: {0}")]
    InvalidParamLength(usize),

    #[error("Invalid HCI packet format")]
    InvalidPacketFormat,
}

/// Synchronous failures of a BTM operation
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BtmError {
    #[error("operation already in progress")]
    Busy,

    #[error("no resources to issue the command")]
    NoResources,

    #[error("illegal parameter value")]
    IllegalValue,

    #[error("unknown remote address")]
    UnknownAddr,

    #[error("device is in the wrong mode")]
    WrongMode,

    #[error("mode not supported by the controller")]
    ModeUnsupported,

    #[error("error while processing the request")]
    ErrProcessing,
}

impl From<HciError> for BtmError {
    fn from(_: HciError) -> Self {
        BtmError::NoResources
    }
}

/// Successful outcome of a BTM operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Issued {
    /// Finished synchronously
    Done,
    /// Accepted; completion is reported later through a callback
    Started,
}

pub type BtmResult<T = Issued> = std::result::Result<T, BtmError>;

/// Closed status enumeration delivered to callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BtmStatus {
    Success,
    CmdStarted,
    Busy,
    NoResources,
    IllegalValue,
    UnknownAddr,
    WrongMode,
    ModeUnsupported,
    ErrProcessing,
}

impl BtmStatus {
    pub fn is_success(self) -> bool {
        self == BtmStatus::Success
    }

    /// Status of a controller completion: success or a processing error
    pub fn from_hci(hci_status: u8) -> Self {
        if hci_status == crate::hci::constants::HCI_SUCCESS {
            BtmStatus::Success
        } else {
            BtmStatus::ErrProcessing
        }
    }
}

impl From<BtmError> for BtmStatus {
    fn from(err: BtmError) -> Self {
        match err {
            BtmError::Busy => BtmStatus::Busy,
            BtmError::NoResources => BtmStatus::NoResources,
            BtmError::IllegalValue => BtmStatus::IllegalValue,
            BtmError::UnknownAddr => BtmStatus::UnknownAddr,
            BtmError::WrongMode => BtmStatus::WrongMode,
            BtmError::ModeUnsupported => BtmStatus::ModeUnsupported,
            BtmError::ErrProcessing => BtmStatus::ErrProcessing,
        }
    }
}

impl From<Issued> for BtmStatus {
    fn from(issued: Issued) -> Self {
        match issued {
            Issued::Done => BtmStatus::Success,
            Issued::Started => BtmStatus::CmdStarted,
        }
    }
}

impl From<BtmResult> for BtmStatus {
    fn from(result: BtmResult) -> Self {
        match result {
            Ok(issued) => issued.into(),
            Err(err) => err.into(),
        }
    }
}
