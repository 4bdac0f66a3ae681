//! Error types for the doorlock library
//!
//! `LockError` is what the subsystem reports about its own attempts (a digit
//! that could not be queued, an allow-list rebuild that was aborted, a passkey
//! the stack refused). `StackError` is what an external collaborator (the
//! controller, the pairing stack, the bond store) hands back to us.

use crate::gap::BdAddr;
use crate::smp::IoCapability;
use thiserror::Error;

/// Failures reported by the Bluetooth stack or controller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StackError {
    #[error("controller returned HCI status 0x{0:02X}")]
    Status(u8),

    #[error("no active pairing session")]
    NoSession,

    #[error("value rejected by the stack")]
    Rejected,

    #[error("unexpected controller response: {0}")]
    UnexpectedResponse(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors produced by the pairing subsystem
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("digit queue full, key '{0}' dropped")]
    QueueFull(char),

    #[error("cannot clear filter accept list: {0}")]
    FilterClearFailed(StackError),

    #[error("cannot add {addr} to filter accept list: {source}")]
    FilterAddFailed { addr: BdAddr, source: StackError },

    #[error("advertising failed to start: {0}")]
    AdvertisingStartFailed(StackError),

    #[error("passkey submission failed: {0}")]
    PasskeySubmitFailed(StackError),

    #[error("pairing refused, peer io capability {0} not allowed")]
    PairingCapabilityRejected(IoCapability),

    #[error("passkey entry timed out")]
    PasskeyTimeout,

    #[error("pairing session cancelled")]
    SessionCancelled,

    #[error("background task is no longer running")]
    ChannelClosed,

    #[error("advertising data too long: {0} bytes")]
    AdvertisingDataTooLong(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("bond store error: {0}")]
    BondStore(StackError),
}

/// Result type for doorlock operations
pub type Result<T> = std::result::Result<T, LockError>;
