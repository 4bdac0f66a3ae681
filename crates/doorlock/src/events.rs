//! Diagnostic event stream
//!
//! Every terminal outcome in the subsystem (a dropped key, a refused pairing,
//! an aborted allow-list rebuild) is reported here as well as logged.

use crate::error::LockError;
use crate::gap::{AdvertisingMode, BdAddr, ConnHandle};
use crate::smp::{LockState, SecurityError, SecurityLevel};
use tokio::sync::mpsc;

/// Events emitted by the pairing subsystem
#[derive(Debug, Clone, PartialEq)]
pub enum LockEvent {
    /// The stack asked for passkey entry
    PasskeyRequested { conn: ConnHandle, peer: BdAddr },
    /// A complete passkey was handed to the stack
    PasskeySubmitted { conn: ConnHandle },
    /// The stack asked us to show a passkey
    PasskeyDisplayed { conn: ConnHandle, peer: BdAddr },
    /// The stack cancelled pairing
    PairingCancelled { conn: ConnHandle, peer: BdAddr },
    /// Local verification changed the lock state
    LockStateChanged(LockState),
    /// A connection was established
    Connected { conn: ConnHandle },
    /// A connection was torn down
    Disconnected { conn: ConnHandle, reason: u8 },
    /// Link security changed or failed to change
    SecurityChanged {
        conn: ConnHandle,
        level: SecurityLevel,
        result: Result<(), SecurityError>,
    },
    /// Advertising started in the given mode
    AdvertisingStarted(AdvertisingMode),
    /// Bonds were wiped
    BondsCleared(usize),
    /// An attempt ended with an error
    Error(LockError),
}

/// Sending half of the event stream
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<LockEvent>>,
}

/// Receiving half of the event stream
pub type EventStream = mpsc::UnboundedReceiver<LockEvent>;

impl EventSink {
    pub fn channel() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards everything
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: LockEvent) {
        if let Some(tx) = &self.tx {
            // Nobody listening is not an error
            let _ = tx.send(event);
        }
    }

    pub fn error(&self, error: LockError) {
        self.emit(LockEvent::Error(error));
    }
}
