//! Doorlock - keypad passkey pairing for a Bluetooth LE smart lock
//!
//! This library is the pairing subsystem of a lock peripheral. Digits typed on
//! a matrix keypad are collected into six digit passkeys and handed to the
//! security manager during passkey-entry pairing. Peers that can only do
//! "just works" pairing are refused, and once bonded, only bonded peers may
//! connect: advertising is restarted with a freshly rebuilt controller
//! allow-list after every disconnect.
//!
//! The Bluetooth stack itself stays outside. It is reached through the
//! [`PairingStack`], [`LinkControl`], [`Controller`] and [`BondStore`] traits,
//! and it calls back into [`AuthHandler`] and [`ConnectionHandler`], which
//! never block.

pub mod bond;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod gap;
pub mod hci;
pub mod keypad;
pub mod lock;
pub mod smp;

// Re-export common types for convenience
pub use bond::{BondStore, MemoryBondStore};
pub use config::{AdvertisingConfig, LinkConfig, LockConfig};
pub use connection::{
    ConnectionHandler, ConnectionInfo, DataLenInfo, LinkControl, LockConnectionHandler, Phy, PhyInfo,
};
pub use error::{LockError, Result, StackError};
pub use events::{EventSink, EventStream, LockEvent};
pub use gap::{
    AddressType, AdvertiserHandle, AdvertiserState, AdvertisingMode, BdAddr, BondedPeer, ConnHandle,
    Controller,
};
pub use hci::{HciController, HciTransport};
pub use keypad::{KeyEvent, KeypadHandle, Passkey};
pub use lock::DoorLock;
pub use smp::{
    AuthHandler, IoCapability, LockState, PairingFeatures, PairingHandler, PairingStack,
    SecurityError, SecurityLevel, VerificationMode,
};
