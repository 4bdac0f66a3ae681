//! Pairing side of the lock: feature-exchange policy, passkey entry sessions
//! and the callback traits shared with the Bluetooth stack.

pub mod constants;
mod types;
mod policy;
mod authenticator;
mod handler;

// Re-export public API
pub use self::types::*;
pub use self::policy::PairingPolicy;
pub use self::authenticator::{LockState, PairingSession, PasskeyAuthenticator, VerificationMode};
pub use self::handler::{AuthHandler, PairingHandler, PairingStack};
