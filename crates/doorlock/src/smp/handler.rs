//! Pairing callbacks exchanged with the Bluetooth stack

use super::authenticator::PasskeyAuthenticator;
use super::policy::PairingPolicy;
use super::types::{PairingFeatures, SecurityError};
use crate::error::{LockError, StackError};
use crate::events::{EventSink, LockEvent};
use crate::gap::{BdAddr, ConnHandle};
use crate::keypad::Passkey;
use std::sync::Arc;
use tracing::{info, warn};

/// Security manager operations the subsystem calls back into
pub trait PairingStack: Send + Sync {
    /// Hands an entered passkey to the active pairing on `conn`
    fn passkey_entry(&self, conn: ConnHandle, passkey: Passkey) -> Result<(), StackError>;

    /// Aborts the active pairing on `conn`
    fn cancel(&self, conn: ConnHandle) -> Result<(), StackError>;
}

/// Pairing callbacks the stack invokes. Every method must return promptly:
/// they run on the stack's own callback context.
pub trait AuthHandler: Send + Sync {
    /// Feature exchange verdict
    fn pairing_accept(&self, conn: ConnHandle, features: &PairingFeatures) -> Result<(), SecurityError>;

    /// The stack needs a passkey typed on this device
    fn passkey_entry(&self, conn: ConnHandle, peer: BdAddr);

    /// The stack wants a passkey shown to the user
    fn passkey_display(&self, conn: ConnHandle, peer: BdAddr, passkey: Passkey);

    /// The stack abandoned pairing on `conn`
    fn cancel(&self, conn: ConnHandle, peer: BdAddr);
}

/// The lock's [`AuthHandler`], registered once with the stack
#[derive(Debug, Clone)]
pub struct PairingHandler {
    policy: PairingPolicy,
    authenticator: Arc<PasskeyAuthenticator>,
    events: EventSink,
}

impl PairingHandler {
    pub fn new(policy: PairingPolicy, authenticator: Arc<PasskeyAuthenticator>, events: EventSink) -> Self {
        Self {
            policy,
            authenticator,
            events,
        }
    }

    pub fn authenticator(&self) -> &Arc<PasskeyAuthenticator> {
        &self.authenticator
    }
}

impl AuthHandler for PairingHandler {
    fn pairing_accept(&self, conn: ConnHandle, features: &PairingFeatures) -> Result<(), SecurityError> {
        let verdict = self.policy.evaluate(features);
        if let Err(e) = &verdict {
            info!(
                conn = %conn,
                io_capability = features.io_capability.to_u8(),
                reason = e.reason_code(),
                "pairing refused by policy"
            );
            self.events
                .error(LockError::PairingCapabilityRejected(features.io_capability));
        }
        verdict
    }

    fn passkey_entry(&self, conn: ConnHandle, peer: BdAddr) {
        self.authenticator.begin_session(conn, peer);
    }

    fn passkey_display(&self, conn: ConnHandle, peer: BdAddr, passkey: Passkey) {
        // The display is the user's channel for this value
        info!(conn = %conn, peer = %peer, "Passkey for {}: {}", peer, passkey);
        self.events.emit(LockEvent::PasskeyDisplayed { conn, peer });
    }

    fn cancel(&self, conn: ConnHandle, peer: BdAddr) {
        if self.authenticator.cancel_session(conn) {
            info!(conn = %conn, peer = %peer, "pairing cancelled");
        } else {
            warn!(conn = %conn, peer = %peer, "pairing cancelled with no passkey entry in progress");
        }
        self.events.emit(LockEvent::PairingCancelled { conn, peer });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypad::KeypadContext;
    use crate::smp::{IoCapability, VerificationMode};

    struct NullStack;

    impl PairingStack for NullStack {
        fn passkey_entry(&self, _conn: ConnHandle, _passkey: Passkey) -> Result<(), StackError> {
            Ok(())
        }

        fn cancel(&self, _conn: ConnHandle) -> Result<(), StackError> {
            Ok(())
        }
    }

    fn handler() -> (PairingHandler, crate::events::EventStream) {
        let (events, stream) = EventSink::channel();
        let ctx = KeypadContext::new(10, '#', events.clone());
        let auth = Arc::new(PasskeyAuthenticator::new(
            ctx.source,
            Arc::new(NullStack),
            VerificationMode::Stack,
            None,
            events.clone(),
        ));
        (PairingHandler::new(PairingPolicy::new(), auth, events), stream)
    }

    #[tokio::test]
    async fn test_rejection_is_reported() {
        let (handler, mut events) = handler();

        let features = PairingFeatures::with_io_capability(IoCapability::NoInputNoOutput);
        assert_eq!(
            handler.pairing_accept(ConnHandle(1), &features),
            Err(SecurityError::PairNotAllowed)
        );
        assert_eq!(
            events.try_recv().unwrap(),
            LockEvent::Error(LockError::PairingCapabilityRejected(IoCapability::NoInputNoOutput))
        );

        let features = PairingFeatures::with_io_capability(IoCapability::KeyboardDisplay);
        assert_eq!(handler.pairing_accept(ConnHandle(1), &features), Ok(()));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_passkey_entry_returns_immediately() {
        let (handler, mut events) = handler();
        let peer: BdAddr = "00:11:22:33:44:55".parse().unwrap();

        handler.passkey_entry(ConnHandle(9), peer);
        assert_eq!(
            events.try_recv().unwrap(),
            LockEvent::PasskeyRequested { conn: ConnHandle(9), peer }
        );
        assert_eq!(handler.authenticator().active_sessions(), vec![ConnHandle(9)]);

        handler.cancel(ConnHandle(9), peer);
        assert!(handler.authenticator().active_sessions().is_empty());
        assert_eq!(
            events.try_recv().unwrap(),
            LockEvent::PairingCancelled { conn: ConnHandle(9), peer }
        );
    }

    #[tokio::test]
    async fn test_passkey_display_is_reported() {
        let (handler, mut events) = handler();
        let peer: BdAddr = "00:11:22:33:44:55".parse().unwrap();
        handler.passkey_display(ConnHandle(2), peer, Passkey::new(1234).unwrap());
        assert_eq!(
            events.try_recv().unwrap(),
            LockEvent::PasskeyDisplayed { conn: ConnHandle(2), peer }
        );
    }
}
