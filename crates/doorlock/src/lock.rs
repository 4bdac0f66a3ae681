//! Top-level composition of the pairing subsystem

use crate::bond::BondStore;
use crate::config::LockConfig;
use crate::connection::{LinkControl, LockConnectionHandler};
use crate::error::{LockError, Result};
use crate::events::{EventSink, EventStream, LockEvent};
use crate::gap::{AdvertiserHandle, AdvertiserSettings, AllowListAdvertiser, Controller};
use crate::keypad::{KeypadContext, KeypadHandle};
use crate::smp::{LockState, PairingHandler, PairingPolicy, PairingStack, PasskeyAuthenticator};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// A running lock: the keypad producer, the handlers to register with the
/// stack, and the background tasks behind them
pub struct DoorLock {
    config: LockConfig,
    keypad: KeypadHandle,
    authenticator: Arc<PasskeyAuthenticator>,
    auth_handler: Arc<PairingHandler>,
    connection_handler: Arc<LockConnectionHandler>,
    advertiser: AdvertiserHandle,
    bonds: Arc<dyn BondStore>,
    tasks: Vec<JoinHandle<()>>,
    events: EventSink,
}

impl DoorLock {
    /// Validates `config`, spawns the PIN collector and the advertiser worker
    /// and submits the first advertising cycle. Must be called from within a
    /// tokio runtime.
    pub fn start(
        config: LockConfig,
        controller: Arc<dyn Controller>,
        stack: Arc<dyn PairingStack>,
        link: Arc<dyn LinkControl>,
        bonds: Arc<dyn BondStore>,
    ) -> Result<(Self, EventStream)> {
        config.validate()?;
        let (events, stream) = EventSink::channel();

        let keypad = KeypadContext::new(config.digit_queue_capacity, config.submit_key, events.clone());
        let collector = tokio::spawn(keypad.collector.run());

        let authenticator = Arc::new(PasskeyAuthenticator::new(
            keypad.source,
            stack,
            config.verification,
            config.passkey_timeout(),
            events.clone(),
        ));
        let auth_handler = Arc::new(PairingHandler::new(
            PairingPolicy::new(),
            Arc::clone(&authenticator),
            events.clone(),
        ));

        let settings = AdvertiserSettings::new(
            config.local_identity,
            &config.device_name,
            config.advertising.interval_min,
            config.advertising.interval_max,
            config.advertising.fallback_to_open,
        )?;
        let (advertiser, worker) =
            AllowListAdvertiser::new(controller, Arc::clone(&bonds), settings, events.clone()).spawn();

        let connection_handler = Arc::new(LockConnectionHandler::new(
            advertiser.clone(),
            Arc::clone(&authenticator),
            link,
            config.link.clone(),
            events.clone(),
        ));

        advertiser.submit();
        info!(name = %config.device_name, verification = ?config.verification, "lock started");

        let lock = Self {
            config,
            keypad: keypad.handle,
            authenticator,
            auth_handler,
            connection_handler,
            advertiser,
            bonds,
            tasks: vec![collector, worker],
            events,
        };
        Ok((lock, stream))
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Producer handle for the button driver
    pub fn keypad(&self) -> &KeypadHandle {
        &self.keypad
    }

    /// Register with the stack's pairing callbacks
    pub fn auth_handler(&self) -> Arc<PairingHandler> {
        Arc::clone(&self.auth_handler)
    }

    /// Register with the stack's connection callbacks
    pub fn connection_handler(&self) -> Arc<LockConnectionHandler> {
        Arc::clone(&self.connection_handler)
    }

    pub fn advertiser(&self) -> &AdvertiserHandle {
        &self.advertiser
    }

    pub fn lock_state(&self) -> LockState {
        self.authenticator.lock_state()
    }

    pub fn subscribe_lock_state(&self) -> watch::Receiver<LockState> {
        self.authenticator.subscribe_lock_state()
    }

    /// Removes every bond of the local identity. The allow-list picks this up
    /// on the next advertising cycle.
    pub fn clear_bonds(&self) -> Result<usize> {
        match self.bonds.unpair(self.config.local_identity, None) {
            Ok(count) => {
                info!(count, "bonds deleted successfully");
                self.events.emit(LockEvent::BondsCleared(count));
                Ok(count)
            }
            Err(e) => {
                error!(error = %e, "cannot delete bonds");
                let err = LockError::BondStore(e);
                self.events.error(err.clone());
                Err(err)
            }
        }
    }

    /// Stops the background tasks
    pub fn shutdown(mut self) {
        self.stop_tasks();
    }

    fn stop_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl fmt::Debug for DoorLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoorLock")
            .field("config", &self.config)
            .field("lock_state", &self.lock_state())
            .field("advertiser", &self.advertiser.state())
            .finish()
    }
}

impl Drop for DoorLock {
    fn drop(&mut self) {
        self.stop_tasks();
    }
}
