//! Passkey entry sessions
//!
//! The stack's passkey-entry callback only registers a [`PairingSession`] and
//! returns. Collection runs on a spawned task that waits on the PIN collector,
//! then either hands the value to the security manager or, in local
//! verification mode, compares it against the configured passkey.

use super::handler::PairingStack;
use crate::error::{LockError, Result};
use crate::events::{EventSink, LockEvent};
use crate::gap::{BdAddr, ConnHandle};
use crate::keypad::{Passkey, PasskeySource};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

/// How a collected passkey is verified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum VerificationMode {
    /// Submitted to the security manager, which checks it against the peer
    Stack,
    /// Compared against a fixed passkey. Not cryptographic pairing
    /// verification: it only gates the lock state.
    Local { expected_passkey: Passkey },
}

impl Default for VerificationMode {
    fn default() -> Self {
        VerificationMode::Stack
    }
}

/// Lock state driven by local passkey verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Locked,
    Unlocked,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockState::Locked => write!(f, "locked"),
            LockState::Unlocked => write!(f, "unlocked"),
        }
    }
}

/// One in-flight passkey entry for one connection
#[derive(Debug)]
pub struct PairingSession {
    pub id: u64,
    pub conn: ConnHandle,
    pub peer: BdAddr,
    pub started: Instant,
    cancel: oneshot::Sender<()>,
}

/// Bridges keypad passkeys to the pairing protocol
pub struct PasskeyAuthenticator {
    source: PasskeySource,
    stack: Arc<dyn PairingStack>,
    mode: VerificationMode,
    timeout: Option<Duration>,
    sessions: Mutex<HashMap<ConnHandle, PairingSession>>,
    next_session: AtomicU64,
    lock_state: watch::Sender<LockState>,
    runtime: Handle,
    events: EventSink,
}

impl PasskeyAuthenticator {
    /// Must be called from within a tokio runtime; sessions are spawned on it
    pub fn new(
        source: PasskeySource,
        stack: Arc<dyn PairingStack>,
        mode: VerificationMode,
        timeout: Option<Duration>,
        events: EventSink,
    ) -> Self {
        if let VerificationMode::Local { .. } = mode {
            warn!("local passkey verification enabled: pairing is not cryptographically verified");
        }

        let (lock_state, _) = watch::channel(LockState::Locked);

        Self {
            source,
            stack,
            mode,
            timeout,
            sessions: Mutex::new(HashMap::new()),
            next_session: AtomicU64::new(1),
            lock_state,
            runtime: Handle::current(),
            events,
        }
    }

    pub fn mode(&self) -> VerificationMode {
        self.mode
    }

    pub fn lock_state(&self) -> LockState {
        *self.lock_state.borrow()
    }

    pub fn subscribe_lock_state(&self) -> watch::Receiver<LockState> {
        self.lock_state.subscribe()
    }

    /// Connections with a passkey entry in progress
    pub fn active_sessions(&self) -> Vec<ConnHandle> {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let mut conns: Vec<ConnHandle> = sessions.keys().copied().collect();
        conns.sort();
        conns
    }

    /// Registers a session for `conn` and starts collecting on a task.
    /// Returns without waiting.
    pub fn begin_session(self: &Arc<Self>, conn: ConnHandle, peer: BdAddr) {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let replaced = {
            let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            sessions.insert(
                conn,
                PairingSession {
                    id,
                    conn,
                    peer,
                    started: Instant::now(),
                    cancel: cancel_tx,
                },
            )
        };

        if let Some(old) = replaced {
            warn!(conn = %conn, session = old.id, "replacing unfinished passkey session");
            let _ = old.cancel.send(());
        }

        info!(conn = %conn, peer = %peer, session = id, "passkey entry requested");
        self.events.emit(LockEvent::PasskeyRequested { conn, peer });

        let this = Arc::clone(self);
        self.runtime.spawn(async move {
            this.run_session(id, conn, cancel_rx).await;
        });
    }

    /// Cancels the session for `conn`, if any. Returns whether one existed.
    pub fn cancel_session(&self, conn: ConnHandle) -> bool {
        let session = {
            let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            sessions.remove(&conn)
        };

        match session {
            Some(session) => {
                debug!(conn = %conn, session = session.id, "cancelling passkey session");
                let _ = session.cancel.send(());
                true
            }
            None => false,
        }
    }

    async fn run_session(&self, id: u64, conn: ConnHandle, cancel: oneshot::Receiver<()>) {
        // Cancellation wins when both are ready
        let outcome = tokio::select! {
            biased;
            _ = cancel => Err(LockError::SessionCancelled),
            result = self.collect() => result,
        };

        // A session removed by cancel or replacement must not submit
        let Some(started) = self.finish_session(id, conn) else {
            info!(conn = %conn, session = id, "passkey session cancelled");
            return;
        };

        match outcome {
            Ok(passkey) => {
                debug!(conn = %conn, elapsed_ms = started.elapsed().as_millis() as u64, "passkey collected");
                self.complete(conn, passkey);
            }
            Err(LockError::SessionCancelled) => {
                info!(conn = %conn, session = id, "passkey session cancelled");
            }
            Err(LockError::PasskeyTimeout) => {
                warn!(conn = %conn, "passkey entry timed out");
                if let Err(e) = self.stack.cancel(conn) {
                    warn!(conn = %conn, error = %e, "stack refused pairing cancel");
                }
                self.events.error(LockError::PasskeyTimeout);
            }
            Err(e) => {
                error!(conn = %conn, error = %e, "passkey session failed");
                self.events.error(e);
            }
        }
    }

    /// Removes the session if it is still the one identified by `id`
    fn finish_session(&self, id: u64, conn: ConnHandle) -> Option<Instant> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        match sessions.get(&conn) {
            Some(session) if session.id == id => sessions.remove(&conn).map(|s| s.started),
            _ => None,
        }
    }

    async fn collect(&self) -> Result<Passkey> {
        let entry = async {
            if let VerificationMode::Local { .. } = self.mode {
                self.source.reset_submit();
            }

            let passkey = self.source.next_passkey().await?;

            if let VerificationMode::Local { .. } = self.mode {
                debug!("waiting for submit key");
                self.source.wait_submit().await;
            }

            Ok(passkey)
        };

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, entry)
                .await
                .map_err(|_| LockError::PasskeyTimeout)?,
            None => entry.await,
        }
    }

    fn complete(&self, conn: ConnHandle, passkey: Passkey) {
        match self.mode {
            VerificationMode::Stack => match self.stack.passkey_entry(conn, passkey) {
                Ok(()) => {
                    info!(conn = %conn, "passkey submitted to security manager");
                    self.events.emit(LockEvent::PasskeySubmitted { conn });
                }
                Err(e) => {
                    error!(conn = %conn, error = %e, "error on passkey entry");
                    self.events.error(LockError::PasskeySubmitFailed(e));
                }
            },
            VerificationMode::Local { expected_passkey } => {
                let state = if passkey == expected_passkey {
                    info!(conn = %conn, "correct pin");
                    LockState::Unlocked
                } else {
                    warn!(conn = %conn, "incorrect pin");
                    LockState::Locked
                };
                self.lock_state.send_replace(state);
                self.events.emit(LockEvent::LockStateChanged(state));
            }
        }
    }
}

impl fmt::Debug for PasskeyAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasskeyAuthenticator")
            .field("mode", &self.mode)
            .field("timeout", &self.timeout)
            .field("sessions", &self.active_sessions())
            .finish()
    }
}
