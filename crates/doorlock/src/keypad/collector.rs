//! Keypad producer, digit queue, confirm gate and the PIN collector task
//!
//! The button context only ever calls [`KeypadHandle::on_key_event`], which
//! never blocks. Digits go through a bounded FIFO owned by a single
//! [`PinCollector`] task; the submit key bypasses the queue and gives the
//! binary [`SubmitGate`].

use super::mapping::KeyEvent;
use super::passkey::{digit_value, Passkey, PasskeyBuffer};
use crate::error::{LockError, Result};
use crate::events::EventSink;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, error, info, warn};

/// Smallest digit queue that tolerates a burst of keypresses
pub const MIN_DIGIT_QUEUE_CAPACITY: usize = 10;

/// A binary semaphore: giving an already given gate is a no-op
#[derive(Debug, Default)]
pub struct SubmitGate {
    given: Mutex<bool>,
    notify: Notify,
}

impl SubmitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Safe to call from any number of cloned handles at once
    pub fn give(&self) {
        let mut given = self.given.lock().unwrap_or_else(PoisonError::into_inner);
        if !*given {
            *given = true;
            self.notify.notify_one();
        }
    }

    /// Waits until the gate is given, consuming it
    pub async fn take(&self) {
        loop {
            let notified = self.notify.notified();
            // A give after this check leaves a stored notification
            {
                let mut given = self.given.lock().unwrap_or_else(PoisonError::into_inner);
                if *given {
                    *given = false;
                    return;
                }
            }
            notified.await;
        }
    }

    /// Drops a give left over from an earlier press
    pub fn reset(&self) {
        *self.given.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    #[cfg(test)]
    fn is_given(&self) -> bool {
        *self.given.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Producer side, handed to the button driver
#[derive(Debug, Clone)]
pub struct KeypadHandle {
    digits: mpsc::Sender<char>,
    gate: Arc<SubmitGate>,
    submit_key: char,
    events: EventSink,
}

impl KeypadHandle {
    /// Handles a decoded matrix key edge. Only presses are acted on.
    pub fn on_key_event(&self, event: KeyEvent) -> Result<()> {
        if !event.pressed {
            return Ok(());
        }

        let position = event.position();
        match position.character() {
            Some(ch) => {
                debug!(row = position.row, column = position.column, "key pressed");
                self.press(ch)
            }
            None => {
                warn!(
                    row = position.row,
                    column = position.column,
                    "key outside keypad matrix ignored"
                );
                Ok(())
            }
        }
    }

    /// Routes one key: the submit key to the gate, anything else to the queue
    pub fn press(&self, key: char) -> Result<()> {
        if key == self.submit_key {
            debug!("submit key pressed");
            self.gate.give();
            return Ok(());
        }

        match self.digits.try_send(key) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(key)) => {
                error!("digit queue full, key dropped");
                let err = LockError::QueueFull(key);
                self.events.error(err.clone());
                Err(err)
            }
            Err(TrySendError::Closed(_)) => Err(LockError::ChannelClosed),
        }
    }
}

/// A pending request for the next complete passkey
#[derive(Debug)]
pub struct PasskeyRequest {
    reply: oneshot::Sender<Passkey>,
}

/// Consumer side used by the authenticator
#[derive(Debug, Clone)]
pub struct PasskeySource {
    requests: mpsc::Sender<PasskeyRequest>,
    gate: Arc<SubmitGate>,
}

impl PasskeySource {
    /// Waits for the collector to assemble six digits.
    ///
    /// Dropping the returned future withdraws the request and discards any
    /// digits collected for it so far.
    pub async fn next_passkey(&self) -> Result<Passkey> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(PasskeyRequest { reply })
            .await
            .map_err(|_| LockError::ChannelClosed)?;
        rx.await.map_err(|_| LockError::ChannelClosed)
    }

    /// Waits for the submit key
    pub async fn wait_submit(&self) {
        self.gate.take().await
    }

    pub fn reset_submit(&self) {
        self.gate.reset();
    }
}

/// The task that owns the digit queue and the passkey buffer
#[derive(Debug)]
pub struct PinCollector {
    digits: mpsc::Receiver<char>,
    requests: mpsc::Receiver<PasskeyRequest>,
    buffer: PasskeyBuffer,
}

impl PinCollector {
    /// Serves passkey requests one at a time until every source is dropped
    pub async fn run(mut self) {
        while let Some(request) = self.requests.recv().await {
            if !self.serve(request).await {
                break;
            }
        }
        info!("pin collector stopped");
    }

    /// Returns false once the keypad side has gone away
    async fn serve(&mut self, mut request: PasskeyRequest) -> bool {
        self.buffer.reset();

        loop {
            tokio::select! {
                biased;

                _ = request.reply.closed() => {
                    debug!(discarded = self.buffer.len(), "passkey request withdrawn");
                    self.buffer.reset();
                    return true;
                }
                key = self.digits.recv() => {
                    let Some(key) = key else {
                        return false;
                    };

                    let Some(digit) = digit_value(key) else {
                        warn!(key = %key, "non-digit key ignored during passkey entry");
                        continue;
                    };

                    debug!(entered = self.buffer.len() + 1, "passkey digit");
                    if let Some(passkey) = self.buffer.push(digit) {
                        if request.reply.send(passkey).is_err() {
                            debug!("passkey completed after request was withdrawn");
                        }
                        return true;
                    }
                }
            }
        }
    }
}

/// Explicitly constructed keypad context: queue, gate and buffer, split into
/// the producer handle, the consumer handle and the collector task
#[derive(Debug)]
pub struct KeypadContext {
    pub handle: KeypadHandle,
    pub source: PasskeySource,
    pub collector: PinCollector,
}

impl KeypadContext {
    pub fn new(capacity: usize, submit_key: char, events: EventSink) -> Self {
        let capacity = capacity.max(MIN_DIGIT_QUEUE_CAPACITY);
        let (digit_tx, digit_rx) = mpsc::channel(capacity);
        let (request_tx, request_rx) = mpsc::channel(1);
        let gate = Arc::new(SubmitGate::new());

        Self {
            handle: KeypadHandle {
                digits: digit_tx,
                gate: Arc::clone(&gate),
                submit_key,
                events,
            },
            source: PasskeySource {
                requests: request_tx,
                gate,
            },
            collector: PinCollector {
                digits: digit_rx,
                requests: request_rx,
                buffer: PasskeyBuffer::new(),
            },
        }
    }
}
