//! Allow-list advertiser
//!
//! Every cycle clears the controller's filter accept list, refills it from the
//! bond store and restarts advertising: filtered when at least one bond made
//! it onto the list, open otherwise. Cycles run on a single worker task so the
//! disconnect callback only has to submit a request.

use super::advertising::{lock_advertising_data, AdvParams, AdvertisingMode};
use super::types::{BondedPeer, LocalIdentity};
use crate::bond::BondStore;
use crate::error::{LockError, Result, StackError};
use crate::events::{EventSink, LockEvent};
use std::fmt;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Controller operations needed to program the allow-list and advertise
pub trait Controller: Send + Sync {
    fn clear_filter_accept_list(&self) -> std::result::Result<(), StackError>;

    fn add_to_filter_accept_list(&self, peer: &BondedPeer) -> std::result::Result<(), StackError>;

    /// Sets parameters and payload, then enables advertising
    fn start_advertising(
        &self,
        params: &AdvParams,
        ad: &[u8],
        sd: &[u8],
    ) -> std::result::Result<(), StackError>;
}

/// Where the advertiser is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiserState {
    Idle,
    ClearingList,
    EnumeratingBonds,
    Starting(AdvertisingMode),
    Advertising(AdvertisingMode),
}

impl fmt::Display for AdvertiserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdvertiserState::Idle => write!(f, "idle"),
            AdvertiserState::ClearingList => write!(f, "clearing allow-list"),
            AdvertiserState::EnumeratingBonds => write!(f, "enumerating bonds"),
            AdvertiserState::Starting(mode) => write!(f, "starting {} advertising", mode),
            AdvertiserState::Advertising(mode) => write!(f, "advertising ({})", mode),
        }
    }
}

/// Fixed inputs of every cycle
#[derive(Debug, Clone)]
pub struct AdvertiserSettings {
    pub identity: LocalIdentity,
    pub interval_min: u16,
    pub interval_max: u16,
    /// Advertise open after a failed rebuild instead of not at all
    pub fallback_to_open: bool,
    ad: Vec<u8>,
    sd: Vec<u8>,
}

impl AdvertiserSettings {
    /// Encodes the lock payload for `device_name`
    pub fn new(
        identity: LocalIdentity,
        device_name: &str,
        interval_min: u16,
        interval_max: u16,
        fallback_to_open: bool,
    ) -> Result<Self> {
        let (ad, sd) = lock_advertising_data(device_name);
        Ok(Self {
            identity,
            interval_min,
            interval_max,
            fallback_to_open,
            ad: ad.encode()?,
            sd: sd.encode()?,
        })
    }

    pub fn advertising_data(&self) -> &[u8] {
        &self.ad
    }

    pub fn scan_response_data(&self) -> &[u8] {
        &self.sd
    }
}

/// Rebuilds the allow-list and restarts advertising
pub struct AllowListAdvertiser {
    controller: Arc<dyn Controller>,
    bonds: Arc<dyn BondStore>,
    settings: AdvertiserSettings,
    state: watch::Sender<AdvertiserState>,
    events: EventSink,
}

impl AllowListAdvertiser {
    pub fn new(
        controller: Arc<dyn Controller>,
        bonds: Arc<dyn BondStore>,
        settings: AdvertiserSettings,
        events: EventSink,
    ) -> Self {
        let (state, _) = watch::channel(AdvertiserState::Idle);
        Self {
            controller,
            bonds,
            settings,
            state,
            events,
        }
    }

    pub fn state(&self) -> AdvertiserState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AdvertiserState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: AdvertiserState) {
        debug!(state = %state, "advertiser state");
        self.state.send_replace(state);
    }

    /// Runs one complete cycle. Every failure is terminal for the cycle and
    /// is reported on the event stream as well as returned.
    pub fn run_cycle(&self) -> Result<AdvertisingMode> {
        let result = match self.rebuild_allow_list() {
            Ok(count) if count > 0 => self.start(AdvertisingMode::Filtered(count)),
            Ok(_) => self.start(AdvertisingMode::Open),
            Err(e) => {
                self.events.error(e.clone());
                if self.settings.fallback_to_open {
                    warn!(error = %e, "allow-list rebuild failed, advertising open");
                    self.start(AdvertisingMode::Open)
                } else {
                    Err(e)
                }
            }
        };

        if result.is_err() {
            self.set_state(AdvertiserState::Idle);
        }
        result
    }

    /// Clears the list and adds every bond. Returns how many were added.
    fn rebuild_allow_list(&self) -> Result<usize> {
        self.set_state(AdvertiserState::ClearingList);
        if let Err(e) = self.controller.clear_filter_accept_list() {
            error!(error = %e, "cannot clear accept list");
            return Err(LockError::FilterClearFailed(e));
        }

        self.set_state(AdvertiserState::EnumeratingBonds);
        let mut added = 0;
        let mut failure = None;

        self.bonds
            .for_each_bond(self.settings.identity, &mut |peer| {
                match self.controller.add_to_filter_accept_list(peer) {
                    Ok(()) => {
                        debug!(peer = %peer, "added to accept list");
                        added += 1;
                        ControlFlow::Continue(())
                    }
                    Err(e) => {
                        error!(peer = %peer, error = %e, "cannot add peer to accept list");
                        failure = Some(LockError::FilterAddFailed {
                            addr: peer.address,
                            source: e,
                        });
                        ControlFlow::Break(())
                    }
                }
            })
            .map_err(LockError::BondStore)?;

        match failure {
            Some(e) => Err(e),
            None => Ok(added),
        }
    }

    fn start(&self, mode: AdvertisingMode) -> Result<AdvertisingMode> {
        self.set_state(AdvertiserState::Starting(mode));

        let params = AdvParams::for_mode(mode, self.settings.interval_min, self.settings.interval_max);
        match self
            .controller
            .start_advertising(&params, &self.settings.ad, &self.settings.sd)
        {
            Ok(()) => {
                info!(mode = %mode, "advertising successfully started");
                self.set_state(AdvertiserState::Advertising(mode));
                self.events.emit(LockEvent::AdvertisingStarted(mode));
                Ok(mode)
            }
            Err(e) => {
                error!(mode = %mode, error = %e, "advertising failed to start");
                let err = LockError::AdvertisingStartFailed(e);
                self.events.error(err.clone());
                Err(err)
            }
        }
    }

    /// Moves the advertiser onto a worker task driven by [`AdvertiserHandle::submit`].
    ///
    /// Controller calls block on the transport, so each cycle runs on the
    /// blocking pool while the worker only waits for it.
    pub fn spawn(self) -> (AdvertiserHandle, JoinHandle<()>) {
        let shared = Arc::new(Trigger {
            notify: Notify::new(),
            pending: AtomicBool::new(false),
        });
        let handle = AdvertiserHandle {
            trigger: Arc::clone(&shared),
            state: self.subscribe(),
        };

        let advertiser = Arc::new(self);
        let task = tokio::spawn(async move {
            loop {
                shared.notify.notified().await;
                // Submissions from here on queue another cycle
                shared.pending.store(false, Ordering::SeqCst);

                let cycle = Arc::clone(&advertiser);
                // Failures were already logged and reported
                if let Err(e) = tokio::task::spawn_blocking(move || cycle.run_cycle()).await {
                    error!(error = %e, "advertising cycle panicked");
                }
            }
        });

        (handle, task)
    }
}

impl fmt::Debug for AllowListAdvertiser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllowListAdvertiser")
            .field("settings", &self.settings)
            .field("state", &self.state())
            .finish()
    }
}

#[derive(Debug)]
struct Trigger {
    notify: Notify,
    pending: AtomicBool,
}

/// Work-submission side of the advertiser
#[derive(Debug, Clone)]
pub struct AdvertiserHandle {
    trigger: Arc<Trigger>,
    state: watch::Receiver<AdvertiserState>,
}

impl AdvertiserHandle {
    /// Requests a cycle. Returns false when one is already pending.
    pub fn submit(&self) -> bool {
        if self.trigger.pending.swap(true, Ordering::SeqCst) {
            debug!("advertising restart already pending");
            return false;
        }
        self.trigger.notify.notify_one();
        true
    }

    pub fn state(&self) -> AdvertiserState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AdvertiserState> {
        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bond::MemoryBondStore;
    use crate::gap::BdAddr;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Clear,
        Add(BdAddr),
        Start(AdvParams),
    }

    #[derive(Default)]
    struct MockController {
        calls: Mutex<Vec<Call>>,
        fail_clear: bool,
        /// Fails the add for this address
        fail_add: Option<BdAddr>,
        fail_start: bool,
        /// Makes the clear block like a slow transport
        clear_delay: Option<Duration>,
    }

    impl MockController {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn starts(&self) -> Vec<AdvParams> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Start(params) => Some(params),
                    _ => None,
                })
                .collect()
        }
    }

    impl Controller for MockController {
        fn clear_filter_accept_list(&self) -> std::result::Result<(), StackError> {
            self.calls.lock().unwrap().push(Call::Clear);
            if let Some(delay) = self.clear_delay {
                std::thread::sleep(delay);
            }
            if self.fail_clear {
                return Err(StackError::Status(0x0C));
            }
            Ok(())
        }

        fn add_to_filter_accept_list(&self, peer: &BondedPeer) -> std::result::Result<(), StackError> {
            self.calls.lock().unwrap().push(Call::Add(peer.address));
            if self.fail_add == Some(peer.address) {
                return Err(StackError::Status(0x07));
            }
            Ok(())
        }

        fn start_advertising(
            &self,
            params: &AdvParams,
            ad: &[u8],
            _sd: &[u8],
        ) -> std::result::Result<(), StackError> {
            assert!(!ad.is_empty());
            self.calls.lock().unwrap().push(Call::Start(*params));
            if self.fail_start {
                return Err(StackError::Status(0x0D));
            }
            Ok(())
        }
    }

    fn addr(last: u8) -> BdAddr {
        BdAddr::new([last, 0x22, 0x33, 0x44, 0x55, 0xC0])
    }

    fn advertiser(
        controller: Arc<MockController>,
        peers: &[BdAddr],
        fallback_to_open: bool,
    ) -> (AllowListAdvertiser, crate::events::EventStream) {
        let bonds = MemoryBondStore::with_bonds(0, peers.iter().copied().map(BondedPeer::public));
        let settings = AdvertiserSettings::new(0, "Smart Lock", 0x00A0, 0x00B0, fallback_to_open).unwrap();
        let (events, stream) = EventSink::channel();
        (
            AllowListAdvertiser::new(controller, Arc::new(bonds), settings, events),
            stream,
        )
    }

    #[test]
    fn test_no_bonds_advertises_open() {
        let controller = Arc::new(MockController::default());
        let (adv, mut events) = advertiser(controller.clone(), &[], false);

        assert_eq!(adv.run_cycle(), Ok(AdvertisingMode::Open));
        assert_eq!(adv.state(), AdvertiserState::Advertising(AdvertisingMode::Open));

        let starts = controller.starts();
        assert_eq!(starts.len(), 1);
        assert!(!starts[0].is_filtered());
        assert_eq!(
            events.try_recv().unwrap(),
            LockEvent::AdvertisingStarted(AdvertisingMode::Open)
        );
    }

    #[test]
    fn test_bonds_advertise_filtered_to_exactly_those_peers() {
        let controller = Arc::new(MockController::default());
        let peers = [addr(1), addr(2), addr(3)];
        let (adv, _events) = advertiser(controller.clone(), &peers, false);

        assert_eq!(adv.run_cycle(), Ok(AdvertisingMode::Filtered(3)));

        let calls = controller.calls();
        assert_eq!(calls[0], Call::Clear);
        assert_eq!(
            &calls[1..4],
            &[Call::Add(addr(1)), Call::Add(addr(2)), Call::Add(addr(3))]
        );
        let starts = controller.starts();
        assert_eq!(starts.len(), 1);
        assert!(starts[0].is_filtered());
        assert_eq!(starts[0].interval_min, 0x00A0);
        assert_eq!(starts[0].interval_max, 0x00B0);
    }

    #[test]
    fn test_add_failure_aborts_without_starting() {
        let controller = Arc::new(MockController {
            fail_add: Some(addr(2)),
            ..MockController::default()
        });
        let (adv, mut events) = advertiser(controller.clone(), &[addr(1), addr(2), addr(3)], false);

        let expected = LockError::FilterAddFailed {
            addr: addr(2),
            source: StackError::Status(0x07),
        };
        assert_eq!(adv.run_cycle(), Err(expected.clone()));
        assert!(controller.starts().is_empty());
        // Enumeration stopped at the failing peer
        assert!(!controller.calls().contains(&Call::Add(addr(3))));
        assert_eq!(adv.state(), AdvertiserState::Idle);
        assert_eq!(events.try_recv().unwrap(), LockEvent::Error(expected));
    }

    #[test]
    fn test_add_failure_with_fallback_never_filters() {
        let controller = Arc::new(MockController {
            fail_add: Some(addr(2)),
            ..MockController::default()
        });
        let (adv, _events) = advertiser(controller.clone(), &[addr(1), addr(2)], true);

        assert_eq!(adv.run_cycle(), Ok(AdvertisingMode::Open));
        let starts = controller.starts();
        assert_eq!(starts.len(), 1);
        assert!(!starts[0].is_filtered());
    }

    #[test]
    fn test_clear_failure_is_reported() {
        let controller = Arc::new(MockController {
            fail_clear: true,
            ..MockController::default()
        });
        let (adv, mut events) = advertiser(controller.clone(), &[addr(1)], false);

        let expected = LockError::FilterClearFailed(StackError::Status(0x0C));
        assert_eq!(adv.run_cycle(), Err(expected.clone()));
        assert_eq!(controller.calls(), vec![Call::Clear]);
        assert_eq!(events.try_recv().unwrap(), LockEvent::Error(expected));
    }

    #[test]
    fn test_start_failure_is_reported() {
        let controller = Arc::new(MockController {
            fail_start: true,
            ..MockController::default()
        });
        let (adv, mut events) = advertiser(controller.clone(), &[], false);

        let expected = LockError::AdvertisingStartFailed(StackError::Status(0x0D));
        assert_eq!(adv.run_cycle(), Err(expected.clone()));
        assert_eq!(adv.state(), AdvertiserState::Idle);
        assert_eq!(events.try_recv().unwrap(), LockEvent::Error(expected));
    }

    async fn wait_for_starts(controller: &MockController, count: usize) {
        while controller.starts().len() < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_submits_run_one_cycle() {
        let controller = Arc::new(MockController::default());
        let (adv, _events) = advertiser(controller.clone(), &[addr(1)], false);
        let (handle, task) = adv.spawn();
        let mut state = handle.subscribe();

        assert!(handle.submit());
        assert!(!handle.submit());
        state
            .wait_for(|s| matches!(s, AdvertiserState::Advertising(_)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(controller.starts().len(), 1);
        assert_eq!(
            handle.state(),
            AdvertiserState::Advertising(AdvertisingMode::Filtered(1))
        );

        // Each later disconnect gets its own cycle
        assert!(handle.submit());
        wait_for_starts(&controller, 2).await;
        assert!(handle.submit());
        wait_for_starts(&controller, 3).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(controller.starts().len(), 3);

        task.abort();
    }

    #[tokio::test]
    async fn test_slow_controller_leaves_runtime_responsive() {
        let controller = Arc::new(MockController {
            clear_delay: Some(Duration::from_millis(300)),
            ..MockController::default()
        });
        let (adv, _events) = advertiser(controller.clone(), &[], false);
        let (handle, task) = adv.spawn();
        let mut state = handle.subscribe();

        assert!(handle.submit());
        let started = std::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(
            started.elapsed() < Duration::from_millis(150),
            "timer stalled for {:?}",
            started.elapsed()
        );

        state
            .wait_for(|s| *s == AdvertiserState::Advertising(AdvertisingMode::Open))
            .await
            .unwrap();
        assert_eq!(controller.starts().len(), 1);

        task.abort();
    }
}
