//! Connection lifecycle
//!
//! Logs link parameter changes, renegotiates PHY, data length and MTU once a
//! connection has settled, and restarts the allow-list advertiser whenever a
//! peer goes away. Like the pairing callbacks, every handler method returns
//! without waiting.

use crate::config::LinkConfig;
use crate::error::StackError;
use crate::events::{EventSink, LockEvent};
use crate::gap::constants::{
    ATT_HEADER_LEN, CONN_INTERVAL_UNIT_US, LE_DATA_LEN_MAX, LE_DATA_TIME_MAX,
    SUPERVISION_TIMEOUT_UNIT_MS,
};
use crate::gap::{AdvertiserHandle, BdAddr, ConnHandle};
use crate::smp::{PasskeyAuthenticator, SecurityError, SecurityLevel};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// LE physical layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phy {
    Le1m,
    Le2m,
    /// Long range
    Coded,
}

impl fmt::Display for Phy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phy::Le1m => write!(f, "1M"),
            Phy::Le2m => write!(f, "2M"),
            Phy::Coded => write!(f, "Long Range"),
        }
    }
}

/// Connection parameters in controller units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// 1.25 ms units
    pub interval: u16,
    /// Connection events the peripheral may skip
    pub latency: u16,
    /// 10 ms units
    pub timeout: u16,
}

impl ConnectionInfo {
    pub fn interval_us(&self) -> u32 {
        self.interval as u32 * CONN_INTERVAL_UNIT_US
    }

    pub fn supervision_timeout_ms(&self) -> u32 {
        self.timeout as u32 * SUPERVISION_TIMEOUT_UNIT_MS
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let interval = self.interval_us();
        write!(
            f,
            "interval {}.{:02} ms, latency {} intervals, timeout {} ms",
            interval / 1000,
            (interval % 1000) / 10,
            self.latency,
            self.supervision_timeout_ms()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhyInfo {
    pub tx_phy: Phy,
    pub rx_phy: Phy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataLenInfo {
    pub tx_max_len: u16,
    pub tx_max_time: u16,
    pub rx_max_len: u16,
    pub rx_max_time: u16,
}

/// Link updates the handler asks the stack for
pub trait LinkControl: Send + Sync {
    fn update_phy(&self, conn: ConnHandle, phy: Phy) -> Result<(), StackError>;

    fn update_data_length(&self, conn: ConnHandle, tx_max_len: u16, tx_max_time: u16) -> Result<(), StackError>;

    /// Returns the negotiated ATT MTU
    fn exchange_mtu(&self, conn: ConnHandle) -> Result<u16, StackError>;
}

/// Connection callbacks the stack invokes
pub trait ConnectionHandler: Send + Sync {
    /// `Err` carries the HCI status of a failed connection attempt
    fn connected(&self, conn: ConnHandle, peer: BdAddr, result: Result<ConnectionInfo, u8>);

    fn disconnected(&self, conn: ConnHandle, reason: u8);

    fn security_changed(
        &self,
        conn: ConnHandle,
        peer: BdAddr,
        level: SecurityLevel,
        result: Result<(), SecurityError>,
    );

    fn le_param_updated(&self, conn: ConnHandle, info: ConnectionInfo);

    fn le_phy_updated(&self, conn: ConnHandle, info: PhyInfo);

    fn le_data_len_updated(&self, conn: ConnHandle, info: DataLenInfo);
}

/// The lock's [`ConnectionHandler`]
pub struct LockConnectionHandler {
    advertiser: AdvertiserHandle,
    authenticator: Arc<PasskeyAuthenticator>,
    link: Arc<dyn LinkControl>,
    config: LinkConfig,
    renegotiations: Mutex<HashMap<ConnHandle, JoinHandle<()>>>,
    runtime: Handle,
    events: EventSink,
}

impl LockConnectionHandler {
    /// Must be called from within a tokio runtime
    pub fn new(
        advertiser: AdvertiserHandle,
        authenticator: Arc<PasskeyAuthenticator>,
        link: Arc<dyn LinkControl>,
        config: LinkConfig,
        events: EventSink,
    ) -> Self {
        Self {
            advertiser,
            authenticator,
            link,
            config,
            renegotiations: Mutex::new(HashMap::new()),
            runtime: Handle::current(),
            events,
        }
    }

    fn schedule_renegotiation(&self, conn: ConnHandle) {
        let link = Arc::clone(&self.link);
        let delay = self.config.settle_delay();
        let phy = self.config.preferred_phy;

        let task = self.runtime.spawn(async move {
            // Let the connection procedure finish first
            tokio::time::sleep(delay).await;
            // Link requests block on the controller
            let requests = tokio::task::spawn_blocking(move || renegotiate(link.as_ref(), conn, phy));
            if let Err(e) = requests.await {
                error!(conn = %conn, error = %e, "link renegotiation panicked");
            }
        });

        let mut renegotiations = self.renegotiations.lock().unwrap_or_else(PoisonError::into_inner);
        renegotiations.retain(|_, task| !task.is_finished());
        if let Some(old) = renegotiations.insert(conn, task) {
            old.abort();
        }
    }
}

fn renegotiate(link: &dyn LinkControl, conn: ConnHandle, phy: Phy) {
    if let Err(e) = link.update_phy(conn, phy) {
        error!(conn = %conn, error = %e, "phy update failed");
    }

    if let Err(e) = link.update_data_length(conn, LE_DATA_LEN_MAX, LE_DATA_TIME_MAX) {
        error!(conn = %conn, error = %e, "data length update failed");
    }

    match link.exchange_mtu(conn) {
        Ok(mtu) => info!(
            conn = %conn,
            "MTU exchange successful, new MTU: {} bytes",
            mtu.saturating_sub(ATT_HEADER_LEN)
        ),
        Err(e) => error!(conn = %conn, error = %e, "MTU exchange failed"),
    }
}

impl ConnectionHandler for LockConnectionHandler {
    fn connected(&self, conn: ConnHandle, peer: BdAddr, result: Result<ConnectionInfo, u8>) {
        let info = match result {
            Ok(info) => info,
            Err(status) => {
                warn!(peer = %peer, status, "connection failed");
                return;
            }
        };

        info!(conn = %conn, peer = %peer, "Connected, connection parameters: {}", info);
        self.events.emit(LockEvent::Connected { conn });

        if self.config.renegotiate {
            self.schedule_renegotiation(conn);
        }
    }

    fn disconnected(&self, conn: ConnHandle, reason: u8) {
        info!(conn = %conn, reason, "Disconnected");

        let pending = self
            .renegotiations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&conn);
        if let Some(task) = pending {
            task.abort();
        }
        self.authenticator.cancel_session(conn);

        self.events.emit(LockEvent::Disconnected { conn, reason });
        self.advertiser.submit();
    }

    fn security_changed(
        &self,
        conn: ConnHandle,
        peer: BdAddr,
        level: SecurityLevel,
        result: Result<(), SecurityError>,
    ) {
        match &result {
            Ok(()) if !level.is_authenticated() => warn!(
                conn = %conn,
                "Security changed: {} level {} without MITM protection",
                peer,
                level as u8
            ),
            Ok(()) => info!(conn = %conn, "Security changed: {} level {}", peer, level as u8),
            Err(e) => warn!(
                conn = %conn,
                "Security failed: {} level {} err {}",
                peer,
                level as u8,
                e
            ),
        }
        self.events.emit(LockEvent::SecurityChanged { conn, level, result });
    }

    fn le_param_updated(&self, conn: ConnHandle, info: ConnectionInfo) {
        info!(conn = %conn, "Connection parameters updated: {}", info);
    }

    fn le_phy_updated(&self, conn: ConnHandle, info: PhyInfo) {
        info!(conn = %conn, "PHY updated. New PHY: {}", info.tx_phy);
    }

    fn le_data_len_updated(&self, conn: ConnHandle, info: DataLenInfo) {
        info!(
            conn = %conn,
            "Data length updated. Length {}/{} bytes, time {}/{} us",
            info.tx_max_len,
            info.rx_max_len,
            info.tx_max_time,
            info.rx_max_time
        );
    }
}

impl fmt::Debug for LockConnectionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockConnectionHandler")
            .field("config", &self.config)
            .field("advertiser", &self.advertiser.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bond::MemoryBondStore;
    use crate::gap::{
        AdvParams, AdvertiserSettings, AdvertiserState, AdvertisingMode, AllowListAdvertiser,
        BondedPeer, Controller,
    };
    use crate::keypad::KeypadContext;
    use crate::smp::{PairingStack, VerificationMode};
    use crate::keypad::Passkey;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum LinkCall {
        Phy(ConnHandle, Phy),
        DataLength(ConnHandle, u16, u16),
        Mtu(ConnHandle),
    }

    #[derive(Default)]
    struct MockLink {
        calls: Mutex<Vec<LinkCall>>,
        /// Blocks the PHY request like a slow controller
        phy_delay: Option<Duration>,
    }

    impl MockLink {
        fn calls(&self) -> Vec<LinkCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl LinkControl for MockLink {
        fn update_phy(&self, conn: ConnHandle, phy: Phy) -> Result<(), StackError> {
            self.calls.lock().unwrap().push(LinkCall::Phy(conn, phy));
            if let Some(delay) = self.phy_delay {
                std::thread::sleep(delay);
            }
            Ok(())
        }

        fn update_data_length(&self, conn: ConnHandle, tx_max_len: u16, tx_max_time: u16) -> Result<(), StackError> {
            self.calls
                .lock()
                .unwrap()
                .push(LinkCall::DataLength(conn, tx_max_len, tx_max_time));
            Err(StackError::Rejected)
        }

        fn exchange_mtu(&self, conn: ConnHandle) -> Result<u16, StackError> {
            self.calls.lock().unwrap().push(LinkCall::Mtu(conn));
            Ok(247)
        }
    }

    #[derive(Default)]
    struct CountingController {
        starts: Mutex<usize>,
    }

    impl Controller for CountingController {
        fn clear_filter_accept_list(&self) -> Result<(), StackError> {
            Ok(())
        }

        fn add_to_filter_accept_list(&self, _peer: &BondedPeer) -> Result<(), StackError> {
            Ok(())
        }

        fn start_advertising(&self, _params: &AdvParams, _ad: &[u8], _sd: &[u8]) -> Result<(), StackError> {
            *self.starts.lock().unwrap() += 1;
            Ok(())
        }
    }

    struct NullStack;

    impl PairingStack for NullStack {
        fn passkey_entry(&self, _conn: ConnHandle, _passkey: Passkey) -> Result<(), StackError> {
            Ok(())
        }

        fn cancel(&self, _conn: ConnHandle) -> Result<(), StackError> {
            Ok(())
        }
    }

    struct Fixture {
        handler: LockConnectionHandler,
        link: Arc<MockLink>,
        controller: Arc<CountingController>,
        advertiser: JoinHandle<()>,
    }

    fn fixture(config: LinkConfig) -> Fixture {
        fixture_with_link(config, MockLink::default())
    }

    fn fixture_with_link(config: LinkConfig, link: MockLink) -> Fixture {
        let events = EventSink::disabled();
        let controller = Arc::new(CountingController::default());
        let settings = AdvertiserSettings::new(0, "Smart Lock", 0x00A0, 0x00B0, false).unwrap();
        let (handle, advertiser) = AllowListAdvertiser::new(
            controller.clone(),
            Arc::new(MemoryBondStore::new()),
            settings,
            events.clone(),
        )
        .spawn();

        let keypad = KeypadContext::new(10, '#', events.clone());
        let authenticator = Arc::new(PasskeyAuthenticator::new(
            keypad.source,
            Arc::new(NullStack),
            VerificationMode::Stack,
            None,
            events.clone(),
        ));

        let link = Arc::new(link);
        let handler = LockConnectionHandler::new(handle, authenticator, link.clone(), config, events);
        Fixture {
            handler,
            link,
            controller,
            advertiser,
        }
    }

    const PEER: BdAddr = BdAddr {
        bytes: [0x01, 0x02, 0x03, 0x04, 0x05, 0x06],
    };

    const PARAMS: ConnectionInfo = ConnectionInfo {
        interval: 24,
        latency: 0,
        timeout: 400,
    };

    #[test]
    fn test_connection_info_units() {
        assert_eq!(PARAMS.interval_us(), 30_000);
        assert_eq!(PARAMS.supervision_timeout_ms(), 4000);
        assert_eq!(
            PARAMS.to_string(),
            "interval 30.00 ms, latency 0 intervals, timeout 4000 ms"
        );
        let odd = ConnectionInfo {
            interval: 7,
            ..PARAMS
        };
        assert_eq!(odd.interval_us(), 8750);
        assert!(odd.to_string().starts_with("interval 8.75 ms"));
    }

    async fn wait_for_calls(link: &MockLink, count: usize) {
        while link.calls.lock().unwrap().len() < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_renegotiates_after_settle_delay() {
        let f = fixture(LinkConfig::default());
        f.handler.connected(ConnHandle(1), PEER, Ok(PARAMS));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(f.link.calls.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(600)).await;
        wait_for_calls(&f.link, 3).await;
        assert_eq!(
            f.link.calls(),
            vec![
                LinkCall::Phy(ConnHandle(1), Phy::Le2m),
                LinkCall::DataLength(ConnHandle(1), LE_DATA_LEN_MAX, LE_DATA_TIME_MAX),
                LinkCall::Mtu(ConnHandle(1)),
            ]
        );
        f.advertiser.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connection_and_disabled_renegotiation() {
        let f = fixture(LinkConfig {
            renegotiate: false,
            ..LinkConfig::default()
        });
        f.handler.connected(ConnHandle(1), PEER, Ok(PARAMS));
        f.handler.connected(ConnHandle(2), PEER, Err(0x3E));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(f.link.calls.lock().unwrap().is_empty());
        f.advertiser.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_restarts_advertising() {
        let f = fixture(LinkConfig::default());
        f.handler.connected(ConnHandle(3), PEER, Ok(PARAMS));
        f.handler.disconnected(ConnHandle(3), 0x13);

        let mut state = f.handler.advertiser.subscribe();
        state
            .wait_for(|s| matches!(s, AdvertiserState::Advertising(_)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*f.controller.starts.lock().unwrap(), 1);
        assert_eq!(
            f.handler.advertiser.state(),
            AdvertiserState::Advertising(AdvertisingMode::Open)
        );
        // Renegotiation for a dropped link never runs
        assert!(f.link.calls.lock().unwrap().is_empty());
        f.advertiser.abort();
    }

    #[tokio::test]
    async fn test_slow_link_requests_leave_runtime_responsive() {
        let link = MockLink {
            phy_delay: Some(Duration::from_millis(300)),
            ..MockLink::default()
        };
        let f = fixture_with_link(
            LinkConfig {
                settle_delay_ms: 0,
                ..LinkConfig::default()
            },
            link,
        );
        f.handler.connected(ConnHandle(4), PEER, Ok(PARAMS));

        let started = std::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(
            started.elapsed() < Duration::from_millis(150),
            "timer stalled for {:?}",
            started.elapsed()
        );

        wait_for_calls(&f.link, 3).await;
        assert_eq!(f.link.calls()[2], LinkCall::Mtu(ConnHandle(4)));
        f.advertiser.abort();
    }
}
