//! A host-side stand-in for the radio and the Bluetooth stack

use doorlock::gap::constants::ADV_TYPE_COMPLETE_LOCAL_NAME;
use doorlock::gap::parse_advertising_data;
use doorlock::hci::constants::{HCI_COMMAND_PKT, OCF_LE_SET_ADVERTISING_DATA, OGF_LE};
use doorlock::hci::HciEvent;
use doorlock::{BdAddr, ConnHandle, HciTransport, LinkControl, PairingStack, Passkey, Phy, StackError};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Simulated ATT MTU after exchange
const SIM_ATT_MTU: u16 = 247;

/// Logs every command and answers it with a successful Command Complete
#[derive(Debug, Default)]
pub struct SimulatedRadio {
    responses: Mutex<VecDeque<Vec<u8>>>,
}

impl SimulatedRadio {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The complete local name carried by an LE Set Advertising Data packet
fn advertised_name(packet: &[u8]) -> Option<String> {
    let (&len, payload) = packet.get(4..)?.split_first()?;
    let data = payload.get(..usize::from(len))?;
    parse_advertising_data(data)
        .into_iter()
        .find(|(ad_type, _)| *ad_type == ADV_TYPE_COMPLETE_LOCAL_NAME)
        .map(|(_, name)| String::from_utf8_lossy(&name).into_owned())
}

impl HciTransport for SimulatedRadio {
    fn send(&self, packet: &[u8]) -> Result<(), StackError> {
        match packet {
            [HCI_COMMAND_PKT, lo, hi, ..] => {
                let opcode = u16::from_le_bytes([*lo, *hi]);
                info!(opcode, packet = %hex::encode(packet), "radio <- hci command");
                if opcode == (u16::from(OGF_LE) << 10 | OCF_LE_SET_ADVERTISING_DATA) {
                    if let Some(name) = advertised_name(packet) {
                        debug!(name = %name, "radio advertising");
                    }
                }
                self.responses
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push_back(HciEvent::command_complete(opcode, 0x00).to_packet());
                Ok(())
            }
            _ => Err(StackError::Transport(format!(
                "not a command packet: {}",
                hex::encode(packet)
            ))),
        }
    }

    fn receive(&self) -> Result<Vec<u8>, StackError> {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| StackError::Transport("radio has nothing to report".to_string()))
    }
}

/// What the simulated security manager decided about a submitted passkey
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingOutcome {
    pub conn: ConnHandle,
    pub peer: BdAddr,
    pub success: bool,
}

#[derive(Debug, Clone, Copy)]
struct PendingPairing {
    peer: BdAddr,
    /// The value the peer shows; `None` accepts anything
    expected: Option<Passkey>,
}

/// Security manager and link layer of the simulated stack. Pairing results
/// arrive asynchronously on the outcome channel, as they would from a real
/// security-changed callback.
#[derive(Debug)]
pub struct SimulatedStack {
    pending: Mutex<HashMap<ConnHandle, PendingPairing>>,
    outcomes: mpsc::UnboundedSender<PairingOutcome>,
}

impl SimulatedStack {
    pub fn new(outcomes: mpsc::UnboundedSender<PairingOutcome>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            outcomes,
        }
    }

    /// Opens a passkey-entry pairing on `conn`
    pub fn begin_pairing(&self, conn: ConnHandle, peer: BdAddr, expected: Option<Passkey>) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(conn, PendingPairing { peer, expected });
    }

    /// Drops the pairing on `conn`, returning the peer it was with
    pub fn end_pairing(&self, conn: ConnHandle) -> Option<BdAddr> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&conn)
            .map(|p| p.peer)
    }
}

impl PairingStack for SimulatedStack {
    fn passkey_entry(&self, conn: ConnHandle, passkey: Passkey) -> Result<(), StackError> {
        let pairing = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&conn)
            .ok_or(StackError::NoSession)?;

        let success = pairing.expected.map_or(true, |expected| expected == passkey);
        debug!(conn = %conn, success, "stack received passkey");

        let outcome = PairingOutcome {
            conn,
            peer: pairing.peer,
            success,
        };
        self.outcomes
            .send(outcome)
            .map_err(|_| StackError::Transport("pairing outcome receiver gone".to_string()))
    }

    fn cancel(&self, conn: ConnHandle) -> Result<(), StackError> {
        match self.end_pairing(conn) {
            Some(peer) => {
                info!(conn = %conn, peer = %peer, "stack cancelled pairing");
                Ok(())
            }
            None => Err(StackError::NoSession),
        }
    }
}

impl LinkControl for SimulatedStack {
    fn update_phy(&self, conn: ConnHandle, phy: Phy) -> Result<(), StackError> {
        info!(conn = %conn, phy = %phy, "link <- phy update");
        Ok(())
    }

    fn update_data_length(&self, conn: ConnHandle, tx_max_len: u16, tx_max_time: u16) -> Result<(), StackError> {
        info!(conn = %conn, tx_max_len, tx_max_time, "link <- data length update");
        Ok(())
    }

    fn exchange_mtu(&self, conn: ConnHandle) -> Result<u16, StackError> {
        info!(conn = %conn, "link <- mtu exchange");
        Ok(SIM_ATT_MTU)
    }
}
