//! doorlockd - runs the lock pairing subsystem against a simulated radio
//!
//! Usage: `doorlockd [config.json]`, then type commands on stdin (`help`).

mod commands;
mod logging;
mod sim;

use anyhow::Context;
use commands::{Command, HELP};
use doorlock::keypad::key_id_for;
use doorlock::{
    AuthHandler, BondStore, BondedPeer, ConnectionHandler, ConnectionInfo, DoorLock, EventStream,
    HciController, KeyEvent, LockConfig, LockEvent, MemoryBondStore, PairingFeatures, SecurityError,
    SecurityLevel,
};
use sim::{PairingOutcome, SimulatedRadio, SimulatedStack};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Parameters reported for every simulated connection (30 ms, 0, 4 s)
const SIM_CONNECTION: ConnectionInfo = ConnectionInfo {
    interval: 24,
    latency: 0,
    timeout: 400,
};

struct Daemon {
    lock: DoorLock,
    stack: Arc<SimulatedStack>,
    bonds: Arc<MemoryBondStore>,
}

impl Daemon {
    fn execute(&self, command: Command) -> anyhow::Result<()> {
        let identity = self.lock.config().local_identity;
        let auth = self.lock.auth_handler();
        let connections = self.lock.connection_handler();

        match command {
            Command::Keys(keys) => self.type_keys(&keys),
            Command::Connect { conn, peer } => connections.connected(conn, peer, Ok(SIM_CONNECTION)),
            Command::Pair {
                conn,
                peer,
                io_capability,
                passkey,
            } => {
                let features = PairingFeatures::with_io_capability(io_capability);
                if let Err(reason) = auth.pairing_accept(conn, &features) {
                    warn!(conn = %conn, reason = %reason, "pairing refused");
                    return Ok(());
                }
                self.stack.begin_pairing(conn, peer, passkey);
                auth.passkey_entry(conn, peer);
            }
            Command::Cancel { conn, peer } => {
                self.stack.end_pairing(conn);
                auth.cancel(conn, peer);
            }
            Command::Disconnect { conn, reason } => {
                self.stack.end_pairing(conn);
                connections.disconnected(conn, reason);
            }
            Command::Bond(peer) => {
                self.bonds
                    .add_bond(identity, BondedPeer::public(peer))
                    .context("cannot store bond")?;
                info!(peer = %peer, "bond stored");
            }
            Command::Wipe => {
                self.lock.clear_bonds()?;
            }
            Command::State => {
                let bonds = self.bonds.bond_count(identity)?;
                println!(
                    "lock: {}, advertiser: {:?}, bonds: {}",
                    self.lock.lock_state(),
                    self.lock.advertiser().state(),
                    bonds
                );
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => {}
        }
        Ok(())
    }

    /// Feeds characters through the matrix decoder as the button driver would
    fn type_keys(&self, keys: &str) {
        let keypad = self.lock.keypad();
        for key in keys.chars() {
            let Some(id) = key_id_for(key) else {
                warn!(key = %key, "no such key on the keypad");
                continue;
            };
            if let Err(e) = keypad.on_key_event(KeyEvent::pressed(id)) {
                debug!(error = %e, "key not delivered");
            }
            if let Err(e) = keypad.on_key_event(KeyEvent::released(id)) {
                debug!(error = %e, "key release not delivered");
            }
        }
    }

    /// Completes pairing the way the stack's security-changed callback would
    fn pairing_finished(&self, outcome: PairingOutcome) {
        let connections = self.lock.connection_handler();
        if outcome.success {
            let identity = self.lock.config().local_identity;
            if let Err(e) = self.bonds.add_bond(identity, BondedPeer::public(outcome.peer)) {
                warn!(peer = %outcome.peer, error = %e, "cannot store bond");
            }
            connections.security_changed(
                outcome.conn,
                outcome.peer,
                SecurityLevel::SecureConnections,
                Ok(()),
            );
        } else {
            connections.security_changed(
                outcome.conn,
                outcome.peer,
                SecurityLevel::None,
                Err(SecurityError::PasskeyEntryFailed),
            );
        }
    }
}

async fn log_events(mut events: EventStream) {
    while let Some(event) = events.recv().await {
        match event {
            LockEvent::Error(e) => warn!(error = %e, "lock error"),
            other => info!(event = ?other, "lock event"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => LockConfig::load(&path).with_context(|| format!("cannot load {}", path))?,
        None => LockConfig::default(),
    };
    logging::init_logger(&config.log_level)?;

    let (outcome_tx, mut outcomes) = mpsc::unbounded_channel();
    let stack = Arc::new(SimulatedStack::new(outcome_tx));
    let bonds = Arc::new(MemoryBondStore::new());
    let controller = Arc::new(HciController::new(SimulatedRadio::new()));

    let (lock, events) = DoorLock::start(
        config,
        controller,
        stack.clone(),
        stack.clone(),
        bonds.clone(),
    )
    .context("cannot start lock")?;
    let event_logger = tokio::spawn(log_events(events));

    let daemon = Daemon { lock, stack, bonds };
    info!("ready, type 'help' for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("cannot read stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(Command::Quit) => break,
                    Ok(command) => {
                        if let Err(e) = daemon.execute(command) {
                            warn!(error = %e, "command failed");
                        }
                    }
                    Err(e) => warn!(error = %e, "bad command"),
                }
            }
            Some(outcome) = outcomes.recv() => daemon.pairing_finished(outcome),
        }
    }

    daemon.lock.shutdown();
    event_logger.abort();
    info!("shutting down");
    Ok(())
}
