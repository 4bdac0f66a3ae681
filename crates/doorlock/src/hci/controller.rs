//! Allow-list and advertising primitives over a raw HCI transport

use crate::error::StackError;
use crate::gap::{AddressType, AdvParams, BondedPeer, Controller};
use crate::hci::constants::*;
use crate::hci::packet::{HciCommand, HciEvent};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, trace, warn};

/// Events read while waiting for one command to complete before giving up
const MAX_EVENTS_PER_COMMAND: usize = 8;

/// Moves raw HCI packets to and from a controller
pub trait HciTransport: Send + Sync {
    /// Write one command packet, packet type first
    fn send(&self, packet: &[u8]) -> Result<(), StackError>;

    /// Read one event packet, packet type first
    fn receive(&self) -> Result<Vec<u8>, StackError>;
}

/// Drives the controller by issuing HCI commands and checking their status
#[derive(Debug)]
pub struct HciController<T: HciTransport> {
    transport: T,
    // One command in flight at a time
    exchange: Mutex<()>,
}

impl<T: HciTransport> HciController<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            exchange: Mutex::new(()),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends a command and waits for the event that completes it
    pub fn execute(&self, command: &HciCommand) -> Result<(), StackError> {
        let _exchange = self.exchange.lock().unwrap_or_else(PoisonError::into_inner);

        let packet = command.to_packet();
        trace!(opcode = command.opcode(), packet = %hex::encode(&packet), "hci command");
        self.transport.send(&packet)?;

        for _ in 0..MAX_EVENTS_PER_COMMAND {
            let raw = self.transport.receive()?;
            let Some((&HCI_EVENT_PKT, body)) = raw.split_first() else {
                warn!(packet = %hex::encode(&raw), "ignoring non-event packet");
                continue;
            };

            let event = HciEvent::parse(body)
                .ok_or_else(|| StackError::UnexpectedResponse(hex::encode(&raw)))?;

            match event.command_result() {
                Some(result) if result.opcode == command.opcode() => {
                    return if result.status == HCI_STATUS_SUCCESS {
                        Ok(())
                    } else {
                        debug!(opcode = result.opcode, status = result.status, "hci command failed");
                        Err(StackError::Status(result.status))
                    };
                }
                _ => trace!(event_code = event.event_code, "unrelated event while waiting"),
            }
        }

        Err(StackError::UnexpectedResponse(format!(
            "no completion for opcode 0x{:04X}",
            command.opcode()
        )))
    }
}

impl<T: HciTransport> Controller for HciController<T> {
    fn clear_filter_accept_list(&self) -> Result<(), StackError> {
        self.execute(&HciCommand::LeClearFilterAcceptList)
    }

    fn add_to_filter_accept_list(&self, peer: &BondedPeer) -> Result<(), StackError> {
        // Identity addresses go on the list under their base type
        let address_type = match peer.address_type {
            AddressType::Public | AddressType::PublicIdentity => ADDR_TYPE_PUBLIC,
            AddressType::Random | AddressType::RandomIdentity => ADDR_TYPE_RANDOM,
        };
        self.execute(&HciCommand::LeAddDeviceToFilterAcceptList {
            address_type,
            address: peer.address.bytes,
        })
    }

    fn start_advertising(&self, params: &AdvParams, ad: &[u8], sd: &[u8]) -> Result<(), StackError> {
        let filter_policy = if params.is_filtered() {
            ADV_FILTER_CONN
        } else {
            ADV_FILTER_NONE
        };

        self.execute(&HciCommand::LeSetAdvertisingParameters {
            interval_min: params.interval_min,
            interval_max: params.interval_max,
            adv_type: ADV_IND,
            own_address_type: OWN_ADDRESS_PUBLIC,
            peer_address_type: 0,
            peer_address: [0; 6],
            channel_map: ADV_CHANNEL_MAP_ALL,
            filter_policy,
        })?;
        self.execute(&HciCommand::LeSetAdvertisingData { data: ad.to_vec() })?;
        self.execute(&HciCommand::LeSetScanResponseData { data: sd.to_vec() })?;
        self.execute(&HciCommand::LeSetAdvertisingEnable { enable: true })?;

        let mode = if params.is_filtered() { "filtered" } else { "open" };
        debug!(mode, "controller advertising enabled");
        Ok(())
    }
}
