//! HCI packet structures and parsing
//!
//! This module contains the controller commands the advertiser issues and the
//! event that completes them.

use crate::hci::constants::*;
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Controller commands used to program the allow-list and advertising
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HciCommand {
    // LE Commands (OGF: 0x08)
    LeSetAdvertisingParameters {
        interval_min: u16,
        interval_max: u16,
        adv_type: u8,
        own_address_type: u8,
        peer_address_type: u8,
        peer_address: [u8; 6],
        channel_map: u8,
        filter_policy: u8,
    },
    LeSetAdvertisingData { data: Vec<u8> },
    LeSetScanResponseData { data: Vec<u8> },
    LeSetAdvertisingEnable { enable: bool },
    LeClearFilterAcceptList,
    LeAddDeviceToFilterAcceptList { address_type: u8, address: [u8; 6] },
}

impl HciCommand {
    /// Get the OGF and OCF for this command
    pub fn opcode_parts(&self) -> (u8, u16) {
        match self {
            Self::LeSetAdvertisingParameters { .. } => (OGF_LE, OCF_LE_SET_ADVERTISING_PARAMETERS),
            Self::LeSetAdvertisingData { .. } => (OGF_LE, OCF_LE_SET_ADVERTISING_DATA),
            Self::LeSetScanResponseData { .. } => (OGF_LE, OCF_LE_SET_SCAN_RESPONSE_DATA),
            Self::LeSetAdvertisingEnable { .. } => (OGF_LE, OCF_LE_SET_ADVERTISING_ENABLE),
            Self::LeClearFilterAcceptList => (OGF_LE, OCF_LE_CLEAR_FILTER_ACCEPT_LIST),
            Self::LeAddDeviceToFilterAcceptList { .. } => {
                (OGF_LE, OCF_LE_ADD_DEVICE_TO_FILTER_ACCEPT_LIST)
            }
        }
    }

    /// The 16-bit opcode as it appears on the wire
    pub fn opcode(&self) -> u16 {
        let (ogf, ocf) = self.opcode_parts();
        ((ogf as u16) << 10) | (ocf & 0x3ff)
    }

    /// Convert the command to its raw parameter bytes
    fn parameters(&self) -> Vec<u8> {
        match self {
            Self::LeClearFilterAcceptList => vec![],

            Self::LeSetAdvertisingParameters {
                interval_min,
                interval_max,
                adv_type,
                own_address_type,
                peer_address_type,
                peer_address,
                channel_map,
                filter_policy,
            } => {
                let mut params = vec![0u8; 15];
                LittleEndian::write_u16(&mut params[0..2], *interval_min);
                LittleEndian::write_u16(&mut params[2..4], *interval_max);
                params[4] = *adv_type;
                params[5] = *own_address_type;
                params[6] = *peer_address_type;
                params[7..13].copy_from_slice(peer_address);
                params[13] = *channel_map;
                params[14] = *filter_policy;
                params
            }

            // Length byte, then the payload zero padded to 31 bytes
            Self::LeSetAdvertisingData { data } | Self::LeSetScanResponseData { data } => {
                let len = data.len().min(HCI_ADV_DATA_LEN);
                let mut params = vec![0u8; HCI_ADV_DATA_LEN + 1];
                params[0] = len as u8;
                params[1..=len].copy_from_slice(&data[..len]);
                params
            }

            Self::LeSetAdvertisingEnable { enable } => vec![*enable as u8],

            Self::LeAddDeviceToFilterAcceptList {
                address_type,
                address,
            } => {
                let mut params = Vec::with_capacity(7);
                params.push(*address_type);
                params.extend_from_slice(address);
                params
            }
        }
    }

    /// Convert the command to a raw HCI packet
    pub fn to_packet(&self) -> Vec<u8> {
        let params = self.parameters();

        let mut packet = vec![HCI_COMMAND_PKT, 0, 0];
        LittleEndian::write_u16(&mut packet[1..3], self.opcode());
        packet.push(params.len().min(HCI_MAX_PARAM_LEN) as u8);
        packet.extend_from_slice(&params);
        packet
    }
}

/// HCI Event packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HciEvent {
    pub event_code: u8,
    pub parameter_total_length: u8,
    pub parameters: Vec<u8>,
}

/// The fields of a Command Complete or Command Status event we act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandResult {
    pub opcode: u16,
    pub status: u8,
}

impl HciEvent {
    /// Parse an HCI event from raw bytes, packet type already stripped
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 2 {
            return None;
        }

        let event_code = data[0];
        let parameter_total_length = data[1];

        if data.len() < (parameter_total_length as usize + 2) {
            return None;
        }

        let parameters = data[2..(parameter_total_length as usize + 2)].to_vec();

        Some(HciEvent {
            event_code,
            parameter_total_length,
            parameters,
        })
    }

    /// A Command Complete event for `opcode` carrying `status`
    pub fn command_complete(opcode: u16, status: u8) -> Self {
        let mut parameters = vec![1, 0, 0, status];
        LittleEndian::write_u16(&mut parameters[1..3], opcode);
        Self {
            event_code: EVT_CMD_COMPLETE,
            parameter_total_length: parameters.len() as u8,
            parameters,
        }
    }

    /// Serialise back to wire form, packet type first
    pub fn to_packet(&self) -> Vec<u8> {
        let mut packet = vec![HCI_EVENT_PKT, self.event_code, self.parameters.len() as u8];
        packet.extend_from_slice(&self.parameters);
        packet
    }

    /// Opcode and status when this event answers a command
    pub fn command_result(&self) -> Option<CommandResult> {
        let mut cursor = Cursor::new(&self.parameters);
        match self.event_code {
            // Num_HCI_Command_Packets, Command_Opcode, Status
            EVT_CMD_COMPLETE => {
                let _num_packets = cursor.read_u8().ok()?;
                let opcode = cursor.read_u16::<LittleEndian>().ok()?;
                let status = cursor.read_u8().ok()?;
                Some(CommandResult { opcode, status })
            }
            // Status, Num_HCI_Command_Packets, Command_Opcode
            EVT_CMD_STATUS => {
                let status = cursor.read_u8().ok()?;
                let _num_packets = cursor.read_u8().ok()?;
                let opcode = cursor.read_u16::<LittleEndian>().ok()?;
                Some(CommandResult { opcode, status })
            }
            _ => None,
        }
    }
}
