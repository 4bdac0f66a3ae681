//! Advertising parameters and payload
//!
//! The lock advertises connectable, one-shot, from its identity address. The
//! only thing that changes between cycles is whether the controller's filter
//! accept list gates incoming connections.

use crate::error::{LockError, Result};
use crate::gap::constants::*;
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Advertising options, mirroring what the stack accepts at start time
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AdvOptions: u8 {
        /// Connectable advertising
        const CONNECTABLE = 0x01;
        /// Advertise once; not restarted by the stack after a connection
        const ONE_TIME = 0x02;
        /// Advertise from the identity address
        const USE_IDENTITY = 0x04;
        /// Only peers on the filter accept list may connect
        const FILTER_CONN = 0x08;
    }
}

/// Whether the allow-list gates connections for an advertising set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertisingMode {
    /// Any peer may connect
    Open,
    /// Only the given number of bonded peers may connect
    Filtered(usize),
}

impl fmt::Display for AdvertisingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdvertisingMode::Open => write!(f, "open"),
            AdvertisingMode::Filtered(n) => write!(f, "filtered ({} peers)", n),
        }
    }
}

/// Parameters passed to the controller when advertising starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvParams {
    pub options: AdvOptions,
    /// Minimum interval, 0.625 ms units
    pub interval_min: u16,
    /// Maximum interval, 0.625 ms units
    pub interval_max: u16,
}

impl AdvParams {
    /// Connectable, one-shot, identity-address parameters for the given mode
    pub fn for_mode(mode: AdvertisingMode, interval_min: u16, interval_max: u16) -> Self {
        let mut options = AdvOptions::CONNECTABLE | AdvOptions::ONE_TIME | AdvOptions::USE_IDENTITY;
        if let AdvertisingMode::Filtered(_) = mode {
            options |= AdvOptions::FILTER_CONN;
        }

        Self {
            options,
            interval_min,
            interval_max,
        }
    }

    pub fn is_filtered(&self) -> bool {
        self.options.contains(AdvOptions::FILTER_CONN)
    }
}

impl Default for AdvParams {
    fn default() -> Self {
        Self::for_mode(AdvertisingMode::Open, ADV_INTERVAL_MIN, ADV_INTERVAL_MAX)
    }
}

/// Converts milliseconds into advertising interval units
/// Saturates at the largest encodable interval.
pub fn ms_to_adv_interval(ms: u32) -> u16 {
    let units = u64::from(ms) * 1000 / u64::from(ADV_INTERVAL_UNIT_US);
    u16::try_from(units).unwrap_or(u16::MAX)
}

/// A list of AD structures making up an advertising or scan response payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertisingData {
    entries: Vec<(u8, Vec<u8>)>,
}

impl AdvertisingData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flags(mut self, flags: u8) -> Self {
        self.entries.push((ADV_TYPE_FLAGS, vec![flags]));
        self
    }

    pub fn complete_name(mut self, name: &str) -> Self {
        self.entries
            .push((ADV_TYPE_COMPLETE_LOCAL_NAME, name.as_bytes().to_vec()));
        self
    }

    pub fn service_uuid128(mut self, uuid: [u8; 16]) -> Self {
        self.entries
            .push((ADV_TYPE_128BIT_SERVICE_UUID_COMPLETE, uuid.to_vec()));
        self
    }

    pub fn entries(&self) -> &[(u8, Vec<u8>)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encoded length of all AD structures
    pub fn encoded_len(&self) -> usize {
        self.entries.iter().map(|(_, data)| data.len() + 2).sum()
    }

    /// Encodes the AD structures, failing when the payload exceeds 31 bytes
    pub fn encode(&self) -> Result<Vec<u8>> {
        let len = self.encoded_len();
        if len > ADV_DATA_MAX_LEN {
            return Err(LockError::AdvertisingDataTooLong(len));
        }

        let mut out = Vec::with_capacity(len);
        for (ad_type, data) in &self.entries {
            out.push((data.len() + 1) as u8);
            out.push(*ad_type);
            out.extend_from_slice(data);
        }

        Ok(out)
    }
}

/// The lock's advertising payload: flags and name, with the service UUID in
/// the scan response
pub fn lock_advertising_data(device_name: &str) -> (AdvertisingData, AdvertisingData) {
    let ad = AdvertisingData::new()
        .flags(ADV_FLAG_LE_GENERAL_DISCOVERABLE | ADV_FLAG_BR_EDR_NOT_SUPPORTED)
        .complete_name(device_name);
    let sd = AdvertisingData::new().service_uuid128(LOCK_SERVICE_UUID);
    (ad, sd)
}

/// Parse advertisement data into (type, data) tuples
pub fn parse_advertising_data(data: &[u8]) -> Vec<(u8, Vec<u8>)> {
    let mut result = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let length = data[i] as usize;
        if length == 0 || i + length >= data.len() {
            break;
        }

        let ad_type = data[i + 1];
        let ad_data = data[i + 2..i + 1 + length].to_vec();

        result.push((ad_type, ad_data));

        i += 1 + length;
    }

    result
}
