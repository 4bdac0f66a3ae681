use crate::gap::constants::*;
use std::fmt;
use std::str::FromStr;

/// Local identity index, `0` is the default identity
pub type LocalIdentity = u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnHandle(pub u16);

impl fmt::Display for ConnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressType {
    Public,
    Random,
    PublicIdentity,
    RandomIdentity,
}

impl From<u8> for AddressType {
    fn from(value: u8) -> Self {
        match value {
            PUBLIC_DEVICE_ADDRESS => AddressType::Public,
            RANDOM_DEVICE_ADDRESS => AddressType::Random,
            PUBLIC_IDENTITY_ADDRESS => AddressType::PublicIdentity,
            RANDOM_IDENTITY_ADDRESS => AddressType::RandomIdentity,
            _ => AddressType::Public,
        }
    }
}

impl From<AddressType> for u8 {
    fn from(value: AddressType) -> Self {
        match value {
            AddressType::Public => PUBLIC_DEVICE_ADDRESS,
            AddressType::Random => RANDOM_DEVICE_ADDRESS,
            AddressType::PublicIdentity => PUBLIC_IDENTITY_ADDRESS,
            AddressType::RandomIdentity => RANDOM_IDENTITY_ADDRESS,
        }
    }
}

/// Bluetooth device address, stored little-endian as on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BdAddr {
    pub bytes: [u8; 6],
}

impl BdAddr {
    pub fn new(bytes: [u8; 6]) -> Self {
        Self { bytes }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.bytes[5],
            self.bytes[4],
            self.bytes[3],
            self.bytes[2],
            self.bytes[1],
            self.bytes[0]
        )
    }
}

/// Error returned when parsing a `BdAddr` from text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid device address: {0}")]
pub struct ParseAddrError(pub String);

impl FromStr for BdAddr {
    type Err = ParseAddrError;

    /// Parses the display form `AA:BB:CC:DD:EE:FF` (most significant octet first)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(ParseAddrError(s.to_string()));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            let octet = hex::decode(part).map_err(|_| ParseAddrError(s.to_string()))?;
            if octet.len() != 1 {
                return Err(ParseAddrError(s.to_string()));
            }
            bytes[5 - i] = octet[0];
        }

        Ok(Self { bytes })
    }
}

/// A bonded peer identity as enumerated from the platform bond store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BondedPeer {
    pub address: BdAddr,
    pub address_type: AddressType,
}

impl BondedPeer {
    pub fn new(address: BdAddr, address_type: AddressType) -> Self {
        Self {
            address,
            address_type,
        }
    }

    pub fn public(address: BdAddr) -> Self {
        Self::new(address, AddressType::Public)
    }
}

impl fmt::Display for BondedPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.address_type {
            AddressType::Public | AddressType::PublicIdentity => "public",
            AddressType::Random | AddressType::RandomIdentity => "random",
        };
        write!(f, "{} ({})", self.address, kind)
    }
}
