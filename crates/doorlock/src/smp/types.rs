//! Type definitions for the Security Manager Protocol
use super::constants::*;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Verdicts returned to the pairing protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SecurityError {
    #[error("Authentication failure")]
    AuthFail,

    #[error("Passkey entry failed")]
    PasskeyEntryFailed,

    #[error("OOB data not available")]
    OobNotAvailable,

    #[error("Authentication requirements not met")]
    AuthRequirement,

    #[error("Pairing not supported")]
    PairNotSupported,

    #[error("Pairing not allowed")]
    PairNotAllowed,

    #[error("Invalid parameters")]
    InvalidParameters,

    #[error("Unspecified reason")]
    Unspecified,
}

impl SecurityError {
    /// SMP Pairing Failed reason code sent to the peer
    pub fn reason_code(&self) -> u8 {
        match self {
            SecurityError::AuthFail => SMP_REASON_CONFIRM_VALUE_FAILED,
            SecurityError::PasskeyEntryFailed => SMP_REASON_PASSKEY_ENTRY_FAILED,
            SecurityError::OobNotAvailable => SMP_REASON_OOB_NOT_AVAILABLE,
            SecurityError::AuthRequirement => SMP_REASON_AUTHENTICATION_REQUIREMENTS,
            // Pairing that local policy forbids is reported as unsupported
            SecurityError::PairNotSupported | SecurityError::PairNotAllowed => {
                SMP_REASON_PAIRING_NOT_SUPPORTED
            }
            SecurityError::InvalidParameters => SMP_REASON_INVALID_PARAMETERS,
            SecurityError::Unspecified => SMP_REASON_UNSPECIFIED_REASON,
        }
    }
}

/// IO Capability types for pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoCapability {
    /// Display only capability
    DisplayOnly,
    /// Display with yes/no capability
    DisplayYesNo,
    /// Keyboard only
    KeyboardOnly,
    /// No input, no output
    NoInputNoOutput,
    /// Both keyboard and display
    KeyboardDisplay,
}

impl IoCapability {
    /// Convert to u8 value for protocol
    pub fn to_u8(&self) -> u8 {
        match self {
            IoCapability::DisplayOnly => SMP_IO_CAPABILITY_DISPLAY_ONLY,
            IoCapability::DisplayYesNo => SMP_IO_CAPABILITY_DISPLAY_YES_NO,
            IoCapability::KeyboardOnly => SMP_IO_CAPABILITY_KEYBOARD_ONLY,
            IoCapability::NoInputNoOutput => SMP_IO_CAPABILITY_NO_INPUT_NO_OUTPUT,
            IoCapability::KeyboardDisplay => SMP_IO_CAPABILITY_KEYBOARD_DISPLAY,
        }
    }
}

impl fmt::Display for IoCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoCapability::DisplayOnly => write!(f, "Display Only"),
            IoCapability::DisplayYesNo => write!(f, "Display Yes/No"),
            IoCapability::KeyboardOnly => write!(f, "Keyboard Only"),
            IoCapability::NoInputNoOutput => write!(f, "No Input No Output"),
            IoCapability::KeyboardDisplay => write!(f, "Keyboard Display"),
        }
    }
}

impl FromStr for IoCapability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "display-only" => Ok(IoCapability::DisplayOnly),
            "display-yes-no" => Ok(IoCapability::DisplayYesNo),
            "keyboard-only" => Ok(IoCapability::KeyboardOnly),
            "none" | "no-input-no-output" => Ok(IoCapability::NoInputNoOutput),
            "keyboard-display" => Ok(IoCapability::KeyboardDisplay),
            other => Err(format!("unknown io capability: {}", other)),
        }
    }
}

/// Authentication requirements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthRequirements {
    /// Whether bonding is required
    pub bonding: bool,
    /// Whether MITM protection is required
    pub mitm: bool,
    /// Whether Secure Connections is required
    pub secure_connections: bool,
    /// Whether keypress notifications are required
    pub keypress_notifications: bool,
}

/// Pairing features a peer declared during feature exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingFeatures {
    /// IO Capability
    pub io_capability: IoCapability,
    /// OOB data flag
    pub oob_data_present: bool,
    /// Authentication requirements
    pub auth_req: AuthRequirements,
    /// Maximum encryption key size (7-16)
    pub max_key_size: u8,
}

impl PairingFeatures {
    pub fn with_io_capability(io_capability: IoCapability) -> Self {
        Self {
            io_capability,
            oob_data_present: false,
            auth_req: AuthRequirements {
                bonding: true,
                ..AuthRequirements::default()
            },
            max_key_size: 16,
        }
    }
}

/// Security level for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SecurityLevel {
    /// No security (unencrypted)
    None = 1,
    /// Encryption without authentication (Just Works)
    EncryptionOnly = 2,
    /// Encryption with authentication (MITM protection)
    EncryptionWithAuthentication = 3,
    /// Secure Connections with encryption and authentication
    SecureConnections = 4,
}

impl SecurityLevel {
    /// Check if this security level includes authentication
    pub fn is_authenticated(&self) -> bool {
        *self >= SecurityLevel::EncryptionWithAuthentication
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_capability_codes() {
        assert_eq!(IoCapability::DisplayOnly.to_u8(), 0x00);
        assert_eq!(IoCapability::NoInputNoOutput.to_u8(), 0x03);
        assert_eq!(IoCapability::KeyboardDisplay.to_u8(), 0x04);
        assert_eq!("none".parse::<IoCapability>(), Ok(IoCapability::NoInputNoOutput));
        assert!("joystick".parse::<IoCapability>().is_err());
    }

    #[test]
    fn test_authenticated_levels() {
        assert!(!SecurityLevel::None.is_authenticated());
        assert!(!SecurityLevel::EncryptionOnly.is_authenticated());
        assert!(SecurityLevel::EncryptionWithAuthentication.is_authenticated());
        assert!(SecurityLevel::SecureConnections.is_authenticated());
    }

    #[test]
    fn test_not_allowed_maps_to_not_supported() {
        assert_eq!(
            SecurityError::PairNotAllowed.reason_code(),
            SMP_REASON_PAIRING_NOT_SUPPORTED
        );
        assert_eq!(
            SecurityError::PasskeyEntryFailed.reason_code(),
            SMP_REASON_PASSKEY_ENTRY_FAILED
        );
    }
}
