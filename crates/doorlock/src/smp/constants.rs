//! Constants for the Security Manager Protocol

// IO Capability values
pub const SMP_IO_CAPABILITY_DISPLAY_ONLY: u8 = 0x00;
pub const SMP_IO_CAPABILITY_DISPLAY_YES_NO: u8 = 0x01;
pub const SMP_IO_CAPABILITY_KEYBOARD_ONLY: u8 = 0x02;
pub const SMP_IO_CAPABILITY_NO_INPUT_NO_OUTPUT: u8 = 0x03;
pub const SMP_IO_CAPABILITY_KEYBOARD_DISPLAY: u8 = 0x04;

// Pairing Failed reason codes
pub const SMP_REASON_PASSKEY_ENTRY_FAILED: u8 = 0x01;
pub const SMP_REASON_OOB_NOT_AVAILABLE: u8 = 0x02;
pub const SMP_REASON_AUTHENTICATION_REQUIREMENTS: u8 = 0x03;
pub const SMP_REASON_CONFIRM_VALUE_FAILED: u8 = 0x04;
pub const SMP_REASON_PAIRING_NOT_SUPPORTED: u8 = 0x05;
pub const SMP_REASON_UNSPECIFIED_REASON: u8 = 0x08;
pub const SMP_REASON_INVALID_PARAMETERS: u8 = 0x0A;

// Passkey entry
pub const SMP_PASSKEY_DIGITS: usize = 6;
pub const SMP_PASSKEY_MAX: u32 = 999_999;

// SMP timeout values (in milliseconds)
pub const SMP_TIMEOUT_PASSKEY: u64 = 60000; // 60 seconds for passkey entry
