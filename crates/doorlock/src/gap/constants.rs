// Address types
pub const PUBLIC_DEVICE_ADDRESS: u8 = 0x00;
pub const RANDOM_DEVICE_ADDRESS: u8 = 0x01;
pub const PUBLIC_IDENTITY_ADDRESS: u8 = 0x02;
pub const RANDOM_IDENTITY_ADDRESS: u8 = 0x03;

// Advertising Data Types
pub const ADV_TYPE_FLAGS: u8 = 0x01;
pub const ADV_TYPE_128BIT_SERVICE_UUID_COMPLETE: u8 = 0x07;
pub const ADV_TYPE_COMPLETE_LOCAL_NAME: u8 = 0x09;

// Flags AD values
pub const ADV_FLAG_LE_GENERAL_DISCOVERABLE: u8 = 0x02;
pub const ADV_FLAG_BR_EDR_NOT_SUPPORTED: u8 = 0x04;

/// Legacy advertising / scan response payload limit
pub const ADV_DATA_MAX_LEN: usize = 31;

// Advertising interval, in 0.625 ms units
pub const ADV_INTERVAL_UNIT_US: u32 = 625;
pub const ADV_INTERVAL_LIMIT_MIN: u16 = 0x0020; // 20 ms
pub const ADV_INTERVAL_LIMIT_MAX: u16 = 0x4000; // 10.24 s
pub const ADV_INTERVAL_MIN: u16 = 0x00A0; // 100 ms
pub const ADV_INTERVAL_MAX: u16 = 0x00B0; // 110 ms

// Connection parameter units
pub const CONN_INTERVAL_UNIT_US: u32 = 1250;
pub const SUPERVISION_TIMEOUT_UNIT_MS: u32 = 10;

// LE Data Length Extension maxima
pub const LE_DATA_LEN_MAX: u16 = 251;
pub const LE_DATA_TIME_MAX: u16 = 17040;

/// ATT header bytes subtracted from the MTU to get the usable payload
pub const ATT_HEADER_LEN: u16 = 3;

/// Lock service UUID 1c376f00-468f-efde-8652-4183255a1de3, little-endian
pub const LOCK_SERVICE_UUID: [u8; 16] = [
    0xE3, 0x1D, 0x5A, 0x25, 0x83, 0x41, 0x52, 0x86, 0xDE, 0xEF, 0x8F, 0x46, 0x00, 0x6F, 0x37, 0x1C,
];
