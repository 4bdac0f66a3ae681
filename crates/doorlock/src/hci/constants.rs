//! HCI protocol constants
//!
//! Only what the advertiser sends to the controller and the event that
//! answers it.

// HCI packet types
pub const HCI_COMMAND_PKT: u8 = 0x01;
pub const HCI_EVENT_PKT: u8 = 0x04;

// Maximum size of HCI command parameters
pub const HCI_MAX_PARAM_LEN: usize = 255;

// OGF (Opcode Group Field) of the LE controller commands
pub const OGF_LE: u8 = 0x08;

// LE Command OCF values (OGF: 0x08)
pub const OCF_LE_SET_ADVERTISING_PARAMETERS: u16 = 0x0006;
pub const OCF_LE_SET_ADVERTISING_DATA: u16 = 0x0008;
pub const OCF_LE_SET_SCAN_RESPONSE_DATA: u16 = 0x0009;
pub const OCF_LE_SET_ADVERTISING_ENABLE: u16 = 0x000A;
pub const OCF_LE_CLEAR_FILTER_ACCEPT_LIST: u16 = 0x0010;
pub const OCF_LE_ADD_DEVICE_TO_FILTER_ACCEPT_LIST: u16 = 0x0011;

// HCI Events
pub const EVT_CMD_COMPLETE: u8 = 0x0E;
pub const EVT_CMD_STATUS: u8 = 0x0F;

// Advertising_Type
pub const ADV_IND: u8 = 0x00;

// Own_Address_Type
pub const OWN_ADDRESS_PUBLIC: u8 = 0x00;

// Address_Type of a filter accept list entry
pub const ADDR_TYPE_PUBLIC: u8 = 0x00;
pub const ADDR_TYPE_RANDOM: u8 = 0x01;

// Advertising_Filter_Policy
pub const ADV_FILTER_NONE: u8 = 0x00;
/// Scan requests from anyone, connections only from the filter accept list
pub const ADV_FILTER_CONN: u8 = 0x02;

/// All three primary advertising channels
pub const ADV_CHANNEL_MAP_ALL: u8 = 0x07;

/// Advertising and scan response data are always sent as 31 bytes
pub const HCI_ADV_DATA_LEN: usize = 31;

pub const HCI_STATUS_SUCCESS: u8 = 0x00;
