//! Generic Access Profile: addresses, advertising payload and parameters, and
//! the allow-list advertiser.

pub mod advertising;
pub mod allow_list;
pub mod constants;
pub mod types;

pub use advertising::{
    lock_advertising_data, ms_to_adv_interval, parse_advertising_data, AdvOptions, AdvParams,
    AdvertisingData, AdvertisingMode,
};
pub use allow_list::{
    AdvertiserHandle, AdvertiserSettings, AdvertiserState, AllowListAdvertiser, Controller,
};
pub use types::*;
