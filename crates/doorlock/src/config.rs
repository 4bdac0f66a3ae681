//! Lock configuration
//!
//! Every field has a default, so an empty JSON object is a valid config.

use crate::connection::Phy;
use crate::error::{LockError, Result};
use crate::gap::constants::{
    ADV_INTERVAL_LIMIT_MAX, ADV_INTERVAL_LIMIT_MIN, ADV_INTERVAL_MAX, ADV_INTERVAL_MIN,
};
use crate::gap::{lock_advertising_data, LocalIdentity};
use crate::keypad::{digit_value, MIN_DIGIT_QUEUE_CAPACITY};
use crate::smp::constants::SMP_TIMEOUT_PASSKEY;
use crate::smp::VerificationMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvertisingConfig {
    /// 0.625 ms units
    #[serde(default = "default_interval_min")]
    pub interval_min: u16,
    /// 0.625 ms units
    #[serde(default = "default_interval_max")]
    pub interval_max: u16,
    /// Advertise unfiltered when the allow-list cannot be rebuilt
    #[serde(default = "default_false")]
    pub fallback_to_open: bool,
}

impl Default for AdvertisingConfig {
    fn default() -> Self {
        Self {
            interval_min: default_interval_min(),
            interval_max: default_interval_max(),
            fallback_to_open: default_false(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default = "default_true")]
    pub renegotiate: bool,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_phy")]
    pub preferred_phy: Phy,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            renegotiate: default_true(),
            settle_delay_ms: default_settle_delay_ms(),
            preferred_phy: default_phy(),
        }
    }
}

impl LinkConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_device_name")]
    pub device_name: String,
    #[serde(default)]
    pub local_identity: LocalIdentity,
    #[serde(default)]
    pub verification: VerificationMode,
    /// `null` waits forever
    #[serde(default = "default_passkey_timeout_ms")]
    pub passkey_timeout_ms: Option<u64>,
    #[serde(default = "default_digit_queue_capacity")]
    pub digit_queue_capacity: usize,
    #[serde(default = "default_submit_key")]
    pub submit_key: char,
    #[serde(default = "default_log_level")]
    pub log_level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default)]
    pub advertising: AdvertisingConfig,
    #[serde(default)]
    pub link: LinkConfig,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            local_identity: 0,
            verification: VerificationMode::default(),
            passkey_timeout_ms: default_passkey_timeout_ms(),
            digit_queue_capacity: default_digit_queue_capacity(),
            submit_key: default_submit_key(),
            log_level: default_log_level(),
            advertising: AdvertisingConfig::default(),
            link: LinkConfig::default(),
        }
    }
}

fn default_device_name() -> String {
    "Smart Lock".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_interval_min() -> u16 {
    ADV_INTERVAL_MIN
}
fn default_interval_max() -> u16 {
    ADV_INTERVAL_MAX
}
fn default_passkey_timeout_ms() -> Option<u64> {
    Some(SMP_TIMEOUT_PASSKEY)
}
fn default_digit_queue_capacity() -> usize {
    MIN_DIGIT_QUEUE_CAPACITY
}
fn default_submit_key() -> char {
    '#'
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_settle_delay_ms() -> u64 {
    1000
}
fn default_phy() -> Phy {
    Phy::Le2m
}

impl LockConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| LockError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| LockError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&content)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| LockError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        let adv = &self.advertising;
        let range = ADV_INTERVAL_LIMIT_MIN..=ADV_INTERVAL_LIMIT_MAX;
        if !range.contains(&adv.interval_min) || !range.contains(&adv.interval_max) {
            return Err(LockError::InvalidConfig(format!(
                "advertising interval must be within 0x{:04X}..=0x{:04X}",
                ADV_INTERVAL_LIMIT_MIN, ADV_INTERVAL_LIMIT_MAX
            )));
        }
        if adv.interval_min > adv.interval_max {
            return Err(LockError::InvalidConfig(
                "advertising interval_min exceeds interval_max".to_string(),
            ));
        }

        if self.digit_queue_capacity < MIN_DIGIT_QUEUE_CAPACITY {
            return Err(LockError::InvalidConfig(format!(
                "digit queue capacity must be at least {}",
                MIN_DIGIT_QUEUE_CAPACITY
            )));
        }

        if digit_value(self.submit_key).is_some() {
            return Err(LockError::InvalidConfig(format!(
                "submit key '{}' is a digit",
                self.submit_key
            )));
        }

        if self.passkey_timeout_ms == Some(0) {
            return Err(LockError::InvalidConfig(
                "passkey timeout must be positive or null".to_string(),
            ));
        }

        let (ad, _) = lock_advertising_data(&self.device_name);
        ad.encode()?;

        Ok(())
    }

    pub fn passkey_timeout(&self) -> Option<Duration> {
        self.passkey_timeout_ms.map(Duration::from_millis)
    }
}
