//! Passkey values and the digit buffer they are assembled in

use crate::smp::constants::{SMP_PASSKEY_DIGITS, SMP_PASSKEY_MAX};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A six digit pairing passkey, 0..=999999
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Passkey(u32);

impl Passkey {
    pub fn new(value: u32) -> Option<Self> {
        if value <= SMP_PASSKEY_MAX {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Weights each digit by 10^(5-i), first digit most significant.
    /// Returns `None` if any entry is not a decimal digit.
    pub fn from_digits(digits: &[u8; SMP_PASSKEY_DIGITS]) -> Option<Self> {
        digits
            .iter()
            .try_fold(0u32, |value, d| (*d <= 9).then(|| value * 10 + u32::from(*d)))
            .map(Self)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for Passkey {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Passkey::new(value).ok_or_else(|| format!("passkey {} exceeds six digits", value))
    }
}

impl From<Passkey> for u32 {
    fn from(passkey: Passkey) -> Self {
        passkey.0
    }
}

impl fmt::Display for Passkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

// Keep passkeys out of debug dumps of surrounding structs
impl fmt::Debug for Passkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passkey(******)")
    }
}

/// Converts a received key character into its decimal value
pub fn digit_value(ch: char) -> Option<u8> {
    if ch.is_ascii_digit() {
        Some(ch as u8 - b'0')
    } else {
        None
    }
}

/// Up to six digits, never exposed until complete
#[derive(Debug, Default)]
pub struct PasskeyBuffer {
    digits: [u8; SMP_PASSKEY_DIGITS],
    len: usize,
}

impl PasskeyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a digit. The sixth digit yields the passkey and empties the
    /// buffer; any digit after that starts the next attempt. Values above 9
    /// are ignored.
    pub fn push(&mut self, digit: u8) -> Option<Passkey> {
        if digit > 9 {
            return None;
        }
        self.digits[self.len] = digit;
        self.len += 1;

        if self.len == SMP_PASSKEY_DIGITS {
            let passkey = Passkey::from_digits(&self.digits);
            self.reset();
            passkey
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn reset(&mut self) {
        self.digits = [0; SMP_PASSKEY_DIGITS];
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(buffer: &mut PasskeyBuffer, keys: &str) -> Vec<Passkey> {
        keys.chars()
            .filter_map(digit_value)
            .filter_map(|d| buffer.push(d))
            .collect()
    }

    #[test]
    fn test_positional_weighting() {
        let mut buffer = PasskeyBuffer::new();
        assert_eq!(feed(&mut buffer, "123456"), vec![Passkey(123456)]);
        assert_eq!(feed(&mut buffer, "000000"), vec![Passkey(0)]);
        assert_eq!(feed(&mut buffer, "999999"), vec![Passkey(999999)]);
        assert_eq!(feed(&mut buffer, "010203"), vec![Passkey(10203)]);
        assert_eq!(feed(&mut buffer, "100000"), vec![Passkey(100000)]);
    }

    #[test]
    fn test_partial_buffer_yields_nothing() {
        let mut buffer = PasskeyBuffer::new();
        for n in 0..6 {
            let keys: String = "98765".chars().take(n).collect();
            let mut fresh = PasskeyBuffer::new();
            assert!(feed(&mut fresh, &keys).is_empty());
            assert_eq!(fresh.len(), n);
        }
        assert!(buffer.is_empty());
        assert!(feed(&mut buffer, "12345").is_empty());
    }

    #[test]
    fn test_seventh_digit_starts_next_attempt() {
        let mut buffer = PasskeyBuffer::new();
        assert_eq!(feed(&mut buffer, "1234567"), vec![Passkey(123456)]);
        assert_eq!(buffer.len(), 1);
        assert_eq!(feed(&mut buffer, "00000"), vec![Passkey(700000)]);
    }

    #[test]
    fn test_out_of_range_digits_are_rejected() {
        assert_eq!(Passkey::from_digits(&[9, 9, 9, 9, 9, 9]), Some(Passkey(999999)));
        assert_eq!(Passkey::from_digits(&[1, 2, 3, 4, 5, 10]), None);
        assert_eq!(Passkey::from_digits(&[255, 0, 0, 0, 0, 0]), None);

        let mut buffer = PasskeyBuffer::new();
        for digit in [1, 2, 3, 4, 5] {
            assert_eq!(buffer.push(digit), None);
        }
        assert_eq!(buffer.push(10), None);
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.push(6), Some(Passkey(123456)));
    }

    #[test]
    fn test_passkey_bounds_and_display() {
        assert!(Passkey::new(999_999).is_some());
        assert!(Passkey::new(1_000_000).is_none());
        assert_eq!(Passkey::new(42).unwrap().to_string(), "000042");
        assert_eq!(format!("{:?}", Passkey::new(42).unwrap()), "Passkey(******)");
        assert_eq!(digit_value('7'), Some(7));
        assert_eq!(digit_value('*'), None);
    }
}
