//! Pairing acceptance policy
//!
//! Called from the stack's feature-exchange callback, so it must not block.

use super::types::*;
use tracing::{debug, warn};

/// Rejects pairing that would fall back to an unauthenticated "just works"
/// association
#[derive(Debug, Clone, Copy, Default)]
pub struct PairingPolicy;

impl PairingPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Decide whether a peer with the given features may pair
    pub fn evaluate(&self, features: &PairingFeatures) -> Result<(), SecurityError> {
        match features.io_capability {
            IoCapability::NoInputNoOutput => {
                warn!(io_capability = %features.io_capability, "just works pairing, not allowed");
                Err(SecurityError::PairNotAllowed)
            }
            cap => {
                debug!(io_capability = %cap, "pairing features accepted");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_no_input_no_output() {
        let policy = PairingPolicy::new();
        let features = PairingFeatures::with_io_capability(IoCapability::NoInputNoOutput);
        assert_eq!(policy.evaluate(&features), Err(SecurityError::PairNotAllowed));
    }

    #[test]
    fn test_accepts_every_other_capability() {
        let policy = PairingPolicy::new();
        for cap in [
            IoCapability::DisplayOnly,
            IoCapability::DisplayYesNo,
            IoCapability::KeyboardOnly,
            IoCapability::KeyboardDisplay,
        ] {
            let features = PairingFeatures::with_io_capability(cap);
            assert_eq!(policy.evaluate(&features), Ok(()), "{} rejected", cap);
        }
    }
}
