//! Keypad input: matrix decoding, the digit queue and the PIN collector task

pub mod mapping;
mod passkey;
mod collector;

pub use collector::{
    KeypadContext, KeypadHandle, PasskeyRequest, PasskeySource, PinCollector, SubmitGate,
    MIN_DIGIT_QUEUE_CAPACITY,
};
pub use mapping::{key_id_for, KeyEvent, KeyPosition};
pub use passkey::{digit_value, Passkey, PasskeyBuffer};
