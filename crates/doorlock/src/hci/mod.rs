//! Host Controller Interface encoding
//!
//! Commands for the filter accept list and legacy advertising, and an
//! [`HciController`] that implements the advertiser's
//! [`Controller`](crate::gap::Controller) over any [`HciTransport`].

pub mod constants;
mod controller;
mod packet;


pub use controller::{HciController, HciTransport};
pub use packet::{CommandResult, HciCommand, HciEvent};
