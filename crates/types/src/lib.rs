//! Kindly shared primitives
//!
//! Account addresses and fixed-point token units used by the ledger,
//! the configuration layer and the operator CLI.

pub mod address;
pub mod units;

pub use address::*;
pub use units::*;
