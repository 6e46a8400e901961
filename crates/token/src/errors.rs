//! Error types for token operations

use kindly_types::{Address, AmountError, TokenAmount};
use thiserror::Error;

/// Every failure aborts the whole call before any ledger write.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("{0} is the zero address")]
    ZeroAddress(&'static str),

    #[error("transfer amount exceeds balance: have {have}, need {need}")]
    InsufficientBalance { have: TokenAmount, need: TokenAmount },

    #[error("transfer amount exceeds allowance: allowed {allowed}, requested {requested}")]
    AllowanceExceeded {
        allowed: TokenAmount,
        requested: TokenAmount,
    },

    #[error("decreased allowance below zero: allowed {allowed}, decrease {requested}")]
    AllowanceUnderflow {
        allowed: TokenAmount,
        requested: TokenAmount,
    },

    #[error("Transfer amount exceeds the maxTxAmount. (max {max}, requested {requested})")]
    MaxTransferExceeded {
        max: TokenAmount,
        requested: TokenAmount,
    },

    #[error("Ownable: caller is not the owner ({caller})")]
    Unauthorized { caller: Address },

    #[error("administrative calls are timelocked until {unlock_at}")]
    Timelocked { unlock_at: u64 },

    #[error("Cannot set percentage over {cap} for {what} (requested {value})")]
    OutOfRange {
        what: &'static str,
        value: u128,
        cap: u128,
    },

    #[error("account {0} is not excluded")]
    NotExcluded(Address),

    #[error("account {0} is already excluded")]
    AlreadyExcluded(Address),

    #[error("value out-of-bounds: {0}")]
    ValueOutOfBounds(String),

    #[error("arithmetic overflow while computing {0}")]
    Overflow(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid snapshot: {0}")]
    Snapshot(String),
}

impl From<AmountError> for TokenError {
    fn from(err: AmountError) -> Self {
        match err {
            AmountError::ValueOutOfBounds(value) => TokenError::ValueOutOfBounds(value),
            other => TokenError::ValueOutOfBounds(other.to_string()),
        }
    }
}

/// Result type for token operations
pub type TokenResult<T> = Result<T, TokenError>;
