//! Token unit system
//!
//! Balances are fixed-point integers: one whole token is `10^decimals` base
//! units (18 decimals by default). All ledger math is integer-only.
//!
//! The string parsers here are the interface boundary: a value that does not
//! fit the unsigned amount type (for instance a negative number) is rejected
//! with [`AmountError::ValueOutOfBounds`] before it can reach the ledger.

use std::fmt;

/// Amount of tokens in base units.
pub type TokenAmount = u128;

/// Default number of decimal places.
pub const DEFAULT_DECIMALS: u32 = 18;

/// Largest decimal count whose scale factor still fits in a [`TokenAmount`].
pub const MAX_DECIMALS: u32 = 38;

/// Base units per whole token at the default precision.
pub const UNITS_PER_TOKEN: TokenAmount = 10u128.pow(DEFAULT_DECIMALS);

/// Errors raised while parsing user supplied amounts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("value out-of-bounds: {0}")]
    ValueOutOfBounds(String),
    #[error("invalid amount format: {0}")]
    InvalidFormat(String),
    #[error("too many decimal places (max {max})")]
    TooManyDecimals { max: u32 },
    #[error("amount overflows 128-bit base units")]
    Overflow,
}

/// Whole tokens expressed in base units at the default precision.
pub const fn tokens(whole: u128) -> TokenAmount {
    whole * UNITS_PER_TOKEN
}

/// Scale factor for `decimals`, or `None` when it would not fit.
pub fn units_per_token(decimals: u32) -> Option<TokenAmount> {
    10u128.checked_pow(decimals)
}

/// Parse a decimal token string (e.g. `"1.5"`) into base units.
pub fn parse_token_amount(s: &str, decimals: u32) -> Result<TokenAmount, AmountError> {
    let s = s.trim();
    if s.starts_with('-') {
        return Err(AmountError::ValueOutOfBounds(s.to_string()));
    }
    let scale = units_per_token(decimals).ok_or(AmountError::TooManyDecimals { max: MAX_DECIMALS })?;

    let (whole, fraction) = match s.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (s, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(AmountError::InvalidFormat(s.to_string()));
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return Err(AmountError::InvalidFormat(s.to_string()));
    }
    if fraction.len() > decimals as usize {
        return Err(AmountError::TooManyDecimals { max: decimals });
    }

    let whole_units = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<u128>()
            .map_err(|_| AmountError::Overflow)?
            .checked_mul(scale)
            .ok_or(AmountError::Overflow)?
    };

    let fraction_units = if fraction.is_empty() {
        0
    } else {
        let padded = format!("{fraction:0<width$}", width = decimals as usize);
        padded.parse::<u128>().map_err(|_| AmountError::Overflow)?
    };

    whole_units
        .checked_add(fraction_units)
        .ok_or(AmountError::Overflow)
}

/// Parse an unsigned rate value (permille) at the interface boundary.
pub fn parse_rate(s: &str) -> Result<u16, AmountError> {
    let s = s.trim();
    let value: i128 = s
        .parse()
        .map_err(|_| AmountError::InvalidFormat(s.to_string()))?;
    u16::try_from(value).map_err(|_| AmountError::ValueOutOfBounds(s.to_string()))
}

/// Human readable rendering of a base-unit amount, trailing zeros trimmed.
pub fn format_token_amount(amount: TokenAmount, decimals: u32) -> String {
    TokenDisplay { amount, decimals }.to_string()
}

struct TokenDisplay {
    amount: TokenAmount,
    decimals: u32,
}

impl fmt::Display for TokenDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(scale) = units_per_token(self.decimals) else {
            return write!(f, "{}", self.amount);
        };
        let whole = self.amount / scale;
        let fractional = self.amount % scale;
        if fractional == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{fractional:0width$}", width = self.decimals as usize);
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

/// Serde adapter storing 128-bit amounts as decimal strings.
///
/// JSON numbers lose precision above 2^53 in most consumers, and buffered
/// (tagged) serde content cannot carry `u128` at all.
pub mod serde_amount {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<u128>().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_and_fractional_amounts_parse() {
        assert_eq!(parse_token_amount("1", 18).unwrap(), tokens(1));
        assert_eq!(
            parse_token_amount("2.5", 18).unwrap(),
            25 * 10u128.pow(17)
        );
        assert_eq!(parse_token_amount("0.000000000000000001", 18).unwrap(), 1);
        assert_eq!(parse_token_amount(".5", 1).unwrap(), 5);
    }

    #[test]
    fn negative_amount_is_out_of_bounds() {
        assert!(matches!(
            parse_token_amount("-1", 18),
            Err(AmountError::ValueOutOfBounds(_))
        ));
    }

    #[test]
    fn malformed_amounts_rejected() {
        assert!(matches!(
            parse_token_amount("1.2.3", 18),
            Err(AmountError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_token_amount("abc", 18),
            Err(AmountError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_token_amount("0.1234", 3),
            Err(AmountError::TooManyDecimals { max: 3 })
        ));
        assert!(matches!(
            parse_token_amount("340282366920938463463374607431768211456", 0),
            Err(AmountError::Overflow)
        ));
    }

    #[test]
    fn rate_parsing_enforces_unsigned_bound() {
        assert_eq!(parse_rate("25").unwrap(), 25);
        assert!(matches!(parse_rate("-1"), Err(AmountError::ValueOutOfBounds(_))));
        assert!(matches!(parse_rate("70000"), Err(AmountError::ValueOutOfBounds(_))));
        assert!(matches!(parse_rate("2.5"), Err(AmountError::InvalidFormat(_))));
    }

    #[test]
    fn display_trims_trailing_zeros() {
        assert_eq!(format_token_amount(tokens(96), 18), "96");
        assert_eq!(format_token_amount(25 * 10u128.pow(17), 18), "2.5");
        assert_eq!(format_token_amount(1, 18), "0.000000000000000001");
    }
}
