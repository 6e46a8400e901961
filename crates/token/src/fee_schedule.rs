//! Fee schedule
//!
//! Four fee categories, each a permille rate bounded by its own cap.
//! Permille gives 0.1% resolution, enough for the 0.3% tax and liquidity
//! fees of the default configuration.

use crate::errors::{TokenError, TokenResult};
use kindly_types::TokenAmount;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed-point denominator of every rate (per thousand).
pub const FEE_DENOMINATOR: u128 = 1_000;

pub const DEFAULT_TAX_PERMILLE: u16 = 3; // 0.3%
pub const DEFAULT_CHARITY_PERMILLE: u16 = 25; // 2.5%
pub const DEFAULT_MAINTENANCE_PERMILLE: u16 = 9; // 0.9%
pub const DEFAULT_LIQUIDITY_WALLET_PERMILLE: u16 = 3; // 0.3%

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeCategory {
    /// Redistributed to every reward-included holder through the rate.
    Tax,
    Charity,
    Maintenance,
    LiquidityWallet,
}

impl FeeCategory {
    /// Computation order of a transfer. Changing it changes truncation.
    pub const ALL: [FeeCategory; 4] = [
        FeeCategory::Tax,
        FeeCategory::Charity,
        FeeCategory::Maintenance,
        FeeCategory::LiquidityWallet,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FeeCategory::Tax => "tax",
            FeeCategory::Charity => "charity",
            FeeCategory::Maintenance => "maintenance",
            FeeCategory::LiquidityWallet => "liquidity_wallet",
        }
    }
}

impl fmt::Display for FeeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeeCategory {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "tax" | "reflection" => Ok(FeeCategory::Tax),
            "charity" => Ok(FeeCategory::Charity),
            "maintenance" | "dev" => Ok(FeeCategory::Maintenance),
            "liquidity_wallet" | "liquidity" => Ok(FeeCategory::LiquidityWallet),
            other => Err(TokenError::InvalidConfig(format!(
                "unknown fee category '{other}'"
            ))),
        }
    }
}

/// A single category's rate and the ceiling it may never exceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRate {
    pub permille: u16,
    pub cap: u16,
}

impl FeeRate {
    pub const fn at_cap(cap: u16) -> Self {
        Self {
            permille: cap,
            cap,
        }
    }
}

/// Current rates for all four categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    tax: FeeRate,
    charity: FeeRate,
    maintenance: FeeRate,
    liquidity_wallet: FeeRate,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            tax: FeeRate::at_cap(DEFAULT_TAX_PERMILLE),
            charity: FeeRate::at_cap(DEFAULT_CHARITY_PERMILLE),
            maintenance: FeeRate::at_cap(DEFAULT_MAINTENANCE_PERMILLE),
            liquidity_wallet: FeeRate::at_cap(DEFAULT_LIQUIDITY_WALLET_PERMILLE),
        }
    }
}

impl FeeSchedule {
    pub fn new(
        tax: FeeRate,
        charity: FeeRate,
        maintenance: FeeRate,
        liquidity_wallet: FeeRate,
    ) -> TokenResult<Self> {
        let schedule = Self {
            tax,
            charity,
            maintenance,
            liquidity_wallet,
        };
        schedule.validate()?;
        Ok(schedule)
    }

    /// Check `rate <= cap` per category and that the caps together never
    /// exceed the whole transfer.
    pub fn validate(&self) -> TokenResult<()> {
        for category in FeeCategory::ALL {
            let rate = self.entry(category);
            if rate.permille > rate.cap {
                return Err(TokenError::OutOfRange {
                    what: category.as_str(),
                    value: rate.permille as u128,
                    cap: rate.cap as u128,
                });
            }
        }
        let total_caps: u128 = FeeCategory::ALL
            .iter()
            .map(|c| self.entry(*c).cap as u128)
            .sum();
        if total_caps > FEE_DENOMINATOR {
            return Err(TokenError::InvalidConfig(format!(
                "fee caps sum to {total_caps}‰, above {FEE_DENOMINATOR}‰"
            )));
        }
        Ok(())
    }

    fn entry(&self, category: FeeCategory) -> &FeeRate {
        match category {
            FeeCategory::Tax => &self.tax,
            FeeCategory::Charity => &self.charity,
            FeeCategory::Maintenance => &self.maintenance,
            FeeCategory::LiquidityWallet => &self.liquidity_wallet,
        }
    }

    fn entry_mut(&mut self, category: FeeCategory) -> &mut FeeRate {
        match category {
            FeeCategory::Tax => &mut self.tax,
            FeeCategory::Charity => &mut self.charity,
            FeeCategory::Maintenance => &mut self.maintenance,
            FeeCategory::LiquidityWallet => &mut self.liquidity_wallet,
        }
    }

    pub fn get_rate(&self, category: FeeCategory) -> u16 {
        self.entry(category).permille
    }

    pub fn cap(&self, category: FeeCategory) -> u16 {
        self.entry(category).cap
    }

    /// Update a rate. Takes effect from the next transfer.
    pub fn set_rate(&mut self, category: FeeCategory, permille: u16) -> TokenResult<()> {
        let entry = self.entry_mut(category);
        if permille > entry.cap {
            return Err(TokenError::OutOfRange {
                what: category.as_str(),
                value: permille as u128,
                cap: entry.cap as u128,
            });
        }
        entry.permille = permille;
        Ok(())
    }

    pub fn total_permille(&self) -> u32 {
        FeeCategory::ALL
            .iter()
            .map(|c| self.get_rate(*c) as u32)
            .sum()
    }

    /// Split `amount` into its per-category fees and the recipient's net receipt.
    ///
    /// Each fee is `amount * rate / 1000`, truncated, computed in
    /// [`FeeCategory::ALL`] order.
    pub fn breakdown(&self, amount: TokenAmount) -> TokenResult<FeeBreakdown> {
        let fee = |category: FeeCategory| -> TokenResult<TokenAmount> {
            amount
                .checked_mul(self.get_rate(category) as u128)
                .map(|scaled| scaled / FEE_DENOMINATOR)
                .ok_or(TokenError::Overflow("fee amount"))
        };

        let tax = fee(FeeCategory::Tax)?;
        let charity = fee(FeeCategory::Charity)?;
        let maintenance = fee(FeeCategory::Maintenance)?;
        let liquidity_wallet = fee(FeeCategory::LiquidityWallet)?;

        // Caps sum to at most 1000‰, so the fees never exceed the amount.
        let transferred = amount - tax - charity - maintenance - liquidity_wallet;

        Ok(FeeBreakdown {
            amount,
            tax,
            charity,
            maintenance,
            liquidity_wallet,
            transferred,
        })
    }
}

/// Real-unit split of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeeBreakdown {
    pub amount: TokenAmount,
    pub tax: TokenAmount,
    pub charity: TokenAmount,
    pub maintenance: TokenAmount,
    pub liquidity_wallet: TokenAmount,
    pub transferred: TokenAmount,
}

impl FeeBreakdown {
    /// Breakdown of a fee-exempt transfer: everything reaches the recipient.
    pub fn exempt(amount: TokenAmount) -> Self {
        Self {
            amount,
            transferred: amount,
            ..Self::default()
        }
    }

    pub fn fee_of(&self, category: FeeCategory) -> TokenAmount {
        match category {
            FeeCategory::Tax => self.tax,
            FeeCategory::Charity => self.charity,
            FeeCategory::Maintenance => self.maintenance,
            FeeCategory::LiquidityWallet => self.liquidity_wallet,
        }
    }

    pub fn total_fees(&self) -> TokenAmount {
        self.tax + self.charity + self.maintenance + self.liquidity_wallet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindly_types::tokens;

    #[test]
    fn default_schedule_totals_four_percent() {
        let schedule = FeeSchedule::default();
        assert_eq!(schedule.get_rate(FeeCategory::Tax), 3);
        assert_eq!(schedule.get_rate(FeeCategory::Charity), 25);
        assert_eq!(schedule.get_rate(FeeCategory::Maintenance), 9);
        assert_eq!(schedule.get_rate(FeeCategory::LiquidityWallet), 3);
        assert_eq!(schedule.total_permille(), 40);
    }

    #[test]
    fn breakdown_of_hundred_tokens() {
        let split = FeeSchedule::default().breakdown(tokens(100)).unwrap();
        assert_eq!(split.tax, 3 * 10u128.pow(17));
        assert_eq!(split.charity, 25 * 10u128.pow(17));
        assert_eq!(split.maintenance, 9 * 10u128.pow(17));
        assert_eq!(split.liquidity_wallet, 3 * 10u128.pow(17));
        assert_eq!(split.transferred, tokens(96));
        assert_eq!(split.total_fees() + split.transferred, split.amount);
    }

    #[test]
    fn each_fee_truncates_independently() {
        // 999 * 3 / 1000 = 2, 999 * 25 / 1000 = 24, 999 * 9 / 1000 = 8
        let split = FeeSchedule::default().breakdown(999).unwrap();
        assert_eq!(
            (split.tax, split.charity, split.maintenance, split.liquidity_wallet),
            (2, 24, 8, 2)
        );
        assert_eq!(split.transferred, 999 - 36);
    }

    #[test]
    fn small_amounts_pay_no_fee() {
        let split = FeeSchedule::default().breakdown(33).unwrap();
        assert_eq!(split.charity, 0);
        assert_eq!(split.transferred, 33);
    }

    #[test]
    fn set_rate_respects_cap() {
        let mut schedule = FeeSchedule::default();
        let err = schedule.set_rate(FeeCategory::Charity, 26).unwrap_err();
        assert!(matches!(err, TokenError::OutOfRange { cap: 25, value: 26, .. }));
        assert_eq!(schedule.get_rate(FeeCategory::Charity), 25);

        schedule.set_rate(FeeCategory::Charity, 0).unwrap();
        assert_eq!(schedule.get_rate(FeeCategory::Charity), 0);
        schedule.set_rate(FeeCategory::Charity, 25).unwrap();
        assert_eq!(schedule.get_rate(FeeCategory::Charity), 25);
    }

    #[test]
    fn invalid_schedules_rejected() {
        let over = FeeRate {
            permille: 10,
            cap: 5,
        };
        assert!(FeeSchedule::new(over, FeeRate::at_cap(1), FeeRate::at_cap(1), FeeRate::at_cap(1)).is_err());

        let huge = FeeRate::at_cap(600);
        assert!(matches!(
            FeeSchedule::new(huge, huge, FeeRate::at_cap(0), FeeRate::at_cap(0)),
            Err(TokenError::InvalidConfig(_))
        ));
    }

    #[test]
    fn exempt_breakdown_passes_everything_through() {
        let split = FeeBreakdown::exempt(tokens(7));
        assert_eq!(split.total_fees(), 0);
        assert_eq!(split.transferred, tokens(7));
    }

    #[test]
    fn category_names_parse() {
        assert_eq!("dev".parse::<FeeCategory>().unwrap(), FeeCategory::Maintenance);
        assert_eq!(
            "liquidity-wallet".parse::<FeeCategory>().unwrap(),
            FeeCategory::LiquidityWallet
        );
        assert!("burn".parse::<FeeCategory>().is_err());
    }
}
