//! Dual balance ledger
//!
//! Every account holds either a reflected balance (reward-included) or a real
//! balance with a reflected mirror kept in lockstep (reward-excluded). The
//! reflection rate is `reflected supply / real supply` after removing every
//! excluded account from both totals, so redistributing a fee only needs to
//! shrink `total_reflected`.
//!
//! Invariant: the reflected balances of all accounts sum to `total_reflected`.

use crate::errors::{TokenError, TokenResult};
use crate::exclusion::AccountSet;
use kindly_types::{serde_amount, Address, TokenAmount};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Largest `total_real * 10^k` representable in a [`TokenAmount`].
///
/// Used as the genesis reflected supply: the bigger the scale, the finer the
/// rate, and `amount * rate` still fits for any amount up to `total_real`.
pub fn max_reflected_supply(total_real: TokenAmount) -> TokenResult<TokenAmount> {
    if total_real == 0 {
        return Err(TokenError::InvalidConfig(
            "total supply must be greater than zero".into(),
        ));
    }
    let mut reflected = total_real;
    while let Some(next) = reflected.checked_mul(10) {
        reflected = next;
    }
    Ok(reflected)
}

/// Balance representation of a single account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AccountBalance {
    /// Earns reflection: displayed balance is `reflected / rate`.
    Included {
        #[serde(with = "serde_amount")]
        reflected: TokenAmount,
    },
    /// Holds steady in real units; `reflected` mirrors every mutation at the
    /// rate in force when it happened.
    Excluded {
        #[serde(with = "serde_amount")]
        real: TokenAmount,
        #[serde(with = "serde_amount")]
        reflected: TokenAmount,
    },
}

impl Default for AccountBalance {
    fn default() -> Self {
        AccountBalance::Included { reflected: 0 }
    }
}

impl AccountBalance {
    pub fn reflected(&self) -> TokenAmount {
        match *self {
            AccountBalance::Included { reflected } => reflected,
            AccountBalance::Excluded { reflected, .. } => reflected,
        }
    }

    pub fn is_excluded(&self) -> bool {
        matches!(self, AccountBalance::Excluded { .. })
    }

    /// Displayed balance at `rate`.
    pub fn balance_at(&self, rate: TokenAmount) -> TokenAmount {
        match *self {
            AccountBalance::Included { reflected } => token_from_reflection(reflected, rate),
            AccountBalance::Excluded { real, .. } => real,
        }
    }

    /// Stop earning reflection: freeze the current value in real units.
    pub fn into_excluded(self, rate: TokenAmount) -> Self {
        match self {
            AccountBalance::Included { reflected } => AccountBalance::Excluded {
                real: token_from_reflection(reflected, rate),
                reflected,
            },
            excluded => excluded,
        }
    }

    /// Resume earning reflection from the real value at `rate`.
    ///
    /// The new reflected value never exceeds the old mirror, so re-inclusion
    /// can only shrink the reflected supply.
    pub fn into_included(self, rate: TokenAmount) -> Self {
        match self {
            AccountBalance::Excluded { real, reflected } => AccountBalance::Included {
                reflected: real.saturating_mul(rate).min(reflected),
            },
            included => included,
        }
    }

    fn credit(&mut self, amount: TokenAmount, r_amount: TokenAmount) {
        match self {
            AccountBalance::Included { reflected } => {
                *reflected = reflected.saturating_add(r_amount);
            }
            AccountBalance::Excluded { real, reflected } => {
                *real = real.saturating_add(amount);
                *reflected = reflected.saturating_add(r_amount);
            }
        }
    }

    fn debit(&mut self, amount: TokenAmount, r_amount: TokenAmount) {
        match self {
            AccountBalance::Included { reflected } => {
                *reflected = reflected.saturating_sub(r_amount);
            }
            AccountBalance::Excluded { real, reflected } => {
                *real = real.saturating_sub(amount);
                *reflected = reflected.saturating_sub(r_amount);
            }
        }
    }
}

/// Real units → reflected units at `rate`.
pub fn reflection_from_token(amount: TokenAmount, rate: TokenAmount) -> TokenResult<TokenAmount> {
    amount
        .checked_mul(rate)
        .ok_or(TokenError::Overflow("reflected amount"))
}

/// Reflected units → real units at `rate` (truncating).
pub fn token_from_reflection(r_amount: TokenAmount, rate: TokenAmount) -> TokenAmount {
    if rate == 0 {
        return 0;
    }
    r_amount / rate
}

/// Per-account row of the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub balance: AccountBalance,
    /// Lifetime real units this account paid in fees as a sender.
    #[serde(with = "serde_amount", default)]
    pub fee_history: TokenAmount,
}

/// Global totals plus the account table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectionLedger {
    #[serde(with = "serde_amount")]
    total_real: TokenAmount,
    #[serde(with = "serde_amount")]
    total_reflected: TokenAmount,
    /// Real units redistributed through the tax category so far.
    #[serde(with = "serde_amount", default)]
    total_fees: TokenAmount,
    /// Lowest rate settled after a mutation; the rate never rises above it.
    #[serde(with = "serde_amount", default = "unsettled_rate")]
    rate_ceiling: TokenAmount,
    accounts: BTreeMap<Address, AccountRecord>,
}

fn unsettled_rate() -> TokenAmount {
    TokenAmount::MAX
}

impl ReflectionLedger {
    /// Mint the whole fixed supply to `holder`.
    pub fn genesis(total_real: TokenAmount, holder: Address) -> TokenResult<Self> {
        let total_reflected = max_reflected_supply(total_real)?;
        let mut accounts = BTreeMap::new();
        accounts.insert(
            holder,
            AccountRecord {
                balance: AccountBalance::Included {
                    reflected: total_reflected,
                },
                fee_history: 0,
            },
        );
        debug!(
            target: "token",
            "Genesis: {} real units, {} reflected units (rate {})",
            total_real,
            total_reflected,
            total_reflected / total_real
        );
        Ok(Self {
            total_real,
            total_reflected,
            total_fees: 0,
            rate_ceiling: total_reflected / total_real,
            accounts,
        })
    }

    pub fn total_real(&self) -> TokenAmount {
        self.total_real
    }

    pub fn total_reflected(&self) -> TokenAmount {
        self.total_reflected
    }

    pub fn total_fees(&self) -> TokenAmount {
        self.total_fees
    }

    pub fn record(&self, account: &Address) -> Option<&AccountRecord> {
        self.accounts.get(account)
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &AccountRecord)> {
        self.accounts.iter()
    }

    pub fn balance_state(&self, account: &Address) -> AccountBalance {
        self.accounts
            .get(account)
            .map(|r| r.balance)
            .unwrap_or_default()
    }

    pub fn fee_history(&self, account: &Address) -> TokenAmount {
        self.accounts
            .get(account)
            .map(|r| r.fee_history)
            .unwrap_or(0)
    }

    /// Supply still participating in reward: totals minus every excluded account.
    ///
    /// Falls back to the raw totals when an excluded balance is inconsistent
    /// with what is left, or when the remaining reflected supply drops below
    /// one unit of the raw rate.
    pub fn current_supply(&self, excluded: &AccountSet) -> (TokenAmount, TokenAmount) {
        let fallback = (self.total_reflected, self.total_real);
        let mut r_supply = self.total_reflected;
        let mut t_supply = self.total_real;

        for account in excluded.iter() {
            let (real, reflected) = match self.balance_state(account) {
                AccountBalance::Excluded { real, reflected } => (real, reflected),
                AccountBalance::Included { .. } => continue,
            };
            if reflected > r_supply || real > t_supply {
                return fallback;
            }
            r_supply -= reflected;
            t_supply -= real;
        }

        if t_supply == 0 || r_supply < self.total_reflected / self.total_real {
            return fallback;
        }
        (r_supply, t_supply)
    }

    /// Reflected units per real unit for reward-included holders.
    ///
    /// Returns `min(r_supply / t_supply, ceiling)`, where the ceiling is the
    /// rate pinned by the last settled mutation. The reported figure can
    /// therefore sit below the raw quotient, e.g. when truncation rounds the
    /// quotient up by one after value leaves the included supply fee-free.
    /// Balances and fee splits all use this capped value.
    pub fn current_rate(&self, excluded: &AccountSet) -> TokenAmount {
        let (r_supply, t_supply) = self.current_supply(excluded);
        (r_supply / t_supply).min(self.rate_ceiling)
    }

    /// Pin the ceiling to the rate after a mutation.
    pub(crate) fn settle_rate(&mut self, excluded: &AccountSet) {
        self.rate_ceiling = self.current_rate(excluded);
    }

    pub fn balance_at(&self, account: &Address, rate: TokenAmount) -> TokenAmount {
        self.balance_state(account).balance_at(rate)
    }

    pub fn balance_of(&self, account: &Address, excluded: &AccountSet) -> TokenAmount {
        self.balance_at(account, self.current_rate(excluded))
    }

    /// Credit `amount` real / `r_amount` reflected units, creating the row lazily.
    pub(crate) fn credit(&mut self, account: &Address, amount: TokenAmount, r_amount: TokenAmount) {
        self.accounts
            .entry(*account)
            .or_default()
            .balance
            .credit(amount, r_amount);
    }

    /// Debit a balance the caller has already checked covers the amount.
    pub(crate) fn debit(&mut self, account: &Address, amount: TokenAmount, r_amount: TokenAmount) {
        self.accounts
            .entry(*account)
            .or_default()
            .balance
            .debit(amount, r_amount);
    }

    /// Permanently remove `r_fee` from the reflected supply. This is the
    /// redistribution step: every included balance grows relative to the rate.
    pub(crate) fn reflect_fee(&mut self, r_fee: TokenAmount, t_fee: TokenAmount) {
        self.total_reflected = self.total_reflected.saturating_sub(r_fee);
        self.total_fees = self.total_fees.saturating_add(t_fee);
    }

    pub(crate) fn add_fee_history(&mut self, account: &Address, fees: TokenAmount) {
        if fees == 0 {
            return;
        }
        let record = self.accounts.entry(*account).or_default();
        record.fee_history = record.fee_history.saturating_add(fees);
    }

    /// Switch `account` to the excluded representation at `rate`.
    /// Returns the frozen real balance.
    pub(crate) fn exclude(&mut self, account: &Address, rate: TokenAmount) -> TokenAmount {
        let record = self.accounts.entry(*account).or_default();
        record.balance = record.balance.into_excluded(rate);
        record.balance.balance_at(rate)
    }

    /// Switch `account` back to the included representation at `rate`, shrinking
    /// the reflected supply by whatever the stale mirror held above the new value.
    pub(crate) fn include(&mut self, account: &Address, rate: TokenAmount) -> TokenAmount {
        let record = self.accounts.entry(*account).or_default();
        let stale = record.balance.reflected();
        record.balance = record.balance.into_included(rate);
        let released = stale - record.balance.reflected();
        self.total_reflected = self.total_reflected.saturating_sub(released);
        released
    }

    /// Move an account's whole displayed balance to another account without
    /// fees, valued at `rate` like any fee-free transfer. Returns the real
    /// amount moved.
    pub(crate) fn move_all(
        &mut self,
        from: &Address,
        to: &Address,
        rate: TokenAmount,
    ) -> TokenResult<TokenAmount> {
        let amount = self.balance_at(from, rate);
        let r_amount = reflection_from_token(amount, rate)?;
        self.debit(from, amount, r_amount);
        self.credit(to, amount, r_amount);
        Ok(amount)
    }

    /// Structural checks used when restoring persisted state.
    pub fn validate(&self, excluded: &AccountSet) -> TokenResult<()> {
        if self.rate_ceiling == 0 {
            return Err(TokenError::Snapshot("settled rate is zero".into()));
        }
        let ceiling = max_reflected_supply(self.total_real)?;
        if self.total_reflected > ceiling {
            return Err(TokenError::Snapshot(format!(
                "reflected supply {} exceeds genesis ceiling {}",
                self.total_reflected, ceiling
            )));
        }

        let mut reflected_sum: TokenAmount = 0;
        for (account, record) in &self.accounts {
            reflected_sum = reflected_sum
                .checked_add(record.balance.reflected())
                .ok_or(TokenError::Overflow("reflected balances"))?;
            if record.balance.is_excluded() != excluded.contains(account) {
                return Err(TokenError::Snapshot(format!(
                    "account {account} balance mode disagrees with the reward exclusion set"
                )));
            }
        }
        for account in excluded.iter() {
            if !self.accounts.contains_key(account) {
                return Err(TokenError::Snapshot(format!(
                    "excluded account {account} has no ledger row"
                )));
            }
        }
        if reflected_sum != self.total_reflected {
            return Err(TokenError::Snapshot(format!(
                "reflected balances sum to {reflected_sum}, expected {}",
                self.total_reflected
            )));
        }
        Ok(())
    }
}
