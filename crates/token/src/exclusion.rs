//! Exclusion registry
//!
//! Two independent account sets: accounts that never pay transfer fees, and
//! accounts that do not earn reflection. Reward exclusion also switches the
//! account's ledger row between its two balance representations.

use crate::errors::{TokenError, TokenResult};
use crate::ledger::ReflectionLedger;
use kindly_types::{Address, TokenAmount};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Insertion-ordered set with O(1) membership checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Address>", into = "Vec<Address>")]
pub struct AccountSet {
    order: Vec<Address>,
    members: HashSet<Address>,
}

impl AccountSet {
    pub fn contains(&self, account: &Address) -> bool {
        self.members.contains(account)
    }

    /// Returns `false` if the account was already present.
    pub fn insert(&mut self, account: Address) -> bool {
        if !self.members.insert(account) {
            return false;
        }
        self.order.push(account);
        true
    }

    /// Returns `false` if the account was not present.
    pub fn remove(&mut self, account: &Address) -> bool {
        if !self.members.remove(account) {
            return false;
        }
        self.order.retain(|a| a != account);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl PartialEq for AccountSet {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order
    }
}

impl Eq for AccountSet {}

impl From<Vec<Address>> for AccountSet {
    fn from(accounts: Vec<Address>) -> Self {
        let mut set = AccountSet::default();
        for account in accounts {
            set.insert(account);
        }
        set
    }
}

impl From<AccountSet> for Vec<Address> {
    fn from(set: AccountSet) -> Self {
        set.order
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionRegistry {
    excluded_from_fee: AccountSet,
    excluded_from_reward: AccountSet,
}

impl ExclusionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_excluded_from_fee(&self, account: &Address) -> bool {
        self.excluded_from_fee.contains(account)
    }

    pub fn is_excluded_from_reward(&self, account: &Address) -> bool {
        self.excluded_from_reward.contains(account)
    }

    /// A transfer pays fees unless either party is fee-exempt.
    pub fn fee_applies(&self, sender: &Address, recipient: &Address) -> bool {
        !self.is_excluded_from_fee(sender) && !self.is_excluded_from_fee(recipient)
    }

    pub fn excluded_from_fee(&self) -> &AccountSet {
        &self.excluded_from_fee
    }

    pub fn excluded_from_reward(&self) -> &AccountSet {
        &self.excluded_from_reward
    }

    /// Returns `false` if the account was already fee-exempt.
    pub fn exclude_from_fee(&mut self, account: Address) -> bool {
        self.excluded_from_fee.insert(account)
    }

    /// Returns `false` if the account was not fee-exempt.
    pub fn include_in_fee(&mut self, account: &Address) -> bool {
        self.excluded_from_fee.remove(account)
    }

    /// Freeze `account`'s balance in real units at the current rate.
    ///
    /// Already-excluded accounts are left untouched (`Ok(false)`).
    pub fn exclude_from_reward(
        &mut self,
        ledger: &mut ReflectionLedger,
        account: Address,
    ) -> TokenResult<bool> {
        if self.is_excluded_from_reward(&account) {
            return Ok(false);
        }
        let rate = ledger.current_rate(&self.excluded_from_reward);
        let real = ledger.exclude(&account, rate);
        self.excluded_from_reward.insert(account);
        ledger.settle_rate(&self.excluded_from_reward);
        debug!(
            target: "token",
            "Excluded {} from reward at rate {} with {} real units",
            account,
            rate,
            real
        );
        Ok(true)
    }

    /// Resume reflection for `account` from its real balance at the current
    /// rate. Reflection missed while excluded is not credited.
    pub fn include_in_reward(
        &mut self,
        ledger: &mut ReflectionLedger,
        account: &Address,
    ) -> TokenResult<TokenAmount> {
        if !self.is_excluded_from_reward(account) {
            return Err(TokenError::NotExcluded(*account));
        }
        // Rate with the account still excluded: re-adding a balance valued at
        // this rate leaves the rate unchanged.
        let rate = ledger.current_rate(&self.excluded_from_reward);
        let released = ledger.include(account, rate);
        self.excluded_from_reward.remove(account);
        ledger.settle_rate(&self.excluded_from_reward);
        debug!(
            target: "token",
            "Included {} in reward at rate {} ({} stale reflected units released)",
            account,
            rate,
            released
        );
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindly_types::tokens;

    #[test]
    fn account_set_keeps_insertion_order() {
        let (a, b, c) = (
            Address::derive("a"),
            Address::derive("b"),
            Address::derive("c"),
        );
        let mut set = AccountSet::default();
        assert!(set.insert(a));
        assert!(set.insert(b));
        assert!(set.insert(c));
        assert!(!set.insert(b));
        assert!(set.remove(&b));
        assert!(!set.remove(&b));
        assert_eq!(set.iter().copied().collect::<Vec<_>>(), vec![a, c]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn account_set_serialises_as_list() {
        let mut set = AccountSet::default();
        set.insert(Address::derive("x"));
        set.insert(Address::derive("y"));
        let json = serde_json::to_string(&set).unwrap();
        let back: AccountSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
        assert!(back.contains(&Address::derive("y")));
    }

    #[test]
    fn fee_exemption_toggles_without_touching_balances() {
        let holder = Address::derive("holder");
        let ledger = ReflectionLedger::genesis(tokens(10), holder).unwrap();
        let mut registry = ExclusionRegistry::new();
        let other = Address::derive("other");

        assert!(registry.fee_applies(&holder, &other));
        assert!(registry.exclude_from_fee(other));
        assert!(!registry.exclude_from_fee(other));
        assert!(!registry.fee_applies(&holder, &other));
        assert!(!registry.fee_applies(&other, &holder));
        assert!(registry.include_in_fee(&other));
        assert!(!registry.include_in_fee(&other));
        assert!(registry.fee_applies(&holder, &other));

        assert_eq!(
            ledger.balance_of(&holder, registry.excluded_from_reward()),
            tokens(10)
        );
    }

    #[test]
    fn reward_exclusion_round_trip() {
        let holder = Address::derive("holder");
        let mut ledger = ReflectionLedger::genesis(tokens(10), holder).unwrap();
        let mut registry = ExclusionRegistry::new();

        assert!(registry.exclude_from_reward(&mut ledger, holder).unwrap());
        assert!(!registry.exclude_from_reward(&mut ledger, holder).unwrap());
        assert!(registry.is_excluded_from_reward(&holder));
        assert!(ledger.balance_state(&holder).is_excluded());

        registry.include_in_reward(&mut ledger, &holder).unwrap();
        assert!(!registry.is_excluded_from_reward(&holder));
        assert_eq!(
            ledger.balance_of(&holder, registry.excluded_from_reward()),
            tokens(10)
        );
    }

    #[test]
    fn including_a_non_excluded_account_fails() {
        let holder = Address::derive("holder");
        let mut ledger = ReflectionLedger::genesis(tokens(10), holder).unwrap();
        let mut registry = ExclusionRegistry::new();
        assert_eq!(
            registry.include_in_reward(&mut ledger, &holder),
            Err(TokenError::NotExcluded(holder))
        );
    }

    #[test]
    fn excluding_an_empty_account_creates_its_row() {
        let holder = Address::derive("holder");
        let wallet = Address::derive("wallet");
        let mut ledger = ReflectionLedger::genesis(tokens(10), holder).unwrap();
        let mut registry = ExclusionRegistry::new();
        registry.exclude_from_reward(&mut ledger, wallet).unwrap();
        assert!(ledger.record(&wallet).is_some());
        assert!(ledger.validate(registry.excluded_from_reward()).is_ok());
    }
}
