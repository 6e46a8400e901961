//! Transfer engine
//!
//! A transfer is planned first (validation, fee split, rate and reflected
//! conversions, balance checks) and then applied. Planning is read-only and
//! applying cannot fail, so a rejected transfer leaves no trace.

use crate::errors::{TokenError, TokenResult};
use crate::exclusion::ExclusionRegistry;
use crate::fee_schedule::{FeeBreakdown, FeeCategory, FeeSchedule};
use crate::ledger::{reflection_from_token, AccountBalance, ReflectionLedger};
use kindly_types::{Address, TokenAmount};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Wallets receiving the non-redistributed fee categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beneficiaries {
    pub charity: Address,
    pub maintenance: Address,
    pub liquidity_wallet: Address,
}

impl Beneficiaries {
    /// Wallet credited for `category`; the tax category has none.
    pub fn wallet(&self, category: FeeCategory) -> Option<Address> {
        match category {
            FeeCategory::Tax => None,
            FeeCategory::Charity => Some(self.charity),
            FeeCategory::Maintenance => Some(self.maintenance),
            FeeCategory::LiquidityWallet => Some(self.liquidity_wallet),
        }
    }

    pub fn set_wallet(&mut self, category: FeeCategory, wallet: Address) -> TokenResult<()> {
        if wallet.is_zero() {
            return Err(TokenError::ZeroAddress("fee wallet"));
        }
        let slot = match category {
            FeeCategory::Tax => {
                return Err(TokenError::InvalidConfig(
                    "the tax category is redistributed and has no wallet".into(),
                ))
            }
            FeeCategory::Charity => &mut self.charity,
            FeeCategory::Maintenance => &mut self.maintenance,
            FeeCategory::LiquidityWallet => &mut self.liquidity_wallet,
        };
        *slot = wallet;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (FeeCategory, Address)> {
        [
            (FeeCategory::Charity, self.charity),
            (FeeCategory::Maintenance, self.maintenance),
            (FeeCategory::LiquidityWallet, self.liquidity_wallet),
        ]
        .into_iter()
    }
}

/// Per-transaction cap and the account allowed to bypass it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLimits {
    pub max_transfer_amount: TokenAmount,
    pub exempt: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest {
    pub sender: Address,
    pub recipient: Address,
    pub amount: TokenAmount,
}

impl TransferRequest {
    pub fn new(sender: Address, recipient: Address, amount: TokenAmount) -> Self {
        Self {
            sender,
            recipient,
            amount,
        }
    }
}

/// The fee split of a transfer converted to reflected units at one rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReflectedAmounts {
    pub amount: TokenAmount,
    pub tax: TokenAmount,
    pub charity: TokenAmount,
    pub maintenance: TokenAmount,
    pub liquidity_wallet: TokenAmount,
    pub transferred: TokenAmount,
}

impl ReflectedAmounts {
    fn at_rate(fees: &FeeBreakdown, rate: TokenAmount) -> TokenResult<Self> {
        Ok(Self {
            amount: reflection_from_token(fees.amount, rate)?,
            tax: reflection_from_token(fees.tax, rate)?,
            charity: reflection_from_token(fees.charity, rate)?,
            maintenance: reflection_from_token(fees.maintenance, rate)?,
            liquidity_wallet: reflection_from_token(fees.liquidity_wallet, rate)?,
            transferred: reflection_from_token(fees.transferred, rate)?,
        })
    }

    fn of(&self, category: FeeCategory) -> TokenAmount {
        match category {
            FeeCategory::Tax => self.tax,
            FeeCategory::Charity => self.charity,
            FeeCategory::Maintenance => self.maintenance,
            FeeCategory::LiquidityWallet => self.liquidity_wallet,
        }
    }
}

/// A validated transfer, ready to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPlan {
    pub request: TransferRequest,
    pub fees: FeeBreakdown,
    pub reflected: ReflectedAmounts,
    pub rate: TokenAmount,
    pub fee_applied: bool,
}

/// Outcome of a committed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReceipt {
    pub sender: Address,
    pub recipient: Address,
    pub fees: FeeBreakdown,
    /// Rate every conversion of this transfer used.
    pub rate: TokenAmount,
    pub fee_applied: bool,
}

impl TransferReceipt {
    /// Net real units the recipient received.
    pub fn transferred(&self) -> TokenAmount {
        self.fees.transferred
    }
}

pub struct TransferEngine<'a> {
    ledger: &'a mut ReflectionLedger,
    registry: &'a ExclusionRegistry,
    schedule: &'a FeeSchedule,
    beneficiaries: &'a Beneficiaries,
    limits: TransferLimits,
}

impl<'a> TransferEngine<'a> {
    pub fn new(
        ledger: &'a mut ReflectionLedger,
        registry: &'a ExclusionRegistry,
        schedule: &'a FeeSchedule,
        beneficiaries: &'a Beneficiaries,
        limits: TransferLimits,
    ) -> Self {
        Self {
            ledger,
            registry,
            schedule,
            beneficiaries,
            limits,
        }
    }

    /// Validate a transfer and compute every amount it will move.
    pub fn plan(&self, request: &TransferRequest) -> TokenResult<TransferPlan> {
        let TransferRequest {
            sender,
            recipient,
            amount,
        } = *request;

        if sender.is_zero() {
            return Err(TokenError::ZeroAddress("sender"));
        }
        if recipient.is_zero() {
            return Err(TokenError::ZeroAddress("recipient"));
        }
        if amount == 0 {
            return Err(TokenError::InvalidAmount);
        }

        let capped = sender != self.limits.exempt && recipient != self.limits.exempt;
        if capped && amount > self.limits.max_transfer_amount {
            return Err(TokenError::MaxTransferExceeded {
                max: self.limits.max_transfer_amount,
                requested: amount,
            });
        }

        let fee_applied = self.registry.fee_applies(&sender, &recipient);
        let fees = if fee_applied {
            self.schedule.breakdown(amount)?
        } else {
            FeeBreakdown::exempt(amount)
        };

        // One rate for the whole transfer, taken before any mutation.
        let rate = self
            .ledger
            .current_rate(self.registry.excluded_from_reward());

        let state = self.ledger.balance_state(&sender);
        let have = state.balance_at(rate);
        if amount > have {
            return Err(TokenError::InsufficientBalance { have, need: amount });
        }

        let reflected = ReflectedAmounts::at_rate(&fees, rate)?;
        if let AccountBalance::Excluded { reflected: mirror, .. } = state {
            if mirror < reflected.amount {
                return Err(TokenError::InsufficientBalance { have, need: amount });
            }
        }

        Ok(TransferPlan {
            request: *request,
            fees,
            reflected,
            rate,
            fee_applied,
        })
    }

    /// Plan and apply a transfer atomically.
    pub fn execute(&mut self, request: &TransferRequest) -> TokenResult<TransferReceipt> {
        let plan = self.plan(request)?;
        Ok(self.apply(plan))
    }

    fn apply(&mut self, plan: TransferPlan) -> TransferReceipt {
        let TransferPlan {
            request,
            fees,
            reflected,
            rate,
            fee_applied,
        } = plan;

        self.ledger
            .debit(&request.sender, fees.amount, reflected.amount);
        self.ledger
            .credit(&request.recipient, fees.transferred, reflected.transferred);

        for (category, wallet) in self.beneficiaries.iter() {
            let fee = fees.fee_of(category);
            if fee > 0 {
                self.ledger.credit(&wallet, fee, reflected.of(category));
            }
        }

        self.ledger.reflect_fee(reflected.tax, fees.tax);

        if fee_applied {
            self.ledger
                .add_fee_history(&request.sender, fees.total_fees());
        }
        self.ledger
            .settle_rate(self.registry.excluded_from_reward());

        debug!(
            target: "token",
            "Transfer {} -> {}: amount={} net={} tax={} charity={} maintenance={} liquidity_wallet={} rate={}",
            request.sender,
            request.recipient,
            fees.amount,
            fees.transferred,
            fees.tax,
            fees.charity,
            fees.maintenance,
            fees.liquidity_wallet,
            rate
        );

        TransferReceipt {
            sender: request.sender,
            recipient: request.recipient,
            fees,
            rate,
            fee_applied,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindly_types::tokens;

    struct Fixture {
        ledger: ReflectionLedger,
        registry: ExclusionRegistry,
        schedule: FeeSchedule,
        beneficiaries: Beneficiaries,
        limits: TransferLimits,
    }

    fn owner() -> Address {
        Address::derive("owner")
    }

    fn alice() -> Address {
        Address::derive("alice")
    }

    fn bob() -> Address {
        Address::derive("bob")
    }

    fn fixture() -> Fixture {
        let mut ledger = ReflectionLedger::genesis(tokens(1_000_000), owner()).unwrap();
        let mut registry = ExclusionRegistry::new();
        let beneficiaries = Beneficiaries {
            charity: Address::derive("charity"),
            maintenance: Address::derive("maintenance"),
            liquidity_wallet: Address::derive("liquidity"),
        };
        registry.exclude_from_fee(owner());
        for (_, wallet) in beneficiaries.iter() {
            registry.exclude_from_reward(&mut ledger, wallet).unwrap();
        }
        Fixture {
            ledger,
            registry,
            schedule: FeeSchedule::default(),
            beneficiaries,
            limits: TransferLimits {
                max_transfer_amount: tokens(5_000),
                exempt: owner(),
            },
        }
    }

    impl Fixture {
        fn transfer(&mut self, from: Address, to: Address, amount: TokenAmount) -> TokenResult<TransferReceipt> {
            TransferEngine::new(
                &mut self.ledger,
                &self.registry,
                &self.schedule,
                &self.beneficiaries,
                self.limits,
            )
            .execute(&TransferRequest::new(from, to, amount))
        }

        fn balance(&self, account: &Address) -> TokenAmount {
            self.ledger
                .balance_of(account, self.registry.excluded_from_reward())
        }
    }

    #[test]
    fn fees_route_to_wallets_and_reflection() {
        let mut fx = fixture();
        fx.transfer(owner(), alice(), tokens(1_000)).unwrap();
        let reflected_before = fx.ledger.total_reflected();

        let receipt = fx.transfer(alice(), bob(), tokens(100)).unwrap();
        assert!(receipt.fee_applied);
        assert_eq!(receipt.transferred(), tokens(96));
        assert_eq!(fx.balance(&fx.beneficiaries.charity), 25 * 10u128.pow(17));
        assert_eq!(fx.balance(&fx.beneficiaries.maintenance), 9 * 10u128.pow(17));
        assert_eq!(fx.balance(&fx.beneficiaries.liquidity_wallet), 3 * 10u128.pow(17));
        assert!(fx.balance(&bob()) >= tokens(96));
        assert_eq!(
            fx.ledger.total_reflected(),
            reflected_before - receipt.fees.tax * receipt.rate
        );
        assert_eq!(fx.ledger.fee_history(&alice()), tokens(4));
        assert_eq!(fx.ledger.total_fees(), 3 * 10u128.pow(17));
    }

    #[test]
    fn validation_failures_leave_ledger_untouched() {
        let mut fx = fixture();
        fx.transfer(owner(), alice(), tokens(10)).unwrap();
        let snapshot = fx.ledger.clone();

        assert_eq!(
            fx.transfer(alice(), bob(), 0).unwrap_err(),
            TokenError::InvalidAmount
        );
        assert_eq!(
            fx.transfer(Address::ZERO, bob(), 1).unwrap_err(),
            TokenError::ZeroAddress("sender")
        );
        assert_eq!(
            fx.transfer(alice(), Address::ZERO, 1).unwrap_err(),
            TokenError::ZeroAddress("recipient")
        );
        assert!(matches!(
            fx.transfer(alice(), bob(), tokens(11)).unwrap_err(),
            TokenError::InsufficientBalance { .. }
        ));
        assert!(matches!(
            fx.transfer(alice(), bob(), tokens(5_001)).unwrap_err(),
            TokenError::MaxTransferExceeded { .. }
        ));
        assert_eq!(fx.ledger, snapshot);
    }

    #[test]
    fn exempt_account_bypasses_max_transfer() {
        let mut fx = fixture();
        fx.transfer(owner(), alice(), tokens(10_000)).unwrap();
        assert_eq!(fx.balance(&alice()), tokens(10_000));
        fx.transfer(alice(), owner(), tokens(6_000)).unwrap();
    }

    #[test]
    fn fee_exempt_parties_move_full_amount() {
        let mut fx = fixture();
        fx.transfer(owner(), alice(), tokens(100)).unwrap();
        fx.registry.exclude_from_fee(bob());

        let receipt = fx.transfer(alice(), bob(), tokens(50)).unwrap();
        assert!(!receipt.fee_applied);
        assert_eq!(fx.balance(&bob()), tokens(50));
        assert_eq!(fx.ledger.fee_history(&alice()), 0);
        assert_eq!(fx.balance(&fx.beneficiaries.charity), 0);
    }

    #[test]
    fn plan_uses_a_single_rate() {
        let mut fx = fixture();
        fx.transfer(owner(), alice(), tokens(100)).unwrap();
        let engine = TransferEngine::new(
            &mut fx.ledger,
            &fx.registry,
            &fx.schedule,
            &fx.beneficiaries,
            fx.limits,
        );
        let plan = engine
            .plan(&TransferRequest::new(alice(), bob(), tokens(100)))
            .unwrap();
        let r = plan.reflected;
        assert_eq!(
            r.amount,
            r.tax + r.charity + r.maintenance + r.liquidity_wallet + r.transferred
        );
        assert_eq!(r.transferred, plan.fees.transferred * plan.rate);
    }

    #[test]
    fn tax_wallet_slot_cannot_be_set() {
        let mut fx = fixture();
        assert!(fx
            .beneficiaries
            .set_wallet(FeeCategory::Tax, alice())
            .is_err());
        assert_eq!(
            fx.beneficiaries.set_wallet(FeeCategory::Charity, Address::ZERO),
            Err(TokenError::ZeroAddress("fee wallet"))
        );
        fx.beneficiaries
            .set_wallet(FeeCategory::Charity, alice())
            .unwrap();
        assert_eq!(fx.beneficiaries.wallet(FeeCategory::Charity), Some(alice()));
    }
}
