//! Token facade
//!
//! ERC-20 style surface over the reflection ledger: transfers and allowances
//! for holders, owner-only and timelock-gated setters for administration.
//! Every public operation either commits fully or returns an error before
//! the first write.

use crate::config::{validate_max_tx_permille, TokenConfig};
use crate::engine::{
    Beneficiaries, TransferEngine, TransferLimits, TransferReceipt, TransferRequest,
};
use crate::errors::{TokenError, TokenResult};
use crate::exclusion::ExclusionRegistry;
use crate::fee_schedule::{FeeCategory, FeeSchedule, FEE_DENOMINATOR};
use crate::guard::{AccessGuard, Timelock};
use crate::ledger::{reflection_from_token, token_from_reflection, ReflectionLedger};
use kindly_types::{Address, TokenAmount};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionKind {
    Fee,
    Reward,
}

/// State changes observable by off-ledger consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEvent {
    /// `value` is the net amount received; fees are implicit.
    Transfer {
        from: Address,
        to: Address,
        value: TokenAmount,
    },
    Approval {
        owner: Address,
        spender: Address,
        value: TokenAmount,
    },
    OwnershipTransferred {
        previous: Address,
        new: Address,
    },
    FeeRateChanged {
        category: FeeCategory,
        permille: u16,
    },
    MaxTxPermilleChanged {
        permille: u16,
    },
    FeeWalletChanged {
        category: FeeCategory,
        wallet: Address,
    },
    ExclusionChanged {
        account: Address,
        kind: ExclusionKind,
        excluded: bool,
    },
}

pub struct ReflectToken<G = Timelock> {
    pub(crate) metadata: TokenMetadata,
    pub(crate) owner: Address,
    pub(crate) beneficiaries: Beneficiaries,
    pub(crate) ledger: ReflectionLedger,
    pub(crate) registry: ExclusionRegistry,
    pub(crate) schedule: FeeSchedule,
    pub(crate) allowances: BTreeMap<(Address, Address), TokenAmount>,
    pub(crate) max_tx_permille: u16,
    pub(crate) guard: G,
    pub(crate) events: Vec<TokenEvent>,
}

impl ReflectToken<Timelock> {
    /// Genesis with the timelock deadline taken from the config.
    pub fn from_config(config: &TokenConfig) -> TokenResult<Self> {
        Self::with_guard(config, Timelock::new(config.unlock_at))
    }
}

impl<G: AccessGuard> ReflectToken<G> {
    /// Mint the whole supply to the owner. The owner is fee-exempt and the fee
    /// wallets are excluded from reward so they receive exact category shares.
    pub fn with_guard(config: &TokenConfig, guard: G) -> TokenResult<Self> {
        config.validate()?;
        let total_supply = config.total_supply()?;
        let mut ledger = ReflectionLedger::genesis(total_supply, config.owner)?;
        let beneficiaries = config.beneficiaries();

        let mut registry = ExclusionRegistry::new();
        registry.exclude_from_fee(config.owner);
        for (_, wallet) in beneficiaries.iter() {
            registry.exclude_from_reward(&mut ledger, wallet)?;
        }

        info!(
            target: "token",
            "Genesis {} ({}): {} base units minted to {}",
            config.name,
            config.symbol,
            total_supply,
            config.owner
        );

        Ok(Self {
            metadata: TokenMetadata {
                name: config.name.clone(),
                symbol: config.symbol.clone(),
                decimals: config.decimals,
            },
            owner: config.owner,
            beneficiaries,
            ledger,
            registry,
            schedule: config.fee_schedule()?,
            allowances: BTreeMap::new(),
            max_tx_permille: config.max_tx_permille,
            guard,
            events: vec![TokenEvent::Transfer {
                from: Address::ZERO,
                to: config.owner,
                value: total_supply,
            }],
        })
    }

    // -------------------------------------------------------------------------
    // Metadata and queries
    // -------------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn symbol(&self) -> &str {
        &self.metadata.symbol
    }

    pub fn decimals(&self) -> u32 {
        self.metadata.decimals
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn beneficiaries(&self) -> &Beneficiaries {
        &self.beneficiaries
    }

    pub fn fee_schedule(&self) -> &FeeSchedule {
        &self.schedule
    }

    pub fn ledger(&self) -> &ReflectionLedger {
        &self.ledger
    }

    pub fn registry(&self) -> &ExclusionRegistry {
        &self.registry
    }

    pub fn guard(&self) -> &G {
        &self.guard
    }

    pub fn max_tx_permille(&self) -> u16 {
        self.max_tx_permille
    }

    /// `floor(total_supply * max_tx_permille / 1000)`, split to stay in range.
    pub fn max_transfer_amount(&self) -> TokenAmount {
        let total = self.ledger.total_real();
        let permille = self.max_tx_permille as u128;
        total / FEE_DENOMINATOR * permille + total % FEE_DENOMINATOR * permille / FEE_DENOMINATOR
    }

    pub fn total_supply(&self) -> TokenAmount {
        self.ledger.total_real()
    }

    pub fn total_reflected_supply(&self) -> TokenAmount {
        self.ledger.total_reflected()
    }

    /// Real units redistributed to holders through the tax so far.
    pub fn total_fees(&self) -> TokenAmount {
        self.ledger.total_fees()
    }

    pub fn current_rate(&self) -> TokenAmount {
        self.ledger
            .current_rate(self.registry.excluded_from_reward())
    }

    pub fn balance_of(&self, account: &Address) -> TokenAmount {
        self.ledger.balance_at(account, self.current_rate())
    }

    pub fn is_excluded_from_fee(&self, account: &Address) -> bool {
        self.registry.is_excluded_from_fee(account)
    }

    pub fn is_excluded_from_reward(&self, account: &Address) -> bool {
        self.registry.is_excluded_from_reward(account)
    }

    /// Lifetime real units `account` paid in fees as a sender.
    pub fn total_tokens_transferred_history(&self, account: &Address) -> TokenAmount {
        self.ledger.fee_history(account)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> TokenAmount {
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    /// Reflected value of `amount` at the current rate, optionally net of fees.
    pub fn reflection_from_token(
        &self,
        amount: TokenAmount,
        deduct_fee: bool,
    ) -> TokenResult<TokenAmount> {
        if amount > self.total_supply() {
            return Err(TokenError::OutOfRange {
                what: "amount",
                value: amount,
                cap: self.total_supply(),
            });
        }
        let real = if deduct_fee {
            self.schedule.breakdown(amount)?.transferred
        } else {
            amount
        };
        reflection_from_token(real, self.current_rate())
    }

    pub fn token_from_reflection(&self, r_amount: TokenAmount) -> TokenResult<TokenAmount> {
        if r_amount > self.total_reflected_supply() {
            return Err(TokenError::OutOfRange {
                what: "reflection",
                value: r_amount,
                cap: self.total_reflected_supply(),
            });
        }
        Ok(token_from_reflection(r_amount, self.current_rate()))
    }

    // -------------------------------------------------------------------------
    // Holder operations
    // -------------------------------------------------------------------------

    pub fn transfer(
        &mut self,
        caller: &Address,
        to: &Address,
        amount: TokenAmount,
    ) -> TokenResult<TransferReceipt> {
        let receipt = self.engine().execute(&TransferRequest::new(*caller, *to, amount))?;
        self.emit_transfer(&receipt);
        Ok(receipt)
    }

    /// Spend `spender`'s allowance over `from`'s balance.
    pub fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: TokenAmount,
    ) -> TokenResult<TransferReceipt> {
        let allowed = self.allowance(from, spender);
        if amount > allowed {
            return Err(TokenError::AllowanceExceeded {
                allowed,
                requested: amount,
            });
        }

        let receipt = self.engine().execute(&TransferRequest::new(*from, *to, amount))?;
        self.emit_transfer(&receipt);
        self.write_allowance(*from, *spender, allowed - amount);
        Ok(receipt)
    }

    pub fn approve(
        &mut self,
        owner: &Address,
        spender: &Address,
        amount: TokenAmount,
    ) -> TokenResult<()> {
        check_allowance_parties(owner, spender)?;
        self.write_allowance(*owner, *spender, amount);
        Ok(())
    }

    pub fn increase_allowance(
        &mut self,
        owner: &Address,
        spender: &Address,
        added: TokenAmount,
    ) -> TokenResult<TokenAmount> {
        check_allowance_parties(owner, spender)?;
        let value = self
            .allowance(owner, spender)
            .checked_add(added)
            .ok_or(TokenError::Overflow("allowance"))?;
        self.write_allowance(*owner, *spender, value);
        Ok(value)
    }

    pub fn decrease_allowance(
        &mut self,
        owner: &Address,
        spender: &Address,
        subtracted: TokenAmount,
    ) -> TokenResult<TokenAmount> {
        check_allowance_parties(owner, spender)?;
        let allowed = self.allowance(owner, spender);
        let value = allowed
            .checked_sub(subtracted)
            .ok_or(TokenError::AllowanceUnderflow {
                allowed,
                requested: subtracted,
            })?;
        self.write_allowance(*owner, *spender, value);
        Ok(value)
    }

    /// Give `amount` of the caller's own tokens to every reward-included holder.
    pub fn deliver(&mut self, caller: &Address, amount: TokenAmount) -> TokenResult<()> {
        if self.is_excluded_from_reward(caller) {
            return Err(TokenError::AlreadyExcluded(*caller));
        }
        if amount == 0 {
            return Err(TokenError::InvalidAmount);
        }
        let rate = self.current_rate();
        let have = self.ledger.balance_at(caller, rate);
        if amount > have {
            return Err(TokenError::InsufficientBalance { have, need: amount });
        }
        let r_amount = reflection_from_token(amount, rate)?;

        self.ledger.debit(caller, amount, r_amount);
        self.ledger.reflect_fee(r_amount, amount);
        self.ledger
            .settle_rate(self.registry.excluded_from_reward());
        info!(target: "token", "{} delivered {} base units to holders", caller, amount);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Administration (owner only, timelock gated)
    // -------------------------------------------------------------------------

    pub fn set_fee_permille(
        &mut self,
        caller: &Address,
        category: FeeCategory,
        permille: u16,
        now: u64,
    ) -> TokenResult<()> {
        self.authorize(caller, now)?;
        self.schedule.set_rate(category, permille)?;
        info!(target: "token", "Set {} fee to {}‰", category, permille);
        self.events.push(TokenEvent::FeeRateChanged { category, permille });
        Ok(())
    }

    pub fn set_tax_fee_permille(&mut self, caller: &Address, permille: u16, now: u64) -> TokenResult<()> {
        self.set_fee_permille(caller, FeeCategory::Tax, permille, now)
    }

    pub fn set_charity_fee_permille(&mut self, caller: &Address, permille: u16, now: u64) -> TokenResult<()> {
        self.set_fee_permille(caller, FeeCategory::Charity, permille, now)
    }

    pub fn set_maintenance_fee_permille(&mut self, caller: &Address, permille: u16, now: u64) -> TokenResult<()> {
        self.set_fee_permille(caller, FeeCategory::Maintenance, permille, now)
    }

    pub fn set_liquidity_wallet_fee_permille(&mut self, caller: &Address, permille: u16, now: u64) -> TokenResult<()> {
        self.set_fee_permille(caller, FeeCategory::LiquidityWallet, permille, now)
    }

    pub fn set_max_tx_permille(&mut self, caller: &Address, permille: u16, now: u64) -> TokenResult<()> {
        self.authorize(caller, now)?;
        validate_max_tx_permille(permille)?;
        self.max_tx_permille = permille;
        info!(
            target: "token",
            "Set max transfer to {}‰ ({} base units)",
            permille,
            self.max_transfer_amount()
        );
        self.events.push(TokenEvent::MaxTxPermilleChanged { permille });
        Ok(())
    }

    pub fn set_fee_wallet(
        &mut self,
        caller: &Address,
        category: FeeCategory,
        wallet: Address,
        now: u64,
    ) -> TokenResult<()> {
        self.authorize(caller, now)?;
        self.beneficiaries.set_wallet(category, wallet)?;
        info!(target: "token", "Set {} wallet to {}", category, wallet);
        self.events.push(TokenEvent::FeeWalletChanged { category, wallet });
        Ok(())
    }

    pub fn set_charity_address(&mut self, caller: &Address, wallet: Address, now: u64) -> TokenResult<()> {
        self.set_fee_wallet(caller, FeeCategory::Charity, wallet, now)
    }

    pub fn set_maintenance_address(&mut self, caller: &Address, wallet: Address, now: u64) -> TokenResult<()> {
        self.set_fee_wallet(caller, FeeCategory::Maintenance, wallet, now)
    }

    pub fn set_liquidity_wallet_address(&mut self, caller: &Address, wallet: Address, now: u64) -> TokenResult<()> {
        self.set_fee_wallet(caller, FeeCategory::LiquidityWallet, wallet, now)
    }

    pub fn exclude_from_fee(&mut self, caller: &Address, account: Address, now: u64) -> TokenResult<()> {
        self.authorize(caller, now)?;
        if self.registry.exclude_from_fee(account) {
            self.emit_exclusion(account, ExclusionKind::Fee, true);
        }
        Ok(())
    }

    pub fn include_in_fee(&mut self, caller: &Address, account: Address, now: u64) -> TokenResult<()> {
        self.authorize(caller, now)?;
        if self.registry.include_in_fee(&account) {
            self.emit_exclusion(account, ExclusionKind::Fee, false);
        }
        Ok(())
    }

    /// No-op when the account is already excluded.
    pub fn exclude_from_reward(&mut self, caller: &Address, account: Address, now: u64) -> TokenResult<()> {
        self.authorize(caller, now)?;
        if self.registry.exclude_from_reward(&mut self.ledger, account)? {
            self.emit_exclusion(account, ExclusionKind::Reward, true);
        }
        Ok(())
    }

    pub fn include_in_reward(&mut self, caller: &Address, account: Address, now: u64) -> TokenResult<()> {
        self.authorize(caller, now)?;
        self.registry.include_in_reward(&mut self.ledger, &account)?;
        self.emit_exclusion(account, ExclusionKind::Reward, false);
        Ok(())
    }

    /// Hand the owner role and the owner's whole balance to `new_owner`.
    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> TokenResult<()> {
        self.ensure_owner(caller)?;
        if new_owner.is_zero() {
            return Err(TokenError::ZeroAddress("new owner"));
        }

        let previous = self.owner;
        let rate = self.current_rate();
        let moved = self.ledger.move_all(&previous, &new_owner, rate)?;
        self.ledger
            .settle_rate(self.registry.excluded_from_reward());
        self.registry.exclude_from_fee(new_owner);
        self.owner = new_owner;

        info!(
            target: "token",
            "Ownership transferred {} -> {} with {} base units",
            previous,
            new_owner,
            moved
        );
        self.events.push(TokenEvent::OwnershipTransferred {
            previous,
            new: new_owner,
        });
        self.events.push(TokenEvent::Transfer {
            from: previous,
            to: new_owner,
            value: moved,
        });
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    pub fn events(&self) -> &[TokenEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<TokenEvent> {
        std::mem::take(&mut self.events)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn engine(&mut self) -> TransferEngine<'_> {
        let limits = TransferLimits {
            max_transfer_amount: self.max_transfer_amount(),
            exempt: self.owner,
        };
        TransferEngine::new(
            &mut self.ledger,
            &self.registry,
            &self.schedule,
            &self.beneficiaries,
            limits,
        )
    }

    fn ensure_owner(&self, caller: &Address) -> TokenResult<()> {
        if *caller != self.owner {
            warn!(target: "token", "Rejected privileged call from {}", caller);
            return Err(TokenError::Unauthorized { caller: *caller });
        }
        Ok(())
    }

    fn authorize(&self, caller: &Address, now: u64) -> TokenResult<()> {
        self.ensure_owner(caller)?;
        if !self.guard.is_unlocked(now) {
            warn!(
                target: "token",
                "Rejected privileged call before unlock at {}",
                self.guard.unlock_at()
            );
            return Err(TokenError::Timelocked {
                unlock_at: self.guard.unlock_at(),
            });
        }
        Ok(())
    }

    fn write_allowance(&mut self, owner: Address, spender: Address, value: TokenAmount) {
        self.allowances.insert((owner, spender), value);
        self.events.push(TokenEvent::Approval {
            owner,
            spender,
            value,
        });
    }

    fn emit_transfer(&mut self, receipt: &TransferReceipt) {
        self.events.push(TokenEvent::Transfer {
            from: receipt.sender,
            to: receipt.recipient,
            value: receipt.transferred(),
        });
    }

    fn emit_exclusion(&mut self, account: Address, kind: ExclusionKind, excluded: bool) {
        info!(
            target: "token",
            "{} {} {:?} exclusion",
            account,
            if excluded { "added to" } else { "removed from" },
            kind
        );
        self.events.push(TokenEvent::ExclusionChanged {
            account,
            kind,
            excluded,
        });
    }
}

fn check_allowance_parties(owner: &Address, spender: &Address) -> TokenResult<()> {
    if owner.is_zero() {
        return Err(TokenError::ZeroAddress("approve owner"));
    }
    if spender.is_zero() {
        return Err(TokenError::ZeroAddress("spender"));
    }
    Ok(())
}
