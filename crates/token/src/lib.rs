//! Kindly token ledger
//!
//! A fixed-supply fungible token that charges a configurable fee on every
//! transfer. The tax share is redistributed to all reward-included holders by
//! shrinking the reflected supply. The charity, maintenance and liquidity
//! shares go to their wallets.
//!
//! Layout:
//! - [`fee_schedule`]: rates, caps and per-transfer fee splits
//! - [`ledger`]: dual reflected/real balances and the reflection rate
//! - [`exclusion`]: fee and reward exclusion sets
//! - [`engine`]: plan/apply transfer pipeline
//! - [`token`]: the ERC-20 style facade with allowances and administration
//! - [`snapshot`]: JSON persistence

pub mod config;
pub mod engine;
pub mod errors;
pub mod exclusion;
pub mod fee_schedule;
pub mod guard;
pub mod ledger;
pub mod snapshot;
pub mod token;

pub use config::{TokenConfig, DEFAULT_MAX_TX_PERMILLE, DEFAULT_TOTAL_SUPPLY_TOKENS, ENV_PREFIX};
pub use engine::{Beneficiaries, TransferEngine, TransferLimits, TransferReceipt, TransferRequest};
pub use errors::{TokenError, TokenResult};
pub use exclusion::{AccountSet, ExclusionRegistry};
pub use fee_schedule::{FeeBreakdown, FeeCategory, FeeRate, FeeSchedule, FEE_DENOMINATOR};
pub use guard::{AccessGuard, Timelock};
pub use ledger::{AccountBalance, ReflectionLedger};
pub use snapshot::{AllowanceEntry, TokenSnapshot, SNAPSHOT_VERSION};
pub use token::{ExclusionKind, ReflectToken, TokenEvent, TokenMetadata};
