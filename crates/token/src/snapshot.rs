//! JSON persistence of the full token state.
//!
//! Amounts are written as decimal strings; restoring re-runs the structural
//! checks so a hand-edited file cannot break the reflected-supply invariant.

use crate::engine::Beneficiaries;
use crate::errors::{TokenError, TokenResult};
use crate::exclusion::ExclusionRegistry;
use crate::fee_schedule::FeeSchedule;
use crate::guard::Timelock;
use crate::ledger::ReflectionLedger;
use crate::token::{ReflectToken, TokenMetadata};
use kindly_types::{serde_amount, Address, TokenAmount};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceEntry {
    pub owner: Address,
    pub spender: Address,
    #[serde(with = "serde_amount")]
    pub amount: TokenAmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSnapshot {
    pub version: u32,
    pub metadata: TokenMetadata,
    pub owner: Address,
    pub beneficiaries: Beneficiaries,
    pub schedule: FeeSchedule,
    pub max_tx_permille: u16,
    pub timelock: Timelock,
    pub registry: ExclusionRegistry,
    pub ledger: ReflectionLedger,
    #[serde(default)]
    pub allowances: Vec<AllowanceEntry>,
}

impl TokenSnapshot {
    pub fn to_json(&self) -> TokenResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| TokenError::Snapshot(e.to_string()))
    }

    pub fn from_json(json: &str) -> TokenResult<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| TokenError::Snapshot(e.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Hex blake3 digest of the serialized state.
    pub fn digest(&self) -> TokenResult<String> {
        let bytes = serde_json::to_vec(self).map_err(|e| TokenError::Snapshot(e.to_string()))?;
        Ok(hex::encode(blake3::hash(&bytes).as_bytes()))
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> TokenResult<()> {
        let json = self.to_json()?;
        fs::write(path.as_ref(), json).map_err(|e| {
            TokenError::Snapshot(format!("failed to write {}: {e}", path.as_ref().display()))
        })
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> TokenResult<Self> {
        let json = fs::read_to_string(path.as_ref()).map_err(|e| {
            TokenError::Snapshot(format!("failed to read {}: {e}", path.as_ref().display()))
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> TokenResult<()> {
        if self.version != SNAPSHOT_VERSION {
            return Err(TokenError::Snapshot(format!(
                "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
                self.version
            )));
        }
        self.schedule.validate()?;
        crate::config::validate_max_tx_permille(self.max_tx_permille)?;
        self.ledger
            .validate(self.registry.excluded_from_reward())?;
        Ok(())
    }
}

impl ReflectToken<Timelock> {
    pub fn snapshot(&self) -> TokenSnapshot {
        TokenSnapshot {
            version: SNAPSHOT_VERSION,
            metadata: self.metadata.clone(),
            owner: self.owner,
            beneficiaries: self.beneficiaries,
            schedule: self.schedule.clone(),
            max_tx_permille: self.max_tx_permille,
            timelock: self.guard,
            registry: self.registry.clone(),
            ledger: self.ledger.clone(),
            allowances: self
                .allowances
                .iter()
                .filter(|(_, amount)| **amount > 0)
                .map(|((owner, spender), amount)| AllowanceEntry {
                    owner: *owner,
                    spender: *spender,
                    amount: *amount,
                })
                .collect(),
        }
    }

    /// Rebuild a token from persisted state. The event log starts empty.
    pub fn from_snapshot(snapshot: TokenSnapshot) -> TokenResult<Self> {
        snapshot.validate()?;
        Ok(Self {
            metadata: snapshot.metadata,
            owner: snapshot.owner,
            beneficiaries: snapshot.beneficiaries,
            ledger: snapshot.ledger,
            registry: snapshot.registry,
            schedule: snapshot.schedule,
            allowances: snapshot
                .allowances
                .into_iter()
                .map(|entry| ((entry.owner, entry.spender), entry.amount))
                .collect(),
            max_tx_permille: snapshot.max_tx_permille,
            guard: snapshot.timelock,
            events: Vec::new(),
        })
    }
}
