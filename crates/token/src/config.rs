//! Genesis configuration
//!
//! Loaded from an optional TOML file layered with `KINDLY_*` environment
//! variables. Every field has a default, so an empty source yields the
//! reference deployment.

use crate::engine::Beneficiaries;
use crate::errors::{TokenError, TokenResult};
use crate::fee_schedule::{
    FeeRate, FeeSchedule, DEFAULT_CHARITY_PERMILLE, DEFAULT_LIQUIDITY_WALLET_PERMILLE,
    DEFAULT_MAINTENANCE_PERMILLE, DEFAULT_TAX_PERMILLE, FEE_DENOMINATOR,
};
use config::{Config, Environment, File as ConfigFile};
use kindly_types::{units_per_token, Address, TokenAmount, DEFAULT_DECIMALS};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Whole tokens minted at genesis.
pub const DEFAULT_TOTAL_SUPPLY_TOKENS: u64 = 108_000_000;
/// 0.5% of the supply per transfer.
pub const DEFAULT_MAX_TX_PERMILLE: u16 = 5;

/// Environment variable prefix (`KINDLY_MAX_TX_PERMILLE`, ...).
pub const ENV_PREFIX: &str = "KINDLY";

/// Accepted `log_format` values.
pub const LOG_FORMATS: [&str; 2] = ["pretty", "json"];

const DEFAULT_CHARITY_ADDRESS: Address = Address([
    0x9d, 0x75, 0x96, 0x2c, 0x69, 0x23, 0x55, 0xc9, 0x37, 0x72, 0x95, 0xaa, 0x25, 0x90, 0x38, 0x3f,
    0x58, 0x52, 0xe7, 0x02,
]);
const DEFAULT_MAINTENANCE_ADDRESS: Address = Address([
    0x93, 0x9a, 0xf5, 0xad, 0x7f, 0xd3, 0x5c, 0x63, 0xa8, 0x6c, 0x14, 0xe7, 0x0d, 0x89, 0xea, 0x54,
    0x13, 0x83, 0xd2, 0x6d,
]);
const DEFAULT_LIQUIDITY_WALLET_ADDRESS: Address = Address([
    0x62, 0x40, 0x14, 0xb2, 0xc9, 0xe1, 0x48, 0xdd, 0x8c, 0x1b, 0x5e, 0x00, 0x38, 0x5c, 0xf8, 0x6e,
    0x77, 0xed, 0xae, 0x0a,
]);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    // Metadata
    pub name: String,
    pub symbol: String,
    pub decimals: u32,
    pub total_supply_tokens: u64,

    // Fees (permille) and their caps
    pub tax_fee_permille: u16,
    pub tax_fee_cap: u16,
    pub charity_fee_permille: u16,
    pub charity_fee_cap: u16,
    pub maintenance_fee_permille: u16,
    pub maintenance_fee_cap: u16,
    pub liquidity_wallet_fee_permille: u16,
    pub liquidity_wallet_fee_cap: u16,
    pub max_tx_permille: u16,

    // Accounts
    pub owner: Address,
    pub charity_address: Address,
    pub maintenance_address: Address,
    pub liquidity_wallet_address: Address,

    /// Unix seconds before which administrative setters are rejected.
    pub unlock_at: u64,

    // Logging
    pub log_level: String,
    pub log_format: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            name: "Kindly".to_string(),
            symbol: "KINDLY".to_string(),
            decimals: DEFAULT_DECIMALS,
            total_supply_tokens: DEFAULT_TOTAL_SUPPLY_TOKENS,
            tax_fee_permille: DEFAULT_TAX_PERMILLE,
            tax_fee_cap: DEFAULT_TAX_PERMILLE,
            charity_fee_permille: DEFAULT_CHARITY_PERMILLE,
            charity_fee_cap: DEFAULT_CHARITY_PERMILLE,
            maintenance_fee_permille: DEFAULT_MAINTENANCE_PERMILLE,
            maintenance_fee_cap: DEFAULT_MAINTENANCE_PERMILLE,
            liquidity_wallet_fee_permille: DEFAULT_LIQUIDITY_WALLET_PERMILLE,
            liquidity_wallet_fee_cap: DEFAULT_LIQUIDITY_WALLET_PERMILLE,
            max_tx_permille: DEFAULT_MAX_TX_PERMILLE,
            owner: Address::derive("kindly-deployer"),
            charity_address: DEFAULT_CHARITY_ADDRESS,
            maintenance_address: DEFAULT_MAINTENANCE_ADDRESS,
            liquidity_wallet_address: DEFAULT_LIQUIDITY_WALLET_ADDRESS,
            unlock_at: 0,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl TokenConfig {
    /// Layer an optional config file and `KINDLY_*` environment variables over the defaults.
    pub fn load(path: Option<&Path>) -> TokenResult<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(TokenError::InvalidConfig(format!(
                    "configuration file {} not found",
                    path.display()
                )));
            }
            builder = builder.add_source(ConfigFile::from(path));
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let config: TokenConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| TokenError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TokenResult<()> {
        if self.total_supply_tokens == 0 {
            return Err(TokenError::InvalidConfig(
                "total_supply_tokens must be greater than zero".into(),
            ));
        }
        self.total_supply()?;
        self.fee_schedule()?;
        validate_max_tx_permille(self.max_tx_permille)?;

        if !LOG_FORMATS.contains(&self.log_format.as_str()) {
            return Err(TokenError::InvalidConfig(format!(
                "log_format must be one of {LOG_FORMATS:?}, got {:?}",
                self.log_format
            )));
        }

        for (field, account) in [
            ("owner", self.owner),
            ("charity_address", self.charity_address),
            ("maintenance_address", self.maintenance_address),
            ("liquidity_wallet_address", self.liquidity_wallet_address),
        ] {
            if account.is_zero() {
                return Err(TokenError::InvalidConfig(format!(
                    "{field} must not be the zero address"
                )));
            }
        }
        Ok(())
    }

    /// Fixed supply in base units.
    pub fn total_supply(&self) -> TokenResult<TokenAmount> {
        units_per_token(self.decimals)
            .and_then(|scale| (self.total_supply_tokens as u128).checked_mul(scale))
            .ok_or(TokenError::Overflow("total supply"))
    }

    pub fn fee_schedule(&self) -> TokenResult<FeeSchedule> {
        FeeSchedule::new(
            FeeRate {
                permille: self.tax_fee_permille,
                cap: self.tax_fee_cap,
            },
            FeeRate {
                permille: self.charity_fee_permille,
                cap: self.charity_fee_cap,
            },
            FeeRate {
                permille: self.maintenance_fee_permille,
                cap: self.maintenance_fee_cap,
            },
            FeeRate {
                permille: self.liquidity_wallet_fee_permille,
                cap: self.liquidity_wallet_fee_cap,
            },
        )
    }

    pub fn beneficiaries(&self) -> Beneficiaries {
        Beneficiaries {
            charity: self.charity_address,
            maintenance: self.maintenance_address,
            liquidity_wallet: self.liquidity_wallet_address,
        }
    }
}

/// Max-transfer permille must leave some transfer possible and never exceed the supply.
pub fn validate_max_tx_permille(permille: u16) -> TokenResult<()> {
    if permille == 0 || permille as u128 > FEE_DENOMINATOR {
        return Err(TokenError::OutOfRange {
            what: "max_tx_permille",
            value: permille as u128,
            cap: FEE_DENOMINATOR,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_reference_deployment() {
        let config = TokenConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.total_supply().unwrap(),
            108_000_000 * 10u128.pow(18)
        );
        assert_eq!(config.fee_schedule().unwrap().total_permille(), 40);
        assert_eq!(
            config.charity_address.to_string(),
            "0x9d75962c692355c9377295aa2590383f5852e702"
        );
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "symbol = \"TEST\"\ntotal_supply_tokens = 1000\nmax_tx_permille = 10\ncharity_fee_permille = 20"
        )
        .unwrap();

        let config = TokenConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.symbol, "TEST");
        assert_eq!(config.total_supply_tokens, 1_000);
        assert_eq!(config.max_tx_permille, 10);
        assert_eq!(config.charity_fee_permille, 20);
        assert_eq!(config.name, "Kindly");
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = TokenConfig::load(Some(Path::new("/nonexistent/kindly.toml"))).unwrap_err();
        assert!(matches!(err, TokenError::InvalidConfig(_)));
    }

    #[test]
    fn rate_above_cap_rejected() {
        let config = TokenConfig {
            charity_fee_permille: 30,
            ..TokenConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TokenError::OutOfRange { what: "charity", .. })
        ));
    }

    #[test]
    fn zero_addresses_and_bad_limits_rejected() {
        let config = TokenConfig {
            owner: Address::ZERO,
            ..TokenConfig::default()
        };
        assert!(config.validate().is_err());

        let config = TokenConfig {
            max_tx_permille: 0,
            ..TokenConfig::default()
        };
        assert!(config.validate().is_err());

        let config = TokenConfig {
            decimals: 60,
            ..TokenConfig::default()
        };
        assert_eq!(config.total_supply(), Err(TokenError::Overflow("total supply")));
    }

    #[test]
    fn unknown_log_format_rejected() {
        let config = TokenConfig {
            log_format: "xml".to_string(),
            ..TokenConfig::default()
        };
        assert!(matches!(config.validate(), Err(TokenError::InvalidConfig(_))));

        let config = TokenConfig {
            log_format: "json".to_string(),
            ..TokenConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
