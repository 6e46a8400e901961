//! Kindly token command line interface
//!
//! Operates on a JSON state file: `init` writes genesis, every other command
//! loads the state, applies one operation and writes the state back only if
//! the operation succeeded.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use kindly_token::{
    FeeCategory, ReflectToken, TokenConfig, TokenError, TokenSnapshot, TransferReceipt,
};
use kindly_types::{format_token_amount, parse_rate, parse_token_amount, Address, TokenAmount};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "kindly-cli")]
#[command(about = "Kindly reflection token command line interface", long_about = None)]
#[command(version)]
struct Cli {
    /// Token state file
    #[arg(long, global = true, default_value = "kindly-state.json")]
    state: PathBuf,

    /// Optional TOML configuration (KINDLY_* environment variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Acting account; defaults to the current owner
    #[arg(long, global = true)]
    caller: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write genesis state from the configuration
    Init {
        /// Overwrite an existing state file
        #[arg(long)]
        force: bool,
    },
    /// Print the default configuration as TOML
    ConfigTemplate,
    /// Token metadata, fee schedule and supply figures
    Info,
    /// Displayed balance of an account
    Balance { address: String },
    /// Lifetime fees paid by an account as a sender
    History { address: String },
    /// Transfer tokens from the caller
    Transfer {
        to: String,
        #[arg(allow_hyphen_values = true)]
        amount: String,
    },
    /// Set the caller's allowance for a spender
    Approve {
        spender: String,
        #[arg(allow_hyphen_values = true)]
        amount: String,
    },
    /// Raise the caller's allowance for a spender
    IncreaseAllowance {
        spender: String,
        #[arg(allow_hyphen_values = true)]
        amount: String,
    },
    /// Lower the caller's allowance for a spender
    DecreaseAllowance {
        spender: String,
        #[arg(allow_hyphen_values = true)]
        amount: String,
    },
    /// Remaining allowance of `spender` over `owner`
    Allowance { owner: String, spender: String },
    /// Spend the caller's allowance over `from`
    TransferFrom {
        from: String,
        to: String,
        #[arg(allow_hyphen_values = true)]
        amount: String,
    },
    /// Redistribute the caller's tokens to all reward-included holders
    Deliver {
        #[arg(allow_hyphen_values = true)]
        amount: String,
    },
    /// Owner-only administration
    Admin {
        #[command(subcommand)]
        action: AdminCommands,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Set a fee rate in permille (tax, charity, maintenance, liquidity_wallet)
    SetFee {
        category: String,
        #[arg(allow_hyphen_values = true)]
        permille: String,
    },
    /// Set the max transfer as permille of the total supply
    SetMaxTx {
        #[arg(allow_hyphen_values = true)]
        permille: String,
    },
    /// Redirect a fee wallet (charity, maintenance, liquidity_wallet)
    SetWallet { category: String, address: String },
    ExcludeFromFee { account: String },
    IncludeInFee { account: String },
    ExcludeFromReward { account: String },
    IncludeInReward { account: String },
    /// Hand over ownership together with the owner's balance
    TransferOwnership { new_owner: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = TokenConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_logging(&config)?;

    let output = run(cli, &config)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn init_logging(config: &TokenConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn run(cli: Cli, config: &TokenConfig) -> Result<Value> {
    match cli.command {
        Commands::Init { force } => init_state(&cli.state, config, force),
        Commands::ConfigTemplate => {
            let template = toml::to_string_pretty(&TokenConfig::default())
                .context("failed to render configuration template")?;
            Ok(Value::String(template))
        }
        command => {
            let mut token = load_state(&cli.state)?;
            let caller = match &cli.caller {
                Some(raw) => parse_address(raw)?,
                None => token.owner(),
            };
            let (output, mutated) = execute(&mut token, &caller, command)?;
            if mutated {
                for event in token.drain_events() {
                    debug!(target: "token", "{:?}", event);
                }
                token
                    .snapshot()
                    .save_json(&cli.state)
                    .context("failed to persist token state")?;
            }
            Ok(output)
        }
    }
}

fn init_state(path: &Path, config: &TokenConfig, force: bool) -> Result<Value> {
    if path.exists() && !force {
        bail!(
            "state file {} already exists (use --force to overwrite)",
            path.display()
        );
    }
    let token = ReflectToken::from_config(config)?;
    let snapshot = token.snapshot();
    snapshot.save_json(path)?;
    info!(target: "token", "Wrote genesis state to {}", path.display());
    Ok(json!({
        "state": path.display().to_string(),
        "owner": token.owner().to_string(),
        "total_supply": format_token_amount(token.total_supply(), token.decimals()),
        "digest": snapshot.digest()?,
    }))
}

fn load_state(path: &Path) -> Result<ReflectToken> {
    if !path.exists() {
        bail!(
            "state file {} not found (run `kindly-cli init` first)",
            path.display()
        );
    }
    let snapshot = TokenSnapshot::load_json(path)?;
    Ok(ReflectToken::from_snapshot(snapshot)?)
}

/// Returns the command output and whether the state changed.
fn execute(token: &mut ReflectToken, caller: &Address, command: Commands) -> Result<(Value, bool)> {
    let decimals = token.decimals();
    let amount = |raw: &str| -> Result<TokenAmount> {
        Ok(parse_token_amount(raw, decimals).map_err(TokenError::from)?)
    };

    let result = match command {
        Commands::Info => (info_json(token)?, false),
        Commands::Balance { address } => {
            let account = parse_address(&address)?;
            (
                json!({
                    "address": account.to_string(),
                    "balance": format_token_amount(token.balance_of(&account), decimals),
                }),
                false,
            )
        }
        Commands::History { address } => {
            let account = parse_address(&address)?;
            let paid = token.total_tokens_transferred_history(&account);
            (
                json!({
                    "address": account.to_string(),
                    "fees_paid": format_token_amount(paid, decimals),
                }),
                false,
            )
        }
        Commands::Allowance { owner, spender } => {
            let owner = parse_address(&owner)?;
            let spender = parse_address(&spender)?;
            (
                json!({
                    "owner": owner.to_string(),
                    "spender": spender.to_string(),
                    "allowance": format_token_amount(token.allowance(&owner, &spender), decimals),
                }),
                false,
            )
        }
        Commands::Transfer { to, amount: raw } => {
            let to = parse_address(&to)?;
            let receipt = token.transfer(caller, &to, amount(&raw)?)?;
            (receipt_json(&receipt, decimals), true)
        }
        Commands::TransferFrom { from, to, amount: raw } => {
            let from = parse_address(&from)?;
            let to = parse_address(&to)?;
            let receipt = token.transfer_from(caller, &from, &to, amount(&raw)?)?;
            (receipt_json(&receipt, decimals), true)
        }
        Commands::Approve { spender, amount: raw } => {
            let spender = parse_address(&spender)?;
            let value = amount(&raw)?;
            token.approve(caller, &spender, value)?;
            (allowance_json(caller, &spender, value, decimals), true)
        }
        Commands::IncreaseAllowance { spender, amount: raw } => {
            let spender = parse_address(&spender)?;
            let value = token.increase_allowance(caller, &spender, amount(&raw)?)?;
            (allowance_json(caller, &spender, value, decimals), true)
        }
        Commands::DecreaseAllowance { spender, amount: raw } => {
            let spender = parse_address(&spender)?;
            let value = token.decrease_allowance(caller, &spender, amount(&raw)?)?;
            (allowance_json(caller, &spender, value, decimals), true)
        }
        Commands::Deliver { amount: raw } => {
            let value = amount(&raw)?;
            token.deliver(caller, value)?;
            (
                json!({
                    "delivered": format_token_amount(value, decimals),
                    "total_fees": format_token_amount(token.total_fees(), decimals),
                }),
                true,
            )
        }
        Commands::Admin { action } => (execute_admin(token, caller, action)?, true),
        Commands::Init { .. } | Commands::ConfigTemplate => {
            bail!("command does not operate on existing state")
        }
    };
    Ok(result)
}

fn execute_admin(token: &mut ReflectToken, caller: &Address, action: AdminCommands) -> Result<Value> {
    let now = unix_now()?;
    match action {
        AdminCommands::SetFee { category, permille } => {
            let category: FeeCategory = category.parse()?;
            let permille = parse_rate(&permille).map_err(TokenError::from)?;
            token.set_fee_permille(caller, category, permille, now)?;
        }
        AdminCommands::SetMaxTx { permille } => {
            let permille = parse_rate(&permille).map_err(TokenError::from)?;
            token.set_max_tx_permille(caller, permille, now)?;
        }
        AdminCommands::SetWallet { category, address } => {
            let category: FeeCategory = category.parse()?;
            token.set_fee_wallet(caller, category, parse_address(&address)?, now)?;
        }
        AdminCommands::ExcludeFromFee { account } => {
            token.exclude_from_fee(caller, parse_address(&account)?, now)?;
        }
        AdminCommands::IncludeInFee { account } => {
            token.include_in_fee(caller, parse_address(&account)?, now)?;
        }
        AdminCommands::ExcludeFromReward { account } => {
            token.exclude_from_reward(caller, parse_address(&account)?, now)?;
        }
        AdminCommands::IncludeInReward { account } => {
            token.include_in_reward(caller, parse_address(&account)?, now)?;
        }
        AdminCommands::TransferOwnership { new_owner } => {
            token.transfer_ownership(caller, parse_address(&new_owner)?)?;
        }
    }
    info_json(token)
}

fn info_json(token: &ReflectToken) -> Result<Value> {
    let decimals = token.decimals();
    let schedule = token.fee_schedule();
    let fees: serde_json::Map<String, Value> = FeeCategory::ALL
        .iter()
        .map(|category| {
            (
                category.as_str().to_string(),
                json!({
                    "permille": schedule.get_rate(*category),
                    "cap": schedule.cap(*category),
                }),
            )
        })
        .collect();
    let wallets = token.beneficiaries();

    Ok(json!({
        "name": token.name(),
        "symbol": token.symbol(),
        "decimals": decimals,
        "owner": token.owner().to_string(),
        "total_supply": format_token_amount(token.total_supply(), decimals),
        "total_fees": format_token_amount(token.total_fees(), decimals),
        "total_reflected": token.total_reflected_supply().to_string(),
        "rate": token.current_rate().to_string(),
        "max_transfer": format_token_amount(token.max_transfer_amount(), decimals),
        "fees": fees,
        "wallets": {
            "charity": wallets.charity.to_string(),
            "maintenance": wallets.maintenance.to_string(),
            "liquidity_wallet": wallets.liquidity_wallet.to_string(),
        },
        "digest": token.snapshot().digest()?,
    }))
}

fn receipt_json(receipt: &TransferReceipt, decimals: u32) -> Value {
    let fmt = |amount| format_token_amount(amount, decimals);
    json!({
        "from": receipt.sender.to_string(),
        "to": receipt.recipient.to_string(),
        "amount": fmt(receipt.fees.amount),
        "received": fmt(receipt.transferred()),
        "fee_applied": receipt.fee_applied,
        "fees": {
            "tax": fmt(receipt.fees.tax),
            "charity": fmt(receipt.fees.charity),
            "maintenance": fmt(receipt.fees.maintenance),
            "liquidity_wallet": fmt(receipt.fees.liquidity_wallet),
        },
    })
}

fn allowance_json(owner: &Address, spender: &Address, value: TokenAmount, decimals: u32) -> Value {
    json!({
        "owner": owner.to_string(),
        "spender": spender.to_string(),
        "allowance": format_token_amount(value, decimals),
    })
}

fn parse_address(raw: &str) -> Result<Address> {
    raw.parse::<Address>()
        .with_context(|| format!("invalid address {raw:?}"))
}

fn unix_now() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before the unix epoch")?
        .as_secs())
}
