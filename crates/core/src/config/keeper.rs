//! Keeper config file structures.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use alloy::primitives::Address;
use jpegd_chain::gwei_to_wei;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{expand_env, ConfigError};
use crate::evaluator::{DEFAULT_CLAIM_GRACE_PERIOD_SECS, DEFAULT_EVALUATION_CONCURRENCY};
use crate::reconciler::DEFAULT_BLOCK_RANGE;
use crate::submitter::DEFAULT_CHUNK_SIZE;

/// Config file read when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "liquidator.toml";

/// Top-level keeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidatorConfig {
    /// Node connection
    pub rpc: RpcConfig,

    /// Watched contracts
    pub contracts: ContractsConfig,

    /// Historical backfill
    #[serde(default)]
    pub backfill: BackfillConfig,

    /// Gas pricing ceiling
    pub gas: GasConfig,

    /// Wallet custody
    #[serde(default)]
    pub keystore: KeystoreConfig,

    /// Reconciliation and submission tuning
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// WebSocket endpoint (subscriptions require ws:// or wss://)
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsConfig {
    /// NFTVault address
    pub vault: String,
    /// Liquidator contract receiving batch calls
    pub liquidator: String,
    /// Price aggregators whose AnswerUpdated events trigger evaluation
    pub oracles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillConfig {
    /// First block to replay (usually the vault deployment block)
    #[serde(default)]
    pub from_block: u64,

    /// Blocks per eth_getLogs request
    #[serde(default = "default_block_range")]
    pub block_range: u64,
}

fn default_block_range() -> u64 {
    DEFAULT_BLOCK_RANGE
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            from_block: 0,
            block_range: default_block_range(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasConfig {
    /// Maximum gas price in gwei (fractions allowed)
    pub max_gas_price_gwei: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeystoreConfig {
    /// Directory holding encrypted keystore files
    #[serde(default = "default_keystore_path")]
    pub path: PathBuf,

    /// Account used to sign transactions
    #[serde(default)]
    pub wallet_address: String,
}

fn default_keystore_path() -> PathBuf {
    PathBuf::from("./keystores")
}

impl Default for KeystoreConfig {
    fn default() -> Self {
        Self {
            path: default_keystore_path(),
            wallet_address: String::new(),
        }
    }
}

/// Reconciliation strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcilerMode {
    /// Backfill lifecycle events, then follow them live
    #[default]
    Incremental,
    /// Rescan the vault's open positions on each price update
    Scan,
}

impl FromStr for ReconcilerMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "incremental" => Ok(Self::Incremental),
            "scan" => Ok(Self::Scan),
            other => Err(ConfigError::Invalid {
                field: "engine.mode",
                reason: format!("unknown mode {other:?} (expected incremental or scan)"),
            }),
        }
    }
}

impl fmt::Display for ReconcilerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incremental => f.write_str("incremental"),
            Self::Scan => f.write_str("scan"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub mode: ReconcilerMode,

    /// Positions per transaction
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Insurance repurchase window after liquidation
    #[serde(default = "default_grace_period")]
    pub claim_grace_period_secs: u64,

    /// Concurrent showPosition calls per evaluation pass
    #[serde(default = "default_concurrency")]
    pub evaluation_concurrency: usize,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_grace_period() -> u64 {
    DEFAULT_CLAIM_GRACE_PERIOD_SECS
}
fn default_concurrency() -> usize {
    DEFAULT_EVALUATION_CONCURRENCY
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: ReconcilerMode::default(),
            chunk_size: default_chunk_size(),
            claim_grace_period_secs: default_grace_period(),
            evaluation_concurrency: default_concurrency(),
        }
    }
}

/// Command-line overrides applied on top of the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub rpc_url: Option<String>,
    pub from_block: Option<u64>,
    pub max_gas_price_gwei: Option<f64>,
    pub wallet_address: Option<String>,
    pub keystore_path: Option<PathBuf>,
    pub mode: Option<ReconcilerMode>,
}

/// Validated engine parameters.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub rpc_url: String,
    pub vault: Address,
    pub liquidator: Address,
    pub oracles: Vec<Address>,
    pub from_block: u64,
    pub block_range: u64,
    /// Gas price ceiling in wei
    pub max_gas_price: u128,
    pub mode: ReconcilerMode,
    pub chunk_size: usize,
    pub claim_grace_period_secs: u64,
    pub evaluation_concurrency: usize,
}

/// Validated wallet location.
#[derive(Debug, Clone)]
pub struct KeystoreSettings {
    pub dir: PathBuf,
    pub wallet: Address,
}

impl LiquidatorConfig {
    /// Load configuration from a TOML file and expand environment variables.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Parse configuration from TOML text and expand environment variables.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        config.expand_env_vars();
        Ok(config)
    }

    /// Expand environment variables in string values.
    pub fn expand_env_vars(&mut self) {
        self.rpc.url = expand_env(&self.rpc.url);
        self.contracts.vault = expand_env(&self.contracts.vault);
        self.contracts.liquidator = expand_env(&self.contracts.liquidator);
        for oracle in &mut self.contracts.oracles {
            *oracle = expand_env(oracle);
        }
        self.keystore.wallet_address = expand_env(&self.keystore.wallet_address);
        if let Some(path) = self.keystore.path.to_str() {
            self.keystore.path = PathBuf::from(expand_env(path));
        }
    }

    /// Apply command-line overrides.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(url) = &overrides.rpc_url {
            self.rpc.url = url.clone();
        }
        if let Some(block) = overrides.from_block {
            self.backfill.from_block = block;
        }
        if let Some(gwei) = overrides.max_gas_price_gwei {
            self.gas.max_gas_price_gwei = gwei;
        }
        if let Some(wallet) = &overrides.wallet_address {
            self.keystore.wallet_address = wallet.clone();
        }
        if let Some(path) = &overrides.keystore_path {
            self.keystore.path = path.clone();
        }
        if let Some(mode) = overrides.mode {
            self.engine.mode = mode;
        }
    }

    /// Validate and convert into engine settings.
    pub fn validate(&self) -> Result<EngineSettings, ConfigError> {
        let rpc_url = self.rpc.url.trim().to_string();
        if rpc_url.is_empty() {
            return Err(invalid("rpc.url", "must not be empty"));
        }

        let vault = parse_address("contracts.vault", &self.contracts.vault)?;
        let liquidator = parse_address("contracts.liquidator", &self.contracts.liquidator)?;

        if self.contracts.oracles.is_empty() {
            return Err(invalid("contracts.oracles", "at least one oracle is required"));
        }
        let oracles = self
            .contracts
            .oracles
            .iter()
            .map(|oracle| parse_address("contracts.oracles", oracle))
            .collect::<Result<Vec<_>, _>>()?;

        let gwei = self.gas.max_gas_price_gwei;
        if !gwei.is_finite() || gwei <= 0.0 {
            return Err(invalid("gas.max_gas_price_gwei", "must be a positive number"));
        }

        if self.backfill.block_range == 0 {
            return Err(invalid("backfill.block_range", "must be at least 1"));
        }
        if self.engine.chunk_size == 0 {
            return Err(invalid("engine.chunk_size", "must be at least 1"));
        }
        if self.engine.evaluation_concurrency == 0 {
            return Err(invalid("engine.evaluation_concurrency", "must be at least 1"));
        }

        Ok(EngineSettings {
            rpc_url,
            vault,
            liquidator,
            oracles,
            from_block: self.backfill.from_block,
            block_range: self.backfill.block_range,
            max_gas_price: gwei_to_wei(gwei),
            mode: self.engine.mode,
            chunk_size: self.engine.chunk_size,
            claim_grace_period_secs: self.engine.claim_grace_period_secs,
            evaluation_concurrency: self.engine.evaluation_concurrency,
        })
    }

    /// Validate the wallet section.
    pub fn keystore_settings(&self) -> Result<KeystoreSettings, ConfigError> {
        Ok(KeystoreSettings {
            dir: self.keystore.path.clone(),
            wallet: parse_address("keystore.wallet_address", &self.keystore.wallet_address)?,
        })
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

fn parse_address(field: &'static str, value: &str) -> Result<Address, ConfigError> {
    let address = Address::from_str(value.trim()).map_err(|_| ConfigError::InvalidAddress {
        field,
        value: value.to_string(),
    })?;
    if address.is_zero() {
        return Err(ConfigError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
    Ok(address)
}
