//! Gas pricing strategies.
//!
//! Networks either support the EIP-1559 fee market (base fee plus a capped
//! tip) or only a legacy single gas price. The model is probed once at
//! startup with [`detect_gas_strategy`]; every transaction then asks the
//! selected strategy for fresh, ceiling-clamped parameters.
//!
//! # Example
//!
//! ```rust,ignore
//! use jpegd_chain::gas::{detect_gas_strategy, gas_limit_with_headroom};
//!
//! let strategy = detect_gas_strategy(client.as_ref(), max_gas_price).await;
//! let params = strategy.price(client.as_ref(), &mut tx).await?;
//! tx.set_gas_limit(gas_limit_with_headroom(estimate));
//! ```

mod eip1559;
mod legacy;

pub use eip1559::Eip1559GasStrategy;
pub use legacy::LegacyGasStrategy;

use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use std::fmt::Debug;
use tracing::info;

use crate::error::ChainError;
use crate::provider::ChainClient;

/// Gas parameters for one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GasParams {
    /// Legacy gas pricing (pre-EIP-1559).
    Legacy {
        /// Gas price in wei.
        gas_price: u128,
    },
    /// EIP-1559 gas pricing.
    Eip1559 {
        /// Maximum fee per gas in wei.
        max_fee_per_gas: u128,
        /// Maximum priority fee per gas in wei.
        max_priority_fee_per_gas: u128,
    },
}

impl GasParams {
    /// Highest price per gas the transaction may pay.
    pub fn effective_gas_price(&self) -> u128 {
        match self {
            GasParams::Legacy { gas_price } => *gas_price,
            GasParams::Eip1559 {
                max_fee_per_gas, ..
            } => *max_fee_per_gas,
        }
    }
}

/// Trait for gas pricing strategies.
#[async_trait]
pub trait GasStrategy: Send + Sync + Debug {
    /// Fetch the node's suggestion, clamp it to the configured ceiling and
    /// set it on the transaction. Returns what was applied.
    async fn price(
        &self,
        client: &dyn ChainClient,
        tx: &mut TransactionRequest,
    ) -> Result<GasParams, ChainError>;

    /// Get the strategy name for logging/debugging.
    fn strategy_name(&self) -> &'static str;
}

/// Probe the node for EIP-1559 support and pick a strategy.
///
/// A failing priority-fee suggestion means the network only prices gas the
/// legacy way.
pub async fn detect_gas_strategy(
    client: &dyn ChainClient,
    max_gas_price: u128,
) -> Box<dyn GasStrategy> {
    let strategy: Box<dyn GasStrategy> = match client.max_priority_fee().await {
        Ok(_) => Box::new(Eip1559GasStrategy::new(max_gas_price)),
        Err(e) => {
            info!(error = %e, "Priority fee suggestion unavailable, using legacy gas pricing");
            Box::new(LegacyGasStrategy::new(max_gas_price))
        }
    };

    info!(
        strategy = strategy.strategy_name(),
        max_gas_price_gwei = max_gas_price / 1_000_000_000,
        "Gas strategy selected"
    );

    strategy
}

/// Gas limit with 20% headroom over the estimate, rounded down.
pub fn gas_limit_with_headroom(estimate: u64) -> u64 {
    let limit = u128::from(estimate) * 12 / 10;
    u64::try_from(limit).unwrap_or(u64::MAX)
}

/// Convert a gwei amount (possibly fractional) to wei.
pub fn gwei_to_wei(gwei: f64) -> u128 {
    (gwei * 1e9).round() as u128
}
