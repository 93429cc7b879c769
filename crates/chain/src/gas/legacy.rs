//! Legacy gas pricing strategy (pre-EIP-1559).

use super::{GasParams, GasStrategy};
use crate::error::ChainError;
use crate::provider::ChainClient;
use alloy::network::TransactionBuilder;
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;

/// Legacy gas pricing strategy.
///
/// Uses the node's suggested gas price, clamped to the ceiling.
#[derive(Debug)]
pub struct LegacyGasStrategy {
    /// Maximum gas price in wei.
    max_gas_price: u128,
}

impl LegacyGasStrategy {
    /// Create a new Legacy gas strategy with a gas price ceiling in wei.
    pub fn new(max_gas_price: u128) -> Self {
        Self { max_gas_price }
    }

    /// Clamp a suggested gas price to the ceiling.
    pub fn clamp(&self, suggested: u128) -> u128 {
        suggested.min(self.max_gas_price)
    }

    /// Set the clamped suggestion as the transaction's gas price.
    pub fn apply(&self, tx: &mut TransactionRequest, suggested: u128) -> GasParams {
        let gas_price = self.clamp(suggested);
        tx.set_gas_price(gas_price);
        GasParams::Legacy { gas_price }
    }
}

#[async_trait]
impl GasStrategy for LegacyGasStrategy {
    async fn price(
        &self,
        client: &dyn ChainClient,
        tx: &mut TransactionRequest,
    ) -> Result<GasParams, ChainError> {
        let suggested = client.gas_price().await?;
        Ok(self.apply(tx, suggested))
    }

    fn strategy_name(&self) -> &'static str {
        "Legacy"
    }
}
