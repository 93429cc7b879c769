//! EIP-1559 gas pricing strategy.

use super::{GasParams, GasStrategy};
use crate::error::ChainError;
use crate::provider::ChainClient;
use alloy::network::TransactionBuilder;
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;

/// EIP-1559 gas pricing strategy.
///
/// The fee cap is always the configured ceiling; the tip is the node's
/// suggestion clamped to that ceiling. The node settles the actual price at
/// base fee plus tip, never above the cap.
#[derive(Debug)]
pub struct Eip1559GasStrategy {
    /// Maximum allowed max_fee_per_gas in wei.
    max_fee_cap: u128,
}

impl Eip1559GasStrategy {
    /// Create a new EIP-1559 gas strategy with a fee ceiling in wei.
    pub fn new(max_fee_cap: u128) -> Self {
        Self { max_fee_cap }
    }

    /// Clamp a suggested priority fee to the ceiling.
    pub fn clamp_tip(&self, suggested: u128) -> u128 {
        suggested.min(self.max_fee_cap)
    }

    /// Set the fee cap and the clamped tip on the transaction.
    pub fn apply(&self, tx: &mut TransactionRequest, suggested_tip: u128) -> GasParams {
        let max_priority_fee_per_gas = self.clamp_tip(suggested_tip);
        tx.set_max_fee_per_gas(self.max_fee_cap);
        tx.set_max_priority_fee_per_gas(max_priority_fee_per_gas);
        GasParams::Eip1559 {
            max_fee_per_gas: self.max_fee_cap,
            max_priority_fee_per_gas,
        }
    }
}

#[async_trait]
impl GasStrategy for Eip1559GasStrategy {
    async fn price(
        &self,
        client: &dyn ChainClient,
        tx: &mut TransactionRequest,
    ) -> Result<GasParams, ChainError> {
        let tip = client.max_priority_fee().await?;
        Ok(self.apply(tx, tip))
    }

    fn strategy_name(&self) -> &'static str {
        "EIP-1559"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;

    #[test]
    fn test_eip1559_clamp_tip() {
        let strategy = Eip1559GasStrategy::new(100_000_000_000);

        assert_eq!(strategy.clamp_tip(2_000_000_000), 2_000_000_000);
        assert_eq!(strategy.clamp_tip(300_000_000_000), 100_000_000_000);
    }

    #[test]
    fn test_eip1559_apply() {
        let strategy = Eip1559GasStrategy::new(100_000_000_000);
        let mut tx = TransactionRequest::default().with_to(Address::ZERO);

        let params = strategy.apply(&mut tx, 2_000_000_000);

        assert_eq!(params.effective_gas_price(), 100_000_000_000);
        assert_eq!(tx.max_fee_per_gas, Some(100_000_000_000));
        assert_eq!(tx.max_priority_fee_per_gas, Some(2_000_000_000));
        assert!(tx.gas_price.is_none());
    }
}
