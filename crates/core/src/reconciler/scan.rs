//! Full-vault scan: on every price update, ask the vault which positions are
//! open and evaluate all of them. No history is replayed.

use std::sync::Arc;

use async_trait::async_trait;
use jpegd_chain::{ChainClient, EventRegistry, VaultEvent};
use tracing::{debug, info, instrument, warn};

use super::{open_live_feed, ActionPipeline, ErrorSender, Reconciler};
use crate::error::LiquidatorError;
use crate::position_index::PositionIndex;

/// Reconciler that trusts the vault's own open-position list.
#[derive(Debug)]
pub struct VaultScanReconciler {
    client: Arc<dyn ChainClient>,
    registry: Arc<EventRegistry>,
    pipeline: ActionPipeline,
    index: PositionIndex,
}

impl VaultScanReconciler {
    pub fn new(
        client: Arc<dyn ChainClient>,
        registry: Arc<EventRegistry>,
        pipeline: ActionPipeline,
    ) -> Self {
        Self {
            client,
            registry,
            pipeline,
            index: PositionIndex::new(),
        }
    }

    async fn scan(&mut self) -> Result<(), LiquidatorError> {
        let open = self.client.open_positions(self.registry.vault()).await?;
        debug!(open_positions = open.len(), "Vault scanned");

        self.index.replace_all(open);
        self.pipeline.run_pass(&mut self.index).await?;
        Ok(())
    }
}

#[async_trait]
impl Reconciler for VaultScanReconciler {
    fn name(&self) -> &'static str {
        "scan"
    }

    #[instrument(skip_all, fields(vault = %self.registry.vault()))]
    async fn run(&mut self, errors: ErrorSender) -> Result<(), LiquidatorError> {
        let (mut live, _reader) =
            open_live_feed(&self.client, &self.registry.price_filter(), errors).await?;
        info!(oracles = self.registry.oracles().len(), "Waiting for price updates");

        while let Some(log) = live.recv().await {
            let decoded = self.registry.decode(&log)?;
            if decoded.removed {
                warn!(tx_hash = ?decoded.tx_hash, "Skipping log removed by reorg");
                continue;
            }

            if let VaultEvent::AnswerUpdated { oracle, round_id, .. } = decoded.event {
                info!(oracle = %oracle, round = %round_id, "Price updated, scanning vault");
                self.scan().await?;
            }
        }

        Err(LiquidatorError::SubscriptionClosed)
    }

    fn index(&self) -> &PositionIndex {
        &self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::PositionEvaluator;
    use crate::submitter::BatchSubmitter;
    use crate::testing::*;
    use alloy::primitives::U256;
    use jpegd_chain::{BorrowType, Eip1559GasStrategy, GasStrategy};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_scan_on_each_price_update() {
        let client = Arc::new(
            MockChainClient::new()
                .with_open_positions(vec![U256::from(3), U256::from(4)])
                .with_position(preview(U256::from(3), BorrowType::NonInsurance, true, 0))
                .with_position(preview(U256::from(4), BorrowType::NonInsurance, false, 0)),
        );
        let live = client.live_feed();
        live.send(Ok(answer_updated(10, 0))).unwrap();
        live.send(Ok(answer_updated(11, 0))).unwrap();
        drop(live);

        let dyn_client: Arc<dyn ChainClient> = client.clone();
        let gas: Arc<dyn GasStrategy> = Arc::new(Eip1559GasStrategy::new(10_000_000_000));
        let (outcomes_tx, mut outcomes) = mpsc::unbounded_channel();
        let signer = RecordingSigner::new();
        let submitter = BatchSubmitter::new(
            dyn_client.clone(),
            signer.clone(),
            gas,
            LIQUIDATOR,
            1,
            outcomes_tx,
        );
        let evaluator = PositionEvaluator::new(dyn_client.clone(), VAULT);
        let pipeline = ActionPipeline::new(evaluator, submitter);
        let registry = Arc::new(EventRegistry::new(VAULT, [ORACLE]));

        let mut reconciler = VaultScanReconciler::new(dyn_client, registry, pipeline);
        let (errors, _errors_rx) = mpsc::channel(4);
        let result = reconciler.run(errors).await;

        assert!(matches!(result, Err(LiquidatorError::SubscriptionClosed)));
        assert_eq!(client.open_positions_calls(), 2);
        assert_eq!(reconciler.index().len(), 2);

        // One liquidation per scan
        assert_eq!(signer.signed().len(), 2);
        let first = outcomes.recv().await.unwrap();
        assert_eq!(first.indices.as_slice(), &[U256::from(3)]);
    }
}
