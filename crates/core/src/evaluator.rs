//! Position evaluation.
//!
//! Fetches fresh on-chain state for every tracked index and sorts each
//! position into exactly one bucket:
//!
//! - **Closed**: the vault no longer holds it (stale index entry)
//! - **Liquidatable**: the vault reports it below the liquidation limit
//! - **Claimable**: liquidated while insured, repurchase window elapsed
//! - **Inert**: nothing to do
//!
//! Fetches run with bounded concurrency, results keep input order, and the
//! first failed fetch aborts the pass.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use futures::stream::{self, StreamExt, TryStreamExt};
use jpegd_chain::{ChainClient, PositionPreview};
use tracing::{debug, info, instrument};

use crate::error::LiquidatorError;
use crate::position_index::PositionIndex;

/// Repurchase window after an insured liquidation (3 days).
pub const DEFAULT_CLAIM_GRACE_PERIOD_SECS: u64 = 259_200;

/// Default number of concurrent `showPosition` calls.
pub const DEFAULT_EVALUATION_CONCURRENCY: usize = 8;

/// What to do with one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Closed,
    Liquidatable,
    Claimable,
    Inert,
}

/// Classify a position at time `now` (unix seconds).
///
/// Claimable requires strictly more than `grace_period` seconds since
/// liquidation.
pub fn classify(preview: &PositionPreview, now: u64, grace_period: u64) -> Classification {
    if preview.borrow_type.is_closed() {
        Classification::Closed
    } else if preview.liquidatable {
        Classification::Liquidatable
    } else if preview.liquidated_at > 0 && now.saturating_sub(preview.liquidated_at) > grace_period
    {
        Classification::Claimable
    } else {
        Classification::Inert
    }
}

/// Result of one evaluation pass, in index order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    pub liquidatable: Vec<U256>,
    pub claimable: Vec<U256>,
    /// Indices found closed on-chain
    pub closed: Vec<U256>,
}

impl Evaluation {
    /// Whether anything needs a transaction.
    pub fn is_actionable(&self) -> bool {
        !self.liquidatable.is_empty() || !self.claimable.is_empty()
    }
}

/// Classifies tracked positions against fresh vault state.
#[derive(Debug, Clone)]
pub struct PositionEvaluator {
    client: Arc<dyn ChainClient>,
    vault: Address,
    grace_period: u64,
    concurrency: usize,
}

impl PositionEvaluator {
    pub fn new(client: Arc<dyn ChainClient>, vault: Address) -> Self {
        Self {
            client,
            vault,
            grace_period: DEFAULT_CLAIM_GRACE_PERIOD_SECS,
            concurrency: DEFAULT_EVALUATION_CONCURRENCY,
        }
    }

    /// Set the insurance repurchase window in seconds.
    pub fn grace_period(mut self, secs: u64) -> Self {
        self.grace_period = secs;
        self
    }

    /// Set the maximum number of in-flight fetches.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Fetch and classify `indices`.
    #[instrument(skip(self, indices), fields(count = indices.len()))]
    pub async fn evaluate(
        &self,
        indices: &[U256],
        now: u64,
    ) -> Result<Evaluation, LiquidatorError> {
        let client = &self.client;
        let vault = self.vault;

        let previews: Vec<PositionPreview> = stream::iter(indices.iter().copied())
            .map(|index| async move {
                client
                    .show_position(vault, index)
                    .await
                    .map_err(|source| LiquidatorError::Evaluation { index, source })
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let mut evaluation = Evaluation::default();
        for preview in &previews {
            match classify(preview, now, self.grace_period) {
                Classification::Closed => evaluation.closed.push(preview.index),
                Classification::Liquidatable => evaluation.liquidatable.push(preview.index),
                Classification::Claimable => evaluation.claimable.push(preview.index),
                Classification::Inert => {}
            }
        }

        info!(
            evaluated = previews.len(),
            liquidatable = evaluation.liquidatable.len(),
            claimable = evaluation.claimable.len(),
            closed = evaluation.closed.len(),
            "Evaluation pass complete"
        );

        Ok(evaluation)
    }

    /// Evaluate every tracked index and drop the ones found closed.
    pub async fn evaluate_index(
        &self,
        index: &mut PositionIndex,
        now: u64,
    ) -> Result<Evaluation, LiquidatorError> {
        let evaluation = self.evaluate(&index.snapshot(), now).await?;

        for stale in &evaluation.closed {
            if index.remove(stale) {
                debug!(index = %stale, "Pruned closed position");
            }
        }

        Ok(evaluation)
    }
}

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{preview, MockChainClient, VAULT};
    use jpegd_chain::BorrowType;

    const NOW: u64 = 1_700_000_000;

    #[test]
    fn test_claim_grace_boundary() {
        let grace = DEFAULT_CLAIM_GRACE_PERIOD_SECS;

        let exactly = preview(U256::from(1), BorrowType::UseInsurance, false, NOW - 259_200);
        assert_eq!(classify(&exactly, NOW, grace), Classification::Inert);

        let past = preview(U256::from(1), BorrowType::UseInsurance, false, NOW - 259_201);
        assert_eq!(classify(&past, NOW, grace), Classification::Claimable);
    }

    #[test]
    fn test_classify_precedence() {
        // Liquidatable wins over an expired liquidation timestamp
        let both = preview(U256::from(1), BorrowType::NonInsurance, true, 1);
        assert_eq!(classify(&both, NOW, 259_200), Classification::Liquidatable);

        // Closed wins over everything
        let closed = preview(U256::from(1), BorrowType::NotConfirmed, true, 1);
        assert_eq!(classify(&closed, NOW, 259_200), Classification::Closed);

        let healthy = preview(U256::from(1), BorrowType::NonInsurance, false, 0);
        assert_eq!(classify(&healthy, NOW, 259_200), Classification::Inert);
    }

    #[test]
    fn test_liquidated_in_future_not_claimable() {
        // Clock skew: liquidatedAt ahead of local time
        let skewed = preview(U256::from(1), BorrowType::UseInsurance, false, NOW + 60);
        assert_eq!(classify(&skewed, NOW, 259_200), Classification::Inert);
    }

    #[tokio::test]
    async fn test_evaluate_buckets_are_exclusive() {
        let expired = NOW - 300_000;
        let client = Arc::new(
            MockChainClient::new()
                .with_position(preview(U256::from(1), BorrowType::NonInsurance, true, 0))
                .with_position(preview(U256::from(2), BorrowType::UseInsurance, false, expired))
                .with_position(preview(U256::from(3), BorrowType::NonInsurance, false, 0))
                .with_position(preview(U256::from(4), BorrowType::UseInsurance, true, expired)),
        );
        let evaluator = PositionEvaluator::new(client, VAULT).concurrency(2);

        let indices: Vec<U256> = (1..=5u64).map(U256::from).collect();
        let evaluation = evaluator.evaluate(&indices, NOW).await.unwrap();

        assert_eq!(evaluation.liquidatable, vec![U256::from(1), U256::from(4)]);
        assert_eq!(evaluation.claimable, vec![U256::from(2)]);
        // Unknown to the mock vault, reads back as closed
        assert_eq!(evaluation.closed, vec![U256::from(5)]);

        for index in &evaluation.liquidatable {
            assert!(!evaluation.claimable.contains(index));
        }
    }

    #[tokio::test]
    async fn test_evaluate_index_prunes_closed() {
        let client = Arc::new(
            MockChainClient::new()
                .with_position(preview(U256::from(1), BorrowType::NonInsurance, false, 0)),
        );
        let evaluator = PositionEvaluator::new(client, VAULT);

        let mut index: PositionIndex = [1u64, 2].into_iter().map(U256::from).collect();
        let evaluation = evaluator.evaluate_index(&mut index, NOW).await.unwrap();

        assert!(!evaluation.is_actionable());
        assert_eq!(index.snapshot(), vec![U256::from(1)]);
    }

    #[tokio::test]
    async fn test_evaluate_fails_fast() {
        let client = Arc::new(
            MockChainClient::new()
                .with_position(preview(U256::from(1), BorrowType::NonInsurance, true, 0))
                .failing_show_position(U256::from(2)),
        );
        let evaluator = PositionEvaluator::new(client, VAULT);

        let mut index: PositionIndex = [1u64, 2, 3].into_iter().map(U256::from).collect();
        let result = evaluator.evaluate_index(&mut index, NOW).await;

        match result {
            Err(LiquidatorError::Evaluation { index: failed, .. }) => {
                assert_eq!(failed, U256::from(2))
            }
            other => panic!("expected evaluation error, got {other:?}"),
        }
        // Nothing pruned on a failed pass
        assert_eq!(index.len(), 3);
    }
}
