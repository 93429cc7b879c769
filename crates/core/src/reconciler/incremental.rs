//! Incremental reconciliation: backfill plus live lifecycle events.
//!
//! Startup order matters. The live subscription is opened first and its
//! logs buffered, then history up to the current head is fetched and
//! applied in chain order, then the buffer is drained. A buffered lifecycle
//! log at or below the last backfilled `(block, logIndex)` was already
//! covered by the backfill and is skipped. Live logs never move that mark,
//! so a log replayed on a new branch after a reorg is still applied.

use std::sync::Arc;

use alloy::primitives::Address;
use alloy::rpc::types::Log;
use async_trait::async_trait;
use jpegd_chain::{ChainClient, DecodedEvent, EventRegistry, LogPosition, VaultEvent};
use tracing::{debug, info, instrument, warn};

use super::{open_live_feed, ActionPipeline, ErrorSender, Reconciler};
use crate::error::LiquidatorError;
use crate::position_index::PositionIndex;

/// Default number of blocks per historical log query.
pub const DEFAULT_BLOCK_RANGE: u64 = 10_000;

/// Event-driven reconciler with historical backfill.
#[derive(Debug)]
pub struct IncrementalReconciler {
    client: Arc<dyn ChainClient>,
    registry: Arc<EventRegistry>,
    pipeline: ActionPipeline,
    index: PositionIndex,
    from_block: u64,
    block_range: u64,
    /// Last lifecycle log applied by the backfill
    watermark: Option<LogPosition>,
}

impl IncrementalReconciler {
    pub fn new(
        client: Arc<dyn ChainClient>,
        registry: Arc<EventRegistry>,
        pipeline: ActionPipeline,
        from_block: u64,
    ) -> Self {
        Self {
            client,
            registry,
            pipeline,
            index: PositionIndex::new(),
            from_block,
            block_range: DEFAULT_BLOCK_RANGE,
            watermark: None,
        }
    }

    /// Set the number of blocks per historical query.
    pub fn block_range(mut self, blocks: u64) -> Self {
        self.block_range = blocks.max(1);
        self
    }

    fn vault(&self) -> Address {
        self.registry.vault()
    }

    /// Fetch and apply lifecycle history from `from_block` through `head`.
    #[instrument(skip(self), fields(from = self.from_block))]
    async fn backfill(&mut self, head: u64) -> Result<usize, LiquidatorError> {
        let mut events = Vec::new();
        let mut start = self.from_block;

        while start <= head {
            let end = start.saturating_add(self.block_range - 1).min(head);
            let filter = self
                .registry
                .lifecycle_filter()
                .from_block(start)
                .to_block(end);

            let logs = self.client.get_logs(&filter).await?;
            debug!(from = start, to = end, logs = logs.len(), "Fetched history page");

            for log in &logs {
                events.push(self.registry.decode(log)?);
            }

            start = match end.checked_add(1) {
                Some(next) => next,
                None => break,
            };
        }

        events.sort_by_key(|event| event.position);
        let last = events.last().and_then(|event| event.position);

        let count = events.len();
        for event in events {
            self.apply(event).await?;
        }
        self.watermark = self.watermark.max(last);

        info!(
            events = count,
            head = head,
            open_positions = self.index.len(),
            "Backfill complete"
        );

        Ok(count)
    }

    async fn apply_log(&mut self, log: &Log) -> Result<(), LiquidatorError> {
        let event = self.registry.decode(log)?;
        self.apply(event).await
    }

    /// Apply one decoded event. Idempotent for lifecycle events.
    async fn apply(&mut self, decoded: DecodedEvent) -> Result<(), LiquidatorError> {
        let kind = decoded.event.kind();

        if decoded.removed {
            warn!(
                event = kind.name(),
                index = ?decoded.event.position_index(),
                tx_hash = ?decoded.tx_hash,
                "Skipping log removed by reorg"
            );
            return Ok(());
        }

        if kind.is_lifecycle() {
            if let (Some(position), Some(mark)) = (decoded.position, self.watermark) {
                if position <= mark {
                    debug!(
                        event = kind.name(),
                        block = position.block_number,
                        log_index = position.log_index,
                        "Skipping event already covered by backfill"
                    );
                    return Ok(());
                }
            }
        }

        match decoded.event {
            VaultEvent::PositionOpened { index } => {
                if self.index.insert(index) {
                    debug!(index = %index, "Position opened");
                }
            }
            VaultEvent::PositionClosed { index }
            | VaultEvent::Repurchased { index }
            | VaultEvent::InsuranceExpired { index } => {
                if self.index.remove(&index) {
                    debug!(index = %index, event = kind.name(), "Position removed");
                }
            }
            VaultEvent::Liquidated { index, insured } => {
                let preview = self.client.show_position(self.vault(), index).await?;
                if preview.borrow_type.is_insured() {
                    debug!(index = %index, "Insured position liquidated, keeping for claim");
                } else if self.index.remove(&index) {
                    debug!(index = %index, insured = insured, "Liquidated position removed");
                }
            }
            VaultEvent::AnswerUpdated { oracle, round_id, .. } => {
                info!(
                    oracle = %oracle,
                    round = %round_id,
                    positions = self.index.len(),
                    "Price updated, evaluating positions"
                );
                self.pipeline.run_pass(&mut self.index).await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Reconciler for IncrementalReconciler {
    fn name(&self) -> &'static str {
        "incremental"
    }

    #[instrument(skip_all, fields(vault = %self.vault()))]
    async fn run(&mut self, errors: ErrorSender) -> Result<(), LiquidatorError> {
        let (mut live, _reader) =
            open_live_feed(&self.client, &self.registry.live_filter(), errors).await?;

        let head = self.client.block_number().await?;
        info!(from = self.from_block, head = head, "Starting backfill");
        self.backfill(head).await?;

        while let Some(log) = live.recv().await {
            self.apply_log(&log).await?;
        }

        Err(LiquidatorError::SubscriptionClosed)
    }

    fn index(&self) -> &PositionIndex {
        &self.index
    }
}
