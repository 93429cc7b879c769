//! Event reconciliation strategies.
//!
//! A [`Reconciler`] owns the [`PositionIndex`] and runs as the single
//! listener task. Two strategies are available:
//!
//! - [`IncrementalReconciler`]: subscribes to vault lifecycle and price
//!   events, backfills history, then applies live events in order
//! - [`VaultScanReconciler`]: subscribes to price events only and rescans
//!   the vault's open positions on each update
//!
//! Both hand price-triggered passes to the same [`ActionPipeline`].

mod incremental;
mod scan;

pub use incremental::{IncrementalReconciler, DEFAULT_BLOCK_RANGE};
pub use scan::VaultScanReconciler;

use std::fmt::Debug;
use std::sync::Arc;

use alloy::rpc::types::{Filter, Log};
use async_trait::async_trait;
use futures::StreamExt;
use jpegd_chain::ChainClient;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::LiquidatorError;
use crate::evaluator::{unix_now, Evaluation, PositionEvaluator};
use crate::position_index::PositionIndex;
use crate::submitter::BatchSubmitter;

/// Fatal error sink shared by the listener and the subscription reader.
pub type ErrorSender = mpsc::Sender<LiquidatorError>;

/// A strategy that keeps the position index in sync with the chain.
#[async_trait]
pub trait Reconciler: Send + Debug {
    /// Strategy name for logging.
    fn name(&self) -> &'static str;

    /// Run until a fatal error. Never returns `Ok` while the feed is live.
    async fn run(&mut self, errors: ErrorSender) -> Result<(), LiquidatorError>;

    /// Current view of open positions.
    fn index(&self) -> &PositionIndex;
}

/// Evaluate, prune, submit.
#[derive(Debug, Clone)]
pub struct ActionPipeline {
    evaluator: PositionEvaluator,
    submitter: BatchSubmitter,
    clock: fn() -> u64,
}

impl ActionPipeline {
    pub fn new(evaluator: PositionEvaluator, submitter: BatchSubmitter) -> Self {
        Self {
            evaluator,
            submitter,
            clock: unix_now,
        }
    }

    /// Replace the wall clock (unix seconds).
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    /// Run one evaluation pass over the whole index and submit the results.
    ///
    /// Sends are dispatched, not awaited.
    pub async fn run_pass(
        &self,
        index: &mut PositionIndex,
    ) -> Result<Evaluation, LiquidatorError> {
        if index.is_empty() {
            debug!("No tracked positions, skipping evaluation");
            return Ok(Evaluation::default());
        }

        let evaluation = self.evaluator.evaluate_index(index, (self.clock)()).await?;
        self.submitter.submit(&evaluation).await?;
        Ok(evaluation)
    }
}

/// Open the live subscription and forward its logs into an unbounded buffer.
///
/// The reader task reports stream failure or termination on `errors`. It
/// exits quietly if the buffer's receiver is dropped.
pub(crate) async fn open_live_feed(
    client: &Arc<dyn ChainClient>,
    filter: &Filter,
    errors: ErrorSender,
) -> Result<(mpsc::UnboundedReceiver<Log>, JoinHandle<()>), LiquidatorError> {
    let mut stream = client.subscribe_logs(filter).await?;
    let (tx, rx) = mpsc::unbounded_channel();

    let reader = tokio::spawn(async move {
        while let Some(item) = stream.next().await {
            match item {
                Ok(log) => {
                    if tx.send(log).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Log subscription failed");
                    let _ = errors.send(e.into()).await;
                    return;
                }
            }
        }
        error!("Log subscription ended");
        let _ = errors.send(LiquidatorError::SubscriptionClosed).await;
    });

    Ok((rx, reader))
}
