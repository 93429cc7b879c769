//! Keeper lifecycle.
//!
//! Builds the engine from validated settings, runs the reconciler as the
//! single listener task, and waits on whichever comes first: a fatal error,
//! the listener exiting, or shutdown. Submission outcomes are logged as
//! they arrive. There is no restart; a fatal error ends [`Orchestrator::run`].

use std::future::Future;
use std::sync::Arc;

use jpegd_chain::{detect_gas_strategy, ChainClient, EventRegistry, GasStrategy, TransactionSigner};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::{EngineSettings, ReconcilerMode};
use crate::error::LiquidatorError;
use crate::evaluator::PositionEvaluator;
use crate::reconciler::{
    ActionPipeline, IncrementalReconciler, Reconciler, VaultScanReconciler,
};
use crate::submitter::{BatchSubmitter, SubmissionOutcome};

/// Capacity of the fatal error channel.
const ERROR_CHANNEL_CAPACITY: usize = 8;

/// Owns startup, the listener task and termination.
#[derive(Debug)]
pub struct Orchestrator {
    settings: EngineSettings,
    client: Arc<dyn ChainClient>,
    signer: Arc<dyn TransactionSigner>,
}

impl Orchestrator {
    pub fn new(
        settings: EngineSettings,
        client: Arc<dyn ChainClient>,
        signer: Arc<dyn TransactionSigner>,
    ) -> Self {
        Self {
            settings,
            client,
            signer,
        }
    }

    /// Query the chain id, pick a gas strategy and assemble the reconciler.
    pub async fn build_reconciler(
        &self,
        outcomes: mpsc::UnboundedSender<SubmissionOutcome>,
    ) -> Result<Box<dyn Reconciler>, LiquidatorError> {
        let settings = &self.settings;

        let chain_id = self.client.chain_id().await?;
        let gas: Arc<dyn GasStrategy> =
            Arc::from(detect_gas_strategy(self.client.as_ref(), settings.max_gas_price).await);

        let registry = Arc::new(EventRegistry::new(
            settings.vault,
            settings.oracles.iter().copied(),
        ));

        let evaluator = PositionEvaluator::new(Arc::clone(&self.client), settings.vault)
            .grace_period(settings.claim_grace_period_secs)
            .concurrency(settings.evaluation_concurrency);
        let submitter = BatchSubmitter::new(
            Arc::clone(&self.client),
            Arc::clone(&self.signer),
            gas,
            settings.liquidator,
            chain_id,
            outcomes,
        )
        .chunk_size(settings.chunk_size);
        let pipeline = ActionPipeline::new(evaluator, submitter);

        let reconciler: Box<dyn Reconciler> = match settings.mode {
            ReconcilerMode::Incremental => Box::new(
                IncrementalReconciler::new(
                    Arc::clone(&self.client),
                    registry,
                    pipeline,
                    settings.from_block,
                )
                .block_range(settings.block_range),
            ),
            ReconcilerMode::Scan => Box::new(VaultScanReconciler::new(
                Arc::clone(&self.client),
                registry,
                pipeline,
            )),
        };

        info!(
            chain_id = chain_id,
            mode = reconciler.name(),
            vault = %settings.vault,
            liquidator = %settings.liquidator,
            oracles = settings.oracles.len(),
            keeper = %self.signer.address(),
            "Engine assembled"
        );

        Ok(reconciler)
    }

    /// Run until a fatal error or Ctrl-C.
    pub async fn run(self) -> Result<(), LiquidatorError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until a fatal error or `shutdown` completes.
    ///
    /// Sends already dispatched are not awaited on shutdown.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), LiquidatorError>
    where
        F: Future<Output = ()>,
    {
        let (errors_tx, mut errors_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
        let (outcomes_tx, mut outcomes_rx) = mpsc::unbounded_channel();

        let mut reconciler = self.build_reconciler(outcomes_tx).await?;

        let listener_errors = errors_tx.clone();
        let mut listener = tokio::spawn(async move {
            if let Err(e) = reconciler.run(listener_errors.clone()).await {
                let _ = listener_errors.send(e).await;
            }
        });

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                Some(err) = errors_rx.recv() => {
                    error!(error = %err, "Fatal error, stopping");
                    listener.abort();
                    return Err(err);
                }
                Some(outcome) = outcomes_rx.recv() => {
                    log_outcome(&outcome);
                }
                joined = &mut listener => {
                    // The listener reports its error before finishing
                    if let Ok(err) = errors_rx.try_recv() {
                        error!(error = %err, "Fatal error, stopping");
                        return Err(err);
                    }
                    let reason = match joined {
                        Ok(()) => "finished without error".to_string(),
                        Err(e) => e.to_string(),
                    };
                    return Err(LiquidatorError::ListenerExited(reason));
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    listener.abort();
                    return Ok(());
                }
            }
        }
    }
}

fn log_outcome(outcome: &SubmissionOutcome) {
    match &outcome.result {
        Ok(tx_hash) => info!(
            action = %outcome.action,
            positions = ?outcome.indices.as_slice(),
            nonce = ?outcome.nonce,
            tx_hash = %tx_hash,
            "Transaction sent"
        ),
        Err(e) => error!(
            action = %outcome.action,
            positions = ?outcome.indices.as_slice(),
            nonce = ?outcome.nonce,
            error = %e,
            "Transaction failed"
        ),
    }
}
