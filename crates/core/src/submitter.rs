//! Batch submission.
//!
//! Actionable indices are split into contiguous chunks, one transaction per
//! chunk. Each chunk is priced, estimated and signed in line; the broadcast
//! itself runs on a spawned task that reports back through the outcome
//! channel. Nothing waits for inclusion.

use std::sync::Arc;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::rpc::types::TransactionRequest;
use jpegd_chain::{
    gas_limit_with_headroom, ChainClient, ChainError, GasStrategy, LiquidatorAction,
    NonceManager, TransactionSigner,
};
use smallvec::SmallVec;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::LiquidatorError;
use crate::evaluator::Evaluation;

/// Default number of positions per transaction.
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// Indices covered by one transaction.
pub type Chunk = SmallVec<[U256; DEFAULT_CHUNK_SIZE]>;

/// Split `indices` into contiguous, order-preserving chunks of at most `size`.
pub fn chunk_indices(indices: &[U256], size: usize) -> Vec<Chunk> {
    indices
        .chunks(size.max(1))
        .map(|chunk| chunk.iter().copied().collect())
        .collect()
}

/// Result of one chunk's submission.
#[derive(Debug)]
pub struct SubmissionOutcome {
    pub action: LiquidatorAction,
    pub indices: Chunk,
    /// Nonce used, `None` if the chunk never got far enough to take one
    pub nonce: Option<u64>,
    pub result: Result<B256, ChainError>,
}

/// Turns evaluations into signed, broadcast transactions.
#[derive(Debug, Clone)]
pub struct BatchSubmitter {
    client: Arc<dyn ChainClient>,
    signer: Arc<dyn TransactionSigner>,
    gas: Arc<dyn GasStrategy>,
    liquidator: Address,
    chain_id: u64,
    chunk_size: usize,
    outcomes: mpsc::UnboundedSender<SubmissionOutcome>,
}

impl BatchSubmitter {
    pub fn new(
        client: Arc<dyn ChainClient>,
        signer: Arc<dyn TransactionSigner>,
        gas: Arc<dyn GasStrategy>,
        liquidator: Address,
        chain_id: u64,
        outcomes: mpsc::UnboundedSender<SubmissionOutcome>,
    ) -> Self {
        Self {
            client,
            signer,
            gas,
            liquidator,
            chain_id,
            chunk_size: DEFAULT_CHUNK_SIZE,
            outcomes,
        }
    }

    /// Set the number of positions per transaction.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Submit liquidations, then insurance claims.
    ///
    /// Fails only if the pending nonce cannot be read. Chunks that fail to
    /// build are reported as failed outcomes and do not consume a nonce.
    #[instrument(skip_all, fields(
        liquidatable = evaluation.liquidatable.len(),
        claimable = evaluation.claimable.len()
    ))]
    pub async fn submit(
        &self,
        evaluation: &Evaluation,
    ) -> Result<Vec<JoinHandle<()>>, LiquidatorError> {
        if !evaluation.is_actionable() {
            return Ok(Vec::new());
        }

        let nonce = self
            .client
            .pending_nonce(self.signer.address())
            .await
            .map_err(LiquidatorError::Submission)?;
        let nonces = NonceManager::new(nonce);

        let batches = [
            (LiquidatorAction::Liquidate, &evaluation.liquidatable),
            (LiquidatorAction::ClaimExpiredInsurance, &evaluation.claimable),
        ];

        let mut dispatched = Vec::new();
        for (action, indices) in batches {
            for chunk in chunk_indices(indices, self.chunk_size) {
                if let Some(handle) = self.submit_chunk(action, chunk, &nonces).await {
                    dispatched.push(handle);
                }
            }
        }

        info!(
            transactions = dispatched.len(),
            next_nonce = nonces.current(),
            "Submission pass complete"
        );

        Ok(dispatched)
    }

    async fn submit_chunk(
        &self,
        action: LiquidatorAction,
        chunk: Chunk,
        nonces: &NonceManager,
    ) -> Option<JoinHandle<()>> {
        let nonce = nonces.current();

        let raw = match self.build_signed(action, &chunk, nonce).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    action = %action,
                    positions = chunk.len(),
                    error = %e,
                    "Failed to prepare transaction, skipping chunk"
                );
                self.report(SubmissionOutcome {
                    action,
                    indices: chunk,
                    nonce: None,
                    result: Err(e),
                });
                return None;
            }
        };
        nonces.next();

        debug!(
            action = %action,
            positions = chunk.len(),
            nonce = nonce,
            "Dispatching transaction"
        );

        let client = Arc::clone(&self.client);
        let outcomes = self.outcomes.clone();
        Some(tokio::spawn(async move {
            let result = client.send_raw_transaction(&raw).await;
            let _ = outcomes.send(SubmissionOutcome {
                action,
                indices: chunk,
                nonce: Some(nonce),
                result,
            });
        }))
    }

    async fn build_signed(
        &self,
        action: LiquidatorAction,
        chunk: &[U256],
        nonce: u64,
    ) -> Result<Bytes, ChainError> {
        let mut tx = TransactionRequest::default()
            .with_from(self.signer.address())
            .with_to(self.liquidator)
            .with_input(action.encode(chunk))
            .with_nonce(nonce)
            .with_chain_id(self.chain_id);

        let params = self.gas.price(self.client.as_ref(), &mut tx).await?;

        let estimate = self.client.estimate_gas(&tx).await?;
        let gas_limit = gas_limit_with_headroom(estimate);
        tx.set_gas_limit(gas_limit);

        debug!(
            action = %action,
            estimate = estimate,
            gas_limit = gas_limit,
            gas_price_gwei = params.effective_gas_price() / 1_000_000_000,
            "Transaction priced"
        );

        self.signer.sign(tx).await
    }

    fn report(&self, outcome: SubmissionOutcome) {
        // Receiver gone means the orchestrator is shutting down
        let _ = self.outcomes.send(outcome);
    }
}
