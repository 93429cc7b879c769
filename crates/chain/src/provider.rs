//! Chain interface used by the keeper.
//!
//! [`ChainClient`] is the seam between the decision engine and the node.
//! [`RpcChainClient`] implements it over a single Alloy WebSocket provider,
//! which serves both request/response calls and log subscriptions.

use std::fmt::{Debug, Display};
use std::pin::Pin;

use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use serde_json::value::RawValue;
use tracing::{debug, info};

use crate::contracts::{INFTVault, PositionPreview};
use crate::error::ChainError;

/// Live log stream. The stream ending is the subscription's error signal.
pub type LogStream = Pin<Box<dyn Stream<Item = Result<Log, ChainError>> + Send>>;

/// Typed read/subscribe/send primitives against the node.
#[async_trait]
pub trait ChainClient: Send + Sync + Debug {
    /// Chain id used for transaction signing.
    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// Latest block number.
    async fn block_number(&self) -> Result<u64, ChainError>;

    /// Open a live log subscription.
    async fn subscribe_logs(&self, filter: &Filter) -> Result<LogStream, ChainError>;

    /// Historical logs matching the filter (inclusive block range).
    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, ChainError>;

    /// Current state of a vault position (`showPosition`).
    async fn show_position(&self, vault: Address, index: U256)
        -> Result<PositionPreview, ChainError>;

    /// Indices of every open vault position (`openPositionsIndexes`).
    async fn open_positions(&self, vault: Address) -> Result<Vec<U256>, ChainError>;

    /// Pending nonce of an account.
    async fn pending_nonce(&self, address: Address) -> Result<u64, ChainError>;

    /// Gas units needed to execute the transaction.
    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64, ChainError>;

    /// Suggested priority fee (tip). Fails on nodes without EIP-1559 support.
    async fn max_priority_fee(&self) -> Result<u128, ChainError>;

    /// Suggested legacy gas price.
    async fn gas_price(&self) -> Result<u128, ChainError>;

    /// Broadcast a signed transaction. Does not wait for inclusion.
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, ChainError>;
}

/// [`ChainClient`] backed by an Alloy WebSocket provider.
#[derive(Clone)]
pub struct RpcChainClient {
    /// WebSocket URL, kept for `Debug`
    url: String,
    /// Type-erased provider shared by all calls
    provider: DynProvider,
}

impl RpcChainClient {
    /// Connect to the node and verify the connection.
    pub async fn connect(url: &str) -> Result<Self, ChainError> {
        info!(url = url, "Connecting to node");

        let provider = ProviderBuilder::new()
            .on_ws(WsConnect::new(url))
            .await?
            .erased();

        let block = provider.get_block_number().await?;
        info!(block = block, "Provider connection verified");

        Ok(Self {
            url: url.to_string(),
            provider,
        })
    }
}

/// Turn one raw subscription item into a log.
///
/// A lagged receiver has already lost notifications and a payload that is
/// not a log is a node bug. Both are errors, never skipped.
fn decode_subscription_item<E: Display>(
    item: Result<Box<RawValue>, E>,
) -> Result<Log, ChainError> {
    let raw = item.map_err(|e| ChainError::SubscriptionLagged(e.to_string()))?;
    serde_json::from_str(raw.get()).map_err(ChainError::SubscriptionPayload)
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn subscribe_logs(&self, filter: &Filter) -> Result<LogStream, ChainError> {
        let sub = self.provider.subscribe_logs(filter).await?;
        info!("Log subscription established");
        let stream = sub.into_raw().into_stream().map(decode_subscription_item);
        Ok(Box::pin(stream))
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, ChainError> {
        let logs = self.provider.get_logs(filter).await?;
        debug!(count = logs.len(), "Fetched historical logs");
        Ok(logs)
    }

    async fn show_position(
        &self,
        vault: Address,
        index: U256,
    ) -> Result<PositionPreview, ChainError> {
        let contract = INFTVault::new(vault, &self.provider);
        let raw = contract.showPosition(index).call().await?._0;
        Ok(PositionPreview::from_raw(index, raw)?)
    }

    async fn open_positions(&self, vault: Address) -> Result<Vec<U256>, ChainError> {
        let contract = INFTVault::new(vault, &self.provider);
        Ok(contract.openPositionsIndexes().call().await?._0)
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, ChainError> {
        Ok(self
            .provider
            .get_transaction_count(address)
            .pending()
            .await?)
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64, ChainError> {
        Ok(self.provider.estimate_gas(tx.clone()).await?)
    }

    async fn max_priority_fee(&self) -> Result<u128, ChainError> {
        Ok(self.provider.get_max_priority_fee_per_gas().await?)
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        Ok(self.provider.get_gas_price().await?)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, ChainError> {
        let pending = self.provider.send_raw_transaction(raw).await?;
        Ok(*pending.tx_hash())
    }
}

impl Debug for RpcChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChainClient")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}
