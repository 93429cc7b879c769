//! In-memory chain and signer doubles for engine tests.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, LogData, B256, U256};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use futures::stream;
use jpegd_chain::{
    BorrowType, ChainClient, ChainError, IAggregator, INFTVault, LogStream, PositionPreview,
    TransactionSigner,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;

pub const VAULT: Address = Address::repeat_byte(0xaa);
pub const LIQUIDATOR: Address = Address::repeat_byte(0xbb);
pub const ORACLE: Address = Address::repeat_byte(0xcc);
pub const KEEPER: Address = Address::repeat_byte(0xdd);

/// Scriptable [`ChainClient`].
#[derive(Debug)]
pub struct MockChainClient {
    state: Mutex<MockState>,
}

#[derive(Debug)]
struct MockState {
    chain_id: u64,
    head: u64,
    history: Vec<Log>,
    positions: HashMap<U256, PositionPreview>,
    open_positions: Vec<U256>,
    nonce: u64,
    tip: Option<u128>,
    gas_price: u128,
    gas_estimate: u64,
    fail_show_position: Option<U256>,
    fail_nonce: bool,
    fail_estimate_at: Option<usize>,
    fail_send: bool,
    live: Option<mpsc::UnboundedReceiver<Result<Log, ChainError>>>,
    // Recorded calls
    show_position_calls: Vec<U256>,
    open_positions_calls: usize,
    log_ranges: Vec<(u64, u64)>,
    estimate_calls: usize,
    sent: Vec<Bytes>,
}

impl Default for MockChainClient {
    fn default() -> Self {
        Self {
            state: Mutex::new(MockState {
                chain_id: 1,
                head: 0,
                history: Vec::new(),
                positions: HashMap::new(),
                open_positions: Vec::new(),
                nonce: 0,
                tip: Some(2_000_000_000),
                gas_price: 20_000_000_000,
                gas_estimate: 100_000,
                fail_show_position: None,
                fail_nonce: false,
                fail_estimate_at: None,
                fail_send: false,
                live: None,
                show_position_calls: Vec::new(),
                open_positions_calls: 0,
                log_ranges: Vec::new(),
                estimate_calls: 0,
                sent: Vec::new(),
            }),
        }
    }
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_head(self, head: u64) -> Self {
        self.state.lock().head = head;
        self
    }

    pub fn with_history(self, logs: Vec<Log>) -> Self {
        self.state.lock().history = logs;
        self
    }

    pub fn with_position(self, preview: PositionPreview) -> Self {
        self.state.lock().positions.insert(preview.index, preview);
        self
    }

    pub fn with_open_positions(self, indices: Vec<U256>) -> Self {
        self.state.lock().open_positions = indices;
        self
    }

    pub fn with_nonce(self, nonce: u64) -> Self {
        self.state.lock().nonce = nonce;
        self
    }

    /// `None` makes the node look legacy-only.
    pub fn with_tip(self, tip: Option<u128>) -> Self {
        self.state.lock().tip = tip;
        self
    }

    pub fn with_gas_price(self, gas_price: u128) -> Self {
        self.state.lock().gas_price = gas_price;
        self
    }

    pub fn with_gas_estimate(self, estimate: u64) -> Self {
        self.state.lock().gas_estimate = estimate;
        self
    }

    pub fn failing_show_position(self, index: U256) -> Self {
        self.state.lock().fail_show_position = Some(index);
        self
    }

    pub fn failing_nonce(self) -> Self {
        self.state.lock().fail_nonce = true;
        self
    }

    /// Fail the n-th (0-based) gas estimate.
    pub fn failing_estimate_at(self, call: usize) -> Self {
        self.state.lock().fail_estimate_at = Some(call);
        self
    }

    pub fn failing_send(self) -> Self {
        self.state.lock().fail_send = true;
        self
    }

    /// Attach a live feed. Dropping the returned sender ends the subscription.
    pub fn live_feed(&self) -> mpsc::UnboundedSender<Result<Log, ChainError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().live = Some(rx);
        tx
    }

    pub fn show_position_calls(&self) -> Vec<U256> {
        self.state.lock().show_position_calls.clone()
    }

    pub fn open_positions_calls(&self) -> usize {
        self.state.lock().open_positions_calls
    }

    pub fn log_ranges(&self) -> Vec<(u64, u64)> {
        self.state.lock().log_ranges.clone()
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.state.lock().sent.clone()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.state.lock().chain_id)
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(self.state.lock().head)
    }

    async fn subscribe_logs(&self, _filter: &Filter) -> Result<LogStream, ChainError> {
        let rx = self
            .state
            .lock()
            .live
            .take()
            .ok_or(ChainError::SubscriptionClosed)?;
        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(Box::pin(stream))
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, ChainError> {
        let mut state = self.state.lock();
        let from = filter.get_from_block().unwrap_or(0);
        let to = filter.get_to_block().unwrap_or(u64::MAX);
        state.log_ranges.push((from, to));
        Ok(state
            .history
            .iter()
            .filter(|log| {
                log.block_number
                    .map(|block| block >= from && block <= to)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn show_position(
        &self,
        _vault: Address,
        index: U256,
    ) -> Result<PositionPreview, ChainError> {
        let mut state = self.state.lock();
        state.show_position_calls.push(index);
        if state.fail_show_position == Some(index) {
            return Err(ChainError::Unsupported(format!("showPosition({index}) reverted")));
        }
        Ok(state
            .positions
            .get(&index)
            .cloned()
            .unwrap_or_else(|| preview(index, BorrowType::NotConfirmed, false, 0)))
    }

    async fn open_positions(&self, _vault: Address) -> Result<Vec<U256>, ChainError> {
        let mut state = self.state.lock();
        state.open_positions_calls += 1;
        Ok(state.open_positions.clone())
    }

    async fn pending_nonce(&self, _address: Address) -> Result<u64, ChainError> {
        let state = self.state.lock();
        if state.fail_nonce {
            return Err(ChainError::Unsupported("eth_getTransactionCount".into()));
        }
        Ok(state.nonce)
    }

    async fn estimate_gas(&self, _tx: &TransactionRequest) -> Result<u64, ChainError> {
        let mut state = self.state.lock();
        let call = state.estimate_calls;
        state.estimate_calls += 1;
        if state.fail_estimate_at == Some(call) {
            return Err(ChainError::Unsupported("execution reverted".into()));
        }
        Ok(state.gas_estimate)
    }

    async fn max_priority_fee(&self) -> Result<u128, ChainError> {
        self.state
            .lock()
            .tip
            .ok_or_else(|| ChainError::Unsupported("eth_maxPriorityFeePerGas".into()))
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        Ok(self.state.lock().gas_price)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, ChainError> {
        let mut state = self.state.lock();
        if state.fail_send {
            return Err(ChainError::Unsupported("nonce too low".into()));
        }
        state.sent.push(Bytes::copy_from_slice(raw));
        Ok(alloy::primitives::keccak256(raw))
    }
}

/// Signer that records requests and returns the nonce as the "raw" bytes.
#[derive(Debug, Default)]
pub struct RecordingSigner {
    signed: Mutex<Vec<TransactionRequest>>,
}

impl RecordingSigner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn signed(&self) -> Vec<TransactionRequest> {
        self.signed.lock().clone()
    }
}

#[async_trait]
impl TransactionSigner for RecordingSigner {
    fn address(&self) -> Address {
        KEEPER
    }

    async fn sign(&self, tx: TransactionRequest) -> Result<Bytes, ChainError> {
        let nonce = tx.nonce.unwrap_or_default();
        self.signed.lock().push(tx);
        Ok(Bytes::copy_from_slice(&nonce.to_be_bytes()))
    }
}

pub fn preview(
    index: U256,
    borrow_type: BorrowType,
    liquidatable: bool,
    liquidated_at: u64,
) -> PositionPreview {
    PositionPreview {
        index,
        owner: Address::repeat_byte(0x01),
        borrow_type,
        liquidatable,
        liquidated_at,
    }
}

pub fn at(data: LogData, address: Address, block: u64, log_index: u64) -> Log {
    Log {
        inner: alloy::primitives::Log { address, data },
        block_number: Some(block),
        log_index: Some(log_index),
        ..Default::default()
    }
}

pub fn opened(index: u64, block: u64, log_index: u64) -> Log {
    let event = INFTVault::PositionOpened {
        owner: Address::repeat_byte(0x01),
        index: U256::from(index),
    };
    at(event.encode_log_data(), VAULT, block, log_index)
}

pub fn closed(index: u64, block: u64, log_index: u64) -> Log {
    let event = INFTVault::PositionClosed {
        owner: Address::repeat_byte(0x01),
        index: U256::from(index),
    };
    at(event.encode_log_data(), VAULT, block, log_index)
}

pub fn liquidated(index: u64, insured: bool, block: u64, log_index: u64) -> Log {
    let event = INFTVault::Liquidated {
        liquidator: LIQUIDATOR,
        owner: Address::repeat_byte(0x01),
        index: U256::from(index),
        insured,
    };
    at(event.encode_log_data(), VAULT, block, log_index)
}

pub fn answer_updated(block: u64, log_index: u64) -> Log {
    let event = IAggregator::AnswerUpdated {
        current: alloy::primitives::I256::ONE,
        roundId: U256::from(block),
        updatedAt: U256::from(block * 12),
    };
    at(event.encode_log_data(), ORACLE, block, log_index)
}
