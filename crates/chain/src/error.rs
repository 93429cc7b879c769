//! Error types for chain interaction.

use alloy::primitives::{Address, B256};
use thiserror::Error;

/// Errors raised by the chain interface, signer and keystore.
#[derive(Debug, Error)]
pub enum ChainError {
    /// RPC request or transport failure.
    #[error("rpc transport error: {0}")]
    Transport(#[from] alloy::transports::TransportError),

    /// Contract call failed (revert, decode of return data, transport).
    #[error("contract call failed: {0}")]
    Contract(#[from] alloy::contract::Error),

    /// The live log subscription ended or was dropped by the node.
    #[error("log subscription closed")]
    SubscriptionClosed,

    /// The subscription fell behind and dropped notifications.
    #[error("log subscription lagged: {0}")]
    SubscriptionLagged(String),

    /// A subscription notification was not a valid log.
    #[error("malformed subscription payload: {0}")]
    SubscriptionPayload(#[source] serde_json::Error),

    /// The node does not support the requested method.
    #[error("unsupported by node: {0}")]
    Unsupported(String),

    /// Building or signing a transaction failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Keystore lookup, decryption or creation failed.
    #[error("keystore error: {0}")]
    Keystore(String),

    /// On-chain data did not have the expected shape.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// A log or call result that could not be decoded.
///
/// Always treated as a correctness bug rather than a transient condition.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("log has no topics (address {address})")]
    MissingTopic { address: Address },

    #[error("unregistered event signature {signature} from {address}")]
    UnknownSignature { signature: B256, address: Address },

    #[error("event {event} emitted by unexpected address {address}")]
    UnexpectedEmitter { event: &'static str, address: Address },

    #[error("malformed {event} log: {source}")]
    Malformed {
        event: &'static str,
        #[source]
        source: alloy::sol_types::Error,
    },

    #[error("unknown borrow type {0}")]
    BorrowType(u8),
}
