//! Chain interaction layer for the JPEG'd vault keeper.
//!
//! This crate provides:
//! - Contract bindings for the NFT vault, the liquidator and price aggregators
//! - Event signature registry and typed log decoding
//! - The [`ChainClient`] interface and its WebSocket implementation
//! - Gas strategy abstraction (Legacy + EIP-1559)
//! - Local transaction signing and encrypted keystores

pub mod contracts;
mod error;
pub mod events;
pub mod gas;
pub mod keystore;
mod provider;
mod signer;

pub use contracts::{
    BorrowType, IAggregator, ILiquidator, INFTVault, LiquidatorAction, PositionPreview,
};
pub use error::{ChainError, DecodeError};
pub use events::{DecodedEvent, EventKind, EventRegistry, LogPosition, VaultEvent};
pub use gas::{
    detect_gas_strategy, gas_limit_with_headroom, gwei_to_wei, Eip1559GasStrategy, GasParams,
    GasStrategy, LegacyGasStrategy,
};
pub use provider::{ChainClient, LogStream, RpcChainClient};
pub use signer::{KeystoreSigner, NonceManager, TransactionSigner};
