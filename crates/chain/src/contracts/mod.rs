//! Contract bindings for the vault, the liquidator and the price oracles.
//!
//! Interfaces are declared inline with `alloy::sol!` so the crate builds
//! without compiled artifacts.
//!
//! # Example
//!
//! ```rust,ignore
//! use jpegd_chain::contracts::{LiquidatorAction, INFTVault};
//!
//! let vault = INFTVault::new(vault_address, provider);
//! let preview = vault.showPosition(index).call().await?._0;
//!
//! let calldata = LiquidatorAction::Liquidate.encode(&[index]);
//! ```

pub mod common;
pub mod liquidator;
pub mod vault;

pub use common::IAggregator;
pub use liquidator::{ILiquidator, LiquidatorAction};
pub use vault::{BorrowType, INFTVault, PositionPreview, PositionPreviewData};
