//! Keeper core logic.
//!
//! This crate provides the reconciliation and decision engine:
//! - Position index of open vault positions
//! - Event reconcilers (incremental backfill + live, or full-vault scan)
//! - Position evaluation (liquidatable / claimable / closed)
//! - Chunked, gas-capped batch submission
//! - Orchestration and fatal error handling
//! - TOML configuration with environment expansion

pub mod config;
mod error;
mod evaluator;
mod orchestrator;
mod position_index;
pub mod reconciler;
mod submitter;

#[cfg(test)]
mod testing;

pub use config::{
    ConfigError, ConfigOverrides, EngineSettings, KeystoreSettings, LiquidatorConfig,
    ReconcilerMode, DEFAULT_CONFIG_PATH,
};
pub use error::LiquidatorError;
pub use evaluator::{
    classify, unix_now, Classification, Evaluation, PositionEvaluator,
    DEFAULT_CLAIM_GRACE_PERIOD_SECS,
};
pub use orchestrator::Orchestrator;
pub use position_index::PositionIndex;
pub use reconciler::{
    ActionPipeline, IncrementalReconciler, Reconciler, VaultScanReconciler,
};
pub use submitter::{chunk_indices, BatchSubmitter, Chunk, SubmissionOutcome, DEFAULT_CHUNK_SIZE};
