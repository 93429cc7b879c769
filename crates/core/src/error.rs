//! Fatal error type for the keeper engine.

use alloy::primitives::U256;
use jpegd_chain::{ChainError, DecodeError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that stop the keeper.
///
/// Per-chunk submission failures are not represented here: they are
/// reported as failed [`SubmissionOutcome`](crate::SubmissionOutcome)s.
#[derive(Debug, Error)]
pub enum LiquidatorError {
    /// A chain read failed while applying events or starting up.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// A delivered log could not be decoded.
    #[error("event decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// Fetching a position's state failed during an evaluation pass.
    #[error("evaluation failed for position {index}: {source}")]
    Evaluation {
        index: U256,
        #[source]
        source: ChainError,
    },

    /// Submission could not start (no nonce, nothing was dispatched).
    #[error("submission setup failed: {0}")]
    Submission(#[source] ChainError),

    /// The live log subscription terminated.
    #[error("log subscription closed")]
    SubscriptionClosed,

    /// The listener task stopped without reporting an error.
    #[error("event listener exited: {0}")]
    ListenerExited(String),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
