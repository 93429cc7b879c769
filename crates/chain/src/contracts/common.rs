//! Chainlink aggregator interface used as the valuation trigger.

use alloy::sol;

sol! {
    /// Chainlink-compatible oracle aggregator. Only its price event is read.
    interface IAggregator {
        event AnswerUpdated(int256 indexed current, uint256 indexed roundId, uint256 updatedAt);
    }
}
