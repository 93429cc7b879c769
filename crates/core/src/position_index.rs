//! Set of vault positions believed to be open.
//!
//! The index is owned by the listener task and mutated only from its call
//! stack, so it carries no synchronization.

use std::collections::BTreeSet;

use alloy::primitives::U256;

/// Ordered set of open position indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionIndex {
    open: BTreeSet<U256>,
}

impl PositionIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a position. Returns false if it was already tracked.
    pub fn insert(&mut self, index: U256) -> bool {
        self.open.insert(index)
    }

    /// Stop tracking a position. Removing an untracked index is a no-op.
    pub fn remove(&mut self, index: &U256) -> bool {
        self.open.remove(index)
    }

    pub fn contains(&self, index: &U256) -> bool {
        self.open.contains(index)
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// Iterate tracked indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &U256> {
        self.open.iter()
    }

    /// Copy of the tracked indices in ascending order.
    pub fn snapshot(&self) -> Vec<U256> {
        self.open.iter().copied().collect()
    }

    /// Replace the whole set (full-vault scan).
    pub fn replace_all(&mut self, indices: impl IntoIterator<Item = U256>) {
        self.open = indices.into_iter().collect();
    }
}

impl FromIterator<U256> for PositionIndex {
    fn from_iter<I: IntoIterator<Item = U256>>(iter: I) -> Self {
        Self {
            open: iter.into_iter().collect(),
        }
    }
}
