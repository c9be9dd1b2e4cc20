use crate::chain::transaction::Transaction;
use std::sync::Arc;

/// Source of candidate transactions for block building.
///
/// Ordering is entirely the mempool's policy; the builder consumes candidates in the order
/// returned and never reorders them.
pub trait Mempool: Send + Sync + 'static {
    /// Removes and returns up to `budget` ranked candidates.
    fn pop_candidates(&self, budget: usize) -> Vec<Arc<Transaction>>;

    /// Returns candidates that were popped but neither included nor found invalid.
    fn restore(&self, txs: Vec<Arc<Transaction>>);
}
