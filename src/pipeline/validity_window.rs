//! Replay protection over recently accepted blocks and their unaccepted descendants.

use crate::chain::block::ExecutionBlock;
use crate::chain::ids::{BlockId, TxId};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone)]
struct WindowEntry {
    height: u64,
    id: BlockId,
    timestamp: i64,
    txs: Vec<TxId>,
}

#[derive(Debug, Clone)]
struct PendingEntry {
    parent: BlockId,
    height: u64,
    timestamp: i64,
    txs: HashSet<TxId>,
}

/// Accepted blocks whose transactions could still be replayed, oldest first, plus every
/// block executed above the accepted tip that has not been accepted yet.
///
/// Entries are appended in height order by the accepter and evicted by timestamp. Lookups
/// start at the parent of the block being checked: unaccepted ancestors are found by
/// following parent links, accepted entries above the parent height are ignored.
#[derive(Debug, Clone, Default)]
pub struct ValidityWindow {
    items: VecDeque<WindowEntry>,
    index: HashMap<TxId, (u64, i64)>,
    pending: HashMap<BlockId, PendingEntry>,
}

impl ValidityWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accepted blocks currently covered.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn tx_count(&self) -> usize {
        self.index.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn insert(&mut self, height: u64, id: BlockId, timestamp: i64, txs: Vec<TxId>) {
        for tx in &txs {
            self.index.insert(*tx, (height, timestamp));
        }
        self.items.push_back(WindowEntry {
            height,
            id,
            timestamp,
            txs,
        });
        self.pending.remove(&id);
        self.pending.retain(|_, entry| entry.height > height);
    }

    /// Remembers an executed block until it is accepted or falls below the accepted tip.
    pub fn record_pending(&mut self, block: &ExecutionBlock) {
        if matches!(self.items.back(), Some(tip) if block.height() <= tip.height) {
            return;
        }
        self.pending
            .entry(block.id())
            .or_insert_with(|| PendingEntry {
                parent: block.parent(),
                height: block.height(),
                timestamp: block.timestamp(),
                txs: block.txs().iter().map(|tx| tx.id()).collect(),
            });
    }

    /// Drops every block older than `cutoff` and returns how many were removed.
    pub fn evict_before(&mut self, cutoff: i64) -> usize {
        let mut evicted = 0;
        while matches!(self.items.front(), Some(entry) if entry.timestamp < cutoff) {
            let Some(entry) = self.items.pop_front() else {
                break;
            };
            for tx in &entry.txs {
                if matches!(self.index.get(tx), Some((height, _)) if *height == entry.height) {
                    self.index.remove(tx);
                }
            }
            evicted += 1;
        }
        evicted
    }

    /// Whether `tx` was included in `parent`, one of its unaccepted ancestors, or an
    /// accepted block at or below `parent_height`, counting only blocks whose timestamp is
    /// within `validity_window` of `reference`.
    pub fn is_repeat(
        &self,
        tx: &TxId,
        parent: &BlockId,
        parent_height: u64,
        reference: i64,
        validity_window: i64,
    ) -> bool {
        let oldest = reference.saturating_sub(validity_window);
        let mut cursor = *parent;
        while let Some(entry) = self.pending.get(&cursor) {
            if entry.timestamp < oldest {
                return false;
            }
            if entry.txs.contains(tx) {
                return true;
            }
            cursor = entry.parent;
        }
        match self.index.get(tx) {
            Some((height, timestamp)) => *height <= parent_height && *timestamp >= oldest,
            None => false,
        }
    }

    /// First repeated transaction among `txs`, with its position.
    pub fn first_repeat<'a>(
        &self,
        txs: impl IntoIterator<Item = &'a TxId>,
        parent: &BlockId,
        parent_height: u64,
        reference: i64,
        validity_window: i64,
    ) -> Option<(usize, TxId)> {
        txs.into_iter()
            .enumerate()
            .find(|(_, tx)| {
                self.is_repeat(tx, parent, parent_height, reference, validity_window)
            })
            .map(|(index, tx)| (index, *tx))
    }

    pub fn contains_block(&self, height: u64, id: &BlockId) -> bool {
        self.items
            .iter()
            .rev()
            .any(|entry| entry.height == height && entry.id == *id)
    }
}
