//! Transaction application shared by the builder and the processor.
//!
//! Both stages run every transaction through [`ExecutionContext::apply`], so a block built
//! locally re-executes to the same [`ExecutedBlock`] on any other node.

use super::validity_window::ValidityWindow;
use crate::capabilities::balance::BalanceError;
use crate::capabilities::rules::Rules;
use crate::capabilities::Capabilities;
use crate::chain::action::Action;
use crate::chain::block::ExecutionBlock;
use crate::chain::executed::{ExecutedBlock, TxResult};
use crate::chain::fees::{fee_for, FeeState};
use crate::chain::ids::{Address, BlockId, Id, TxId, ID_LEN};
use crate::chain::transaction::Transaction;
use crate::error::{ChainError, StateError};
use crate::state::View;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

const STORE_PREFIX: u8 = 0x20;

/// Chain metadata recorded in a block's post-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentState {
    pub id: BlockId,
    pub height: u64,
    pub timestamp: i64,
    pub fees: FeeState,
}

impl ParentState {
    pub fn read(view: &View, caps: &Capabilities) -> Result<Self, StateError> {
        let metadata = &caps.metadata;
        let id = read_fixed::<ID_LEN>(view, metadata.block_id_key(), "block id")?;
        let height = read_fixed::<8>(view, metadata.height_key(), "height")?;
        let timestamp = read_fixed::<8>(view, metadata.timestamp_key(), "timestamp")?;
        let fee_key = metadata.fee_key();
        let raw = view
            .get(fee_key)
            .ok_or(StateError::MissingMetadata { what: "fee" })?;
        let fees = FeeState::from_bytes(raw).ok_or_else(|| StateError::Corrupt {
            what: "fee",
            key: hex::encode(fee_key),
            expected: FeeState::encoded_len(),
            actual: raw.len(),
        })?;

        Ok(Self {
            id: Id::from_bytes(id),
            height: u64::from_be_bytes(height),
            timestamp: i64::from_be_bytes(timestamp),
            fees,
        })
    }

    /// Records `self` as the metadata of the block whose post-state `view` holds.
    pub fn write(&self, view: &mut View, caps: &Capabilities) {
        let metadata = &caps.metadata;
        view.insert(metadata.block_id_key(), self.id.as_bytes().to_vec());
        view.insert(metadata.height_key(), self.height.to_be_bytes());
        view.insert(metadata.timestamp_key(), self.timestamp.to_be_bytes());
        view.insert(metadata.fee_key(), self.fees.to_bytes());
    }
}

fn read_fixed<const N: usize>(
    view: &View,
    key: &[u8],
    what: &'static str,
) -> Result<[u8; N], StateError> {
    let raw = view.get(key).ok_or(StateError::MissingMetadata { what })?;
    raw.try_into().map_err(|_| StateError::Corrupt {
        what,
        key: hex::encode(key),
        expected: N,
        actual: raw.len(),
    })
}

/// Why a transaction could not be applied.
#[derive(Debug)]
pub(crate) enum Rejection {
    /// The transaction itself is unacceptable in this block.
    Invalid(ChainError),
    /// The transaction does not fit the block's remaining units.
    BlockFull { needed: u64, remaining: u64 },
    /// The parent state could not be read.
    State(StateError),
}

/// Expiry must fall in `[reference, reference + validity_window]`.
pub(crate) fn check_expiry(
    tx: &Transaction,
    reference: i64,
    rules: &Rules,
) -> Result<(), ChainError> {
    let valid_until = reference.saturating_add(rules.validity_window);
    if tx.expiry() < reference || tx.expiry() > valid_until {
        return Err(ChainError::ExpiredTransaction {
            id: tx.id(),
            expiry: tx.expiry(),
            valid_from: reference,
            valid_until,
        });
    }
    Ok(())
}

/// Mutable state of one block under construction or re-execution.
pub(crate) struct ExecutionContext<'a> {
    caps: &'a Capabilities,
    window: &'a RwLock<ValidityWindow>,
    rules: Arc<Rules>,
    view: View,
    parent: ParentState,
    timestamp: i64,
    unit_price: u64,
    units_remaining: u64,
    seen: HashSet<TxId>,
    results: Vec<TxResult>,
}

impl<'a> ExecutionContext<'a> {
    /// Forks `parent_view` for a block at `timestamp`.
    pub(crate) fn new(
        caps: &'a Capabilities,
        window: &'a RwLock<ValidityWindow>,
        parent_view: &View,
        parent: ParentState,
        timestamp: i64,
    ) -> Self {
        let rules = caps.rule_factory.rules(timestamp);
        let unit_price = parent.fees.next_price(&rules);
        let units_remaining = rules.max_block_units;
        Self {
            caps,
            window,
            rules,
            view: parent_view.fork(),
            parent,
            timestamp,
            unit_price,
            units_remaining,
            seen: HashSet::new(),
            results: Vec::new(),
        }
    }

    pub(crate) fn rules(&self) -> &Rules {
        &self.rules
    }

    pub(crate) fn units_remaining(&self) -> u64 {
        self.units_remaining
    }

    pub(crate) fn applied(&self) -> usize {
        self.results.len()
    }

    /// Applies `tx` on top of the transactions applied so far.
    ///
    /// Rejections leave the view untouched. An action failure is not a rejection: the fee
    /// stays charged, the actions' writes are undone and the result records the error.
    pub(crate) fn apply(&mut self, tx: &Transaction) -> Result<(), Rejection> {
        check_expiry(tx, self.timestamp, &self.rules).map_err(Rejection::Invalid)?;

        let id = tx.id();
        let repeated = self.seen.contains(&id)
            || self.window.read().is_repeat(
                &id,
                &self.parent.id,
                self.parent.height,
                self.timestamp,
                self.rules.validity_window,
            );
        if repeated {
            return Err(Rejection::Invalid(ChainError::DuplicateTransaction { id }));
        }

        let units = self.rules.tx_units(tx);
        if units > self.units_remaining {
            return Err(Rejection::BlockFull {
                needed: units,
                remaining: self.units_remaining,
            });
        }

        let sponsor = tx.sponsor();
        let fee = fee_for(units, self.unit_price);
        match self.caps.balances.deduct(&mut self.view, &sponsor, fee) {
            Ok(()) => {}
            Err(BalanceError::Insufficient {
                required,
                available,
                ..
            }) => {
                return Err(Rejection::Invalid(ChainError::InsufficientFunds {
                    id,
                    sponsor,
                    required,
                    available,
                }))
            }
            Err(err) => return Err(Rejection::State(StateError::Balance(err))),
        }

        let checkpoint = self.view.checkpoint();
        let mut outputs = Vec::with_capacity(tx.actions().len());
        let mut failure = None;
        for (index, action) in tx.actions().iter().enumerate() {
            match self.run_action(&sponsor, action) {
                Ok(output) => outputs.push(output),
                Err(err) => {
                    failure = Some(format!("action #{index}: {err}"));
                    break;
                }
            }
        }

        let writes = match failure {
            Some(_) => {
                self.view.rollback(checkpoint);
                outputs.clear();
                0
            }
            None => self.view.writes_since(checkpoint) as u32,
        };

        self.seen.insert(id);
        self.units_remaining -= units;
        self.results.push(TxResult {
            success: failure.is_none(),
            error: failure,
            outputs,
            units,
            fee,
            writes,
        });
        Ok(())
    }

    fn run_action(&mut self, sponsor: &Address, action: &Action) -> Result<Vec<u8>, BalanceError> {
        match action {
            Action::Transfer { to, amount, .. } => {
                self.caps.balances.deduct(&mut self.view, sponsor, *amount)?;
                self.caps.balances.credit(&mut self.view, to, *amount)?;
                Ok(Vec::new())
            }
            Action::Store { key, value } => {
                let key = store_key(sponsor, key);
                let previous = self.view.get(&key).map(<[u8]>::to_vec).unwrap_or_default();
                if value.is_empty() {
                    self.view.remove(&key);
                } else {
                    self.view.insert(key, value.clone());
                }
                Ok(previous)
            }
        }
    }

    /// Seals the block: records its metadata in the view and returns the outcome.
    pub(crate) fn finish(mut self, block: Arc<ExecutionBlock>) -> (ExecutedBlock, View) {
        let executed = ExecutedBlock::new(block, self.results, self.unit_price);
        let state = ParentState {
            id: executed.id(),
            height: self.parent.height.saturating_add(1),
            timestamp: self.timestamp,
            fees: FeeState {
                unit_price: self.unit_price,
                last_units: executed.units_consumed(),
            },
        };
        state.write(&mut self.view, self.caps);
        (executed, self.view)
    }
}

/// Key of an application value written by `owner`.
pub fn store_key(owner: &Address, key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + owner.as_bytes().len() + key.len());
    out.push(STORE_PREFIX);
    out.extend_from_slice(owner.as_bytes());
    out.extend_from_slice(key);
    out
}
