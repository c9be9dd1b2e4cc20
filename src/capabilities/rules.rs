use crate::chain::action::{Action, ActionKind};
use crate::chain::transaction::Transaction;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Fee and validity parameters active at a given timestamp. Durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rules {
    /// How far ahead of the block timestamp a transaction expiry may be.
    pub validity_window: i64,
    /// How far ahead of the local clock a block timestamp may be.
    pub max_future_drift: i64,
    pub min_block_gap: i64,
    pub base_units: u64,
    pub transfer_units: u64,
    pub store_units: u64,
    pub max_block_units: u64,
    pub target_block_units: u64,
    pub min_unit_price: u64,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            validity_window: 60_000,
            max_future_drift: 10_000,
            min_block_gap: 100,
            base_units: 10,
            transfer_units: 5,
            store_units: 20,
            max_block_units: 2_000_000,
            target_block_units: 1_000_000,
            min_unit_price: 1,
        }
    }
}

impl Rules {
    pub fn action_units(&self, action: &Action) -> u64 {
        match action.kind() {
            ActionKind::Transfer => self.transfer_units,
            ActionKind::Store => self.store_units,
        }
    }

    /// Units a transaction consumes; fixed by its actions, so also the maximum it can be charged.
    pub fn tx_units(&self, tx: &Transaction) -> u64 {
        tx.actions()
            .iter()
            .fold(self.base_units, |acc, action| {
                acc.saturating_add(self.action_units(action))
            })
    }

    pub fn validate(&self) -> Result<()> {
        if self.validity_window <= 0 {
            bail!("validity_window must be greater than 0");
        }
        if self.max_future_drift < 0 {
            bail!("max_future_drift cannot be negative");
        }
        if self.min_block_gap < 0 {
            bail!("min_block_gap cannot be negative");
        }
        if self.max_block_units == 0 {
            bail!("max_block_units must be greater than 0");
        }
        if self.target_block_units > self.max_block_units {
            bail!("target_block_units cannot exceed max_block_units");
        }
        if self.min_unit_price == 0 {
            bail!("min_unit_price must be greater than 0");
        }
        Ok(())
    }
}

/// Resolves the rule set in force at a block or transaction timestamp.
pub trait RuleFactory: Send + Sync + 'static {
    fn rules(&self, timestamp: i64) -> Arc<Rules>;
}

/// Rule factory returning one rule set for every timestamp.
#[derive(Debug, Clone)]
pub struct StaticRuleFactory {
    rules: Arc<Rules>,
}

impl StaticRuleFactory {
    pub fn new(rules: Rules) -> Result<Self> {
        rules.validate()?;
        Ok(Self {
            rules: Arc::new(rules),
        })
    }
}

impl Default for StaticRuleFactory {
    fn default() -> Self {
        Self {
            rules: Arc::new(Rules::default()),
        }
    }
}

impl RuleFactory for StaticRuleFactory {
    fn rules(&self, _timestamp: i64) -> Arc<Rules> {
        Arc::clone(&self.rules)
    }
}
