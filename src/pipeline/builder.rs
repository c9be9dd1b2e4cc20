use super::auth_workers::{AuthWorkerPool, PoolFailure};
use super::execution::{ExecutionContext, ParentState, Rejection};
use super::validity_window::ValidityWindow;
use super::verified::BuiltBlock;
use crate::capabilities::Capabilities;
use crate::chain::block::ExecutionBlock;
use crate::chain::transaction::Transaction;
use crate::error::ChainError;
use crate::runtime::config::ChainConfig;
use crate::runtime::telemetry::Telemetry;
use crate::state::View;
use anyhow::anyhow;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Limits the builder works within, taken from [`ChainConfig`].
#[derive(Debug, Clone, Copy)]
pub struct BuildLimits {
    pub max_block_txs: usize,
    pub batch_size: usize,
    pub target_duration: Duration,
    pub verify_auth: bool,
}

impl From<&ChainConfig> for BuildLimits {
    fn from(config: &ChainConfig) -> Self {
        Self {
            max_block_txs: config.max_block_txs(),
            batch_size: config.build_batch_size(),
            target_duration: config.target_build_duration(),
            verify_auth: config.verify_auth_on_build(),
        }
    }
}

/// Candidates popped from the mempool that must go back if they are not consumed.
#[derive(Default)]
struct Leftovers {
    txs: Vec<Arc<Transaction>>,
}

impl Leftovers {
    fn keep(&mut self, tx: Arc<Transaction>) {
        self.txs.push(tx);
    }

    fn keep_all(&mut self, txs: impl IntoIterator<Item = Arc<Transaction>>) {
        self.txs.extend(txs);
    }

    fn return_to(self, caps: &Capabilities) {
        if !self.txs.is_empty() {
            tracing::debug!(txs = self.txs.len(), "restoring unconsumed candidates");
            caps.mempool.restore(self.txs);
        }
    }
}

/// Assembles new blocks from mempool candidates.
pub struct Builder {
    caps: Capabilities,
    window: Arc<RwLock<ValidityWindow>>,
    auth: Arc<AuthWorkerPool>,
    telemetry: Arc<Telemetry>,
    limits: BuildLimits,
}

impl Builder {
    pub fn new(
        caps: Capabilities,
        window: Arc<RwLock<ValidityWindow>>,
        auth: Arc<AuthWorkerPool>,
        telemetry: Arc<Telemetry>,
        limits: BuildLimits,
    ) -> Self {
        Self {
            caps,
            window,
            auth,
            telemetry,
            limits,
        }
    }

    /// Builds a child of `parent`, whose post-state is `parent_view`.
    ///
    /// Invalid candidates are dropped. Candidates that did not fit, and any popped after a
    /// budget ran out, are handed back to the mempool. An empty block is a valid result.
    pub async fn build_block(
        &self,
        cancel: &CancellationToken,
        parent_view: &View,
        parent: &ExecutionBlock,
    ) -> Result<BuiltBlock, ChainError> {
        if cancel.is_cancelled() {
            return Err(ChainError::aborted(anyhow!("build cancelled before start")));
        }

        let now = self.caps.clock.now_millis();
        let header_rules = self.caps.rule_factory.rules(parent.timestamp());
        let timestamp = now.max(parent.timestamp().saturating_add(header_rules.min_block_gap));
        let latest = now.saturating_add(header_rules.max_future_drift);
        if timestamp > latest {
            return Err(ChainError::aborted(anyhow!(
                "timestamp {timestamp} would exceed {latest} (parent {} + gap {}ms)",
                parent.timestamp(),
                header_rules.min_block_gap
            )));
        }

        let parent_state = ParentState::read(parent_view, &self.caps).map_err(ChainError::aborted)?;
        if parent_state.height != parent.height() {
            return Err(ChainError::aborted(anyhow!(
                "parent view is at height {} but parent block is at height {}",
                parent_state.height,
                parent.height()
            )));
        }
        if parent_state.id != parent.id() {
            return Err(ChainError::aborted(anyhow!(
                "parent view holds the post-state of {} instead of {}",
                parent_state.id.short(),
                parent.id().short()
            )));
        }

        let deadline = Instant::now() + self.limits.target_duration;
        let mut ctx = ExecutionContext::new(
            &self.caps,
            &self.window,
            parent_view,
            parent_state,
            timestamp,
        );
        let mut included: Vec<Arc<Transaction>> = Vec::new();
        let mut leftovers = Leftovers::default();
        let mut excluded = 0usize;

        loop {
            if ctx.applied() >= self.limits.max_block_txs
                || ctx.units_remaining() < ctx.rules().base_units
                || Instant::now() >= deadline
            {
                break;
            }

            let budget = self
                .limits
                .batch_size
                .min(self.limits.max_block_txs - ctx.applied());
            let batch = self.caps.mempool.pop_candidates(budget);
            if batch.is_empty() {
                break;
            }

            let verdicts = if self.limits.verify_auth {
                match self.auth.verify_batch(cancel, &batch).await {
                    Ok(verdicts) => Some(verdicts),
                    Err(failure) => {
                        leftovers.keep_all(included);
                        leftovers.keep_all(batch);
                        leftovers.return_to(&self.caps);
                        let reason = match failure {
                            PoolFailure::Cancelled => "build cancelled during auth verification",
                            PoolFailure::Closed => "auth worker pool is closed",
                        };
                        return Err(ChainError::aborted(anyhow!(reason)));
                    }
                }
            } else {
                None
            };

            let mut candidates = batch.into_iter().enumerate();
            while let Some((index, tx)) = candidates.next() {
                if ctx.applied() >= self.limits.max_block_txs {
                    leftovers.keep(tx);
                    leftovers.keep_all(candidates.by_ref().map(|(_, tx)| tx));
                    break;
                }
                if let Some(Err(reason)) = verdicts.as_ref().and_then(|v| v.get(index)) {
                    excluded += 1;
                    tracing::debug!(tx = %tx.id().short(), error = %reason, "excluding candidate with invalid auth");
                    continue;
                }

                match ctx.apply(&tx) {
                    Ok(()) => included.push(tx),
                    Err(Rejection::Invalid(err)) => {
                        excluded += 1;
                        tracing::debug!(tx = %tx.id().short(), error = %err, "excluding invalid candidate");
                    }
                    Err(Rejection::BlockFull { .. }) => leftovers.keep(tx),
                    Err(Rejection::State(err)) => {
                        leftovers.keep(tx);
                        leftovers.keep_all(candidates.by_ref().map(|(_, tx)| tx));
                        leftovers.keep_all(included);
                        leftovers.return_to(&self.caps);
                        return Err(ChainError::aborted(err));
                    }
                }
            }

            if cancel.is_cancelled() {
                leftovers.keep_all(included);
                leftovers.return_to(&self.caps);
                return Err(ChainError::aborted(anyhow!("build cancelled")));
            }
        }

        leftovers.return_to(&self.caps);

        let tx_count = included.len();
        let block = Arc::new(ExecutionBlock::new(
            parent.id(),
            timestamp,
            parent.height().saturating_add(1),
            included,
        ));
        let (executed, view) = ctx.finish(block);
        self.window.write().record_pending(executed.block());

        self.telemetry.record_built_block(tx_count, excluded);
        tracing::info!(
            height = executed.height(),
            id = %executed.id().short(),
            txs = tx_count,
            excluded,
            units = executed.units_consumed(),
            unit_price = executed.unit_price(),
            "built block"
        );

        Ok(BuiltBlock::new(
            executed,
            view,
            excluded,
            self.limits.verify_auth,
        ))
    }
}
