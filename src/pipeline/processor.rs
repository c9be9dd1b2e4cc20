use super::auth_workers::{AuthWorkerPool, PoolFailure};
use super::execution::{ExecutionContext, ParentState, Rejection};
use super::validity_window::ValidityWindow;
use super::verified::{BuiltBlock, VerifiedBlock};
use crate::capabilities::auth::AuthError;
use crate::capabilities::Capabilities;
use crate::chain::block::ExecutionBlock;
use crate::chain::executed::ExecutedBlock;
use crate::error::{AuthFailure, BlockFault, ChainError, PipelineStage};
use crate::runtime::telemetry::Telemetry;
use crate::state::View;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Re-executes and authenticates blocks produced elsewhere.
#[derive(Clone)]
pub struct Processor {
    caps: Capabilities,
    window: Arc<RwLock<ValidityWindow>>,
    auth: Arc<AuthWorkerPool>,
    telemetry: Arc<Telemetry>,
}

impl Processor {
    pub fn new(
        caps: Capabilities,
        window: Arc<RwLock<ValidityWindow>>,
        auth: Arc<AuthWorkerPool>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            caps,
            window,
            auth,
            telemetry,
        }
    }

    /// Applies every transaction of `block` on a fork of `parent_view`.
    ///
    /// Credentials are not checked here; see [`Processor::async_verify`].
    pub fn execute(
        &self,
        cancel: &CancellationToken,
        parent_view: &View,
        block: Arc<ExecutionBlock>,
    ) -> Result<(ExecutedBlock, View), ChainError> {
        let result = self.execute_inner(cancel, parent_view, &block);
        match &result {
            Ok((executed, _)) => {
                self.window.write().record_pending(&block);
                self.telemetry.record_executed_block(block.txs().len());
                tracing::debug!(
                    height = block.height(),
                    id = %block.id().short(),
                    txs = block.txs().len(),
                    units = executed.units_consumed(),
                    "executed block"
                );
            }
            Err(ChainError::InvalidBlock { fault, .. }) => {
                self.telemetry.record_invalid_block();
                tracing::warn!(
                    height = block.height(),
                    id = %block.id().short(),
                    error = %fault,
                    "block failed execution"
                );
            }
            Err(_) => {}
        }
        result
    }

    fn execute_inner(
        &self,
        cancel: &CancellationToken,
        parent_view: &View,
        block: &Arc<ExecutionBlock>,
    ) -> Result<(ExecutedBlock, View), ChainError> {
        let cancelled = || ChainError::Cancelled {
            stage: PipelineStage::Execute,
        };
        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let invalid = |fault| ChainError::InvalidBlock {
            id: block.id(),
            height: block.height(),
            fault,
        };

        let parent = ParentState::read(parent_view, &self.caps)?;
        if block.height() != parent.height.saturating_add(1) {
            return Err(invalid(BlockFault::HeightMismatch {
                parent: parent.height,
                actual: block.height(),
            }));
        }
        if block.parent() != parent.id {
            return Err(invalid(BlockFault::ParentMismatch {
                expected: parent.id,
                actual: block.parent(),
            }));
        }

        let header_rules = self.caps.rule_factory.rules(parent.timestamp);
        let earliest = parent.timestamp.saturating_add(header_rules.min_block_gap);
        if block.timestamp() < earliest {
            return Err(invalid(BlockFault::TimestampTooEarly {
                parent: parent.timestamp,
                actual: block.timestamp(),
                min_gap: header_rules.min_block_gap,
            }));
        }
        let now = self.caps.clock.now_millis();
        if block.timestamp() > now.saturating_add(header_rules.max_future_drift) {
            return Err(invalid(BlockFault::TimestampTooFarAhead {
                actual: block.timestamp(),
                now,
                max_drift: header_rules.max_future_drift,
            }));
        }

        let mut ctx = ExecutionContext::new(
            &self.caps,
            &self.window,
            parent_view,
            parent,
            block.timestamp(),
        );
        for (index, tx) in block.txs().iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(cancelled());
            }
            match ctx.apply(tx) {
                Ok(()) => {}
                Err(Rejection::Invalid(err)) => {
                    return Err(invalid(BlockFault::Transaction {
                        index,
                        id: tx.id(),
                        source: Box::new(err),
                    }))
                }
                Err(Rejection::BlockFull { needed, remaining }) => {
                    return Err(invalid(BlockFault::UnitsExceeded {
                        index,
                        id: tx.id(),
                        needed,
                        remaining,
                    }))
                }
                Err(Rejection::State(err)) => return Err(err.into()),
            }
        }

        Ok(ctx.finish(Arc::clone(block)))
    }

    /// Verifies every credential in `block` on the worker pool and reports all failures.
    pub async fn async_verify(
        &self,
        cancel: &CancellationToken,
        block: &ExecutionBlock,
    ) -> Result<(), ChainError> {
        let txs = block.txs();
        let results = match self.auth.verify_batch(cancel, txs).await {
            Ok(results) => results,
            Err(PoolFailure::Cancelled) => {
                return Err(ChainError::Cancelled {
                    stage: PipelineStage::Verify,
                })
            }
            Err(PoolFailure::Closed) => txs
                .iter()
                .map(|_| {
                    Err(AuthError::WorkerFailed(
                        "auth worker pool is closed".to_string(),
                    ))
                })
                .collect(),
        };

        let failures: Vec<AuthFailure> = txs
            .iter()
            .zip(results)
            .enumerate()
            .filter_map(|(index, (tx, result))| {
                result.err().map(|reason| AuthFailure {
                    index,
                    id: tx.id(),
                    reason,
                })
            })
            .collect();

        if failures.is_empty() {
            return Ok(());
        }
        tracing::warn!(
            height = block.height(),
            id = %block.id().short(),
            failures = failures.len(),
            "block carries invalid credentials"
        );
        Err(ChainError::InvalidAuth { failures })
    }

    /// Runs execution and credential verification together.
    ///
    /// Verification jobs are queued on the worker pool while the block executes on the
    /// blocking thread pool. Execution errors take precedence over auth errors.
    pub async fn verify(
        &self,
        cancel: &CancellationToken,
        parent_view: &View,
        block: Arc<ExecutionBlock>,
    ) -> Result<VerifiedBlock, ChainError> {
        let execution = {
            let processor = self.clone();
            let cancel = cancel.clone();
            let parent_view = parent_view.clone();
            let block = Arc::clone(&block);
            tokio::task::spawn_blocking(move || processor.execute(&cancel, &parent_view, block))
        };
        let (auth, execution) = tokio::join!(self.async_verify(cancel, &block), execution);
        let (executed, view) = match execution {
            Ok(result) => result?,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => {
                return Err(ChainError::Cancelled {
                    stage: PipelineStage::Execute,
                })
            }
        };
        auth?;
        Ok(VerifiedBlock::new(executed, view))
    }

    /// Promotes a locally built block, checking its credentials first when the builder
    /// skipped them.
    pub async fn verify_built(
        &self,
        cancel: &CancellationToken,
        built: BuiltBlock,
    ) -> Result<VerifiedBlock, ChainError> {
        let checked = built.auth_verified();
        let (block, executed, view) = built.into_parts();
        if !checked {
            self.async_verify(cancel, &block).await?;
        }
        Ok(VerifiedBlock::new(executed, view))
    }
}
