use super::auth_workers::{AuthWorkerPool, PoolFailure};
use super::execution::{check_expiry, ParentState};
use super::validity_window::ValidityWindow;
use crate::capabilities::auth::AuthError;
use crate::capabilities::balance::BalanceError;
use crate::capabilities::Capabilities;
use crate::chain::block::ExecutionBlock;
use crate::chain::fees::fee_for;
use crate::chain::transaction::Transaction;
use crate::error::{AuthFailure, ChainError, PipelineStage, StateError};
use crate::state::View;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Admission check for a single transaction against a parent block, without writes.
pub struct PreExecutor {
    caps: Capabilities,
    window: Arc<RwLock<ValidityWindow>>,
    auth: Arc<AuthWorkerPool>,
}

impl PreExecutor {
    pub fn new(
        caps: Capabilities,
        window: Arc<RwLock<ValidityWindow>>,
        auth: Arc<AuthWorkerPool>,
    ) -> Self {
        Self { caps, window, auth }
    }

    /// Checks, in order: expiry relative to `parent`, replay within the window, the
    /// credential (when `verify_auth`), and whether the sponsor can pay the fee the next
    /// block would charge. Stops at the first failure.
    pub async fn pre_execute(
        &self,
        cancel: &CancellationToken,
        parent: &ExecutionBlock,
        view: &View,
        tx: &Arc<Transaction>,
        verify_auth: bool,
    ) -> Result<(), ChainError> {
        if cancel.is_cancelled() {
            return Err(ChainError::Cancelled {
                stage: PipelineStage::PreExecute,
            });
        }

        let rules = self.caps.rule_factory.rules(parent.timestamp());
        check_expiry(tx, parent.timestamp(), &rules)?;

        let id = tx.id();
        if self.window.read().is_repeat(
            &id,
            &parent.id(),
            parent.height(),
            parent.timestamp(),
            rules.validity_window,
        ) {
            return Err(ChainError::DuplicateTransaction { id });
        }

        if verify_auth {
            let outcome = match self.auth.verify_one(cancel, tx).await {
                Ok(outcome) => outcome,
                Err(PoolFailure::Cancelled) => {
                    return Err(ChainError::Cancelled {
                        stage: PipelineStage::PreExecute,
                    })
                }
                Err(PoolFailure::Closed) => Err(AuthError::WorkerFailed(
                    "auth worker pool is closed".to_string(),
                )),
            };
            if let Err(reason) = outcome {
                return Err(ChainError::InvalidAuth {
                    failures: vec![AuthFailure {
                        index: 0,
                        id,
                        reason,
                    }],
                });
            }
        }

        let parent_state = ParentState::read(view, &self.caps)?;
        let fee_rules = self.caps.rule_factory.rules(parent_state.timestamp);
        let price = parent_state.fees.next_price(&fee_rules);
        let fee = fee_for(fee_rules.tx_units(tx), price);
        let sponsor = tx.sponsor();
        match self.caps.balances.can_deduct(view, &sponsor, fee) {
            Ok(()) => Ok(()),
            Err(BalanceError::Insufficient {
                required,
                available,
                ..
            }) => Err(ChainError::InsufficientFunds {
                id,
                sponsor,
                required,
                available,
            }),
            Err(err) => Err(StateError::Balance(err).into()),
        }
    }
}
