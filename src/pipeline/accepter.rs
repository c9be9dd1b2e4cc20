use super::validity_window::ValidityWindow;
use super::verified::{AcceptOutcome, VerifiedBlock};
use crate::capabilities::Capabilities;
use crate::chain::block::ExecutionBlock;
use crate::chain::ids::BlockId;
use crate::error::{BlockFault, ChainError};
use crate::runtime::telemetry::Telemetry;
use crate::state::StateStore;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Instant;

/// Identity of the most recently accepted block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptedTip {
    pub id: BlockId,
    pub height: u64,
    pub timestamp: i64,
}

impl From<&ExecutionBlock> for AcceptedTip {
    fn from(block: &ExecutionBlock) -> Self {
        Self {
            id: block.id(),
            height: block.height(),
            timestamp: block.timestamp(),
        }
    }
}

/// Makes verified blocks canonical, one at a time and in height order.
pub struct Accepter {
    caps: Capabilities,
    store: Arc<StateStore>,
    window: Arc<RwLock<ValidityWindow>>,
    telemetry: Arc<Telemetry>,
    tip: Mutex<AcceptedTip>,
}

impl Accepter {
    /// `genesis` must already be committed to `store` and recorded in `window`.
    pub fn new(
        caps: Capabilities,
        store: Arc<StateStore>,
        window: Arc<RwLock<ValidityWindow>>,
        telemetry: Arc<Telemetry>,
        genesis: &ExecutionBlock,
    ) -> Self {
        Self {
            caps,
            store,
            window,
            telemetry,
            tip: Mutex::new(AcceptedTip::from(genesis)),
        }
    }

    pub fn last_accepted(&self) -> AcceptedTip {
        *self.tip.lock()
    }

    /// Commits `block`'s post-state and records its transactions for replay protection.
    ///
    /// Accepting the same block twice is a no-op. Anything other than the child of the last
    /// accepted block is refused, as is a block repeating a transaction accepted within its
    /// validity window.
    pub fn accept_block(&self, block: &VerifiedBlock) -> Result<AcceptOutcome, ChainError> {
        let started = Instant::now();
        let mut tip = self.tip.lock();
        let header = block.block();

        if header.id() == tip.id || self.window.read().contains_block(header.height(), &header.id())
        {
            tracing::debug!(
                height = header.height(),
                id = %header.id().short(),
                "block already accepted"
            );
            return Ok(AcceptOutcome::AlreadyAccepted);
        }

        if header.height() != tip.height.saturating_add(1) || header.parent() != tip.id {
            return Err(ChainError::OutOfOrderAccept {
                id: header.id(),
                height: header.height(),
                parent: header.parent(),
                last_accepted: tip.id,
                last_height: tip.height,
            });
        }

        let rules = self.caps.rule_factory.rules(header.timestamp());
        let tx_ids: Vec<_> = header.tx_ids().collect();
        let repeat = self.window.read().first_repeat(
            tx_ids.iter(),
            &tip.id,
            tip.height,
            header.timestamp(),
            rules.validity_window,
        );
        if let Some((index, id)) = repeat {
            self.telemetry.record_invalid_block();
            return Err(ChainError::InvalidBlock {
                id: header.id(),
                height: header.height(),
                fault: BlockFault::Transaction {
                    index,
                    id,
                    source: Box::new(ChainError::DuplicateTransaction { id }),
                },
            });
        }

        let version = self.store.commit(block.view());
        let evicted = {
            let mut window = self.window.write();
            window.insert(header.height(), header.id(), header.timestamp(), tx_ids);
            window.evict_before(header.timestamp().saturating_sub(rules.validity_window))
        };
        *tip = AcceptedTip::from(&**header);
        drop(tip);

        let age_ms = self
            .caps
            .clock
            .now_millis()
            .saturating_sub(header.timestamp());
        self.telemetry
            .record_accepted_block(header.txs().len(), started.elapsed(), age_ms);
        tracing::info!(
            height = header.height(),
            id = %header.id().short(),
            txs = header.txs().len(),
            version,
            evicted,
            "accepted block"
        );

        Ok(AcceptOutcome::Accepted { version })
    }
}
