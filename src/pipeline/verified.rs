use crate::chain::block::ExecutionBlock;
use crate::chain::executed::ExecutedBlock;
use crate::chain::ids::BlockId;
use crate::state::View;
use std::sync::Arc;

/// A block whose execution and credentials have both been checked, with its post-state.
///
/// Only the processor and auth-checked builds produce one, so holding a `VerifiedBlock`
/// is proof that the block may be accepted.
#[derive(Debug, Clone)]
pub struct VerifiedBlock {
    executed: ExecutedBlock,
    view: View,
}

impl VerifiedBlock {
    pub(crate) fn new(executed: ExecutedBlock, view: View) -> Self {
        Self { executed, view }
    }

    pub fn block(&self) -> &Arc<ExecutionBlock> {
        self.executed.block()
    }

    pub fn id(&self) -> BlockId {
        self.executed.id()
    }

    pub fn height(&self) -> u64 {
        self.executed.height()
    }

    pub fn executed(&self) -> &ExecutedBlock {
        &self.executed
    }

    /// Post-state of the block; children are built and executed on top of it.
    pub fn view(&self) -> &View {
        &self.view
    }
}

/// Output of the builder: the new block, its execution outcome and post-state.
#[derive(Debug, Clone)]
pub struct BuiltBlock {
    executed: ExecutedBlock,
    view: View,
    excluded: usize,
    auth_verified: bool,
}

impl BuiltBlock {
    pub(crate) fn new(
        executed: ExecutedBlock,
        view: View,
        excluded: usize,
        auth_verified: bool,
    ) -> Self {
        Self {
            executed,
            view,
            excluded,
            auth_verified,
        }
    }

    pub fn block(&self) -> &Arc<ExecutionBlock> {
        self.executed.block()
    }

    pub fn executed(&self) -> &ExecutedBlock {
        &self.executed
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    /// Candidates dropped as invalid while building.
    pub fn excluded(&self) -> usize {
        self.excluded
    }

    /// Whether every included credential was checked while building.
    pub fn auth_verified(&self) -> bool {
        self.auth_verified
    }

    pub fn into_parts(self) -> (Arc<ExecutionBlock>, ExecutedBlock, View) {
        (Arc::clone(self.executed.block()), self.executed, self.view)
    }

    /// Promotes the block without another execution pass. Returns `None` when it was built
    /// with credential checks disabled; such blocks go through
    /// [`Processor::verify_built`](super::processor::Processor::verify_built).
    pub fn into_verified(self) -> Option<VerifiedBlock> {
        self.auth_verified
            .then(|| VerifiedBlock::new(self.executed, self.view))
    }
}

/// Result of [`Accepter::accept_block`](super::accepter::Accepter::accept_block).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// The block became the last accepted block; `version` is the new state version.
    Accepted { version: u64 },
    /// The block had already been accepted; nothing changed.
    AlreadyAccepted,
}
