use crate::capabilities::auth::AuthError;
use crate::capabilities::balance::BalanceError;
use crate::chain::codec::CodecError;
use crate::chain::ids::{Address, BlockId, TxId};
use std::fmt;
use thiserror::Error;

/// Pipeline stage an operation or error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Parse,
    PreExecute,
    Build,
    Execute,
    Verify,
    Accept,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Parse => "parse",
            PipelineStage::PreExecute => "pre-execute",
            PipelineStage::Build => "build",
            PipelineStage::Execute => "execute",
            PipelineStage::Verify => "verify",
            PipelineStage::Accept => "accept",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("missing {what} metadata in parent state")]
    MissingMetadata { what: &'static str },
    #[error("{what} value under key {key} has {actual} bytes, expected {expected}")]
    Corrupt {
        what: &'static str,
        key: String,
        expected: usize,
        actual: usize,
    },
    #[error("unreadable balance: {0}")]
    Balance(BalanceError),
}

/// One transaction whose credential failed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    pub index: usize,
    pub id: TxId,
    pub reason: AuthError,
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}: {}", self.index, self.id, self.reason)
    }
}

fn describe_failures(failures: &[AuthFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Why a block failed re-execution.
#[derive(Debug, Error)]
pub enum BlockFault {
    #[error("height {actual} does not follow parent height {parent}")]
    HeightMismatch { parent: u64, actual: u64 },
    #[error("block extends {actual} but the parent state belongs to {expected}")]
    ParentMismatch { expected: BlockId, actual: BlockId },
    #[error("timestamp {actual} is earlier than parent {parent} plus minimum gap {min_gap}ms")]
    TimestampTooEarly {
        parent: i64,
        actual: i64,
        min_gap: i64,
    },
    #[error("timestamp {actual} is more than {max_drift}ms ahead of local clock {now}")]
    TimestampTooFarAhead {
        actual: i64,
        now: i64,
        max_drift: i64,
    },
    #[error("transaction #{index} ({id}) rejected: {source}")]
    Transaction {
        index: usize,
        id: TxId,
        #[source]
        source: Box<ChainError>,
    },
    #[error("transaction #{index} ({id}) needs {needed} units but only {remaining} remain")]
    UnitsExceeded {
        index: usize,
        id: TxId,
        needed: u64,
        remaining: u64,
    },
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("malformed block: {0}")]
    MalformedBlock(#[source] CodecError),
    #[error("transaction {id} expiry {expiry} outside validity interval [{valid_from}, {valid_until}]")]
    ExpiredTransaction {
        id: TxId,
        expiry: i64,
        valid_from: i64,
        valid_until: i64,
    },
    #[error("transaction {id} already included within the validity window")]
    DuplicateTransaction { id: TxId },
    #[error("invalid auth for {} transaction(s): {}", .failures.len(), describe_failures(.failures))]
    InvalidAuth { failures: Vec<AuthFailure> },
    #[error("sponsor {sponsor} of transaction {id} cannot pay fee {required} (balance {available})")]
    InsufficientFunds {
        id: TxId,
        sponsor: Address,
        required: u64,
        available: u64,
    },
    #[error("invalid block {id} at height {height}: {fault}")]
    InvalidBlock {
        id: BlockId,
        height: u64,
        #[source]
        fault: BlockFault,
    },
    #[error(
        "cannot accept block {id} at height {height} (parent {parent}): last accepted is {last_accepted} at height {last_height}"
    )]
    OutOfOrderAccept {
        id: BlockId,
        height: u64,
        parent: BlockId,
        last_accepted: BlockId,
        last_height: u64,
    },
    #[error("block build aborted: {source}")]
    BuildAborted {
        #[source]
        source: anyhow::Error,
    },
    #[error("{stage} cancelled")]
    Cancelled { stage: PipelineStage },
    #[error(transparent)]
    State(#[from] StateError),
}

impl ChainError {
    pub fn aborted(source: impl Into<anyhow::Error>) -> Self {
        ChainError::BuildAborted {
            source: source.into(),
        }
    }

    /// Per-transaction rejections that a builder recovers from by excluding the transaction.
    pub fn is_transaction_rejection(&self) -> bool {
        matches!(
            self,
            ChainError::ExpiredTransaction { .. }
                | ChainError::DuplicateTransaction { .. }
                | ChainError::InvalidAuth { .. }
                | ChainError::InsufficientFunds { .. }
        )
    }
}
