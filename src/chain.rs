//! Transactions, blocks and their canonical encodings.

pub mod action;
pub mod block;
pub mod codec;
pub mod executed;
pub mod fees;
pub mod ids;
pub mod transaction;

pub use action::{Action, ActionKind};
pub use block::ExecutionBlock;
pub use codec::CodecError;
pub use executed::{ExecutedBlock, TxResult};
pub use fees::FeeState;
pub use ids::{Address, BlockId, Id, TxId};
pub use transaction::{Auth, Transaction, UnsignedTransaction};
