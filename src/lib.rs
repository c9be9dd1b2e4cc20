pub mod capabilities;
pub mod chain;
pub mod error;
pub mod pipeline;
pub mod runtime;
pub mod state;

pub use capabilities::{
    AuthError, AuthVm, BalanceError, BalanceHandler, Capabilities, Clock, Mempool,
    MetadataManager, PrefixMetadata, RuleFactory, Rules, StateBalances, StaticRuleFactory,
    SystemClock,
};
pub use chain::{
    Action, Address, Auth, BlockId, CodecError, ExecutedBlock, ExecutionBlock, FeeState, Id,
    Transaction, TxId, TxResult, UnsignedTransaction,
};
pub use error::{AuthFailure, BlockFault, ChainError, PipelineStage, StateError};
pub use pipeline::{
    parse_block, AcceptOutcome, AcceptedTip, BuiltBlock, ValidityWindow, VerifiedBlock,
};
pub use runtime::chain::{Chain, Genesis};
pub use runtime::config::{ChainConfig, ChainConfigBuilder, ChainConfigParams};
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use state::{Checkpoint, StateStore, View};
