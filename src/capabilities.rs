//! Narrow interfaces the pipeline consumes, plus default implementations for the ones
//! that have an obvious state-backed form.

pub mod auth;
pub mod balance;
pub mod clock;
pub mod mempool;
pub mod metadata;
pub mod rules;

pub use auth::{AuthError, AuthVm};
pub use balance::{BalanceError, BalanceHandler, StateBalances};
pub use clock::{Clock, SystemClock};
pub use mempool::Mempool;
pub use metadata::{MetadataManager, PrefixMetadata};
pub use rules::{RuleFactory, Rules, StaticRuleFactory};

use std::sync::Arc;

/// Capability bundle injected into [`Chain`](crate::Chain) at construction.
#[derive(Clone)]
pub struct Capabilities {
    pub mempool: Arc<dyn Mempool>,
    pub auth_vm: Arc<dyn AuthVm>,
    pub rule_factory: Arc<dyn RuleFactory>,
    pub metadata: Arc<dyn MetadataManager>,
    pub balances: Arc<dyn BalanceHandler>,
    pub clock: Arc<dyn Clock>,
}
