//! The five block pipeline stages and the machinery they share.

pub mod accepter;
pub mod auth_workers;
pub mod builder;
pub mod execution;
pub mod parser;
pub mod pre_executor;
pub mod processor;
pub mod validity_window;
pub mod verified;

pub use accepter::{AcceptedTip, Accepter};
pub use auth_workers::AuthWorkerPool;
pub use builder::{BuildLimits, Builder};
pub use execution::{store_key, ParentState};
pub use parser::parse_block;
pub use pre_executor::PreExecutor;
pub use processor::Processor;
pub use validity_window::ValidityWindow;
pub use verified::{AcceptOutcome, BuiltBlock, VerifiedBlock};
