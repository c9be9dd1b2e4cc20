//! Runtime glue that wires configuration, telemetry and the chain lifecycle.

pub mod chain;
pub mod config;
pub mod telemetry;
