use crate::chain::block::MAX_BLOCK_TXS;
use crate::runtime::telemetry;
use crate::state::DEFAULT_MAX_LAYER_DEPTH;
use anyhow::{bail, Context, Result};
use std::time::Duration;

const DEFAULT_AUTH_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_MAX_BLOCK_TXS: usize = 10_000;
const DEFAULT_BUILD_BATCH_SIZE: usize = 256;
const DEFAULT_TARGET_BUILD_MILLIS: u64 = 200;

/// Runtime configuration for the execution pipeline.
///
/// All instances must be constructed via [`ChainConfig::builder`] or [`ChainConfig::new`]
/// so invariants are validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    auth_workers: usize,
    auth_queue_capacity: usize,
    max_block_txs: usize,
    build_batch_size: usize,
    target_build_duration: Duration,
    verify_auth_on_build: bool,
    max_layer_depth: usize,
    metrics_interval: Duration,
}

pub struct ChainConfigParams {
    pub auth_workers: usize,
    pub auth_queue_capacity: usize,
    pub max_block_txs: usize,
    pub build_batch_size: usize,
    pub target_build_duration: Duration,
    pub verify_auth_on_build: bool,
    pub max_layer_depth: usize,
    pub metrics_interval: Duration,
}

impl ChainConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> ChainConfigBuilder {
        ChainConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: ChainConfigParams) -> Result<Self> {
        let ChainConfigParams {
            auth_workers,
            auth_queue_capacity,
            max_block_txs,
            build_batch_size,
            target_build_duration,
            verify_auth_on_build,
            max_layer_depth,
            metrics_interval,
        } = params;

        let config = Self {
            auth_workers,
            auth_queue_capacity,
            max_block_txs,
            build_batch_size,
            target_build_duration,
            verify_auth_on_build,
            max_layer_depth,
            metrics_interval,
        };

        config.validate()?;
        Ok(config)
    }

    /// Number of auth verification workers.
    pub fn auth_workers(&self) -> usize {
        self.auth_workers
    }

    /// Jobs that may wait for an auth worker before submitters are held back.
    pub fn auth_queue_capacity(&self) -> usize {
        self.auth_queue_capacity
    }

    /// Upper bound on transactions in a built block.
    pub fn max_block_txs(&self) -> usize {
        self.max_block_txs
    }

    /// Candidates pulled from the mempool per round.
    pub fn build_batch_size(&self) -> usize {
        self.build_batch_size
    }

    /// Time after which the builder stops pulling candidates.
    pub fn target_build_duration(&self) -> Duration {
        self.target_build_duration
    }

    pub fn verify_auth_on_build(&self) -> bool {
        self.verify_auth_on_build
    }

    /// Uncompacted state layers kept behind the canonical pointer.
    pub fn max_layer_depth(&self) -> usize {
        self.max_layer_depth
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        if self.auth_workers == 0 {
            bail!("auth_workers must be greater than 0");
        }

        if self.auth_queue_capacity == 0 {
            bail!("auth_queue_capacity must be greater than 0");
        }

        if self.max_block_txs == 0 {
            bail!("max_block_txs must be greater than 0");
        }

        if self.max_block_txs > MAX_BLOCK_TXS {
            bail!(
                "max_block_txs ({}) cannot exceed the encodable limit of {}",
                self.max_block_txs,
                MAX_BLOCK_TXS
            );
        }

        if self.build_batch_size == 0 {
            bail!("build_batch_size must be greater than 0");
        }

        if self.target_build_duration.is_zero() {
            bail!("target_build_duration must be greater than 0");
        }

        if self.max_layer_depth == 0 {
            bail!("max_layer_depth must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct ChainConfigBuilder {
    auth_workers: Option<usize>,
    auth_queue_capacity: Option<usize>,
    max_block_txs: Option<usize>,
    build_batch_size: Option<usize>,
    target_build_duration: Option<Duration>,
    verify_auth_on_build: Option<bool>,
    max_layer_depth: Option<usize>,
    metrics_interval: Option<Duration>,
}

impl ChainConfigBuilder {
    pub fn auth_workers(mut self, workers: usize) -> Self {
        self.auth_workers = Some(workers);
        self
    }

    pub fn auth_queue_capacity(mut self, capacity: usize) -> Self {
        self.auth_queue_capacity = Some(capacity);
        self
    }

    pub fn max_block_txs(mut self, txs: usize) -> Self {
        self.max_block_txs = Some(txs);
        self
    }

    pub fn build_batch_size(mut self, size: usize) -> Self {
        self.build_batch_size = Some(size);
        self
    }

    pub fn target_build_duration(mut self, duration: Duration) -> Self {
        self.target_build_duration = Some(duration);
        self
    }

    pub fn verify_auth_on_build(mut self, verify: bool) -> Self {
        self.verify_auth_on_build = Some(verify);
        self
    }

    pub fn max_layer_depth(mut self, depth: usize) -> Self {
        self.max_layer_depth = Some(depth);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<ChainConfig> {
        let params = ChainConfigParams {
            auth_workers: self.auth_workers.context("auth_workers is required")?,
            auth_queue_capacity: self
                .auth_queue_capacity
                .unwrap_or(DEFAULT_AUTH_QUEUE_CAPACITY),
            max_block_txs: self.max_block_txs.unwrap_or(DEFAULT_MAX_BLOCK_TXS),
            build_batch_size: self.build_batch_size.unwrap_or(DEFAULT_BUILD_BATCH_SIZE),
            target_build_duration: self
                .target_build_duration
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_TARGET_BUILD_MILLIS)),
            verify_auth_on_build: self.verify_auth_on_build.unwrap_or(true),
            max_layer_depth: self.max_layer_depth.unwrap_or(DEFAULT_MAX_LAYER_DEPTH),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
        };

        ChainConfig::new(params)
    }
}
