use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Rolling counters for every pipeline stage.
#[derive(Default, Debug)]
pub struct Telemetry {
    built_blocks: AtomicU64,
    built_txs: AtomicU64,
    excluded_txs: AtomicU64,
    executed_blocks: AtomicU64,
    executed_txs: AtomicU64,
    invalid_blocks: AtomicU64,
    accepted_blocks: AtomicU64,
    accepted_txs: AtomicU64,
    accept_latency_micros: AtomicU64,
    last_block_age_ms: AtomicU64,
    auth_verifications: AtomicU64,
    auth_failures: AtomicU64,
}

impl Telemetry {
    pub fn record_built_block(&self, txs: usize, excluded: usize) {
        self.built_blocks.fetch_add(1, Ordering::Relaxed);
        self.built_txs.fetch_add(txs as u64, Ordering::Relaxed);
        if excluded > 0 {
            self.excluded_txs
                .fetch_add(excluded as u64, Ordering::Relaxed);
        }
    }

    pub fn record_executed_block(&self, txs: usize) {
        self.executed_blocks.fetch_add(1, Ordering::Relaxed);
        self.executed_txs.fetch_add(txs as u64, Ordering::Relaxed);
    }

    pub fn record_invalid_block(&self) {
        self.invalid_blocks.fetch_add(1, Ordering::Relaxed);
    }

    /// `age` is how far the local clock was past the block timestamp at acceptance.
    pub fn record_accepted_block(&self, txs: usize, latency: Duration, age_ms: i64) {
        self.accepted_blocks.fetch_add(1, Ordering::Relaxed);
        self.accepted_txs.fetch_add(txs as u64, Ordering::Relaxed);
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.accept_latency_micros
            .fetch_add(micros, Ordering::Relaxed);
        self.last_block_age_ms
            .store(age_ms.max(0) as u64, Ordering::Relaxed);
    }

    pub fn record_auth(&self, ok: bool) {
        self.auth_verifications.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.auth_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            built_blocks: self.built_blocks.load(Ordering::Relaxed),
            built_txs: self.built_txs.load(Ordering::Relaxed),
            excluded_txs: self.excluded_txs.load(Ordering::Relaxed),
            executed_blocks: self.executed_blocks.load(Ordering::Relaxed),
            executed_txs: self.executed_txs.load(Ordering::Relaxed),
            invalid_blocks: self.invalid_blocks.load(Ordering::Relaxed),
            accepted_blocks: self.accepted_blocks.load(Ordering::Relaxed),
            accepted_txs: self.accepted_txs.load(Ordering::Relaxed),
            accept_latency_micros: self.accept_latency_micros.load(Ordering::Relaxed),
            last_block_age_ms: self.last_block_age_ms.load(Ordering::Relaxed),
            auth_verifications: self.auth_verifications.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
        }
    }

    pub fn accepted_blocks(&self) -> u64 {
        self.accepted_blocks.load(Ordering::Relaxed)
    }

    pub fn auth_failures(&self) -> u64 {
        self.auth_failures.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub built_blocks: u64,
    pub built_txs: u64,
    pub excluded_txs: u64,
    pub executed_blocks: u64,
    pub executed_txs: u64,
    pub invalid_blocks: u64,
    pub accepted_blocks: u64,
    pub accepted_txs: u64,
    pub accept_latency_micros: u64,
    pub last_block_age_ms: u64,
    pub auth_verifications: u64,
    pub auth_failures: u64,
}

impl TelemetrySnapshot {
    /// Mean accept latency in microseconds over all accepted blocks.
    pub fn mean_accept_latency_micros(&self) -> u64 {
        self.accept_latency_micros
            .checked_div(self.accepted_blocks)
            .unwrap_or(0)
    }
}

/// Spawns a background task that periodically logs acceptance throughput and stage counters.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "chainexec::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current = telemetry.snapshot();
                    let accepted_delta = current
                        .accepted_blocks
                        .saturating_sub(last_snapshot.accepted_blocks);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        accepted_delta as f64 / elapsed
                    };

                    tracing::info!(
                        target: "chainexec::metrics",
                        throughput = format!("{throughput:.2}"),
                        accepted = current.accepted_blocks,
                        accepted_txs = current.accepted_txs,
                        built = current.built_blocks,
                        excluded_txs = current.excluded_txs,
                        executed = current.executed_blocks,
                        invalid_blocks = current.invalid_blocks,
                        auth_failures = current.auth_failures,
                        accept_latency_us = current.mean_accept_latency_micros(),
                        block_age_ms = current.last_block_age_ms,
                        "pipeline metrics snapshot"
                    );

                    last_snapshot = current;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
