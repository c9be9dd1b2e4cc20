//! Bounded pool of credential verification workers.
//!
//! Jobs go through a bounded channel shared by every worker, so submitters wait once the
//! queue is full. Each verification runs on the blocking thread pool; a panicking
//! `AuthVm` fails that one credential instead of taking the worker down.

use crate::capabilities::auth::{AuthError, AuthVm};
use crate::chain::transaction::Transaction;
use crate::runtime::telemetry::Telemetry;
use anyhow::{anyhow, Result};
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct AuthJob {
    tx: Arc<Transaction>,
    reply: oneshot::Sender<Result<(), AuthError>>,
}

/// Why a batch could not be verified at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PoolFailure {
    Cancelled,
    Closed,
}

type SharedReceiver = Arc<AsyncMutex<mpsc::Receiver<AuthJob>>>;

pub struct AuthWorkerPool {
    jobs: mpsc::Sender<AuthJob>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl AuthWorkerPool {
    /// Spawns `workers` tasks on the current runtime. They exit when `shutdown` fires.
    pub fn spawn(
        vm: Arc<dyn AuthVm>,
        workers: usize,
        queue_capacity: usize,
        telemetry: Arc<Telemetry>,
        shutdown: CancellationToken,
    ) -> Self {
        let workers = workers.max(1);
        let (jobs, receiver) = mpsc::channel(queue_capacity.max(1));
        let receiver: SharedReceiver = Arc::new(AsyncMutex::new(receiver));

        let handles = (0..workers)
            .map(|worker_id| {
                let vm = Arc::clone(&vm);
                let receiver = Arc::clone(&receiver);
                let telemetry = Arc::clone(&telemetry);
                let worker_shutdown = shutdown.clone();

                tokio::spawn(async move {
                    let result = std::panic::AssertUnwindSafe(run_worker(
                        worker_id,
                        vm,
                        receiver,
                        telemetry,
                        worker_shutdown,
                    ))
                    .catch_unwind()
                    .await;

                    if let Err(panic_payload) = result {
                        let panic_msg = panic_message(panic_payload.as_ref());
                        tracing::error!(
                            worker = worker_id,
                            panic = %panic_msg,
                            "auth worker panicked"
                        );
                    }
                })
            })
            .collect();

        tracing::debug!(workers, queue_capacity, "auth worker pool started");

        Self {
            jobs,
            workers: Mutex::new(handles),
            shutdown,
        }
    }

    /// Verifies every transaction in `txs` and returns one result per transaction, in order.
    pub(crate) async fn verify_batch(
        &self,
        cancel: &CancellationToken,
        txs: &[Arc<Transaction>],
    ) -> Result<Vec<Result<(), AuthError>>, PoolFailure> {
        let mut pending = Vec::with_capacity(txs.len());
        for tx in txs {
            let (reply, response) = oneshot::channel();
            let job = AuthJob {
                tx: Arc::clone(tx),
                reply,
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PoolFailure::Cancelled),
                sent = self.jobs.send(job) => {
                    if sent.is_err() {
                        return Err(PoolFailure::Closed);
                    }
                }
            }
            pending.push(response);
        }

        let mut results = Vec::with_capacity(pending.len());
        for response in pending {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PoolFailure::Cancelled),
                outcome = response => {
                    results.push(outcome.unwrap_or_else(|_| {
                        Err(AuthError::WorkerFailed("worker dropped the job".to_string()))
                    }));
                }
            }
        }
        Ok(results)
    }

    pub(crate) async fn verify_one(
        &self,
        cancel: &CancellationToken,
        tx: &Arc<Transaction>,
    ) -> Result<Result<(), AuthError>, PoolFailure> {
        let mut results = self.verify_batch(cancel, std::slice::from_ref(tx)).await?;
        results.pop().ok_or(PoolFailure::Closed)
    }

    /// Stops the workers and waits for them. Reports the first worker that did not exit cleanly.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown.cancel();
        let handles = std::mem::take(&mut *self.workers.lock());
        let mut failure = None;
        for (worker_id, handle) in handles.into_iter().enumerate() {
            if let Err(err) = handle.await {
                tracing::warn!(worker = worker_id, error = %err, "auth worker join failed");
                failure.get_or_insert_with(|| anyhow!("auth worker {worker_id} failed: {err}"));
            }
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn run_worker(
    worker_id: usize,
    vm: Arc<dyn AuthVm>,
    receiver: SharedReceiver,
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
) {
    loop {
        let job = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                job = receiver.recv() => job,
            }
        };
        let Some(job) = job else {
            break;
        };

        let vm = Arc::clone(&vm);
        let tx = Arc::clone(&job.tx);
        let result = match tokio::task::spawn_blocking(move || vm.verify(tx.digest(), tx.auth()))
            .await
        {
            Ok(result) => result,
            Err(err) if err.is_panic() => {
                let panic_msg = panic_message(err.into_panic().as_ref());
                tracing::error!(
                    worker = worker_id,
                    tx = %job.tx.id(),
                    panic = %panic_msg,
                    "auth verification panicked"
                );
                Err(AuthError::WorkerFailed(panic_msg))
            }
            Err(err) => Err(AuthError::WorkerFailed(err.to_string())),
        };

        telemetry.record_auth(result.is_ok());
        let _ = job.reply.send(result);
    }
    tracing::debug!(worker = worker_id, "auth worker stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
