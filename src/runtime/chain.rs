use crate::capabilities::Capabilities;
use crate::chain::block::ExecutionBlock;
use crate::chain::executed::ExecutedBlock;
use crate::chain::fees::FeeState;
use crate::chain::ids::Address;
use crate::chain::transaction::Transaction;
use crate::error::ChainError;
use crate::pipeline::{
    parse_block, AcceptOutcome, AcceptedTip, Accepter, AuthWorkerPool, BuildLimits, Builder,
    BuiltBlock, ParentState, PreExecutor, Processor, ValidityWindow, VerifiedBlock,
};
use crate::runtime::config::ChainConfig;
use crate::runtime::telemetry::{self, Telemetry};
use crate::state::{StateStore, View};
use anyhow::{Context, Result};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Initial chain state: the genesis timestamp and funded accounts.
#[derive(Debug, Clone, Default)]
pub struct Genesis {
    pub timestamp: i64,
    pub allocations: Vec<(Address, u64)>,
}

/// Composition root wiring the pipeline stages over one state store.
///
/// Every operation takes its own cancellation token; the token passed to [`Chain::start`]
/// only governs the background tasks.
pub struct Chain {
    config: ChainConfig,
    store: Arc<StateStore>,
    window: Arc<RwLock<ValidityWindow>>,
    auth: Arc<AuthWorkerPool>,
    telemetry: Arc<Telemetry>,
    genesis: Arc<ExecutionBlock>,
    pre_executor: PreExecutor,
    builder: Builder,
    processor: Processor,
    accepter: Accepter,
    run_token: CancellationToken,
    metrics_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Chain {
    /// Commits the genesis state and spawns the auth workers and the metrics reporter.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        config: ChainConfig,
        caps: Capabilities,
        genesis: Genesis,
        shutdown: &CancellationToken,
    ) -> Result<Self> {
        tokio::runtime::Handle::try_current()
            .context("Chain::start must be called from within a Tokio runtime")?;

        let rules = caps.rule_factory.rules(genesis.timestamp);
        rules.validate().context("genesis rules are invalid")?;

        let genesis_block = Arc::new(ExecutionBlock::genesis(genesis.timestamp));
        let store = Arc::new(StateStore::new(config.max_layer_depth()));
        let mut view = store.view();
        ParentState {
            id: genesis_block.id(),
            height: 0,
            timestamp: genesis.timestamp,
            fees: FeeState::genesis(&rules),
        }
        .write(&mut view, &caps);
        for (account, amount) in &genesis.allocations {
            caps.balances
                .credit(&mut view, account, *amount)
                .with_context(|| format!("failed to allocate genesis balance to {account}"))?;
        }
        store.commit(&view);

        let window = Arc::new(RwLock::new(ValidityWindow::new()));
        window.write().insert(
            genesis_block.height(),
            genesis_block.id(),
            genesis_block.timestamp(),
            Vec::new(),
        );

        let run_token = shutdown.child_token();
        let telemetry = Arc::new(Telemetry::default());
        let auth = Arc::new(AuthWorkerPool::spawn(
            Arc::clone(&caps.auth_vm),
            config.auth_workers(),
            config.auth_queue_capacity(),
            Arc::clone(&telemetry),
            run_token.child_token(),
        ));
        let metrics_handle = telemetry::spawn_metrics_reporter(
            Arc::clone(&telemetry),
            run_token.clone(),
            config.metrics_interval(),
        );

        let pre_executor =
            PreExecutor::new(caps.clone(), Arc::clone(&window), Arc::clone(&auth));
        let builder = Builder::new(
            caps.clone(),
            Arc::clone(&window),
            Arc::clone(&auth),
            Arc::clone(&telemetry),
            BuildLimits::from(&config),
        );
        let processor = Processor::new(
            caps.clone(),
            Arc::clone(&window),
            Arc::clone(&auth),
            Arc::clone(&telemetry),
        );
        let accepter = Accepter::new(
            caps,
            Arc::clone(&store),
            Arc::clone(&window),
            Arc::clone(&telemetry),
            &genesis_block,
        );

        tracing::info!(
            genesis = %genesis_block.id().short(),
            timestamp = genesis.timestamp,
            accounts = genesis.allocations.len(),
            auth_workers = config.auth_workers(),
            "chain started"
        );

        Ok(Self {
            config,
            store,
            window,
            auth,
            telemetry,
            genesis: genesis_block,
            pre_executor,
            builder,
            processor,
            accepter,
            run_token,
            metrics_handle: Mutex::new(Some(metrics_handle)),
        })
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn genesis(&self) -> &Arc<ExecutionBlock> {
        &self.genesis
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    pub fn state(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Fresh view over the last accepted state.
    pub fn canonical_view(&self) -> View {
        self.store.view()
    }

    pub fn last_accepted(&self) -> AcceptedTip {
        self.accepter.last_accepted()
    }

    /// Accepted blocks still covered by replay protection.
    pub fn window_len(&self) -> usize {
        self.window.read().len()
    }

    pub async fn build_block(
        &self,
        cancel: &CancellationToken,
        parent_view: &View,
        parent: &ExecutionBlock,
    ) -> Result<BuiltBlock, ChainError> {
        self.builder.build_block(cancel, parent_view, parent).await
    }

    pub fn execute(
        &self,
        cancel: &CancellationToken,
        parent_view: &View,
        block: Arc<ExecutionBlock>,
    ) -> Result<(ExecutedBlock, View), ChainError> {
        self.processor.execute(cancel, parent_view, block)
    }

    pub async fn async_verify(
        &self,
        cancel: &CancellationToken,
        block: &ExecutionBlock,
    ) -> Result<(), ChainError> {
        self.processor.async_verify(cancel, block).await
    }

    pub async fn verify(
        &self,
        cancel: &CancellationToken,
        parent_view: &View,
        block: Arc<ExecutionBlock>,
    ) -> Result<VerifiedBlock, ChainError> {
        self.processor.verify(cancel, parent_view, block).await
    }

    /// Promotes a block from [`Chain::build_block`], verifying its credentials if the
    /// builder did not.
    pub async fn verify_built(
        &self,
        cancel: &CancellationToken,
        built: BuiltBlock,
    ) -> Result<VerifiedBlock, ChainError> {
        self.processor.verify_built(cancel, built).await
    }

    pub fn accept_block(&self, block: &VerifiedBlock) -> Result<AcceptOutcome, ChainError> {
        self.accepter.accept_block(block)
    }

    pub async fn pre_execute(
        &self,
        cancel: &CancellationToken,
        parent: &ExecutionBlock,
        view: &View,
        tx: &Arc<Transaction>,
        verify_auth: bool,
    ) -> Result<(), ChainError> {
        self.pre_executor
            .pre_execute(cancel, parent, view, tx, verify_auth)
            .await
    }

    pub fn parse_block(&self, bytes: &[u8]) -> Result<ExecutionBlock, ChainError> {
        parse_block(bytes)
    }

    /// Cancels the background tasks and waits for them to finish.
    pub async fn stop(&self) -> Result<()> {
        self.run_token.cancel();

        let metrics_handle = self.metrics_handle.lock().take();
        if let Some(handle) = metrics_handle {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "metrics reporter task panicked");
            }
        }

        self.auth.shutdown().await?;
        tracing::info!(
            accepted = self.telemetry.accepted_blocks(),
            "chain stopped"
        );
        Ok(())
    }
}
