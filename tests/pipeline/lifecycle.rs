use crate::support::helpers::{
    balance, cancel, init_tracing, test_config, within, Harness, GENESIS_TS,
};
use crate::support::mocks::{transfer, Signer};
use anyhow::Result;
use chainexec::{
    Capabilities, Chain, ChainConfig, Genesis, PrefixMetadata, RuleFactory, Rules,
    StateBalances, StaticRuleFactory, SystemClock,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::support::mocks::{QueueMempool, TestAuth};

fn system_caps() -> Capabilities {
    Capabilities {
        mempool: Arc::new(QueueMempool::default()),
        auth_vm: Arc::new(TestAuth),
        rule_factory: Arc::new(StaticRuleFactory::default()),
        metadata: Arc::new(PrefixMetadata),
        balances: Arc::new(StateBalances),
        clock: Arc::new(SystemClock),
    }
}

struct BrokenRules;

impl RuleFactory for BrokenRules {
    fn rules(&self, _timestamp: i64) -> Arc<Rules> {
        Arc::new(Rules {
            min_unit_price: 0,
            ..Rules::default()
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn start_seeds_genesis_state() -> Result<()> {
    let alice = Signer::new(1);
    let bob = Signer::new(2);
    let harness = Harness::start(&[(alice.address(), 500), (bob.address(), 7)])?;

    let view = harness.chain.canonical_view();
    assert_eq!(balance(&view, &alice.address()), 500);
    assert_eq!(balance(&view, &bob.address()), 7);
    assert_eq!(balance(&view, &Signer::new(3).address()), 0);

    let genesis = harness.chain.genesis();
    assert_eq!(genesis.height(), 0);
    assert_eq!(genesis.timestamp(), GENESIS_TS);
    assert!(genesis.txs().is_empty());

    let tip = harness.chain.last_accepted();
    assert_eq!(tip.id, genesis.id());
    assert_eq!(tip.height, 0);
    assert_eq!(harness.chain.window_len(), 1);
    assert_eq!(harness.chain.state().version(), 1);
    harness.stop().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn start_rejects_invalid_rules() -> Result<()> {
    init_tracing();
    let caps = system_caps();
    let shutdown = CancellationToken::new();
    let chain = Chain::start(test_config(), caps.clone(), Genesis::default(), &shutdown)?;
    chain.stop().await?;

    let broken = Capabilities {
        rule_factory: Arc::new(BrokenRules),
        ..caps
    };
    let err = Chain::start(test_config(), broken, Genesis::default(), &shutdown)
        .err()
        .expect("invalid rules should be refused");
    assert!(format!("{err:#}").contains("min_unit_price"), "{err:#}");
    Ok(())
}

#[test]
fn start_requires_runtime() {
    let caps = system_caps();
    let result = Chain::start(
        test_config(),
        caps,
        Genesis::default(),
        &CancellationToken::new(),
    );
    let err = result.err().expect("start outside a runtime should fail");
    assert!(format!("{err}").contains("Tokio runtime"), "{err}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_is_idempotent_and_fails_pending_auth() -> Result<()> {
    let alice = Signer::new(1);
    let harness = Harness::start(&[(alice.address(), 1_000)])?;

    within("first stop", harness.chain.stop()).await??;
    within("second stop", harness.chain.stop()).await??;

    // the pool is gone, so the builder cannot authenticate candidates
    harness
        .mempool
        .push(alice.transfer(alice.address(), 1, harness.now() + 5_000));
    let parent_view = harness.chain.canonical_view();
    let result = within(
        "build after stop",
        harness
            .chain
            .build_block(&cancel(), &parent_view, harness.chain.genesis()),
    )
    .await?;
    assert!(result.is_err());
    assert_eq!(harness.mempool.len(), 1, "candidates go back on abort");
    harness.stop().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_token_stops_background_tasks() -> Result<()> {
    init_tracing();
    let config = ChainConfig::builder()
        .auth_workers(1)
        .metrics_interval(Duration::from_millis(10))
        .build()?;
    let caps = system_caps();
    let shutdown = CancellationToken::new();
    let chain = Chain::start(config, caps, Genesis::default(), &shutdown)?;

    tokio::time::sleep(Duration::from_millis(30)).await;
    shutdown.cancel();
    within("stop after shutdown", chain.stop()).await??;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn telemetry_tracks_pipeline_stages() -> Result<()> {
    let alice = Signer::new(1);
    let bob = Signer::new(2);
    let harness = Harness::start(&[(alice.address(), 1_000)])?;
    let expiry = harness.now() + 5_000;
    harness.mempool.push(alice.transfer(bob.address(), 1, expiry));
    harness
        .mempool
        .push(alice.forge(transfer(bob.address(), 2, expiry)));
    harness.mempool.push(alice.transfer(bob.address(), 3, expiry));

    let first = harness.build_and_accept(harness.chain.genesis()).await?;
    harness.clock.advance(1_000);
    let parent_view = harness.chain.canonical_view();
    let empty = within(
        "build",
        harness
            .chain
            .build_block(&cancel(), &parent_view, first.block()),
    )
    .await??;
    within(
        "verify",
        harness
            .chain
            .verify(&cancel(), &parent_view, Arc::clone(empty.block())),
    )
    .await??;

    let snapshot = harness.chain.telemetry().snapshot();
    assert_eq!(snapshot.built_blocks, 2);
    assert_eq!(snapshot.built_txs, 2);
    assert_eq!(snapshot.excluded_txs, 1);
    assert_eq!(snapshot.executed_blocks, 1);
    assert_eq!(snapshot.accepted_blocks, 1);
    assert_eq!(snapshot.accepted_txs, 2);
    assert_eq!(snapshot.auth_verifications, 3);
    assert_eq!(snapshot.auth_failures, 1);
    assert_eq!(snapshot.last_block_age_ms, 0);
    harness.stop().await
}
