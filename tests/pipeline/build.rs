use std::sync::Arc;

use crate::support::helpers::{
    balance, cancel, test_config, test_rules, within, Harness, GENESIS_TS,
};
use crate::support::mocks::{store, transfer, Signer};
use anyhow::Result;
use chainexec::{ChainConfig, ChainError, Rules};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn build_excludes_replayed_and_expired_candidates() -> Result<()> {
    let alice = Signer::new(1);
    let bob = Signer::new(2);
    let carol = Signer::new(3);
    let harness = Harness::start(&[(alice.address(), 100), (carol.address(), 100)])?;

    let t0 = carol.transfer(bob.address(), 1, harness.now() + 5_000);
    harness.mempool.push(t0.clone());
    let block1 = harness.build_and_accept(harness.chain.genesis()).await?;
    assert_eq!(block1.block().txs().len(), 1);

    harness.clock.advance(1_000);
    let t1 = alice.transfer(bob.address(), 5, harness.now() + 5_000);
    let t3 = alice.transfer(bob.address(), 6, GENESIS_TS);
    harness.mempool.push(t1.clone());
    harness.mempool.push(t0.clone());
    harness.mempool.push(t3);

    let parent_view = harness.chain.canonical_view();
    let built = within(
        "build",
        harness
            .chain
            .build_block(&cancel(), &parent_view, block1.block()),
    )
    .await??;

    assert_eq!(
        built.block().tx_ids().collect::<Vec<_>>(),
        vec![t1.id()],
        "only the valid candidate should be included"
    );
    assert_eq!(built.excluded(), 2);
    assert_eq!(harness.mempool.len(), 0, "invalid candidates are dropped");

    let result = &built.executed().results()[0];
    assert!(result.success);
    assert_eq!(result.fee, 10);
    assert_eq!(balance(built.view(), &alice.address()), 85);
    assert_eq!(balance(built.view(), &bob.address()), 6);

    harness.stop().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn built_block_reexecutes_identically() -> Result<()> {
    let alice = Signer::new(1);
    let bob = Signer::new(2);
    let harness = Harness::start(&[(alice.address(), 1_000), (bob.address(), 15)])?;
    let expiry = harness.now() + 10_000;

    harness.mempool.push(alice.transfer(bob.address(), 40, expiry));
    harness.mempool.push(alice.sign(store(b"profile", b"v1", expiry)));
    // bob pays the fee but cannot cover the amount
    harness.mempool.push(bob.transfer(alice.address(), 500, expiry));
    harness.mempool.push(alice.sign(store(b"profile", b"", expiry + 1)));

    let parent_view = harness.chain.canonical_view();
    let built = within(
        "build",
        harness
            .chain
            .build_block(&cancel(), &parent_view, harness.chain.genesis()),
    )
    .await??;
    assert_eq!(built.block().txs().len(), 4);
    assert!(!built.executed().results()[2].success);

    let (executed, view) =
        harness
            .chain
            .execute(&cancel(), &parent_view, Arc::clone(built.block()))?;
    assert_eq!(executed.to_bytes(), built.executed().to_bytes());
    assert_eq!(
        view.diff().collect::<Vec<_>>(),
        built.view().diff().collect::<Vec<_>>()
    );

    harness.stop().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn candidates_beyond_tx_budget_are_restored() -> Result<()> {
    let alice = Signer::new(1);
    let config = ChainConfig::builder()
        .auth_workers(2)
        .max_block_txs(2)
        .build_batch_size(3)
        .build()?;
    let harness = Harness::with(config, test_rules(), &[(alice.address(), 1_000)])?;
    let expiry = harness.now() + 10_000;
    let txs: Vec<_> = (1..=3)
        .map(|amount| alice.transfer(alice.address(), amount, expiry))
        .collect();
    for tx in &txs {
        harness.mempool.push(tx.clone());
    }

    let parent_view = harness.chain.canonical_view();
    let built = within(
        "build",
        harness
            .chain
            .build_block(&cancel(), &parent_view, harness.chain.genesis()),
    )
    .await??;

    assert_eq!(built.block().txs().len(), 2);
    assert_eq!(harness.mempool.ids(), vec![txs[2].id()]);
    harness.stop().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn candidates_beyond_unit_budget_are_restored() -> Result<()> {
    let alice = Signer::new(1);
    let rules = Rules {
        max_block_units: 20,
        target_block_units: 20,
        ..test_rules()
    };
    let harness = Harness::with(test_config(), rules, &[(alice.address(), 1_000)])?;
    let expiry = harness.now() + 10_000;
    let big = alice.sign(store(b"k", b"v", expiry));
    let small = alice.transfer(alice.address(), 1, expiry);
    let small2 = alice.transfer(alice.address(), 2, expiry);
    harness.mempool.push(small.clone());
    harness.mempool.push(big.clone());
    harness.mempool.push(small2.clone());

    let parent_view = harness.chain.canonical_view();
    let built = within(
        "build",
        harness
            .chain
            .build_block(&cancel(), &parent_view, harness.chain.genesis()),
    )
    .await??;

    assert_eq!(
        built.block().tx_ids().collect::<Vec<_>>(),
        vec![small.id(), small2.id()]
    );
    assert_eq!(built.executed().units_consumed(), 20);
    assert_eq!(harness.mempool.ids(), vec![big.id()]);
    harness.stop().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn forged_candidates_are_excluded() -> Result<()> {
    let alice = Signer::new(1);
    let harness = Harness::start(&[(alice.address(), 1_000)])?;
    let expiry = harness.now() + 10_000;
    let forged = alice.forge(transfer(alice.address(), 1, expiry));
    let honest = alice.transfer(alice.address(), 2, expiry);
    harness.mempool.push(forged);
    harness.mempool.push(honest.clone());

    let parent_view = harness.chain.canonical_view();
    let built = within(
        "build",
        harness
            .chain
            .build_block(&cancel(), &parent_view, harness.chain.genesis()),
    )
    .await??;

    assert_eq!(built.block().tx_ids().collect::<Vec<_>>(), vec![honest.id()]);
    assert_eq!(built.excluded(), 1);
    assert_eq!(harness.chain.telemetry().auth_failures(), 1);
    harness.stop().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn empty_mempool_yields_empty_block() -> Result<()> {
    let harness = Harness::start(&[])?;
    let parent_view = harness.chain.canonical_view();
    let built = within(
        "build",
        harness
            .chain
            .build_block(&cancel(), &parent_view, harness.chain.genesis()),
    )
    .await??;

    assert!(built.block().txs().is_empty());
    assert_eq!(built.block().height(), 1);
    assert_eq!(built.block().timestamp(), harness.now());
    harness.stop().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelled_build_aborts_and_keeps_mempool() -> Result<()> {
    let alice = Signer::new(1);
    let harness = Harness::start(&[(alice.address(), 1_000)])?;
    harness
        .mempool
        .push(alice.transfer(alice.address(), 1, harness.now() + 1_000));

    let token = cancel();
    token.cancel();
    let parent_view = harness.chain.canonical_view();
    let err = harness
        .chain
        .build_block(&token, &parent_view, harness.chain.genesis())
        .await
        .unwrap_err();

    assert!(matches!(err, ChainError::BuildAborted { .. }), "{err}");
    assert_eq!(harness.mempool.len(), 1);
    harness.stop().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn timestamp_beyond_drift_aborts_build() -> Result<()> {
    let rules = Rules {
        min_block_gap: 20_000,
        ..test_rules()
    };
    let harness = Harness::with(test_config(), rules, &[])?;
    let parent_view = harness.chain.canonical_view();

    let err = harness
        .chain
        .build_block(&cancel(), &parent_view, harness.chain.genesis())
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::BuildAborted { .. }), "{err}");
    harness.stop().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unchecked_build_needs_verification_before_accept() -> Result<()> {
    let alice = Signer::new(1);
    let bob = Signer::new(2);
    let config = ChainConfig::builder()
        .auth_workers(2)
        .verify_auth_on_build(false)
        .build()?;
    let harness = Harness::with(config, test_rules(), &[(alice.address(), 1_000)])?;
    let expiry = harness.now() + 5_000;
    let forged = alice.forge(transfer(bob.address(), 50, expiry));
    harness.mempool.push(forged.clone());

    let parent_view = harness.chain.canonical_view();
    let built = within(
        "build",
        harness
            .chain
            .build_block(&cancel(), &parent_view, harness.chain.genesis()),
    )
    .await??;
    assert!(!built.auth_verified());
    assert_eq!(built.block().txs().len(), 1);
    assert!(built.clone().into_verified().is_none());

    let err = within("verify built", harness.chain.verify_built(&cancel(), built))
        .await?
        .unwrap_err();
    match &err {
        ChainError::InvalidAuth { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].id, forged.id());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        harness.chain.last_accepted().id,
        harness.chain.genesis().id()
    );
    assert_eq!(balance(&harness.chain.canonical_view(), &bob.address()), 0);

    // honest candidates pass the same route
    harness.mempool.push(alice.transfer(bob.address(), 50, expiry));
    let built = within(
        "build",
        harness
            .chain
            .build_block(&cancel(), &parent_view, harness.chain.genesis()),
    )
    .await??;
    let verified = within("verify built", harness.chain.verify_built(&cancel(), built)).await??;
    harness.chain.accept_block(&verified)?;
    assert_eq!(balance(&harness.chain.canonical_view(), &bob.address()), 50);
    harness.stop().await
}
