use crate::support::helpers::{cancel, test_config, test_rules, within, Harness};
use crate::support::mocks::Signer;
use anyhow::{Context, Result};
use chainexec::{AcceptOutcome, ChainError, Rules};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn accepting_twice_is_a_noop() -> Result<()> {
    let alice = Signer::new(1);
    let bob = Signer::new(2);
    let harness = Harness::start(&[(alice.address(), 1_000)])?;
    harness
        .mempool
        .push(alice.transfer(bob.address(), 10, harness.now() + 5_000));

    let parent_view = harness.chain.canonical_view();
    let verified = within(
        "build",
        harness
            .chain
            .build_block(&cancel(), &parent_view, harness.chain.genesis()),
    )
    .await??
    .into_verified()
    .context("builder checks credentials by default")?;

    let outcome = harness.chain.accept_block(&verified)?;
    let AcceptOutcome::Accepted { version } = outcome else {
        panic!("first accept should commit, got {outcome:?}");
    };
    assert_eq!(harness.chain.state().version(), version);
    let before = harness.chain.telemetry().snapshot();

    assert_eq!(
        harness.chain.accept_block(&verified)?,
        AcceptOutcome::AlreadyAccepted
    );
    assert_eq!(harness.chain.state().version(), version);
    assert_eq!(harness.chain.telemetry().snapshot(), before);
    assert_eq!(harness.chain.last_accepted().id, verified.id());
    harness.stop().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn older_accepted_block_is_recognised() -> Result<()> {
    let harness = Harness::start(&[])?;
    let first = harness.build_and_accept(harness.chain.genesis()).await?;
    harness.clock.advance(500);
    let second = harness.build_and_accept(first.block()).await?;

    assert_eq!(
        harness.chain.accept_block(&first)?,
        AcceptOutcome::AlreadyAccepted
    );
    assert_eq!(harness.chain.last_accepted().id, second.id());
    harness.stop().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn child_of_unaccepted_block_is_refused() -> Result<()> {
    let harness = Harness::start(&[])?;
    let parent_view = harness.chain.canonical_view();
    let first = within(
        "build",
        harness
            .chain
            .build_block(&cancel(), &parent_view, harness.chain.genesis()),
    )
    .await??
    .into_verified()
    .context("builder checks credentials by default")?;
    let child = within(
        "build child",
        harness
            .chain
            .build_block(&cancel(), first.view(), first.block()),
    )
    .await??
    .into_verified()
    .context("builder checks credentials by default")?;

    let err = harness.chain.accept_block(&child).unwrap_err();
    match err {
        ChainError::OutOfOrderAccept {
            height,
            last_height,
            ..
        } => {
            assert_eq!(height, 2);
            assert_eq!(last_height, 0);
        }
        other => panic!("unexpected error: {other}"),
    }
    // only the genesis commit
    assert_eq!(harness.chain.state().version(), 1);
    harness.stop().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn window_evicts_blocks_past_validity() -> Result<()> {
    let rules = Rules {
        validity_window: 1_000,
        ..test_rules()
    };
    let harness = Harness::with(test_config(), rules, &[])?;
    assert_eq!(harness.chain.window_len(), 1);

    let mut parent = harness.build_and_accept(harness.chain.genesis()).await?;
    assert_eq!(harness.chain.window_len(), 2);

    for _ in 0..3 {
        harness.clock.advance(600);
        let next = harness.build_and_accept(parent.block()).await?;
        parent = next;
        assert_eq!(harness.chain.window_len(), 2);
    }
    assert_eq!(harness.chain.last_accepted().height, 4);
    harness.stop().await
}
