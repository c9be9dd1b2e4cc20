use crate::support::helpers::{cancel, within, Harness, GENESIS_TS};
use crate::support::mocks::{transfer, Signer};
use anyhow::Result;
use chainexec::{ChainError, PipelineStage};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn admits_valid_transaction_without_writing() -> Result<()> {
    let alice = Signer::new(1);
    let bob = Signer::new(2);
    let harness = Harness::start(&[(alice.address(), 100)])?;
    let view = harness.chain.canonical_view();
    let tx = alice.transfer(bob.address(), 90, GENESIS_TS + 5_000);

    within(
        "pre-execute",
        harness
            .chain
            .pre_execute(&cancel(), harness.chain.genesis(), &view, &tx, true),
    )
    .await??;
    assert_eq!(view.pending_len(), 0);
    harness.stop().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rejects_in_check_order() -> Result<()> {
    let alice = Signer::new(1);
    let bob = Signer::new(2);
    let poor = Signer::new(3);
    let harness = Harness::start(&[(alice.address(), 1_000), (poor.address(), 5)])?;
    let genesis = harness.chain.genesis();
    let view = harness.chain.canonical_view();

    // expiry before the parent timestamp wins over the bad credential
    let stale_forged = alice.forge(transfer(bob.address(), 1, GENESIS_TS - 1));
    let err = harness
        .chain
        .pre_execute(&cancel(), genesis, &view, &stale_forged, true)
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            ChainError::ExpiredTransaction {
                valid_from: GENESIS_TS,
                valid_until,
                ..
            } if valid_until == GENESIS_TS + 60_000
        ),
        "{err}"
    );

    let too_far = alice.transfer(bob.address(), 1, GENESIS_TS + 60_001);
    let err = harness
        .chain
        .pre_execute(&cancel(), genesis, &view, &too_far, true)
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::ExpiredTransaction { .. }), "{err}");

    let forged = alice.forge(transfer(bob.address(), 1, GENESIS_TS + 5_000));
    let err = within(
        "pre-execute",
        harness
            .chain
            .pre_execute(&cancel(), genesis, &view, &forged, true),
    )
    .await?
    .unwrap_err();
    match &err {
        ChainError::InvalidAuth { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].id, forged.id());
        }
        other => panic!("unexpected error: {other}"),
    }

    // the forged credential is only caught when asked for
    within(
        "pre-execute",
        harness
            .chain
            .pre_execute(&cancel(), genesis, &view, &forged, false),
    )
    .await??;

    let broke = poor.transfer(bob.address(), 1, GENESIS_TS + 5_000);
    let err = within(
        "pre-execute",
        harness
            .chain
            .pre_execute(&cancel(), genesis, &view, &broke, true),
    )
    .await?
    .unwrap_err();
    match err {
        ChainError::InsufficientFunds {
            sponsor,
            required,
            available,
            ..
        } => {
            assert_eq!(sponsor, poor.address());
            assert_eq!(required, 10);
            assert_eq!(available, 5);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(view.pending_len(), 0);
    harness.stop().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rejects_transaction_already_accepted() -> Result<()> {
    let alice = Signer::new(1);
    let bob = Signer::new(2);
    let harness = Harness::start(&[(alice.address(), 1_000)])?;
    let tx = alice.transfer(bob.address(), 1, harness.now() + 5_000);
    harness.mempool.push(tx.clone());
    let block = harness.build_and_accept(harness.chain.genesis()).await?;

    let err = within(
        "pre-execute",
        harness.chain.pre_execute(
            &cancel(),
            block.block(),
            &harness.chain.canonical_view(),
            &tx,
            true,
        ),
    )
    .await?
    .unwrap_err();
    assert!(
        matches!(err, ChainError::DuplicateTransaction { id } if id == tx.id()),
        "{err}"
    );
    harness.stop().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelled_pre_execute_stops() -> Result<()> {
    let alice = Signer::new(1);
    let harness = Harness::start(&[(alice.address(), 1_000)])?;
    let tx = alice.transfer(alice.address(), 1, GENESIS_TS + 5_000);
    let token = cancel();
    token.cancel();

    let err = harness
        .chain
        .pre_execute(
            &token,
            harness.chain.genesis(),
            &harness.chain.canonical_view(),
            &tx,
            true,
        )
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            ChainError::Cancelled {
                stage: PipelineStage::PreExecute
            }
        ),
        "{err}"
    );
    harness.stop().await
}
