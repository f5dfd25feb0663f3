//! End-to-end pipeline runs against in-memory chains.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use ethers::types::{H256, U256};
use tokio::time::Instant;

use common::*;
use fdc_relay::events::RecordingSink;
use fdc_relay::executor::{DirectRelay, TrustlessRelay};
use fdc_relay::{
    DepositClaim, PipelineParts, ProofField, RelayConfig, RelayError, RelayMode, RelayPipeline,
    RelayStrategy, Stage, StageEvent, VotingRound,
};

fn claim() -> DepositClaim {
    DepositClaim::new(format!("{:#x}", deposit_hash()))
}

fn pipeline(
    proofs: Arc<DelayedProofs>,
    hub: Arc<MemoryHub>,
    strategy: Arc<dyn RelayStrategy>,
) -> (RelayPipeline, Arc<RecordingSink>) {
    let events = Arc::new(RecordingSink::new());
    let pipeline = RelayPipeline::new(
        &RelayConfig::default(),
        PipelineParts {
            preparation: StaticPreparation::new(),
            hub,
            proofs,
            strategy,
        },
    )
    .unwrap()
    .with_events(events.clone());
    (pipeline, events)
}

fn direct(ledger: Arc<MemoryLedger>) -> Arc<dyn RelayStrategy> {
    Arc::new(DirectRelay::new(Arc::new(FixedVerifier(true)), ledger))
}

fn failed_stages(events: &RecordingSink) -> Vec<Stage> {
    events
        .events()
        .into_iter()
        .filter_map(|event| match event {
            StageEvent::StageFailed { stage, .. } => Some(stage),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_direct_relay_runs_every_stage_in_order() {
    let hub = MemoryHub::new(U256::exp10(18));
    let proofs = DelayedProofs::new(2, ready_payload(deposit_hash(), "1"));
    let ledger = MemoryLedger::new();
    let (pipeline, events) = pipeline(proofs.clone(), hub.clone(), direct(ledger.clone()));

    let started = Instant::now();
    let report = pipeline.run(&claim()).await.unwrap();

    assert_eq!(
        events.started_stages(),
        vec![
            Stage::PrepareRequest,
            Stage::SubmitRequest,
            Stage::WaitForProof,
            Stage::ValidateProof,
            Stage::Relay,
        ]
    );
    assert_eq!(report.voting_round, VotingRound(3));
    assert_eq!(report.outcome.mode, RelayMode::Direct);
    assert_eq!(report.outcome.credited(), U256::from(DEPOSIT_VALUE));
    assert_eq!(hub.submission_count(), 1);
    assert_eq!(report.submission.unwrap().fee_paid, U256::from(1_000u64));

    // Third poll: 95s wait, then 10s and 15s retries.
    assert_eq!(proofs.calls.load(Ordering::SeqCst), 3);
    assert!(proofs.rounds.lock().unwrap().iter().all(|r| *r == VotingRound(3)));
    assert_eq!(started.elapsed().as_secs(), 120);
}

#[tokio::test(start_paused = true)]
async fn test_mismatched_proof_never_reaches_the_ledger() {
    let hub = MemoryHub::new(U256::exp10(18));
    let other_tx = H256::repeat_byte(0xbb);
    let proofs = DelayedProofs::new(0, ready_payload(other_tx, "1"));
    let ledger = MemoryLedger::new();
    let (pipeline, events) = pipeline(proofs, hub, direct(ledger.clone()));

    let failure = pipeline.run(&claim()).await.unwrap_err();

    assert_eq!(failure.stage, Stage::ValidateProof);
    match failure.error {
        RelayError::Mismatch(mismatch) => assert_eq!(mismatch.field, ProofField::TransactionHash),
        other => panic!("expected a mismatch, got {:?}", other),
    }
    assert_eq!(ledger.credit_calls.load(Ordering::SeqCst), 0);
    assert!(!events.started_stages().contains(&Stage::Relay));
    assert!(!events
        .events()
        .iter()
        .any(|event| matches!(event, StageEvent::ProofValidated(_))));
    assert_eq!(failed_stages(&events), vec![Stage::ValidateProof]);
}

#[tokio::test(start_paused = true)]
async fn test_validated_proof_is_summarised_before_relay() {
    let hub = MemoryHub::new(U256::exp10(18));
    let proofs = DelayedProofs::new(0, ready_payload(deposit_hash(), "1"));
    let (pipeline, events) = pipeline(proofs, hub, direct(MemoryLedger::new()));

    pipeline.run(&claim()).await.unwrap();

    let events = events.events();
    let position = |wanted: &StageEvent| events.iter().position(|event| event == wanted);
    let validated = events
        .iter()
        .position(|event| matches!(event, StageEvent::ProofValidated(_)))
        .expect("no ProofValidated event");
    let completed = position(&StageEvent::StageCompleted(Stage::ValidateProof)).unwrap();
    let relay = position(&StageEvent::StageStarted(Stage::Relay)).unwrap();
    assert!(completed < validated && validated < relay);

    match &events[validated] {
        StageEvent::ProofValidated(deposit) => {
            assert_eq!(deposit.transaction_hash, deposit_hash());
            assert_eq!(deposit.voting_round, VotingRound(3));
            assert_eq!(deposit.value, DEPOSIT_VALUE.to_string());
            assert_eq!(deposit.depositor, depositor());
            assert_eq!(deposit.block_number, "7000001");
            assert_eq!(deposit.status, 1);
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_source_transaction_is_rejected() {
    let hub = MemoryHub::new(U256::exp10(18));
    let proofs = DelayedProofs::new(0, ready_payload(deposit_hash(), "0"));
    let ledger = MemoryLedger::new();
    let (pipeline, _) = pipeline(proofs, hub, direct(ledger.clone()));

    let failure = pipeline.run(&claim()).await.unwrap_err();
    match failure.error {
        RelayError::Mismatch(mismatch) => assert_eq!(mismatch.field, ProofField::ExecutionStatus),
        other => panic!("expected a mismatch, got {:?}", other),
    }
    assert_eq!(ledger.credit_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_insufficient_funds_stops_before_polling() {
    let hub = MemoryHub::new(U256::from(10u64));
    let proofs = DelayedProofs::new(0, ready_payload(deposit_hash(), "1"));
    let (pipeline, _) = pipeline(proofs.clone(), hub.clone(), direct(MemoryLedger::new()));

    let failure = pipeline.run(&claim()).await.unwrap_err();

    assert_eq!(failure.stage, Stage::SubmitRequest);
    assert!(matches!(failure.error, RelayError::InsufficientFunds { .. }));
    assert_eq!(hub.submission_count(), 0);
    assert_eq!(proofs.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_then_resume_without_paying_again() {
    let hub = MemoryHub::new(U256::exp10(18));
    // Never ready within the 600s deadline.
    let slow = DelayedProofs::new(usize::MAX, ready_payload(deposit_hash(), "1"));
    let ledger = MemoryLedger::new();
    let (first, _) = pipeline(slow, hub.clone(), direct(ledger.clone()));

    let failure = first.run(&claim()).await.unwrap_err();
    assert_eq!(failure.stage, Stage::WaitForProof);
    assert!(matches!(failure.error, RelayError::TimeoutExceeded { .. }));
    assert!(failure.is_retry_safe());
    assert_eq!(hub.submission_count(), 1);

    let (encoded, _) = hub.submissions.lock().unwrap()[0].clone();
    let ready = DelayedProofs::new(0, ready_payload(deposit_hash(), "1"));
    let (second, events) = pipeline(ready, hub.clone(), direct(ledger.clone()));

    let prepared = second.prepared_from_encoded(&claim(), encoded).unwrap();
    let report = second
        .resume(VotingRound(3), prepared, &claim())
        .await
        .unwrap();

    assert!(report.submission.is_none());
    assert_eq!(hub.submission_count(), 1);
    assert_eq!(
        events.started_stages(),
        vec![Stage::WaitForProof, Stage::ValidateProof, Stage::Relay]
    );
    assert_eq!(report.outcome.new_balance, U256::from(DEPOSIT_VALUE));
}

#[tokio::test(start_paused = true)]
async fn test_relaying_the_same_deposit_twice_credits_once() {
    let ledger = MemoryLedger::new();

    let (first, _) = pipeline(
        DelayedProofs::new(0, ready_payload(deposit_hash(), "1")),
        MemoryHub::new(U256::exp10(18)),
        direct(ledger.clone()),
    );
    first.run(&claim()).await.unwrap();

    let (second, _) = pipeline(
        DelayedProofs::new(0, ready_payload(deposit_hash(), "1")),
        MemoryHub::new(U256::exp10(18)),
        direct(ledger.clone()),
    );
    let failure = second.run(&claim()).await.unwrap_err();

    assert_eq!(failure.stage, Stage::Relay);
    assert!(matches!(
        failure.error,
        RelayError::SubmissionReverted {
            reason: Some(fdc_relay::RevertReason::AlreadyProcessed),
            ..
        }
    ));
    assert_eq!(
        fdc_relay::executor::DepositLedger::balance_of(ledger.as_ref(), depositor())
            .await
            .unwrap(),
        U256::from(DEPOSIT_VALUE)
    );
}

#[tokio::test(start_paused = true)]
async fn test_trustless_relay_syncs_root_then_credits() {
    let root = H256::repeat_byte(0x77);
    let relay = MemoryRootRelay::with_root(3, root);
    let ledger = MemoryTrustlessLedger::new();
    let strategy: Arc<dyn RelayStrategy> =
        Arc::new(TrustlessRelay::new(relay.clone(), ledger.clone()));
    let (pipeline, events) = pipeline(
        DelayedProofs::new(0, ready_payload(deposit_hash(), "1")),
        MemoryHub::new(U256::exp10(18)),
        strategy,
    );

    let report = pipeline.run(&claim()).await.unwrap();

    assert_eq!(report.outcome.mode, RelayMode::Trustless);
    assert_eq!(report.outcome.credited(), U256::from(DEPOSIT_VALUE));
    assert_eq!(ledger.root_write_count(), 1);
    assert!(events.events().iter().any(|event| matches!(
        event,
        StageEvent::RootSynced { voting_round, root: synced, .. }
            if *voting_round == VotingRound(3) && *synced == root
    )));
}
