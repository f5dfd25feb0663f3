//! Stage-transition events.
//!
//! The pipeline reports progress as typed [`StageEvent`]s delivered to an [`EventSink`]
//! so callers and tests can observe stage order without parsing log output.

use std::sync::Mutex;
use std::time::Duration;

use ethers::types::{Address, H256, U256};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::Stage;
use crate::poller::PollState;
use crate::round::VotingRound;

/// Outcome of a single poll of the proof-availability service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// The service answered but had no proof yet.
    NotReady,
    /// The request failed; counted as not ready.
    TransientError(String),
    /// Proof and response were returned.
    Ready,
}

/// Summary of a validated proof, emitted before the relay step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedDeposit {
    pub transaction_hash: H256,
    pub voting_round: VotingRound,
    pub block_number: String,
    pub block_timestamp: String,
    pub depositor: Address,
    pub receiver: Address,
    pub value: String,
    pub status: u8,
    pub event_count: usize,
    pub proof_nodes: usize,
}

/// Everything observable about a relay attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageEvent {
    StageStarted(Stage),
    StageCompleted(Stage),
    RequestPrepared { encoded_len: usize },
    FeeQuoted { fee: U256 },
    /// The fee schedule could not be read; the configured default was paid instead.
    FeeFallback { default_fee: U256, error: String },
    RequestSubmitted { tx_hash: H256, voting_round: VotingRound },
    PollStateChanged { state: PollState },
    WaitingForRoundClose { voting_round: VotingRound, delay: Duration },
    PollAttempt {
        attempt: u32,
        elapsed: Duration,
        outcome: PollOutcome,
        next_delay: Option<Duration>,
    },
    ProofValidated(VerifiedDeposit),
    VerificationPassed { voting_round: VotingRound },
    RootAlreadySynced { voting_round: VotingRound },
    RootSynced { voting_round: VotingRound, root: H256, tx_hash: H256 },
    DepositCredited { tx_hash: H256, prior_balance: U256, new_balance: U256 },
    StageFailed { stage: Stage, error: String },
}

/// Receiver of pipeline events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: StageEvent);
}

impl<F> EventSink for F
where
    F: Fn(StageEvent) + Send + Sync,
{
    fn emit(&self, event: StageEvent) {
        self(event)
    }
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: StageEvent) {}
}

/// Logs every event through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: StageEvent) {
        match event {
            StageEvent::StageStarted(stage) => info!("Stage {} started", stage),
            StageEvent::StageCompleted(stage) => info!("Stage {} completed", stage),
            StageEvent::RequestPrepared { encoded_len } => {
                info!("Request prepared ({} bytes)", encoded_len)
            }
            StageEvent::FeeQuoted { fee } => info!("Attestation fee: {} wei", fee),
            StageEvent::FeeFallback { default_fee, error } => warn!(
                "Fee quote failed ({}); paying default fee of {} wei",
                error, default_fee
            ),
            StageEvent::RequestSubmitted {
                tx_hash,
                voting_round,
            } => info!(
                "Attestation request {:#x} landed in voting round {}",
                tx_hash, voting_round
            ),
            StageEvent::PollStateChanged { state } => debug!("Poller entered {}", state),
            StageEvent::WaitingForRoundClose {
                voting_round,
                delay,
            } => info!(
                "Waiting {}s for voting round {} to close",
                delay.as_secs(),
                voting_round
            ),
            StageEvent::PollAttempt {
                attempt,
                elapsed,
                outcome,
                next_delay,
            } => match (&outcome, next_delay) {
                (PollOutcome::Ready, _) => info!(
                    "[{}s] Poll {}: proof available",
                    elapsed.as_secs(),
                    attempt
                ),
                (PollOutcome::TransientError(err), Some(delay)) => info!(
                    "[{}s] Poll {}: {}, retrying in {:.1}s",
                    elapsed.as_secs(),
                    attempt,
                    err,
                    delay.as_secs_f64()
                ),
                (_, Some(delay)) => info!(
                    "[{}s] Poll {}: not yet available, retrying in {:.1}s",
                    elapsed.as_secs(),
                    attempt,
                    delay.as_secs_f64()
                ),
                (_, None) => info!("[{}s] Poll {}: not yet available", elapsed.as_secs(), attempt),
            },
            StageEvent::ProofValidated(deposit) => info!(
                "Validated deposit {:#x}: {} wei from {:?} to {:?} \
                 (block {}, status {}, {} events, {} proof nodes)",
                deposit.transaction_hash,
                deposit.value,
                deposit.depositor,
                deposit.receiver,
                deposit.block_number,
                deposit.status,
                deposit.event_count,
                deposit.proof_nodes
            ),
            StageEvent::VerificationPassed { voting_round } => {
                info!("On-chain verification passed for round {}", voting_round)
            }
            StageEvent::RootAlreadySynced { voting_round } => {
                info!("Root for round {} already synced, skipping", voting_round)
            }
            StageEvent::RootSynced {
                voting_round,
                root,
                tx_hash,
            } => info!(
                "Synced root {:#x} for round {} in tx {:#x}",
                root, voting_round, tx_hash
            ),
            StageEvent::DepositCredited {
                tx_hash,
                prior_balance,
                new_balance,
            } => info!(
                "Deposit credited in tx {:#x}: balance {} -> {}",
                tx_hash, prior_balance, new_balance
            ),
            StageEvent::StageFailed { stage, error } => {
                tracing::error!("Stage {} failed: {}", stage, error)
            }
        }
    }
}

/// Forwards events into an unbounded tokio channel.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<StageEvent>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::UnboundedSender<StageEvent>) -> Self {
        Self { sender }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StageEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: StageEvent) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.sender.send(event);
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<StageEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StageEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Stages in the order they started.
    pub fn started_stages(&self) -> Vec<Stage> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                StageEvent::StageStarted(stage) => Some(stage),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: StageEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
