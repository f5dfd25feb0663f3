use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::{H256, U256};
use tracing::info;

use super::{CallReceipt, RelayMode, RelayOutcome, RelayStrategy, SyncedRoot};
use crate::error::{RelayError, RelayResult};
use crate::events::{EventSink, StageEvent};
use crate::proof::ProofEnvelope;
use crate::round::VotingRound;

/// Consensus relay on the attestation chain, holding one Merkle root per finalised round.
#[async_trait]
pub trait RootRelay: Send + Sync {
    /// Zero when the round has not been finalised yet.
    async fn merkle_root(&self, round: VotingRound) -> RelayResult<H256>;
}

/// Accounting contract that verifies proofs against roots it stores itself.
#[async_trait]
pub trait TrustlessLedger: Send + Sync {
    /// Zero when no root has been synced for `round`.
    async fn stored_root(&self, round: VotingRound) -> RelayResult<H256>;

    /// Store `root` for `round`. Restricted to the designated relayer.
    async fn sync_root(&self, round: VotingRound, root: H256) -> RelayResult<CallReceipt>;

    /// Submit the proof; the contract recomputes the leaf and checks it against the stored root.
    async fn verify_and_credit(&self, envelope: &ProofEnvelope) -> RelayResult<CallReceipt>;

    async fn balance(&self) -> RelayResult<U256>;
}

/// Sync the round's root, then let the destination contract verify and credit.
pub struct TrustlessRelay {
    relay: Arc<dyn RootRelay>,
    ledger: Arc<dyn TrustlessLedger>,
}

impl TrustlessRelay {
    pub fn new(relay: Arc<dyn RootRelay>, ledger: Arc<dyn TrustlessLedger>) -> Self {
        Self { relay, ledger }
    }

    /// Make sure the destination chain holds the root for `round`.
    ///
    /// Writes at most once: a non-zero stored root short-circuits without touching the relay.
    pub async fn ensure_root(
        &self,
        round: VotingRound,
        events: &dyn EventSink,
    ) -> RelayResult<SyncedRoot> {
        let stored = self.ledger.stored_root(round).await?;
        if !stored.is_zero() {
            events.emit(StageEvent::RootAlreadySynced {
                voting_round: round,
            });
            return Ok(SyncedRoot {
                voting_round: round,
                merkle_root: stored,
            });
        }

        let root = self.relay.merkle_root(round).await?;
        if root.is_zero() {
            return Err(RelayError::RootUnavailable { round });
        }

        info!("Syncing root {:#x} for round {}", root, round);
        let receipt = self
            .ledger
            .sync_root(round, root)
            .await?
            .ensure_success("syncRoot")?;
        events.emit(StageEvent::RootSynced {
            voting_round: round,
            root,
            tx_hash: receipt.tx_hash,
        });

        Ok(SyncedRoot {
            voting_round: round,
            merkle_root: root,
        })
    }
}

#[async_trait]
impl RelayStrategy for TrustlessRelay {
    fn mode(&self) -> RelayMode {
        RelayMode::Trustless
    }

    async fn execute(
        &self,
        envelope: &ProofEnvelope,
        events: &dyn EventSink,
    ) -> RelayResult<RelayOutcome> {
        let round = envelope.voting_round()?;
        self.ensure_root(round, events).await?;

        let prior_balance = self.ledger.balance().await?;
        let receipt = self
            .ledger
            .verify_and_credit(envelope)
            .await?
            .ensure_success("verifyAndCredit")?;
        let new_balance = self.ledger.balance().await?;

        events.emit(StageEvent::DepositCredited {
            tx_hash: receipt.tx_hash,
            prior_balance,
            new_balance,
        });

        Ok(RelayOutcome {
            mode: RelayMode::Trustless,
            verified: true,
            prior_balance,
            new_balance,
            transaction_hash: receipt.tx_hash,
        })
    }
}
