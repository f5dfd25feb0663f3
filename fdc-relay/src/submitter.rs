//! Attestation request submission.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::{H256, U256};
use tracing::info;

use crate::error::{RelayError, RelayResult};
use crate::events::{EventSink, StageEvent};
use crate::round::{RoundClock, VotingRound};
use crate::types::EncodedRequest;

/// Receipt of a mined hub transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub tx_hash: H256,
    pub block_number: u64,
    /// Receipt status was success.
    pub succeeded: bool,
}

/// Attestation hub plus its fee schedule, on the attestation chain.
#[async_trait]
pub trait AttestationHub: Send + Sync {
    /// Quote the fee for `request` from the fee-schedule contract.
    async fn request_fee(&self, request: &EncodedRequest) -> RelayResult<U256>;

    /// Native balance of the account paying for requests.
    async fn signer_balance(&self) -> RelayResult<U256>;

    /// Send the paying `requestAttestation` transaction and wait for its receipt.
    async fn submit_request(
        &self,
        request: &EncodedRequest,
        fee: U256,
    ) -> RelayResult<SubmissionReceipt>;

    /// Timestamp of block `number`.
    async fn block_timestamp(&self, number: u64) -> RelayResult<u64>;
}

/// Result of a successful submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubmissionResult {
    pub submission_tx_hash: H256,
    pub voting_round: VotingRound,
    pub block_number: u64,
    pub fee_paid: U256,
}

/// Pays for and submits attestation requests.
pub struct AttestationSubmitter {
    hub: Arc<dyn AttestationHub>,
    clock: RoundClock,
    default_fee: U256,
}

impl AttestationSubmitter {
    pub fn new(hub: Arc<dyn AttestationHub>, clock: RoundClock, default_fee: U256) -> Self {
        Self {
            hub,
            clock,
            default_fee,
        }
    }

    /// Submit `request` and derive the voting round it landed in.
    ///
    /// A failed fee quote falls back to the default fee with a warning. Nothing here is
    /// retried: a second attempt could pay the fee twice.
    pub async fn submit(
        &self,
        request: &EncodedRequest,
        signer_balance: U256,
        events: &dyn EventSink,
    ) -> RelayResult<SubmissionResult> {
        let fee = match self.hub.request_fee(request).await {
            Ok(fee) => {
                events.emit(StageEvent::FeeQuoted { fee });
                fee
            }
            Err(e) => {
                events.emit(StageEvent::FeeFallback {
                    default_fee: self.default_fee,
                    error: e.to_string(),
                });
                self.default_fee
            }
        };

        if signer_balance < fee {
            return Err(RelayError::InsufficientFunds {
                have: signer_balance,
                need: fee,
            });
        }

        let receipt = self.hub.submit_request(request, fee).await?;
        if !receipt.succeeded {
            return Err(RelayError::SubmissionReverted {
                call: "requestAttestation",
                tx_hash: Some(receipt.tx_hash),
                reason: None,
            });
        }
        info!(
            "Attestation request {:#x} mined in block {}",
            receipt.tx_hash, receipt.block_number
        );

        let voting_round = self.voting_round_of(&receipt).await?;
        events.emit(StageEvent::RequestSubmitted {
            tx_hash: receipt.tx_hash,
            voting_round,
        });

        Ok(SubmissionResult {
            submission_tx_hash: receipt.tx_hash,
            voting_round,
            block_number: receipt.block_number,
            fee_paid: fee,
        })
    }

    /// Round of a mined request. The fee is spent by now, so every failure is fatal.
    async fn voting_round_of(&self, receipt: &SubmissionReceipt) -> RelayResult<VotingRound> {
        let unresolved = |reason: RelayError| RelayError::RoundUnresolved {
            tx_hash: receipt.tx_hash,
            reason: reason.to_string(),
        };
        let timestamp = self
            .hub
            .block_timestamp(receipt.block_number)
            .await
            .map_err(unresolved)?;
        self.clock.round_for(timestamp).map_err(unresolved)
    }
}
