use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use tracing::info;

use super::{CallReceipt, RelayMode, RelayOutcome, RelayStrategy};
use crate::error::{RelayError, RelayResult};
use crate::events::{EventSink, StageEvent};
use crate::proof::ProofEnvelope;

/// Read-only proof verification on the attestation chain.
#[async_trait]
pub trait VerificationContract: Send + Sync {
    async fn verify(&self, envelope: &ProofEnvelope) -> RelayResult<bool>;
}

/// Accounting contract credited by a trusted relayer.
#[async_trait]
pub trait DepositLedger: Send + Sync {
    async fn balance_of(&self, depositor: Address) -> RelayResult<U256>;

    /// `creditDeposit(txHash, depositor, value)`; the contract rejects replayed hashes.
    async fn credit_deposit(
        &self,
        tx_hash: H256,
        depositor: Address,
        value: U256,
    ) -> RelayResult<CallReceipt>;
}

/// Verify remotely, then credit.
pub struct DirectRelay {
    verifier: Arc<dyn VerificationContract>,
    ledger: Arc<dyn DepositLedger>,
}

impl DirectRelay {
    pub fn new(verifier: Arc<dyn VerificationContract>, ledger: Arc<dyn DepositLedger>) -> Self {
        Self { verifier, ledger }
    }
}

#[async_trait]
impl RelayStrategy for DirectRelay {
    fn mode(&self) -> RelayMode {
        RelayMode::Direct
    }

    async fn execute(
        &self,
        envelope: &ProofEnvelope,
        events: &dyn EventSink,
    ) -> RelayResult<RelayOutcome> {
        let round = envelope.voting_round()?;
        if !self.verifier.verify(envelope).await? {
            return Err(RelayError::VerificationFailed { round });
        }
        events.emit(StageEvent::VerificationPassed {
            voting_round: round,
        });

        let tx_hash = envelope.transaction_hash();
        let depositor = envelope.depositor();
        let value = envelope.transfer_value()?;
        info!(
            "Crediting {} wei from {:?} for deposit {:#x}",
            value, depositor, tx_hash
        );

        let prior_balance = self.ledger.balance_of(depositor).await?;
        let receipt = self
            .ledger
            .credit_deposit(tx_hash, depositor, value)
            .await?
            .ensure_success("creditDeposit")?;
        let new_balance = self.ledger.balance_of(depositor).await?;

        events.emit(StageEvent::DepositCredited {
            tx_hash: receipt.tx_hash,
            prior_balance,
            new_balance,
        });

        Ok(RelayOutcome {
            mode: RelayMode::Direct,
            verified: true,
            prior_balance,
            new_balance,
            transaction_hash: receipt.tx_hash,
        })
    }
}
