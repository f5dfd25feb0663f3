//! Relay execution strategies.
//!
//! The final step of a relay differs only in how the destination chain is convinced that the
//! proof is genuine:
//!
//! - [`DirectRelay`]: a read-only verification contract on the attestation chain checks the
//!   proof, then a trusted relayer credits the deposit.
//! - [`TrustlessRelay`]: the voting round's Merkle root is copied to the destination chain,
//!   which then verifies the proof itself while crediting.
//!
//! Both report the accounting balance before and after the credit call.

mod direct;
mod trustless;

pub use direct::{DepositLedger, DirectRelay, VerificationContract};
pub use trustless::{RootRelay, TrustlessLedger, TrustlessRelay};

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use ethers::types::{H256, U256};
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, RelayResult};
use crate::events::EventSink;
use crate::proof::ProofEnvelope;
use crate::round::VotingRound;

/// How the destination chain learns that a proof is valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    Direct,
    Trustless,
}

impl fmt::Display for RelayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayMode::Direct => f.write_str("direct"),
            RelayMode::Trustless => f.write_str("trustless"),
        }
    }
}

impl FromStr for RelayMode {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(RelayMode::Direct),
            "trustless" => Ok(RelayMode::Trustless),
            other => Err(RelayError::InvalidInput(format!(
                "unknown relay mode `{}` (expected direct or trustless)",
                other
            ))),
        }
    }
}

/// Result of a successful relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayOutcome {
    pub mode: RelayMode,
    pub verified: bool,
    pub prior_balance: U256,
    pub new_balance: U256,
    /// Hash of the credit transaction.
    pub transaction_hash: H256,
}

impl RelayOutcome {
    /// Balance increase caused by the credit call.
    pub fn credited(&self) -> U256 {
        self.new_balance.saturating_sub(self.prior_balance)
    }
}

/// A Merkle root known to the destination chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncedRoot {
    pub voting_round: VotingRound,
    pub merkle_root: H256,
}

/// Receipt of a state-changing destination call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallReceipt {
    pub tx_hash: H256,
    pub succeeded: bool,
}

impl CallReceipt {
    /// Turn a failed receipt into `SubmissionReverted`.
    pub fn ensure_success(self, call: &'static str) -> RelayResult<Self> {
        if self.succeeded {
            Ok(self)
        } else {
            Err(RelayError::SubmissionReverted {
                call,
                tx_hash: Some(self.tx_hash),
                reason: None,
            })
        }
    }
}

/// Final on-chain step of a relay.
#[async_trait]
pub trait RelayStrategy: Send + Sync {
    fn mode(&self) -> RelayMode;

    /// Relay a validated proof.
    ///
    /// A rejected or reverted call is an error, never a panic, and no step is retried.
    async fn execute(
        &self,
        envelope: &ProofEnvelope,
        events: &dyn EventSink,
    ) -> RelayResult<RelayOutcome>;
}
