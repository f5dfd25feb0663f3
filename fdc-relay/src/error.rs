//! Error types for the attestation relay.

use std::fmt;
use std::time::Duration;

use ethers::types::{H256, U256};
use thiserror::Error;

use crate::revert::RevertReason;
use crate::round::VotingRound;

/// Error type for every stage of the relay pipeline.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Malformed hash or parameter supplied by the caller.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The preparation service declined the request.
    #[error("preparation service rejected the request: {0}")]
    UpstreamRejected(String),

    /// The signer cannot pay the attestation fee.
    #[error("insufficient funds: have {have} wei, need {need} wei")]
    InsufficientFunds { have: U256, need: U256 },

    /// A state-changing call was mined with a failure status or rejected by the node.
    #[error("{call} reverted{}", describe_revert(.tx_hash, .reason))]
    SubmissionReverted {
        call: &'static str,
        tx_hash: Option<H256>,
        reason: Option<RevertReason>,
    },

    /// The attestation fee was paid but the voting round of the request is unknown.
    #[error(
        "attestation request mined in tx {tx_hash:#x} but its voting round is unknown: {reason}"
    )]
    RoundUnresolved { tx_hash: H256, reason: String },

    /// No proof became available before the deadline.
    #[error(
        "timed out after {}s waiting for proof (voting round {round}, {attempts} polls)",
        .elapsed.as_secs()
    )]
    TimeoutExceeded {
        round: VotingRound,
        elapsed: Duration,
        attempts: u32,
    },

    /// The proof does not describe the expected transaction.
    #[error(transparent)]
    Mismatch(#[from] MismatchError),

    /// The verification contract returned `false` for the proof.
    #[error("on-chain verification rejected the proof for voting round {round}")]
    VerificationFailed { round: VotingRound },

    /// The consensus relay has no Merkle root for the round yet.
    #[error("merkle root for voting round {round} is not yet available on the relay contract")]
    RootUnavailable { round: VotingRound },

    /// The proof payload could not be normalised.
    #[error("malformed proof payload: {field}: {reason}")]
    MalformedPayload { field: String, reason: String },

    /// JSON-RPC transport or contract call failure.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// HTTP transport failure talking to an attestation service.
    #[error("http error: {0}")]
    Http(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

fn describe_revert(tx_hash: &Option<H256>, reason: &Option<RevertReason>) -> String {
    let mut out = String::new();
    if let Some(hash) = tx_hash {
        out.push_str(&format!(" in tx {:#x}", hash));
    }
    if let Some(reason) = reason {
        out.push_str(&format!(": {}", reason));
    }
    out
}

impl RelayError {
    /// Whether re-running the failed stage with the same inputs cannot spend a second
    /// attestation fee or credit a deposit twice.
    pub fn is_retry_safe(&self) -> bool {
        match self {
            RelayError::InvalidInput(_)
            | RelayError::UpstreamRejected(_)
            | RelayError::InsufficientFunds { .. }
            | RelayError::TimeoutExceeded { .. }
            | RelayError::Mismatch(_)
            | RelayError::VerificationFailed { .. }
            | RelayError::RootUnavailable { .. }
            | RelayError::MalformedPayload { .. }
            | RelayError::Http(_)
            | RelayError::Config(_) => true,
            // The fee or credit may already be on chain.
            RelayError::SubmissionReverted { .. }
            | RelayError::RoundUnresolved { .. }
            | RelayError::Rpc(_) => false,
        }
    }

    pub(crate) fn malformed(field: impl Into<String>, reason: impl fmt::Display) -> Self {
        RelayError::MalformedPayload {
            field: field.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::Http(err.to_string())
    }
}

/// Proof fields checked by the validator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProofField {
    SourceId,
    TransactionHash,
    ExecutionStatus,
    RequestBody,
}

impl fmt::Display for ProofField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProofField::SourceId => "sourceId",
            ProofField::TransactionHash => "transactionHash",
            ProofField::ExecutionStatus => "status",
            ProofField::RequestBody => "requestBody",
        };
        f.write_str(name)
    }
}

/// First field on which a proof disagreed with the relay's expectations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field} mismatch: expected {expected}, got {actual}")]
pub struct MismatchError {
    pub field: ProofField,
    pub expected: String,
    pub actual: String,
}

/// Pipeline stages, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    PrepareRequest,
    SubmitRequest,
    WaitForProof,
    ValidateProof,
    Relay,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::PrepareRequest => "prepare-request",
            Stage::SubmitRequest => "submit-request",
            Stage::WaitForProof => "wait-for-proof",
            Stage::ValidateProof => "validate-proof",
            Stage::Relay => "relay",
        };
        f.write_str(name)
    }
}

/// A fatal error together with the stage it terminated.
#[derive(Error, Debug)]
#[error(
    "stage `{stage}` failed: {error} (retry-safe: {})",
    retry_label(.error)
)]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub error: RelayError,
}

fn retry_label(error: &RelayError) -> &'static str {
    if error.is_retry_safe() {
        "yes"
    } else {
        "no"
    }
}

impl StageFailure {
    pub fn new(stage: Stage, error: RelayError) -> Self {
        Self { stage, error }
    }

    pub fn is_retry_safe(&self) -> bool {
        self.error.is_retry_safe()
    }
}

/// Result alias used throughout the crate.
pub type RelayResult<T> = Result<T, RelayError>;
