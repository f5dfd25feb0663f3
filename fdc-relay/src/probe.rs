//! Edge-case probes against a deployed trustless accounting contract.
//!
//! Both probes are static calls: they cost nothing and change nothing. Each one names the
//! exact revert reason it requires; reverting for any other reason is not a pass.

use std::fmt;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256};
use num_bigint::BigUint;
use tracing::{info, warn};

use crate::error::RelayResult;
use crate::proof::{AttestationResponse, ProofEnvelope, ResponseBody};
use crate::request::AttestationTemplate;
use crate::revert::RevertReason;
use crate::round::VotingRound;

/// Voting round used by the probes; far beyond any round the relay could have synced.
pub const PROBE_ROUND: VotingRound = VotingRound(999_999);

/// How a static call ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeCall {
    Succeeded,
    /// Reverted; `None` when the node gave no decodable reason.
    Reverted(Option<RevertReason>),
}

/// Static-call access to the destination contract.
#[async_trait]
pub trait LedgerProbe: Send + Sync {
    /// `verifyAndCredit` with `envelope`, from the relayer account.
    async fn static_verify_and_credit(&self, envelope: &ProofEnvelope) -> RelayResult<ProbeCall>;

    /// `syncRoot(round, root)` from a freshly generated account that holds no role.
    async fn static_sync_root_unauthorized(
        &self,
        round: VotingRound,
        root: H256,
    ) -> RelayResult<ProbeCall>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeVerdict {
    /// Reverted with the required reason.
    Passed,
    /// The call went through.
    Failed,
    /// Reverted for another reason, or the call could not be made.
    Inconclusive(String),
}

impl fmt::Display for ProbeVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeVerdict::Passed => f.write_str("PASS"),
            ProbeVerdict::Failed => f.write_str("FAIL (did not revert)"),
            ProbeVerdict::Inconclusive(detail) => write!(f, "INCONCLUSIVE ({})", detail),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeReport {
    pub name: &'static str,
    pub required: RevertReason,
    pub verdict: ProbeVerdict,
}

impl ProbeReport {
    pub fn passed(&self) -> bool {
        self.verdict == ProbeVerdict::Passed
    }
}

/// Run both probes.
///
/// `receiver` should be the contract's deposit address, so that the dummy proof fails only
/// on its unsynced round.
pub async fn run_probes(
    probe: &dyn LedgerProbe,
    template: &AttestationTemplate,
    receiver: Address,
) -> Vec<ProbeReport> {
    let envelope = dummy_envelope(template, receiver);
    let unsynced = judge(
        "unsynced-round proof",
        RevertReason::RootNotSynced,
        probe.static_verify_and_credit(&envelope).await,
    );

    let fake_root = H256::from(ethers::utils::keccak256(b"fake"));
    let unauthorized = judge(
        "unauthorized root sync",
        RevertReason::Unauthorized,
        probe
            .static_sync_root_unauthorized(PROBE_ROUND, fake_root)
            .await,
    );

    vec![unsynced, unauthorized]
}

pub fn all_passed(reports: &[ProbeReport]) -> bool {
    reports.iter().all(ProbeReport::passed)
}

fn judge(
    name: &'static str,
    required: RevertReason,
    call: RelayResult<ProbeCall>,
) -> ProbeReport {
    let verdict = match call {
        Ok(ProbeCall::Reverted(Some(reason))) if reason == required => ProbeVerdict::Passed,
        Ok(ProbeCall::Reverted(Some(reason))) => {
            ProbeVerdict::Inconclusive(format!("reverted with `{}`", reason))
        }
        Ok(ProbeCall::Reverted(None)) => {
            ProbeVerdict::Inconclusive("reverted without a readable reason".into())
        }
        Ok(ProbeCall::Succeeded) => ProbeVerdict::Failed,
        Err(e) => ProbeVerdict::Inconclusive(e.to_string()),
    };

    if verdict == ProbeVerdict::Passed {
        info!("Probe `{}`: {}", name, verdict);
    } else {
        warn!("Probe `{}`: {} (required `{}`)", name, verdict, required);
    }

    ProbeReport {
        name,
        required,
        verdict,
    }
}

/// A well-formed proof for [`PROBE_ROUND`] paying one wei to `receiver`.
fn dummy_envelope(template: &AttestationTemplate, receiver: Address) -> ProofEnvelope {
    let request = template.request(H256::from_low_u64_be(1), 1);
    ProofEnvelope {
        merkle_proof: Vec::new(),
        response: AttestationResponse {
            attestation_type: request.attestation_type,
            source_id: request.source_id,
            voting_round: BigUint::from(PROBE_ROUND.as_u64()),
            lowest_used_timestamp: BigUint::from(0u8),
            request_body: request.request_body,
            response_body: ResponseBody {
                block_number: BigUint::from(0u8),
                block_timestamp: BigUint::from(0u8),
                source_address: Address::zero(),
                is_contract_deployment: false,
                receiving_address: receiver,
                transfer_value: BigUint::from(1u8),
                raw_input: Bytes::new(),
                execution_status: 1,
                events: Vec::new(),
            },
        },
    }
}
