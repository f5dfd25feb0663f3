//! Proof validation against the relay's own expectations.

use ethers::types::H256;

use crate::error::{MismatchError, ProofField};
use crate::proof::ProofEnvelope;
use crate::request::AttestationRequest;

/// What the relay expects the proof to say.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expectations {
    pub transaction_hash: H256,
    pub source_id: H256,
    pub execution_status: u8,
}

/// Check source id, transaction hash and execution status, in that order.
///
/// The first disagreement is returned; the caller must abandon the relay on any mismatch.
pub fn validate(envelope: &ProofEnvelope, expected: &Expectations) -> Result<(), MismatchError> {
    let response = &envelope.response;

    if response.source_id != expected.source_id {
        return Err(mismatch(
            ProofField::SourceId,
            hex_of(&expected.source_id),
            hex_of(&response.source_id),
        ));
    }

    // H256 equality is over bytes, so hex case never matters here.
    let actual_hash = response.request_body.transaction_hash;
    if actual_hash != expected.transaction_hash {
        return Err(mismatch(
            ProofField::TransactionHash,
            hex_of(&expected.transaction_hash),
            hex_of(&actual_hash),
        ));
    }

    let status = response.response_body.execution_status;
    if status != expected.execution_status {
        return Err(mismatch(
            ProofField::ExecutionStatus,
            expected.execution_status.to_string(),
            status.to_string(),
        ));
    }

    Ok(())
}

/// Check that the proof answers exactly the request this relay submitted.
pub fn validate_request_echo(
    envelope: &ProofEnvelope,
    submitted: &AttestationRequest,
) -> Result<(), MismatchError> {
    let echoed = &envelope.response.request_body;
    if echoed == &submitted.request_body
        && envelope.response.attestation_type == submitted.attestation_type
    {
        return Ok(());
    }
    Err(mismatch(
        ProofField::RequestBody,
        describe(&submitted.request_body),
        describe(echoed),
    ))
}

fn describe(body: &crate::request::RequestBody) -> String {
    serde_json::to_string(body).unwrap_or_else(|_| format!("{:?}", body))
}

fn hex_of(value: &H256) -> String {
    format!("{:#x}", value)
}

fn mismatch(field: ProofField, expected: String, actual: String) -> MismatchError {
    MismatchError {
        field,
        expected,
        actual,
    }
}
