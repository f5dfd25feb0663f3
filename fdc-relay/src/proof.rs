//! Proof assembly.
//!
//! The proof-availability service returns loosely typed JSON: integers arrive as numbers,
//! decimal strings or hex strings, and optional fields are sometimes `null`, sometimes absent.
//! [`assemble`] turns that into a [`ProofEnvelope`] with arbitrary-precision integers and
//! explicit zero values, so equality and ABI encoding downstream are deterministic.

use ethers::types::{Address, Bytes, H256, U256};
use num_bigint::BigUint;
use serde::Deserialize;

use crate::error::{RelayError, RelayResult};
use crate::events::VerifiedDeposit;
use crate::poller::RawProofPayload;
use crate::request::RequestBody;
use crate::round::VotingRound;
use crate::types::null_as_default;

/// A Merkle inclusion proof together with the attested response it proves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofEnvelope {
    pub merkle_proof: Vec<H256>,
    pub response: AttestationResponse,
}

/// The attested statement about a source-chain transaction.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationResponse {
    pub attestation_type: H256,
    pub source_id: H256,
    #[serde(deserialize_with = "de::big_uint")]
    pub voting_round: BigUint,
    #[serde(deserialize_with = "de::big_uint")]
    pub lowest_used_timestamp: BigUint,
    /// Echo of the request this proof answers.
    pub request_body: RequestBody,
    pub response_body: ResponseBody,
}

/// What the attestation providers observed about the transaction.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
    #[serde(deserialize_with = "de::big_uint")]
    pub block_number: BigUint,
    #[serde(rename = "timestamp", deserialize_with = "de::big_uint")]
    pub block_timestamp: BigUint,
    pub source_address: Address,
    #[serde(rename = "isDeployment")]
    pub is_contract_deployment: bool,
    /// Zero address for contract deployments.
    #[serde(default, deserialize_with = "de::lenient_address")]
    pub receiving_address: Address,
    #[serde(rename = "value", deserialize_with = "de::big_uint")]
    pub transfer_value: BigUint,
    #[serde(rename = "input", default, deserialize_with = "de::lenient_bytes")]
    pub raw_input: Bytes,
    #[serde(rename = "status", with = "crate::types::quoted")]
    pub execution_status: u8,
    #[serde(default, deserialize_with = "null_as_default")]
    pub events: Vec<EventRecord>,
}

/// A log emitted by the attested transaction.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(with = "crate::types::quoted")]
    pub log_index: u32,
    pub emitter_address: Address,
    #[serde(default, deserialize_with = "null_as_default")]
    pub topics: Vec<H256>,
    #[serde(default, deserialize_with = "de::lenient_bytes")]
    pub data: Bytes,
    #[serde(default, deserialize_with = "null_as_default")]
    pub removed: bool,
}

/// Normalise a ready payload into a [`ProofEnvelope`].
pub fn assemble(raw: &RawProofPayload) -> RelayResult<ProofEnvelope> {
    let nodes = raw
        .proof
        .as_ref()
        .ok_or_else(|| RelayError::malformed("proof", "missing"))?;
    let merkle_proof = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| {
            node.trim()
                .parse::<H256>()
                .map_err(|e| RelayError::malformed(format!("proof[{}]", i), e))
        })
        .collect::<RelayResult<Vec<_>>>()?;

    let value = raw
        .response
        .as_ref()
        .filter(|value| !value.is_null())
        .ok_or_else(|| RelayError::malformed("response", "missing"))?;
    let response = AttestationResponse::deserialize(value)
        .map_err(|e| RelayError::malformed("response", e))?;

    Ok(ProofEnvelope {
        merkle_proof,
        response,
    })
}

impl ProofEnvelope {
    pub fn voting_round(&self) -> RelayResult<VotingRound> {
        to_u64(&self.response.voting_round, "votingRound").map(VotingRound)
    }

    pub fn transaction_hash(&self) -> H256 {
        self.response.request_body.transaction_hash
    }

    /// Sender of the attested transaction.
    pub fn depositor(&self) -> Address {
        self.response.response_body.source_address
    }

    pub fn transfer_value(&self) -> RelayResult<U256> {
        to_u256(&self.response.response_body.transfer_value, "value")
    }

    /// Structured summary used for the `ProofValidated` event.
    pub fn summary(&self) -> RelayResult<VerifiedDeposit> {
        let body = &self.response.response_body;
        Ok(VerifiedDeposit {
            transaction_hash: self.transaction_hash(),
            voting_round: self.voting_round()?,
            block_number: body.block_number.to_string(),
            block_timestamp: body.block_timestamp.to_string(),
            depositor: body.source_address,
            receiver: body.receiving_address,
            value: body.transfer_value.to_string(),
            status: body.execution_status,
            event_count: body.events.len(),
            proof_nodes: self.merkle_proof.len(),
        })
    }
}

/// Narrow to `uint64`, failing instead of truncating.
pub fn to_u64(value: &BigUint, field: &str) -> RelayResult<u64> {
    u64::try_from(value)
        .map_err(|_| RelayError::malformed(field, format!("{} does not fit in uint64", value)))
}

/// Narrow to `uint256`, failing instead of truncating.
pub fn to_u256(value: &BigUint, field: &str) -> RelayResult<U256> {
    let bytes = value.to_bytes_be();
    if bytes.len() > 32 {
        return Err(RelayError::malformed(
            field,
            format!("{} does not fit in uint256", value),
        ));
    }
    Ok(U256::from_big_endian(&bytes))
}

mod de {
    use super::*;
    use serde::de::Error;
    use serde::Deserializer;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Integer {
        Number(u64),
        Text(String),
    }

    /// JSON integer, decimal string or `0x` hex string.
    pub fn big_uint<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        match Integer::deserialize(deserializer)? {
            Integer::Number(n) => Ok(BigUint::from(n)),
            Integer::Text(text) => parse_big_uint(&text).map_err(D::Error::custom),
        }
    }

    pub(super) fn parse_big_uint(text: &str) -> Result<BigUint, String> {
        let text = text.trim();
        let (digits, radix) = match text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
        {
            Some(hex) => (hex, 16),
            None => (text, 10),
        };
        if digits.is_empty() {
            return Err(format!("`{}` is not an integer", text));
        }
        BigUint::parse_bytes(digits.as_bytes(), radix)
            .ok_or_else(|| format!("`{}` is not an integer", text))
    }

    /// Missing, `null` and empty strings become the zero address.
    pub fn lenient_address<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Address, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(Address::zero()),
            Some(text) if text.trim().is_empty() => Ok(Address::zero()),
            Some(text) => text.trim().parse::<Address>().map_err(D::Error::custom),
        }
    }

    /// Missing, `null`, `""` and `"0x"` become empty bytes.
    pub fn lenient_bytes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let text = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        let text = text.trim();
        let digits = text.strip_prefix("0x").unwrap_or(text);
        hex::decode(digits).map(Bytes::from).map_err(D::Error::custom)
    }
}
