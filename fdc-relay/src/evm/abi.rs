//! ABI encoding of attestation proofs and contract calls.
//!
//! Calldata is assembled by hand from a function signature and `Token`s; the proof structs
//! mirror the `IEVMTransaction` Solidity layout field for field.

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, H256, U256};

use crate::error::{RelayError, RelayResult};
use crate::proof::{to_u256, to_u64, AttestationResponse, EventRecord, ProofEnvelope, ResponseBody};
use crate::request::RequestBody;
use crate::revert::RevertReason;

/// Tuple type of `IEVMTransaction.Response`.
pub const RESPONSE_TUPLE: &str = "(bytes32,bytes32,uint64,uint64,(bytes32,uint16,bool,bool,uint32[]),(uint64,uint64,address,bool,address,uint256,bytes,uint8,(uint32,address,bytes32[],bytes,bool)[]))";

pub const REQUEST_ATTESTATION: &str = "requestAttestation(bytes)";
pub const GET_REQUEST_FEE: &str = "getRequestFee(bytes)";
pub const GET_CONTRACT_ADDRESS_BY_NAME: &str = "getContractAddressByName(string)";
pub const MERKLE_ROOTS: &str = "merkleRoots(uint256,uint256)";
pub const CREDIT_DEPOSIT: &str = "creditDeposit(bytes32,address,uint256)";
pub const GET_BALANCE_OF: &str = "getBalanceOf(address)";
pub const ROOTS: &str = "roots(uint256)";
pub const SYNC_ROOT: &str = "syncRoot(uint256,bytes32)";
pub const GET_BALANCE: &str = "getBalance()";

pub fn verify_evm_transaction_signature() -> String {
    format!("verifyEVMTransaction((bytes32[],{}))", RESPONSE_TUPLE)
}

pub fn verify_and_credit_signature() -> String {
    format!("verifyAndCredit(bytes32[],{})", RESPONSE_TUPLE)
}

/// Selector followed by the ABI-encoded arguments.
pub fn calldata(signature: &str, args: &[Token]) -> Bytes {
    let mut data = ethers::utils::id(signature).to_vec();
    data.extend_from_slice(&abi::encode(args));
    Bytes::from(data)
}

fn uint64(value: &num_bigint::BigUint, field: &str) -> RelayResult<Token> {
    to_u64(value, field).map(|v| Token::Uint(U256::from(v)))
}

pub fn request_body_token(body: &RequestBody) -> Token {
    Token::Tuple(vec![
        Token::FixedBytes(body.transaction_hash.as_bytes().to_vec()),
        Token::Uint(U256::from(body.required_confirmations)),
        Token::Bool(body.include_raw_input),
        Token::Bool(body.include_events),
        Token::Array(
            body.event_log_index_filter
                .iter()
                .map(|index| Token::Uint(U256::from(*index)))
                .collect(),
        ),
    ])
}

fn event_token(event: &EventRecord) -> Token {
    Token::Tuple(vec![
        Token::Uint(U256::from(event.log_index)),
        Token::Address(event.emitter_address),
        Token::Array(
            event
                .topics
                .iter()
                .map(|topic| Token::FixedBytes(topic.as_bytes().to_vec()))
                .collect(),
        ),
        Token::Bytes(event.data.to_vec()),
        Token::Bool(event.removed),
    ])
}

pub fn response_body_token(body: &ResponseBody) -> RelayResult<Token> {
    Ok(Token::Tuple(vec![
        uint64(&body.block_number, "blockNumber")?,
        uint64(&body.block_timestamp, "timestamp")?,
        Token::Address(body.source_address),
        Token::Bool(body.is_contract_deployment),
        Token::Address(body.receiving_address),
        Token::Uint(to_u256(&body.transfer_value, "value")?),
        Token::Bytes(body.raw_input.to_vec()),
        Token::Uint(U256::from(body.execution_status)),
        Token::Array(body.events.iter().map(event_token).collect()),
    ]))
}

pub fn response_token(response: &AttestationResponse) -> RelayResult<Token> {
    Ok(Token::Tuple(vec![
        Token::FixedBytes(response.attestation_type.as_bytes().to_vec()),
        Token::FixedBytes(response.source_id.as_bytes().to_vec()),
        uint64(&response.voting_round, "votingRound")?,
        uint64(&response.lowest_used_timestamp, "lowestUsedTimestamp")?,
        request_body_token(&response.request_body),
        response_body_token(&response.response_body)?,
    ]))
}

pub fn merkle_proof_token(envelope: &ProofEnvelope) -> Token {
    Token::Array(
        envelope
            .merkle_proof
            .iter()
            .map(|node| Token::FixedBytes(node.as_bytes().to_vec()))
            .collect(),
    )
}

/// `IEVMTransaction.Proof` as a single tuple.
pub fn proof_token(envelope: &ProofEnvelope) -> RelayResult<Token> {
    Ok(Token::Tuple(vec![
        merkle_proof_token(envelope),
        response_token(&envelope.response)?,
    ]))
}

fn decode_single(kind: ParamType, data: &[u8], call: &str) -> RelayResult<Token> {
    abi::decode(&[kind], data)
        .map_err(|e| RelayError::Rpc(format!("{}: undecodable return data: {}", call, e)))?
        .into_iter()
        .next()
        .ok_or_else(|| RelayError::Rpc(format!("{}: empty return data", call)))
}

pub fn decode_uint(data: &[u8], call: &str) -> RelayResult<U256> {
    match decode_single(ParamType::Uint(256), data, call)? {
        Token::Uint(value) => Ok(value),
        other => Err(RelayError::Rpc(format!("{}: expected uint, got {:?}", call, other))),
    }
}

pub fn decode_bool(data: &[u8], call: &str) -> RelayResult<bool> {
    match decode_single(ParamType::Bool, data, call)? {
        Token::Bool(value) => Ok(value),
        other => Err(RelayError::Rpc(format!("{}: expected bool, got {:?}", call, other))),
    }
}

pub fn decode_address(data: &[u8], call: &str) -> RelayResult<Address> {
    match decode_single(ParamType::Address, data, call)? {
        Token::Address(value) => Ok(value),
        other => Err(RelayError::Rpc(format!("{}: expected address, got {:?}", call, other))),
    }
}

pub fn decode_bytes32(data: &[u8], call: &str) -> RelayResult<H256> {
    match decode_single(ParamType::FixedBytes(32), data, call)? {
        Token::FixedBytes(bytes) if bytes.len() == 32 => Ok(H256::from_slice(&bytes)),
        other => Err(RelayError::Rpc(format!("{}: expected bytes32, got {:?}", call, other))),
    }
}

/// Decode `Error(string)` or one of the custom errors the accounting contracts may use
/// instead of revert strings.
pub fn decode_revert_data(data: &[u8]) -> Option<RevertReason> {
    if data.len() < 4 {
        return None;
    }
    let (selector, payload) = data.split_at(4);

    if selector == ethers::utils::id("Error(string)") {
        return match abi::decode(&[ParamType::String], payload).ok()?.pop()? {
            Token::String(message) => Some(RevertReason::classify(&message)),
            _ => None,
        };
    }

    let custom = [
        ("AlreadyProcessed()", RevertReason::AlreadyProcessed),
        ("Unauthorized()", RevertReason::Unauthorized),
        ("RootNotSynced()", RevertReason::RootNotSynced),
        ("WrongReceiver()", RevertReason::WrongReceiver),
        ("ZeroValue()", RevertReason::ZeroValue),
        ("InvalidProof()", RevertReason::InvalidProof),
    ];
    custom
        .into_iter()
        .find(|(signature, _)| selector == ethers::utils::id(signature))
        .map(|(_, reason)| reason)
}
