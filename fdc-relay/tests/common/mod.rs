//! In-memory chains and services for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use serde_json::json;

use fdc_relay::executor::{
    CallReceipt, DepositLedger, RootRelay, TrustlessLedger, VerificationContract,
};
use fdc_relay::poller::{ProofSource, RawProofPayload};
use fdc_relay::proof::ProofEnvelope;
use fdc_relay::request::{AttestationRequest, PreparationResponse, PreparationService};
use fdc_relay::submitter::{AttestationHub, SubmissionReceipt};
use fdc_relay::{EncodedRequest, RelayError, RelayResult, RevertReason, VotingRound};

pub const DEPOSIT_VALUE: u64 = 100_000_000_000_000;
/// Inside voting round 3 with the default timing.
pub const SUBMISSION_TIMESTAMP: u64 = 1_658_430_275;

pub fn deposit_hash() -> H256 {
    H256::repeat_byte(0xaa)
}

pub fn depositor() -> Address {
    Address::from_low_u64_be(0xd1)
}

pub fn response_json(tx_hash: H256, status: &str) -> serde_json::Value {
    json!({
        "attestationType": "0x45564d5472616e73616374696f6e000000000000000000000000000000000000",
        "sourceId": "0x7465737445544800000000000000000000000000000000000000000000000000",
        "votingRound": "3",
        "lowestUsedTimestamp": "1658430270",
        "requestBody": {
            "transactionHash": format!("{:#x}", tx_hash),
            "requiredConfirmations": "1",
            "provideInput": true,
            "listEvents": true,
            "logIndices": []
        },
        "responseBody": {
            "blockNumber": "7000001",
            "timestamp": "1658430260",
            "sourceAddress": format!("{:#x}", depositor()),
            "isDeployment": false,
            "receivingAddress": "0x00000000000000000000000000000000000000e1",
            "value": DEPOSIT_VALUE.to_string(),
            "input": "0x",
            "status": status,
            "events": []
        }
    })
}

pub fn ready_payload(tx_hash: H256, status: &str) -> RawProofPayload {
    RawProofPayload {
        proof: Some(vec![
            format!("0x{}", "11".repeat(32)),
            format!("0x{}", "12".repeat(32)),
        ]),
        response: Some(response_json(tx_hash, status)),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ATTESTATION SIDE
// ═══════════════════════════════════════════════════════════════════════════════

/// Preparation service that encodes every request to the same bytes.
pub struct StaticPreparation {
    pub calls: AtomicUsize,
}

impl StaticPreparation {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl PreparationService for StaticPreparation {
    async fn prepare(&self, _request: &AttestationRequest) -> RelayResult<PreparationResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PreparationResponse {
            status: Some("VALID".into()),
            abi_encoded_request: Some(format!("0x{}", "ab".repeat(64))),
        })
    }
}

/// Hub whose every submission lands at [`SUBMISSION_TIMESTAMP`].
pub struct MemoryHub {
    pub balance: U256,
    pub submissions: Mutex<Vec<(EncodedRequest, U256)>>,
}

impl MemoryHub {
    pub fn new(balance: U256) -> Arc<Self> {
        Arc::new(Self {
            balance,
            submissions: Mutex::new(Vec::new()),
        })
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }
}

#[async_trait]
impl AttestationHub for MemoryHub {
    async fn request_fee(&self, _request: &EncodedRequest) -> RelayResult<U256> {
        Ok(U256::from(1_000u64))
    }

    async fn signer_balance(&self) -> RelayResult<U256> {
        Ok(self.balance)
    }

    async fn submit_request(
        &self,
        request: &EncodedRequest,
        fee: U256,
    ) -> RelayResult<SubmissionReceipt> {
        self.submissions
            .lock()
            .unwrap()
            .push((request.clone(), fee));
        Ok(SubmissionReceipt {
            tx_hash: H256::repeat_byte(0x5b),
            block_number: 1,
            succeeded: true,
        })
    }

    async fn block_timestamp(&self, _number: u64) -> RelayResult<u64> {
        Ok(SUBMISSION_TIMESTAMP)
    }
}

/// Serves nothing for the first `not_ready` requests, then `payload`.
pub struct DelayedProofs {
    pub not_ready: usize,
    pub payload: RawProofPayload,
    pub calls: AtomicUsize,
    pub rounds: Mutex<Vec<VotingRound>>,
}

impl DelayedProofs {
    pub fn new(not_ready: usize, payload: RawProofPayload) -> Arc<Self> {
        Arc::new(Self {
            not_ready,
            payload,
            calls: AtomicUsize::new(0),
            rounds: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ProofSource for DelayedProofs {
    async fn fetch_proof(
        &self,
        round: VotingRound,
        _request: &EncodedRequest,
    ) -> RelayResult<Option<RawProofPayload>> {
        self.rounds.lock().unwrap().push(round);
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.not_ready {
            Ok(None)
        } else {
            Ok(Some(self.payload.clone()))
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DESTINATION SIDE
// ═══════════════════════════════════════════════════════════════════════════════

pub struct FixedVerifier(pub bool);

#[async_trait]
impl VerificationContract for FixedVerifier {
    async fn verify(&self, _envelope: &ProofEnvelope) -> RelayResult<bool> {
        Ok(self.0)
    }
}

fn already_processed(call: &'static str) -> RelayError {
    RelayError::SubmissionReverted {
        call,
        tx_hash: None,
        reason: Some(RevertReason::AlreadyProcessed),
    }
}

/// Per-depositor ledger rejecting replayed deposit hashes.
#[derive(Default)]
pub struct MemoryLedger {
    balances: Mutex<HashMap<Address, U256>>,
    processed: Mutex<HashSet<H256>>,
    pub credit_calls: AtomicUsize,
}

impl MemoryLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl DepositLedger for MemoryLedger {
    async fn balance_of(&self, depositor: Address) -> RelayResult<U256> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&depositor)
            .copied()
            .unwrap_or_default())
    }

    async fn credit_deposit(
        &self,
        tx_hash: H256,
        depositor: Address,
        value: U256,
    ) -> RelayResult<CallReceipt> {
        self.credit_calls.fetch_add(1, Ordering::SeqCst);
        if !self.processed.lock().unwrap().insert(tx_hash) {
            return Err(already_processed("creditDeposit"));
        }
        *self
            .balances
            .lock()
            .unwrap()
            .entry(depositor)
            .or_default() += value;
        Ok(CallReceipt {
            tx_hash: H256::repeat_byte(0xc1),
            succeeded: true,
        })
    }
}

/// Consensus relay with a fixed root per round.
pub struct MemoryRootRelay {
    pub roots: HashMap<u64, H256>,
    pub reads: AtomicUsize,
}

impl MemoryRootRelay {
    pub fn with_root(round: u64, root: H256) -> Arc<Self> {
        Arc::new(Self {
            roots: HashMap::from([(round, root)]),
            reads: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl RootRelay for MemoryRootRelay {
    async fn merkle_root(&self, round: VotingRound) -> RelayResult<H256> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .roots
            .get(&round.as_u64())
            .copied()
            .unwrap_or_default())
    }
}

/// Trustless accounting contract: credits only proofs whose round root has been synced.
#[derive(Default)]
pub struct MemoryTrustlessLedger {
    roots: Mutex<HashMap<u64, H256>>,
    processed: Mutex<HashSet<H256>>,
    balance: Mutex<U256>,
    pub root_writes: AtomicUsize,
}

impl MemoryTrustlessLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn root_write_count(&self) -> usize {
        self.root_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrustlessLedger for MemoryTrustlessLedger {
    async fn stored_root(&self, round: VotingRound) -> RelayResult<H256> {
        Ok(self
            .roots
            .lock()
            .unwrap()
            .get(&round.as_u64())
            .copied()
            .unwrap_or_default())
    }

    async fn sync_root(&self, round: VotingRound, root: H256) -> RelayResult<CallReceipt> {
        self.root_writes.fetch_add(1, Ordering::SeqCst);
        self.roots.lock().unwrap().insert(round.as_u64(), root);
        Ok(CallReceipt {
            tx_hash: H256::repeat_byte(0x51),
            succeeded: true,
        })
    }

    async fn verify_and_credit(&self, envelope: &ProofEnvelope) -> RelayResult<CallReceipt> {
        let round = envelope.voting_round()?.as_u64();
        if !self.roots.lock().unwrap().contains_key(&round) {
            return Err(RelayError::SubmissionReverted {
                call: "verifyAndCredit",
                tx_hash: None,
                reason: Some(RevertReason::RootNotSynced),
            });
        }
        if !self
            .processed
            .lock()
            .unwrap()
            .insert(envelope.transaction_hash())
        {
            return Err(already_processed("verifyAndCredit"));
        }
        *self.balance.lock().unwrap() += envelope.transfer_value()?;
        Ok(CallReceipt {
            tx_hash: H256::repeat_byte(0xc2),
            succeeded: true,
        })
    }

    async fn balance(&self) -> RelayResult<U256> {
        Ok(*self.balance.lock().unwrap())
    }
}
