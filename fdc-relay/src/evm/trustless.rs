use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::Token;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, H256, U256};

use super::abi::{self, decode_bytes32, decode_uint, GET_BALANCE, MERKLE_ROOTS, ROOTS, SYNC_ROOT};
use super::client::ChainClient;
use super::registry::{EvmContractRegistry, RegistryLookup};
use crate::error::RelayResult;
use crate::executor::{CallReceipt, RootRelay, TrustlessLedger};
use crate::probe::{LedgerProbe, ProbeCall};
use crate::proof::ProofEnvelope;
use crate::round::VotingRound;

/// Consensus relay on the attestation chain, located through the contract registry.
#[derive(Debug)]
pub struct EvmRootRelay {
    client: ChainClient,
    relay: RegistryLookup,
    protocol_id: u64,
}

impl EvmRootRelay {
    pub fn new(
        client: ChainClient,
        registry: Address,
        relay_name: impl Into<String>,
        protocol_id: u64,
    ) -> Self {
        let registry = Arc::new(EvmContractRegistry::new(client.clone(), registry));
        Self {
            client,
            relay: RegistryLookup::new(registry, relay_name),
            protocol_id,
        }
    }

    /// Skip the registry lookup.
    pub fn with_relay_address(self, relay: Address) -> Self {
        Self {
            relay: self.relay.with_address(relay),
            ..self
        }
    }

    /// Relay address, resolved once.
    pub async fn relay_address(&self) -> RelayResult<Address> {
        self.relay.address().await
    }
}

#[async_trait]
impl RootRelay for EvmRootRelay {
    async fn merkle_root(&self, round: VotingRound) -> RelayResult<H256> {
        let relay = self.relay_address().await?;
        let data = abi::calldata(
            MERKLE_ROOTS,
            &[
                Token::Uint(U256::from(self.protocol_id)),
                Token::Uint(U256::from(round.as_u64())),
            ],
        );
        let ret = self.client.view("merkleRoots", relay, data).await?;
        decode_bytes32(&ret, "merkleRoots")
    }
}

/// Accounting contract on the destination chain that verifies proofs against synced roots.
#[derive(Clone, Debug)]
pub struct EvmTrustlessLedger {
    client: ChainClient,
    address: Address,
}

impl EvmTrustlessLedger {
    pub fn new(client: ChainClient, address: Address) -> Self {
        Self { client, address }
    }

    fn sync_root_calldata(round: VotingRound, root: H256) -> ethers::types::Bytes {
        abi::calldata(
            SYNC_ROOT,
            &[
                Token::Uint(U256::from(round.as_u64())),
                Token::FixedBytes(root.as_bytes().to_vec()),
            ],
        )
    }

    fn verify_and_credit_calldata(envelope: &ProofEnvelope) -> RelayResult<ethers::types::Bytes> {
        Ok(abi::calldata(
            &abi::verify_and_credit_signature(),
            &[
                abi::merkle_proof_token(envelope),
                abi::response_token(&envelope.response)?,
            ],
        ))
    }
}

#[async_trait]
impl TrustlessLedger for EvmTrustlessLedger {
    async fn stored_root(&self, round: VotingRound) -> RelayResult<H256> {
        let data = abi::calldata(ROOTS, &[Token::Uint(U256::from(round.as_u64()))]);
        let ret = self.client.view("roots", self.address, data).await?;
        decode_bytes32(&ret, "roots")
    }

    async fn sync_root(&self, round: VotingRound, root: H256) -> RelayResult<CallReceipt> {
        let mined = self
            .client
            .send(
                "syncRoot",
                self.address,
                Self::sync_root_calldata(round, root),
                None,
            )
            .await?;
        Ok(CallReceipt {
            tx_hash: mined.tx_hash,
            succeeded: mined.succeeded,
        })
    }

    async fn verify_and_credit(&self, envelope: &ProofEnvelope) -> RelayResult<CallReceipt> {
        let mined = self
            .client
            .send(
                "verifyAndCredit",
                self.address,
                Self::verify_and_credit_calldata(envelope)?,
                None,
            )
            .await?;
        Ok(CallReceipt {
            tx_hash: mined.tx_hash,
            succeeded: mined.succeeded,
        })
    }

    async fn balance(&self) -> RelayResult<U256> {
        let data = abi::calldata(GET_BALANCE, &[]);
        let ret = self.client.view("getBalance", self.address, data).await?;
        decode_uint(&ret, "getBalance")
    }
}

#[async_trait]
impl LedgerProbe for EvmTrustlessLedger {
    async fn static_verify_and_credit(&self, envelope: &ProofEnvelope) -> RelayResult<ProbeCall> {
        let data = Self::verify_and_credit_calldata(envelope)?;
        self.client
            .probe(self.address, data, self.client.address())
            .await
    }

    async fn static_sync_root_unauthorized(
        &self,
        round: VotingRound,
        root: H256,
    ) -> RelayResult<ProbeCall> {
        let outsider = LocalWallet::new(&mut rand::thread_rng()).address();
        self.client
            .probe(self.address, Self::sync_root_calldata(round, root), outsider)
            .await
    }
}
