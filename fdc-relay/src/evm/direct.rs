use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{Address, H256, U256};

use super::abi::{self, decode_bool, decode_uint, CREDIT_DEPOSIT, GET_BALANCE_OF};
use super::client::ChainClient;
use crate::error::RelayResult;
use crate::executor::{CallReceipt, DepositLedger, VerificationContract};
use crate::proof::ProofEnvelope;

/// `FdcVerification` on the attestation chain.
#[derive(Clone, Debug)]
pub struct EvmVerification {
    client: ChainClient,
    address: Address,
}

impl EvmVerification {
    pub fn new(client: ChainClient, address: Address) -> Self {
        Self { client, address }
    }
}

#[async_trait]
impl VerificationContract for EvmVerification {
    async fn verify(&self, envelope: &ProofEnvelope) -> RelayResult<bool> {
        let data = abi::calldata(
            &abi::verify_evm_transaction_signature(),
            &[abi::proof_token(envelope)?],
        );
        let ret = self
            .client
            .view("verifyEVMTransaction", self.address, data)
            .await?;
        decode_bool(&ret, "verifyEVMTransaction")
    }
}

/// Accounting contract credited by the relayer account.
#[derive(Clone, Debug)]
pub struct EvmDepositLedger {
    client: ChainClient,
    address: Address,
}

impl EvmDepositLedger {
    pub fn new(client: ChainClient, address: Address) -> Self {
        Self { client, address }
    }
}

#[async_trait]
impl DepositLedger for EvmDepositLedger {
    async fn balance_of(&self, depositor: Address) -> RelayResult<U256> {
        let data = abi::calldata(GET_BALANCE_OF, &[Token::Address(depositor)]);
        let ret = self.client.view("getBalanceOf", self.address, data).await?;
        decode_uint(&ret, "getBalanceOf")
    }

    async fn credit_deposit(
        &self,
        tx_hash: H256,
        depositor: Address,
        value: U256,
    ) -> RelayResult<CallReceipt> {
        let data = abi::calldata(
            CREDIT_DEPOSIT,
            &[
                Token::FixedBytes(tx_hash.as_bytes().to_vec()),
                Token::Address(depositor),
                Token::Uint(value),
            ],
        );
        let mined = self
            .client
            .send("creditDeposit", self.address, data, None)
            .await?;
        Ok(CallReceipt {
            tx_hash: mined.tx_hash,
            succeeded: mined.succeeded,
        })
    }
}
