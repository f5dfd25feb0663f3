use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{Address, U256};

use super::abi::{self, decode_uint, GET_REQUEST_FEE, REQUEST_ATTESTATION};
use super::client::ChainClient;
use crate::error::RelayResult;
use crate::submitter::{AttestationHub, SubmissionReceipt};
use crate::types::EncodedRequest;

/// `FdcHub` and `FdcRequestFeeConfigurations` on the attestation chain.
#[derive(Clone, Debug)]
pub struct EvmAttestationHub {
    client: ChainClient,
    hub: Address,
    fee_config: Address,
}

impl EvmAttestationHub {
    pub fn new(client: ChainClient, hub: Address, fee_config: Address) -> Self {
        Self {
            client,
            hub,
            fee_config,
        }
    }
}

#[async_trait]
impl AttestationHub for EvmAttestationHub {
    async fn request_fee(&self, request: &EncodedRequest) -> RelayResult<U256> {
        let data = abi::calldata(GET_REQUEST_FEE, &[Token::Bytes(request.bytes().to_vec())]);
        let ret = self.client.view("getRequestFee", self.fee_config, data).await?;
        decode_uint(&ret, "getRequestFee")
    }

    async fn signer_balance(&self) -> RelayResult<U256> {
        self.client.balance().await
    }

    async fn submit_request(
        &self,
        request: &EncodedRequest,
        fee: U256,
    ) -> RelayResult<SubmissionReceipt> {
        let data = abi::calldata(
            REQUEST_ATTESTATION,
            &[Token::Bytes(request.bytes().to_vec())],
        );
        let mined = self
            .client
            .send("requestAttestation", self.hub, data, Some(fee))
            .await?;
        Ok(SubmissionReceipt {
            tx_hash: mined.tx_hash,
            block_number: mined.block_number,
            succeeded: mined.succeeded,
        })
    }

    async fn block_timestamp(&self, number: u64) -> RelayResult<u64> {
        self.client.block_timestamp(number).await
    }
}
