//! Signing JSON-RPC client shared by the contract adapters.

use std::sync::Arc;

use ethers::prelude::*;
use ethers::providers::MiddlewareError;
use ethers::types::transaction::eip2718::TypedTransaction;
use tracing::{debug, info};

use super::abi::decode_revert_data;
use crate::error::{RelayError, RelayResult};
use crate::probe::ProbeCall;
use crate::revert::RevertReason;

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// A mined transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MinedTx {
    pub tx_hash: H256,
    pub block_number: u64,
    pub succeeded: bool,
}

/// JSON-RPC provider with a local signing key.
#[derive(Clone, Debug)]
pub struct ChainClient {
    client: Arc<SignerClient>,
}

impl ChainClient {
    /// Connect to `rpc_url` and bind `private_key` to the chain's id.
    pub async fn connect(rpc_url: &str, private_key: &str) -> RelayResult<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| RelayError::Config(format!("invalid RPC URL `{}`: {}", rpc_url, e)))?;

        let wallet = parse_wallet(private_key)?;

        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| RelayError::Rpc(format!("eth_chainId on {}: {}", rpc_url, e)))?;
        let wallet = wallet.with_chain_id(chain_id.as_u64());
        info!(
            "Connected to chain {} at {} as {:?}",
            chain_id,
            rpc_url,
            wallet.address()
        );

        Ok(Self {
            client: Arc::new(SignerMiddleware::new(provider, wallet)),
        })
    }

    pub fn address(&self) -> Address {
        self.client.address()
    }

    pub async fn balance(&self) -> RelayResult<U256> {
        self.client
            .get_balance(self.address(), None)
            .await
            .map_err(|e| RelayError::Rpc(format!("eth_getBalance: {}", e)))
    }

    pub async fn block_timestamp(&self, number: u64) -> RelayResult<u64> {
        let block = self
            .client
            .get_block(number)
            .await
            .map_err(|e| RelayError::Rpc(format!("eth_getBlockByNumber({}): {}", number, e)))?
            .ok_or_else(|| RelayError::Rpc(format!("block {} not found", number)))?;
        Ok(block.timestamp.as_u64())
    }

    /// `eth_call` from the signer account.
    pub async fn view(&self, call: &str, to: Address, data: Bytes) -> RelayResult<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new()
            .from(self.address())
            .to(to)
            .data(data)
            .into();
        self.client.call(&tx, None).await.map_err(|e| {
            let reason = revert_reason(&e)
                .map(|reason| format!(" ({})", reason))
                .unwrap_or_default();
            RelayError::Rpc(format!("{} call failed{}: {}", call, reason, e))
        })
    }

    /// `eth_call` from `from`, reporting a revert as a value instead of an error.
    pub async fn probe(&self, to: Address, data: Bytes, from: Address) -> RelayResult<ProbeCall> {
        let tx: TypedTransaction = TransactionRequest::new().from(from).to(to).data(data).into();
        match self.client.inner().call(&tx, None).await {
            Ok(_) => Ok(ProbeCall::Succeeded),
            Err(e) => match MiddlewareError::as_error_response(&e) {
                Some(_) => Ok(ProbeCall::Reverted(revert_reason(&e))),
                None => Err(RelayError::Rpc(format!("eth_call: {}", e))),
            },
        }
    }

    /// Send a transaction and wait for one confirmation.
    ///
    /// A revert detected before mining (typically by the gas estimate) becomes
    /// `SubmissionReverted` carrying the decoded reason.
    pub async fn send(
        &self,
        call: &'static str,
        to: Address,
        data: Bytes,
        value: Option<U256>,
    ) -> RelayResult<MinedTx> {
        let mut tx = TransactionRequest::new().to(to).data(data);
        if let Some(value) = value {
            tx = tx.value(value);
        }

        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| match revert_reason(&e) {
                Some(reason) => RelayError::SubmissionReverted {
                    call,
                    tx_hash: None,
                    reason: Some(reason),
                },
                None => RelayError::Rpc(format!("{}: {}", call, e)),
            })?;
        let tx_hash = pending.tx_hash();
        debug!("{} sent: {:#x}", call, tx_hash);

        let receipt = pending
            .await
            .map_err(|e| RelayError::Rpc(format!("{} {:#x}: {}", call, tx_hash, e)))?
            .ok_or_else(|| {
                RelayError::Rpc(format!("{} {:#x} dropped from mempool", call, tx_hash))
            })?;

        Ok(MinedTx {
            tx_hash,
            block_number: receipt.block_number.map(|n| n.as_u64()).unwrap_or_default(),
            succeeded: receipt.status == Some(U64::from(1u64)),
        })
    }
}

/// Decode the revert reason carried by a JSON-RPC error, if any.
fn revert_reason<E: MiddlewareError>(err: &E) -> Option<RevertReason> {
    let response = err.as_error_response()?;
    if let Some(reason) = response
        .as_revert_data()
        .and_then(|data| decode_revert_data(&data))
    {
        return Some(reason);
    }
    let message = response.message.to_ascii_lowercase();
    if message.contains("revert") {
        Some(RevertReason::classify(&response.message))
    } else {
        None
    }
}

/// Hex private key, with or without a single `0x` prefix.
fn parse_wallet(private_key: &str) -> RelayResult<LocalWallet> {
    let private_key = private_key.trim();
    private_key
        .strip_prefix("0x")
        .unwrap_or(private_key)
        .parse::<LocalWallet>()
        .map_err(|e| RelayError::Config(format!("invalid private key: {}", e)))
}
