//! Contract lookup through the attestation chain's registry.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::Address;
use tokio::sync::OnceCell;
use tracing::info;

use super::abi::{self, decode_address, GET_CONTRACT_ADDRESS_BY_NAME};
use super::client::ChainClient;
use crate::error::{RelayError, RelayResult};

/// Name-to-address registry. Unknown names resolve to the zero address.
#[async_trait]
pub trait ContractRegistry: Send + Sync {
    async fn contract_address(&self, name: &str) -> RelayResult<Address>;
}

/// Registry contract queried with `getContractAddressByName`.
#[derive(Clone, Debug)]
pub struct EvmContractRegistry {
    client: ChainClient,
    address: Address,
}

impl EvmContractRegistry {
    pub fn new(client: ChainClient, address: Address) -> Self {
        Self { client, address }
    }
}

#[async_trait]
impl ContractRegistry for EvmContractRegistry {
    async fn contract_address(&self, name: &str) -> RelayResult<Address> {
        let data = abi::calldata(
            GET_CONTRACT_ADDRESS_BY_NAME,
            &[Token::String(name.to_string())],
        );
        let ret = self
            .client
            .view("getContractAddressByName", self.address, data)
            .await?;
        decode_address(&ret, "getContractAddressByName")
    }
}

/// One named contract, resolved on first use and cached afterwards.
pub struct RegistryLookup {
    registry: Arc<dyn ContractRegistry>,
    name: String,
    resolved: OnceCell<Address>,
}

impl RegistryLookup {
    pub fn new(registry: Arc<dyn ContractRegistry>, name: impl Into<String>) -> Self {
        Self {
            registry,
            name: name.into(),
            resolved: OnceCell::new(),
        }
    }

    /// Use `address` without asking the registry.
    pub fn with_address(self, address: Address) -> Self {
        Self {
            resolved: OnceCell::new_with(Some(address)),
            ..self
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A failed lookup is not cached.
    pub async fn address(&self) -> RelayResult<Address> {
        self.resolved
            .get_or_try_init(|| async {
                let address = self.registry.contract_address(&self.name).await?;
                if address.is_zero() {
                    return Err(RelayError::Config(format!(
                        "contract `{}` is not registered",
                        self.name
                    )));
                }
                info!("Resolved {} at {:?}", self.name, address);
                Ok::<_, RelayError>(address)
            })
            .await
            .copied()
    }
}

impl fmt::Debug for RegistryLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryLookup")
            .field("name", &self.name)
            .field("resolved", &self.resolved.get())
            .finish()
    }
}
