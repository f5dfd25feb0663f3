//! Contract adapters over JSON-RPC.
//!
//! Each adapter implements one of the collaborator traits the pipeline is built from, so the
//! pipeline itself never touches a provider.

mod abi;
mod client;
mod direct;
mod hub;
mod registry;
mod trustless;

pub use abi::{decode_revert_data, proof_token, RESPONSE_TUPLE};
pub use client::{ChainClient, MinedTx};
pub use direct::{EvmDepositLedger, EvmVerification};
pub use hub::EvmAttestationHub;
pub use registry::{ContractRegistry, EvmContractRegistry, RegistryLookup};
pub use trustless::{EvmRootRelay, EvmTrustlessLedger};
