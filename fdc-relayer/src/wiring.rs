//! Builds the pipeline from configuration: one signing client per chain, the HTTP services and
//! the contract adapters for the chosen relay mode.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use fdc_relay::evm::{
    ChainClient, EvmAttestationHub, EvmDepositLedger, EvmRootRelay, EvmTrustlessLedger,
    EvmVerification,
};
use fdc_relay::executor::{DirectRelay, TrustlessRelay};
use fdc_relay::services::{HttpPreparationService, HttpProofSource};
use fdc_relay::{PipelineParts, RelayConfig, RelayMode, RelayPipeline, RelayStrategy};
use tracing::info;

use crate::config::SigningKeys;

pub struct Chains {
    pub attestation: ChainClient,
    pub destination: ChainClient,
}

impl Chains {
    pub async fn connect(config: &RelayConfig, keys: &SigningKeys) -> Result<Self> {
        let attestation =
            ChainClient::connect(&config.chains.attestation_rpc_url, &keys.attestation)
                .await
                .context("failed to connect to the attestation chain")?;
        let destination =
            ChainClient::connect(&config.chains.destination_rpc_url, &keys.destination)
                .await
                .context("failed to connect to the destination chain")?;
        Ok(Self {
            attestation,
            destination,
        })
    }
}

pub fn root_relay(config: &RelayConfig, chains: &Chains) -> Result<EvmRootRelay> {
    let relay = EvmRootRelay::new(
        chains.attestation.clone(),
        config.contracts.contract_registry()?,
        config.relay.relay_contract_name.clone(),
        config.relay.protocol_id,
    );
    Ok(match config.contracts.relay()? {
        Some(address) => relay.with_relay_address(address),
        None => relay,
    })
}

pub fn trustless_ledger(config: &RelayConfig, chains: &Chains) -> Result<EvmTrustlessLedger> {
    Ok(EvmTrustlessLedger::new(
        chains.destination.clone(),
        config.contracts.require_accounting()?,
    ))
}

fn strategy(
    config: &RelayConfig,
    chains: &Chains,
    mode: RelayMode,
) -> Result<Arc<dyn RelayStrategy>> {
    let accounting = config.contracts.require_accounting()?;
    info!("Relay mode {} crediting {:?}", mode, accounting);

    Ok(match mode {
        RelayMode::Direct => Arc::new(DirectRelay::new(
            Arc::new(EvmVerification::new(
                chains.attestation.clone(),
                config.contracts.fdc_verification()?,
            )),
            Arc::new(EvmDepositLedger::new(chains.destination.clone(), accounting)),
        )),
        RelayMode::Trustless => Arc::new(TrustlessRelay::new(
            Arc::new(root_relay(config, chains)?),
            Arc::new(trustless_ledger(config, chains)?),
        )),
    })
}

pub fn pipeline(config: &RelayConfig, chains: &Chains, mode: RelayMode) -> Result<RelayPipeline> {
    let timeout = Duration::from_secs(config.polling.request_timeout_secs);
    let parts = PipelineParts {
        preparation: Arc::new(HttpPreparationService::new(
            &config.services,
            &config.attestation,
            timeout,
        )?),
        hub: Arc::new(EvmAttestationHub::new(
            chains.attestation.clone(),
            config.contracts.fdc_hub()?,
            config.contracts.fee_config()?,
        )),
        proofs: Arc::new(HttpProofSource::new(&config.services, timeout)?),
        strategy: strategy(config, chains, mode)?,
    };
    Ok(RelayPipeline::new(config, parts)?)
}
