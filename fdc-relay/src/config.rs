//! Relay configuration.
//!
//! Every section has a `Default` carrying the Coston2 / Sepolia testnet deployment, so a
//! partial configuration file only needs to name the values it overrides.

use std::time::Duration;

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, RelayResult};
use crate::poller::BackoffPolicy;
use crate::round::RoundClock;

/// Upper bound for `polling.backoff_multiplier`.
pub const MAX_BACKOFF_MULTIPLIER: f64 = 10.0;

/// Top-level relay configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Attestation preparation and proof-availability services.
    pub services: ServiceEndpoints,
    /// JSON-RPC endpoints.
    pub chains: ChainEndpoints,
    /// Contract addresses on both chains.
    pub contracts: ContractAddresses,
    /// Voting round timing of the attestation chain.
    pub timing: RoundTiming,
    /// Attestation request template.
    pub attestation: AttestationSettings,
    /// Fee handling.
    pub fees: FeeSettings,
    /// Proof polling schedule.
    pub polling: PollingSettings,
    /// Consensus relay lookup.
    pub relay: RelaySettings,
}

impl RelayConfig {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> RelayResult<()> {
        if self.timing.epoch_duration_secs <= 0 {
            return Err(RelayError::Config(format!(
                "timing.epoch_duration_secs must be positive, got {}",
                self.timing.epoch_duration_secs
            )));
        }
        let multiplier = self.polling.backoff_multiplier;
        if !(1.0..=MAX_BACKOFF_MULTIPLIER).contains(&multiplier) {
            return Err(RelayError::Config(format!(
                "polling.backoff_multiplier must be between 1.0 and {}, got {}",
                MAX_BACKOFF_MULTIPLIER, multiplier
            )));
        }
        if self.polling.first_retry_secs == 0 || self.polling.max_retry_secs == 0 {
            return Err(RelayError::Config(
                "polling.first_retry_secs and polling.max_retry_secs must be positive".into(),
            ));
        }
        if self.polling.first_retry_secs > self.polling.max_retry_secs {
            return Err(RelayError::Config(format!(
                "polling.first_retry_secs ({}) exceeds polling.max_retry_secs ({})",
                self.polling.first_retry_secs, self.polling.max_retry_secs
            )));
        }
        if self.polling.request_timeout_secs == 0 {
            return Err(RelayError::Config(
                "polling.request_timeout_secs must be positive".into(),
            ));
        }
        self.fees.default_fee()?;
        self.contracts.fdc_hub()?;
        self.contracts.fee_config()?;
        self.contracts.fdc_verification()?;
        self.contracts.contract_registry()?;
        self.contracts.relay()?;
        self.contracts.accounting()?;
        self.contracts.deposit_address()?;
        Ok(())
    }

    pub fn round_clock(&self) -> RelayResult<RoundClock> {
        RoundClock::new(
            self.timing.first_round_start_ts,
            self.timing.epoch_duration_secs,
        )
    }

    pub fn backoff(&self) -> BackoffPolicy {
        self.polling.backoff()
    }
}

/// HTTP services of the attestation network.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceEndpoints {
    /// Base URL of the verifier that prepares encoded requests.
    pub verifier_base_url: String,
    /// Base URL of the data-availability layer serving proofs.
    pub da_layer_url: String,
    /// Value of the `X-API-KEY` header.
    pub api_key: String,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            verifier_base_url: "https://fdc-verifiers-testnet.flare.network/".to_string(),
            da_layer_url: "https://ctn2-data-availability.flare.network/".to_string(),
            api_key: "00000000-0000-0000-0000-000000000000".to_string(),
        }
    }
}

/// JSON-RPC endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainEndpoints {
    /// Chain hosting the attestation hub (Coston2).
    pub attestation_rpc_url: String,
    /// Chain hosting the accounting contract (Sapphire).
    pub destination_rpc_url: String,
}

impl Default for ChainEndpoints {
    fn default() -> Self {
        Self {
            attestation_rpc_url: "https://coston2-api.flare.network/ext/C/rpc".to_string(),
            destination_rpc_url: "https://testnet.sapphire.oasis.io".to_string(),
        }
    }
}

/// Contract addresses, kept as strings and parsed on use.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractAddresses {
    pub fdc_hub: String,
    pub fee_config: String,
    pub fdc_verification: String,
    pub contract_registry: String,
    /// Consensus relay; resolved through the registry when unset.
    pub relay: Option<String>,
    /// Accounting contract on the destination chain.
    pub accounting: Option<String>,
    /// Source-chain address deposits are paid to; the probes' dummy proof pays it.
    pub deposit_address: Option<String>,
}

impl Default for ContractAddresses {
    fn default() -> Self {
        Self {
            fdc_hub: "0x48aC463d7975828989331F4De43341627b9c5f1D".to_string(),
            fee_config: "0x191a1282Ac700edE65c5B0AaF313BAcC3eA7fC7e".to_string(),
            fdc_verification: "0x075bf301fF07C4920e5261f93a0609640F53487D".to_string(),
            contract_registry: "0xaD67FE66660Fb8dFE9d6b1b4240d8650e30F6019".to_string(),
            relay: None,
            accounting: None,
            deposit_address: None,
        }
    }
}

impl ContractAddresses {
    pub fn fdc_hub(&self) -> RelayResult<Address> {
        parse_address("contracts.fdc_hub", &self.fdc_hub)
    }

    pub fn fee_config(&self) -> RelayResult<Address> {
        parse_address("contracts.fee_config", &self.fee_config)
    }

    pub fn fdc_verification(&self) -> RelayResult<Address> {
        parse_address("contracts.fdc_verification", &self.fdc_verification)
    }

    pub fn contract_registry(&self) -> RelayResult<Address> {
        parse_address("contracts.contract_registry", &self.contract_registry)
    }

    pub fn relay(&self) -> RelayResult<Option<Address>> {
        self.relay
            .as_deref()
            .map(|value| parse_address("contracts.relay", value))
            .transpose()
    }

    pub fn accounting(&self) -> RelayResult<Option<Address>> {
        self.accounting
            .as_deref()
            .map(|value| parse_address("contracts.accounting", value))
            .transpose()
    }

    pub fn deposit_address(&self) -> RelayResult<Option<Address>> {
        self.deposit_address
            .as_deref()
            .map(|value| parse_address("contracts.deposit_address", value))
            .transpose()
    }

    /// The accounting contract address, required by both relay modes.
    pub fn require_accounting(&self) -> RelayResult<Address> {
        self.accounting()?.ok_or_else(|| {
            RelayError::Config("contracts.accounting must be set to relay deposits".into())
        })
    }
}

fn parse_address(key: &str, value: &str) -> RelayResult<Address> {
    value
        .trim()
        .parse::<Address>()
        .map_err(|e| RelayError::Config(format!("{} `{}` is not an address: {}", key, value, e)))
}

/// Voting round timing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundTiming {
    /// Unix timestamp at which voting round 0 starts.
    pub first_round_start_ts: i64,
    /// Length of one voting round in seconds.
    pub epoch_duration_secs: i64,
}

impl Default for RoundTiming {
    fn default() -> Self {
        Self {
            first_round_start_ts: 1_658_430_000,
            epoch_duration_secs: 90,
        }
    }
}

/// Attestation request template.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AttestationSettings {
    /// Attestation type name, encoded as a 32-byte tag.
    pub attestation_type: String,
    /// Source network name, encoded as a 32-byte tag.
    pub source_id: String,
    /// Verifier path segment for the source network (`verifier/<path>/<type>/prepareRequest`).
    pub verifier_source_path: String,
    pub provide_input: bool,
    pub list_events: bool,
    /// Event log indices to include; empty includes every event.
    pub log_indices: Vec<u32>,
    pub required_confirmations: u16,
    /// Execution status the source transaction must have (1 = success).
    pub expected_status: u8,
}

impl Default for AttestationSettings {
    fn default() -> Self {
        Self {
            attestation_type: "EVMTransaction".to_string(),
            source_id: "testETH".to_string(),
            verifier_source_path: "eth".to_string(),
            provide_input: true,
            list_events: true,
            log_indices: Vec::new(),
            required_confirmations: 1,
            expected_status: 1,
        }
    }
}

/// Fee handling.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSettings {
    /// Fee paid when the fee schedule cannot be read, in native units (e.g. `"0.5"`).
    pub default_fee: String,
}

impl Default for FeeSettings {
    fn default() -> Self {
        Self {
            default_fee: "0.5".to_string(),
        }
    }
}

impl FeeSettings {
    /// Default fee in wei.
    pub fn default_fee(&self) -> RelayResult<U256> {
        ethers::utils::parse_ether(self.default_fee.trim()).map_err(|e| {
            RelayError::Config(format!(
                "fees.default_fee `{}` is not an amount: {}",
                self.default_fee, e
            ))
        })
    }
}

/// Proof polling schedule.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    /// Wait before the first poll, roughly one voting epoch.
    pub initial_delay_secs: u64,
    pub first_retry_secs: u64,
    pub backoff_multiplier: f64,
    pub max_retry_secs: u64,
    /// Overall deadline, measured from the start of the wait.
    pub deadline_secs: u64,
    /// Upper bound for a single poll request.
    pub request_timeout_secs: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            initial_delay_secs: 95,
            first_retry_secs: 10,
            backoff_multiplier: 1.5,
            max_retry_secs: 30,
            deadline_secs: 600,
            request_timeout_secs: 30,
        }
    }
}

impl PollingSettings {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial_delay: Duration::from_secs(self.initial_delay_secs),
            first_retry: Duration::from_secs(self.first_retry_secs),
            multiplier: self.backoff_multiplier,
            max_delay: Duration::from_secs(self.max_retry_secs),
            deadline: Duration::from_secs(self.deadline_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

/// Consensus relay lookup.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Protocol id under which attestation roots are stored.
    pub protocol_id: u64,
    /// Registry name of the consensus relay contract.
    pub relay_contract_name: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            protocol_id: 200,
            relay_contract_name: "Relay".to_string(),
        }
    }
}
