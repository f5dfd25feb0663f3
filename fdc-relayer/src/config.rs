//! Relayer configuration.
//!
//! Layers, lowest first: built-in testnet defaults, `fdc-relayer.toml` in the working directory
//! (or the file given with `--config`), then `FDC_RELAY__<SECTION>__<KEY>` environment variables.

use std::env;
use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use fdc_relay::RelayConfig;

const DEFAULT_CONFIG_NAME: &str = "fdc-relayer";
const ENV_PREFIX: &str = "FDC_RELAY";

/// Load and validate the relay configuration.
pub fn load(path: Option<&Path>) -> Result<RelayConfig> {
    let mut builder = Config::builder();

    builder = match path {
        Some(path) => builder.add_source(File::from(path).required(true)),
        None => builder.add_source(File::with_name(DEFAULT_CONFIG_NAME).required(false)),
    };

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config: RelayConfig = builder
        .build()
        .context("failed to read configuration")?
        .try_deserialize()
        .context("invalid configuration")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Signing keys, read from the environment only.
pub struct SigningKeys {
    /// Pays for attestation requests on the attestation chain.
    pub attestation: String,
    /// Sends root syncs and credits on the destination chain.
    pub destination: String,
}

impl SigningKeys {
    pub fn from_env() -> Result<Self> {
        let attestation = env::var("COSTON2_PK").context("COSTON2_PK must be set")?;
        let destination = env::var("SAPPHIRE_PK").unwrap_or_else(|_| attestation.clone());
        Ok(Self {
            attestation,
            destination,
        })
    }
}
