//! fdc-relayer
//!
//! Command-line relayer for source-chain deposits.
//!
//! 1. Prepare and pay for an `EVMTransaction` attestation request on the attestation chain
//! 2. Wait for the voting round to finalise and fetch the Merkle proof
//! 3. Validate the proof against the deposit
//! 4. Credit the deposit on the destination chain, directly or through a synced root

mod config;
mod wiring;

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use ethers::types::{H256, U256};
use fdc_relay::probe::{all_passed, run_probes};
use fdc_relay::request::AttestationTemplate;
use fdc_relay::{
    DepositClaim, EncodedRequest, RelayConfig, RelayError, RelayMode, RelayReport, StageFailure,
    VotingRound,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::SigningKeys;
use crate::wiring::Chains;

#[derive(Parser)]
#[command(
    name = "fdc-relayer",
    about = "Relay source-chain deposits through the Flare Data Connector"
)]
struct Cli {
    /// Configuration file (defaults to ./fdc-relayer.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Attest a deposit transaction and credit it on the destination chain.
    Relay(RelayArgs),
    /// Continue a relay from the proof wait, for a request submitted earlier.
    Resume(ResumeArgs),
    /// Print the voting round containing a timestamp.
    Round(RoundArgs),
    /// Check that the trustless accounting contract rejects unsynced proofs and outsiders.
    Probe,
}

#[derive(Args)]
struct DepositArgs {
    /// Relay strategy: direct or trustless.
    #[arg(long, default_value = "direct")]
    mode: RelayMode,
    /// Hash of the deposit transaction on the source chain.
    #[arg(long)]
    tx_hash: String,
    /// Source-chain confirmations required (overrides configuration).
    #[arg(long)]
    confirmations: Option<u16>,
    /// Execution status the deposit must have had (overrides configuration).
    #[arg(long)]
    expected_status: Option<u8>,
}

#[derive(Args)]
struct RelayArgs {
    #[command(flatten)]
    deposit: DepositArgs,
}

#[derive(Args)]
struct ResumeArgs {
    #[command(flatten)]
    deposit: DepositArgs,
    /// Voting round the request was submitted in.
    #[arg(long)]
    round: u64,
    /// ABI-encoded request as submitted; prepared again when omitted.
    #[arg(long)]
    request: Option<String>,
}

#[derive(Args)]
struct RoundArgs {
    /// Unix timestamp in seconds (defaults to now).
    #[arg(long)]
    timestamp: Option<u64>,
}

#[derive(Serialize)]
struct RelaySummary {
    mode: RelayMode,
    voting_round: VotingRound,
    source_tx_hash: H256,
    submission_tx_hash: Option<H256>,
    credit_tx_hash: H256,
    prior_balance: U256,
    new_balance: U256,
}

impl From<&RelayReport> for RelaySummary {
    fn from(report: &RelayReport) -> Self {
        Self {
            mode: report.outcome.mode,
            voting_round: report.voting_round,
            source_tx_hash: report.envelope.transaction_hash(),
            submission_tx_hash: report.submission.map(|s| s.submission_tx_hash),
            credit_tx_hash: report.outcome.transaction_hash,
            prior_balance: report.outcome.prior_balance,
            new_balance: report.outcome.new_balance,
        }
    }
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "fdc_relayer=info,fdc_relay=info".into());
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let config = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Relay(args) => {
            let keys = SigningKeys::from_env()?;
            let chains = Chains::connect(&config, &keys).await?;
            let pipeline = wiring::pipeline(&config, &chains, args.deposit.mode)?;
            let claim = claim(&config, &args.deposit);

            info!("Relaying {} ({} mode)", claim.source_tx_hash, pipeline.mode());
            let result = pipeline.run(&claim).await;
            finish(result, &args.deposit)
        }
        Commands::Resume(args) => {
            let keys = SigningKeys::from_env()?;
            let chains = Chains::connect(&config, &keys).await?;
            let pipeline = wiring::pipeline(&config, &chains, args.deposit.mode)?;
            let claim = claim(&config, &args.deposit);

            let prepared = match args.request.as_deref() {
                Some(hex) => {
                    let encoded = EncodedRequest::from_hex(hex).context("invalid --request")?;
                    pipeline.prepared_from_encoded(&claim, encoded)?
                }
                None => pipeline.prepare(&claim).await?,
            };
            let result = pipeline
                .resume(VotingRound(args.round), prepared, &claim)
                .await;
            finish(result, &args.deposit)
        }
        Commands::Round(args) => {
            let clock = config.round_clock()?;
            let timestamp = match args.timestamp {
                Some(timestamp) => timestamp,
                None => SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .context("system clock is before the Unix epoch")?
                    .as_secs(),
            };
            let round = clock.round_for(timestamp)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "timestamp": timestamp,
                    "votingRound": round,
                    "roundStart": clock.round_start(round),
                    "roundEnd": clock.round_end(round),
                }))?
            );
            Ok(())
        }
        Commands::Probe => probe(&config).await,
    }
}

fn claim(config: &RelayConfig, args: &DepositArgs) -> DepositClaim {
    DepositClaim {
        source_tx_hash: args.tx_hash.clone(),
        required_confirmations: args
            .confirmations
            .unwrap_or(config.attestation.required_confirmations),
        expected_status: args
            .expected_status
            .unwrap_or(config.attestation.expected_status),
    }
}

fn finish(
    result: std::result::Result<RelayReport, StageFailure>,
    args: &DepositArgs,
) -> Result<()> {
    match result {
        Ok(report) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&RelaySummary::from(&report))?
            );
            Ok(())
        }
        Err(failure) => {
            match &failure.error {
                RelayError::TimeoutExceeded { round, .. } => warn!(
                    "Nothing was credited. Retry later with: \
                     fdc-relayer resume --mode {} --tx-hash {} --round {}",
                    args.mode, args.tx_hash, round
                ),
                RelayError::RoundUnresolved { tx_hash, .. } => warn!(
                    "The fee was paid in tx {:#x}. Do not relay again; look up the round of its \
                     block with `fdc-relayer round --timestamp` and run `fdc-relayer resume`",
                    tx_hash
                ),
                _ => {}
            }
            Err(failure.into())
        }
    }
}

async fn probe(config: &RelayConfig) -> Result<()> {
    let keys = SigningKeys::from_env()?;
    let chains = Chains::connect(config, &keys).await?;
    let ledger = wiring::trustless_ledger(config, &chains)?;
    let template = AttestationTemplate::from_settings(&config.attestation)?;

    let receiver = match config.contracts.deposit_address()? {
        Some(address) => address,
        None => {
            warn!("contracts.deposit_address is unset; the dummy proof pays the zero address");
            Default::default()
        }
    };

    let reports = run_probes(&ledger, &template, receiver).await;
    for report in &reports {
        println!("{:<24} {}", report.name, report.verdict);
    }

    if !all_passed(&reports) {
        let failed = reports.iter().filter(|report| !report.passed()).count();
        bail!("{} of {} probes did not pass", failed, reports.len());
    }
    Ok(())
}
