//! fdc-relay
//!
//! Relays source-chain deposits to a destination chain through the Flare Data Connector.
//!
//! # Flow
//!
//! 1. **Prepare**: the verifier ABI-encodes an `EVMTransaction` attestation request for the
//!    deposit transaction.
//! 2. **Submit**: the request is paid for on the attestation hub; the block it lands in
//!    fixes the voting round.
//! 3. **Wait**: after the round closes, the data-availability layer is polled with backoff
//!    until it serves a Merkle proof.
//! 4. **Validate**: the proof must describe the deposit that was asked about.
//! 5. **Relay**: either a verification contract checks the proof and a trusted relayer
//!    credits the deposit ([`executor::DirectRelay`]), or the round's Merkle root is synced
//!    to the destination chain which verifies the proof itself
//!    ([`executor::TrustlessRelay`]).
//!
//! [`pipeline::RelayPipeline`] runs the stages in that order and reports the first failure
//! as a [`StageFailure`]. Every chain and HTTP dependency sits behind a trait; the
//! implementations in [`evm`] and [`services`] talk to real endpoints.

pub mod config;
pub mod error;
pub mod events;
pub mod evm;
pub mod executor;
pub mod pipeline;
pub mod poller;
pub mod probe;
pub mod proof;
pub mod request;
pub mod revert;
pub mod round;
pub mod services;
pub mod submitter;
pub mod types;
pub mod validate;

pub use config::RelayConfig;
pub use error::{MismatchError, ProofField, RelayError, RelayResult, Stage, StageFailure};
pub use events::{EventSink, StageEvent};
pub use executor::{RelayMode, RelayOutcome, RelayStrategy};
pub use pipeline::{DepositClaim, PipelineParts, RelayPipeline, RelayReport};
pub use poller::{BackoffPolicy, ProofPoller};
pub use proof::ProofEnvelope;
pub use request::{AttestationRequest, RequestBuilder};
pub use revert::RevertReason;
pub use round::{RoundClock, VotingRound};
pub use submitter::AttestationSubmitter;
pub use types::EncodedRequest;
