//! The relay pipeline.
//!
//! Stages run strictly in order: prepare the request, submit it, wait for the proof,
//! validate it, relay it. The first failing stage ends the attempt and is reported as a
//! [`StageFailure`]. Only the poll stage retries anything.

use std::future::Future;
use std::sync::Arc;

use ethers::types::H256;
use tracing::info;

use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult, Stage, StageFailure};
use crate::events::{EventSink, StageEvent, TracingSink};
use crate::executor::{RelayMode, RelayOutcome, RelayStrategy};
use crate::poller::{ProofPoller, ProofSource};
use crate::proof::{assemble, ProofEnvelope};
use crate::request::{AttestationTemplate, PreparationService, PreparedRequest, RequestBuilder};
use crate::round::VotingRound;
use crate::submitter::{AttestationHub, AttestationSubmitter, SubmissionResult};
use crate::types::{parse_tx_hash, EncodedRequest};
use crate::validate::{validate, validate_request_echo, Expectations};

/// A source-chain deposit to relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepositClaim {
    /// `0x`-prefixed hash of the deposit transaction.
    pub source_tx_hash: String,
    pub required_confirmations: u16,
    /// Execution status the deposit must have had (1 = success).
    pub expected_status: u8,
}

impl DepositClaim {
    pub fn new(source_tx_hash: impl Into<String>) -> Self {
        Self {
            source_tx_hash: source_tx_hash.into(),
            required_confirmations: 1,
            expected_status: 1,
        }
    }
}

/// Everything a completed relay produced.
#[derive(Clone, Debug)]
pub struct RelayReport {
    pub prepared: PreparedRequest,
    /// `None` when the run was resumed from an earlier submission.
    pub submission: Option<SubmissionResult>,
    pub voting_round: VotingRound,
    pub envelope: ProofEnvelope,
    pub outcome: RelayOutcome,
}

/// External collaborators of a pipeline.
pub struct PipelineParts {
    pub preparation: Arc<dyn PreparationService>,
    pub hub: Arc<dyn AttestationHub>,
    pub proofs: Arc<dyn ProofSource>,
    pub strategy: Arc<dyn RelayStrategy>,
}

/// One relay pipeline, parameterised over its final [`RelayStrategy`].
pub struct RelayPipeline {
    builder: RequestBuilder,
    hub: Arc<dyn AttestationHub>,
    submitter: AttestationSubmitter,
    poller: ProofPoller,
    strategy: Arc<dyn RelayStrategy>,
    events: Arc<dyn EventSink>,
}

impl RelayPipeline {
    pub fn new(config: &RelayConfig, parts: PipelineParts) -> RelayResult<Self> {
        config.validate()?;
        let template = AttestationTemplate::from_settings(&config.attestation)?;
        let submitter = AttestationSubmitter::new(
            parts.hub.clone(),
            config.round_clock()?,
            config.fees.default_fee()?,
        );

        Ok(Self {
            builder: RequestBuilder::new(parts.preparation, template),
            hub: parts.hub,
            submitter,
            poller: ProofPoller::new(parts.proofs, config.backoff()),
            strategy: parts.strategy,
            events: Arc::new(TracingSink),
        })
    }

    /// Replace the default [`TracingSink`].
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn mode(&self) -> RelayMode {
        self.strategy.mode()
    }

    /// Run every stage for `claim`.
    pub async fn run(&self, claim: &DepositClaim) -> Result<RelayReport, StageFailure> {
        let prepared = self
            .stage(Stage::PrepareRequest, async {
                let prepared = self
                    .builder
                    .build(&claim.source_tx_hash, claim.required_confirmations)
                    .await?;
                self.events.emit(StageEvent::RequestPrepared {
                    encoded_len: prepared.encoded.len(),
                });
                Ok::<_, RelayError>(prepared)
            })
            .await?;

        let submission = self
            .stage(Stage::SubmitRequest, async {
                let balance = self.hub.signer_balance().await?;
                self.submitter
                    .submit(&prepared.encoded, balance, self.events.as_ref())
                    .await
            })
            .await?;

        let round = submission.voting_round;
        self.finish(prepared, Some(submission), round, claim).await
    }

    /// Restart from the poll stage for a request submitted earlier, typically after
    /// `TimeoutExceeded`. Nothing is paid again.
    pub async fn resume(
        &self,
        round: VotingRound,
        prepared: PreparedRequest,
        claim: &DepositClaim,
    ) -> Result<RelayReport, StageFailure> {
        info!("Resuming relay of {} at voting round {}", claim.source_tx_hash, round);
        self.finish(prepared, None, round, claim).await
    }

    /// Obtain the encoding for `claim` without submitting or paying for it.
    pub async fn prepare(&self, claim: &DepositClaim) -> RelayResult<PreparedRequest> {
        self.builder
            .build(&claim.source_tx_hash, claim.required_confirmations)
            .await
    }

    /// Rebuild the request for `claim` around an encoding obtained earlier.
    pub fn prepared_from_encoded(
        &self,
        claim: &DepositClaim,
        encoded: EncodedRequest,
    ) -> RelayResult<PreparedRequest> {
        let hash = parse_tx_hash(&claim.source_tx_hash)?;
        Ok(PreparedRequest {
            request: self
                .builder
                .template()
                .request(hash, claim.required_confirmations),
            encoded,
        })
    }

    async fn finish(
        &self,
        prepared: PreparedRequest,
        submission: Option<SubmissionResult>,
        round: VotingRound,
        claim: &DepositClaim,
    ) -> Result<RelayReport, StageFailure> {
        let raw = self
            .stage(
                Stage::WaitForProof,
                self.poller
                    .poll(round, &prepared.encoded, self.events.as_ref()),
            )
            .await?;

        let (envelope, deposit) = self
            .stage(Stage::ValidateProof, async {
                let envelope = assemble(&raw)?;
                let expected = self.expectations(claim)?;
                validate(&envelope, &expected)?;
                validate_request_echo(&envelope, &prepared.request)?;
                let deposit = envelope.summary()?;
                Ok::<_, RelayError>((envelope, deposit))
            })
            .await?;
        self.events.emit(StageEvent::ProofValidated(deposit));

        let outcome = self
            .stage(
                Stage::Relay,
                self.strategy.execute(&envelope, self.events.as_ref()),
            )
            .await?;

        info!(
            "Relay of {} complete ({} mode): balance {} -> {}",
            claim.source_tx_hash, outcome.mode, outcome.prior_balance, outcome.new_balance
        );

        Ok(RelayReport {
            prepared,
            submission,
            voting_round: round,
            envelope,
            outcome,
        })
    }

    fn expectations(&self, claim: &DepositClaim) -> RelayResult<Expectations> {
        let transaction_hash: H256 = parse_tx_hash(&claim.source_tx_hash)?;
        Ok(Expectations {
            transaction_hash,
            source_id: self.builder.template().source_id,
            execution_status: claim.expected_status,
        })
    }

    async fn stage<T, F>(&self, stage: Stage, work: F) -> Result<T, StageFailure>
    where
        F: Future<Output = RelayResult<T>>,
    {
        self.events.emit(StageEvent::StageStarted(stage));
        match work.await {
            Ok(value) => {
                self.events.emit(StageEvent::StageCompleted(stage));
                Ok(value)
            }
            Err(e) => {
                let failure = StageFailure::new(stage, e);
                self.events.emit(StageEvent::StageFailed {
                    stage,
                    error: failure.error.to_string(),
                });
                Err(failure)
            }
        }
    }
}
