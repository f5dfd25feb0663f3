//! HTTP clients for the verifier (request preparation) and the data-availability layer
//! (proof retrieval).

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::config::{AttestationSettings, ServiceEndpoints};
use crate::error::{RelayError, RelayResult};
use crate::poller::{ProofSource, RawProofPayload};
use crate::request::{AttestationRequest, PreparationResponse, PreparationService};
use crate::round::VotingRound;
use crate::types::EncodedRequest;

const API_KEY_HEADER: &str = "X-API-KEY";

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn build_client(timeout: Duration) -> RelayResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RelayError::Http(format!("failed to build HTTP client: {}", e)))
}

/// Verifier endpoint that ABI-encodes attestation requests.
#[derive(Clone, Debug)]
pub struct HttpPreparationService {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl HttpPreparationService {
    pub fn new(
        services: &ServiceEndpoints,
        attestation: &AttestationSettings,
        timeout: Duration,
    ) -> RelayResult<Self> {
        let path = format!(
            "verifier/{}/{}/prepareRequest",
            attestation.verifier_source_path, attestation.attestation_type
        );
        Ok(Self {
            client: build_client(timeout)?,
            url: join_url(&services.verifier_base_url, &path),
            api_key: services.api_key.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PreparationService for HttpPreparationService {
    async fn prepare(&self, request: &AttestationRequest) -> RelayResult<PreparationResponse> {
        debug!("POST {}", self.url);
        let response = self
            .client
            .post(&self.url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RelayError::UpstreamRejected(format!(
                "verifier returned {}: {}",
                status,
                text.trim()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| RelayError::UpstreamRejected(format!("unreadable verifier reply: {}", e)))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProofQuery<'a> {
    voting_round_id: u64,
    request_bytes: &'a EncodedRequest,
}

/// Data-availability endpoint serving proofs by round and request bytes.
#[derive(Clone, Debug)]
pub struct HttpProofSource {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl HttpProofSource {
    pub fn new(services: &ServiceEndpoints, timeout: Duration) -> RelayResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            url: join_url(
                &services.da_layer_url,
                "api/v0/fdc/get-proof-round-id-bytes",
            ),
            api_key: services.api_key.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ProofSource for HttpProofSource {
    async fn fetch_proof(
        &self,
        round: VotingRound,
        request: &EncodedRequest,
    ) -> RelayResult<Option<RawProofPayload>> {
        let query = ProofQuery {
            voting_round_id: round.as_u64(),
            request_bytes: request,
        };
        let response = self
            .client
            .post(&self.url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&query)
            .send()
            .await?;

        if !response.status().is_success() {
            debug!("Proof service returned {}", response.status());
            return Ok(None);
        }

        let payload = response
            .json::<RawProofPayload>()
            .await
            .map_err(|e| RelayError::Http(format!("unreadable proof reply: {}", e)))?;
        Ok(Some(payload))
    }
}
