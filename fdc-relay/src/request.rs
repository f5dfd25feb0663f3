//! Attestation request construction.
//!
//! [`RequestBuilder`] turns a source transaction hash into an [`AttestationRequest`] and asks
//! the preparation service for its ABI encoding. The encoding is what gets paid for on the
//! attestation hub and later quoted to the proof service, so it is carried around verbatim.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::H256;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AttestationSettings;
use crate::error::{RelayError, RelayResult};
use crate::types::{encode_tag, null_as_default, parse_tx_hash, EncodedRequest};

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Request body of an `EVMTransaction` attestation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody {
    pub transaction_hash: H256,
    #[serde(with = "crate::types::quoted")]
    pub required_confirmations: u16,
    #[serde(rename = "provideInput")]
    pub include_raw_input: bool,
    #[serde(rename = "listEvents")]
    pub include_events: bool,
    /// Empty means every event of the transaction.
    #[serde(rename = "logIndices", default, deserialize_with = "null_as_default")]
    pub event_log_index_filter: Vec<u32>,
}

/// A complete attestation request as sent to the preparation service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationRequest {
    pub attestation_type: H256,
    pub source_id: H256,
    pub request_body: RequestBody,
}

/// Fixed parts of every request this relay builds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttestationTemplate {
    pub attestation_type: H256,
    pub source_id: H256,
    pub include_raw_input: bool,
    pub include_events: bool,
    pub event_log_index_filter: Vec<u32>,
}

impl AttestationTemplate {
    pub fn from_settings(settings: &AttestationSettings) -> RelayResult<Self> {
        Ok(Self {
            attestation_type: encode_tag(&settings.attestation_type)?,
            source_id: encode_tag(&settings.source_id)?,
            include_raw_input: settings.provide_input,
            include_events: settings.list_events,
            event_log_index_filter: settings.log_indices.clone(),
        })
    }

    pub fn request(
        &self,
        transaction_hash: H256,
        required_confirmations: u16,
    ) -> AttestationRequest {
        AttestationRequest {
            attestation_type: self.attestation_type,
            source_id: self.source_id,
            request_body: RequestBody {
                transaction_hash,
                required_confirmations,
                include_raw_input: self.include_raw_input,
                include_events: self.include_events,
                event_log_index_filter: self.event_log_index_filter.clone(),
            },
        }
    }
}

/// A request together with the encoding the preparation service returned for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedRequest {
    pub request: AttestationRequest,
    pub encoded: EncodedRequest,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PREPARATION SERVICE
// ═══════════════════════════════════════════════════════════════════════════════

/// Reply of the preparation service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparationResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub abi_encoded_request: Option<String>,
}

/// Remote service that ABI-encodes attestation requests.
///
/// Implementations return `UpstreamRejected` for non-success replies and `Http` for
/// transport failures.
#[async_trait]
pub trait PreparationService: Send + Sync {
    async fn prepare(&self, request: &AttestationRequest) -> RelayResult<PreparationResponse>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST BUILDER
// ═══════════════════════════════════════════════════════════════════════════════

/// Builds and encodes attestation requests.
pub struct RequestBuilder {
    service: Arc<dyn PreparationService>,
    template: AttestationTemplate,
}

impl RequestBuilder {
    pub fn new(service: Arc<dyn PreparationService>, template: AttestationTemplate) -> Self {
        Self { service, template }
    }

    pub fn template(&self) -> &AttestationTemplate {
        &self.template
    }

    /// Validate `source_tx_hash`, build the request and obtain its encoding.
    ///
    /// Makes exactly one call to the preparation service and never retries.
    pub async fn build(
        &self,
        source_tx_hash: &str,
        required_confirmations: u16,
    ) -> RelayResult<PreparedRequest> {
        let transaction_hash = parse_tx_hash(source_tx_hash)?;
        let request = self.template.request(transaction_hash, required_confirmations);
        debug!(
            "Preparing attestation request for {:#x} ({} confirmations)",
            transaction_hash, required_confirmations
        );

        let response = self.service.prepare(&request).await?;
        let encoded = accept_preparation(&response)?;

        Ok(PreparedRequest { request, encoded })
    }
}

fn accept_preparation(response: &PreparationResponse) -> RelayResult<EncodedRequest> {
    let diagnostic =
        || serde_json::to_string(response).unwrap_or_else(|_| format!("{:?}", response));

    let invalid = response
        .status
        .as_deref()
        .map_or(false, |status| status.eq_ignore_ascii_case("INVALID"));
    if invalid {
        return Err(RelayError::UpstreamRejected(diagnostic()));
    }

    match response.abi_encoded_request.as_deref().map(str::trim) {
        Some(encoded) if !encoded.is_empty() && encoded != "0x" => {
            EncodedRequest::from_hex(encoded).map_err(|e| {
                RelayError::UpstreamRejected(format!("unreadable encoded request: {}", e))
            })
        }
        _ => Err(RelayError::UpstreamRejected(diagnostic())),
    }
}
