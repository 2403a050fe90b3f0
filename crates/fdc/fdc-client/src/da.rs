use std::time::Duration;

use alloy::primitives::Bytes;
use fdc_core::{
    EncodedRequest,
    Proof,
    abi::decode_hex_trimmed_0x,
};
use reqwest::Client;
use serde::Serialize;
use serde_json::{
    Map,
    Value,
};
use url::Url;

use crate::{
    DEFAULT_REQUEST_TIMEOUT,
    api_key_headers,
    parse_base_url,
    truncate,
};

const PROOF_BY_REQUEST_ROUND_RAW_PATH: &str = "api/v1/fdc/proof-by-request-round-raw";
const RESPONSE_HEX_FIELD: &str = "response_hex";

/// A client for the FDC data-availability layer.
///
/// A single call is one attempt; retries and backoff belong to the caller.
#[derive(Debug)]
pub struct DaClient {
    client: Client,
    endpoint: Url,
    timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum DaClientError {
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Invalid API key header value")]
    InvalidApiKey,
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Outcome of one proof lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum ProofStatus {
    Ready(Proof),
    /// The DA layer has nothing for this (request, round) yet.
    Pending(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProofRequest<'a> {
    voting_round_id: u64,
    request_bytes: &'a Bytes,
}

impl DaClient {
    /// Create a new DA client
    pub fn new(da_url: &str) -> Result<Self, DaClientError> {
        let endpoint = parse_base_url(da_url)?.join(PROOF_BY_REQUEST_ROUND_RAW_PATH)?;
        let client = Client::builder().use_rustls_tls().build()?;

        Ok(Self {
            client,
            endpoint,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Create a new DA client that sends `X-API-KEY` with every request
    pub fn new_with_api_key(da_url: &str, api_key: &str) -> Result<Self, DaClientError> {
        let endpoint = parse_base_url(da_url)?.join(PROOF_BY_REQUEST_ROUND_RAW_PATH)?;
        let headers = api_key_headers(api_key).map_err(|_| DaClientError::InvalidApiKey)?;
        let client = Client::builder()
            .use_rustls_tls()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Bound each lookup by `timeout` instead of [`DEFAULT_REQUEST_TIMEOUT`].
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn request_timeout(&self) -> Duration {
        self.timeout
    }

    /// Look up the raw attestation response for `request` in `round_id`.
    ///
    /// Non-2xx statuses and bodies without a populated `response_hex` mean
    /// the proof is not built yet and come back as [`ProofStatus::Pending`].
    pub async fn proof_by_request_round_raw(
        &self,
        request: &EncodedRequest,
        round_id: u64,
    ) -> Result<ProofStatus, DaClientError> {
        let payload = ProofRequest {
            voting_round_id: round_id,
            request_bytes: request.bytes(),
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Ok(ProofStatus::Pending(format!(
                "HTTP {status}: {}",
                truncate(&body, 300)
            )));
        }

        let mut fields: Map<String, Value> = serde_json::from_str(&body)?;
        let response_hex = match fields.remove(RESPONSE_HEX_FIELD) {
            Some(Value::String(hex)) if !hex.is_empty() && hex != "0x" => hex,
            _ => {
                return Ok(ProofStatus::Pending(format!(
                    "no {RESPONSE_HEX_FIELD} yet: {}",
                    truncate(&body, 200)
                )));
            }
        };

        let response = decode_hex_trimmed_0x(&response_hex).map_err(|e| {
            DaClientError::InvalidResponse(format!("{RESPONSE_HEX_FIELD} is not hex: {e}"))
        })?;

        Ok(ProofStatus::Ready(Proof {
            response: Bytes::from(response),
            metadata: fields,
        }))
    }
}
