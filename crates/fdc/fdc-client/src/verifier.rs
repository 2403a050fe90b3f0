use std::time::Duration;

use alloy::primitives::Bytes;
use fdc_core::{
    AbiError,
    AttestationSpec,
    EncodedRequest,
    abi::decode_hex_trimmed_0x,
    encode_identifier,
};
use http::StatusCode;
use reqwest::Client;
use serde::{
    Deserialize,
    Serialize,
};
use url::Url;

use crate::{
    DEFAULT_REQUEST_TIMEOUT,
    api_key_headers,
    parse_base_url,
    truncate,
};

const PREPARE_REQUEST_PATH: &str = "Web2Json/prepareRequest";
const VALID_STATUS: &str = "VALID";

/// Client for the Web2Json verifier's `prepareRequest` endpoint.
///
/// The verifier fetches the configured URL itself, applies the jq transform
/// and returns the ABI encoded request that is later submitted on-chain.
#[derive(Debug)]
pub struct VerifierClient {
    client: Client,
    endpoint: Url,
    timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),
    #[error("Invalid API key header value")]
    InvalidApiKey,
    #[error("Invalid attestation identifier: {0}")]
    Identifier(#[from] AbiError),
    #[error("Verifier returned HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("Verifier rejected request with status {status:?}")]
    Rejected { status: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrepareRequest<'a> {
    attestation_type: String,
    source_id: String,
    request_body: RequestBody<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestBody<'a> {
    url: &'a str,
    http_method: &'a str,
    headers: &'a str,
    query_params: &'a str,
    body: &'a str,
    post_process_jq: &'a str,
    abi_signature: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrepareResponse {
    status: String,
    abi_encoded_request: Option<String>,
}

impl<'a> PrepareRequest<'a> {
    fn from_spec(spec: &'a AttestationSpec) -> Result<Self, AbiError> {
        Ok(Self {
            attestation_type: encode_identifier(spec.attestation_type)?,
            source_id: encode_identifier(spec.source_id)?,
            request_body: RequestBody {
                url: spec.url,
                http_method: spec.http_method,
                headers: spec.headers,
                query_params: spec.query_params,
                body: spec.body,
                post_process_jq: spec.post_process_jq,
                abi_signature: spec.abi_signature,
            },
        })
    }
}

impl VerifierClient {
    /// Create a verifier client that authenticates with `X-API-KEY`.
    pub fn new(verifier_url: &str, api_key: &str) -> Result<Self, VerifierError> {
        let endpoint = parse_base_url(verifier_url)?.join(PREPARE_REQUEST_PATH)?;
        let headers = api_key_headers(api_key).map_err(|_| VerifierError::InvalidApiKey)?;
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

    /// Bound each call by `timeout` instead of [`DEFAULT_REQUEST_TIMEOUT`].
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

    /// Ask the verifier to prepare an attestation request for `spec`.
    ///
    /// Any non-2xx status or a status other than `VALID` fails the call; the
    /// caller decides whether to try again later.
    pub async fn prepare_request(
        &self,
        spec: &AttestationSpec,
    ) -> Result<EncodedRequest, VerifierError> {
        let payload = PrepareRequest::from_spec(spec)?;

        let response = self
            .client
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VerifierError::Http {
                status,
                body: truncate(&body, 300).to_string(),
            });
        }

        let body: PrepareResponse = response.json().await?;
        if body.status != VALID_STATUS {
            return Err(VerifierError::Rejected {
                status: body.status,
            });
        }

        let encoded = body.abi_encoded_request.ok_or_else(|| {
            VerifierError::InvalidResponse("Missing abiEncodedRequest in VALID response".into())
        })?;
        let bytes = decode_hex_trimmed_0x(&encoded).map_err(|e| {
            VerifierError::InvalidResponse(format!("abiEncodedRequest is not hex: {e}"))
        })?;
        if bytes.is_empty() {
            return Err(VerifierError::InvalidResponse(
                "Empty abiEncodedRequest in VALID response".into(),
            ));
        }

        tracing::debug!(bytes = bytes.len(), "Verifier prepared attestation request");
        Ok(EncodedRequest(Bytes::from(bytes)))
    }
}
