use alloy::primitives::{
    B256,
    Bytes,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Wei per gwei.
pub const WEI_PER_GWEI: f64 = 1e9;

/// Static description of a Web2Json attestation: where the verifier fetches
/// data from, how it is reshaped and how it is ABI encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttestationSpec {
    pub attestation_type: &'static str,
    pub source_id: &'static str,
    pub url: &'static str,
    pub http_method: &'static str,
    pub headers: &'static str,
    pub query_params: &'static str,
    pub body: &'static str,
    pub post_process_jq: &'static str,
    pub abi_signature: &'static str,
}

/// Beaconcha.in gasnow prices reshaped into `(rapid, fast, standard, slow)` wei.
pub const GAS_PRICE_ATTESTATION: AttestationSpec = AttestationSpec {
    attestation_type: "Web2Json",
    source_id: "PublicWeb2",
    url: "https://beaconcha.in/api/v1/execution/gasnow",
    http_method: "GET",
    headers: "{}",
    query_params: "{}",
    body: "{}",
    post_process_jq: "{rapid: .data.rapid, fast: .data.fast, standard: .data.standard, slow: .data.slow}",
    abi_signature: concat!(
        r#"{"components": ["#,
        r#"{"internalType": "uint256", "name": "rapid", "type": "uint256"},"#,
        r#"{"internalType": "uint256", "name": "fast", "type": "uint256"},"#,
        r#"{"internalType": "uint256", "name": "standard", "type": "uint256"},"#,
        r#"{"internalType": "uint256", "name": "slow", "type": "uint256"}"#,
        r#"], "name": "gasData", "type": "tuple"}"#,
    ),
};

/// Verifier-issued request blob. Passed to the hub and the DA layer verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedRequest(pub Bytes);

impl EncodedRequest {
    pub fn bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Bytes> for EncodedRequest {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

/// Result of a mined `requestAttestation` transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub tx_hash: B256,
    pub block_timestamp: u64,
    pub round_id: u64,
}

/// Proof material returned by the DA layer once the round's merkle tree exists.
#[derive(Debug, Clone, PartialEq)]
pub struct Proof {
    /// Raw ABI encoded attestation response.
    pub response: Bytes,
    /// Every other field of the DA response (merkle proof, round, ...).
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Gas prices in gwei decoded from an attested response.
///
/// `standard` is the value reported as the attested reading (the "propose"
/// price in gasnow terms).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GasQuote {
    pub rapid: f64,
    pub fast: f64,
    pub standard: f64,
    pub safe: f64,
}
