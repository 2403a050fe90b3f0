//! HTTP clients for the off-chain side of an FDC attestation.
//!
//! ``` no_run
//! use fdc_client::VerifierClient;
//! use fdc_core::GAS_PRICE_ATTESTATION;
//!
//! #[tokio::main]
//! async fn main() {
//!     let verifier = VerifierClient::new(
//!         "https://fdc-verifiers-testnet.flare.network/verifier/web2/",
//!         "00000000-0000-0000-0000-000000000000",
//!     )
//!     .unwrap();
//!     let request = verifier.prepare_request(&GAS_PRICE_ATTESTATION).await.unwrap();
//! }
//! ```

mod da;
mod gas_feed;
mod verifier;

pub use da::{
    DaClient,
    DaClientError,
    ProofStatus,
};
pub use gas_feed::{
    GasFeedClient,
    GasFeedError,
};
pub use verifier::{
    VerifierClient,
    VerifierError,
};

use std::time::Duration;

use http::header::{
    HeaderMap,
    HeaderValue,
    InvalidHeaderValue,
};
use url::Url;

pub(crate) const API_KEY_HEADER: &str = "X-API-KEY";

/// Upper bound on one verifier or DA layer request, connect to last byte.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Parse a service base URL, making sure relative endpoint paths are appended
/// to it rather than replacing its last segment.
pub fn parse_base_url(url: &str) -> Result<Url, url::ParseError> {
    if url.ends_with('/') {
        Url::parse(url)
    } else {
        Url::parse(&format!("{url}/"))
    }
}

pub(crate) fn api_key_headers(api_key: &str) -> Result<HeaderMap, InvalidHeaderValue> {
    let mut headers = HeaderMap::new();
    let mut value = HeaderValue::from_str(api_key)?;
    value.set_sensitive(true);
    headers.insert(API_KEY_HEADER, value);
    Ok(headers)
}

/// Keep log lines bounded when echoing remote error bodies.
pub(crate) fn truncate(body: &str, max: usize) -> &str {
    match body.char_indices().nth(max) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
