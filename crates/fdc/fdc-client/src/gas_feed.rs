use std::time::Duration;

use fdc_core::{
    GasQuote,
    WEI_PER_GWEI,
};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Unattested read of the same gasnow feed the verifier attests.
///
/// Cheap and immediate, so it fills the gap while an attestation cycle runs.
#[derive(Debug)]
pub struct GasFeedClient {
    client: Client,
    url: Url,
}

#[derive(Debug, thiserror::Error)]
pub enum GasFeedError {
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),
}

#[derive(Debug, Deserialize)]
struct GasNowResponse {
    data: GasNowData,
}

/// Prices in wei.
#[derive(Debug, Deserialize)]
struct GasNowData {
    rapid: f64,
    fast: f64,
    standard: f64,
    slow: f64,
}

impl GasFeedClient {
    pub fn new(url: &str) -> Result<Self, GasFeedError> {
        let url = Url::parse(url)?;
        let client = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self { client, url })
    }

    pub async fn fetch_quote(&self) -> Result<GasQuote, GasFeedError> {
        let body: GasNowResponse = self
            .client
            .get(self.url.clone())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let data = body.data;
        Ok(GasQuote {
            rapid: data.rapid / WEI_PER_GWEI,
            fast: data.fast / WEI_PER_GWEI,
            standard: data.standard / WEI_PER_GWEI,
            safe: data.slow / WEI_PER_GWEI,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        Mock,
        MockServer,
        ResponseTemplate,
        matchers::{
            method,
            path,
        },
    };

    #[tokio::test]
    async fn test_fetch_quote() {
        let mock_server = MockServer::start().await;
        let client =
            GasFeedClient::new(&format!("{}/api/v1/execution/gasnow", mock_server.uri())).unwrap();

        Mock::given(method("GET"))
            .and(path("/api/v1/execution/gasnow"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "data": {
                    "rapid": 30_000_000_000u64,
                    "fast": 25_000_000_000u64,
                    "standard": 21_500_000_000u64,
                    "slow": 18_000_000_000u64,
                    "timestamp": 1_700_000_000_000u64,
                    "priceUSD": 2500.12
                }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let quote = client.fetch_quote().await.unwrap();
        assert_eq!(quote.rapid, 30.0);
        assert_eq!(quote.fast, 25.0);
        assert_eq!(quote.standard, 21.5);
        assert_eq!(quote.safe, 18.0);
    }

    #[tokio::test]
    async fn test_fetch_quote_http_error() {
        let mock_server = MockServer::start().await;
        let client = GasFeedClient::new(&mock_server.uri()).unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        assert!(matches!(
            client.fetch_quote().await,
            Err(GasFeedError::ReqwestError(_))
        ));
    }
}
