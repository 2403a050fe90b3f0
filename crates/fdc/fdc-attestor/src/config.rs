use std::{
    fmt,
    time::Duration,
};

use alloy::primitives::Address;
use anyhow::Context;
use clap::Parser;
use fdc_client::{
    DaClient,
    GasFeedClient,
    VerifierClient,
    parse_base_url,
};
use fdc_core::GAS_PRICE_ATTESTATION;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    finality::FinalityPolicy,
    gateway::{
        ChainGateway,
        DEFAULT_RECEIPT_TIMEOUT,
        DEFAULT_RPC_TIMEOUT,
        GatewayConfig,
    },
    pipeline::AttestationPipeline,
    poller::{
        Poller,
        TracingSink,
    },
    proof::ProofRetryPolicy,
};

/// The poll loop as wired by [`Config::build`].
pub type AttestorPoller = Poller<VerifierClient, ChainGateway, DaClient, TracingSink>;

#[derive(Parser, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Flare JSON-RPC endpoint
    #[arg(
        long,
        env = "FDC_RPC_URL",
        default_value = "https://coston2-api.flare.network/ext/C/rpc"
    )]
    pub rpc_url: Url,
    /// Base URL of the Web2Json verifier
    #[arg(
        long,
        env = "FDC_VERIFIER_URL",
        default_value = "https://fdc-verifiers-testnet.flare.network/verifier/web2/"
    )]
    pub verifier_url: String,
    #[arg(
        long,
        env = "FDC_VERIFIER_API_KEY",
        default_value = "00000000-0000-0000-0000-000000000000"
    )]
    pub verifier_api_key: String,
    /// Base URL of the data availability layer
    #[arg(
        long,
        env = "FDC_DA_LAYER_URL",
        default_value = "https://ctn2-data-availability.flare.network/"
    )]
    pub da_layer_url: String,
    /// Sent as `X-API-KEY` to the DA layer when set
    #[arg(long, env = "FDC_DA_API_KEY")]
    pub da_api_key: Option<String>,
    #[arg(
        long,
        env = "FDC_CONTRACT_REGISTRY_ADDRESS",
        default_value = "0xaD67FE66660Fb8dFE9d6b1b4240d8650e30F6019"
    )]
    pub contract_registry_address: Address,
    #[arg(
        long,
        env = "FDC_HUB_ADDRESS",
        default_value = "0x48aC463d7975828989331F4De43341627b9c5f1D"
    )]
    pub fdc_hub_address: Address,
    /// Key that signs and pays for attestation requests. Only checked when
    /// the first cycle connects to the chain.
    #[arg(long, env = "FDC_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,
    /// Seconds between attestation cycles
    #[arg(
        long,
        env = "FDC_POLL_INTERVAL_SECS",
        default_value = "90",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub poll_interval_secs: u64,
    #[arg(
        long,
        env = "FDC_FINALITY_TIMEOUT_SECS",
        default_value = "300",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub finality_timeout_secs: u64,
    #[arg(
        long,
        env = "FDC_FINALITY_POLL_INTERVAL_SECS",
        default_value = "10",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub finality_poll_interval_secs: u64,
    /// Wait before the first proof lookup
    #[arg(long, env = "FDC_PROOF_INITIAL_DELAY_SECS", default_value = "30")]
    pub proof_initial_delay_secs: u64,
    #[arg(
        long,
        env = "FDC_PROOF_ATTEMPTS",
        default_value = "20",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub proof_attempts: u32,
    #[arg(long, env = "FDC_PROOF_RETRY_DELAY_SECS", default_value = "15")]
    pub proof_retry_delay_secs: u64,
    /// Upper bound on one verifier or DA layer request
    #[arg(
        long,
        env = "FDC_HTTP_TIMEOUT_SECS",
        default_value = "60",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub http_timeout_secs: u64,
    /// Upper bound on one JSON-RPC call
    #[arg(
        long,
        env = "FDC_RPC_TIMEOUT_SECS",
        default_value = "30",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub rpc_timeout_secs: u64,
    /// How long a submitted request may stay unmined
    #[arg(
        long,
        env = "FDC_RECEIPT_TIMEOUT_SECS",
        default_value = "120",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub receipt_timeout_secs: u64,
    /// Unattested gas API polled before each cycle
    #[arg(
        long,
        env = "FDC_DIRECT_FEED_URL",
        default_value = "https://beaconcha.in/api/v1/execution/gasnow"
    )]
    pub direct_feed_url: String,
    #[arg(long, env = "FDC_DISABLE_DIRECT_FEED")]
    pub disable_direct_feed: bool,
}

impl Config {
    pub fn finality_policy(&self) -> FinalityPolicy {
        FinalityPolicy {
            poll_interval: Duration::from_secs(self.finality_poll_interval_secs),
            timeout: Duration::from_secs(self.finality_timeout_secs),
        }
    }

    pub fn proof_retry_policy(&self) -> ProofRetryPolicy {
        ProofRetryPolicy {
            initial_delay: Duration::from_secs(self.proof_initial_delay_secs),
            max_attempts: self.proof_attempts,
            retry_delay: Duration::from_secs(self.proof_retry_delay_secs),
            attempt_timeout: self.http_timeout(),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            rpc_url: self.rpc_url.clone(),
            contract_registry_address: self.contract_registry_address,
            fdc_hub_address: self.fdc_hub_address,
            private_key: self.private_key.clone(),
            rpc_timeout: Duration::from_secs(self.rpc_timeout_secs),
            receipt_timeout: Duration::from_secs(self.receipt_timeout_secs),
        }
    }

    /// Build the poll loop. Nothing here touches the network; the chain
    /// connection is made lazily by the first cycle.
    pub fn build(self, cancel: CancellationToken) -> anyhow::Result<AttestorPoller> {
        let verifier_url = parse_base_url(&self.verifier_url).context("invalid verifier url")?;
        let verifier = VerifierClient::new(verifier_url.as_str(), &self.verifier_api_key)
            .context("failed to build verifier client")?
            .with_request_timeout(self.http_timeout());

        let da_url = parse_base_url(&self.da_layer_url).context("invalid DA layer url")?;
        let da = match self.da_api_key.as_deref().filter(|key| !key.is_empty()) {
            Some(api_key) => DaClient::new_with_api_key(da_url.as_str(), api_key),
            None => DaClient::new(da_url.as_str()),
        }
        .context("failed to build DA layer client")?
        .with_request_timeout(self.http_timeout());

        let gateway = ChainGateway::new(self.gateway_config());

        tracing::info!(
            rpc_url = %self.rpc_url,
            verifier = %verifier.endpoint(),
            da_layer = %da.endpoint(),
            fdc_hub = %self.fdc_hub_address,
            "Configured FDC attestation pipeline"
        );

        let pipeline = AttestationPipeline::new(GAS_PRICE_ATTESTATION, verifier, gateway, da, cancel)
            .with_finality_policy(self.finality_policy())
            .with_proof_retry_policy(self.proof_retry_policy());

        let poller = Poller::new(
            pipeline,
            TracingSink,
            Duration::from_secs(self.poll_interval_secs),
        );

        if self.disable_direct_feed {
            return Ok(poller);
        }

        let feed = GasFeedClient::new(&self.direct_feed_url)
            .context("failed to build direct gas feed client")?;
        Ok(poller.with_direct_feed(feed))
    }
}

fn redacted(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "<redacted>")
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("rpc_url", &self.rpc_url.as_str())
            .field("verifier_url", &self.verifier_url)
            .field("verifier_api_key", &"<redacted>")
            .field("da_layer_url", &self.da_layer_url)
            .field("da_api_key", &redacted(&self.da_api_key))
            .field("contract_registry_address", &self.contract_registry_address)
            .field("fdc_hub_address", &self.fdc_hub_address)
            .field("private_key", &redacted(&self.private_key))
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("finality_timeout_secs", &self.finality_timeout_secs)
            .field("finality_poll_interval_secs", &self.finality_poll_interval_secs)
            .field("proof_initial_delay_secs", &self.proof_initial_delay_secs)
            .field("proof_attempts", &self.proof_attempts)
            .field("proof_retry_delay_secs", &self.proof_retry_delay_secs)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("rpc_timeout_secs", &self.rpc_timeout_secs)
            .field("receipt_timeout_secs", &self.receipt_timeout_secs)
            .field("direct_feed_url", &self.direct_feed_url)
            .field("disable_direct_feed", &self.disable_direct_feed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::try_parse_from(vec!["program"]).unwrap();

        assert_eq!(
            config.rpc_url.as_str(),
            "https://coston2-api.flare.network/ext/C/rpc"
        );
        assert_eq!(
            config.verifier_url,
            "https://fdc-verifiers-testnet.flare.network/verifier/web2/"
        );
        assert_eq!(
            config.da_layer_url,
            "https://ctn2-data-availability.flare.network/"
        );
        assert_eq!(
            config.contract_registry_address,
            "0xaD67FE66660Fb8dFE9d6b1b4240d8650e30F6019"
                .parse::<Address>()
                .unwrap()
        );
        assert_eq!(config.da_api_key, None);
        assert_eq!(config.private_key, None);
        assert_eq!(config.poll_interval_secs, 90);
        assert!(!config.disable_direct_feed);
        assert_eq!(config.finality_policy(), FinalityPolicy::default());
        assert_eq!(config.proof_retry_policy(), ProofRetryPolicy::default());

        let gateway = config.gateway_config();
        assert_eq!(gateway.rpc_timeout, DEFAULT_RPC_TIMEOUT);
        assert_eq!(gateway.receipt_timeout, DEFAULT_RECEIPT_TIMEOUT);
        assert_eq!(config.http_timeout(), fdc_client::DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_config_args() {
        let config = Config::try_parse_from(vec![
            "program",
            "--rpc-url",
            "http://localhost:8545",
            "--verifier-url",
            "http://localhost:9000/verifier/web2",
            "--da-api-key",
            "da-key",
            "--private-key",
            "0x1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef",
            "--poll-interval-secs",
            "30",
            "--finality-timeout-secs",
            "60",
            "--proof-attempts",
            "3",
            "--disable-direct-feed",
        ])
        .unwrap();

        assert_eq!(config.rpc_url.as_str(), "http://localhost:8545/");
        assert_eq!(config.verifier_url, "http://localhost:9000/verifier/web2");
        assert_eq!(config.da_api_key.as_deref(), Some("da-key"));
        assert!(config.private_key.is_some());
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.finality_policy().timeout, Duration::from_secs(60));
        assert_eq!(config.proof_retry_policy().max_attempts, 3);
        assert!(config.disable_direct_feed);
    }

    #[test]
    fn test_config_rejects_bad_address() {
        let result = Config::try_parse_from(vec!["program", "--fdc-hub-address", "0x1234"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_rejects_zero_intervals() {
        for flag in [
            "--poll-interval-secs",
            "--finality-timeout-secs",
            "--finality-poll-interval-secs",
            "--proof-attempts",
            "--http-timeout-secs",
            "--rpc-timeout-secs",
            "--receipt-timeout-secs",
        ] {
            let result = Config::try_parse_from(vec!["program", flag, "0"]);
            assert!(result.is_err(), "{flag} 0 should be rejected");
        }

        let config = Config::try_parse_from(vec![
            "program",
            "--finality-poll-interval-secs",
            "1",
            "--proof-attempts",
            "1",
        ])
        .unwrap();
        assert_eq!(config.finality_policy().poll_interval, Duration::from_secs(1));
        assert_eq!(config.proof_retry_policy().max_attempts, 1);
    }

    #[test]
    fn test_timeout_args() {
        let config = Config::try_parse_from(vec![
            "program",
            "--http-timeout-secs",
            "5",
            "--rpc-timeout-secs",
            "7",
            "--receipt-timeout-secs",
            "45",
        ])
        .unwrap();

        assert_eq!(config.proof_retry_policy().attempt_timeout, Duration::from_secs(5));
        let gateway = config.gateway_config();
        assert_eq!(gateway.rpc_timeout, Duration::from_secs(7));
        assert_eq!(gateway.receipt_timeout, Duration::from_secs(45));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let key = "0x1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";
        let config = Config::try_parse_from(vec![
            "program",
            "--private-key",
            key,
            "--verifier-api-key",
            "verifier-secret",
            "--da-api-key",
            "da-secret",
        ])
        .unwrap();

        let rendered = format!("{config:?}");
        assert!(!rendered.contains(key));
        assert!(!rendered.contains("verifier-secret"));
        assert!(!rendered.contains("da-secret"));
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("fdc_hub_address"));
    }

    #[test]
    fn test_build_defaults() {
        let config = Config::try_parse_from(vec!["program"]).unwrap();
        let poller = config.build(CancellationToken::new()).unwrap();

        assert!(poller.has_direct_feed());
        assert_eq!(poller.interval(), Duration::from_secs(90));
    }

    #[test]
    fn test_build_without_direct_feed() {
        let config =
            Config::try_parse_from(vec!["program", "--disable-direct-feed", "--poll-interval-secs", "5"])
                .unwrap();
        let poller = config.build(CancellationToken::new()).unwrap();

        assert!(!poller.has_direct_feed());
        assert_eq!(poller.interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_build_rejects_bad_verifier_url() {
        let config = Config::try_parse_from(vec!["program", "--verifier-url", "not a url"]).unwrap();
        assert!(config.build(CancellationToken::new()).is_err());
    }
}
