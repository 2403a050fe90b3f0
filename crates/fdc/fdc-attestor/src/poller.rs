//! Fixed-interval driver that hands gas readings to a sink.

use std::{
    fmt,
    time::{
        Duration,
        SystemTime,
        UNIX_EPOCH,
    },
};

use async_trait::async_trait;
use fdc_client::{
    GasFeedClient,
    GasFeedError,
};
use fdc_core::GasQuote;
use tokio_util::sync::CancellationToken;
use tracing::{
    info,
    warn,
};

use crate::{
    pipeline::{
        AttestationLedger,
        AttestationPipeline,
        RequestPreparer,
    },
    proof::ProofSource,
    sleep_or_cancel,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingSource {
    /// Read straight from the gas API, not attested.
    Direct,
    /// Decoded from an FDC proof.
    FdcAttested,
}

impl fmt::Display for ReadingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::FdcAttested => f.write_str("fdc-attested"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub timestamp: u64,
    pub gas_price_gwei: f64,
    pub source: ReadingSource,
}

impl Reading {
    fn now(gas_price_gwei: f64, source: ReadingSource) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self {
            timestamp,
            gas_price_gwei,
            source,
        }
    }
}

/// Where readings go. Storage lives outside this crate.
#[async_trait]
pub trait ReadingSink: Send + Sync {
    async fn record(&self, reading: Reading);
}

/// Logs every reading.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl ReadingSink for TracingSink {
    async fn record(&self, reading: Reading) {
        info!(
            timestamp = reading.timestamp,
            gas_price_gwei = reading.gas_price_gwei,
            source = %reading.source,
            "Recorded gas reading"
        );
    }
}

#[async_trait]
pub trait DirectFeed: Send + Sync {
    async fn fetch_quote(&self) -> Result<GasQuote, GasFeedError>;
}

#[async_trait]
impl DirectFeed for GasFeedClient {
    async fn fetch_quote(&self) -> Result<GasQuote, GasFeedError> {
        GasFeedClient::fetch_quote(self).await
    }
}

/// Runs one attestation cycle per interval, never two at once.
pub struct Poller<V, L, P, S> {
    pipeline: AttestationPipeline<V, L, P>,
    direct_feed: Option<Box<dyn DirectFeed>>,
    sink: S,
    interval: Duration,
}

impl<V, L, P, S> Poller<V, L, P, S>
where
    V: RequestPreparer,
    L: AttestationLedger,
    P: ProofSource,
    S: ReadingSink,
{
    pub fn new(pipeline: AttestationPipeline<V, L, P>, sink: S, interval: Duration) -> Self {
        Self {
            pipeline,
            direct_feed: None,
            sink,
            interval,
        }
    }

    /// Record an unattested reading before each cycle.
    pub fn with_direct_feed(mut self, feed: impl DirectFeed + 'static) -> Self {
        self.direct_feed = Some(Box::new(feed));
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn has_direct_feed(&self) -> bool {
        self.direct_feed.is_some()
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!(interval = ?self.interval, direct_feed = self.has_direct_feed(), "Poller started");

        while !cancel.is_cancelled() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.poll_once() => {}
            }

            if sleep_or_cancel(self.interval, &cancel).await {
                break;
            }
        }

        info!("Poller stopped");
    }

    /// One tick: an optional direct reading, then a full attestation cycle.
    pub async fn poll_once(&mut self) {
        if let Some(feed) = &self.direct_feed {
            match feed.fetch_quote().await {
                Ok(quote) => {
                    self.sink
                        .record(Reading::now(quote.standard, ReadingSource::Direct))
                        .await;
                }
                Err(err) => warn!(error = %err, "Direct gas fetch failed"),
            }
        }

        info!("Starting FDC attestation cycle");
        match self.pipeline.run_cycle().await {
            Some(quote) => {
                self.sink
                    .record(Reading::now(quote.standard, ReadingSource::FdcAttested))
                    .await;
            }
            None => warn!("FDC cycle returned no result"),
        }
    }
}
