//! Drives Flare Data Connector attestations of the Ethereum gas price.
//!
//! An [`AttestationPipeline`] runs one cycle: the verifier encodes the request,
//! the [`ChainGateway`] submits it to the FdcHub, the relay is polled until the
//! voting round is finalized, the DA layer serves the proof and the decoder
//! pulls the gas tuple out of it. A [`Poller`] repeats that on a fixed interval.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

mod config;
pub mod error;
pub mod finality;
pub mod gateway;
pub mod pipeline;
pub mod poller;
pub mod proof;

pub use config::{
    AttestorPoller,
    Config,
};
pub use error::{
    PipelineError,
    Stage,
};
pub use finality::{
    FinalityPolicy,
    await_finalization,
};
pub use gateway::{
    ChainGateway,
    GatewayConfig,
    GatewayError,
};
pub use pipeline::AttestationPipeline;
pub use poller::{
    Poller,
    Reading,
    ReadingSink,
    ReadingSource,
    TracingSink,
};
pub use proof::{
    ProofRetryPolicy,
    retrieve_proof,
};

use std::{
    future::Future,
    time::Duration,
};

use tokio_util::sync::CancellationToken;

/// Sleep for `duration` unless `cancel` fires first. Returns `true` when
/// cancelled.
pub(crate) async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => true,
        () = tokio::time::sleep(duration) => false,
    }
}

/// How a [`run_bounded`] call ended.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Bounded<T> {
    Done(T),
    TimedOut,
    Cancelled,
}

/// Drive `fut` for at most `limit`, giving up early if `cancel` fires.
pub(crate) async fn run_bounded<F: Future>(
    fut: F,
    limit: Duration,
    cancel: &CancellationToken,
) -> Bounded<F::Output> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Bounded::Cancelled,
        result = tokio::time::timeout(limit, fut) => match result {
            Ok(output) => Bounded::Done(output),
            Err(_) => Bounded::TimedOut,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_runs_to_completion() {
        let started = tokio::time::Instant::now();
        assert!(!sleep_or_cancel(Duration::from_secs(5), &CancellationToken::new()).await);
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_token_wins() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let started = tokio::time::Instant::now();
        assert!(sleep_or_cancel(Duration::from_secs(5), &cancel).await);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_bounded_outcomes() {
        let cancel = CancellationToken::new();
        assert_eq!(
            run_bounded(async { 7 }, Duration::from_secs(1), &cancel).await,
            Bounded::Done(7)
        );

        let started = tokio::time::Instant::now();
        assert_eq!(
            run_bounded(std::future::pending::<()>(), Duration::from_secs(3), &cancel).await,
            Bounded::TimedOut
        );
        assert_eq!(started.elapsed(), Duration::from_secs(3));

        cancel.cancel();
        assert_eq!(
            run_bounded(std::future::pending::<()>(), Duration::from_secs(3), &cancel).await,
            Bounded::Cancelled
        );
    }
}
