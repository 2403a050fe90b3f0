use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    info,
    warn,
};

use crate::{
    Bounded,
    gateway::GatewayError,
    run_bounded,
    sleep_or_cancel,
};

#[async_trait]
pub trait FinalityCheck: Send + Sync {
    async fn is_round_finalized(&self, round_id: u64) -> Result<bool, GatewayError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalityPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for FinalityPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FinalityError {
    #[error("round {round_id} did not finalize within {timeout:?}")]
    Timeout { round_id: u64, timeout: Duration },
    #[error("finality check failed: {0}")]
    Check(#[from] GatewayError),
    #[error("cancelled while waiting for round {round_id}")]
    Cancelled { round_id: u64 },
}

/// Poll `check` until `round_id` is finalized or `policy.timeout` elapses.
///
/// The round is checked immediately, then once per interval. The last sleep
/// is clipped to the deadline so the final check lands on it. A single check
/// may run until the deadline, or for one interval once the deadline is
/// reached; a check that overruns counts as "not finalized".
pub async fn await_finalization<C: FinalityCheck + ?Sized>(
    check: &C,
    round_id: u64,
    policy: FinalityPolicy,
    cancel: &CancellationToken,
) -> Result<(), FinalityError> {
    info!(round_id, timeout = ?policy.timeout, "Waiting for round to finalize");
    let started = Instant::now();
    let deadline = started + policy.timeout;

    loop {
        let limit = policy
            .poll_interval
            .max(deadline.saturating_duration_since(Instant::now()));
        match run_bounded(check.is_round_finalized(round_id), limit, cancel).await {
            Bounded::Done(finalized) => {
                if finalized? {
                    info!(round_id, elapsed = ?started.elapsed(), "Round finalized");
                    return Ok(());
                }
            }
            Bounded::TimedOut => warn!(round_id, ?limit, "Finality check timed out"),
            Bounded::Cancelled => return Err(FinalityError::Cancelled { round_id }),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(FinalityError::Timeout {
                round_id,
                timeout: policy.timeout,
            });
        }

        debug!(round_id, "Round not finalized yet");
        let nap = policy.poll_interval.min(deadline - now);
        if sleep_or_cancel(nap, cancel).await {
            return Err(FinalityError::Cancelled { round_id });
        }
    }
}
