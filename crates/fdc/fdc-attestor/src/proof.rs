use std::time::Duration;

use async_trait::async_trait;
use fdc_client::{
    DaClient,
    DaClientError,
    ProofStatus,
};
use fdc_core::{
    EncodedRequest,
    Proof,
};
use tokio_util::sync::CancellationToken;
use tracing::{
    info,
    warn,
};

use crate::{
    Bounded,
    run_bounded,
    sleep_or_cancel,
};

/// One lookup against the DA layer.
#[async_trait]
pub trait ProofSource: Send + Sync {
    async fn fetch_proof(
        &self,
        request: &EncodedRequest,
        round_id: u64,
    ) -> Result<ProofStatus, DaClientError>;
}

#[async_trait]
impl ProofSource for DaClient {
    async fn fetch_proof(
        &self,
        request: &EncodedRequest,
        round_id: u64,
    ) -> Result<ProofStatus, DaClientError> {
        self.proof_by_request_round_raw(request, round_id).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofRetryPolicy {
    /// Unconditional wait before the first lookup; the DA layer builds its
    /// merkle tree only after the round is finalized.
    pub initial_delay: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// A lookup still unanswered after this long counts as not ready.
    pub attempt_timeout: Duration,
}

impl Default for ProofRetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(30),
            max_attempts: 20,
            retry_delay: Duration::from_secs(15),
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProofError {
    #[error("no proof for round {round_id} after {attempts} attempts")]
    Exhausted { round_id: u64, attempts: u32 },
    #[error("DA layer lookup {attempt} for round {round_id} failed: {source}")]
    Source {
        round_id: u64,
        attempt: u32,
        #[source]
        source: DaClientError,
    },
    #[error("cancelled while waiting for the proof of round {round_id}")]
    Cancelled { round_id: u64 },
}

/// Fetch the proof for `(request, round_id)` within the policy's attempt budget.
pub async fn retrieve_proof<S: ProofSource + ?Sized>(
    source: &S,
    request: &EncodedRequest,
    round_id: u64,
    policy: ProofRetryPolicy,
    cancel: &CancellationToken,
) -> Result<Proof, ProofError> {
    info!(round_id, delay = ?policy.initial_delay, "Waiting for DA layer to build proof");
    if sleep_or_cancel(policy.initial_delay, cancel).await {
        return Err(ProofError::Cancelled { round_id });
    }

    for attempt in 1..=policy.max_attempts {
        let lookup = source.fetch_proof(request, round_id);
        let status = match run_bounded(lookup, policy.attempt_timeout, cancel).await {
            Bounded::Done(status) => status.map_err(|source| ProofError::Source {
                round_id,
                attempt,
                source,
            })?,
            Bounded::TimedOut => ProofStatus::Pending(format!(
                "no answer within {:?}",
                policy.attempt_timeout
            )),
            Bounded::Cancelled => return Err(ProofError::Cancelled { round_id }),
        };

        match status {
            ProofStatus::Ready(proof) => {
                info!(round_id, attempt, bytes = proof.response.len(), "Proof retrieved from DA layer");
                return Ok(proof);
            }
            ProofStatus::Pending(reason) => {
                warn!(round_id, attempt, %reason, "Proof not ready yet");
            }
        }

        if attempt < policy.max_attempts && sleep_or_cancel(policy.retry_delay, cancel).await {
            return Err(ProofError::Cancelled { round_id });
        }
    }

    Err(ProofError::Exhausted {
        round_id,
        attempts: policy.max_attempts,
    })
}
