//! One attestation cycle: prepare, submit, await finality, fetch the proof and
//! decode the quote.

use async_trait::async_trait;
use fdc_client::{
    VerifierClient,
    VerifierError,
};
use fdc_core::{
    AttestationSpec,
    EncodedRequest,
    GasQuote,
    SubmissionReceipt,
    decode_proof,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{
    error,
    info,
};

use crate::{
    error::{
        PipelineError,
        Stage,
    },
    finality::{
        FinalityCheck,
        FinalityPolicy,
        await_finalization,
    },
    gateway::GatewayError,
    proof::{
        ProofRetryPolicy,
        ProofSource,
        retrieve_proof,
    },
};

#[async_trait]
pub trait RequestPreparer: Send + Sync {
    async fn prepare_request(&self, spec: &AttestationSpec)
    -> Result<EncodedRequest, VerifierError>;
}

#[async_trait]
impl RequestPreparer for VerifierClient {
    async fn prepare_request(
        &self,
        spec: &AttestationSpec,
    ) -> Result<EncodedRequest, VerifierError> {
        VerifierClient::prepare_request(self, spec).await
    }
}

/// The ledger side of an attestation.
#[async_trait]
pub trait AttestationLedger: FinalityCheck {
    fn is_connected(&self) -> bool;

    async fn connect(&mut self) -> Result<(), GatewayError>;

    async fn submit(&self, request: &EncodedRequest) -> Result<SubmissionReceipt, GatewayError>;
}

/// Drives attestation cycles against a verifier, a ledger and a DA layer.
///
/// `run_cycle` takes `&mut self`, so a pipeline can never run two cycles at
/// once; the ledger's signer and nonce sequence depend on that.
#[derive(Debug)]
pub struct AttestationPipeline<V, L, P> {
    spec: AttestationSpec,
    verifier: V,
    ledger: L,
    proofs: P,
    finality: FinalityPolicy,
    proof_retry: ProofRetryPolicy,
    cancel: CancellationToken,
}

impl<V, L, P> AttestationPipeline<V, L, P>
where
    V: RequestPreparer,
    L: AttestationLedger,
    P: ProofSource,
{
    pub fn new(
        spec: AttestationSpec,
        verifier: V,
        ledger: L,
        proofs: P,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            spec,
            verifier,
            ledger,
            proofs,
            finality: FinalityPolicy::default(),
            proof_retry: ProofRetryPolicy::default(),
            cancel,
        }
    }

    pub fn with_finality_policy(mut self, finality: FinalityPolicy) -> Self {
        self.finality = finality;
        self
    }

    pub fn with_proof_retry_policy(mut self, proof_retry: ProofRetryPolicy) -> Self {
        self.proof_retry = proof_retry;
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Run one cycle. Every failure is logged with its stage and turned into
    /// `None`; the caller simply tries again on its next tick.
    pub async fn run_cycle(&mut self) -> Option<GasQuote> {
        let started = Instant::now();
        let result = self.try_run_cycle().await;
        metrics::histogram!("fdc_cycle_duration_seconds").record(started.elapsed().as_secs_f64());

        match result {
            Ok(quote) => {
                metrics::counter!("fdc_cycles_total", "outcome" => "attested").increment(1);
                Some(quote)
            }
            Err(err) if err.is_cancelled() => {
                metrics::counter!("fdc_cycles_total", "outcome" => "cancelled").increment(1);
                info!(stage = %err.stage(), "Attestation cycle cancelled");
                None
            }
            Err(err) => {
                let stage = err.stage();
                metrics::counter!("fdc_cycles_total", "outcome" => "failed").increment(1);
                metrics::counter!("fdc_stage_failures_total", "stage" => stage.as_str())
                    .increment(1);
                error!(%stage, error = %err, "Attestation cycle failed");
                None
            }
        }
    }

    /// Run one cycle and report the failing stage instead of swallowing it.
    pub async fn try_run_cycle(&mut self) -> Result<GasQuote, PipelineError> {
        let request = self.verifier.prepare_request(&self.spec).await?;
        info!(bytes = request.len(), "Prepared attestation request");

        if !self.ledger.is_connected() {
            self.ledger
                .connect()
                .await
                .map_err(|e| PipelineError::gateway(Stage::Connect, e))?;
        }

        let receipt = self
            .ledger
            .submit(&request)
            .await
            .map_err(|e| PipelineError::gateway(Stage::Submit, e))?;
        metrics::gauge!("fdc_last_round_id").set(receipt.round_id as f64);

        await_finalization(&self.ledger, receipt.round_id, self.finality, &self.cancel).await?;

        let proof = retrieve_proof(
            &self.proofs,
            &request,
            receipt.round_id,
            self.proof_retry,
            &self.cancel,
        )
        .await?;

        let quote = decode_proof(&proof)?;
        info!(
            round_id = receipt.round_id,
            tx_hash = %receipt.tx_hash,
            rapid = quote.rapid,
            fast = quote.fast,
            standard = quote.standard,
            safe = quote.safe,
            "Decoded attested gas quote"
        );
        Ok(quote)
    }
}


#[cfg(test)]
mod tests {
    use super::{
        test_utils::*,
        *,
    };
    use fdc_core::GAS_PRICE_ATTESTATION;
    use metrics_util::{
        CompositeKey,
        MetricKind,
        debugging::{
            DebugValue,
            DebuggingRecorder,
        },
    };
    use std::{
        sync::atomic::Ordering,
        time::Duration,
    };

    fn pipeline(
        verifier: FakeVerifier,
        ledger: FakeLedger,
        da: FakeDa,
    ) -> AttestationPipeline<FakeVerifier, FakeLedger, FakeDa> {
        AttestationPipeline::new(
            GAS_PRICE_ATTESTATION,
            verifier,
            ledger,
            da,
            CancellationToken::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_cycle() {
        let mut pipeline = pipeline(
            FakeVerifier::valid(),
            FakeLedger::new(7, Some(2)),
            FakeDa::serving(attested_response([12, 18, 9, 4]), 0),
        );

        let quote = pipeline.run_cycle().await;

        assert_eq!(
            quote,
            Some(GasQuote {
                rapid: 12.0,
                fast: 18.0,
                standard: 9.0,
                safe: 4.0
            })
        );
        assert_eq!(pipeline.ledger().checks.load(Ordering::SeqCst), 2);
        assert_eq!(pipeline.ledger().submits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connects_once_across_cycles() {
        let mut pipeline = pipeline(
            FakeVerifier::valid(),
            FakeLedger::new(7, Some(1)),
            FakeDa::serving(attested_response([12, 18, 9, 4]), 0),
        );

        assert!(pipeline.run_cycle().await.is_some());
        assert!(pipeline.run_cycle().await.is_some());

        assert_eq!(pipeline.ledger().connects.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.ledger().submits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_verifier_rejection_skips_chain() {
        let mut pipeline = pipeline(
            FakeVerifier::rejecting("INVALID"),
            FakeLedger::new(7, Some(1)),
            FakeDa::serving(attested_response([12, 18, 9, 4]), 0),
        );

        let err = pipeline.try_run_cycle().await.unwrap_err();
        assert!(matches!(err, PipelineError::VerifierRejected(_)));
        assert_eq!(err.stage(), Stage::Prepare);
        assert_eq!(pipeline.ledger().connects.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.run_cycle().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_key_is_a_configuration_error() {
        let mut ledger = FakeLedger::new(7, Some(1));
        ledger.has_key = false;
        let mut pipeline = pipeline(
            FakeVerifier::valid(),
            ledger,
            FakeDa::serving(attested_response([12, 18, 9, 4]), 0),
        );

        let err = pipeline.try_run_cycle().await.unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert_eq!(pipeline.ledger().submits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finalization_timeout() {
        let mut pipeline = pipeline(
            FakeVerifier::valid(),
            FakeLedger::new(7, None),
            FakeDa::serving(attested_response([12, 18, 9, 4]), 0),
        );

        let err = pipeline.try_run_cycle().await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::FinalizationTimeout { round_id: 7, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_proof_unavailable() {
        let mut pipeline = pipeline(
            FakeVerifier::valid(),
            FakeLedger::new(7, Some(1)),
            FakeDa {
                response: None,
                pending_for: 0,
                calls: Default::default(),
            },
        );

        let err = pipeline.try_run_cycle().await.unwrap_err();
        assert!(matches!(err, PipelineError::ProofUnavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_implausible_payload() {
        let mut pipeline = pipeline(
            FakeVerifier::valid(),
            FakeLedger::new(7, Some(1)),
            FakeDa::serving(attested_response([12, 0, 9, 4]), 0),
        );

        let err = pipeline.try_run_cycle().await.unwrap_err();
        assert!(matches!(err, PipelineError::PayloadNotFound(_)));
        assert_eq!(err.stage(), Stage::Decode);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_finality_wait() {
        let cancel = CancellationToken::new();
        let mut pipeline = AttestationPipeline::new(
            GAS_PRICE_ATTESTATION,
            FakeVerifier::valid(),
            FakeLedger::new(7, None),
            FakeDa::serving(attested_response([12, 18, 9, 4]), 0),
            cancel.clone(),
        );

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let err = pipeline.try_run_cycle().await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Cancelled {
                stage: Stage::Finality
            }
        ));
        assert_eq!(started.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_policies_are_used() {
        let mut pipeline = pipeline(
            FakeVerifier::valid(),
            FakeLedger::new(7, Some(1)),
            FakeDa {
                response: None,
                pending_for: 0,
                calls: Default::default(),
            },
        )
        .with_proof_retry_policy(ProofRetryPolicy {
            initial_delay: Duration::from_secs(1),
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
            ..ProofRetryPolicy::default()
        });

        let started = Instant::now();
        let err = pipeline.try_run_cycle().await.unwrap_err();
        assert!(matches!(err, PipelineError::ProofUnavailable(_)));
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    fn find_metric<'a>(
        snapshot: &'a [(CompositeKey, Option<metrics::Unit>, Option<metrics::SharedString>, DebugValue)],
        kind: MetricKind,
        name: &str,
        label: Option<(&str, &str)>,
    ) -> Option<&'a DebugValue> {
        snapshot
            .iter()
            .find(|(composite_key, _, _, _)| {
                let key = composite_key.key();
                composite_key.kind() == kind
                    && key.name() == name
                    && label.is_none_or(|(k, v)| {
                        key.labels().any(|l| l.key() == k && l.value() == v)
                    })
            })
            .map(|(_, _, _, value)| value)
    }

    #[test]
    fn test_cycle_outcomes_are_recorded() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .start_paused(true)
                .build()
                .expect("create tokio runtime");
            runtime.block_on(async {
                let mut attested = pipeline(
                    FakeVerifier::valid(),
                    FakeLedger::new(7, Some(1)),
                    FakeDa::serving(attested_response([12, 18, 9, 4]), 0),
                );
                assert!(attested.run_cycle().await.is_some());

                let mut rejected = pipeline(
                    FakeVerifier::rejecting("INVALID"),
                    FakeLedger::new(7, Some(1)),
                    FakeDa::serving(attested_response([12, 18, 9, 4]), 0),
                );
                assert_eq!(rejected.run_cycle().await, None);

                let cancel = CancellationToken::new();
                cancel.cancel();
                let mut cancelled = AttestationPipeline::new(
                    GAS_PRICE_ATTESTATION,
                    FakeVerifier::valid(),
                    FakeLedger::new(7, None),
                    FakeDa::serving(attested_response([12, 18, 9, 4]), 0),
                    cancel,
                );
                assert_eq!(cancelled.run_cycle().await, None);
            });
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let counter = |name, label| find_metric(&snapshot, MetricKind::Counter, name, Some(label));

        assert_eq!(
            counter("fdc_cycles_total", ("outcome", "attested")),
            Some(&DebugValue::Counter(1))
        );
        assert_eq!(
            counter("fdc_cycles_total", ("outcome", "failed")),
            Some(&DebugValue::Counter(1))
        );
        assert_eq!(
            counter("fdc_cycles_total", ("outcome", "cancelled")),
            Some(&DebugValue::Counter(1))
        );
        assert_eq!(
            counter("fdc_stage_failures_total", ("stage", "prepare")),
            Some(&DebugValue::Counter(1))
        );
        assert_eq!(
            counter("fdc_stage_failures_total", ("stage", "finality")),
            None
        );
        assert_eq!(
            find_metric(&snapshot, MetricKind::Gauge, "fdc_last_round_id", None),
            Some(&DebugValue::Gauge(7.0.into()))
        );
        assert!(matches!(
            find_metric(&snapshot, MetricKind::Histogram, "fdc_cycle_duration_seconds", None),
            Some(DebugValue::Histogram(samples)) if samples.len() == 3
        ));
    }
}
