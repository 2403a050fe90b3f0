use std::{
    fmt,
    time::Duration,
};

use fdc_client::VerifierError;
use fdc_core::DecodeError;

use crate::{
    finality::FinalityError,
    gateway::GatewayError,
    proof::ProofError,
};

/// Steps of one attestation cycle, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Prepare,
    Connect,
    Submit,
    Finality,
    Proof,
    Decode,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Connect => "connect",
            Self::Submit => "submit",
            Self::Finality => "finality",
            Self::Proof => "proof",
            Self::Decode => "decode",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an attestation cycle produced no quote.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(#[source] GatewayError),
    #[error("verifier rejected request: {0}")]
    VerifierRejected(#[from] VerifierError),
    #[error("chain error during {stage}: {source}")]
    Chain {
        stage: Stage,
        #[source]
        source: GatewayError,
    },
    #[error("round {round_id} not finalized within {timeout:?}")]
    FinalizationTimeout { round_id: u64, timeout: Duration },
    #[error("proof unavailable: {0}")]
    ProofUnavailable(#[source] ProofError),
    #[error("payload not found: {0}")]
    PayloadNotFound(#[from] DecodeError),
    #[error("cancelled during {stage}")]
    Cancelled { stage: Stage },
}

impl PipelineError {
    /// Classify a gateway failure raised while running `stage`.
    pub fn gateway(stage: Stage, source: GatewayError) -> Self {
        if source.is_configuration() {
            Self::Configuration(source)
        } else {
            Self::Chain { stage, source }
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            Self::Configuration(_) => Stage::Connect,
            Self::VerifierRejected(_) => Stage::Prepare,
            Self::Chain { stage, .. } | Self::Cancelled { stage } => *stage,
            Self::FinalizationTimeout { .. } => Stage::Finality,
            Self::ProofUnavailable(_) => Stage::Proof,
            Self::PayloadNotFound(_) => Stage::Decode,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl From<FinalityError> for PipelineError {
    fn from(err: FinalityError) -> Self {
        match err {
            FinalityError::Timeout { round_id, timeout } => {
                Self::FinalizationTimeout { round_id, timeout }
            }
            FinalityError::Check(source) => Self::gateway(Stage::Finality, source),
            FinalityError::Cancelled { .. } => {
                Self::Cancelled {
                    stage: Stage::Finality,
                }
            }
        }
    }
}

impl From<ProofError> for PipelineError {
    fn from(err: ProofError) -> Self {
        match err {
            ProofError::Cancelled { .. } => Self::Cancelled {
                stage: Stage::Proof,
            },
            other => Self::ProofUnavailable(other),
        }
    }
}
