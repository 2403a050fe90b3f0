//! Shared data model for the FDC gas attestation pipeline.
//!
//! Everything in this crate is pure: hex/ABI helpers, voting round arithmetic
//! and the heuristic decoder for attested gas responses.

pub mod abi;
pub mod decode;
pub mod epoch;
mod types;

pub use abi::{
    AbiError,
    decode_tuple4,
    encode_identifier,
};
pub use decode::{
    DecodeError,
    decode_gas_response,
    decode_proof,
};
pub use epoch::{
    RoundIdError,
    VotingEpoch,
};
pub use types::{
    AttestationSpec,
    EncodedRequest,
    GAS_PRICE_ATTESTATION,
    GasQuote,
    Proof,
    SubmissionReceipt,
    WEI_PER_GWEI,
};
