//! Locates the gas tuple inside a raw attested `IWeb2Json.Response`.
//!
//! The response nests the verifier's `abiEncodedData` behind several dynamic
//! string fields, so its offset moves with the lengths of those strings. Rather
//! than walking the outer encoding, the decoder slides a 128-byte window
//! backwards from the end of the buffer in word strides and takes the first
//! window whose four words are all plausible wei prices. The window never
//! leaves the last [`SCAN_WINDOW`] bytes.

use alloy::primitives::U256;

use crate::{
    GasQuote,
    Proof,
    WEI_PER_GWEI,
    abi::{
        TUPLE4_SIZE,
        WORD_SIZE,
        decode_tuple4,
    },
};

/// How far from the end of the response a candidate tuple may start.
pub const SCAN_WINDOW: usize = 512;

/// Exclusive upper bound of a plausible gas price, in wei.
pub const MAX_PLAUSIBLE_WEI: u64 = 1_000_000_000_000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("no plausible gas tuple in the last {SCAN_WINDOW} bytes of a {len}-byte response")]
    PayloadNotFound { len: usize },
}

/// `0 < value < 1e12` wei. All four words of a candidate must pass.
pub fn is_plausible_wei(value: U256) -> bool {
    !value.is_zero() && value < U256::from(MAX_PLAUSIBLE_WEI)
}

/// Candidate tuple offsets, nearest to the end first.
pub fn candidate_offsets(len: usize) -> impl Iterator<Item = usize> {
    let start = len.checked_sub(TUPLE4_SIZE);
    let floor = len.saturating_sub(SCAN_WINDOW);
    std::iter::successors(start, |offset| offset.checked_sub(WORD_SIZE))
        .take_while(move |offset| *offset >= floor)
}

/// Scan `raw` for the gas tuple and convert it to gwei.
pub fn decode_gas_response(raw: &[u8]) -> Result<GasQuote, DecodeError> {
    for offset in candidate_offsets(raw.len()) {
        let Ok(words) = decode_tuple4(&raw[offset..offset + TUPLE4_SIZE]) else {
            continue;
        };
        if !words.iter().all(|word| is_plausible_wei(*word)) {
            continue;
        }

        let [rapid, fast, standard, safe] = words.map(wei_to_gwei);
        return Ok(GasQuote {
            rapid,
            fast,
            standard,
            safe,
        });
    }

    Err(DecodeError::PayloadNotFound { len: raw.len() })
}

/// Decode the gas quote carried by a DA layer proof.
pub fn decode_proof(proof: &Proof) -> Result<GasQuote, DecodeError> {
    decode_gas_response(&proof.response)
}

fn wei_to_gwei(value: U256) -> f64 {
    // Only called on plausible words, which are below 1e12 and fit a u64.
    value.to::<u64>() as f64 / WEI_PER_GWEI
}
