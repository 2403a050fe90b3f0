//! Hex helpers for the fixed-width ABI words used by the attestation protocol.

use alloy::primitives::U256;

/// Width of a single ABI word in bytes.
pub const WORD_SIZE: usize = 32;

/// Byte length of a static `(uint256,uint256,uint256,uint256)` tuple.
pub const TUPLE4_SIZE: usize = 4 * WORD_SIZE;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AbiError {
    #[error("identifier {name:?} is {len} bytes, at most {WORD_SIZE} fit in one word")]
    IdentifierTooLong { name: String, len: usize },
    #[error("expected {expected} bytes for a uint256 tuple, got {actual}")]
    InvalidTupleLength { expected: usize, actual: usize },
}

/// Encode a protocol identifier (attestation type, source id) as a `0x`-prefixed
/// 32-byte word: UTF-8 bytes, hex encoded, right padded with `0`.
pub fn encode_identifier(name: &str) -> Result<String, AbiError> {
    let len = name.len();
    if len > WORD_SIZE {
        return Err(AbiError::IdentifierTooLong {
            name: name.to_string(),
            len,
        });
    }

    let mut word = [0u8; WORD_SIZE];
    word[..len].copy_from_slice(name.as_bytes());
    Ok(encode_hex_prefixed(word))
}

/// Decode exactly 128 bytes as four big-endian `uint256` words.
pub fn decode_tuple4(buffer: &[u8]) -> Result<[U256; 4], AbiError> {
    if buffer.len() != TUPLE4_SIZE {
        return Err(AbiError::InvalidTupleLength {
            expected: TUPLE4_SIZE,
            actual: buffer.len(),
        });
    }

    let mut words = [U256::ZERO; 4];
    for (word, chunk) in words.iter_mut().zip(buffer.chunks_exact(WORD_SIZE)) {
        *word = U256::from_be_slice(chunk);
    }
    Ok(words)
}

pub fn encode_hex_prefixed(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", hex::encode(bytes.as_ref()))
}

/// Decode a hex string, ignoring a leading "0x" prefix if present.
///
/// # Errors
///
/// Returns an error if the input (after trimming a leading "0x") is not valid hex.
pub fn decode_hex_trimmed_0x(value: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(value.strip_prefix("0x").unwrap_or(value))
}
