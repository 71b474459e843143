//! Fixed-offset ABI word extraction and topic helpers
//!
//! Log payloads and `eth_call` return data are sequences of 32-byte
//! big-endian words; fixed-size arrays are laid out inline. These
//! helpers pull bounded integers out of that layout and convert
//! between topics and their Rust representations.

use crate::error::DecodeError;

/// Width of one ABI word in bytes.
pub const WORD: usize = 32;

/// Strip an optional `0x` prefix.
pub fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}

/// Decode a `0x`-prefixed hex payload into bytes.
pub fn decode_hex(field: &'static str, s: &str) -> Result<Vec<u8>, DecodeError> {
    hex::decode(strip_0x(s)).map_err(|source| DecodeError::InvalidHex { field, source })
}

/// Read the word at `index` as a `u64`.
///
/// Errors if the payload is too short or the word has bits set above
/// the low 8 bytes.
pub fn word_u64(data: &[u8], index: usize) -> Result<u64, DecodeError> {
    let word = word_at(data, index)?;
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(DecodeError::Overflow("u64 word"));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[WORD - 8..]);
    Ok(u64::from_be_bytes(buf))
}

/// Read the word at `index` as a `u128` (used for wei amounts).
pub fn word_u128(data: &[u8], index: usize) -> Result<u128, DecodeError> {
    let word = word_at(data, index)?;
    if word[..WORD - 16].iter().any(|b| *b != 0) {
        return Err(DecodeError::Overflow("u128 word"));
    }
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&word[WORD - 16..]);
    Ok(u128::from_be_bytes(buf))
}

fn word_at(data: &[u8], index: usize) -> Result<&[u8], DecodeError> {
    let start = index * WORD;
    let end = start + WORD;
    if data.len() < end {
        return Err(DecodeError::PayloadTooShort {
            need: end,
            got: data.len(),
        });
    }
    Ok(&data[start..end])
}

/// Extract the address from an indexed topic: the last 20 bytes of
/// the 32-byte word, rendered as lowercase `0x`-prefixed hex.
pub fn topic_address(topic: &str) -> Result<String, DecodeError> {
    let bytes = decode_hex("topic", topic)?;
    if bytes.len() != WORD {
        return Err(DecodeError::PayloadTooShort {
            need: WORD,
            got: bytes.len(),
        });
    }
    Ok(format!("0x{}", hex::encode(&bytes[WORD - 20..])))
}

/// Parse an indexed `uint256` topic into a `u64`.
pub fn topic_u64(topic: &str) -> Result<u64, DecodeError> {
    let bytes = decode_hex("topic", topic)?;
    word_u64(&bytes, 0)
}

/// Render a round number as a 32-byte topic for upstream filtering.
pub fn round_topic(round: u64) -> String {
    format!("0x{:064x}", round)
}
