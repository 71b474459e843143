//! Error types for the sync engine

use thiserror::Error;

/// Sync engine errors
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level failure talking to the RPC endpoint
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The RPC endpoint returned a JSON-RPC error object
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code
        code: i64,
        /// Error message from the endpoint
        message: String,
    },

    /// The requested log range exceeded the provider's limit
    #[error("log range too large: {0}")]
    RangeTooLarge(String),

    /// Malformed or unexpected RPC response
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Log failed to decode into a domain event
    #[error("decode error: {0}")]
    Decode(#[from] lotto_core::DecodeError),

    /// Storage failure
    #[error("storage error: {0}")]
    Storage(#[from] lotto_storage_sqlite::Error),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Backfill input could not be parsed
    #[error("backfill parse error at line {line}: {message}")]
    BackfillParse {
        /// 1-based line number in the input
        line: usize,
        /// What went wrong
        message: String,
    },
}

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Substrings providers use to signal an oversized `eth_getLogs` range.
/// There is no standard error code for this, so matching on the message
/// is the only portable option.
const RANGE_MARKERS: &[&str] = &[
    "query returned more than",
    "block range",
    "too many results",
    "response size exceeded",
    "range too large",
];

/// Classify a JSON-RPC error as a range-limit rejection.
pub fn is_range_too_large(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    RANGE_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_marker_detection() {
        assert!(is_range_too_large(
            "query returned more than 10000 results"
        ));
        assert!(is_range_too_large("Block range is too large"));
        assert!(is_range_too_large("eth_getLogs: Too Many Results"));
        assert!(!is_range_too_large("execution reverted"));
        assert!(!is_range_too_large("invalid params"));
    }
}
