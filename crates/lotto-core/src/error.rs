//! Decode error types

/// Errors produced while decoding a raw log into a domain event.
///
/// A decode failure applies to a single log only; callers skip the
/// offending log and continue with the rest of the batch.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Log signature topic does not match any known event
    #[error("unknown event topic: {0}")]
    UnknownTopic(String),

    /// Log is missing an expected topic
    #[error("missing topic at index {index}")]
    MissingTopic {
        /// Index of the absent topic
        index: usize,
    },

    /// Hex payload could not be decoded
    #[error("invalid hex in {field}: {source}")]
    InvalidHex {
        /// Field the bad hex came from
        field: &'static str,
        /// Underlying hex error
        #[source]
        source: hex::FromHexError,
    },

    /// Data payload is shorter than the event layout requires
    #[error("payload too short: need {need} bytes, got {got}")]
    PayloadTooShort {
        /// Bytes required by the fixed layout
        need: usize,
        /// Bytes actually present
        got: usize,
    },

    /// A 32-byte word does not fit the target integer type
    #[error("word overflow in {0}")]
    Overflow(&'static str),
}
