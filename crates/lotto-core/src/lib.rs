//! Domain model for the lottery log reconciler
//!
//! Pure types and functions: raw log representation, the typed
//! `DomainEvent` union, and the decoder that maps one to the other.
//! No I/O lives here.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod abi;
pub mod error;
pub mod events;

pub use abi::{round_topic, topic_address, word_u128, word_u64};
pub use error::DecodeError;
pub use events::{
    decode, event_topic, DomainEvent, LogMeta, Milestone, RawLog, DRAW_INITIATED_TOPIC,
    PAYOUT_COMPUTED_TOPIC, PROOF_SUBMITTED_TOPIC, RANDOM_SET_TOPIC, TICKET_PURCHASED_TOPIC,
};
