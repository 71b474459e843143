//! Typed domain events and the raw-log decoder

use crate::abi::{self, WORD};
use crate::error::DecodeError;
use alloy_primitives::keccak256;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Ticket purchase: `(address indexed player, uint256 round, uint256[3] numbers, uint256 bonus)`
pub const TICKET_PURCHASED_SIG: &str = "TicketPurchased(address,uint256,uint256[3],uint256)";
/// Draw initiation: `(uint256 indexed round, uint256 targetBlock)`
pub const DRAW_INITIATED_SIG: &str = "DrawInitiated(uint256,uint256)";
/// Randomness committed: `(uint256 indexed round, uint256 value)`
pub const RANDOM_SET_SIG: &str = "RandomSet(uint256,uint256)";
/// Delay proof submitted: `(address indexed prover, uint256 round)`.
/// The round is payload-only, so this event cannot be topic-filtered
/// by round upstream.
pub const PROOF_SUBMITTED_SIG: &str = "ProofSubmitted(address,uint256)";
/// Payout computation: `(uint256 indexed round, uint256 total, uint256 perWinner, uint256 carry)`
pub const PAYOUT_COMPUTED_SIG: &str = "PayoutComputed(uint256,uint256,uint256,uint256)";

/// Compute the signature topic (`topic0`) for an event declaration.
pub fn event_topic(signature: &str) -> String {
    format!("0x{}", hex::encode(keccak256(signature.as_bytes())))
}

/// `topic0` for ticket purchases.
pub static TICKET_PURCHASED_TOPIC: Lazy<String> = Lazy::new(|| event_topic(TICKET_PURCHASED_SIG));
/// `topic0` for draw initiation.
pub static DRAW_INITIATED_TOPIC: Lazy<String> = Lazy::new(|| event_topic(DRAW_INITIATED_SIG));
/// `topic0` for randomness commitment.
pub static RANDOM_SET_TOPIC: Lazy<String> = Lazy::new(|| event_topic(RANDOM_SET_SIG));
/// `topic0` for proof submission.
pub static PROOF_SUBMITTED_TOPIC: Lazy<String> = Lazy::new(|| event_topic(PROOF_SUBMITTED_SIG));
/// `topic0` for payout computation.
pub static PAYOUT_COMPUTED_TOPIC: Lazy<String> = Lazy::new(|| event_topic(PAYOUT_COMPUTED_SIG));

/// A raw log as returned by the upstream log source, with the hex
/// quantities already parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    /// Emitting contract address
    pub address: String,
    /// Indexed topics, `topics[0]` is the event signature hash
    pub topics: Vec<String>,
    /// Non-indexed payload, `0x`-prefixed hex
    pub data: String,
    /// Block the log was emitted in
    pub block_number: u64,
    /// Transaction hash
    pub transaction_hash: String,
    /// Position of the log within the block
    pub log_index: u64,
}

/// Provenance shared by every decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMeta {
    /// Block the event was emitted in
    pub block_number: u64,
    /// Transaction hash
    pub transaction_hash: String,
    /// Log index within the block
    pub log_index: u64,
}

/// Round lifecycle milestone, one per metadata column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Milestone {
    /// Draw was initiated for the round
    DrawInitiated,
    /// Randomness was committed
    RandomSet,
    /// Delay proof was submitted
    ProofSubmitted,
    /// Payouts were computed
    PayoutComputed,
}

impl Milestone {
    /// All milestones in lifecycle order.
    pub const ALL: [Milestone; 4] = [
        Milestone::DrawInitiated,
        Milestone::RandomSet,
        Milestone::ProofSubmitted,
        Milestone::PayoutComputed,
    ];

    /// Stable name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Milestone::DrawInitiated => "draw_initiated",
            Milestone::RandomSet => "random_set",
            Milestone::ProofSubmitted => "proof_submitted",
            Milestone::PayoutComputed => "payout_computed",
        }
    }

    /// Signature topic for this milestone's event.
    pub fn topic(&self) -> &'static str {
        match self {
            Milestone::DrawInitiated => DRAW_INITIATED_TOPIC.as_str(),
            Milestone::RandomSet => RANDOM_SET_TOPIC.as_str(),
            Milestone::ProofSubmitted => PROOF_SUBMITTED_TOPIC.as_str(),
            Milestone::PayoutComputed => PAYOUT_COMPUTED_TOPIC.as_str(),
        }
    }

    /// Whether the round number is carried in an indexed topic and is
    /// therefore filterable at the fetch layer.
    pub fn round_is_indexed(&self) -> bool {
        !matches!(self, Milestone::ProofSubmitted)
    }
}

/// Decoded domain event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    /// Draw initiated for a round
    DrawInitiated {
        /// Round number
        round: u64,
        /// Log provenance
        meta: LogMeta,
    },
    /// Randomness committed for a round
    RandomSet {
        /// Round number
        round: u64,
        /// Log provenance
        meta: LogMeta,
    },
    /// Delay proof submitted for a round
    ProofSubmitted {
        /// Round number (decoded from payload)
        round: u64,
        /// Log provenance
        meta: LogMeta,
    },
    /// Payouts computed for a round
    PayoutComputed {
        /// Round number
        round: u64,
        /// Log provenance
        meta: LogMeta,
    },
    /// Ticket purchased
    TicketPurchased {
        /// Round number
        round: u64,
        /// The three main ticket numbers
        numbers: [u64; 3],
        /// Bonus number
        bonus: u64,
        /// Purchasing address, lowercase `0x`-prefixed
        player: String,
        /// Log provenance
        meta: LogMeta,
    },
}

impl DomainEvent {
    /// Round the event belongs to.
    pub fn round(&self) -> u64 {
        match self {
            DomainEvent::DrawInitiated { round, .. }
            | DomainEvent::RandomSet { round, .. }
            | DomainEvent::ProofSubmitted { round, .. }
            | DomainEvent::PayoutComputed { round, .. }
            | DomainEvent::TicketPurchased { round, .. } => *round,
        }
    }

    /// Log provenance.
    pub fn meta(&self) -> &LogMeta {
        match self {
            DomainEvent::DrawInitiated { meta, .. }
            | DomainEvent::RandomSet { meta, .. }
            | DomainEvent::ProofSubmitted { meta, .. }
            | DomainEvent::PayoutComputed { meta, .. }
            | DomainEvent::TicketPurchased { meta, .. } => meta,
        }
    }

    /// Lifecycle milestone this event corresponds to, if any.
    pub fn milestone(&self) -> Option<Milestone> {
        match self {
            DomainEvent::DrawInitiated { .. } => Some(Milestone::DrawInitiated),
            DomainEvent::RandomSet { .. } => Some(Milestone::RandomSet),
            DomainEvent::ProofSubmitted { .. } => Some(Milestone::ProofSubmitted),
            DomainEvent::PayoutComputed { .. } => Some(Milestone::PayoutComputed),
            DomainEvent::TicketPurchased { .. } => None,
        }
    }
}

/// Decode a raw log into a typed domain event.
///
/// Dispatches on `topics[0]`. Failure affects this log only; callers
/// are expected to skip it and continue with the batch.
pub fn decode(log: &RawLog) -> Result<DomainEvent, DecodeError> {
    let topic0 = log
        .topics
        .first()
        .ok_or(DecodeError::MissingTopic { index: 0 })?
        .to_ascii_lowercase();

    let meta = LogMeta {
        block_number: log.block_number,
        transaction_hash: log.transaction_hash.clone(),
        log_index: log.log_index,
    };

    if topic0 == *DRAW_INITIATED_TOPIC {
        let round = round_from_topic(log)?;
        Ok(DomainEvent::DrawInitiated { round, meta })
    } else if topic0 == *RANDOM_SET_TOPIC {
        let round = round_from_topic(log)?;
        Ok(DomainEvent::RandomSet { round, meta })
    } else if topic0 == *PAYOUT_COMPUTED_TOPIC {
        let round = round_from_topic(log)?;
        Ok(DomainEvent::PayoutComputed { round, meta })
    } else if topic0 == *PROOF_SUBMITTED_TOPIC {
        // Round lives in the payload; topic1 is the prover address.
        let data = abi::decode_hex("data", &log.data)?;
        let round = abi::word_u64(&data, 0)?;
        Ok(DomainEvent::ProofSubmitted { round, meta })
    } else if topic0 == *TICKET_PURCHASED_TOPIC {
        decode_ticket(log, meta)
    } else {
        Err(DecodeError::UnknownTopic(topic0))
    }
}

fn round_from_topic(log: &RawLog) -> Result<u64, DecodeError> {
    let topic = log
        .topics
        .get(1)
        .ok_or(DecodeError::MissingTopic { index: 1 })?;
    abi::topic_u64(topic)
}

/// Fixed payload layout: round at word 0, the three numbers at words
/// 1..=3, bonus at word 4. Player address is the second topic.
fn decode_ticket(log: &RawLog, meta: LogMeta) -> Result<DomainEvent, DecodeError> {
    let player_topic = log
        .topics
        .get(1)
        .ok_or(DecodeError::MissingTopic { index: 1 })?;
    let player = abi::topic_address(player_topic)?;

    let data = abi::decode_hex("data", &log.data)?;
    if data.len() < 5 * WORD {
        return Err(DecodeError::PayloadTooShort {
            need: 5 * WORD,
            got: data.len(),
        });
    }

    let round = abi::word_u64(&data, 0)?;
    let numbers = [
        abi::word_u64(&data, 1)?,
        abi::word_u64(&data, 2)?,
        abi::word_u64(&data, 3)?,
    ];
    let bonus = abi::word_u64(&data, 4)?;

    Ok(DomainEvent::TicketPurchased {
        round,
        numbers,
        bonus,
        player,
        meta,
    })
}
