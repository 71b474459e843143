//! Stored record types

use serde::{Deserialize, Serialize};

/// Winning-number sentinel meaning "round not yet drawn".
pub const UNDRAWN_NUMBERS: [u64; 4] = [0, 0, 0, 0];

/// One purchased ticket, keyed by `(transaction_hash, log_index)`.
///
/// Created on first decode of its purchase event; the winner fields
/// are owned by the round reconciler and survive re-delivery of the
/// originating log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRecord {
    /// Row id (None before insert)
    pub id: Option<i64>,
    /// Originating transaction hash
    pub transaction_hash: String,
    /// Log index within the block
    pub log_index: u64,
    /// Round the ticket was bought for
    pub round_number: u64,
    /// Block of the purchase
    pub block_number: u64,
    /// First ticket number
    pub number1: u64,
    /// Second ticket number
    pub number2: u64,
    /// Third ticket number
    pub number3: u64,
    /// Bonus number
    pub bonus_number: u64,
    /// Purchasing address, lowercase `0x`-prefixed
    pub player_address: String,
    /// Resolved display name (best-effort enrichment)
    pub display_name: Option<String>,
    /// Resolved avatar URL (best-effort enrichment)
    pub avatar_url: Option<String>,
    /// Tri-state winner flag: None = not yet evaluated
    pub is_winner: Option<bool>,
    /// Whether the round reconciler has examined this ticket
    pub is_processed: bool,
    /// Insertion timestamp (ISO 8601)
    pub created_at: String,
}

/// Aggregate state of one lottery round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// Round number
    pub round_number: u64,
    /// Ticket count, recomputed each pass
    pub total_tickets: u64,
    /// Winning numbers; all zero while undrawn
    pub winning_numbers: [u64; 4],
    /// Prize pool in wei, decimal text
    pub prize_pool_wei: String,
    /// Total winner count from the on-chain read
    pub total_winners: u64,
    /// Gold-tier winner count
    pub gold_winners: u64,
    /// Silver-tier winner count
    pub silver_winners: u64,
    /// Bronze-tier winner count
    pub bronze_winners: u64,
    /// Completion flag; transitions false -> true only
    pub completed: bool,
    /// Last reconciliation timestamp (ISO 8601)
    pub processed_at: String,
}

impl RoundRecord {
    /// Whether the round has been drawn (winning numbers non-sentinel).
    pub fn is_drawn(&self) -> bool {
        self.winning_numbers != UNDRAWN_NUMBERS
    }
}

/// Per-round lifecycle milestones, each a write-once
/// `(transaction hash, timestamp)` pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundMetadataRecord {
    /// Round number
    pub round_number: u64,
    /// Draw-initiated transaction hash
    pub draw_initiated_tx: Option<String>,
    /// Draw-initiated block timestamp (ISO 8601)
    pub draw_initiated_at: Option<String>,
    /// Random-set transaction hash
    pub random_set_tx: Option<String>,
    /// Random-set block timestamp
    pub random_set_at: Option<String>,
    /// Proof-submitted transaction hash
    pub proof_submitted_tx: Option<String>,
    /// Proof-submitted block timestamp
    pub proof_submitted_at: Option<String>,
    /// Payout-computed transaction hash
    pub payout_computed_tx: Option<String>,
    /// Payout-computed block timestamp
    pub payout_computed_at: Option<String>,
}

impl RoundMetadataRecord {
    /// True if no milestone has been recorded.
    pub fn is_empty(&self) -> bool {
        self.draw_initiated_tx.is_none()
            && self.random_set_tx.is_none()
            && self.proof_submitted_tx.is_none()
            && self.payout_computed_tx.is_none()
    }

    /// True if at least one milestone is still unrecorded.
    pub fn has_gaps(&self) -> bool {
        self.draw_initiated_tx.is_none()
            || self.random_set_tx.is_none()
            || self.proof_submitted_tx.is_none()
            || self.payout_computed_tx.is_none()
    }
}
