//! Round storage
//!
//! One row per round. Winning numbers come from the authoritative
//! on-chain read; the all-zero sentinel means "not yet drawn". The
//! completion flag can only move false -> true.

use crate::models::RoundRecord;
use crate::retry::with_busy_retry;
use crate::{Database, Result};
use rusqlite::{params, OptionalExtension, Row};

/// Round storage operations
pub struct RoundStore<'a> {
    db: &'a Database,
}

impl<'a> RoundStore<'a> {
    /// Create new round store
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Upsert a round by number.
    ///
    /// `completed` uses `MAX` so a completed round can never revert
    /// to in-progress on a stale re-application.
    pub fn upsert(&self, round: &RoundRecord) -> Result<()> {
        with_busy_retry(|| {
            self.db.conn().execute(
                r#"
                INSERT INTO rounds (
                    round_number, total_tickets,
                    winning_number1, winning_number2, winning_number3, winning_number4,
                    prize_pool_wei, total_winners, gold_winners, silver_winners,
                    bronze_winners, completed, processed_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                ON CONFLICT (round_number) DO UPDATE SET
                    total_tickets = excluded.total_tickets,
                    winning_number1 = excluded.winning_number1,
                    winning_number2 = excluded.winning_number2,
                    winning_number3 = excluded.winning_number3,
                    winning_number4 = excluded.winning_number4,
                    prize_pool_wei = excluded.prize_pool_wei,
                    total_winners = excluded.total_winners,
                    gold_winners = excluded.gold_winners,
                    silver_winners = excluded.silver_winners,
                    bronze_winners = excluded.bronze_winners,
                    completed = MAX(rounds.completed, excluded.completed),
                    processed_at = excluded.processed_at
                "#,
                params![
                    round.round_number,
                    round.total_tickets,
                    round.winning_numbers[0],
                    round.winning_numbers[1],
                    round.winning_numbers[2],
                    round.winning_numbers[3],
                    round.prize_pool_wei,
                    round.total_winners,
                    round.gold_winners,
                    round.silver_winners,
                    round.bronze_winners,
                    round.completed,
                    round.processed_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Look up a round.
    pub fn get(&self, round: u64) -> Result<Option<RoundRecord>> {
        with_busy_retry(|| {
            let record = self
                .db
                .conn()
                .query_row(
                    "SELECT round_number, total_tickets, winning_number1, winning_number2, \
                     winning_number3, winning_number4, prize_pool_wei, total_winners, \
                     gold_winners, silver_winners, bronze_winners, completed, processed_at \
                     FROM rounds WHERE round_number = ?1",
                    [round],
                    row_to_round,
                )
                .optional()?;
            Ok(record)
        })
    }

    /// Earliest round that still needs attention: undrawn winning
    /// numbers, or drawn but not yet marked completed (backfill
    /// discovery policy).
    pub fn earliest_unsettled(&self) -> Result<Option<u64>> {
        with_busy_retry(|| {
            let round: Option<u64> = self.db.conn().query_row(
                "SELECT MIN(round_number) FROM rounds \
                 WHERE completed = 0 \
                    OR (winning_number1 = 0 AND winning_number2 = 0 \
                        AND winning_number3 = 0 AND winning_number4 = 0)",
                [],
                |row| row.get(0),
            )?;
            Ok(round)
        })
    }

    /// Highest stored round number (live-tail discovery policy).
    pub fn max_round(&self) -> Result<Option<u64>> {
        with_busy_retry(|| {
            let round: Option<u64> =
                self.db
                    .conn()
                    .query_row("SELECT MAX(round_number) FROM rounds", [], |row| row.get(0))?;
            Ok(round)
        })
    }
}

fn row_to_round(row: &Row<'_>) -> rusqlite::Result<RoundRecord> {
    Ok(RoundRecord {
        round_number: row.get(0)?,
        total_tickets: row.get(1)?,
        winning_numbers: [row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?],
        prize_pool_wei: row.get(6)?,
        total_winners: row.get(7)?,
        gold_winners: row.get(8)?,
        silver_winners: row.get(9)?,
        bronze_winners: row.get(10)?,
        completed: row.get(11)?,
        processed_at: row.get(12)?,
    })
}
