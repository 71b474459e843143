//! Ticket storage
//!
//! Identity is `(transaction_hash, log_index)`, which is derivable
//! from the originating log alone, so re-delivery of the same log is
//! an idempotent overwrite. The winner flags are owned by the round
//! reconciler and are never touched by the upsert path.

use crate::models::TicketRecord;
use crate::retry::with_busy_retry;
use crate::{Database, Result};
use rusqlite::{params, OptionalExtension, Row};

/// Ticket storage operations
pub struct TicketStore<'a> {
    db: &'a Database,
}

impl<'a> TicketStore<'a> {
    /// Create new ticket store
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Upsert a ticket by its log identity.
    ///
    /// Event-derived fields are overwritten (identical on re-delivery
    /// by construction); enrichment fields only fill in when the new
    /// value is non-null; `is_winner`/`is_processed`/`created_at` are
    /// left alone on conflict.
    pub fn upsert(&self, ticket: &TicketRecord) -> Result<()> {
        with_busy_retry(|| {
            self.db.conn().execute(
                r#"
                INSERT INTO tickets (
                    transaction_hash, log_index, round_number, block_number,
                    number1, number2, number3, bonus_number,
                    player_address, display_name, avatar_url,
                    is_winner, is_processed, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                ON CONFLICT (transaction_hash, log_index) DO UPDATE SET
                    round_number = excluded.round_number,
                    block_number = excluded.block_number,
                    number1 = excluded.number1,
                    number2 = excluded.number2,
                    number3 = excluded.number3,
                    bonus_number = excluded.bonus_number,
                    player_address = excluded.player_address,
                    display_name = COALESCE(excluded.display_name, tickets.display_name),
                    avatar_url = COALESCE(excluded.avatar_url, tickets.avatar_url)
                "#,
                params![
                    ticket.transaction_hash,
                    ticket.log_index,
                    ticket.round_number,
                    ticket.block_number,
                    ticket.number1,
                    ticket.number2,
                    ticket.number3,
                    ticket.bonus_number,
                    ticket.player_address,
                    ticket.display_name,
                    ticket.avatar_url,
                    ticket.is_winner,
                    ticket.is_processed,
                    ticket.created_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Number of stored tickets for a round.
    pub fn count_for_round(&self, round: u64) -> Result<u64> {
        with_busy_retry(|| {
            let count: u64 = self.db.conn().query_row(
                "SELECT COUNT(*) FROM tickets WHERE round_number = ?1",
                [round],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Flag winners for a drawn round.
    ///
    /// A ticket wins when its first two numbers equal the first two
    /// winning numbers; the remaining numbers do not participate.
    /// Every ticket in the round becomes processed, winner or not.
    /// Returns the number of winning tickets.
    pub fn mark_round_results(&self, round: u64, winning: [u64; 2]) -> Result<u64> {
        with_busy_retry(|| {
            self.db.with_transaction(|tx| {
                let winners = tx.execute(
                    "UPDATE tickets SET is_winner = 1, is_processed = 1 \
                     WHERE round_number = ?1 AND number1 = ?2 AND number2 = ?3",
                    params![round, winning[0], winning[1]],
                )?;
                tx.execute(
                    "UPDATE tickets SET is_winner = 0, is_processed = 1 \
                     WHERE round_number = ?1 AND NOT (number1 = ?2 AND number2 = ?3)",
                    params![round, winning[0], winning[1]],
                )?;
                Ok(winners as u64)
            })
        })
    }

    /// Look up a ticket by its log identity.
    pub fn get(&self, transaction_hash: &str, log_index: u64) -> Result<Option<TicketRecord>> {
        with_busy_retry(|| {
            let ticket = self
                .db
                .conn()
                .query_row(
                    "SELECT id, transaction_hash, log_index, round_number, block_number, \
                     number1, number2, number3, bonus_number, player_address, display_name, \
                     avatar_url, is_winner, is_processed, created_at \
                     FROM tickets WHERE transaction_hash = ?1 AND log_index = ?2",
                    params![transaction_hash, log_index],
                    row_to_ticket,
                )
                .optional()?;
            Ok(ticket)
        })
    }

    /// All tickets for a round, ordered by block then log index.
    pub fn list_for_round(&self, round: u64) -> Result<Vec<TicketRecord>> {
        with_busy_retry(|| {
            let conn = self.db.conn();
            let mut stmt = conn.prepare(
                "SELECT id, transaction_hash, log_index, round_number, block_number, \
                 number1, number2, number3, bonus_number, player_address, display_name, \
                 avatar_url, is_winner, is_processed, created_at \
                 FROM tickets WHERE round_number = ?1 ORDER BY block_number, log_index",
            )?;
            let tickets = stmt
                .query_map([round], row_to_ticket)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(tickets)
        })
    }
}

fn row_to_ticket(row: &Row<'_>) -> rusqlite::Result<TicketRecord> {
    Ok(TicketRecord {
        id: row.get(0)?,
        transaction_hash: row.get(1)?,
        log_index: row.get(2)?,
        round_number: row.get(3)?,
        block_number: row.get(4)?,
        number1: row.get(5)?,
        number2: row.get(6)?,
        number3: row.get(7)?,
        bonus_number: row.get(8)?,
        player_address: row.get(9)?,
        display_name: row.get(10)?,
        avatar_url: row.get(11)?,
        is_winner: row.get(12)?,
        is_processed: row.get(13)?,
        created_at: row.get(14)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn ticket(tx: &str, log_index: u64, round: u64, numbers: [u64; 3], bonus: u64) -> TicketRecord {
        TicketRecord {
            id: None,
            transaction_hash: tx.to_string(),
            log_index,
            round_number: round,
            block_number: 100,
            number1: numbers[0],
            number2: numbers[1],
            number3: numbers[2],
            bonus_number: bonus,
            player_address: "0xplayer".to_string(),
            display_name: None,
            avatar_url: None,
            is_winner: None,
            is_processed: false,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let db = test_db();
        let store = TicketStore::new(&db);
        let t = ticket("0xaaa", 0, 1, [1, 2, 3], 4);

        store.upsert(&t).unwrap();
        store.upsert(&t).unwrap();

        assert_eq!(store.count_for_round(1).unwrap(), 1);
        let stored = store.get("0xaaa", 0).unwrap().unwrap();
        assert_eq!(stored.number1, 1);
        assert_eq!(stored.is_winner, None);
    }

    #[test]
    fn test_same_tx_distinct_log_index() {
        let db = test_db();
        let store = TicketStore::new(&db);

        store.upsert(&ticket("0xaaa", 0, 1, [1, 2, 3], 4)).unwrap();
        store.upsert(&ticket("0xaaa", 1, 1, [5, 6, 7], 8)).unwrap();

        assert_eq!(store.count_for_round(1).unwrap(), 2);
    }

    #[test]
    fn test_winner_rule_first_two_numbers() {
        let db = test_db();
        let store = TicketStore::new(&db);

        // (1,2,9) bonus 9 wins against (1,2,...); (1,3,9) does not.
        store.upsert(&ticket("0xwin", 0, 7, [1, 2, 9], 9)).unwrap();
        store.upsert(&ticket("0xlose", 0, 7, [1, 3, 9], 9)).unwrap();

        let winners = store.mark_round_results(7, [1, 2]).unwrap();
        assert_eq!(winners, 1);

        let win = store.get("0xwin", 0).unwrap().unwrap();
        assert_eq!(win.is_winner, Some(true));
        assert!(win.is_processed);

        let lose = store.get("0xlose", 0).unwrap().unwrap();
        assert_eq!(lose.is_winner, Some(false));
        assert!(lose.is_processed);
    }

    #[test]
    fn test_redelivery_keeps_winner_flags() {
        let db = test_db();
        let store = TicketStore::new(&db);
        let t = ticket("0xwin", 0, 7, [1, 2, 9], 9);

        store.upsert(&t).unwrap();
        store.mark_round_results(7, [1, 2]).unwrap();

        // Same log delivered again after the round was reconciled.
        store.upsert(&t).unwrap();

        let stored = store.get("0xwin", 0).unwrap().unwrap();
        assert_eq!(stored.is_winner, Some(true));
        assert!(stored.is_processed);
    }

    #[test]
    fn test_enrichment_fills_but_never_clears() {
        let db = test_db();
        let store = TicketStore::new(&db);

        let mut t = ticket("0xaaa", 0, 1, [1, 2, 3], 4);
        t.display_name = Some("alice".to_string());
        store.upsert(&t).unwrap();

        // Re-delivery where the lookup failed must not wipe the name.
        t.display_name = None;
        store.upsert(&t).unwrap();

        let stored = store.get("0xaaa", 0).unwrap().unwrap();
        assert_eq!(stored.display_name.as_deref(), Some("alice"));
    }
}
