//! Round-metadata storage
//!
//! Four write-once milestone pairs per round. First write wins: a
//! later conflicting value for an already-filled field never
//! overwrites, which keeps repeated history scans and the CSV
//! backfill path mergeable without conflict. An explicit all-null row
//! distinguishes "scanned, nothing found" from "never scanned".

use crate::models::RoundMetadataRecord;
use crate::retry::with_busy_retry;
use crate::{Database, Result};
use lotto_core::Milestone;
use rusqlite::{params, OptionalExtension, Row};

/// Round-metadata storage operations
pub struct MetadataStore<'a> {
    db: &'a Database,
}

impl<'a> MetadataStore<'a> {
    /// Create new metadata store
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Record a milestone for a round, first-write-wins.
    pub fn record_milestone(
        &self,
        round: u64,
        milestone: Milestone,
        transaction_hash: &str,
        timestamp: &str,
    ) -> Result<()> {
        let (tx_col, at_col) = columns(milestone);
        let sql = format!(
            "INSERT INTO round_metadata (round_number, {tx_col}, {at_col}) \
             VALUES (?1, ?2, ?3) \
             ON CONFLICT (round_number) DO UPDATE SET \
                 {tx_col} = COALESCE(round_metadata.{tx_col}, excluded.{tx_col}), \
                 {at_col} = COALESCE(round_metadata.{at_col}, excluded.{at_col})"
        );

        with_busy_retry(|| {
            self.db
                .conn()
                .execute(&sql, params![round, transaction_hash, timestamp])?;
            Ok(())
        })
    }

    /// Store an explicit all-null row marking the round as scanned.
    /// Existing milestones are left untouched.
    pub fn store_empty(&self, round: u64) -> Result<()> {
        with_busy_retry(|| {
            self.db.conn().execute(
                "INSERT OR IGNORE INTO round_metadata (round_number) VALUES (?1)",
                [round],
            )?;
            Ok(())
        })
    }

    /// Look up a round's metadata.
    pub fn get(&self, round: u64) -> Result<Option<RoundMetadataRecord>> {
        with_busy_retry(|| {
            let record = self
                .db
                .conn()
                .query_row(
                    "SELECT round_number, draw_initiated_tx, draw_initiated_at, \
                     random_set_tx, random_set_at, proof_submitted_tx, proof_submitted_at, \
                     payout_computed_tx, payout_computed_at \
                     FROM round_metadata WHERE round_number = ?1",
                    [round],
                    row_to_metadata,
                )
                .optional()?;
            Ok(record)
        })
    }

    /// Rounds in `[1, latest)` that still need a history scan: no row
    /// exists yet, or the row is partially filled. An all-null row
    /// counts as scanned-and-empty and is never revisited.
    pub fn rounds_needing_scan(&self, latest: u64) -> Result<Vec<u64>> {
        if latest <= 1 {
            return Ok(Vec::new());
        }

        let existing = with_busy_retry(|| {
            let conn = self.db.conn();
            let mut stmt = conn.prepare(
                "SELECT round_number, draw_initiated_tx, draw_initiated_at, \
                 random_set_tx, random_set_at, proof_submitted_tx, proof_submitted_at, \
                 payout_computed_tx, payout_computed_at \
                 FROM round_metadata WHERE round_number < ?1",
            )?;
            let rows = stmt
                .query_map([latest], row_to_metadata)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let complete: std::collections::HashSet<u64> = existing
            .iter()
            .filter(|r| !r.has_gaps() || r.is_empty())
            .map(|r| r.round_number)
            .collect();

        Ok((1..latest).filter(|r| !complete.contains(r)).collect())
    }
}

fn columns(milestone: Milestone) -> (&'static str, &'static str) {
    match milestone {
        Milestone::DrawInitiated => ("draw_initiated_tx", "draw_initiated_at"),
        Milestone::RandomSet => ("random_set_tx", "random_set_at"),
        Milestone::ProofSubmitted => ("proof_submitted_tx", "proof_submitted_at"),
        Milestone::PayoutComputed => ("payout_computed_tx", "payout_computed_at"),
    }
}

fn row_to_metadata(row: &Row<'_>) -> rusqlite::Result<RoundMetadataRecord> {
    Ok(RoundMetadataRecord {
        round_number: row.get(0)?,
        draw_initiated_tx: row.get(1)?,
        draw_initiated_at: row.get(2)?,
        random_set_tx: row.get(3)?,
        random_set_at: row.get(4)?,
        proof_submitted_tx: row.get(5)?,
        proof_submitted_at: row.get(6)?,
        payout_computed_tx: row.get(7)?,
        payout_computed_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_milestone_write_once() {
        let db = test_db();
        let store = MetadataStore::new(&db);

        store
            .record_milestone(5, Milestone::DrawInitiated, "0xfirst", "2024-01-01T00:00:00Z")
            .unwrap();
        store
            .record_milestone(5, Milestone::DrawInitiated, "0xsecond", "2024-02-02T00:00:00Z")
            .unwrap();

        let record = store.get(5).unwrap().unwrap();
        assert_eq!(record.draw_initiated_tx.as_deref(), Some("0xfirst"));
        assert_eq!(
            record.draw_initiated_at.as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_milestones_fill_independently() {
        let db = test_db();
        let store = MetadataStore::new(&db);

        store
            .record_milestone(3, Milestone::RandomSet, "0xrand", "2024-01-01T00:00:00Z")
            .unwrap();
        store
            .record_milestone(3, Milestone::PayoutComputed, "0xpay", "2024-01-02T00:00:00Z")
            .unwrap();

        let record = store.get(3).unwrap().unwrap();
        assert_eq!(record.random_set_tx.as_deref(), Some("0xrand"));
        assert_eq!(record.payout_computed_tx.as_deref(), Some("0xpay"));
        assert!(record.draw_initiated_tx.is_none());
        assert!(record.has_gaps());
        assert!(!record.is_empty());
    }

    #[test]
    fn test_store_empty_marks_scanned() {
        let db = test_db();
        let store = MetadataStore::new(&db);

        store.store_empty(4).unwrap();

        let record = store.get(4).unwrap().unwrap();
        assert!(record.is_empty());
    }

    #[test]
    fn test_store_empty_preserves_existing() {
        let db = test_db();
        let store = MetadataStore::new(&db);

        store
            .record_milestone(4, Milestone::DrawInitiated, "0xtx", "2024-01-01T00:00:00Z")
            .unwrap();
        store.store_empty(4).unwrap();

        let record = store.get(4).unwrap().unwrap();
        assert_eq!(record.draw_initiated_tx.as_deref(), Some("0xtx"));
    }

    #[test]
    fn test_rounds_needing_scan() {
        let db = test_db();
        let store = MetadataStore::new(&db);

        // Round 1: fully recorded. Round 2: partial. Round 3:
        // explicitly scanned empty. Round 4: absent.
        for m in Milestone::ALL {
            store
                .record_milestone(1, m, "0xtx", "2024-01-01T00:00:00Z")
                .unwrap();
        }
        store
            .record_milestone(2, Milestone::DrawInitiated, "0xtx", "2024-01-01T00:00:00Z")
            .unwrap();
        store.store_empty(3).unwrap();

        assert_eq!(store.rounds_needing_scan(5).unwrap(), vec![2, 4]);
        assert!(store.rounds_needing_scan(1).unwrap().is_empty());
    }
}
