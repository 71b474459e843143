//! Singleton sync-cursor storage
//!
//! Holds the last fully-processed block of the remote log. Written
//! once per reconciled window, never per individual log, and never
//! allowed to move backwards.

use crate::retry::with_busy_retry;
use crate::{Database, Result};
use rusqlite::params;

/// Sync-cursor storage operations
pub struct CursorStore<'a> {
    db: &'a Database,
}

impl<'a> CursorStore<'a> {
    /// Create new cursor store
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Load the last fully-processed block.
    pub fn last_block(&self) -> Result<u64> {
        with_busy_retry(|| {
            let block: u64 = self.db.conn().query_row(
                "SELECT last_block FROM sync_cursor WHERE id = 1",
                [],
                |row| row.get(0),
            )?;
            Ok(block)
        })
    }

    /// Advance the cursor to `block`.
    ///
    /// Monotonic: a value below the stored cursor is a no-op, so a
    /// re-run over an already-processed range can never regress it.
    pub fn advance(&self, block: u64) -> Result<()> {
        let updated_at = chrono::Utc::now().to_rfc3339();

        with_busy_retry(|| {
            self.db.conn().execute(
                "UPDATE sync_cursor SET last_block = MAX(last_block, ?1), updated_at = ?2 \
                 WHERE id = 1",
                params![block, updated_at],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_cursor_starts_at_zero() {
        let db = test_db();
        assert_eq!(CursorStore::new(&db).last_block().unwrap(), 0);
    }

    #[test]
    fn test_cursor_advances() {
        let db = test_db();
        let store = CursorStore::new(&db);

        store.advance(1000).unwrap();
        assert_eq!(store.last_block().unwrap(), 1000);

        store.advance(2500).unwrap();
        assert_eq!(store.last_block().unwrap(), 2500);
    }

    #[test]
    fn test_cursor_never_decreases() {
        let db = test_db();
        let store = CursorStore::new(&db);

        store.advance(2000).unwrap();
        store.advance(500).unwrap();
        assert_eq!(store.last_block().unwrap(), 2000);
    }
}
