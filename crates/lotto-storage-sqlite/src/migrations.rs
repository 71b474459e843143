//! Database schema migrations

use crate::{Error, Result};
use rusqlite::Connection;

const SCHEMA_VERSION: i32 = 2;

/// Run all migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    tracing::debug!(
        "Running migrations: current_version={}, target_version={}",
        current_version,
        SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    if current_version < 2 {
        migrate_v2(conn)?;
    }

    if get_schema_version(conn)? != SCHEMA_VERSION {
        set_schema_version(conn, SCHEMA_VERSION)?;
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    let result = conn.query_row(
        "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
        [],
        |row| row.get(0),
    );

    match result {
        Ok(v) => Ok(v),
        Err(_) => Ok(0),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        [],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE tickets (
            id INTEGER PRIMARY KEY,
            transaction_hash TEXT NOT NULL,
            log_index INTEGER NOT NULL,
            round_number INTEGER NOT NULL,
            block_number INTEGER NOT NULL,
            number1 INTEGER NOT NULL,
            number2 INTEGER NOT NULL,
            number3 INTEGER NOT NULL,
            bonus_number INTEGER NOT NULL,
            player_address TEXT NOT NULL,
            display_name TEXT,
            avatar_url TEXT,
            is_winner INTEGER,
            is_processed INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            UNIQUE (transaction_hash, log_index)
        );

        CREATE TABLE rounds (
            round_number INTEGER PRIMARY KEY,
            total_tickets INTEGER NOT NULL DEFAULT 0,
            winning_number1 INTEGER NOT NULL DEFAULT 0,
            winning_number2 INTEGER NOT NULL DEFAULT 0,
            winning_number3 INTEGER NOT NULL DEFAULT 0,
            winning_number4 INTEGER NOT NULL DEFAULT 0,
            prize_pool_wei TEXT NOT NULL DEFAULT '0',
            total_winners INTEGER NOT NULL DEFAULT 0,
            gold_winners INTEGER NOT NULL DEFAULT 0,
            silver_winners INTEGER NOT NULL DEFAULT 0,
            bronze_winners INTEGER NOT NULL DEFAULT 0,
            completed INTEGER NOT NULL DEFAULT 0,
            processed_at TEXT NOT NULL
        );

        -- Singleton cursor over the remote log; advanced only after a
        -- window's events have been durably applied.
        CREATE TABLE sync_cursor (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            last_block INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        );

        INSERT INTO sync_cursor (id, last_block, updated_at)
        VALUES (1, 0, datetime('now'));

        CREATE INDEX idx_tickets_round ON tickets(round_number);
        CREATE INDEX idx_tickets_player ON tickets(player_address);
        "#,
    )
    .map_err(|e| Error::Migration(e.to_string()))?;

    Ok(())
}

fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Per-round lifecycle milestones. Every column is write-once:
        -- an all-null row means "scanned, nothing found".
        CREATE TABLE round_metadata (
            round_number INTEGER PRIMARY KEY,
            draw_initiated_tx TEXT,
            draw_initiated_at TEXT,
            random_set_tx TEXT,
            random_set_at TEXT,
            proof_submitted_tx TEXT,
            proof_submitted_at TEXT,
            payout_computed_tx TEXT,
            payout_computed_at TEXT
        );
        "#,
    )
    .map_err(|e| Error::Migration(e.to_string()))?;

    Ok(())
}
