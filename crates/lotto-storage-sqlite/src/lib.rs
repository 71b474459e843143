//! SQLite storage for the lottery reconciler
//!
//! Provides the relational store the reconciliation streams write
//! into: tickets, rounds, round metadata, and the singleton sync
//! cursor. All writes are idempotent upserts keyed by stable
//! identity; nothing is ever deleted. WAL mode plus SQLITE_BUSY
//! retry serialize concurrent writers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cursor;
pub mod database;
pub mod error;
pub mod metadata;
pub mod migrations;
pub mod models;
mod retry;
pub mod rounds;
pub mod tickets;

pub use cursor::CursorStore;
pub use database::Database;
pub use error::{Error, Result};
pub use metadata::MetadataStore;
pub use models::{RoundMetadataRecord, RoundRecord, TicketRecord, UNDRAWN_NUMBERS};
pub use rounds::RoundStore;
pub use tickets::TicketStore;
