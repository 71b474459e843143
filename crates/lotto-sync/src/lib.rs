//! Chain reconciliation engine for the lotto indexer
//!
//! Three independent streams keep the local store converged with the
//! contract: ticket ingestion (cursor-driven log walk), round
//! settlement (authoritative contract reads), and round-metadata
//! history scans. All writes are idempotent upserts, so any stream can
//! be re-run over ground it has already covered.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backfill;
pub mod cancel;
pub mod contract;
pub mod driver;
pub mod enrich;
pub mod error;
pub mod fetcher;
pub mod metadata;
pub mod rounds;
pub mod rpc;
pub mod tickets;

pub use backfill::{import as backfill_import, parse as backfill_parse, BackfillRow, BackfillSummary};
pub use cancel::CancelToken;
pub use contract::{ContractReader, CurrentRoundInfo, LotteryContract, RoundDetails};
pub use driver::{DriverConfig, SyncDriver};
pub use enrich::{HttpIdentityResolver, Identity, IdentityResolver, NullIdentityResolver};
pub use error::{is_range_too_large, Error, Result};
pub use fetcher::{BatchFetcher, FetchConfig, DEFAULT_BATCH_SIZE};
pub use metadata::{MetadataPassSummary, MetadataReconciler};
pub use rounds::{RoundDiscovery, RoundPassSummary, RoundReconciler};
pub use rpc::{LogFilter, LogSource, RpcClient};
pub use tickets::{TicketPassSummary, TicketReconciler};
