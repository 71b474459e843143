//! Round-metadata backfill stream
//!
//! For every past round with missing milestone provenance, scans the
//! chain history for the four lifecycle events and records the
//! transaction hash and block time of each. Proof submissions do not
//! carry the round in an indexed topic, so those logs are fetched
//! unfiltered and matched after decoding. A round whose scan finds
//! nothing gets an explicit empty row so it is not rescanned forever.

use crate::{BatchFetcher, CancelToken, ContractReader, Error, LogFilter, LogSource, Result};
use chrono::DateTime;
use lotto_core::{decode, round_topic, Milestone};
use lotto_storage_sqlite::{Database, MetadataStore};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one metadata pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MetadataPassSummary {
    /// Rounds scanned this pass
    pub rounds_scanned: usize,
    /// Milestones recorded
    pub milestones: usize,
    /// Rounds marked as scanned with nothing found
    pub empty_rounds: usize,
}

/// History scanner for round lifecycle provenance.
pub struct MetadataReconciler<S: LogSource, C: ContractReader> {
    fetcher: BatchFetcher<S>,
    contract: Arc<C>,
    deployment_block: u64,
    db: Database,
    cancel: CancelToken,
}

impl<S: LogSource, C: ContractReader> MetadataReconciler<S, C> {
    /// Create a reconciler with its own database connection.
    pub fn new(
        fetcher: BatchFetcher<S>,
        contract: Arc<C>,
        deployment_block: u64,
        db: Database,
    ) -> Self {
        Self {
            fetcher,
            contract,
            deployment_block,
            db,
            cancel: CancelToken::new(),
        }
    }

    /// Use a shared cancellation token; checked between rounds.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Scan every round that still has metadata gaps.
    pub async fn run_pass(&self) -> Result<MetadataPassSummary> {
        let mut summary = MetadataPassSummary::default();

        let latest = self.contract.current_round().await?;
        let pending = MetadataStore::new(&self.db).rounds_needing_scan(latest)?;
        if pending.is_empty() {
            debug!(latest, "no rounds need a metadata scan");
            return Ok(summary);
        }

        let head = self.fetcher.source().block_number().await?;
        // Block timestamps repeat across milestones within a pass.
        let mut timestamps: HashMap<u64, u64> = HashMap::new();

        for round in pending {
            if self.cancel.is_cancelled() {
                debug!("cancelled mid-pass");
                break;
            }
            self.scan_round(round, head, &mut timestamps, &mut summary)
                .await?;
            summary.rounds_scanned += 1;
        }

        info!(
            rounds = summary.rounds_scanned,
            milestones = summary.milestones,
            empty = summary.empty_rounds,
            "metadata pass complete"
        );
        Ok(summary)
    }

    async fn scan_round(
        &self,
        round: u64,
        head: u64,
        timestamps: &mut HashMap<u64, u64>,
        summary: &mut MetadataPassSummary,
    ) -> Result<()> {
        let store = MetadataStore::new(&self.db);
        let mut found = 0;

        for milestone in Milestone::ALL {
            let mut filter = LogFilter::for_topics(
                self.fetcher.address(),
                self.deployment_block,
                head,
                vec![milestone.topic().to_string()],
            );
            if milestone.round_is_indexed() {
                filter = filter.with_topic1(round_topic(round));
            }

            let logs = self.fetcher.fetch_filtered(filter).await?;
            for log in &logs {
                let event = match decode(log) {
                    Ok(e) => e,
                    Err(e) => {
                        warn!(tx = %log.transaction_hash, error = %e, "skipping undecodable milestone log");
                        continue;
                    }
                };
                if event.round() != round {
                    continue;
                }

                let meta = event.meta();
                let at = self
                    .block_time_rfc3339(meta.block_number, timestamps)
                    .await?;
                store.record_milestone(round, milestone, &meta.transaction_hash, &at)?;
                found += 1;
                // First occurrence wins; the store is write-once anyway.
                break;
            }
        }

        if found == 0 {
            store.store_empty(round)?;
            summary.empty_rounds += 1;
            debug!(round, "no lifecycle events found, marked scanned");
        }
        summary.milestones += found;
        Ok(())
    }

    async fn block_time_rfc3339(
        &self,
        block: u64,
        cache: &mut HashMap<u64, u64>,
    ) -> Result<String> {
        let unix = match cache.get(&block) {
            Some(ts) => *ts,
            None => {
                let ts = self.fetcher.source().block_timestamp(block).await?;
                cache.insert(block, ts);
                ts
            }
        };
        // A bogus timestamp must not reach a write-once column.
        let at = i64::try_from(unix)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| {
                Error::InvalidResponse(format!("block {} timestamp {} out of range", block, unix))
            })?;
        Ok(at.to_rfc3339())
    }
}
