//! Ticket ingestion stream
//!
//! Walks the chain forward from the durable cursor, decoding ticket
//! purchase logs into ticket rows. The cursor commits after every
//! window, so a crash mid-pass resumes from the last completed window
//! and redelivers at most one window of logs. Upserts make the
//! redelivery harmless.

use crate::{BatchFetcher, CancelToken, IdentityResolver, LogSource, Result};
use chrono::Utc;
use lotto_core::{decode, DomainEvent, TICKET_PURCHASED_TOPIC};
use lotto_storage_sqlite::{models::TicketRecord, CursorStore, Database, TicketStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one ticket pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TicketPassSummary {
    /// Windows walked
    pub windows: usize,
    /// Logs fetched
    pub logs: usize,
    /// Tickets written (inserted or refreshed)
    pub tickets: usize,
    /// Logs that failed to decode and were skipped
    pub decode_failures: usize,
}

/// Cursor-driven ticket ingester.
pub struct TicketReconciler<S: LogSource, R: IdentityResolver + ?Sized> {
    fetcher: BatchFetcher<S>,
    resolver: Arc<R>,
    db: Database,
    cancel: CancelToken,
}

impl<S: LogSource, R: IdentityResolver + ?Sized> TicketReconciler<S, R> {
    /// Create a reconciler with its own database connection.
    pub fn new(fetcher: BatchFetcher<S>, resolver: Arc<R>, db: Database) -> Self {
        Self {
            fetcher,
            resolver,
            db,
            cancel: CancelToken::new(),
        }
    }

    /// Use a shared cancellation token; checked between windows.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run one pass: fetch everything between the cursor and the chain
    /// head, window by window.
    pub async fn run_pass(&self) -> Result<TicketPassSummary> {
        let mut summary = TicketPassSummary::default();

        let head = self.fetcher.source().block_number().await?;
        let cursor = CursorStore::new(&self.db);
        let last = cursor.last_block()?;
        if last >= head {
            debug!(last, head, "cursor at head, nothing to do");
            return Ok(summary);
        }

        for (from, to) in self.fetcher.windows(last + 1, head) {
            if self.cancel.is_cancelled() {
                debug!("cancelled mid-pass, stopping at last committed window");
                break;
            }
            let logs = self
                .fetcher
                .fetch_window(vec![TICKET_PURCHASED_TOPIC.clone()], from, to)
                .await?;
            summary.windows += 1;
            summary.logs += logs.len();

            for log in &logs {
                match decode(log) {
                    Ok(DomainEvent::TicketPurchased {
                        round,
                        numbers,
                        bonus,
                        player,
                        meta,
                    }) => {
                        self.store_ticket(round, numbers, bonus, &player, &meta)
                            .await?;
                        summary.tickets += 1;
                    }
                    Ok(other) => {
                        // The filter only asks for ticket topics, so
                        // anything else here is a provider bug.
                        warn!(tx = %other.meta().transaction_hash, "unexpected event in ticket stream");
                    }
                    Err(e) => {
                        warn!(
                            tx = %log.transaction_hash,
                            log_index = log.log_index,
                            error = %e,
                            "skipping undecodable ticket log"
                        );
                        summary.decode_failures += 1;
                    }
                }
            }

            // Commit progress only after the whole window landed.
            cursor.advance(to)?;
        }

        if summary.tickets > 0 {
            info!(
                tickets = summary.tickets,
                windows = summary.windows,
                head,
                "ticket pass complete"
            );
        }
        Ok(summary)
    }

    async fn store_ticket(
        &self,
        round: u64,
        numbers: [u64; 3],
        bonus: u64,
        player: &str,
        meta: &lotto_core::LogMeta,
    ) -> Result<()> {
        let identity = self.resolver.resolve(player).await;

        let record = TicketRecord {
            id: None,
            transaction_hash: meta.transaction_hash.clone(),
            log_index: meta.log_index,
            block_number: meta.block_number,
            round_number: round,
            number1: numbers[0],
            number2: numbers[1],
            number3: numbers[2],
            bonus_number: bonus,
            player_address: player.to_string(),
            display_name: identity.as_ref().and_then(|i| i.username.clone()),
            avatar_url: identity.as_ref().and_then(|i| i.avatar_url.clone()),
            is_winner: None,
            is_processed: false,
            created_at: Utc::now().to_rfc3339(),
        };

        TicketStore::new(&self.db).upsert(&record)?;
        Ok(())
    }
}
