//! Round settlement stream
//!
//! Each pass reconciles one round against the contract's authoritative
//! view: total tickets, prize pool, winner tiers, winning numbers. A
//! ticket wins when its first two numbers equal the first two winning
//! numbers. A round is considered completed once tickets exist for the
//! following round, since sales only open after settlement.

use crate::{ContractReader, Result};
use chrono::Utc;
use lotto_storage_sqlite::{models::RoundRecord, Database, RoundStore, TicketStore};
use std::sync::Arc;
use tracing::{debug, info};

/// How the next round to reconcile is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundDiscovery {
    /// Earliest stored round that is undrawn or not yet completed.
    /// Falls back to one past the highest stored round, or round 1 on
    /// an empty store.
    EarliestUndrawn,
    /// The highest stored round while it is incomplete, one past it
    /// once it completes. Round 1 on an empty store.
    HighestPlusOne,
}

/// Outcome of one round pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundPassSummary {
    /// Round that was reconciled
    pub round: u64,
    /// Whether the round had been drawn
    pub drawn: bool,
    /// Tickets flagged as winners this pass
    pub winners: u64,
    /// Whether the round is now marked completed
    pub completed: bool,
}

/// Contract-driven round settler.
pub struct RoundReconciler<C: ContractReader> {
    contract: Arc<C>,
    discovery: RoundDiscovery,
    db: Database,
}

impl<C: ContractReader> RoundReconciler<C> {
    /// Create a reconciler with its own database connection.
    pub fn new(contract: Arc<C>, discovery: RoundDiscovery, db: Database) -> Self {
        Self {
            contract,
            discovery,
            db,
        }
    }

    /// Reconcile one round.
    pub async fn run_pass(&self) -> Result<RoundPassSummary> {
        let round = self.pick_round()?;
        debug!(round, discovery = ?self.discovery, "reconciling round");

        let details = self.contract.round_details(round).await?;
        let tickets = TicketStore::new(&self.db);
        let total_tickets = tickets.count_for_round(round)?;

        let mut winners = 0;
        if details.is_drawn() {
            winners = tickets.mark_round_results(
                round,
                [details.winning_numbers[0], details.winning_numbers[1]],
            )?;
        }

        // Sales for round N+1 only open once round N settles, so any
        // ticket in the next round proves this one is done.
        let completed = tickets.count_for_round(round + 1)? > 0;

        let record = RoundRecord {
            round_number: round,
            total_tickets,
            winning_numbers: details.winning_numbers,
            prize_pool_wei: details.prize_pool_wei.to_string(),
            total_winners: details.total_winners,
            gold_winners: details.gold_winners,
            silver_winners: details.silver_winners,
            bronze_winners: details.bronze_winners,
            completed,
            processed_at: Utc::now().to_rfc3339(),
        };
        RoundStore::new(&self.db).upsert(&record)?;

        if details.is_drawn() {
            info!(round, winners, total_tickets, completed, "round settled");
        }

        Ok(RoundPassSummary {
            round,
            drawn: details.is_drawn(),
            winners,
            completed,
        })
    }

    fn pick_round(&self) -> Result<u64> {
        let store = RoundStore::new(&self.db);
        let Some(max) = store.max_round()? else {
            return Ok(1);
        };
        Ok(match self.discovery {
            RoundDiscovery::EarliestUndrawn => store.earliest_unsettled()?.unwrap_or(max + 1),
            // Only move on once the highest round has completed; an
            // incomplete round is re-examined until its tickets settle.
            RoundDiscovery::HighestPlusOne => {
                let completed = store.get(max)?.map(|r| r.completed).unwrap_or(false);
                if completed {
                    max + 1
                } else {
                    max
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CurrentRoundInfo, Error, RoundDetails};
    use async_trait::async_trait;
    use lotto_storage_sqlite::models::TicketRecord;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct ScriptedContract {
        rounds: Mutex<HashMap<u64, RoundDetails>>,
    }

    fn undrawn(round: u64) -> RoundDetails {
        RoundDetails {
            round,
            status: 0,
            prize_pool_wei: 5_000_000_000_000_000_000,
            total_winners: 0,
            gold_winners: 0,
            silver_winners: 0,
            bronze_winners: 0,
            winning_numbers: [0; 4],
            difficulty: 1000,
            draw_initiated_block: 0,
            randao_block: 0,
            randao_value: 0,
            payouts_wei: [0; 3],
        }
    }

    fn drawn(round: u64, numbers: [u64; 4]) -> RoundDetails {
        RoundDetails {
            winning_numbers: numbers,
            status: 2,
            total_winners: 1,
            gold_winners: 1,
            ..undrawn(round)
        }
    }

    #[async_trait]
    impl ContractReader for ScriptedContract {
        async fn round_details(&self, round: u64) -> Result<RoundDetails> {
            self.rounds
                .lock()
                .unwrap()
                .get(&round)
                .cloned()
                .ok_or_else(|| Error::InvalidResponse(format!("no round {}", round)))
        }

        async fn current_round(&self) -> Result<u64> {
            Ok(*self.rounds.lock().unwrap().keys().max().unwrap_or(&1))
        }

        async fn round_prize_pool(&self, round: u64) -> Result<u128> {
            Ok(self.round_details(round).await?.prize_pool_wei)
        }

        async fn current_round_info(&self) -> Result<CurrentRoundInfo> {
            Err(Error::InvalidResponse("unused".to_string()))
        }
    }

    fn ticket(round: u64, tx: &str, numbers: [u64; 3]) -> TicketRecord {
        TicketRecord {
            id: None,
            transaction_hash: tx.to_string(),
            log_index: 0,
            round_number: round,
            block_number: 1,
            number1: numbers[0],
            number2: numbers[1],
            number3: numbers[2],
            bonus_number: 9,
            player_address: "0xplayer".to_string(),
            display_name: None,
            avatar_url: None,
            is_winner: None,
            is_processed: false,
            created_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn reconciler(
        discovery: RoundDiscovery,
        rounds: Vec<RoundDetails>,
    ) -> RoundReconciler<ScriptedContract> {
        let contract = Arc::new(ScriptedContract {
            rounds: Mutex::new(rounds.into_iter().map(|d| (d.round, d)).collect()),
        });
        RoundReconciler::new(contract, discovery, Database::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_empty_store_starts_at_round_one() {
        let r = reconciler(RoundDiscovery::EarliestUndrawn, vec![undrawn(1)]);
        let summary = r.run_pass().await.unwrap();
        assert_eq!(summary.round, 1);
        assert!(!summary.drawn);

        let stored = RoundStore::new(&r.db).get(1).unwrap().unwrap();
        assert!(!stored.is_drawn());
        assert_eq!(stored.prize_pool_wei, "5000000000000000000");
    }

    #[tokio::test]
    async fn test_drawn_round_flags_winners_by_first_two_numbers() {
        let r = reconciler(
            RoundDiscovery::EarliestUndrawn,
            vec![drawn(1, [4, 8, 15, 16])],
        );
        let tickets = TicketStore::new(&r.db);
        tickets.upsert(&ticket(1, "0xwin", [4, 8, 99])).unwrap();
        tickets.upsert(&ticket(1, "0xlose", [4, 9, 15])).unwrap();

        let summary = r.run_pass().await.unwrap();
        assert!(summary.drawn);
        assert_eq!(summary.winners, 1);

        let winner = tickets.get("0xwin", 0).unwrap().unwrap();
        assert_eq!(winner.is_winner, Some(true));
        assert!(winner.is_processed);
        let loser = tickets.get("0xlose", 0).unwrap().unwrap();
        assert_eq!(loser.is_winner, Some(false));
        assert!(loser.is_processed);
    }

    #[tokio::test]
    async fn test_completion_inferred_from_next_round_tickets() {
        // Round 1 stays undrawn so EarliestUndrawn revisits it.
        let r = reconciler(RoundDiscovery::EarliestUndrawn, vec![undrawn(1)]);
        let tickets = TicketStore::new(&r.db);
        tickets.upsert(&ticket(1, "0xaaa", [5, 6, 7])).unwrap();

        let first = r.run_pass().await.unwrap();
        assert!(!first.completed);

        tickets.upsert(&ticket(2, "0xbbb", [5, 6, 7])).unwrap();
        let second = r.run_pass().await.unwrap();
        assert_eq!(second.round, 1);
        assert!(second.completed);
        assert!(RoundStore::new(&r.db).get(1).unwrap().unwrap().completed);
    }

    #[tokio::test]
    async fn test_highest_plus_one_stays_on_incomplete_round() {
        let r = reconciler(
            RoundDiscovery::HighestPlusOne,
            vec![undrawn(1), undrawn(2)],
        );
        let tickets = TicketStore::new(&r.db);
        tickets.upsert(&ticket(1, "0xaaa", [5, 6, 7])).unwrap();

        let first = r.run_pass().await.unwrap();
        assert_eq!(first.round, 1);
        assert!(!first.completed);

        // Round 1 has not completed, so the next pass re-examines it
        // rather than moving on and orphaning its tickets.
        let second = r.run_pass().await.unwrap();
        assert_eq!(second.round, 1);

        tickets.upsert(&ticket(2, "0xbbb", [5, 6, 7])).unwrap();
        let third = r.run_pass().await.unwrap();
        assert_eq!(third.round, 1);
        assert!(third.completed);

        let fourth = r.run_pass().await.unwrap();
        assert_eq!(fourth.round, 2);
    }

    #[tokio::test]
    async fn test_earliest_undrawn_revisits_stored_round() {
        let e = reconciler(RoundDiscovery::EarliestUndrawn, vec![undrawn(1)]);
        e.run_pass().await.unwrap();
        let again = e.run_pass().await.unwrap();
        assert_eq!(again.round, 1);
    }
}
