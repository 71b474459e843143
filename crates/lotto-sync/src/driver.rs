//! Sync orchestration
//!
//! Runs the three reconciliation streams on independent tokio tasks,
//! each with its own database connection and its own cadence. Ticket
//! ingestion walks the chain every fifteen minutes; round settlement
//! and metadata scans run every minute. A failed pass is logged and
//! retried on the next tick, never fatal to the stream.

use crate::{
    BatchFetcher, CancelToken, ContractReader, Error, FetchConfig, IdentityResolver, LogSource,
    MetadataReconciler, Result, RoundDiscovery, RoundReconciler, TicketReconciler,
    DEFAULT_BATCH_SIZE,
};
use lotto_storage_sqlite::Database;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Driver configuration
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// SQLite database path, shared by all streams via WAL
    pub db_path: PathBuf,
    /// Lottery contract address
    pub contract_address: String,
    /// Block the contract was deployed at, lower bound for history scans
    pub deployment_block: u64,
    /// Round discovery policy for the settlement stream
    pub discovery: RoundDiscovery,
    /// Log fetch window width in blocks
    pub batch_size: u64,
    /// Ticket ingestion cadence
    pub ticket_interval: Duration,
    /// Round settlement cadence
    pub round_interval: Duration,
    /// Metadata scan cadence
    pub metadata_interval: Duration,
}

impl DriverConfig {
    /// Config with production cadences.
    pub fn new(db_path: impl Into<PathBuf>, contract_address: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            contract_address: contract_address.into(),
            deployment_block: 0,
            discovery: RoundDiscovery::EarliestUndrawn,
            batch_size: DEFAULT_BATCH_SIZE,
            ticket_interval: Duration::from_secs(15 * 60),
            round_interval: Duration::from_secs(60),
            metadata_interval: Duration::from_secs(60),
        }
    }
}

/// Orchestrates the three sync streams.
pub struct SyncDriver<S, C, R: ?Sized> {
    source: Arc<S>,
    contract: Arc<C>,
    resolver: Arc<R>,
    config: DriverConfig,
    cancel: CancelToken,
}

impl<S, C, R> SyncDriver<S, C, R>
where
    S: LogSource + 'static,
    C: ContractReader + 'static,
    R: IdentityResolver + ?Sized + 'static,
{
    /// Create a driver over the given chain and identity backends.
    pub fn new(source: Arc<S>, contract: Arc<C>, resolver: Arc<R>, config: DriverConfig) -> Self {
        Self {
            source,
            contract,
            resolver,
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Token that stops all streams when cancelled.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    // A zero-width window can never be fetched; fail before any
    // stream starts.
    fn check_config(&self) -> Result<()> {
        if self.config.batch_size == 0 {
            return Err(Error::Config(
                "batch size must be at least one block".to_string(),
            ));
        }
        Ok(())
    }

    fn fetcher(&self) -> BatchFetcher<S> {
        let mut config = FetchConfig::new(&self.config.contract_address);
        config.batch_size = self.config.batch_size;
        BatchFetcher::new(self.source.clone(), config)
    }

    fn ticket_reconciler(&self) -> Result<TicketReconciler<S, R>> {
        Ok(TicketReconciler::new(
            self.fetcher(),
            self.resolver.clone(),
            Database::open(&self.config.db_path)?,
        )
        .with_cancel(self.cancel.clone()))
    }

    fn round_reconciler(&self) -> Result<RoundReconciler<C>> {
        Ok(RoundReconciler::new(
            self.contract.clone(),
            self.config.discovery,
            Database::open(&self.config.db_path)?,
        ))
    }

    fn metadata_reconciler(&self) -> Result<MetadataReconciler<S, C>> {
        Ok(MetadataReconciler::new(
            self.fetcher(),
            self.contract.clone(),
            self.config.deployment_block,
            Database::open(&self.config.db_path)?,
        )
        .with_cancel(self.cancel.clone()))
    }

    /// Run one pass of each stream, sequentially. Used for one-shot
    /// invocations and smoke checks.
    pub async fn run_once(&self) -> Result<()> {
        self.check_config()?;
        self.ticket_reconciler()?.run_pass().await?;
        self.round_reconciler()?.run_pass().await?;
        self.metadata_reconciler()?.run_pass().await?;
        Ok(())
    }

    /// Run all three streams until the cancel token fires.
    pub async fn run(self) -> Result<()> {
        self.check_config()?;
        info!(
            db = %self.config.db_path.display(),
            contract = %self.config.contract_address,
            "starting sync streams"
        );

        let tickets = Arc::new(self.ticket_reconciler()?);
        let rounds = Arc::new(self.round_reconciler()?);
        let metadata = Arc::new(self.metadata_reconciler()?);

        let ticket_task = tokio::spawn(stream_loop(
            "tickets",
            self.config.ticket_interval,
            self.cancel.clone(),
            move || {
                let r = tickets.clone();
                async move { r.run_pass().await.map(|_| ()) }
            },
        ));
        let round_task = tokio::spawn(stream_loop(
            "rounds",
            self.config.round_interval,
            self.cancel.clone(),
            move || {
                let r = rounds.clone();
                async move { r.run_pass().await.map(|_| ()) }
            },
        ));
        let metadata_task = tokio::spawn(stream_loop(
            "metadata",
            self.config.metadata_interval,
            self.cancel.clone(),
            move || {
                let r = metadata.clone();
                async move { r.run_pass().await.map(|_| ()) }
            },
        ));

        let _ = tokio::join!(ticket_task, round_task, metadata_task);
        info!("sync streams stopped");
        Ok(())
    }
}

/// Tick a pass on a fixed cadence until cancellation. Pass failures
/// are logged and the stream keeps going.
async fn stream_loop<F, Fut>(name: &'static str, interval: Duration, cancel: CancelToken, pass: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    loop {
        if cancel.is_cancelled() {
            break;
        }
        if let Err(e) = pass().await {
            error!(stream = name, error = %e, "pass failed, will retry next tick");
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    info!(stream = name, "stream stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CurrentRoundInfo, Error, Identity, LogFilter, RoundDetails};
    use async_trait::async_trait;
    use lotto_core::RawLog;

    struct EmptyChain;

    #[async_trait]
    impl LogSource for EmptyChain {
        async fn get_logs(&self, _filter: &LogFilter) -> Result<Vec<RawLog>> {
            Ok(vec![])
        }
        async fn block_number(&self) -> Result<u64> {
            Ok(1_000)
        }
        async fn block_timestamp(&self, _block: u64) -> Result<u64> {
            Ok(1_700_000_000)
        }
    }

    struct SingleRound;

    #[async_trait]
    impl ContractReader for SingleRound {
        async fn round_details(&self, round: u64) -> Result<RoundDetails> {
            Ok(RoundDetails {
                round,
                status: 0,
                prize_pool_wei: 0,
                total_winners: 0,
                gold_winners: 0,
                silver_winners: 0,
                bronze_winners: 0,
                winning_numbers: [0; 4],
                difficulty: 0,
                draw_initiated_block: 0,
                randao_block: 0,
                randao_value: 0,
                payouts_wei: [0; 3],
            })
        }
        async fn current_round(&self) -> Result<u64> {
            Ok(1)
        }
        async fn round_prize_pool(&self, _round: u64) -> Result<u128> {
            Ok(0)
        }
        async fn current_round_info(&self) -> Result<CurrentRoundInfo> {
            Err(Error::InvalidResponse("unused".to_string()))
        }
    }

    struct NoIdentity;

    #[async_trait]
    impl IdentityResolver for NoIdentity {
        async fn resolve(&self, _address: &str) -> Option<Identity> {
            None
        }
    }

    fn test_driver(db_path: PathBuf) -> SyncDriver<EmptyChain, SingleRound, NoIdentity> {
        let mut config = DriverConfig::new(db_path, "0xcontract");
        config.ticket_interval = Duration::from_millis(10);
        config.round_interval = Duration::from_millis(10);
        config.metadata_interval = Duration::from_millis(10);
        SyncDriver::new(
            Arc::new(EmptyChain),
            Arc::new(SingleRound),
            Arc::new(NoIdentity),
            config,
        )
    }

    #[test]
    fn test_config_defaults() {
        let config = DriverConfig::new("/tmp/lotto.db", "0xabc");
        assert_eq!(config.ticket_interval, Duration::from_secs(900));
        assert_eq!(config.round_interval, Duration::from_secs(60));
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.discovery, RoundDiscovery::EarliestUndrawn);
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DriverConfig::new(dir.path().join("lotto.db"), "0xcontract");
        config.batch_size = 0;
        let driver = SyncDriver::new(
            Arc::new(EmptyChain),
            Arc::new(SingleRound),
            Arc::new(NoIdentity),
            config,
        );

        let err = driver.run_once().await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_run_once_on_empty_chain() {
        let dir = tempfile::tempdir().unwrap();
        let driver = test_driver(dir.path().join("lotto.db"));
        driver.run_once().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_stops_all_streams() {
        let dir = tempfile::tempdir().unwrap();
        let driver = test_driver(dir.path().join("lotto.db"));
        let cancel = driver.cancel_token();

        let handle = tokio::spawn(driver.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("driver did not stop after cancel")
            .unwrap()
            .unwrap();
    }
}
