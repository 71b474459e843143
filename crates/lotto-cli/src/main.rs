//! Indexer daemon and maintenance commands
//!
//! `run` starts the three sync streams and blocks until Ctrl-C.
//! `backfill` imports a historical transaction export. `status` prints
//! the live state of the current round.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use lotto_storage_sqlite::Database;
use lotto_sync::{
    backfill_import, backfill_parse, ContractReader, DriverConfig, HttpIdentityResolver,
    IdentityResolver, LotteryContract, NullIdentityResolver, RoundDiscovery, RpcClient,
    SyncDriver, DEFAULT_BATCH_SIZE,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "lotto-indexer")]
#[command(about = "Event-sourced indexer for the on-chain lottery", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DiscoveryArg {
    /// Revisit the earliest stored round that has not been drawn
    EarliestUndrawn,
    /// Follow the highest stored round, moving past it once it completes
    HighestPlusOne,
}

impl From<DiscoveryArg> for RoundDiscovery {
    fn from(arg: DiscoveryArg) -> Self {
        match arg {
            DiscoveryArg::EarliestUndrawn => RoundDiscovery::EarliestUndrawn,
            DiscoveryArg::HighestPlusOne => RoundDiscovery::HighestPlusOne,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync daemon
    Run {
        /// JSON-RPC endpoint
        #[arg(long, env = "LOTTO_RPC_URL")]
        rpc_url: String,

        /// Lottery contract address
        #[arg(long, env = "LOTTO_CONTRACT_ADDRESS")]
        contract: String,

        /// SQLite database path
        #[arg(long, env = "LOTTO_DB_PATH", default_value = "lotto.db")]
        db: PathBuf,

        /// Identity service base URL (optional)
        #[arg(long, env = "LOTTO_IDENTITY_API")]
        identity_api: Option<String>,

        /// Contract deployment block, lower bound for history scans
        #[arg(long, env = "LOTTO_DEPLOYMENT_BLOCK")]
        deployment_block: u64,

        /// Round discovery policy
        #[arg(long, value_enum, default_value = "earliest-undrawn")]
        discovery: DiscoveryArg,

        /// Log fetch window width in blocks
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: u64,

        /// Run one pass of each stream and exit
        #[arg(long)]
        once: bool,
    },

    /// Import a historical transaction export (CSV: hash,timestamp,method)
    Backfill {
        /// SQLite database path
        #[arg(long, env = "LOTTO_DB_PATH", default_value = "lotto.db")]
        db: PathBuf,

        /// Export file
        file: PathBuf,
    },

    /// Show the current round
    Status {
        /// JSON-RPC endpoint
        #[arg(long, env = "LOTTO_RPC_URL")]
        rpc_url: String,

        /// Lottery contract address
        #[arg(long, env = "LOTTO_CONTRACT_ADDRESS")]
        contract: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            rpc_url,
            contract,
            db,
            identity_api,
            deployment_block,
            discovery,
            batch_size,
            once,
        } => {
            run_daemon(
                rpc_url,
                contract,
                db,
                identity_api,
                deployment_block,
                discovery.into(),
                batch_size,
                once,
            )
            .await
        }
        Commands::Backfill { db, file } => run_backfill(db, file),
        Commands::Status { rpc_url, contract } => run_status(rpc_url, contract).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_daemon(
    rpc_url: String,
    contract: String,
    db: PathBuf,
    identity_api: Option<String>,
    deployment_block: u64,
    discovery: RoundDiscovery,
    batch_size: u64,
    once: bool,
) -> anyhow::Result<()> {
    if deployment_block == 0 {
        anyhow::bail!("deployment block is required; scanning from genesis is not supported");
    }
    if batch_size == 0 {
        anyhow::bail!("batch size must be at least one block");
    }

    let rpc = Arc::new(RpcClient::new(&rpc_url).context("building RPC client")?);
    let reader = Arc::new(LotteryContract::new(rpc.clone(), &contract));
    let resolver: Arc<dyn IdentityResolver> = match identity_api {
        Some(base) => Arc::new(HttpIdentityResolver::new(base)),
        None => Arc::new(NullIdentityResolver),
    };

    let mut config = DriverConfig::new(db, contract);
    config.deployment_block = deployment_block;
    config.discovery = discovery;
    config.batch_size = batch_size;

    let driver = SyncDriver::new(rpc, reader, resolver, config);

    if once {
        driver.run_once().await.context("one-shot sync pass")?;
        return Ok(());
    }

    let cancel = driver.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            cancel.cancel();
        }
    });

    driver.run().await.context("sync driver")?;
    Ok(())
}

fn run_backfill(db: PathBuf, file: PathBuf) -> anyhow::Result<()> {
    let input = std::fs::read_to_string(&file)
        .with_context(|| format!("reading export {}", file.display()))?;
    let rows = backfill_parse(&input).context("parsing export")?;

    let database = Database::open(&db).context("opening database")?;
    let summary = backfill_import(&database, &rows).context("importing export")?;

    println!(
        "imported {} milestones over {} rounds ({} rows, {} skipped)",
        summary.milestones, summary.rounds, summary.rows, summary.skipped
    );
    Ok(())
}

async fn run_status(rpc_url: String, contract: String) -> anyhow::Result<()> {
    let rpc = Arc::new(RpcClient::new(&rpc_url).context("building RPC client")?);
    let reader = LotteryContract::new(rpc, &contract);

    let on_chain = reader
        .current_round_info()
        .await
        .context("reading current round")?;

    println!("round:            {}", on_chain.round);
    println!("difficulty:       {}", on_chain.difficulty);
    println!("prize pool (wei): {}", on_chain.prize_pool_wei);
    println!("draw time (unix): {}", on_chain.draw_time);
    println!("until draw (s):   {}", on_chain.seconds_until_draw);
    Ok(())
}
