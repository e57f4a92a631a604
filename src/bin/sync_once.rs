//! One-shot runs of the scheduler's operations, plus a store summary.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use hoopsync::config::AppConfig;
use sync_engine::{Repository, Season, SyncKind};

#[derive(Parser)]
#[command(name = "sync-once", about = "Run a single hoopsync operation and exit")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Full import of one season (defaults to the current one).
    Bootstrap {
        /// Season end year, e.g. 2025 for 2024-25.
        #[arg(long)]
        season: Option<i32>,
    },
    /// Reconcile the current season against the league feeds.
    Incremental,
    /// Scan the all-time leaderboards and store every candidate's career.
    CareerDiscover,
    /// Re-scrape careers of players still active.
    CareerRefresh,
    /// Print row counts and watermarks.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    hoopsync::init_tracing();
    let cli = Cli::parse();
    let cfg = AppConfig::from_env();

    let mut lock = hoopsync::instance_lock(&cfg)?;
    let Ok(_write_guard) = lock.try_write() else {
        bail!("another hoopsync process holds {}", cfg.lock_path.display());
    };

    let app = hoopsync::build(&cfg)?;
    let scheduler = app.scheduler;

    let report = match cli.command {
        Command::Bootstrap { season } => {
            let season = season.map(Season::new).unwrap_or_else(|| scheduler.current_season());
            scheduler.run_bootstrap(season).await?
        }
        Command::Incremental => scheduler.run_incremental_sync().await?,
        Command::CareerDiscover => scheduler.run_career_discovery().await?,
        Command::CareerRefresh => scheduler.run_career_refresh().await?,
        Command::Stats => {
            println!("db_path={}", cfg.db_path.display());
            for (table, count) in app.store.row_counts()? {
                println!("{table}: {count}");
            }
            for kind in [SyncKind::Regular, SyncKind::Career] {
                match app.store.watermark(kind).await? {
                    Some(at) => println!("watermark {kind}: {}", at.to_rfc3339()),
                    None => println!("watermark {kind}: <none>"),
                }
            }
            return Ok(());
        }
    };

    println!("{report}");
    for failure in &report.failures {
        println!("  failed {} [{}]: {}", failure.key, failure.stage, failure.message);
    }
    Ok(())
}
