/// hoopsync sync daemon
///
/// What it does:
///   1. Startup: bootstraps the current season if the regular watermark is stale
///   2. Daily ticker: reconciles league feeds into the store in the configured UTC hour
///   3. Season trigger: full bootstrap when a new season starts (Nov 1st)
///   4. Career task: all-time leaderboard discovery, then a refresh of active players
///
/// Run:
///   cargo run --bin sync-daemon

use anyhow::Result;
use dotenv::dotenv;
use hoopsync::config::AppConfig;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    hoopsync::init_tracing();

    let cfg = AppConfig::from_env();
    info!("=== hoopsync sync daemon ===");
    info!("Store: {}", cfg.db_path.display());
    info!("Source: {}", cfg.base_url);
    info!("Logs: {}", cfg.log_dir.display());

    let mut lock = hoopsync::instance_lock(&cfg)?;
    let _write_guard = match lock.try_write() {
        Ok(guard) => {
            info!("Acquired single-instance lock.");
            guard
        }
        Err(_) => {
            warn!("Another hoopsync process is already running! Exiting.");
            return Ok(());
        }
    };

    let app = hoopsync::build(&cfg)?;
    let scheduler = app.scheduler;

    let cancel = scheduler.cancel_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested, stopping after the current step."),
            Err(e) => warn!("Signal handler failed, shutting down: {e}"),
        }
        cancel.cancel();
    });

    match scheduler.startup_check().await {
        Ok(Some(report)) => info!("Startup bootstrap done: {report}"),
        Ok(None) => info!("Store is fresh, no startup sync needed."),
        Err(e) => warn!("Startup sync failed: {e}"),
    }

    for handle in scheduler.spawn() {
        if let Err(e) = handle.await {
            warn!("Scheduler task ended abnormally: {e}");
        }
    }

    info!("All scheduler tasks stopped.");
    Ok(())
}
