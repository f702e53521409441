use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sftp_sync::{SqliteStore, Store, SyncManager};

/// Bidirectional SFTP directory sync engine.
///
/// Starts every enabled connection found in the state database and keeps
/// reconciling local and remote trees until interrupted. No control/UI
/// surface, tray icon, or auto-updater — this binary only wires the core
/// up to a process lifecycle.
#[derive(Parser, Debug)]
#[command(name = "sftp-sync", version, about)]
struct Cli {
    /// Path to the sqlite state database. Defaults to ~/.sftp-sync-rs/state.db.
    #[arg(long)]
    db: Option<PathBuf>,
}

fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sftp-sync-rs")
        .join("state.db")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let db_path = cli.db.unwrap_or_else(default_db_path);

    let store: Arc<dyn Store> =
        Arc::new(SqliteStore::open(&db_path).with_context(|| format!("failed to open state db at {}", db_path.display()))?);
    info!(db = %db_path.display(), "opened state database");

    let manager = SyncManager::new(store);
    manager.start_all().context("failed to start enabled connections")?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handler = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_handler.store(true, Ordering::SeqCst);
    })
    .context("failed to install ctrl-c handler")?;

    info!("sftp-sync running, press ctrl-c to stop");
    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(200));
    }

    info!("shutting down");
    manager.stop_all().context("failed to stop connections cleanly")?;
    Ok(())
}
