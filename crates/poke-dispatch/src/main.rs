//! poke-dispatch binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! store, builds the configured tunnels and runs dispatch passes on a fixed
//! interval until Ctrl-C. With `--once` it runs a single pass and exits.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Parser;
use poke_dispatch::{DispatchConfig, Dispatcher};
use poke_store_sqlite::SqliteStore;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Poke dispatcher")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Run a single dispatch pass and exit.
  #[arg(long)]
  once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let cfg = DispatchConfig::load(&cli.config).context("failed to load DispatchConfig")?;

  let store_path = expand_tilde(&cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let tunnels = cfg.tunnels(&store).context("failed to configure tunnels")?;
  if tunnels.is_empty() {
    warn!("no tunnels configured; due pokes will stay queued");
  }
  for tunnel in tunnels.describe() {
    info!(%tunnel, "tunnel ready");
  }

  let mut dispatcher = Dispatcher::new(store, tunnels);
  if let Some(claim) = cfg.claim_settings().context("invalid claim settings")? {
    info!(claimant = %claim.claimant, lease_secs = cfg.lease_secs, "claiming pokes before send");
    dispatcher = dispatcher.with_claim(claim);
  }

  if cli.once {
    let report = dispatcher.run_once().await.context("dispatch pass failed")?;
    info!(?report, "single pass done");
    return Ok(());
  }

  let mut ticker = tokio::time::interval(cfg.interval());
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
  let shutdown = tokio::signal::ctrl_c();
  tokio::pin!(shutdown);

  info!(interval_secs = cfg.interval().as_secs(), "dispatcher started");
  loop {
    tokio::select! {
      _ = ticker.tick() => {
        // A pass is never interrupted; shutdown waits for it to finish.
        if let Err(e) = dispatcher.run_once().await {
          error!(error = %e, "dispatch pass failed");
        }
      }
      res = &mut shutdown => {
        res.context("failed to listen for ctrl-c")?;
        info!("shutting down");
        break;
      }
    }
  }

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
