//! `strata`: snapshot history for the Chicago crime dataset.
//!
//! # Usage
//!
//! ```text
//! strata run                        # today's snapshot
//! strata run --date 2024-01-02      # a specific snapshot date
//! strata run --offline --force      # reprocess a file already on disk
//! strata serve                      # JSON read API
//! strata runs                       # list run records
//! ```

mod config;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use strata_core::{run::RunRecord, store::SnapshotStore};
use strata_etl::{
  DirectoryFetcher, Fetcher, HttpFetcher, Pipeline, RunReport, SystemClock,
};
use strata_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::Settings;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "strata", version, about = "Snapshot-to-history reconciliation")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "strata.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Fetch and reconcile one snapshot.
  Run {
    /// Nominal snapshot date (YYYY-MM-DD); defaults to today.
    #[arg(long)]
    date:    Option<NaiveDate>,
    /// Reprocess a date that already has a run record.
    #[arg(long)]
    force:   bool,
    /// Only use files already in the storage directory.
    #[arg(long)]
    offline: bool,
  },
  /// Serve the JSON read API.
  Serve,
  /// Print every run record, oldest first.
  Runs,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

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
  let settings = Settings::load(&cli.config)?;

  let mut store = SqliteStore::open(&settings.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.store_path))?;
  if let Some(limit) = settings.stage_timeout() {
    store = store.with_stage_timeout(limit);
  }
  let store = Arc::new(store);

  match cli.command {
    Command::Run { date, force, offline } => {
      if offline {
        let fetcher = DirectoryFetcher::new(&settings.storage_dir);
        run(&settings, store, fetcher, date, force).await
      } else {
        let fetcher = HttpFetcher::new(
          settings.portal_url.clone(),
          &settings.storage_dir,
          settings.download_timeout(),
        )
        .context("failed to build HTTP client")?;
        run(&settings, store, fetcher, date, force).await
      }
    }
    Command::Serve => serve(&settings, store).await,
    Command::Runs => runs(store).await,
  }
}

// ─── Commands ─────────────────────────────────────────────────────────────────

async fn run<F: Fetcher>(
  settings: &Settings,
  store: Arc<SqliteStore>,
  fetcher: F,
  date: Option<NaiveDate>,
  force: bool,
) -> anyhow::Result<()> {
  let pipeline = Pipeline::new(store, fetcher, SystemClock, settings.pipeline()?);
  match pipeline.run(date, force).await.context("run failed")? {
    RunReport::Skipped { snapshot_date } => {
      println!("{snapshot_date}: already processed (use --force to reprocess)");
    }
    RunReport::Completed(s) => {
      println!(
        "{}: staged {}, novel {}, changed {}, deleted {}, {} records with history",
        s.snapshot_date, s.staged, s.novel, s.changed, s.deleted, s.changed_records
      );
    }
  }
  Ok(())
}

async fn serve(settings: &Settings, store: Arc<SqliteStore>) -> anyhow::Result<()> {
  let app = strata_api::api_router(store).layer(TraceLayer::new_for_http());
  let address = format!("{}:{}", settings.host, settings.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;
  Ok(())
}

async fn runs(store: Arc<SqliteStore>) -> anyhow::Result<()> {
  let runs = store.list_runs().await.context("failed to list runs")?;
  for r in &runs {
    println!("{}", run_line(r));
  }
  let failed = runs.iter().filter(|r| !r.status.is_success()).count();
  println!("{} runs, {failed} failed", runs.len());
  if let Some((first, last)) = store.snapshot_range().await.context("failed to read range")? {
    println!("processed snapshots: {first} .. {last}");
  }
  Ok(())
}

fn run_line(r: &RunRecord) -> String {
  let marker = if r.status.is_success() { "ok  " } else { "FAIL" };
  let stage = r.failed_stage.map(|s| format!(" at {s}")).unwrap_or_default();
  format!(
    "{marker}  {}  {}  {}  {}{stage}",
    r.snapshot_date,
    r.processed_at.format("%Y-%m-%d %H:%M:%S"),
    r.filename,
    r.status,
  )
}
