//! [`Pipeline`] runs one snapshot, from idempotency gate to run record.
//!
//! Stages run strictly in sequence; each one commits before the next starts.
//! A failing stage stops the run and is written to the run tracker together
//! with the stage it failed in.

use std::{future::Future, sync::Arc, time::Instant};

use chrono::{DateTime, NaiveDate, Utc};
use strata_core::{
  IngestError,
  change::ChangePolicy,
  history::{DeletionContext, VersionContext, VersionReport},
  run::{RunRecord, RunStatus, Stage},
  store::{SnapshotStore, StageError},
};
use tracing::Instrument as _;
use uuid::Uuid;

use crate::{
  Error, Result,
  clock::Clock,
  error::TransportError,
  fetch::{FetchedFile, Fetcher, SourceSpec},
};

/// What a pipeline fetches and how it compares.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
  pub snapshot:  SourceSpec,
  /// Classification code table; loaded before staging when set.
  pub reference: Option<SourceSpec>,
  pub policy:    ChangePolicy,
}

/// Outcome of [`Pipeline::run`] when nothing went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReport {
  /// A run record already exists for the date.
  Skipped { snapshot_date: NaiveDate },
  Completed(RunSummary),
}

/// Row counts of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
  pub run_id:          Uuid,
  pub snapshot_date:   NaiveDate,
  pub filename:        String,
  /// Reference codes merged; `None` when not configured or not loaded.
  pub reference_codes: Option<usize>,
  pub staged:          u64,
  pub novel:           u64,
  pub changed:         u64,
  pub versions:        VersionReport,
  pub deleted:         u64,
  pub changed_records: u64,
}

/// Rows a stage touched, for its log line.
trait StageRows {
  fn rows(&self) -> u64;
}

impl StageRows for u64 {
  fn rows(&self) -> u64 { *self }
}

impl StageRows for VersionReport {
  fn rows(&self) -> u64 { self.inserted + self.superseded }
}

/// Identity of the run in progress, for the run record.
struct RunContext {
  run_id:        Uuid,
  filename:      String,
  snapshot_date: NaiveDate,
  run_time:      DateTime<Utc>,
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

pub struct Pipeline<S, F, C> {
  store:   Arc<S>,
  fetcher: F,
  clock:   C,
  config:  PipelineConfig,
}

impl<S, F, C> Pipeline<S, F, C>
where
  S: SnapshotStore,
  F: Fetcher,
  C: Clock,
{
  pub fn new(store: Arc<S>, fetcher: F, clock: C, config: PipelineConfig) -> Self {
    Self { store, fetcher, clock, config }
  }

  /// Process the snapshot for `snapshot_date` (today when `None`).
  ///
  /// A date with any run record is skipped unless `force` is set. Transport
  /// failures return before a run record is written; ingest and store
  /// failures are recorded and then returned.
  pub async fn run(&self, snapshot_date: Option<NaiveDate>, force: bool) -> Result<RunReport> {
    let snapshot_date = snapshot_date.unwrap_or_else(|| self.clock.today());
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("run", %run_id, %snapshot_date);
    self.run_inner(run_id, snapshot_date, force).instrument(span).await
  }

  async fn run_inner(
    &self,
    run_id: Uuid,
    snapshot_date: NaiveDate,
    force: bool,
  ) -> Result<RunReport> {
    let should = self
      .store
      .should_process(snapshot_date)
      .await
      .map_err(|e| store_error(Stage::Track, e))?;
    if !should {
      if !force {
        tracing::info!("snapshot already processed, skipping");
        return Ok(RunReport::Skipped { snapshot_date });
      }
      tracing::warn!("snapshot already processed, reprocessing (forced)");
    }

    tracing::info!("starting run");
    let (snapshot, reference) = self.fetch_all(snapshot_date).await?;

    let reference_codes = match reference {
      Some(file) => self.load_reference(&file).await,
      None => None,
    };

    let ctx = RunContext {
      run_id,
      filename: snapshot.filename.clone(),
      snapshot_date,
      run_time: self.clock.now(),
    };

    let staged = self.stage(&ctx, &snapshot).await?;
    self.step(&ctx, Stage::Deduplicate, self.store.rank_duplicates()).await?;
    let novel = self.step(&ctx, Stage::Novelty, self.store.detect_novel()).await?;
    let changed = self
      .step(&ctx, Stage::Change, self.store.detect_changes(self.config.policy.clone()))
      .await?;
    let versions = self
      .step(
        &ctx,
        Stage::Version,
        self.store.apply_versions(VersionContext {
          run_time:        ctx.run_time,
          source_filename: ctx.filename.clone(),
        }),
      )
      .await?;
    let deleted = self
      .step(
        &ctx,
        Stage::Delete,
        self.store.flag_deletions(DeletionContext { snapshot_date, run_time: ctx.run_time }),
      )
      .await?;
    let changed_records = self
      .step(&ctx, Stage::Refresh, self.store.refresh_changed_view())
      .await?;

    self
      .store
      .record_outcome(self.run_record(&ctx, RunStatus::Success, None))
      .await
      .map_err(|e| store_error(Stage::Track, e))?;

    let summary = RunSummary {
      run_id,
      snapshot_date,
      filename: ctx.filename,
      reference_codes,
      staged,
      novel,
      changed,
      versions,
      deleted,
      changed_records,
    };
    tracing::info!(
      staged,
      novel,
      changed,
      inserted = versions.inserted,
      superseded = versions.superseded,
      deleted,
      changed_records,
      "run complete"
    );
    Ok(RunReport::Completed(summary))
  }

  // ── Fetch ─────────────────────────────────────────────────────────────────

  async fn fetch_all(
    &self,
    date: NaiveDate,
  ) -> Result<(FetchedFile, Option<FetchedFile>), TransportError> {
    let snapshot = self.fetcher.fetch(&self.config.snapshot, date);
    let reference = async {
      match &self.config.reference {
        Some(spec) => self.fetcher.fetch(spec, date).await.map(Some),
        None => Ok(None),
      }
    };
    tokio::try_join!(snapshot, reference).inspect_err(|e| tracing::error!(error = %e, "fetch failed"))
  }

  /// Merge the reference table. Failures are logged and do not fail the run.
  async fn load_reference(&self, file: &FetchedFile) -> Option<usize> {
    let bytes = match tokio::fs::read(&file.path).await {
      Ok(bytes) => bytes,
      Err(e) => {
        tracing::warn!(filename = %file.filename, error = %e, "could not read reference file");
        return None;
      }
    };
    let codes = match strata_csv::read_reference_codes(bytes.as_slice()) {
      Ok(codes) => codes,
      Err(e) => {
        tracing::warn!(filename = %file.filename, error = %e, "could not parse reference file");
        return None;
      }
    };

    let started = Instant::now();
    match self.store.upsert_reference_codes(codes).await {
      Ok(n) => {
        tracing::info!(
          stage = %Stage::Reference,
          rows = n,
          elapsed_ms = started.elapsed().as_millis() as u64,
          "stage complete"
        );
        Some(n)
      }
      Err(e) => {
        tracing::warn!(error = %e, "could not merge reference codes");
        None
      }
    }
  }

  // ── Stages ────────────────────────────────────────────────────────────────

  async fn stage(&self, ctx: &RunContext, snapshot: &FetchedFile) -> Result<u64> {
    let file = tokio::fs::File::open(&snapshot.path)
      .await
      .map_err(|source| TransportError::Io { path: snapshot.path.clone(), source })?
      .into_std()
      .await;

    let started = Instant::now();
    match self.store.stage_snapshot(strata_csv::snapshot_rows(file)).await {
      Ok(rows) => {
        tracing::info!(
          stage = %Stage::Stage,
          rows,
          elapsed_ms = started.elapsed().as_millis() as u64,
          "stage complete"
        );
        Ok(rows)
      }
      Err(StageError::Ingest(e)) => Err(self.reject(ctx, e).await),
      Err(StageError::Store(e)) => Err(self.fail(ctx, Stage::Stage, e).await),
    }
  }

  /// Await one stage, logging its result and timing, and record a failure.
  async fn step<T>(
    &self,
    ctx: &RunContext,
    stage: Stage,
    work: impl Future<Output = Result<T, S::Error>>,
  ) -> Result<T>
  where
    T: StageRows,
  {
    let started = Instant::now();
    match work.await {
      Ok(out) => {
        tracing::info!(
          %stage,
          rows = out.rows(),
          elapsed_ms = started.elapsed().as_millis() as u64,
          "stage complete"
        );
        Ok(out)
      }
      Err(e) => Err(self.fail(ctx, stage, e).await),
    }
  }

  // ── Failure recording ─────────────────────────────────────────────────────

  fn run_record(&self, ctx: &RunContext, status: RunStatus, failed_stage: Option<Stage>) -> RunRecord {
    RunRecord {
      run_id: ctx.run_id,
      filename: ctx.filename.clone(),
      processed_at: self.clock.now(),
      status,
      failed_stage,
      snapshot_date: ctx.snapshot_date,
    }
  }

  async fn record_failure(&self, record: RunRecord) {
    if let Err(e) = self.store.record_outcome(record).await {
      tracing::error!(error = %e, "could not record failed run");
    }
  }

  async fn reject(&self, ctx: &RunContext, e: IngestError) -> Error {
    tracing::error!(error = %e, "snapshot rejected");
    self
      .record_failure(self.run_record(ctx, RunStatus::from(&e), None))
      .await;
    Error::Ingest(e)
  }

  async fn fail(&self, ctx: &RunContext, stage: Stage, e: S::Error) -> Error {
    tracing::error!(%stage, error = %e, "stage failed");
    self
      .record_failure(self.run_record(ctx, RunStatus::DatabaseError, Some(stage)))
      .await;
    store_error(stage, e)
  }
}

fn store_error<E: std::error::Error + Send + Sync + 'static>(stage: Stage, e: E) -> Error {
  Error::Store { stage, source: Box::new(e) }
}
