//! End-to-end pipeline tests against an in-memory store and a temporary
//! snapshot directory.

use std::{path::Path, sync::Arc, time::Duration};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use strata_core::{
  IngestError,
  change::ChangePolicy,
  history::{
    DeletionContext, DuplicateRank, HistoryVersion, ReclassifiedVersion, VersionContext,
    VersionReport,
  },
  reference::ReferenceCode,
  run::{RunRecord, RunStatus, Stage},
  store::{ChangeQuery, Page, PageRequest, RowStream, SnapshotStore, StageError},
};
use strata_store_sqlite::{Error as StoreError, SqliteStore};

use crate::{
  Clock, DirectoryFetcher, Error, Pipeline, PipelineConfig, RunReport, RunSummary, SourceSpec,
  TransportError,
};

// ─── Fixtures ────────────────────────────────────────────────────────────────

const HEADER: &str = "ID,Case Number,Date,Block,IUCR,Primary Type,Description,Location Description,Arrest,Domestic,Beat,District,Ward,Community Area,FBI Code,X Coordinate,Y Coordinate,Year,Updated On,Latitude,Longitude,Location\n";

fn row(id: i64, case: &str, arrest: bool) -> String {
  format!(
    "{id},{case},01/01/2024 11:30:00 PM,012XX S STATE ST,0820,THEFT,$500 AND UNDER,STREET,{arrest},false,0123,001,4,32,06,1176352,1894620,2024,01/02/2024 03:50:01 PM,41.866,-87.627,\"(41.866, -87.627)\"\n"
  )
}

fn write_snapshot(dir: &Path, day: u32, rows: &[String]) {
  let body = format!("{HEADER}{}", rows.concat());
  std::fs::write(dir.join(format!("crime-2024-01-{day:02}.csv")), body).unwrap();
}

fn jan(day: u32) -> NaiveDate { NaiveDate::from_ymd_opt(2024, 1, day).unwrap() }

struct FixedClock {
  day: u32,
}

impl Clock for FixedClock {
  fn now(&self) -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 1, self.day, 6, 0, 0).unwrap() }

  fn today(&self) -> NaiveDate { jan(self.day) }
}

fn config(with_reference: bool) -> PipelineConfig {
  PipelineConfig {
    snapshot:  SourceSpec { name: "crime".into(), dataset_id: "ijzp-q8t2".into() },
    reference: with_reference
      .then(|| SourceSpec { name: "iucr".into(), dataset_id: "c7ck-438e".into() }),
    policy:    ChangePolicy::default(),
  }
}

fn pipeline<S: SnapshotStore>(
  store: &Arc<S>,
  dir: &Path,
  day: u32,
) -> Pipeline<S, DirectoryFetcher, FixedClock> {
  Pipeline::new(Arc::clone(store), DirectoryFetcher::new(dir), FixedClock { day }, config(false))
}

async fn store() -> Arc<SqliteStore> {
  Arc::new(SqliteStore::open_in_memory().await.expect("in-memory store"))
}

fn completed(report: RunReport) -> RunSummary {
  match report {
    RunReport::Completed(summary) => summary,
    other => panic!("expected a completed run, got {other:?}"),
  }
}

// ─── Successful runs ─────────────────────────────────────────────────────────

#[tokio::test]
async fn first_run_versions_every_row() {
  let dir = tempfile::tempdir().unwrap();
  let s = store().await;
  write_snapshot(dir.path(), 2, &[row(1, "HY1", false), row(2, "HY2", false)]);

  let summary = completed(pipeline(&s, dir.path(), 2).run(Some(jan(2)), false).await.unwrap());
  assert_eq!(summary.filename, "crime-2024-01-02.csv");
  assert_eq!(summary.staged, 2);
  assert_eq!(summary.novel, 2);
  assert_eq!(summary.changed, 0);
  assert_eq!(summary.versions, VersionReport { inserted: 2, superseded: 0 });
  assert_eq!(summary.deleted, 0);
  assert_eq!(summary.changed_records, 0);

  let runs = s.list_runs().await.unwrap();
  assert_eq!(runs.len(), 1);
  assert_eq!(runs[0].run_id, summary.run_id);
  assert_eq!(runs[0].status, RunStatus::Success);
  assert_eq!(runs[0].snapshot_date, jan(2));
  assert_eq!(runs[0].filename, "crime-2024-01-02.csv");
}

#[tokio::test]
async fn default_date_comes_from_the_clock() {
  let dir = tempfile::tempdir().unwrap();
  let s = store().await;
  write_snapshot(dir.path(), 7, &[row(1, "HY1", false)]);

  let summary = completed(pipeline(&s, dir.path(), 7).run(None, false).await.unwrap());
  assert_eq!(summary.snapshot_date, jan(7));
}

#[tokio::test]
async fn processed_date_is_skipped_unless_forced() {
  let dir = tempfile::tempdir().unwrap();
  let s = store().await;
  write_snapshot(dir.path(), 2, &[row(1, "HY1", false)]);
  pipeline(&s, dir.path(), 2).run(Some(jan(2)), false).await.unwrap();

  let again = pipeline(&s, dir.path(), 3).run(Some(jan(2)), false).await.unwrap();
  assert_eq!(again, RunReport::Skipped { snapshot_date: jan(2) });
  assert_eq!(s.list_runs().await.unwrap().len(), 1);

  let forced = completed(pipeline(&s, dir.path(), 3).run(Some(jan(2)), true).await.unwrap());
  assert_eq!(forced.novel, 0);
  assert_eq!(forced.changed, 0);
  assert_eq!(s.history(1).await.unwrap().len(), 1);
  assert_eq!(s.list_runs().await.unwrap().len(), 2);
}

#[tokio::test]
async fn changes_and_deletions_across_snapshots() {
  let dir = tempfile::tempdir().unwrap();
  let s = store().await;
  write_snapshot(dir.path(), 2, &[row(1, "HY1", false), row(2, "HY2", false)]);
  write_snapshot(dir.path(), 3, &[row(1, "HY1", true)]);

  pipeline(&s, dir.path(), 2).run(Some(jan(2)), false).await.unwrap();
  let summary = completed(pipeline(&s, dir.path(), 3).run(Some(jan(3)), false).await.unwrap());
  assert_eq!(summary.changed, 1);
  assert_eq!(summary.versions, VersionReport { inserted: 0, superseded: 1 });
  assert_eq!(summary.deleted, 1);
  assert_eq!(summary.changed_records, 2);

  let one = s.history(1).await.unwrap();
  assert_eq!(one.len(), 2);
  assert_eq!(one[1].record.arrest, Some(true));
  assert_eq!(one[1].source_filename.as_deref(), Some("crime-2024-01-03.csv"));

  let two = s.history(2).await.unwrap();
  assert!(two[0].deleted_flag);
  assert_eq!(two[0].deleted_on, Some(jan(3)));
}

#[tokio::test]
async fn duplicate_rows_keep_the_last_occurrence() {
  let dir = tempfile::tempdir().unwrap();
  let s = store().await;
  write_snapshot(dir.path(), 2, &[row(5, "EARLY", false), row(6, "HY6", false), row(5, "LATE", false)]);

  let summary = completed(pipeline(&s, dir.path(), 2).run(Some(jan(2)), false).await.unwrap());
  assert_eq!(summary.staged, 3);
  assert_eq!(summary.novel, 2);

  let five = s.history(5).await.unwrap();
  assert_eq!(five.len(), 1);
  assert_eq!(five[0].record.case_number.as_deref(), Some("LATE"));
}

// ─── Reference data ──────────────────────────────────────────────────────────

#[tokio::test]
async fn reference_codes_are_merged_before_staging() {
  let dir = tempfile::tempdir().unwrap();
  let s = store().await;
  write_snapshot(dir.path(), 2, &[row(1, "HY1", false)]);
  std::fs::write(
    dir.path().join("iucr-2024-01-02.csv"),
    "IUCR,PRIMARY DESCRIPTION,SECONDARY DESCRIPTION,INDEX CODE,ACTIVE\n\
     0820,THEFT,$500 AND UNDER,I,true\n\
     1320,CRIMINAL DAMAGE,TO VEHICLE,N,true\n",
  )
  .unwrap();

  let p = Pipeline::new(Arc::clone(&s), DirectoryFetcher::new(dir.path()), FixedClock { day: 2 }, config(true));
  let summary = completed(p.run(Some(jan(2)), false).await.unwrap());
  assert_eq!(summary.reference_codes, Some(2));
}

#[tokio::test]
async fn bad_reference_file_does_not_fail_the_run() {
  let dir = tempfile::tempdir().unwrap();
  let s = store().await;
  write_snapshot(dir.path(), 2, &[row(1, "HY1", false)]);
  std::fs::write(
    dir.path().join("iucr-2024-01-02.csv"),
    "IUCR,PRIMARY DESCRIPTION,SECONDARY DESCRIPTION,INDEX CODE,ACTIVE\n0820,THEFT,X,I,perhaps\n",
  )
  .unwrap();

  let p = Pipeline::new(Arc::clone(&s), DirectoryFetcher::new(dir.path()), FixedClock { day: 2 }, config(true));
  let summary = completed(p.run(Some(jan(2)), false).await.unwrap());
  assert_eq!(summary.reference_codes, None);
  assert_eq!(summary.novel, 1);
}

// ─── Failures ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_snapshot_writes_no_run_record() {
  let dir = tempfile::tempdir().unwrap();
  let s = store().await;

  let err = pipeline(&s, dir.path(), 2).run(Some(jan(2)), false).await.unwrap_err();
  assert!(matches!(err, Error::Transport(TransportError::Missing(_))));
  assert!(s.list_runs().await.unwrap().is_empty());
  assert!(s.should_process(jan(2)).await.unwrap());
}

#[tokio::test]
async fn malformed_snapshot_is_recorded_and_history_untouched() {
  let dir = tempfile::tempdir().unwrap();
  let s = store().await;
  write_snapshot(dir.path(), 2, &[row(1, "HY1", false)]);
  write_snapshot(dir.path(), 3, &[row(1, "HY1", true), "2,HY2\n".to_owned()]);

  pipeline(&s, dir.path(), 2).run(Some(jan(2)), false).await.unwrap();
  let err = pipeline(&s, dir.path(), 3).run(Some(jan(3)), false).await.unwrap_err();
  assert!(matches!(err, Error::Ingest(IngestError::Malformed { line: 3, .. })));

  let runs = s.list_runs().await.unwrap();
  assert_eq!(runs[1].status, RunStatus::DataFormatError);
  assert_eq!(runs[1].failed_stage, None);
  assert_eq!(runs[1].filename, "crime-2024-01-03.csv");

  let history = s.history(1).await.unwrap();
  assert_eq!(history.len(), 1);
  assert!(history[0].current_flag);
  assert_eq!(history[0].record.arrest, Some(false));
}

#[tokio::test]
async fn undecodable_snapshot_is_an_encoding_failure() {
  let dir = tempfile::tempdir().unwrap();
  let s = store().await;
  let mut body = format!("{HEADER}{}", row(1, "HY1", false)).into_bytes();
  let second = row(2, "X", false);
  body.extend_from_slice(b"2,\xff\xfe,");
  body.extend_from_slice(second.strip_prefix("2,X,").unwrap().as_bytes());
  std::fs::write(dir.path().join("crime-2024-01-02.csv"), body).unwrap();

  let err = pipeline(&s, dir.path(), 2).run(Some(jan(2)), false).await.unwrap_err();
  assert!(matches!(err, Error::Ingest(IngestError::Encoding { .. })));
  assert_eq!(s.list_runs().await.unwrap()[0].status, RunStatus::EncodingError);
  assert!(s.history(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn store_failure_records_the_failed_stage() {
  let dir = tempfile::tempdir().unwrap();
  let s = Arc::new(FlakyStore {
    inner:   SqliteStore::open_in_memory().await.unwrap(),
    fail_at: Stage::Change,
  });
  write_snapshot(dir.path(), 2, &[row(1, "HY1", false)]);

  let err = pipeline(&s, dir.path(), 2).run(Some(jan(2)), false).await.unwrap_err();
  assert!(matches!(err, Error::Store { stage: Stage::Change, .. }));

  let runs = s.list_runs().await.unwrap();
  assert_eq!(runs.len(), 1);
  assert_eq!(runs[0].status, RunStatus::DatabaseError);
  assert_eq!(runs[0].failed_stage, Some(Stage::Change));

  // Earlier stages stay committed; later ones never ran.
  assert_eq!(s.novel_ids().await.unwrap(), vec![1]);
  assert!(s.history(1).await.unwrap().is_empty());
}

// ─── Fault injection ─────────────────────────────────────────────────────────

/// Delegates to a real store but fails the stage named by `fail_at`.
struct FlakyStore {
  inner:   SqliteStore,
  fail_at: Stage,
}

impl FlakyStore {
  fn check(&self, stage: Stage) -> Result<(), StoreError> {
    if self.fail_at == stage {
      return Err(StoreError::TimedOut { stage, limit: Duration::ZERO });
    }
    Ok(())
  }
}

impl SnapshotStore for FlakyStore {
  type Error = StoreError;

  async fn upsert_reference_codes(&self, codes: Vec<ReferenceCode>) -> Result<usize, StoreError> {
    self.check(Stage::Reference)?;
    self.inner.upsert_reference_codes(codes).await
  }

  async fn should_process(&self, snapshot_date: NaiveDate) -> Result<bool, StoreError> {
    self.inner.should_process(snapshot_date).await
  }

  async fn record_outcome(&self, record: RunRecord) -> Result<(), StoreError> {
    self.inner.record_outcome(record).await
  }

  async fn list_runs(&self) -> Result<Vec<RunRecord>, StoreError> { self.inner.list_runs().await }

  async fn snapshot_range(&self) -> Result<Option<(NaiveDate, NaiveDate)>, StoreError> {
    self.inner.snapshot_range().await
  }

  async fn stage_snapshot(&self, rows: RowStream) -> Result<u64, StageError<StoreError>> {
    self.check(Stage::Stage).map_err(StageError::Store)?;
    self.inner.stage_snapshot(rows).await
  }

  async fn rank_duplicates(&self) -> Result<u64, StoreError> {
    self.check(Stage::Deduplicate)?;
    self.inner.rank_duplicates().await
  }

  async fn detect_novel(&self) -> Result<u64, StoreError> {
    self.check(Stage::Novelty)?;
    self.inner.detect_novel().await
  }

  async fn detect_changes(&self, policy: ChangePolicy) -> Result<u64, StoreError> {
    self.check(Stage::Change)?;
    self.inner.detect_changes(policy).await
  }

  async fn apply_versions(&self, ctx: VersionContext) -> Result<VersionReport, StoreError> {
    self.check(Stage::Version)?;
    self.inner.apply_versions(ctx).await
  }

  async fn flag_deletions(&self, ctx: DeletionContext) -> Result<u64, StoreError> {
    self.check(Stage::Delete)?;
    self.inner.flag_deletions(ctx).await
  }

  async fn refresh_changed_view(&self) -> Result<u64, StoreError> {
    self.check(Stage::Refresh)?;
    self.inner.refresh_changed_view().await
  }

  async fn duplicate_ranks(&self) -> Result<Vec<DuplicateRank>, StoreError> {
    self.inner.duplicate_ranks().await
  }

  async fn novel_ids(&self) -> Result<Vec<i64>, StoreError> { self.inner.novel_ids().await }

  async fn changed_ids(&self) -> Result<Vec<i64>, StoreError> { self.inner.changed_ids().await }

  async fn history(&self, natural_id: i64) -> Result<Vec<HistoryVersion>, StoreError> {
    self.inner.history(natural_id).await
  }

  async fn list_changed(&self, query: ChangeQuery) -> Result<Page<HistoryVersion>, StoreError> {
    self.inner.list_changed(query).await
  }

  async fn list_deleted(&self, page: PageRequest) -> Result<Page<HistoryVersion>, StoreError> {
    self.inner.list_deleted(page).await
  }

  async fn list_reclassified(
    &self,
    page: PageRequest,
  ) -> Result<Page<ReclassifiedVersion>, StoreError> {
    self.inner.list_reclassified(page).await
  }
}
