//! The `SnapshotStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `strata-store-sqlite`).
//! The pipeline and the read API depend on this abstraction, not on any
//! concrete backend.

use std::future::Future;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

use crate::{
  IngestError,
  change::ChangePolicy,
  history::{
    DeletionContext, DuplicateRank, HistoryVersion, ReclassifiedVersion, VersionContext,
    VersionReport,
  },
  record::CrimeRecord,
  reference::ReferenceCode,
  run::RunRecord,
};

/// Snapshot rows in input order, as produced by a decoder.
pub type RowStream = Box<dyn Iterator<Item = Result<CrimeRecord, IngestError>> + Send>;

/// Failure while staging a snapshot: either the input or the backend.
#[derive(Debug, Error)]
pub enum StageError<E: std::error::Error + 'static> {
  #[error(transparent)]
  Ingest(#[from] IngestError),

  #[error("store error: {0}")]
  Store(#[source] E),
}

// ─── Paging ──────────────────────────────────────────────────────────────────

/// A validated limit/offset window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
  pub limit:  u32,
  pub offset: u64,
}

impl PageRequest {
  pub const DEFAULT_LIMIT: u32 = 100;
  pub const MAX_LIMIT: u32 = 1000;

  /// Clamp `limit` into `1..=MAX_LIMIT`, defaulting when absent.
  pub fn new(limit: Option<u32>, offset: Option<u64>) -> Self {
    Self {
      limit:  limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT),
      offset: offset.unwrap_or(0),
    }
  }
}

impl Default for PageRequest {
  fn default() -> Self { Self::new(None, None) }
}

/// One window of a larger result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
  pub items:  Vec<T>,
  /// Size of the full result set.
  pub total:  u64,
  pub limit:  u32,
  pub offset: u64,
}

// ─── Sorting ─────────────────────────────────────────────────────────────────

/// Columns the changed-records listing may be ordered by.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SortKey {
  #[default]
  Id,
  RowId,
  StartDate,
  EndDate,
  CaseNumber,
  OrigDate,
  UpdatedOn,
  PrimaryType,
  Iucr,
  DeletedOn,
}

impl SortKey {
  /// The column identifier; identical to the key's name.
  pub fn column(self) -> &'static str { self.into() }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SortDirection {
  #[default]
  Asc,
  Desc,
}

impl SortDirection {
  pub fn keyword(self) -> &'static str {
    match self {
      Self::Asc => "ASC",
      Self::Desc => "DESC",
    }
  }
}

/// Parameters for [`SnapshotStore::list_changed`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeQuery {
  pub page:      PageRequest,
  pub order_by:  SortKey,
  pub direction: SortDirection,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a snapshot history backend.
///
/// Each reconciliation stage reads the committed output of the previous one
/// from relations persisted in the store, and applies its own writes in a
/// single transaction: a failing stage leaves earlier stages committed and
/// its own writes absent.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait SnapshotStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Reference data ────────────────────────────────────────────────────

  /// Merge `codes` into the reference table by code; later rows win.
  /// Returns the number of rows written.
  fn upsert_reference_codes(
    &self,
    codes: Vec<ReferenceCode>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Run tracker ───────────────────────────────────────────────────────

  /// `true` iff no run record exists for `snapshot_date`.
  fn should_process(
    &self,
    snapshot_date: NaiveDate,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Append a run record. Records are never overwritten.
  fn record_outcome(
    &self,
    record: RunRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// All run records, oldest first.
  fn list_runs(&self) -> impl Future<Output = Result<Vec<RunRecord>, Self::Error>> + Send + '_;

  /// Earliest and latest snapshot dates with a successful run.
  fn snapshot_range(
    &self,
  ) -> impl Future<Output = Result<Option<(NaiveDate, NaiveDate)>, Self::Error>> + Send + '_;

  // ── Reconciliation stages ─────────────────────────────────────────────

  /// Replace the staging relation with `rows`, numbering them from 1 in
  /// input order. A bad row aborts the whole load and nothing is committed.
  fn stage_snapshot(
    &self,
    rows: RowStream,
  ) -> impl Future<Output = Result<u64, StageError<Self::Error>>> + Send + '_;

  /// Rank staged rows per natural id by `line_num` descending.
  fn rank_duplicates(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Collect canonical ids without an active history version.
  fn detect_novel(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Collect ids whose active version differs from the canonical staged row
  /// on at least one tracked field.
  fn detect_changes(
    &self,
    policy: ChangePolicy,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Open versions for novel ids; close and replace versions of changed
  /// ids. One transaction.
  fn apply_versions(
    &self,
    ctx: VersionContext,
  ) -> impl Future<Output = Result<VersionReport, Self::Error>> + Send + '_;

  /// Flag history of ids absent from the staged snapshot as deleted.
  /// Returns the number of versions flagged; already-deleted versions are
  /// left alone.
  fn flag_deletions(
    &self,
    ctx: DeletionContext,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Rebuild the changed-records relation. Returns its row count.
  fn refresh_changed_view(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Intermediate relations ────────────────────────────────────────────

  fn duplicate_ranks(
    &self,
  ) -> impl Future<Output = Result<Vec<DuplicateRank>, Self::Error>> + Send + '_;

  fn novel_ids(&self) -> impl Future<Output = Result<Vec<i64>, Self::Error>> + Send + '_;

  fn changed_ids(&self) -> impl Future<Output = Result<Vec<i64>, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Every version of `natural_id`, ordered by `start_date`.
  fn history(
    &self,
    natural_id: i64,
  ) -> impl Future<Output = Result<Vec<HistoryVersion>, Self::Error>> + Send + '_;

  /// A window over the changed-records relation.
  fn list_changed(
    &self,
    query: ChangeQuery,
  ) -> impl Future<Output = Result<Page<HistoryVersion>, Self::Error>> + Send + '_;

  /// A window over versions flagged deleted, ordered by id.
  fn list_deleted(
    &self,
    page: PageRequest,
  ) -> impl Future<Output = Result<Page<HistoryVersion>, Self::Error>> + Send + '_;

  /// A window over changed-record versions of ids whose classification index
  /// code differs between versions.
  fn list_reclassified(
    &self,
    page: PageRequest,
  ) -> impl Future<Output = Result<Page<ReclassifiedVersion>, Self::Error>> + Send + '_;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn page_request_clamps_limit() {
    assert_eq!(PageRequest::new(Some(5000), None).limit, PageRequest::MAX_LIMIT);
    assert_eq!(PageRequest::new(Some(0), Some(20)), PageRequest { limit: 1, offset: 20 });
    assert_eq!(PageRequest::default().limit, PageRequest::DEFAULT_LIMIT);
  }

  #[test]
  fn sort_keys_are_whitelisted() {
    assert_eq!("updated_on".parse::<SortKey>().unwrap().column(), "updated_on");
    assert!("id; DROP TABLE history".parse::<SortKey>().is_err());
    assert!("latitude".parse::<SortKey>().is_err());
    assert_eq!("desc".parse::<SortDirection>().unwrap().keyword(), "DESC");
    assert!("sideways".parse::<SortDirection>().is_err());
  }
}
