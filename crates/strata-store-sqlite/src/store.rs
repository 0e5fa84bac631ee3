//! [`SqliteStore`], the SQLite implementation of [`SnapshotStore`].

use std::{
  future::Future,
  path::Path,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use chrono::NaiveDate;
use rusqlite::InterruptHandle;
use strata_core::{
  change::ChangePolicy,
  history::{
    DeletionContext, DuplicateRank, HistoryVersion, ReclassifiedVersion, VersionContext,
    VersionReport,
  },
  reference::ReferenceCode,
  run::{RunRecord, Stage},
  store::{ChangeQuery, Page, PageRequest, RowStream, SnapshotStore, StageError},
};

use crate::{
  Error, Result,
  encode::{
    RawHistoryVersion, RawReclassified, RawRunRecord, decode_date, encode_date, encode_dt,
    encode_uuid,
  },
  schema::{history_columns, schema},
  stages,
};

/// How long a statement waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const RECLASSIFIED_CTE: &str = "
WITH classified AS (
  SELECT c.id, c.row_id, c.iucr,
         c.primary_type || ' - ' || c.description AS description,
         c.fbi_code, r.index_code, c.updated_on
  FROM changed_records AS c
  JOIN reference_codes AS r
    ON r.code = (
      SELECT code FROM reference_codes
      WHERE code = c.iucr OR substr('0000' || code, -4) = c.iucr
      ORDER BY code = c.iucr DESC, code
      LIMIT 1
    )
),
flipped AS (
  SELECT id FROM classified GROUP BY id HAVING COUNT(DISTINCT index_code) > 1
)";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A strata history store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
  interrupt:       Arc<InterruptHandle>,
  cancel:          Arc<AtomicBool>,
  stage_timeout:   Option<Duration>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  /// Bound every reconciliation stage by `limit`. A stage still running at
  /// the deadline is interrupted and its transaction rolled back.
  pub fn with_stage_timeout(mut self, limit: Duration) -> Self {
    self.stage_timeout = Some(limit);
    self
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    let ddl = schema();
    let interrupt = conn
      .call(move |conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(&ddl)?;
        Ok(conn.get_interrupt_handle())
      })
      .await?;

    Ok(Self {
      conn,
      interrupt: Arc::new(interrupt),
      cancel: Arc::new(AtomicBool::new(false)),
      stage_timeout: None,
    })
  }

  /// Run `stage` under the configured timeout.
  ///
  /// On expiry the running statement is interrupted and the stage is awaited
  /// to completion, so its transaction has either committed or rolled back
  /// by the time this returns. Only an interrupted stage reports
  /// [`Error::TimedOut`]; any other failure passes through unchanged.
  pub(crate) async fn bounded<T>(
    &self,
    stage: Stage,
    work: impl Future<Output = Result<T>>,
  ) -> Result<T> {
    let Some(limit) = self.stage_timeout else {
      return work.await;
    };
    self.cancel.store(false, Ordering::Relaxed);

    tokio::pin!(work);
    match tokio::time::timeout(limit, &mut work).await {
      Ok(result) => result,
      Err(_) => {
        tracing::warn!(%stage, ?limit, "stage timed out, interrupting");
        self.cancel.store(true, Ordering::Relaxed);
        self.interrupt.interrupt();
        match work.await {
          // Finished before the interrupt landed; the commit stands.
          Ok(value) => Ok(value),
          Err(e) if e.is_interrupt() => Err(Error::TimedOut { stage, limit }),
          Err(e) => Err(e),
        }
      }
    }
  }

  async fn page_of_versions(
    &self,
    count_sql: String,
    select_sql: String,
    page: PageRequest,
  ) -> Result<Page<HistoryVersion>> {
    let (total, raws) = self
      .conn
      .call(move |conn| {
        let total: i64 = conn.query_row(&count_sql, [], |r| r.get(0))?;
        let mut stmt = conn.prepare(&select_sql)?;
        let rows = stmt
          .query_map(rusqlite::params![page.limit, page.offset as i64], RawHistoryVersion::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((total, rows))
      })
      .await?;

    Ok(Page {
      items:  raws
        .into_iter()
        .map(RawHistoryVersion::into_version)
        .collect::<Result<_>>()?,
      total:  total as u64,
      limit:  page.limit,
      offset: page.offset,
    })
  }
}

// ─── SnapshotStore impl ──────────────────────────────────────────────────────

impl SnapshotStore for SqliteStore {
  type Error = Error;

  // ── Reference data ────────────────────────────────────────────────────────

  async fn upsert_reference_codes(&self, codes: Vec<ReferenceCode>) -> Result<usize> {
    let written = self
      .bounded(Stage::Reference, async {
        Ok(
          self
            .conn
            .call(move |conn| Ok(stages::upsert_reference_codes(conn, &codes)?))
            .await?,
        )
      })
      .await?;
    tracing::debug!(written, "reference codes merged");
    Ok(written)
  }

  // ── Run tracker ───────────────────────────────────────────────────────────

  async fn should_process(&self, snapshot_date: NaiveDate) -> Result<bool> {
    let date_str = encode_date(snapshot_date);
    let seen: bool = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT EXISTS (SELECT 1 FROM run_records WHERE snapshot_date = ?1)",
          rusqlite::params![date_str],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(!seen)
  }

  async fn record_outcome(&self, record: RunRecord) -> Result<()> {
    let run_id_str   = encode_uuid(record.run_id);
    let at_str       = encode_dt(record.processed_at);
    let status_str   = record.status.as_str();
    let stage_str    = record.failed_stage.map(|s| s.to_string());
    let date_str     = encode_date(record.snapshot_date);
    let filename     = record.filename;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO run_records
             (run_id, filename, processed_at, status, failed_stage, snapshot_date)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![run_id_str, filename, at_str, status_str, stage_str, date_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn list_runs(&self) -> Result<Vec<RunRecord>> {
    let raws: Vec<RawRunRecord> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT run_id, filename, processed_at, status, failed_stage, snapshot_date
           FROM run_records
           ORDER BY processed_at, rowid",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawRunRecord {
              run_id:        row.get(0)?,
              filename:      row.get(1)?,
              processed_at:  row.get(2)?,
              status:        row.get(3)?,
              failed_stage:  row.get(4)?,
              snapshot_date: row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRunRecord::into_record).collect()
  }

  async fn snapshot_range(&self) -> Result<Option<(NaiveDate, NaiveDate)>> {
    let (first, last): (Option<String>, Option<String>) = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT MIN(snapshot_date), MAX(snapshot_date)
           FROM run_records
           WHERE status = 'success'",
          [],
          |r| Ok((r.get(0)?, r.get(1)?)),
        )?)
      })
      .await?;

    match (first, last) {
      (Some(first), Some(last)) => Ok(Some((decode_date(&first)?, decode_date(&last)?))),
      _ => Ok(None),
    }
  }

  // ── Reconciliation stages ─────────────────────────────────────────────────

  async fn stage_snapshot(&self, rows: RowStream) -> Result<u64, StageError<Error>> {
    let cancel = Arc::clone(&self.cancel);
    let staged = self
      .bounded(Stage::Stage, async {
        Ok(
          self
            .conn
            .call(move |conn| Ok(stages::stage_rows(conn, rows, &cancel)?))
            .await?,
        )
      })
      .await
      .map_err(StageError::Store)?;

    let staged = staged?;
    tracing::debug!(staged, "snapshot staged");
    Ok(staged)
  }

  async fn rank_duplicates(&self) -> Result<u64> {
    self
      .bounded(Stage::Deduplicate, async {
        Ok(self.conn.call(|conn| Ok(stages::rank_duplicates(conn)?)).await?)
      })
      .await
  }

  async fn detect_novel(&self) -> Result<u64> {
    self
      .bounded(Stage::Novelty, async {
        Ok(self.conn.call(|conn| Ok(stages::detect_novel(conn)?)).await?)
      })
      .await
  }

  async fn detect_changes(&self, policy: ChangePolicy) -> Result<u64> {
    self
      .bounded(Stage::Change, async {
        Ok(
          self
            .conn
            .call(move |conn| Ok(stages::detect_changes(conn, &policy)?))
            .await?,
        )
      })
      .await
  }

  async fn apply_versions(&self, ctx: VersionContext) -> Result<VersionReport> {
    let run_time = encode_dt(ctx.run_time);
    let filename = ctx.source_filename;
    self
      .bounded(Stage::Version, async {
        Ok(
          self
            .conn
            .call(move |conn| Ok(stages::apply_versions(conn, &run_time, &filename)?))
            .await?,
        )
      })
      .await
  }

  async fn flag_deletions(&self, ctx: DeletionContext) -> Result<u64> {
    let date_str = encode_date(ctx.snapshot_date);
    let run_time = encode_dt(ctx.run_time);
    self
      .bounded(Stage::Delete, async {
        Ok(
          self
            .conn
            .call(move |conn| Ok(stages::flag_deletions(conn, &date_str, &run_time)?))
            .await?,
        )
      })
      .await
  }

  async fn refresh_changed_view(&self) -> Result<u64> {
    self
      .bounded(Stage::Refresh, async {
        Ok(self.conn.call(|conn| Ok(stages::refresh_changed_view(conn)?)).await?)
      })
      .await
  }

  // ── Intermediate relations ────────────────────────────────────────────────

  async fn duplicate_ranks(&self) -> Result<Vec<DuplicateRank>> {
    Ok(
      self
        .conn
        .call(|conn| {
          let mut stmt = conn.prepare(
            "SELECT id, line_num, dup_ver FROM duplicate_ranks ORDER BY id, dup_ver",
          )?;
          let rows = stmt
            .query_map([], |row| {
              Ok(DuplicateRank {
                natural_id: row.get(0)?,
                line_num:   row.get(1)?,
                dup_ver:    row.get(2)?,
              })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(rows)
        })
        .await?,
    )
  }

  async fn novel_ids(&self) -> Result<Vec<i64>> {
    Ok(
      self
        .conn
        .call(|conn| {
          let mut stmt = conn.prepare("SELECT id FROM novel_ids ORDER BY id")?;
          let ids = stmt
            .query_map([], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(ids)
        })
        .await?,
    )
  }

  async fn changed_ids(&self) -> Result<Vec<i64>> {
    Ok(
      self
        .conn
        .call(|conn| {
          let mut stmt = conn.prepare("SELECT id FROM changed_ids ORDER BY id")?;
          let ids = stmt
            .query_map([], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(ids)
        })
        .await?,
    )
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn history(&self, natural_id: i64) -> Result<Vec<HistoryVersion>> {
    let sql = format!(
      "SELECT {} FROM history WHERE id = ?1 ORDER BY start_date, row_id",
      history_columns(None)
    );
    let raws: Vec<RawHistoryVersion> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![natural_id], RawHistoryVersion::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawHistoryVersion::into_version).collect()
  }

  async fn list_changed(&self, query: ChangeQuery) -> Result<Page<HistoryVersion>> {
    // Both identifiers come from closed enums.
    let select = format!(
      "SELECT {} FROM changed_records
       ORDER BY {} {}, row_id ASC
       LIMIT ?1 OFFSET ?2",
      history_columns(None),
      query.order_by.column(),
      query.direction.keyword(),
    );
    self
      .page_of_versions("SELECT COUNT(*) FROM changed_records".to_owned(), select, query.page)
      .await
  }

  async fn list_deleted(&self, page: PageRequest) -> Result<Page<HistoryVersion>> {
    let select = format!(
      "SELECT {} FROM history
       WHERE deleted_flag = 1
       ORDER BY id, start_date
       LIMIT ?1 OFFSET ?2",
      history_columns(None)
    );
    self
      .page_of_versions(
        "SELECT COUNT(*) FROM history WHERE deleted_flag = 1".to_owned(),
        select,
        page,
      )
      .await
  }

  async fn list_reclassified(&self, page: PageRequest) -> Result<Page<ReclassifiedVersion>> {
    let (total, raws): (i64, Vec<RawReclassified>) = self
      .conn
      .call(move |conn| {
        let total: i64 = conn.query_row(
          &format!("{RECLASSIFIED_CTE} SELECT COUNT(*) FROM classified JOIN flipped USING (id)"),
          [],
          |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(&format!(
          "{RECLASSIFIED_CTE}
           SELECT id, row_id, iucr, description, fbi_code, index_code, updated_on
           FROM classified JOIN flipped USING (id)
           ORDER BY id, updated_on, row_id
           LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![page.limit, page.offset as i64], |row| {
            Ok(RawReclassified {
              id:          row.get(0)?,
              row_id:      row.get(1)?,
              iucr:        row.get(2)?,
              description: row.get(3)?,
              fbi_code:    row.get(4)?,
              index_code:  row.get(5)?,
              updated_on:  row.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((total, rows))
      })
      .await?;

    Ok(Page {
      items:  raws
        .into_iter()
        .map(RawReclassified::into_version)
        .collect::<Result<_>>()?,
      total:  total as u64,
      limit:  page.limit,
      offset: page.offset,
    })
  }
}
