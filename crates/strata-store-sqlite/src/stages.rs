//! Set-based SQL for each reconciliation stage.
//!
//! Every function runs one write transaction on the connection thread and
//! either commits all of its writes or none. Staging reads from the snapshot
//! decoder; every other stage reads only committed relations.

use std::sync::atomic::{AtomicBool, Ordering};

use rusqlite::{
  Connection, Transaction, TransactionBehavior, ffi, params, params_from_iter, types::Value,
};
use strata_core::{
  IngestError,
  change::ChangePolicy,
  history::VersionReport,
  reference::ReferenceCode,
  schema::{RECORD_COLUMNS, column_list},
  store::RowStream,
};

use crate::{
  encode::record_values,
  schema::{
    CHANGED_IDS_TABLE, DUPLICATE_RANKS_TABLE, NOVEL_IDS_TABLE, STAGED_ROWS_INDEX, history_columns,
    recreate, staged_rows_table,
  },
};

fn write_tx(conn: &mut Connection) -> rusqlite::Result<Transaction<'_>> {
  conn.transaction_with_behavior(TransactionBehavior::Immediate)
}

/// The error SQLite raises for an interrupted statement.
fn interrupted() -> rusqlite::Error {
  rusqlite::Error::SqliteFailure(
    ffi::Error::new(ffi::SQLITE_INTERRUPT),
    Some("stage cancelled".to_owned()),
  )
}

fn count(n: usize) -> u64 { n as u64 }

// ─── Reference data ──────────────────────────────────────────────────────────

pub fn upsert_reference_codes(
  conn: &mut Connection,
  codes: &[ReferenceCode],
) -> rusqlite::Result<usize> {
  let tx = write_tx(conn)?;
  let mut written = 0;
  {
    let mut stmt = tx.prepare(
      "INSERT INTO reference_codes
         (code, primary_description, secondary_description, index_code, active)
       VALUES (?1, ?2, ?3, ?4, ?5)
       ON CONFLICT (code) DO UPDATE SET
         primary_description   = excluded.primary_description,
         secondary_description = excluded.secondary_description,
         index_code            = excluded.index_code,
         active                = excluded.active",
    )?;
    for c in codes {
      written += stmt.execute(params![
        c.code,
        c.primary_description,
        c.secondary_description,
        c.index_code,
        c.active,
      ])?;
    }
  }
  tx.commit()?;
  Ok(written)
}

// ─── Staging ─────────────────────────────────────────────────────────────────

/// Replace `staged_rows` with `rows`. An input error abandons the
/// transaction and is returned in the inner `Err`; the previous staging
/// contents survive.
pub fn stage_rows(
  conn: &mut Connection,
  rows: RowStream,
  cancel: &AtomicBool,
) -> rusqlite::Result<Result<u64, IngestError>> {
  let tx = write_tx(conn)?;
  tx.execute_batch(&recreate("staged_rows", &staged_rows_table()))?;

  let placeholders = (2..=RECORD_COLUMNS.len() + 1)
    .map(|i| format!("?{i}"))
    .collect::<Vec<_>>()
    .join(", ");
  let insert = format!(
    "INSERT INTO staged_rows (line_num, {}) VALUES (?1, {placeholders})",
    column_list(None)
  );

  let mut line_num: i64 = 0;
  {
    let mut stmt = tx.prepare(&insert)?;
    for row in rows {
      if cancel.load(Ordering::Relaxed) {
        return Err(interrupted());
      }
      let record = match row {
        Ok(record) => record,
        Err(e) => return Ok(Err(e)),
      };
      line_num += 1;
      let mut values = Vec::with_capacity(RECORD_COLUMNS.len() + 1);
      values.push(Value::Integer(line_num));
      values.extend(record_values(&record));
      stmt.execute(params_from_iter(values))?;
    }
  }

  tx.execute_batch(STAGED_ROWS_INDEX)?;
  tx.commit()?;
  Ok(Ok(line_num as u64))
}

// ─── Deduplication ───────────────────────────────────────────────────────────

/// Rank staged rows per id; the largest `line_num` gets `dup_ver = 1`.
pub fn rank_duplicates(conn: &mut Connection) -> rusqlite::Result<u64> {
  let tx = write_tx(conn)?;
  tx.execute_batch(&recreate("duplicate_ranks", DUPLICATE_RANKS_TABLE))?;
  let n = tx.execute(
    "INSERT INTO duplicate_ranks (id, line_num, dup_ver)
     SELECT id, line_num, RANK() OVER (PARTITION BY id ORDER BY line_num DESC)
     FROM staged_rows",
    [],
  )?;
  tx.commit()?;
  Ok(count(n))
}

// ─── Novelty ─────────────────────────────────────────────────────────────────

/// Canonical rows with no active history version. Deleted ids have no active
/// version, so a reappearing id is novel again.
pub fn detect_novel(conn: &mut Connection) -> rusqlite::Result<u64> {
  let tx = write_tx(conn)?;
  tx.execute_batch(&recreate("novel_ids", NOVEL_IDS_TABLE))?;
  let n = tx.execute(
    "INSERT INTO novel_ids (id, line_num, dup_ver)
     SELECT r.id, r.line_num, r.dup_ver
     FROM duplicate_ranks AS r
     LEFT JOIN history AS h
       ON h.id = r.id AND h.dup_ver = r.dup_ver AND h.current_flag = 1
     WHERE r.dup_ver = 1
       AND h.row_id IS NULL",
    [],
  )?;
  tx.commit()?;
  Ok(count(n))
}

// ─── Change detection ────────────────────────────────────────────────────────

/// `s.col IS NOT d.col` for each tracked field, OR-ed. `IS NOT` is SQLite's
/// null-safe inequality.
fn change_predicate(policy: &ChangePolicy) -> String {
  policy
    .tracked()
    .iter()
    .map(|f| format!("s.{0} IS NOT d.{0}", f.column()))
    .collect::<Vec<_>>()
    .join("\n        OR ")
}

/// Canonical rows whose active version differs on a tracked field.
pub fn detect_changes(conn: &mut Connection, policy: &ChangePolicy) -> rusqlite::Result<u64> {
  let sql = format!(
    "INSERT INTO changed_ids (id, line_num)
     SELECT r.id, r.line_num
     FROM duplicate_ranks AS r
     JOIN staged_rows AS s ON s.line_num = r.line_num
     JOIN history AS d ON d.id = r.id AND d.current_flag = 1
     WHERE r.dup_ver = 1
       AND ({})",
    change_predicate(policy)
  );

  let tx = write_tx(conn)?;
  tx.execute_batch(&recreate("changed_ids", CHANGED_IDS_TABLE))?;
  let n = tx.execute(&sql, [])?;
  tx.commit()?;
  Ok(count(n))
}

// ─── Versioning ──────────────────────────────────────────────────────────────

/// Close and replace changed ids, then open first versions for novel ids.
pub fn apply_versions(
  conn: &mut Connection,
  run_time: &str,
  source_filename: &str,
) -> rusqlite::Result<VersionReport> {
  let columns = column_list(None);
  let staged = column_list(Some("s"));

  let tx = write_tx(conn)?;
  let superseded = tx.execute(
    "UPDATE history
     SET end_date = ?1, current_flag = 0
     WHERE current_flag = 1
       AND id IN (SELECT id FROM changed_ids)",
    params![run_time],
  )?;
  tx.execute(
    &format!(
      "INSERT INTO history (start_date, dup_ver, source_filename, {columns})
       SELECT ?1, r.dup_ver, ?2, {staged}
       FROM changed_ids AS c
       JOIN duplicate_ranks AS r ON r.line_num = c.line_num
       JOIN staged_rows AS s ON s.line_num = c.line_num
       ORDER BY c.id"
    ),
    params![run_time, source_filename],
  )?;
  let inserted = tx.execute(
    &format!(
      "INSERT INTO history (start_date, dup_ver, source_filename, {columns})
       SELECT ?1, n.dup_ver, ?2, {staged}
       FROM novel_ids AS n
       JOIN staged_rows AS s ON s.line_num = n.line_num
       ORDER BY n.id"
    ),
    params![run_time, source_filename],
  )?;
  tx.commit()?;

  Ok(VersionReport { inserted: count(inserted), superseded: count(superseded) })
}

// ─── Deletion ────────────────────────────────────────────────────────────────

/// Flag every not-yet-deleted version of ids absent from staging, closing the
/// current one at `run_time`.
pub fn flag_deletions(
  conn: &mut Connection,
  snapshot_date: &str,
  run_time: &str,
) -> rusqlite::Result<u64> {
  let tx = write_tx(conn)?;
  let n = tx.execute(
    "UPDATE history
     SET deleted_flag = 1,
         deleted_on   = ?1,
         end_date     = CASE WHEN current_flag = 1 THEN ?2 ELSE end_date END,
         current_flag = 0
     WHERE deleted_flag = 0
       AND NOT EXISTS (SELECT 1 FROM staged_rows AS s WHERE s.id = history.id)",
    params![snapshot_date, run_time],
  )?;
  tx.commit()?;
  Ok(count(n))
}

// ─── Changed records ─────────────────────────────────────────────────────────

/// Rebuild `changed_records` from the history of ids with two or more
/// versions. Readers see the old or the new contents, never a mix.
pub fn refresh_changed_view(conn: &mut Connection) -> rusqlite::Result<u64> {
  let columns = history_columns(None);

  let tx = write_tx(conn)?;
  tx.execute("DELETE FROM changed_records", [])?;
  let n = tx.execute(
    &format!(
      "INSERT INTO changed_records ({columns})
       SELECT {columns}
       FROM history
       WHERE id IN (SELECT id FROM history GROUP BY id HAVING COUNT(*) > 1)"
    ),
    [],
  )?;
  tx.commit()?;
  Ok(count(n))
}

#[cfg(test)]
mod tests {
  use strata_core::record::Field;

  use super::*;

  #[test]
  fn predicate_covers_tracked_fields_only() {
    let policy = ChangePolicy::new([Field::Arrest, Field::FbiCode]).unwrap();
    let sql = change_predicate(&policy);
    assert_eq!(sql, "s.arrest IS NOT d.arrest\n        OR s.fbi_code IS NOT d.fbi_code");
  }
}
