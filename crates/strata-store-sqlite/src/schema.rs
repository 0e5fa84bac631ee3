//! SQL schema for the strata SQLite store.
//!
//! Record columns are rendered from [`RECORD_COLUMNS`]; the declared
//! [`SCHEMA_VERSION`] is written to `PRAGMA user_version`.

use strata_core::schema::{ColumnType, RECORD_COLUMNS, SCHEMA_VERSION};

/// Version metadata columns of `history` and `changed_records`, in select
/// order. Record columns follow them.
pub const VERSION_COLUMNS: &str =
  "row_id, start_date, end_date, current_flag, deleted_flag, deleted_on, dup_ver, source_filename";

fn sql_type(ty: ColumnType) -> &'static str {
  match ty {
    ColumnType::Integer | ColumnType::Boolean => "INTEGER",
    ColumnType::Real => "REAL",
    ColumnType::Text | ColumnType::Timestamp => "TEXT",
  }
}

/// Record column definitions, `id` not null.
fn record_column_defs() -> String {
  RECORD_COLUMNS
    .iter()
    .map(|c| {
      let not_null = if c.name() == "id" { " NOT NULL" } else { "" };
      format!("    {:<20} {}{not_null}", c.name(), sql_type(c.ty))
    })
    .collect::<Vec<_>>()
    .join(",\n")
}

/// Version metadata plus record columns, each optionally qualified.
pub fn history_columns(alias: Option<&str>) -> String {
  let meta = match alias {
    Some(a) => VERSION_COLUMNS
      .split(", ")
      .map(|c| format!("{a}.{c}"))
      .collect::<Vec<_>>()
      .join(", "),
    None => VERSION_COLUMNS.to_owned(),
  };
  format!("{meta}, {}", strata_core::schema::column_list(alias))
}

// ─── Working relations ───────────────────────────────────────────────────────

/// Staged snapshot rows, numbered from 1 in input order.
pub fn staged_rows_table() -> String {
  format!(
    "CREATE TABLE IF NOT EXISTS staged_rows (
    line_num             INTEGER PRIMARY KEY,
{}
);",
    record_column_defs()
  )
}

pub const STAGED_ROWS_INDEX: &str =
  "CREATE INDEX IF NOT EXISTS staged_rows_id_idx ON staged_rows(id);";

pub const DUPLICATE_RANKS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS duplicate_ranks (
    id       INTEGER NOT NULL,
    line_num INTEGER NOT NULL,
    dup_ver  INTEGER NOT NULL,   -- 1 = canonical (largest line_num)
    PRIMARY KEY (dup_ver, id)
);";

pub const NOVEL_IDS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS novel_ids (
    id       INTEGER PRIMARY KEY,
    line_num INTEGER NOT NULL,
    dup_ver  INTEGER NOT NULL
);";

pub const CHANGED_IDS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS changed_ids (
    id       INTEGER PRIMARY KEY,
    line_num INTEGER NOT NULL
);";

/// `DROP` followed by the table's `CREATE`: the relation is rebuilt from
/// scratch, never appended to.
pub fn recreate(table: &str, create: &str) -> String {
  format!("DROP TABLE IF EXISTS {table};\n{create}")
}

// ─── Full schema ─────────────────────────────────────────────────────────────

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub fn schema() -> String {
  let records = record_column_defs();
  format!(
    "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS reference_codes (
    code                  TEXT PRIMARY KEY,
    primary_description   TEXT,
    secondary_description TEXT,
    index_code            TEXT,   -- 'I' | 'N'
    active                INTEGER
);

-- Versions are closed or flagged, never deleted.
CREATE TABLE IF NOT EXISTS history (
    row_id               INTEGER PRIMARY KEY AUTOINCREMENT,
    start_date           TEXT NOT NULL,
    end_date             TEXT,             -- NULL while current
    current_flag         INTEGER NOT NULL DEFAULT 1,
    deleted_flag         INTEGER NOT NULL DEFAULT 0,
    deleted_on           TEXT,             -- nominal snapshot date
    dup_ver              INTEGER,
    source_filename      TEXT,
{records},
    UNIQUE (id, start_date)
);

CREATE UNIQUE INDEX IF NOT EXISTS history_current_idx ON history(id) WHERE current_flag = 1;
CREATE INDEX IF NOT EXISTS history_deleted_idx ON history(deleted_flag, deleted_on);

-- Every version of every id with more than one version.
CREATE TABLE IF NOT EXISTS changed_records (
    row_id               INTEGER PRIMARY KEY,
    start_date           TEXT NOT NULL,
    end_date             TEXT,
    current_flag         INTEGER NOT NULL,
    deleted_flag         INTEGER NOT NULL,
    deleted_on           TEXT,
    dup_ver              INTEGER,
    source_filename      TEXT,
{records}
);

CREATE INDEX IF NOT EXISTS changed_records_id_idx ON changed_records(id);

CREATE TABLE IF NOT EXISTS run_records (
    run_id        TEXT PRIMARY KEY,
    filename      TEXT NOT NULL,
    processed_at  TEXT NOT NULL,
    status        TEXT NOT NULL,
    failed_stage  TEXT,
    snapshot_date TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS run_records_date_idx ON run_records(snapshot_date);

{staged}
{STAGED_ROWS_INDEX}
{DUPLICATE_RANKS_TABLE}
{NOVEL_IDS_TABLE}
{CHANGED_IDS_TABLE}

PRAGMA user_version = {SCHEMA_VERSION};
",
    staged = staged_rows_table(),
  )
}
