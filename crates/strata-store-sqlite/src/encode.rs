//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Run and version timestamps are stored as fixed-width RFC 3339 strings so
//! they order lexically. Record timestamps are stored as
//! `YYYY-MM-DD HH:MM:SS`. Booleans are 0/1, UUIDs hyphenated lowercase.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::{Row, types::Value};
use strata_core::{
  history::{HistoryVersion, ReclassifiedVersion},
  record::{CrimeRecord, FieldValue},
  run::{RunRecord, RunStatus, Stage},
  schema::RECORD_COLUMNS,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── NaiveDateTime ───────────────────────────────────────────────────────────

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

pub fn encode_timestamp(ts: NaiveDateTime) -> String { ts.format(TIMESTAMP_FORMAT).to_string() }

pub fn decode_timestamp(s: &str) -> Result<NaiveDateTime> {
  NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

fn decode_opt_timestamp(s: Option<String>) -> Result<Option<NaiveDateTime>> {
  s.as_deref().map(decode_timestamp).transpose()
}

// ─── Run labels ──────────────────────────────────────────────────────────────

pub fn decode_status(s: String) -> Result<RunStatus> { Ok(RunStatus::try_from(s)?) }

pub fn decode_stage(s: &str) -> Result<Stage> {
  s.parse()
    .map_err(|_| Error::UnknownStage(s.to_owned()))
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// Column values of `record` in [`RECORD_COLUMNS`] order.
pub fn record_values(record: &CrimeRecord) -> Vec<Value> {
  RECORD_COLUMNS
    .iter()
    .map(|c| match record.value(c.field) {
      None => Value::Null,
      Some(FieldValue::Text(s)) => Value::Text(s.to_owned()),
      Some(FieldValue::Integer(n)) => Value::Integer(n),
      Some(FieldValue::Real(f)) => Value::Real(f),
      Some(FieldValue::Boolean(b)) => Value::Integer(i64::from(b)),
      Some(FieldValue::Timestamp(ts)) => Value::Text(encode_timestamp(ts)),
    })
    .collect()
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values of the 22 record columns, read positionally.
pub struct RawRecord {
  pub id:                   i64,
  pub case_number:          Option<String>,
  pub orig_date:            Option<String>,
  pub block:                Option<String>,
  pub iucr:                 Option<String>,
  pub primary_type:         Option<String>,
  pub description:          Option<String>,
  pub location_description: Option<String>,
  pub arrest:               Option<bool>,
  pub domestic:             Option<bool>,
  pub beat:                 Option<String>,
  pub district:             Option<String>,
  pub ward:                 Option<i64>,
  pub community_area:       Option<String>,
  pub fbi_code:             Option<String>,
  pub x_coordinate:         Option<i64>,
  pub y_coordinate:         Option<i64>,
  pub year:                 Option<i64>,
  pub updated_on:           Option<String>,
  pub latitude:             Option<f64>,
  pub longitude:            Option<f64>,
  pub location:             Option<String>,
}

impl RawRecord {
  /// Read the record columns starting at column index `at`.
  pub fn from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                   row.get(at)?,
      case_number:          row.get(at + 1)?,
      orig_date:            row.get(at + 2)?,
      block:                row.get(at + 3)?,
      iucr:                 row.get(at + 4)?,
      primary_type:         row.get(at + 5)?,
      description:          row.get(at + 6)?,
      location_description: row.get(at + 7)?,
      arrest:               row.get(at + 8)?,
      domestic:             row.get(at + 9)?,
      beat:                 row.get(at + 10)?,
      district:             row.get(at + 11)?,
      ward:                 row.get(at + 12)?,
      community_area:       row.get(at + 13)?,
      fbi_code:             row.get(at + 14)?,
      x_coordinate:         row.get(at + 15)?,
      y_coordinate:         row.get(at + 16)?,
      year:                 row.get(at + 17)?,
      updated_on:           row.get(at + 18)?,
      latitude:             row.get(at + 19)?,
      longitude:            row.get(at + 20)?,
      location:             row.get(at + 21)?,
    })
  }

  pub fn into_record(self) -> Result<CrimeRecord> {
    Ok(CrimeRecord {
      id:                   self.id,
      case_number:          self.case_number,
      orig_date:            decode_opt_timestamp(self.orig_date)?,
      block:                self.block,
      iucr:                 self.iucr,
      primary_type:         self.primary_type,
      description:          self.description,
      location_description: self.location_description,
      arrest:               self.arrest,
      domestic:             self.domestic,
      beat:                 self.beat,
      district:             self.district,
      ward:                 self.ward,
      community_area:       self.community_area,
      fbi_code:             self.fbi_code,
      x_coordinate:         self.x_coordinate,
      y_coordinate:         self.y_coordinate,
      year:                 self.year,
      updated_on:           decode_opt_timestamp(self.updated_on)?,
      latitude:             self.latitude,
      longitude:            self.longitude,
      location:             self.location,
    })
  }
}

/// Raw values of a `history` or `changed_records` row selected with
/// [`history_columns`](crate::schema::history_columns).
pub struct RawHistoryVersion {
  pub row_id:          i64,
  pub start_date:      String,
  pub end_date:        Option<String>,
  pub current_flag:    bool,
  pub deleted_flag:    bool,
  pub deleted_on:      Option<String>,
  pub dup_ver:         Option<i64>,
  pub source_filename: Option<String>,
  pub record:          RawRecord,
}

impl RawHistoryVersion {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      row_id:          row.get(0)?,
      start_date:      row.get(1)?,
      end_date:        row.get(2)?,
      current_flag:    row.get(3)?,
      deleted_flag:    row.get(4)?,
      deleted_on:      row.get(5)?,
      dup_ver:         row.get(6)?,
      source_filename: row.get(7)?,
      record:          RawRecord::from_row(row, 8)?,
    })
  }

  pub fn into_version(self) -> Result<HistoryVersion> {
    Ok(HistoryVersion {
      row_id:          self.row_id,
      start_date:      decode_dt(&self.start_date)?,
      end_date:        self.end_date.as_deref().map(decode_dt).transpose()?,
      current_flag:    self.current_flag,
      deleted_flag:    self.deleted_flag,
      deleted_on:      self.deleted_on.as_deref().map(decode_date).transpose()?,
      dup_ver:         self.dup_ver,
      source_filename: self.source_filename,
      record:          self.record.into_record()?,
    })
  }
}

/// Raw strings read directly from a `run_records` row.
pub struct RawRunRecord {
  pub run_id:        String,
  pub filename:      String,
  pub processed_at:  String,
  pub status:        String,
  pub failed_stage:  Option<String>,
  pub snapshot_date: String,
}

impl RawRunRecord {
  pub fn into_record(self) -> Result<RunRecord> {
    Ok(RunRecord {
      run_id:        decode_uuid(&self.run_id)?,
      filename:      self.filename,
      processed_at:  decode_dt(&self.processed_at)?,
      status:        decode_status(self.status)?,
      failed_stage:  self.failed_stage.as_deref().map(decode_stage).transpose()?,
      snapshot_date: decode_date(&self.snapshot_date)?,
    })
  }
}

/// One row of the reclassification report.
pub struct RawReclassified {
  pub id:          i64,
  pub row_id:      i64,
  pub iucr:        Option<String>,
  pub description: Option<String>,
  pub fbi_code:    Option<String>,
  pub index_code:  Option<String>,
  pub updated_on:  Option<String>,
}

impl RawReclassified {
  pub fn into_version(self) -> Result<ReclassifiedVersion> {
    Ok(ReclassifiedVersion {
      natural_id:  self.id,
      row_id:      self.row_id,
      iucr:        self.iucr,
      description: self.description,
      fbi_code:    self.fbi_code,
      index_code:  self.index_code,
      updated_on:  decode_opt_timestamp(self.updated_on)?,
    })
  }
}
