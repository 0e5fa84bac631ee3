//! Run records, one per snapshot processing attempt.
//!
//! The run table is append-only. It gates reprocessing of a snapshot date and
//! records how far each attempt got.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{Error, IngestError};

// ─── Stage ───────────────────────────────────────────────────────────────────

/// Pipeline stages, in execution order.
#[derive(
  Debug,
  Clone,
  Copy,
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
pub enum Stage {
  Reference,
  Stage,
  Deduplicate,
  Novelty,
  Change,
  Version,
  Delete,
  Refresh,
  Track,
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// Outcome of a run, persisted as its human-readable label.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(try_from = "String", into = "&'static str")]
pub enum RunStatus {
  #[strum(serialize = "success")]
  Success,
  #[strum(serialize = "failed - data format error")]
  DataFormatError,
  #[strum(serialize = "failed - encoding error")]
  EncodingError,
  #[strum(serialize = "failed - read error")]
  ReadError,
  #[strum(serialize = "failed - database error")]
  DatabaseError,
}

impl RunStatus {
  pub fn as_str(self) -> &'static str { self.into() }

  pub fn is_success(self) -> bool { matches!(self, Self::Success) }
}

impl TryFrom<String> for RunStatus {
  type Error = Error;

  fn try_from(s: String) -> Result<Self, Self::Error> {
    s.parse().map_err(|_| Error::UnknownRunStatus(s))
  }
}

impl From<&IngestError> for RunStatus {
  fn from(e: &IngestError) -> Self {
    match e {
      IngestError::Malformed { .. } => Self::DataFormatError,
      IngestError::Encoding { .. } => Self::EncodingError,
      IngestError::Read(_) => Self::ReadError,
    }
  }
}

// ─── Record ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
  pub run_id:        Uuid,
  pub filename:      String,
  pub processed_at:  DateTime<Utc>,
  pub status:        RunStatus,
  /// The stage that hit a database error, if any.
  pub failed_stage:  Option<Stage>,
  /// The snapshot's nominal date.
  pub snapshot_date: NaiveDate,
}
