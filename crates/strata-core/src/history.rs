//! History versions and the intermediate relations that produce them.
//!
//! History is append-only. A version is only ever modified to close it
//! (superseded or deleted) or to flag it deleted; versions are never removed.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, record::CrimeRecord};

// ─── Versions ────────────────────────────────────────────────────────────────

/// One stored version of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryVersion {
  /// Surrogate key, assigned monotonically by the store.
  pub row_id:          i64,
  pub start_date:      DateTime<Utc>,
  /// `None` while the version is current.
  pub end_date:        Option<DateTime<Utc>>,
  pub current_flag:    bool,
  pub deleted_flag:    bool,
  /// Nominal date of the snapshot the id vanished from.
  pub deleted_on:      Option<NaiveDate>,
  pub dup_ver:         Option<i64>,
  pub source_filename: Option<String>,
  #[serde(flatten)]
  pub record:          CrimeRecord,
}

impl HistoryVersion {
  pub fn natural_id(&self) -> i64 { self.record.id }

  pub fn state(&self) -> VersionState {
    match (self.current_flag, self.deleted_flag) {
      (true, _) => VersionState::Active,
      (false, true) => VersionState::Deleted,
      (false, false) => VersionState::Superseded,
    }
  }
}

/// Where a version sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionState {
  Active,
  Superseded,
  Deleted,
}

/// Check the temporal invariants over all versions of one natural id.
///
/// Versions must be ordered by `start_date`; at most one may be current and
/// it alone has no `end_date`; every closed version ends no later than its
/// successor starts.
pub fn validate_lineage(versions: &[HistoryVersion]) -> Result<()> {
  let Some(first) = versions.first() else { return Ok(()) };
  let natural_id = first.natural_id();
  let violation = |reason: String| Error::LineageViolation { natural_id, reason };

  let mut current = 0;
  for v in versions {
    if v.natural_id() != natural_id {
      return Err(violation(format!("row {} belongs to id {}", v.row_id, v.natural_id())));
    }
    if v.current_flag {
      current += 1;
    }
    if v.current_flag != v.end_date.is_none() {
      return Err(violation(format!(
        "row {} has current_flag={} but end_date={:?}",
        v.row_id, v.current_flag, v.end_date
      )));
    }
  }
  if current > 1 {
    return Err(violation(format!("{current} current versions")));
  }

  for pair in versions.windows(2) {
    let (prev, next) = (&pair[0], &pair[1]);
    if prev.start_date >= next.start_date {
      return Err(violation(format!(
        "rows {} and {} are not ordered by start_date",
        prev.row_id, next.row_id
      )));
    }
    match prev.end_date {
      Some(end) if end <= next.start_date => {}
      other => {
        return Err(violation(format!(
          "row {} ends at {other:?}, after successor start {}",
          prev.row_id, next.start_date
        )));
      }
    }
  }

  Ok(())
}

// ─── Intermediate relations ──────────────────────────────────────────────────

/// Rank of one staged row among the rows sharing its natural id. The row
/// with the largest `line_num` has `dup_ver = 1` and is canonical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateRank {
  pub natural_id: i64,
  pub line_num:   i64,
  pub dup_ver:    i64,
}

// ─── Stage inputs and outputs ────────────────────────────────────────────────

/// Input to the versioning stage.
#[derive(Debug, Clone)]
pub struct VersionContext {
  /// Wall-clock time of the run; becomes `start_date`/`end_date`.
  pub run_time:        DateTime<Utc>,
  pub source_filename: String,
}

/// Input to the deletion stage.
#[derive(Debug, Clone, Copy)]
pub struct DeletionContext {
  /// The snapshot's nominal date; becomes `deleted_on`.
  pub snapshot_date: NaiveDate,
  /// Wall-clock time of the run; closes the deleted id's current version.
  pub run_time:      DateTime<Utc>,
}

/// What the versioning stage wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionReport {
  /// First versions opened for ids with no active history.
  pub inserted:   u64,
  /// Active versions closed and replaced by a changed version.
  pub superseded: u64,
}

// ─── Reports ─────────────────────────────────────────────────────────────────

/// A changed-record version joined with its classification's index code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclassifiedVersion {
  pub natural_id:  i64,
  pub row_id:      i64,
  pub iucr:        Option<String>,
  /// `"<primary type> - <description>"`.
  pub description: Option<String>,
  pub fbi_code:    Option<String>,
  pub index_code:  Option<String>,
  pub updated_on:  Option<NaiveDateTime>,
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};

  use super::*;

  fn version(row_id: i64, start_secs: i64, end_secs: Option<i64>) -> HistoryVersion {
    let at = |s: i64| Utc.timestamp_opt(s, 0).unwrap();
    HistoryVersion {
      row_id,
      start_date: at(start_secs),
      end_date: end_secs.map(at),
      current_flag: end_secs.is_none(),
      deleted_flag: false,
      deleted_on: None,
      dup_ver: Some(1),
      source_filename: None,
      record: CrimeRecord::new(1),
    }
  }

  #[test]
  fn superseded_chain_is_consistent() {
    let versions = [version(1, 0, Some(100)), version(2, 100, Some(200)), version(3, 200, None)];
    validate_lineage(&versions).unwrap();
    assert_eq!(versions[0].state(), VersionState::Superseded);
    assert_eq!(versions[2].state(), VersionState::Active);
  }

  #[test]
  fn two_current_versions_are_rejected() {
    let versions = [version(1, 0, None), version(2, 100, None)];
    assert!(matches!(
      validate_lineage(&versions),
      Err(Error::LineageViolation { natural_id: 1, .. })
    ));
  }

  #[test]
  fn closed_version_overlapping_successor_is_rejected() {
    let versions = [version(1, 0, Some(150)), version(2, 100, None)];
    assert!(validate_lineage(&versions).is_err());
  }

  #[test]
  fn current_version_with_end_date_is_rejected() {
    let mut v = version(1, 0, None);
    v.end_date = Some(v.start_date + Duration::seconds(5));
    assert!(validate_lineage(&[v]).is_err());
  }

  #[test]
  fn deleted_version_state() {
    let mut v = version(1, 0, Some(10));
    v.deleted_flag = true;
    assert_eq!(v.state(), VersionState::Deleted);
  }
}
