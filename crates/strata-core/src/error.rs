//! Error types for `strata-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("change policy must track at least one field")]
  EmptyChangePolicy,

  #[error("unknown run status: {0:?}")]
  UnknownRunStatus(String),

  #[error("unknown sort key: {0:?}")]
  UnknownSortKey(String),

  #[error("unknown sort direction: {0:?}")]
  UnknownSortDirection(String),

  #[error("history of id {natural_id} is inconsistent: {reason}")]
  LineageViolation { natural_id: i64, reason: String },
}

/// A snapshot row that could not be read or decoded.
///
/// Raised only while staging; no history has been touched when one of these
/// surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
  #[error("malformed row at line {line}: {message}")]
  Malformed { line: u64, message: String },

  #[error("invalid UTF-8 at line {line}")]
  Encoding { line: u64 },

  #[error("failed to read snapshot: {0}")]
  Read(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
