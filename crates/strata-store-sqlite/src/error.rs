//! Error type for `strata-store-sqlite`.

use std::time::Duration;

use strata_core::run::Stage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] strata_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown stage label: {0:?}")]
  UnknownStage(String),

  /// The stage was interrupted and its transaction rolled back.
  #[error("{stage} stage did not finish within {limit:?}")]
  TimedOut { stage: Stage, limit: Duration },
}

impl Error {
  /// `true` when SQLite reported the statement as interrupted, either by the
  /// interrupt handle or by a stage observing its cancel flag.
  pub fn is_interrupt(&self) -> bool {
    matches!(
      self,
      Self::Database(tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _)))
        if e.code == rusqlite::ErrorCode::OperationInterrupted
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use rusqlite::ffi;

  use super::*;

  fn sqlite(code: i32) -> Error {
    Error::Database(tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(
      ffi::Error::new(code),
      None,
    )))
  }

  #[test]
  fn only_interrupts_count_as_interrupts() {
    assert!(sqlite(ffi::SQLITE_INTERRUPT).is_interrupt());
    assert!(!sqlite(ffi::SQLITE_CONSTRAINT).is_interrupt());
    assert!(!sqlite(ffi::SQLITE_IOERR).is_interrupt());
    assert!(!Error::DateParse("x".into()).is_interrupt());
  }
}
