//! Error types for `strata-etl`.

use std::path::PathBuf;

use strata_core::{IngestError, run::Stage};
use thiserror::Error;

/// Failure retrieving a snapshot or reference file. Raised before any stage
/// runs; no run record is written.
#[derive(Debug, Error)]
pub enum TransportError {
  #[error("request to {url} failed: {source}")]
  Http {
    url:    String,
    #[source]
    source: reqwest::Error,
  },

  #[error("I/O error on {path}: {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("no file at {0}")]
  Missing(PathBuf),
}

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Transport(#[from] TransportError),

  /// The snapshot could not be decoded; recorded in the run tracker.
  #[error("snapshot rejected: {0}")]
  Ingest(#[from] IngestError),

  #[error("{stage} stage failed: {source}")]
  Store {
    stage:  Stage,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
