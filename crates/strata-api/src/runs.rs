//! Handler for the `/runs` endpoint.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/runs` | Every run record plus the processed snapshot range |

use std::sync::Arc;

use axum::{Json, extract::State};
use chrono::NaiveDate;
use serde::Serialize;
use strata_core::{run::RunRecord, store::SnapshotStore};

use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct RunsResponse {
  /// Earliest successfully processed snapshot.
  pub first_snapshot: Option<NaiveDate>,
  /// Latest successfully processed snapshot.
  pub last_snapshot:  Option<NaiveDate>,
  pub failed_runs:    usize,
  /// Oldest first.
  pub runs:           Vec<RunRecord>,
}

/// `GET /runs`
pub async fn list<S>(State(store): State<Arc<S>>) -> Result<Json<RunsResponse>, ApiError>
where
  S: SnapshotStore,
{
  let range = store.snapshot_range().await.map_err(ApiError::store)?;
  let runs = store.list_runs().await.map_err(ApiError::store)?;

  Ok(Json(RunsResponse {
    first_snapshot: range.map(|(first, _)| first),
    last_snapshot: range.map(|(_, last)| last),
    failed_runs: runs.iter().filter(|r| !r.status.is_success()).count(),
    runs,
  }))
}
