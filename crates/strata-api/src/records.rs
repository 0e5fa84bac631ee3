//! Handler for the `/records/{id}` endpoint.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/records/{id}` | Every version of one id; 404 if unknown |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use serde::Serialize;
use strata_core::{
  change::diverging_fields,
  history::{HistoryVersion, VersionState, validate_lineage},
  record::Field,
  store::SnapshotStore,
};

use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct RecordDetail {
  pub id:          i64,
  /// State of the latest version: `active` or `deleted`.
  pub state:       VersionState,
  /// Columns whose value is not the same in every version.
  pub diff_fields: Vec<Field>,
  /// Oldest first.
  pub versions:    Vec<HistoryVersion>,
}

/// `GET /records/{id}`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<i64>,
) -> Result<Json<RecordDetail>, ApiError>
where
  S: SnapshotStore,
{
  let versions = store.history(id).await.map_err(ApiError::store)?;
  let Some(latest) = versions.last() else {
    return Err(ApiError::NotFound(format!("record {id} not found")));
  };
  validate_lineage(&versions)?;

  Ok(Json(RecordDetail {
    id,
    state: latest.state(),
    diff_fields: diverging_fields(&versions),
    versions,
  }))
}
