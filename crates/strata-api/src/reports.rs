//! Handlers for the deletion and reclassification reports.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/deleted` | Versions flagged deleted; `?limit&offset` |
//! | `GET`  | `/reclassified` | Changed versions whose index code flips; `?limit&offset` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use serde::Deserialize;
use strata_core::{
  history::{HistoryVersion, ReclassifiedVersion},
  store::{Page, PageRequest, SnapshotStore},
};

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct PageParams {
  pub limit:  Option<u32>,
  pub offset: Option<u64>,
}

impl From<PageParams> for PageRequest {
  fn from(p: PageParams) -> Self { PageRequest::new(p.limit, p.offset) }
}

/// `GET /deleted[?limit=..][&offset=..]`
pub async fn deleted<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<PageParams>,
) -> Result<Json<Page<HistoryVersion>>, ApiError>
where
  S: SnapshotStore,
{
  let page = store
    .list_deleted(params.into())
    .await
    .map_err(ApiError::store)?;
  Ok(Json(page))
}

/// `GET /reclassified[?limit=..][&offset=..]`
pub async fn reclassified<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<PageParams>,
) -> Result<Json<Page<ReclassifiedVersion>>, ApiError>
where
  S: SnapshotStore,
{
  let page = store
    .list_reclassified(params.into())
    .await
    .map_err(ApiError::store)?;
  Ok(Json(page))
}
