//! Handler for the `/changes` endpoint.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/changes` | `?limit&offset&order_by&sort_order`; versions grouped by id |

use std::{collections::HashMap, sync::Arc};

use axum::{
  Json,
  extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use strata_core::{
  Error as CoreError,
  history::HistoryVersion,
  store::{ChangeQuery, PageRequest, SnapshotStore, SortDirection, SortKey},
};

use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub limit:      Option<u32>,
  pub offset:     Option<u64>,
  /// One of the [`SortKey`] names. Defaults to `id`.
  pub order_by:   Option<String>,
  /// `asc` or `desc`. Defaults to `asc`.
  pub sort_order: Option<String>,
}

impl ListParams {
  fn query(&self) -> Result<ChangeQuery, CoreError> {
    let order_by = match &self.order_by {
      Some(s) => s.parse().map_err(|_| CoreError::UnknownSortKey(s.clone()))?,
      None => SortKey::default(),
    };
    let direction = match &self.sort_order {
      Some(s) => s
        .parse()
        .map_err(|_| CoreError::UnknownSortDirection(s.clone()))?,
      None => SortDirection::default(),
    };
    Ok(ChangeQuery { page: PageRequest::new(self.limit, self.offset), order_by, direction })
  }
}

#[derive(Debug, Serialize)]
pub struct Meta {
  pub total_count: u64,
  pub order_by:    SortKey,
  pub sort_order:  SortDirection,
  pub limit:       u32,
  pub offset:      u64,
}

/// All versions of one id that fell in the requested window.
#[derive(Debug, Serialize)]
pub struct ChangedRecord {
  pub id:       i64,
  pub versions: Vec<HistoryVersion>,
}

#[derive(Debug, Serialize)]
pub struct ChangesResponse {
  pub status:  &'static str,
  pub meta:    Meta,
  pub records: Vec<ChangedRecord>,
}

/// Group a window of versions by natural id. Groups appear in the order of
/// their first version in the window; versions keep window order.
fn group_by_id(versions: Vec<HistoryVersion>) -> Vec<ChangedRecord> {
  let mut groups: Vec<ChangedRecord> = Vec::new();
  let mut index: HashMap<i64, usize> = HashMap::new();
  for v in versions {
    let id = v.natural_id();
    let slot = *index.entry(id).or_insert_with(|| {
      groups.push(ChangedRecord { id, versions: Vec::new() });
      groups.len() - 1
    });
    groups[slot].versions.push(v);
  }
  groups
}

/// `GET /changes[?limit=..][&offset=..][&order_by=..][&sort_order=..]`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<ChangesResponse>, ApiError>
where
  S: SnapshotStore,
{
  let query = params.query()?;
  let page = store.list_changed(query).await.map_err(ApiError::store)?;

  Ok(Json(ChangesResponse {
    status:  "ok",
    meta:    Meta {
      total_count: page.total,
      order_by:    query.order_by,
      sort_order:  query.direction,
      limit:       page.limit,
      offset:      page.offset,
    },
    records: group_by_id(page.items),
  }))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_sort_key_is_rejected() {
    let params = ListParams { order_by: Some("latitude".into()), ..Default::default() };
    assert!(matches!(params.query(), Err(CoreError::UnknownSortKey(k)) if k == "latitude"));
  }

  #[test]
  fn unknown_direction_is_rejected() {
    let params = ListParams { sort_order: Some("sideways".into()), ..Default::default() };
    assert!(matches!(params.query(), Err(CoreError::UnknownSortDirection(_))));
  }

  #[test]
  fn limit_is_capped() {
    let params = ListParams { limit: Some(50_000), ..Default::default() };
    assert_eq!(params.query().unwrap().page.limit, PageRequest::MAX_LIMIT);
  }
}
