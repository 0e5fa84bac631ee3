//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error renders as `{"status": "error", "kind": ..., "error": ...}`.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use strata_core::Error as CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("{0}")]
  NotFound(String),

  /// A query parameter outside its whitelist.
  #[error("{0}")]
  InvalidQuery(String),

  /// Stored versions of one id break the history invariants.
  #[error("history of id {natural_id} is inconsistent: {reason}")]
  Inconsistent { natural_id: i64, reason: String },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }

  fn kind(&self) -> &'static str {
    match self {
      Self::NotFound(_) => "not_found",
      Self::InvalidQuery(_) => "invalid_query",
      Self::Inconsistent { .. } => "inconsistent_history",
      Self::Store(_) => "store",
    }
  }

  fn status(&self) -> StatusCode {
    match self {
      Self::NotFound(_) => StatusCode::NOT_FOUND,
      Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
      Self::Inconsistent { .. } | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl From<CoreError> for ApiError {
  fn from(e: CoreError) -> Self {
    match e {
      CoreError::LineageViolation { natural_id, reason } => {
        Self::Inconsistent { natural_id, reason }
      }
      other => Self::InvalidQuery(other.to_string()),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let body = json!({ "status": "error", "kind": self.kind(), "error": self.to_string() });
    (self.status(), Json(body)).into_response()
  }
}
