//! JSON read API over the strata snapshot history.
//!
//! Exposes an axum [`Router`] backed by any [`strata_core::store::SnapshotStore`].
//! The API never writes; runs are driven by the pipeline.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", strata_api::api_router(store.clone()))
//! ```

pub mod changes;
pub mod error;
pub mod records;
pub mod reports;
pub mod runs;

use std::sync::Arc;

use axum::{Router, routing::get};
use strata_core::store::SnapshotStore;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: SnapshotStore + 'static,
{
  Router::new()
    .route("/changes", get(changes::list::<S>))
    .route("/records/{id}", get(records::get_one::<S>))
    .route("/deleted", get(reports::deleted::<S>))
    .route("/reclassified", get(reports::reclassified::<S>))
    .route("/runs", get(runs::list::<S>))
    .with_state(store)
}
