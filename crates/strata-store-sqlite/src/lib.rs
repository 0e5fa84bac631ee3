//! SQLite backend for the strata snapshot history.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every reconciliation stage is a
//! set-based SQL pass inside its own transaction.

mod encode;
mod schema;
mod stages;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
