//! Core types and trait definitions for the strata snapshot history.
//!
//! This crate is deliberately free of HTTP, CSV and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod change;
pub mod error;
pub mod history;
pub mod record;
pub mod reference;
pub mod run;
pub mod schema;
pub mod store;

pub use error::{Error, IngestError, Result};
