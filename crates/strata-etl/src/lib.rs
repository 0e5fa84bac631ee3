//! Snapshot pipeline orchestration.
//!
//! A [`Pipeline`] fetches one dated snapshot through a [`Fetcher`], then
//! drives a [`SnapshotStore`](strata_core::store::SnapshotStore) through every
//! reconciliation stage in order and records the outcome.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
#![allow(async_fn_in_trait)]

pub mod clock;
pub mod error;
pub mod fetch;
pub mod pipeline;

pub use clock::{Clock, SystemClock};
pub use error::{Error, Result, TransportError};
pub use fetch::{DirectoryFetcher, FetchedFile, Fetcher, HttpFetcher, SourceSpec};
pub use pipeline::{Pipeline, PipelineConfig, RunReport, RunSummary};

#[cfg(test)]
mod tests;
