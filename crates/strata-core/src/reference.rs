//! Reference classification codes.
//!
//! A small auxiliary table keyed by code, used only when rendering reports.
//! No history is kept: loading merges by code and the last write wins.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceCode {
  /// Natural key (the dataset's `IUCR` column).
  pub code:                  String,
  pub primary_description:   Option<String>,
  pub secondary_description: Option<String>,
  /// `I` for index crimes, `N` for non-index crimes.
  pub index_code:            Option<String>,
  pub active:                Option<bool>,
}
