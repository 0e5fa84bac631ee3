//! Change policy: which fields count, and what counts as a difference.

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator as _;

use crate::{Error, Result, history::HistoryVersion, record::Field};

/// Null-safe inequality between an incoming value and a stored one.
///
/// Two nulls are equal, null against a value differs, and two values differ
/// when they are unequal.
pub fn different<T: PartialEq + ?Sized>(incoming: Option<&T>, current: Option<&T>) -> bool {
  match (incoming, current) {
    (None, None) => false,
    (Some(s), Some(d)) => s != d,
    _ => true,
  }
}

/// The set of tracked fields compared between a canonical snapshot row and
/// the active history version of the same id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Field>", into = "Vec<Field>")]
pub struct ChangePolicy {
  tracked: Vec<Field>,
}

impl ChangePolicy {
  /// Identification, date, classification, description, location and
  /// arrest/domestic flags. Coordinates, ward and the other geographic
  /// columns are not compared.
  pub const DEFAULT_TRACKED: [Field; 9] = [
    Field::CaseNumber,
    Field::OrigDate,
    Field::Iucr,
    Field::PrimaryType,
    Field::Description,
    Field::LocationDescription,
    Field::Arrest,
    Field::Domestic,
    Field::FbiCode,
  ];

  /// Build a policy from `fields`; duplicates are dropped, order is kept.
  pub fn new(fields: impl IntoIterator<Item = Field>) -> Result<Self> {
    let mut tracked: Vec<Field> = Vec::new();
    for f in fields {
      if !tracked.contains(&f) {
        tracked.push(f);
      }
    }
    if tracked.is_empty() {
      return Err(Error::EmptyChangePolicy);
    }
    Ok(Self { tracked })
  }

  pub fn tracked(&self) -> &[Field] { &self.tracked }
}

impl Default for ChangePolicy {
  fn default() -> Self { Self { tracked: Self::DEFAULT_TRACKED.to_vec() } }
}

impl TryFrom<Vec<Field>> for ChangePolicy {
  type Error = Error;

  fn try_from(fields: Vec<Field>) -> Result<Self> { Self::new(fields) }
}

impl From<ChangePolicy> for Vec<Field> {
  fn from(p: ChangePolicy) -> Self { p.tracked }
}

/// Every column whose value is not the same across all of `versions`.
/// Used by the record detail report; compares all columns, not only tracked
/// ones.
pub fn diverging_fields(versions: &[HistoryVersion]) -> Vec<Field> {
  Field::iter()
    .filter(|&f| {
      versions.windows(2).any(|pair| {
        different(pair[0].record.value(f).as_ref(), pair[1].record.value(f).as_ref())
      })
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};

  use super::*;
  use crate::record::CrimeRecord;

  #[test]
  fn null_safe_difference() {
    assert!(!different::<str>(None, None));
    assert!(different(None, Some("x")));
    assert!(different(Some("x"), None));
    assert!(!different(Some("x"), Some("x")));
    assert!(different(Some("x"), Some("y")));
  }

  #[test]
  fn empty_policy_is_rejected() {
    assert!(matches!(ChangePolicy::new([]), Err(Error::EmptyChangePolicy)));
  }

  #[test]
  fn default_policy_skips_coordinates_and_ward() {
    let policy = ChangePolicy::default();
    assert!(policy.tracked().contains(&Field::Arrest));
    assert!(!policy.tracked().contains(&Field::Ward));
    assert!(!policy.tracked().contains(&Field::Latitude));
  }

  #[test]
  fn duplicate_fields_collapse() {
    let policy = ChangePolicy::new([Field::Arrest, Field::Ward, Field::Arrest]).unwrap();
    assert_eq!(policy.tracked(), &[Field::Arrest, Field::Ward]);
  }

  #[test]
  fn policy_deserialises_from_field_names() {
    let policy: ChangePolicy = serde_json::from_str(r#"["arrest","ward"]"#).unwrap();
    assert_eq!(policy.tracked(), &[Field::Arrest, Field::Ward]);
    assert!(serde_json::from_str::<ChangePolicy>("[]").is_err());
    assert!(serde_json::from_str::<ChangePolicy>(r#"["row_id"]"#).is_err());
  }

  #[test]
  fn diverging_fields_across_versions() {
    let at = |s: i64| Utc.timestamp_opt(s, 0).unwrap();
    let mut first = CrimeRecord::new(3);
    first.arrest = Some(false);
    first.ward = Some(1);
    let mut second = first.clone();
    second.arrest = Some(true);

    let versions = [first, second]
      .into_iter()
      .enumerate()
      .map(|(i, record)| HistoryVersion {
        row_id: i as i64 + 1,
        start_date: at(i as i64 * 10),
        end_date: None,
        current_flag: false,
        deleted_flag: false,
        deleted_on: None,
        dup_ver: Some(1),
        source_filename: None,
        record,
      })
      .collect::<Vec<_>>();

    assert_eq!(diverging_fields(&versions), vec![Field::Arrest]);
    assert!(diverging_fields(&versions[..1]).is_empty());
  }
}
