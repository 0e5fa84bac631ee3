//! Snapshot records, one row of the source dataset each.
//!
//! A record carries the dataset's 22 columns. Only `id` is required; every
//! other column may be blank in the export and is modelled as `Option`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

// ─── Record ──────────────────────────────────────────────────────────────────

/// One incident row as published in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrimeRecord {
  /// The natural id: stable across snapshots.
  pub id:                   i64,
  pub case_number:          Option<String>,
  /// When the incident occurred (the export's `Date` column).
  pub orig_date:            Option<NaiveDateTime>,
  pub block:                Option<String>,
  /// Classification code; joins against the reference table.
  pub iucr:                 Option<String>,
  pub primary_type:         Option<String>,
  pub description:          Option<String>,
  pub location_description: Option<String>,
  pub arrest:               Option<bool>,
  pub domestic:             Option<bool>,
  pub beat:                 Option<String>,
  pub district:             Option<String>,
  pub ward:                 Option<i64>,
  pub community_area:       Option<String>,
  pub fbi_code:             Option<String>,
  pub x_coordinate:         Option<i64>,
  pub y_coordinate:         Option<i64>,
  pub year:                 Option<i64>,
  pub updated_on:           Option<NaiveDateTime>,
  pub latitude:             Option<f64>,
  pub longitude:            Option<f64>,
  /// Free-text `(lat, long)` pair as published.
  pub location:             Option<String>,
}

impl CrimeRecord {
  /// A record with only the natural id set.
  pub fn new(id: i64) -> Self {
    Self {
      id,
      case_number: None,
      orig_date: None,
      block: None,
      iucr: None,
      primary_type: None,
      description: None,
      location_description: None,
      arrest: None,
      domestic: None,
      beat: None,
      district: None,
      ward: None,
      community_area: None,
      fbi_code: None,
      x_coordinate: None,
      y_coordinate: None,
      year: None,
      updated_on: None,
      latitude: None,
      longitude: None,
      location: None,
    }
  }

  /// The value of `field`, or `None` when the column is null.
  pub fn value(&self, field: Field) -> Option<FieldValue<'_>> {
    use FieldValue as V;
    match field {
      Field::Id => Some(V::Integer(self.id)),
      Field::CaseNumber => self.case_number.as_deref().map(V::Text),
      Field::OrigDate => self.orig_date.map(V::Timestamp),
      Field::Block => self.block.as_deref().map(V::Text),
      Field::Iucr => self.iucr.as_deref().map(V::Text),
      Field::PrimaryType => self.primary_type.as_deref().map(V::Text),
      Field::Description => self.description.as_deref().map(V::Text),
      Field::LocationDescription => {
        self.location_description.as_deref().map(V::Text)
      }
      Field::Arrest => self.arrest.map(V::Boolean),
      Field::Domestic => self.domestic.map(V::Boolean),
      Field::Beat => self.beat.as_deref().map(V::Text),
      Field::District => self.district.as_deref().map(V::Text),
      Field::Ward => self.ward.map(V::Integer),
      Field::CommunityArea => self.community_area.as_deref().map(V::Text),
      Field::FbiCode => self.fbi_code.as_deref().map(V::Text),
      Field::XCoordinate => self.x_coordinate.map(V::Integer),
      Field::YCoordinate => self.y_coordinate.map(V::Integer),
      Field::Year => self.year.map(V::Integer),
      Field::UpdatedOn => self.updated_on.map(V::Timestamp),
      Field::Latitude => self.latitude.map(V::Real),
      Field::Longitude => self.longitude.map(V::Real),
      Field::Location => self.location.as_deref().map(V::Text),
    }
  }
}

// ─── Field ───────────────────────────────────────────────────────────────────

/// The closed set of record columns, in export order.
///
/// Column identifiers that end up in SQL text come from here and nowhere
/// else. The snake_case name doubles as the column name.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Field {
  Id,
  CaseNumber,
  OrigDate,
  Block,
  Iucr,
  PrimaryType,
  Description,
  LocationDescription,
  Arrest,
  Domestic,
  Beat,
  District,
  Ward,
  CommunityArea,
  FbiCode,
  XCoordinate,
  YCoordinate,
  Year,
  UpdatedOn,
  Latitude,
  Longitude,
  Location,
}

impl Field {
  /// The column name used by every relation that stores records.
  pub fn column(self) -> &'static str { self.into() }
}

/// A borrowed, typed column value. Null is represented by the absence of a
/// `FieldValue` (see [`CrimeRecord::value`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue<'a> {
  Text(&'a str),
  Integer(i64),
  Real(f64),
  Boolean(bool),
  Timestamp(NaiveDateTime),
}

#[cfg(test)]
mod tests {
  use strum::IntoEnumIterator as _;

  use super::*;

  #[test]
  fn column_names_are_snake_case() {
    assert_eq!(Field::XCoordinate.column(), "x_coordinate");
    assert_eq!(Field::LocationDescription.column(), "location_description");
    assert_eq!(Field::FbiCode.column(), "fbi_code");
  }

  #[test]
  fn field_parses_from_its_column_name() {
    for field in Field::iter() {
      assert_eq!(field.column().parse::<Field>().unwrap(), field);
    }
    assert!("row_id".parse::<Field>().is_err());
  }

  #[test]
  fn null_columns_have_no_value() {
    let mut record = CrimeRecord::new(7);
    assert_eq!(record.value(Field::Id), Some(FieldValue::Integer(7)));
    assert_eq!(record.value(Field::Arrest), None);

    record.arrest = Some(false);
    assert_eq!(record.value(Field::Arrest), Some(FieldValue::Boolean(false)));
  }
}
