//! Explicit column declaration for every relation that stores records.
//!
//! Backends build their DDL and their insert/select column lists from
//! [`RECORD_COLUMNS`]; nothing is discovered by introspecting the database.
//! Bump [`SCHEMA_VERSION`] whenever the declaration changes.

use crate::record::Field;

/// Version of the record column declaration.
pub const SCHEMA_VERSION: u32 = 1;

/// Logical storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
  Integer,
  Real,
  Text,
  Boolean,
  Timestamp,
}

/// One record column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
  pub field: Field,
  pub ty:    ColumnType,
}

impl Column {
  const fn new(field: Field, ty: ColumnType) -> Self { Self { field, ty } }

  pub fn name(&self) -> &'static str { self.field.column() }
}

/// The 22 record columns in export order. The CSV codec reads positionally in
/// this order.
pub const RECORD_COLUMNS: [Column; 22] = [
  Column::new(Field::Id, ColumnType::Integer),
  Column::new(Field::CaseNumber, ColumnType::Text),
  Column::new(Field::OrigDate, ColumnType::Timestamp),
  Column::new(Field::Block, ColumnType::Text),
  Column::new(Field::Iucr, ColumnType::Text),
  Column::new(Field::PrimaryType, ColumnType::Text),
  Column::new(Field::Description, ColumnType::Text),
  Column::new(Field::LocationDescription, ColumnType::Text),
  Column::new(Field::Arrest, ColumnType::Boolean),
  Column::new(Field::Domestic, ColumnType::Boolean),
  Column::new(Field::Beat, ColumnType::Text),
  Column::new(Field::District, ColumnType::Text),
  Column::new(Field::Ward, ColumnType::Integer),
  Column::new(Field::CommunityArea, ColumnType::Text),
  Column::new(Field::FbiCode, ColumnType::Text),
  Column::new(Field::XCoordinate, ColumnType::Integer),
  Column::new(Field::YCoordinate, ColumnType::Integer),
  Column::new(Field::Year, ColumnType::Integer),
  Column::new(Field::UpdatedOn, ColumnType::Timestamp),
  Column::new(Field::Latitude, ColumnType::Real),
  Column::new(Field::Longitude, ColumnType::Real),
  Column::new(Field::Location, ColumnType::Text),
];

/// Comma-separated record column names, each optionally qualified with
/// `alias.`.
pub fn column_list(alias: Option<&str>) -> String {
  RECORD_COLUMNS
    .iter()
    .map(|c| match alias {
      Some(a) => format!("{a}.{}", c.name()),
      None => c.name().to_owned(),
    })
    .collect::<Vec<_>>()
    .join(", ")
}

#[cfg(test)]
mod tests {
  use strum::IntoEnumIterator as _;

  use super::*;

  #[test]
  fn declaration_covers_every_field_in_order() {
    let declared: Vec<Field> = RECORD_COLUMNS.iter().map(|c| c.field).collect();
    let all: Vec<Field> = Field::iter().collect();
    assert_eq!(declared, all);
  }

  #[test]
  fn qualified_column_list() {
    let list = column_list(Some("s"));
    assert!(list.starts_with("s.id, s.case_number, s.orig_date"));
    assert!(list.ends_with("s.longitude, s.location"));
    assert_eq!(list.split(", ").count(), 22);
  }
}
