//! Column decoders for snapshot and reference rows.
//!
//! Cells are trimmed; an empty cell is null. Every decode failure carries the
//! physical line it came from.

use chrono::NaiveDateTime;
use csv::ByteRecord;
use strata_core::{IngestError, record::CrimeRecord, reference::ReferenceCode};

/// Timestamp layouts seen in exports: the portal's 12-hour US format first,
/// then ISO variants.
const TIMESTAMP_FORMATS: [&str; 4] = [
  "%m/%d/%Y %I:%M:%S %p",
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%d %H:%M:%S%.f",
  "%m/%d/%Y %H:%M",
];

// ─── Cells ───────────────────────────────────────────────────────────────────

/// Positional accessor over one CSV row.
struct Cells<'a> {
  record: &'a ByteRecord,
  line:   u64,
}

impl<'a> Cells<'a> {
  fn text(&self, index: usize) -> Result<Option<&'a str>, IngestError> {
    let raw = self.record.get(index).unwrap_or_default();
    let s = std::str::from_utf8(raw)
      .map_err(|_| IngestError::Encoding { line: self.line })?
      .trim();
    Ok((!s.is_empty()).then_some(s))
  }

  fn string(&self, index: usize) -> Result<Option<String>, IngestError> {
    Ok(self.text(index)?.map(str::to_owned))
  }

  fn integer(&self, index: usize, column: &str) -> Result<Option<i64>, IngestError> {
    self
      .text(index)?
      .map(|s| parse_integer(s).ok_or_else(|| self.invalid(column, s)))
      .transpose()
  }

  fn real(&self, index: usize, column: &str) -> Result<Option<f64>, IngestError> {
    self
      .text(index)?
      .map(|s| s.parse::<f64>().map_err(|_| self.invalid(column, s)))
      .transpose()
  }

  fn boolean(&self, index: usize, column: &str) -> Result<Option<bool>, IngestError> {
    self
      .text(index)?
      .map(|s| parse_boolean(s).ok_or_else(|| self.invalid(column, s)))
      .transpose()
  }

  fn timestamp(&self, index: usize, column: &str) -> Result<Option<NaiveDateTime>, IngestError> {
    self
      .text(index)?
      .map(|s| parse_timestamp(s).ok_or_else(|| self.invalid(column, s)))
      .transpose()
  }

  fn invalid(&self, column: &str, raw: &str) -> IngestError {
    IngestError::Malformed { line: self.line, message: format!("invalid {column} value {raw:?}") }
  }
}

fn parse_integer(s: &str) -> Option<i64> {
  if let Ok(n) = s.parse::<i64>() {
    return Some(n);
  }
  // Some exports render integral columns as `1176352.0`.
  let f = s.parse::<f64>().ok()?;
  (f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15).then_some(f as i64)
}

fn parse_boolean(s: &str) -> Option<bool> {
  match s.to_ascii_lowercase().as_str() {
    "true" | "t" | "y" | "yes" | "1" => Some(true),
    "false" | "f" | "n" | "no" | "0" => Some(false),
    _ => None,
  }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
  TIMESTAMP_FORMATS
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// Decode one snapshot row. `record` must have the 22 record columns in
/// export order.
pub(crate) fn decode_record(record: &ByteRecord, line: u64) -> Result<CrimeRecord, IngestError> {
  let c = Cells { record, line };

  let id = c.integer(0, "id")?.ok_or_else(|| IngestError::Malformed {
    line,
    message: "missing id".to_owned(),
  })?;

  Ok(CrimeRecord {
    id,
    case_number: c.string(1)?,
    orig_date: c.timestamp(2, "orig_date")?,
    block: c.string(3)?,
    iucr: c.string(4)?,
    primary_type: c.string(5)?,
    description: c.string(6)?,
    location_description: c.string(7)?,
    arrest: c.boolean(8, "arrest")?,
    domestic: c.boolean(9, "domestic")?,
    beat: c.string(10)?,
    district: c.string(11)?,
    ward: c.integer(12, "ward")?,
    community_area: c.string(13)?,
    fbi_code: c.string(14)?,
    x_coordinate: c.integer(15, "x_coordinate")?,
    y_coordinate: c.integer(16, "y_coordinate")?,
    year: c.integer(17, "year")?,
    updated_on: c.timestamp(18, "updated_on")?,
    latitude: c.real(19, "latitude")?,
    longitude: c.real(20, "longitude")?,
    location: c.string(21)?,
  })
}

/// Decode one reference row: code, primary and secondary description, index
/// code, active flag.
pub(crate) fn decode_reference(record: &ByteRecord, line: u64) -> Result<ReferenceCode, IngestError> {
  let c = Cells { record, line };

  let code = c.string(0)?.ok_or_else(|| IngestError::Malformed {
    line,
    message: "missing code".to_owned(),
  })?;

  Ok(ReferenceCode {
    code,
    primary_description: c.string(1)?,
    secondary_description: c.string(2)?,
    index_code: c.string(3)?,
    active: c.boolean(4, "active")?,
  })
}

/// Convert a CSV reader failure, keeping the line when the reader knows it.
pub(crate) fn from_csv_error(err: csv::Error) -> IngestError {
  let line = err.position().map_or(0, |p| p.line());
  match err.kind() {
    csv::ErrorKind::Io(e) => IngestError::Read(e.to_string()),
    csv::ErrorKind::Utf8 { .. } => IngestError::Encoding { line },
    _ => IngestError::Malformed { line, message: err.to_string() },
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;

  fn row(cells: &[&str]) -> ByteRecord { ByteRecord::from(cells.to_vec()) }

  fn full_row() -> Vec<&'static str> {
    vec![
      "10000092",
      "HY189866",
      "03/18/2015 07:44:00 PM",
      "047XX W OHIO ST",
      "041A",
      "BATTERY",
      "AGGRAVATED: HANDGUN",
      "STREET",
      "false",
      "false",
      "1111",
      "011",
      "28",
      "25",
      "04B",
      "1144606",
      "1903566",
      "2015",
      "02/10/2018 03:50:01 PM",
      "41.891398861",
      "-87.744384567",
      "(41.891398861, -87.744384567)",
    ]
  }

  #[test]
  fn full_row_decodes() {
    let r = decode_record(&row(&full_row()), 2).unwrap();
    assert_eq!(r.id, 10000092);
    assert_eq!(r.case_number.as_deref(), Some("HY189866"));
    assert_eq!(
      r.orig_date,
      Some(NaiveDate::from_ymd_opt(2015, 3, 18).unwrap().and_hms_opt(19, 44, 0).unwrap())
    );
    assert_eq!(r.arrest, Some(false));
    assert_eq!(r.ward, Some(28));
    assert_eq!(r.x_coordinate, Some(1144606));
    assert_eq!(r.latitude, Some(41.891398861));
    assert_eq!(r.location.as_deref(), Some("(41.891398861, -87.744384567)"));
  }

  #[test]
  fn blank_cells_are_null() {
    let mut cells = full_row();
    for i in [1, 8, 12, 19] {
      cells[i] = "  ";
    }
    let r = decode_record(&row(&cells), 2).unwrap();
    assert_eq!(r.case_number, None);
    assert_eq!(r.arrest, None);
    assert_eq!(r.ward, None);
    assert_eq!(r.latitude, None);
  }

  #[test]
  fn missing_id_is_malformed() {
    let mut cells = full_row();
    cells[0] = "";
    let err = decode_record(&row(&cells), 7).unwrap_err();
    assert_eq!(err, IngestError::Malformed { line: 7, message: "missing id".into() });
  }

  #[test]
  fn bad_boolean_is_malformed() {
    let mut cells = full_row();
    cells[9] = "maybe";
    let err = decode_record(&row(&cells), 4).unwrap_err();
    assert!(matches!(err, IngestError::Malformed { line: 4, ref message } if message.contains("domestic")));
  }

  #[test]
  fn invalid_utf8_is_an_encoding_error() {
    let mut record = ByteRecord::new();
    record.push_field(b"1");
    record.push_field(b"\xff\xfe");
    for _ in 2..22 {
      record.push_field(b"");
    }
    assert_eq!(decode_record(&record, 3).unwrap_err(), IngestError::Encoding { line: 3 });
  }

  #[test]
  fn integral_floats_are_accepted() {
    assert_eq!(parse_integer("1176352.0"), Some(1176352));
    assert_eq!(parse_integer("1.5"), None);
  }

  #[test]
  fn iso_timestamps_are_accepted() {
    assert!(parse_timestamp("2024-01-02T03:04:05.000").is_some());
    assert!(parse_timestamp("2024-01-02 03:04:05").is_some());
    assert!(parse_timestamp("yesterday").is_none());
  }

  #[test]
  fn reference_row_decodes() {
    let r = decode_reference(&row(&["0110", "HOMICIDE", "FIRST DEGREE MURDER", "I", "true"]), 2)
      .unwrap();
    assert_eq!(r.code, "0110");
    assert_eq!(r.index_code.as_deref(), Some("I"));
    assert_eq!(r.active, Some(true));
  }
}
