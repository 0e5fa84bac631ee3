//! CSV codec for snapshot exports and the reference code table.
//!
//! Converts CSV byte streams into [`strata_core`] domain types. Pure
//! synchronous; no HTTP or database dependencies. Rows are decoded lazily so
//! a snapshot never has to fit in memory.
//!
//! # Quick start
//!
//! ```no_run
//! use strata_csv::SnapshotReader;
//!
//! let file = std::fs::File::open("chicago-crime-2024-01-02.csv").unwrap();
//! for row in SnapshotReader::new(file) {
//!   let record = row.unwrap();
//!   println!("{}", record.id);
//! }
//! ```

mod parse;

use std::io::Read;

use csv::ByteRecord;
use strata_core::{
  IngestError,
  record::CrimeRecord,
  reference::ReferenceCode,
  schema::RECORD_COLUMNS,
  store::RowStream,
};

// ─── Snapshot rows ───────────────────────────────────────────────────────────

/// Streaming decoder over a snapshot export with a header row.
///
/// Columns are read positionally in [`RECORD_COLUMNS`] order; header names
/// are not interpreted, only counted. Iteration stops after the first error.
pub struct SnapshotReader<R> {
  inner:          csv::Reader<R>,
  record:         ByteRecord,
  header_checked: bool,
  done:           bool,
}

impl<R: Read> SnapshotReader<R> {
  pub fn new(reader: R) -> Self {
    Self {
      inner:          csv::ReaderBuilder::new().has_headers(true).from_reader(reader),
      record:         ByteRecord::new(),
      header_checked: false,
      done:           false,
    }
  }

  fn check_header(&mut self) -> Result<(), IngestError> {
    let width = self.inner.byte_headers().map_err(parse::from_csv_error)?.len();
    if width != RECORD_COLUMNS.len() {
      return Err(IngestError::Malformed {
        line:    1,
        message: format!("expected {} columns, header has {width}", RECORD_COLUMNS.len()),
      });
    }
    Ok(())
  }

  fn read_next(&mut self) -> Result<Option<CrimeRecord>, IngestError> {
    if !self.header_checked {
      self.check_header()?;
      self.header_checked = true;
    }
    if !self
      .inner
      .read_byte_record(&mut self.record)
      .map_err(parse::from_csv_error)?
    {
      return Ok(None);
    }
    let line = self.record.position().map_or(0, |p| p.line());
    parse::decode_record(&self.record, line).map(Some)
  }
}

impl<R: Read> Iterator for SnapshotReader<R> {
  type Item = Result<CrimeRecord, IngestError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.done {
      return None;
    }
    match self.read_next() {
      Ok(Some(record)) => Some(Ok(record)),
      Ok(None) => {
        self.done = true;
        None
      }
      Err(e) => {
        self.done = true;
        Some(Err(e))
      }
    }
  }
}

/// Box a snapshot decoder as the row stream a store stages from.
pub fn snapshot_rows<R: Read + Send + 'static>(reader: R) -> RowStream {
  Box::new(SnapshotReader::new(reader))
}

// ─── Reference codes ─────────────────────────────────────────────────────────

/// Read the whole reference table (it is small). Rows keep file order, so a
/// code repeated later in the file wins when merged.
pub fn read_reference_codes<R: Read>(reader: R) -> Result<Vec<ReferenceCode>, IngestError> {
  let mut inner = csv::ReaderBuilder::new()
    .has_headers(true)
    .flexible(true)
    .from_reader(reader);
  let mut record = ByteRecord::new();
  let mut codes = Vec::new();

  while inner.read_byte_record(&mut record).map_err(parse::from_csv_error)? {
    let line = record.position().map_or(0, |p| p.line());
    codes.push(parse::decode_reference(&record, line)?);
  }

  Ok(codes)
}
