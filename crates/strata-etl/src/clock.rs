//! Time source for run timestamps and the default snapshot date.

use chrono::{DateTime, Local, NaiveDate, Utc};

pub trait Clock: Send + Sync {
  /// Wall-clock run time; becomes version start and end dates.
  fn now(&self) -> DateTime<Utc>;

  /// Nominal date of a snapshot fetched today.
  fn today(&self) -> NaiveDate;
}

/// The system clock. Snapshot dates follow the local calendar.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }

  fn today(&self) -> NaiveDate { Local::now().date_naive() }
}
