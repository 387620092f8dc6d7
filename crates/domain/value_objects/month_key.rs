use std::fmt;

use chrono::{DateTime, Datelike, Local, TimeZone};

/// `YYYY-MM` partition key for usage accounting.
///
/// Every caller that reads or writes a usage counter must compute the key the
/// same way, otherwise counts fragment across month-boundary interpretations.
/// `current()` is the only place the wall clock is consulted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MonthKey(String);

impl MonthKey {
    /// Key for the current calendar month in the server's local timezone.
    pub fn current() -> Self {
        Self::from_datetime(&Local::now())
    }

    pub fn from_datetime<Tz: TimeZone>(datetime: &DateTime<Tz>) -> Self {
        MonthKey(format!("{:04}-{:02}", datetime.year(), datetime.month()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
