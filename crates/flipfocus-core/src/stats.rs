//! Daily focus totals.
//!
//! Totals are keyed by the local calendar day and stored straight in the
//! kv table as `stats_{year}_{day_of_year}`, so a fresh process needs no
//! warm-up pass to resume counting. Keys derive from real dates, which
//! keeps the seven-day window honest across year boundaries.

use std::sync::Arc;

use chrono::{Datelike, Local, NaiveDate};

use crate::error::DatabaseError;
use crate::storage::Database;

/// Key prefix shared by every daily total.
pub const STATS_PREFIX: &str = "stats_";

/// A local calendar day: year plus 1-based day of year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayKey {
    pub year: i32,
    pub day_of_year: u32,
}

impl DayKey {
    pub fn today() -> Self {
        Self::from_date(Local::now().date_naive())
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            day_of_year: date.ordinal(),
        }
    }

    /// The calendar date this key names, if the stored pair is valid.
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::from_yo_opt(self.year, self.day_of_year)
    }

    pub fn storage_key(&self) -> String {
        format!("stats_{}_{}", self.year, self.day_of_year)
    }
}

/// Write-through accumulator for daily focus seconds.
pub struct StatsAggregator {
    db: Arc<Database>,
}

impl StatsAggregator {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Add `seconds` to today's total. Returns the storage key written and
    /// the new total.
    pub fn record(&self, seconds: u64) -> Result<(String, u64), DatabaseError> {
        self.record_on(DayKey::today(), seconds)
    }

    pub fn record_on(&self, day: DayKey, seconds: u64) -> Result<(String, u64), DatabaseError> {
        let key = day.storage_key();
        let total = self.read_total(&key)? + seconds;
        self.db.kv_set(&key, &total.to_string())?;
        Ok((key, total))
    }

    pub fn today_total(&self) -> Result<u64, DatabaseError> {
        self.read_total(&DayKey::today().storage_key())
    }

    /// Totals for the last seven local days, oldest first, today last.
    /// Days without a stored value read as zero.
    pub fn week_window(&self) -> Result<Vec<(DayKey, u64)>, DatabaseError> {
        let today = Local::now().date_naive();
        let mut window = Vec::with_capacity(7);
        for back in (0i64..7).rev() {
            let day = DayKey::from_date(today - chrono::Duration::days(back));
            let total = self.read_total(&day.storage_key())?;
            window.push((day, total));
        }
        Ok(window)
    }

    /// Delete every stored daily total, returning how many days went.
    pub fn reset_all(&self) -> Result<usize, DatabaseError> {
        self.db.kv_delete_prefix(STATS_PREFIX)
    }

    // Unparseable totals read as zero rather than poisoning the day.
    fn read_total(&self, key: &str) -> Result<u64, DatabaseError> {
        Ok(self
            .db
            .kv_get(key)?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }
}
