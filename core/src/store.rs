//! Row-level contract for the daily ledger.
//!
//! Positions are 0-based data rows kept in ascending date order. Implementations
//! must replace whole rows atomically and return rows in position order.

use chrono::NaiveDate;

use crate::error::StoreError;
use crate::models::{DailyRecord, Row};

pub trait LedgerStore {
    fn find_row_index_for_date(&self, date: NaiveDate) -> Result<Option<usize>, StoreError>;

    /// Current values at `index`, padded to full width.
    fn read_row(&self, index: usize) -> Result<Row, StoreError>;

    /// Replace the row at `index`. `index == row_count()` appends.
    fn write_row(&self, index: usize, row: &Row) -> Result<(), StoreError>;

    /// Shift rows at `position..` down by one and write `row` at `position`.
    fn insert_row_at(&self, position: usize, row: &Row) -> Result<(), StoreError>;

    /// The Date column, in position order.
    fn read_dates(&self) -> Result<Vec<NaiveDate>, StoreError>;

    fn read_rows_in_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyRecord>, StoreError>;

    /// Position of the first stored date after `date`, or one past the end.
    fn compute_insert_position(&self, date: NaiveDate) -> Result<usize, StoreError> {
        let dates = self.read_dates()?;
        Ok(dates.iter().position(|d| *d > date).unwrap_or(dates.len()))
    }

    fn read_row_by_date(&self, date: NaiveDate) -> Result<Option<DailyRecord>, StoreError> {
        match self.find_row_index_for_date(date)? {
            Some(index) => Ok(Some(DailyRecord::new(date, self.read_row(index)?))),
            None => Ok(None),
        }
    }

    fn row_count(&self) -> Result<usize, StoreError> {
        Ok(self.read_dates()?.len())
    }

    fn read_all_rows(&self) -> Result<Vec<DailyRecord>, StoreError> {
        let dates = self.read_dates()?;
        match (dates.first(), dates.last()) {
            (Some(first), Some(last)) => self.read_rows_in_date_range(*first, *last),
            _ => Ok(Vec::new()),
        }
    }
}
