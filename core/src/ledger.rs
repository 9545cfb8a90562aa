//! Upsert and merge engine for the daily ledger.
//!
//! Every write goes through [`Ledger::upsert`]: ownership check, locate,
//! fill-forward merge, derived-field recompute, whole-row write at the
//! date-sorted position. Callers must serialize access to the store; the
//! find-then-write sequence is not atomic across calls.

use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::error::{LedgerError, StoreError};
use crate::models::{DailyRecord, Field, FieldMap, Row, Source, Value, blank_row, is_nonzero};
use crate::retry::RetryPolicy;
use crate::store::LedgerStore;

/// Pause between batch records, to stay under the store's request-rate ceiling.
pub const DEFAULT_PACING: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted { position: usize },
    Updated { position: usize },
}

pub struct Ledger<'a, S: LedgerStore + ?Sized> {
    store: &'a S,
    retry: RetryPolicy,
    pacing: Duration,
}

impl<'a, S: LedgerStore + ?Sized> Ledger<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            pacing: DEFAULT_PACING,
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    fn call<T>(
        &self,
        what: &str,
        op: impl FnMut() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.retry.run(what, op, StoreError::is_transient)
    }

    /// Upsert using a source given by name. Unknown names are rejected.
    #[cfg(test)]
    pub fn upsert_named(
        &self,
        date: &str,
        fields: &FieldMap,
        source: &str,
    ) -> Result<UpsertOutcome, LedgerError> {
        let parsed =
            Source::parse(source).ok_or_else(|| LedgerError::UnknownSource(source.to_string()))?;
        self.upsert(date, fields, parsed)
    }

    pub fn upsert(
        &self,
        date: &str,
        fields: &FieldMap,
        source: Source,
    ) -> Result<UpsertOutcome, LedgerError> {
        let day = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|_| LedgerError::InvalidDate(date.to_string()))?;
        validate_ownership(fields, source)?;

        let existing = self.call("find_row_index_for_date", || {
            self.store.find_row_index_for_date(day)
        })?;

        let outcome = if let Some(position) = existing {
            let mut row = self.call("read_row", || self.store.read_row(position))?;
            row.resize(Field::COUNT, None);
            merge_fields(&mut row, fields);
            recompute_derived(&mut row);
            self.call("write_row", || self.store.write_row(position, &row))?;
            UpsertOutcome::Updated { position }
        } else {
            let mut row = blank_row();
            row[Field::Date.index()] = Some(Value::Text(day.format("%Y-%m-%d").to_string()));
            merge_fields(&mut row, fields);
            recompute_derived(&mut row);
            let position = self.call("compute_insert_position", || {
                self.store.compute_insert_position(day)
            })?;
            self.call("insert_row_at", || self.store.insert_row_at(position, &row))?;
            UpsertOutcome::Inserted { position }
        };

        debug!(date = %day, source = %source, ?outcome, fields = fields.len(), "ledger upsert");
        Ok(outcome)
    }

    /// Apply `upsert` to each record in date order, skipping failures.
    ///
    /// Returns how many records were written.
    pub fn upsert_batch<D: AsRef<str>>(&self, records: &[(D, FieldMap)], source: Source) -> usize {
        let mut ordered: Vec<&(D, FieldMap)> = records.iter().collect();
        ordered.sort_by(|a, b| a.0.as_ref().trim().cmp(b.0.as_ref().trim()));

        let mut ok = 0;
        for (i, (date, fields)) in ordered.iter().enumerate() {
            if i > 0 && !self.pacing.is_zero() {
                std::thread::sleep(self.pacing);
            }
            match self.upsert(date.as_ref(), fields, source) {
                Ok(_) => ok += 1,
                Err(err) => warn!(
                    date = date.as_ref(),
                    source = %source,
                    error = %err,
                    "skipping record in batch"
                ),
            }
        }
        info!(source = %source, total = records.len(), written = ok, "batch upsert finished");
        ok
    }

    // --- Reads ---

    pub fn rows_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyRecord>, StoreError> {
        self.call("read_rows_in_date_range", || {
            self.store.read_rows_in_date_range(start, end)
        })
    }

    pub fn row_for(&self, date: NaiveDate) -> Result<Option<DailyRecord>, StoreError> {
        self.call("read_row_by_date", || self.store.read_row_by_date(date))
    }

    pub fn all_rows(&self) -> Result<Vec<DailyRecord>, StoreError> {
        self.call("read_all_rows", || self.store.read_all_rows())
    }
}

fn validate_ownership(fields: &FieldMap, source: Source) -> Result<(), LedgerError> {
    let disallowed: Vec<Field> = fields
        .keys()
        .copied()
        .filter(|f| !source.allows(*f))
        .collect();
    if disallowed.is_empty() {
        Ok(())
    } else {
        Err(LedgerError::DisallowedFields {
            source_name: source,
            fields: disallowed,
        })
    }
}

/// Overwrite cells with incoming values that are present. Date is never touched.
fn merge_fields(row: &mut Row, fields: &FieldMap) {
    for (field, value) in fields {
        if *field == Field::Date {
            continue;
        }
        match value {
            Some(v) if v.is_present() => row[field.index()] = Some(v.clone()),
            _ => {}
        }
    }
}

/// Nutrition_Logged follows calories; Data_Complete also needs a sleep score.
pub fn recompute_derived(row: &mut Row) {
    let nutrition_logged = is_nonzero(row[Field::Calories.index()].as_ref());
    let wearable_present = is_nonzero(row[Field::SleepScore.index()].as_ref());
    row[Field::NutritionLogged.index()] = Some(Value::Flag(nutrition_logged));
    row[Field::DataComplete.index()] = Some(Value::Flag(nutrition_logged && wearable_present));
}
