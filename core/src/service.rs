use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::alerts::{self, Alert};
use crate::dates::{format_date, lookback, week_bounds};
use crate::db::Database;
use crate::ledger::{DEFAULT_PACING, Ledger};
use crate::macrofactor::{self, ExportLayout, ParsedExport};
use crate::manual::{self, ManualEntry};
use crate::models::{AiSummaryRecord, DailyRecord, Field, Goal, Source, WeeklySummary};
use crate::oura::{self, WearablePayload};
use crate::retry::RetryPolicy;
use crate::summary;
use crate::weekly;

/// Platform wearable API.
///
/// Called synchronously; async callers run service methods on a blocking thread.
pub trait WearableProvider: Send + Sync {
    fn fetch(&self, start: NaiveDate, end: NaiveDate) -> Result<WearablePayload>;
}

/// One lookback window pulled from the wearable, not yet written.
#[derive(Debug, Clone)]
pub struct WearableFetch {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub payload: WearablePayload,
}

/// Pull the lookback window ending at `today`. Touches no database, so async
/// callers run it without holding the service.
pub fn fetch_wearable(
    provider: &dyn WearableProvider,
    today: NaiveDate,
    days: u32,
) -> Result<WearableFetch> {
    let (start, end) = lookback(today, days);
    info!(%start, %end, days, "fetching wearable data");
    let payload = provider
        .fetch(start, end)
        .context("Failed to fetch wearable data")?;
    Ok(WearableFetch {
        start,
        end,
        payload,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days_fetched: usize,
    pub days_updated: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub layouts: Vec<ExportLayout>,
    pub days_imported: usize,
    pub nutrition_count: usize,
    pub weight_count: usize,
    pub goals_updated: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub warnings: Vec<String>,
}

impl ImportReport {
    #[must_use]
    pub fn message(&self) -> String {
        let mut lines = Vec::new();
        if let (Some(first), Some(last)) = (self.first_date, self.last_date) {
            lines.push(format!(
                "✅ Imported {} days of data ({first}–{last}).",
                self.days_imported
            ));
            lines.push(format!(
                "Updated: {} nutrition entries, {} weight entries.",
                self.nutrition_count, self.weight_count
            ));
        }
        if self.goals_updated > 0 {
            lines.push(format!(
                "🎯 Updated macro targets for {} days.",
                self.goals_updated
            ));
        }
        for w in &self.warnings {
            lines.push(format!("⚠️ {w}"));
        }
        lines.join("\n")
    }
}

/// How much of a day's row is filled in.
#[derive(Debug, Clone, Serialize)]
pub struct DayStatus {
    pub date: NaiveDate,
    pub exists: bool,
    pub wearable_fields: usize,
    pub wearable_total: usize,
    pub nutrition_fields: usize,
    pub nutrition_total: usize,
    pub nutrition_logged: bool,
    pub data_complete: bool,
}

/// A week's rows plus the rollup computed from them.
#[derive(Debug, Clone, Serialize)]
pub struct WeekView {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub days: Vec<DailyRecord>,
    pub summary: Option<WeeklySummary>,
}

pub struct VitalsService {
    db: Database,
    retry: RetryPolicy,
    pacing: Duration,
}

impl VitalsService {
    pub fn new(db_path: &Path) -> Result<Self> {
        Ok(Self::from_database(Database::open(db_path)?))
    }

    pub fn new_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    #[must_use]
    pub fn from_database(db: Database) -> Self {
        Self {
            db,
            retry: RetryPolicy::default(),
            pacing: DEFAULT_PACING,
        }
    }

    #[must_use]
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn ledger(&self) -> Ledger<'_, Database> {
        Ledger::new(&self.db)
            .with_retry(self.retry)
            .with_pacing(self.pacing)
    }

    // --- Producers ---

    /// Merge a fetched wearable window into per-day rows and write them.
    #[must_use]
    pub fn apply_wearable(&self, fetch: WearableFetch) -> SyncReport {
        let WearableFetch {
            start,
            end,
            payload,
        } = fetch;
        let merged = oura::merge_days(start, end, &payload);
        if merged.is_empty() {
            warn!(%start, %end, "wearable returned no data for range");
        }

        let records: Vec<(String, _)> = merged
            .into_iter()
            .map(|(date, fields)| (format_date(date), fields))
            .collect();
        let updated = self.ledger().upsert_batch(&records, Source::Wearable);

        info!(fetched = records.len(), updated, "wearable sync finished");
        SyncReport {
            start_date: start,
            end_date: end,
            days_fetched: records.len(),
            days_updated: updated,
        }
    }

    /// Parse every file, merge them, then write daily data and goals.
    pub fn import_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<ImportReport> {
        if paths.is_empty() {
            bail!("No files to import");
        }
        let parsed = macrofactor::parse_files(paths)?;
        self.import_nutrition(parsed)
    }

    pub fn import_nutrition(&self, parsed: ParsedExport) -> Result<ImportReport> {
        if parsed.days.is_empty() && parsed.goals.is_empty() {
            bail!("No valid daily data or goals found in the export");
        }

        let nutrition_count = parsed.nutrition_count();
        let weight_count = parsed.weight_count();
        let first_date = parsed.days.keys().next().copied();
        let last_date = parsed.days.keys().next_back().copied();

        let records: Vec<(String, _)> = parsed
            .days
            .into_iter()
            .map(|(date, fields)| (format_date(date), fields))
            .collect();
        let days_imported = if records.is_empty() {
            0
        } else {
            self.ledger().upsert_batch(&records, Source::Nutrition)
        };

        let goals_updated = if parsed.goals.is_empty() {
            0
        } else {
            self.db.replace_goals(&parsed.goals)?;
            parsed.goals.len()
        };

        info!(days_imported, nutrition_count, weight_count, goals_updated, "nutrition import finished");
        Ok(ImportReport {
            layouts: parsed.layouts,
            days_imported,
            nutrition_count,
            weight_count,
            goals_updated,
            first_date,
            last_date,
            warnings: parsed.warnings,
        })
    }

    pub fn record_manual(&self, text: &str, today: NaiveDate) -> Result<ManualEntry> {
        let entry = manual::parse_manual_entry(text, today)?;
        self.ledger()
            .upsert(&format_date(entry.date), &entry.fields, Source::Nutrition)?;
        info!(date = %entry.date, fields = entry.fields.len(), "manual entry recorded");
        Ok(entry)
    }

    // --- Reads ---

    pub fn day(&self, date: NaiveDate) -> Result<Option<DailyRecord>> {
        Ok(self.ledger().row_for(date)?)
    }

    pub fn day_status(&self, date: NaiveDate) -> Result<DayStatus> {
        let record = self.day(date)?;
        let count = |source: Source| {
            record.as_ref().map_or(0, |r| {
                source
                    .allowed_fields()
                    .iter()
                    .filter(|f| r.number(**f).is_some())
                    .count()
            })
        };
        Ok(DayStatus {
            date,
            exists: record.is_some(),
            wearable_fields: count(Source::Wearable),
            wearable_total: Source::Wearable.allowed_fields().len(),
            nutrition_fields: count(Source::Nutrition),
            nutrition_total: Source::Nutrition.allowed_fields().len(),
            nutrition_logged: record.as_ref().is_some_and(DailyRecord::nutrition_logged),
            data_complete: record.as_ref().is_some_and(DailyRecord::data_complete),
        })
    }

    /// The last `days` days up to and including `today`, oldest first.
    pub fn history(&self, today: NaiveDate, days: u32) -> Result<Vec<DailyRecord>> {
        let (start, end) = lookback(today, days.saturating_sub(1));
        Ok(self.ledger().rows_in_range(start, end)?)
    }

    pub fn week(&self, today: NaiveDate) -> Result<WeekView> {
        let (monday, sunday) = week_bounds(today);
        let days = self.ledger().rows_in_range(monday, today)?;
        let summary = weekly::compute_weekly(&self.db, monday, sunday)?;
        Ok(WeekView {
            week_start: monday,
            week_end: sunday,
            days,
            summary,
        })
    }

    pub fn goals(&self) -> Result<Vec<Goal>> {
        self.db.get_goals()
    }

    /// Average of a column over the last `days` days, ignoring gaps.
    pub fn average(&self, field: Field, today: NaiveDate, days: u32) -> Result<Option<f64>> {
        let rows = self.history(today, days)?;
        let values: Vec<f64> = rows.iter().filter_map(|r| r.number(field)).collect();
        if values.is_empty() {
            return Ok(None);
        }
        #[allow(clippy::cast_precision_loss)]
        let avg = values.iter().sum::<f64>() / values.len() as f64;
        Ok(Some(avg))
    }

    // --- Derived outputs ---

    pub fn update_weekly(&self, today: NaiveDate) -> Result<Vec<WeeklySummary>> {
        weekly::update_all(&self.db, today)
    }

    pub fn recent_weekly(&self, n: usize) -> Result<Vec<WeeklySummary>> {
        weekly::recent_weekly(&self.db, n)
    }

    pub fn check_alerts(&self, today: NaiveDate, check_nutrition: bool) -> Result<Vec<Alert>> {
        alerts::check_alerts(&self.db, today, check_nutrition)
    }

    /// Render the summary prompt from the last week, month, goals and rollups.
    pub fn summary_prompt(&self, today: NaiveDate) -> Result<String> {
        summary::prompt_for(&self.db, today)
    }

    pub fn store_summary(&self, today: NaiveDate, text: &str) -> Result<AiSummaryRecord> {
        summary::store_summary(&self.db, today, text)
    }

    pub fn latest_summary(&self, today: NaiveDate) -> Result<Option<AiSummaryRecord>> {
        self.db.get_ai_summary(today)
    }
}
