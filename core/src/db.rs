use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, ToSql, params};

use crate::error::StoreError;
use crate::models::{AiSummaryRecord, DailyRecord, Field, Goal, Row, Value, WEEKDAYS, WeeklySummary};
use crate::store::LedgerStore;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS daily_log (
                    position INTEGER NOT NULL,
                    date TEXT NOT NULL UNIQUE,
                    weight_kg REAL,
                    trend_weight_kg REAL,
                    fat_percent REAL,
                    protein_g REAL,
                    carbs_g REAL,
                    fats_g REAL,
                    calories REAL,
                    expenditure REAL,
                    steps REAL,
                    total_sleep_hours REAL,
                    sleep_score REAL,
                    deep_sleep_minutes REAL,
                    rem_sleep_minutes REAL,
                    sleep_efficiency REAL,
                    readiness_score REAL,
                    temperature_deviation REAL,
                    hrv_balance REAL,
                    resting_heart_rate REAL,
                    activity_score REAL,
                    nutrition_logged INTEGER,
                    data_complete INTEGER,
                    nap_minutes REAL
                );

                CREATE INDEX IF NOT EXISTS idx_daily_log_position ON daily_log(position);

                CREATE TABLE IF NOT EXISTS weekly_summary (
                    week_start TEXT PRIMARY KEY,
                    week_end TEXT NOT NULL,
                    week_number INTEGER NOT NULL,
                    avg_weight_kg REAL,
                    avg_trend_weight_kg REAL,
                    avg_protein_g REAL,
                    avg_carbs_g REAL,
                    avg_fats_g REAL,
                    avg_calories REAL,
                    avg_steps REAL,
                    avg_sleep_hours REAL,
                    avg_sleep_score REAL,
                    avg_deep_sleep_min REAL,
                    avg_rem_sleep_min REAL,
                    avg_readiness_score REAL,
                    avg_hrv_balance REAL,
                    avg_resting_hr REAL,
                    avg_activity_score REAL,
                    avg_nap_minutes REAL,
                    days_logged_nutrition INTEGER NOT NULL,
                    days_logged_total INTEGER NOT NULL,
                    weight_change_kg REAL,
                    compliance_pct INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS goals (
                    day_of_week INTEGER PRIMARY KEY CHECK (day_of_week BETWEEN 0 AND 6),
                    target_calories INTEGER,
                    target_protein_g INTEGER,
                    target_carbs_g INTEGER,
                    target_fats_g INTEGER,
                    target_weight_kg REAL,
                    last_updated TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS ai_summaries (
                    date TEXT PRIMARY KEY,
                    summary_text TEXT NOT NULL,
                    week_number INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS alert_log (
                    date TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    PRIMARY KEY (date, kind)
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn daily_columns() -> String {
        Field::ALL
            .iter()
            .map(|f| f.column())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn cell_from_sql(field: Field, value: ValueRef<'_>) -> Result<Option<Value>, StoreError> {
        let cell = match value {
            ValueRef::Null => None,
            ValueRef::Integer(i) if field.is_flag() => Some(Value::Flag(i != 0)),
            #[allow(clippy::cast_precision_loss)]
            ValueRef::Integer(i) => Some(Value::Number(i as f64)),
            ValueRef::Real(r) => Some(Value::Number(r)),
            ValueRef::Text(t) => Some(Value::Text(
                std::str::from_utf8(t)
                    .map_err(|e| StoreError::Corrupt(format!("{field}: {e}")))?
                    .to_string(),
            )),
            ValueRef::Blob(_) => {
                return Err(StoreError::Corrupt(format!("{field}: unexpected blob")));
            }
        };
        Ok(cell)
    }

    fn row_from_sql(row: &rusqlite::Row) -> Result<Row, StoreError> {
        Field::ALL
            .iter()
            .enumerate()
            .map(|(i, f)| Self::cell_from_sql(*f, row.get_ref(i)?))
            .collect()
    }

    fn date_of_row(row: &Row) -> Result<String, StoreError> {
        let raw = match row.get(Field::Date.index()) {
            Some(Some(Value::Text(s))) => s.trim().to_string(),
            _ => return Err(StoreError::Corrupt("row has no Date".to_string())),
        };
        NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map_err(|_| StoreError::Corrupt(format!("row has malformed Date '{raw}'")))?;
        Ok(raw)
    }

    fn insert_at(
        conn: &Connection,
        position: usize,
        date: &str,
        row: &Row,
    ) -> Result<(), StoreError> {
        let placeholders = (1..=Field::COUNT + 1)
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO daily_log (position, {}) VALUES ({placeholders})",
            Self::daily_columns()
        );
        let position = position as i64;
        let mut values: Vec<&dyn ToSql> = Vec::with_capacity(Field::COUNT + 1);
        values.push(&position);
        values.push(&date);
        for cell in row.iter().skip(1).take(Field::COUNT - 1) {
            values.push(cell);
        }
        // Short rows are padded with NULL.
        let padding = vec![None::<Value>; Field::COUNT.saturating_sub(row.len().max(1))];
        for cell in &padding {
            values.push(cell);
        }
        conn.execute(&sql, values.as_slice())?;
        Ok(())
    }

    fn len(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM daily_log", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    // --- Weekly Summary ---

    pub fn upsert_weekly_summary(&self, s: &WeeklySummary) -> Result<()> {
        self.conn.execute(
            "INSERT INTO weekly_summary (
                week_start, week_end, week_number, avg_weight_kg, avg_trend_weight_kg,
                avg_protein_g, avg_carbs_g, avg_fats_g, avg_calories, avg_steps,
                avg_sleep_hours, avg_sleep_score, avg_deep_sleep_min, avg_rem_sleep_min,
                avg_readiness_score, avg_hrv_balance, avg_resting_hr, avg_activity_score,
                avg_nap_minutes, days_logged_nutrition, days_logged_total, weight_change_kg,
                compliance_pct)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, ?18, ?19, ?20, ?21, ?22, ?23)
             ON CONFLICT(week_start) DO UPDATE SET
                week_end = excluded.week_end,
                week_number = excluded.week_number,
                avg_weight_kg = excluded.avg_weight_kg,
                avg_trend_weight_kg = excluded.avg_trend_weight_kg,
                avg_protein_g = excluded.avg_protein_g,
                avg_carbs_g = excluded.avg_carbs_g,
                avg_fats_g = excluded.avg_fats_g,
                avg_calories = excluded.avg_calories,
                avg_steps = excluded.avg_steps,
                avg_sleep_hours = excluded.avg_sleep_hours,
                avg_sleep_score = excluded.avg_sleep_score,
                avg_deep_sleep_min = excluded.avg_deep_sleep_min,
                avg_rem_sleep_min = excluded.avg_rem_sleep_min,
                avg_readiness_score = excluded.avg_readiness_score,
                avg_hrv_balance = excluded.avg_hrv_balance,
                avg_resting_hr = excluded.avg_resting_hr,
                avg_activity_score = excluded.avg_activity_score,
                avg_nap_minutes = excluded.avg_nap_minutes,
                days_logged_nutrition = excluded.days_logged_nutrition,
                days_logged_total = excluded.days_logged_total,
                weight_change_kg = excluded.weight_change_kg,
                compliance_pct = excluded.compliance_pct",
            params![
                s.week_start.format("%Y-%m-%d").to_string(),
                s.week_end.format("%Y-%m-%d").to_string(),
                s.week_number,
                s.avg_weight_kg,
                s.avg_trend_weight_kg,
                s.avg_protein_g,
                s.avg_carbs_g,
                s.avg_fats_g,
                s.avg_calories,
                s.avg_steps,
                s.avg_sleep_hours,
                s.avg_sleep_score,
                s.avg_deep_sleep_min,
                s.avg_rem_sleep_min,
                s.avg_readiness_score,
                s.avg_hrv_balance,
                s.avg_resting_hr,
                s.avg_activity_score,
                s.avg_nap_minutes,
                s.days_logged_nutrition,
                s.days_logged_total,
                s.weight_change_kg,
                s.compliance_pct,
            ],
        )?;
        Ok(())
    }

    const WEEKLY_SELECT: &'static str = "SELECT week_start, week_end, week_number, avg_weight_kg,
        avg_trend_weight_kg, avg_protein_g, avg_carbs_g, avg_fats_g, avg_calories, avg_steps,
        avg_sleep_hours, avg_sleep_score, avg_deep_sleep_min, avg_rem_sleep_min,
        avg_readiness_score, avg_hrv_balance, avg_resting_hr, avg_activity_score,
        avg_nap_minutes, days_logged_nutrition, days_logged_total, weight_change_kg,
        compliance_pct FROM weekly_summary";

    fn weekly_from_row(row: &rusqlite::Row) -> rusqlite::Result<WeeklySummary> {
        Ok(WeeklySummary {
            week_start: parse_stored_date(row, 0)?,
            week_end: parse_stored_date(row, 1)?,
            week_number: row.get(2)?,
            avg_weight_kg: row.get(3)?,
            avg_trend_weight_kg: row.get(4)?,
            avg_protein_g: row.get(5)?,
            avg_carbs_g: row.get(6)?,
            avg_fats_g: row.get(7)?,
            avg_calories: row.get(8)?,
            avg_steps: row.get(9)?,
            avg_sleep_hours: row.get(10)?,
            avg_sleep_score: row.get(11)?,
            avg_deep_sleep_min: row.get(12)?,
            avg_rem_sleep_min: row.get(13)?,
            avg_readiness_score: row.get(14)?,
            avg_hrv_balance: row.get(15)?,
            avg_resting_hr: row.get(16)?,
            avg_activity_score: row.get(17)?,
            avg_nap_minutes: row.get(18)?,
            days_logged_nutrition: row.get(19)?,
            days_logged_total: row.get(20)?,
            weight_change_kg: row.get(21)?,
            compliance_pct: row.get(22)?,
        })
    }

    pub fn get_weekly_summary(&self, week_start: NaiveDate) -> Result<Option<WeeklySummary>> {
        let sql = format!("{} WHERE week_start = ?1", Self::WEEKLY_SELECT);
        let summary = self
            .conn
            .query_row(
                &sql,
                params![week_start.format("%Y-%m-%d").to_string()],
                Self::weekly_from_row,
            )
            .optional()?;
        Ok(summary)
    }

    /// Latest `limit` weeks, newest first.
    pub fn get_recent_weekly_summaries(&self, limit: usize) -> Result<Vec<WeeklySummary>> {
        let sql = format!("{} ORDER BY week_start DESC LIMIT ?1", Self::WEEKLY_SELECT);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![limit as i64], Self::weekly_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // --- Goals ---

    /// Replace every stored goal with `goals`.
    pub fn replace_goals(&self, goals: &[Goal]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM goals", [])?;
        for g in goals {
            tx.execute(
                "INSERT INTO goals (day_of_week, target_calories, target_protein_g,
                    target_carbs_g, target_fats_g, target_weight_kg, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    g.day_of_week,
                    g.target_calories,
                    g.target_protein_g,
                    g.target_carbs_g,
                    g.target_fats_g,
                    g.target_weight_kg,
                    g.last_updated.format("%Y-%m-%d").to_string(),
                ],
            )
            .with_context(|| format!("Failed to store goal for {}", g.weekday))?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_goals(&self) -> Result<Vec<Goal>> {
        let mut stmt = self.conn.prepare(
            "SELECT day_of_week, target_calories, target_protein_g, target_carbs_g,
                    target_fats_g, target_weight_kg, last_updated
             FROM goals ORDER BY day_of_week",
        )?;
        let goals = stmt
            .query_map([], |row| {
                let day_of_week: i64 = row.get(0)?;
                Ok(Goal {
                    day_of_week,
                    weekday: WEEKDAYS
                        .get(day_of_week as usize)
                        .copied()
                        .unwrap_or("?")
                        .to_string(),
                    target_calories: row.get(1)?,
                    target_protein_g: row.get(2)?,
                    target_carbs_g: row.get(3)?,
                    target_fats_g: row.get(4)?,
                    target_weight_kg: row.get(5)?,
                    last_updated: parse_stored_date(row, 6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(goals)
    }

    // --- AI Summaries ---

    pub fn upsert_ai_summary(&self, record: &AiSummaryRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO ai_summaries (date, summary_text, week_number) VALUES (?1, ?2, ?3)
             ON CONFLICT(date) DO UPDATE SET
                summary_text = excluded.summary_text,
                week_number = excluded.week_number",
            params![
                record.date.format("%Y-%m-%d").to_string(),
                record.summary_text,
                record.week_number
            ],
        )?;
        Ok(())
    }

    pub fn get_ai_summary(&self, date: NaiveDate) -> Result<Option<AiSummaryRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT date, summary_text, week_number FROM ai_summaries WHERE date = ?1",
                params![date.format("%Y-%m-%d").to_string()],
                |row| {
                    Ok(AiSummaryRecord {
                        date: parse_stored_date(row, 0)?,
                        summary_text: row.get(1)?,
                        week_number: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    #[cfg(test)]
    pub fn count_ai_summaries(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM ai_summaries", [], |r| r.get(0))?)
    }

    // --- Alert log ---

    pub fn alerts_sent_on(&self, date: NaiveDate) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT kind FROM alert_log WHERE date = ?1 ORDER BY kind")?;
        let kinds = stmt
            .query_map(params![date.format("%Y-%m-%d").to_string()], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(kinds)
    }

    /// Record `kinds` as sent on `date` and forget anything before `keep_from`.
    pub fn record_alerts_sent(
        &self,
        date: NaiveDate,
        kinds: &[&str],
        keep_from: NaiveDate,
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let date_str = date.format("%Y-%m-%d").to_string();
        for kind in kinds {
            tx.execute(
                "INSERT OR IGNORE INTO alert_log (date, kind) VALUES (?1, ?2)",
                params![date_str, kind],
            )?;
        }
        tx.execute(
            "DELETE FROM alert_log WHERE date < ?1",
            params![keep_from.format("%Y-%m-%d").to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    #[cfg(test)]
    pub fn alert_log_dates(&self) -> Result<Vec<NaiveDate>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT date FROM alert_log ORDER BY date")?;
        let dates = stmt
            .query_map([], |row| parse_stored_date(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(dates)
    }
}

fn parse_stored_date(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Number(n) => ToSqlOutput::from(*n),
            Value::Flag(b) => ToSqlOutput::from(i64::from(*b)),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

// --- Daily Log ---

impl LedgerStore for Database {
    fn find_row_index_for_date(&self, date: NaiveDate) -> Result<Option<usize>, StoreError> {
        let position: Option<i64> = self
            .conn
            .query_row(
                "SELECT position FROM daily_log WHERE date = ?1",
                params![date.format("%Y-%m-%d").to_string()],
                |r| r.get(0),
            )
            .optional()?;
        Ok(position.map(|p| p as usize))
    }

    fn read_row(&self, index: usize) -> Result<Row, StoreError> {
        let sql = format!(
            "SELECT {} FROM daily_log WHERE position = ?1",
            Self::daily_columns()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![index as i64])?;
        match rows.next()? {
            Some(row) => Self::row_from_sql(row),
            None => Err(StoreError::NoSuchRow(index)),
        }
    }

    fn write_row(&self, index: usize, row: &Row) -> Result<(), StoreError> {
        let date = Self::date_of_row(row)?;
        if index > self.len()? {
            return Err(StoreError::NoSuchRow(index));
        }
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM daily_log WHERE position = ?1",
            params![index as i64],
        )?;
        Self::insert_at(&tx, index, &date, row)?;
        tx.commit()?;
        Ok(())
    }

    fn insert_row_at(&self, position: usize, row: &Row) -> Result<(), StoreError> {
        let date = Self::date_of_row(row)?;
        if position > self.len()? {
            return Err(StoreError::NoSuchRow(position));
        }
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE daily_log SET position = position + 1 WHERE position >= ?1",
            params![position as i64],
        )?;
        Self::insert_at(&tx, position, &date, row)?;
        tx.commit()?;
        Ok(())
    }

    fn read_dates(&self) -> Result<Vec<NaiveDate>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT date FROM daily_log ORDER BY position")?;
        let raw = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        raw.iter()
            .map(|s| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map_err(|_| StoreError::Corrupt(format!("malformed Date '{s}'")))
            })
            .collect()
    }

    fn read_rows_in_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyRecord>, StoreError> {
        let sql = format!(
            "SELECT {} FROM daily_log WHERE date BETWEEN ?1 AND ?2 ORDER BY position",
            Self::daily_columns()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![
            start.format("%Y-%m-%d").to_string(),
            end.format("%Y-%m-%d").to_string()
        ])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let cells = Self::row_from_sql(row)?;
            let date = Self::date_of_row(&cells)?;
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .map_err(|_| StoreError::Corrupt(format!("malformed Date '{date}'")))?;
            out.push(DailyRecord::new(date, cells));
        }
        Ok(out)
    }

    fn row_count(&self) -> Result<usize, StoreError> {
        self.len()
    }
}
