//! Threshold alerts over the trailing week of ledger rows.
//!
//! Rules are independent and pure ([`evaluate`]); [`check_alerts`] adds the
//! once-per-day dedup backed by the `alert_log` table.

use std::fmt;

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::dates::lookback;
use crate::db::Database;
use crate::ledger::Ledger;
use crate::models::{DailyRecord, Field};

pub const WINDOW_DAYS: u32 = 7;
pub const HRV_DROP_RATIO: f64 = 0.85;
pub const HRV_MIN_HISTORY: usize = 3;
pub const SLEEP_SCORE_FLOOR: f64 = 60.0;
pub const WEIGHT_SPIKE_KG: f64 = 1.5;
pub const MISSING_NUTRITION_DAYS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    HrvDrop,
    SleepDrop,
    WeightSpike,
    MissingNutrition,
}

impl AlertKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::HrvDrop => "hrv_drop",
            AlertKind::SleepDrop => "sleep_drop",
            AlertKind::WeightSpike => "weight_spike",
            AlertKind::MissingNutrition => "missing_nutrition",
        }
    }

    #[must_use]
    pub fn severity(self) -> Severity {
        match self {
            AlertKind::HrvDrop | AlertKind::SleepDrop => Severity::Critical,
            AlertKind::WeightSpike | AlertKind::MissingNutrition => Severity::Warning,
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
}

impl Severity {
    #[must_use]
    pub fn icon(self) -> &'static str {
        match self {
            Severity::Critical => "🔴",
            Severity::Warning => "🟡",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub title: String,
    /// Telegram-flavoured markdown.
    pub message: String,
}

impl Alert {
    fn new(kind: AlertKind, title: &str, message: String) -> Self {
        Alert {
            kind,
            severity: kind.severity(),
            title: title.to_string(),
            message,
        }
    }
}

fn hrv_drop(records: &[DailyRecord], today: NaiveDate) -> Option<Alert> {
    let today_hrv = records
        .iter()
        .find(|r| r.date == today)
        .and_then(|r| r.number(Field::HrvBalance))?;
    let prior: Vec<f64> = records
        .iter()
        .filter(|r| r.date < today)
        .filter_map(|r| r.number(Field::HrvBalance))
        .collect();
    if prior.len() < HRV_MIN_HISTORY {
        return None;
    }

    #[allow(clippy::cast_precision_loss)]
    let baseline = prior.iter().sum::<f64>() / prior.len() as f64;
    if today_hrv >= baseline * HRV_DROP_RATIO {
        return None;
    }
    let pct_drop = ((1.0 - today_hrv / baseline) * 100.0).round();
    Some(Alert::new(
        AlertKind::HrvDrop,
        "HRV Drop",
        format!(
            "🔴 *HRV Drop Alert*\n\nToday's HRV: *{today_hrv}* (7-day avg: {baseline:.1})\nDown *{pct_drop}%* from average."
        ),
    ))
}

fn sleep_drop(records: &[DailyRecord], today: NaiveDate) -> Option<Alert> {
    let score = records
        .iter()
        .find(|r| r.date == today)
        .and_then(|r| r.number(Field::SleepScore))?
        .trunc();
    (score < SLEEP_SCORE_FLOOR).then(|| {
        Alert::new(
            AlertKind::SleepDrop,
            "Low Sleep Score",
            format!("🔴 *Low Sleep Score*\n\nToday's sleep score: *{score}* (below 60 threshold)."),
        )
    })
}

/// Compares the two latest weight observations, which need not be adjacent days.
fn weight_spike(records: &[DailyRecord]) -> Option<Alert> {
    let mut weights: Vec<(NaiveDate, f64)> = records
        .iter()
        .filter_map(|r| r.number(Field::WeightKg).map(|w| (r.date, w)))
        .collect();
    weights.sort_by_key(|(date, _)| *date);
    let [.., (prev_date, prev), (latest_date, latest)] = weights.as_slice() else {
        return None;
    };

    let change = (latest - prev).abs();
    if change <= WEIGHT_SPIKE_KG {
        return None;
    }
    let (arrow, sign) = if latest > prev { ("⬆️", "+") } else { ("⬇️", "-") };
    Some(Alert::new(
        AlertKind::WeightSpike,
        "Weight Spike",
        format!(
            "🟡 *Weight Spike Alert*\n\n{arrow} {latest_date}: *{latest}kg* ({sign}{change:.1}kg from {prev_date}: {prev}kg)"
        ),
    ))
}

fn missing_nutrition(records: &[DailyRecord]) -> Option<Alert> {
    let mut newest_first: Vec<&DailyRecord> = records.iter().collect();
    newest_first.sort_by(|a, b| b.date.cmp(&a.date));
    let missing = newest_first
        .iter()
        .take_while(|r| !r.nutrition_logged())
        .count();

    (missing >= MISSING_NUTRITION_DAYS).then(|| {
        Alert::new(
            AlertKind::MissingNutrition,
            "Missing Nutrition",
            format!(
                "🟡 *Missing Nutrition Data*\n\nNo nutrition logged for *{missing} consecutive days*.\nSend a MacroFactor export or manual entry to catch up."
            ),
        )
    })
}

/// Run every rule over `records`. The nutrition rule only runs when asked.
#[must_use]
pub fn evaluate(records: &[DailyRecord], today: NaiveDate, check_nutrition: bool) -> Vec<Alert> {
    let mut alerts: Vec<Alert> = [
        hrv_drop(records, today),
        sleep_drop(records, today),
        weight_spike(records),
    ]
    .into_iter()
    .flatten()
    .collect();
    if check_nutrition {
        alerts.extend(missing_nutrition(records));
    }
    alerts
}

/// Evaluate the trailing window and return only alerts not yet sent today.
pub fn check_alerts(db: &Database, today: NaiveDate, check_nutrition: bool) -> Result<Vec<Alert>> {
    let (start, end) = lookback(today, WINDOW_DAYS);
    let records = Ledger::new(db).rows_in_range(start, end)?;
    if records.is_empty() {
        info!(%today, "no ledger rows in alert window");
        return Ok(Vec::new());
    }

    let already_sent = db.alerts_sent_on(today)?;
    let fresh: Vec<Alert> = evaluate(&records, today, check_nutrition)
        .into_iter()
        .filter(|a| !already_sent.iter().any(|k| k == a.kind.as_str()))
        .collect();

    if !fresh.is_empty() {
        let kinds: Vec<&str> = fresh.iter().map(|a| a.kind.as_str()).collect();
        db.record_alerts_sent(today, &kinds, start)?;
    }
    info!(%today, triggered = fresh.len(), suppressed = already_sent.len(), "alerts evaluated");
    Ok(fresh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldMap, Source, Value, blank_row};
    use crate::retry::RetryPolicy;
    use std::time::Duration;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn rec(date: &str, pairs: &[(Field, f64)]) -> DailyRecord {
        let mut row = blank_row();
        for (f, v) in pairs {
            row[f.index()] = Some(Value::Number(*v));
        }
        DailyRecord::new(d(date), row)
    }

    fn logged(date: &str, yes: bool) -> DailyRecord {
        let mut r = rec(date, &[]);
        r.row[Field::NutritionLogged.index()] = Some(Value::Flag(yes));
        r
    }

    fn hrv_window(today_hrv: f64) -> Vec<DailyRecord> {
        vec![
            rec("2026-02-05", &[(Field::HrvBalance, 50.0)]),
            rec("2026-02-06", &[(Field::HrvBalance, 52.0)]),
            rec("2026-02-07", &[(Field::HrvBalance, 48.0)]),
            rec("2026-02-08", &[(Field::HrvBalance, 51.0)]),
            rec("2026-02-09", &[(Field::HrvBalance, today_hrv)]),
        ]
    }

    #[test]
    fn test_hrv_drop_example() {
        let alerts = evaluate(&hrv_window(40.0), d("2026-02-09"), false);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::HrvDrop);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert!(alerts[0].message.contains("Today's HRV: *40*"), "{}", alerts[0].message);
        assert!(alerts[0].message.contains("Down *20%*"), "{}", alerts[0].message);

        assert!(evaluate(&hrv_window(45.0), d("2026-02-09"), false).is_empty());
    }

    #[test]
    fn test_hrv_needs_history_and_today() {
        let short = &hrv_window(30.0)[2..];
        assert!(evaluate(short, d("2026-02-09"), false).is_empty());

        let without_today = &hrv_window(30.0)[..4];
        assert!(evaluate(without_today, d("2026-02-09"), false).is_empty());
    }

    #[test]
    fn test_sleep_drop() {
        let records = vec![rec("2026-02-09", &[(Field::SleepScore, 59.0)])];
        let alerts = evaluate(&records, d("2026-02-09"), false);
        assert_eq!(alerts[0].kind, AlertKind::SleepDrop);

        let records = vec![rec("2026-02-09", &[(Field::SleepScore, 60.0)])];
        assert!(evaluate(&records, d("2026-02-09"), false).is_empty());

        // Yesterday's bad night does not alert today.
        let records = vec![rec("2026-02-08", &[(Field::SleepScore, 40.0)])];
        assert!(evaluate(&records, d("2026-02-09"), false).is_empty());
    }

    #[test]
    fn test_weight_spike_uses_latest_two_observations() {
        let records = vec![
            rec("2026-02-05", &[(Field::WeightKg, 80.0)]),
            rec("2026-02-06", &[(Field::WeightKg, 73.0)]),
            rec("2026-02-09", &[(Field::WeightKg, 74.6)]),
        ];
        let alerts = evaluate(&records, d("2026-02-09"), false);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::WeightSpike);
        assert!(alerts[0].message.contains("+1.6kg from 2026-02-06"));

        let records = vec![
            rec("2026-02-08", &[(Field::WeightKg, 73.0)]),
            rec("2026-02-09", &[(Field::WeightKg, 74.5)]),
        ];
        assert!(evaluate(&records, d("2026-02-09"), false).is_empty());
        assert!(evaluate(&records[..1], d("2026-02-09"), false).is_empty());
    }

    #[test]
    fn test_missing_nutrition_is_gated_and_counts_streak() {
        let records = vec![
            logged("2026-02-06", true),
            logged("2026-02-07", false),
            logged("2026-02-08", false),
            logged("2026-02-09", false),
        ];
        assert!(evaluate(&records, d("2026-02-09"), false).is_empty());

        let alerts = evaluate(&records, d("2026-02-09"), true);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::MissingNutrition);
        assert!(alerts[0].message.contains("*3 consecutive days*"));

        let records = vec![logged("2026-02-08", false), logged("2026-02-09", true)];
        assert!(evaluate(&records, d("2026-02-09"), true).is_empty());
    }

    fn seed_hrv(db: &Database) {
        let ledger = Ledger::new(db)
            .with_retry(RetryPolicy::none())
            .with_pacing(Duration::ZERO);
        for r in hrv_window(40.0) {
            let mut fields = FieldMap::new();
            fields.insert(Field::HrvBalance, r.get(Field::HrvBalance).cloned());
            ledger
                .upsert(&r.date.to_string(), &fields, Source::Wearable)
                .unwrap();
        }
    }

    #[test]
    fn test_check_alerts_dedups_same_day() {
        let db = Database::open_in_memory().unwrap();
        seed_hrv(&db);

        let first = check_alerts(&db, d("2026-02-09"), false).unwrap();
        assert_eq!(first.len(), 1);
        let second = check_alerts(&db, d("2026-02-09"), false).unwrap();
        assert!(second.is_empty());
        assert_eq!(db.alerts_sent_on(d("2026-02-09")).unwrap(), vec!["hrv_drop"]);
    }

    #[test]
    fn test_check_alerts_prunes_old_cache_entries() {
        let db = Database::open_in_memory().unwrap();
        db.record_alerts_sent(d("2026-01-20"), &["sleep_drop"], d("2026-01-13"))
            .unwrap();
        seed_hrv(&db);

        check_alerts(&db, d("2026-02-09"), false).unwrap();
        assert_eq!(db.alert_log_dates().unwrap(), vec![d("2026-02-09")]);
    }

    #[test]
    fn test_check_alerts_empty_window() {
        let db = Database::open_in_memory().unwrap();
        assert!(check_alerts(&db, d("2026-02-09"), true).unwrap().is_empty());
    }
}
