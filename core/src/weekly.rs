use anyhow::Result;
use chrono::NaiveDate;
use tracing::info;

use crate::dates::{iso_week, previous_week, week_bounds};
use crate::db::Database;
use crate::ledger::Ledger;
use crate::models::{DailyRecord, Field, WeeklySummary, round1};
use crate::store::LedgerStore;

fn mean(records: &[DailyRecord], field: Field) -> Option<f64> {
    let values: Vec<f64> = records.iter().filter_map(|r| r.number(field)).collect();
    if values.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let avg = values.iter().sum::<f64>() / values.len() as f64;
    Some(avg)
}

fn avg(records: &[DailyRecord], field: Field) -> Option<f64> {
    mean(records, field).map(|m| if field.is_integer() { m.round() } else { round1(m) })
}

/// Roll up the days between `start` and `end` (inclusive). `None` when no rows exist.
pub fn compute_weekly<S: LedgerStore + ?Sized>(
    store: &S,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Option<WeeklySummary>> {
    let ledger = Ledger::new(store);
    let data = ledger.rows_in_range(start, end)?;
    if data.is_empty() {
        info!(week_start = %start, "no ledger rows for week");
        return Ok(None);
    }

    let days_logged_nutrition = data.iter().filter(|r| r.nutrition_logged()).count() as u32;
    let days_logged_total = data.iter().filter(|r| r.data_complete()).count() as u32;

    let (prev_start, prev_end) = previous_week(start);
    let prev_data = ledger.rows_in_range(prev_start, prev_end)?;
    let avg_weight_kg = avg(&data, Field::WeightKg);
    let weight_change_kg = match (mean(&data, Field::WeightKg), mean(&prev_data, Field::WeightKg)) {
        (Some(_), Some(prev)) => avg_weight_kg.map(|this| round1(this - prev)),
        _ => None,
    };

    let compliance_pct = (f64::from(days_logged_nutrition) / 7.0 * 100.0).round() as u32;

    let summary = WeeklySummary {
        week_start: start,
        week_end: end,
        week_number: iso_week(start),
        avg_weight_kg,
        avg_trend_weight_kg: avg(&data, Field::TrendWeightKg),
        avg_protein_g: avg(&data, Field::ProteinG),
        avg_carbs_g: avg(&data, Field::CarbsG),
        avg_fats_g: avg(&data, Field::FatsG),
        avg_calories: avg(&data, Field::Calories),
        avg_steps: avg(&data, Field::Steps),
        avg_sleep_hours: avg(&data, Field::TotalSleepHours),
        avg_sleep_score: avg(&data, Field::SleepScore),
        avg_deep_sleep_min: avg(&data, Field::DeepSleepMinutes),
        avg_rem_sleep_min: avg(&data, Field::RemSleepMinutes),
        avg_readiness_score: avg(&data, Field::ReadinessScore),
        avg_hrv_balance: avg(&data, Field::HrvBalance),
        avg_resting_hr: avg(&data, Field::RestingHeartRate),
        avg_activity_score: avg(&data, Field::ActivityScore),
        avg_nap_minutes: avg(&data, Field::NapMinutes),
        days_logged_nutrition,
        days_logged_total,
        weight_change_kg,
        compliance_pct,
    };

    info!(
        week_start = %start,
        nutrition_days = days_logged_nutrition,
        complete_days = days_logged_total,
        compliance = compliance_pct,
        "computed weekly rollup"
    );
    Ok(Some(summary))
}

/// Recompute the current and previous week and store both. Returns what was written.
pub fn update_all(db: &Database, today: NaiveDate) -> Result<Vec<WeeklySummary>> {
    let (monday, sunday) = week_bounds(today);
    let (prev_monday, prev_sunday) = previous_week(monday);

    let mut written = Vec::new();
    for (start, end) in [(monday, sunday), (prev_monday, prev_sunday)] {
        if let Some(summary) = compute_weekly(db, start, end)? {
            db.upsert_weekly_summary(&summary)?;
            written.push(summary);
        }
    }
    Ok(written)
}

/// Latest `n` stored weeks, newest first.
pub fn recent_weekly(db: &Database, n: usize) -> Result<Vec<WeeklySummary>> {
    db.get_recent_weekly_summaries(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldMap, Source, Value};
    use crate::retry::RetryPolicy;
    use std::time::Duration;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn put(db: &Database, date: &str, source: Source, pairs: &[(Field, f64)]) {
        let fields: FieldMap = pairs
            .iter()
            .map(|(f, v)| (*f, Some(Value::Number(*v))))
            .collect();
        Ledger::new(db)
            .with_retry(RetryPolicy::none())
            .with_pacing(Duration::ZERO)
            .upsert(date, &fields, source)
            .unwrap();
    }

    #[test]
    fn test_empty_week_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(
            compute_weekly(&db, d("2026-02-09"), d("2026-02-15"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_calories_example() {
        let db = Database::open_in_memory().unwrap();
        for (date, kcal) in [("2026-02-09", 2000.0), ("2026-02-10", 2100.0), ("2026-02-11", 2200.0)] {
            put(&db, date, Source::Nutrition, &[(Field::Calories, kcal)]);
        }
        // Wearable-only days count as rows but not as logged nutrition.
        put(&db, "2026-02-12", Source::Wearable, &[(Field::Steps, 9000.0)]);

        let s = compute_weekly(&db, d("2026-02-09"), d("2026-02-15"))
            .unwrap()
            .unwrap();
        assert_eq!(s.avg_calories, Some(2100.0));
        assert_eq!(s.days_logged_nutrition, 3);
        assert_eq!(s.days_logged_total, 0);
        assert_eq!(s.compliance_pct, 43);
        assert_eq!(s.avg_steps, Some(9000.0));
        assert_eq!(s.week_number, 7);
        assert_eq!(s.avg_sleep_score, None);
    }

    #[test]
    fn test_full_week_with_one_unlogged_day() {
        let db = Database::open_in_memory().unwrap();
        let week = [
            ("2026-02-09", Some(2000.0)),
            ("2026-02-10", Some(2100.0)),
            ("2026-02-11", Some(1900.0)),
            ("2026-02-12", Some(2200.0)),
            ("2026-02-13", None),
            ("2026-02-14", Some(2000.0)),
            ("2026-02-15", Some(2100.0)),
        ];
        for (date, kcal) in week {
            match kcal {
                Some(kcal) => put(&db, date, Source::Nutrition, &[(Field::Calories, kcal)]),
                None => put(&db, date, Source::Wearable, &[(Field::Steps, 8000.0)]),
            }
        }

        let s = compute_weekly(&db, d("2026-02-09"), d("2026-02-15"))
            .unwrap()
            .unwrap();
        assert_eq!(s.avg_calories, Some(2050.0));
        assert_eq!(s.days_logged_nutrition, 6);
        assert_eq!(s.compliance_pct, 86);
    }

    #[test]
    fn test_rounding_by_column_kind() {
        let db = Database::open_in_memory().unwrap();
        put(&db, "2026-02-09", Source::Wearable, &[(Field::SleepScore, 80.0), (Field::TotalSleepHours, 7.23)]);
        put(&db, "2026-02-10", Source::Wearable, &[(Field::SleepScore, 83.0), (Field::TotalSleepHours, 7.0)]);
        let s = compute_weekly(&db, d("2026-02-09"), d("2026-02-15"))
            .unwrap()
            .unwrap();
        assert_eq!(s.avg_sleep_score, Some(82.0));
        assert_eq!(s.avg_sleep_hours, Some(7.1));
    }

    #[test]
    fn test_weight_change_against_previous_week() {
        let db = Database::open_in_memory().unwrap();
        put(&db, "2026-02-03", Source::Nutrition, &[(Field::WeightKg, 74.0)]);
        put(&db, "2026-02-05", Source::Nutrition, &[(Field::WeightKg, 74.4)]);
        put(&db, "2026-02-10", Source::Nutrition, &[(Field::WeightKg, 73.6)]);

        let s = compute_weekly(&db, d("2026-02-09"), d("2026-02-15"))
            .unwrap()
            .unwrap();
        assert_eq!(s.avg_weight_kg, Some(73.6));
        assert_eq!(s.weight_change_kg, Some(-0.6));
    }

    #[test]
    fn test_weight_change_absent_without_previous_week() {
        let db = Database::open_in_memory().unwrap();
        put(&db, "2026-02-10", Source::Nutrition, &[(Field::WeightKg, 73.6)]);
        let s = compute_weekly(&db, d("2026-02-09"), d("2026-02-15"))
            .unwrap()
            .unwrap();
        assert_eq!(s.weight_change_kg, None);
    }

    #[test]
    fn test_complete_days_counted() {
        let db = Database::open_in_memory().unwrap();
        put(&db, "2026-02-09", Source::Nutrition, &[(Field::Calories, 2000.0)]);
        put(&db, "2026-02-09", Source::Wearable, &[(Field::SleepScore, 85.0)]);
        let s = compute_weekly(&db, d("2026-02-09"), d("2026-02-15"))
            .unwrap()
            .unwrap();
        assert_eq!(s.days_logged_total, 1);
        assert_eq!(s.compliance_pct, 14);
    }

    #[test]
    fn test_update_all_writes_current_and_previous_week() {
        let db = Database::open_in_memory().unwrap();
        put(&db, "2026-02-04", Source::Nutrition, &[(Field::Calories, 1800.0)]);
        put(&db, "2026-02-10", Source::Nutrition, &[(Field::Calories, 2000.0)]);

        let written = update_all(&db, d("2026-02-11")).unwrap();
        assert_eq!(written.len(), 2);

        let recent = recent_weekly(&db, 4).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].week_start, d("2026-02-09"));
        assert_eq!(recent[1].week_start, d("2026-02-02"));

        // Recomputing overwrites rather than duplicating.
        put(&db, "2026-02-11", Source::Nutrition, &[(Field::Calories, 2200.0)]);
        update_all(&db, d("2026-02-11")).unwrap();
        let recent = recent_weekly(&db, 4).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].avg_calories, Some(2100.0));
    }

    #[test]
    fn test_update_all_skips_empty_weeks() {
        let db = Database::open_in_memory().unwrap();
        put(&db, "2026-02-10", Source::Nutrition, &[(Field::Calories, 2000.0)]);
        let written = update_all(&db, d("2026-02-11")).unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].week_start, d("2026-02-09"));
    }
}
