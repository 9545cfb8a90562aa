use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use vitals_core::models::{DailyRecord, Field};

pub(crate) fn parse_date(date_str: Option<&str>, today: NaiveDate) -> Result<NaiveDate> {
    match date_str {
        None | Some("today") => Ok(today),
        Some("yesterday") => Ok(today - Duration::days(1)),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday")),
    }
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

/// `-` for gaps, otherwise `decimals` places.
pub(crate) fn fmt_opt(v: Option<f64>, decimals: usize) -> String {
    v.map_or_else(|| "-".to_string(), |n| format!("{:.decimals$}", no_neg_zero(n)))
}

pub(crate) fn fmt_field(record: &DailyRecord, field: Field) -> String {
    if field.is_flag() {
        return if record.flag(field) { "yes" } else { "no" }.to_string();
    }
    let decimals = if field.is_integer() { 0 } else { 1 };
    fmt_opt(record.number(field), decimals)
}

pub(crate) fn print_days_table(days: &[DailyRecord]) {
    #[derive(Tabled)]
    struct DayRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Weight")]
        weight: String,
        #[tabled(rename = "Calories")]
        calories: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
        #[tabled(rename = "Sleep h")]
        sleep: String,
        #[tabled(rename = "Sleep")]
        sleep_score: String,
        #[tabled(rename = "Ready")]
        readiness: String,
        #[tabled(rename = "HRV")]
        hrv: String,
        #[tabled(rename = "Steps")]
        steps: String,
    }

    let rows: Vec<DayRow> = days
        .iter()
        .map(|r| DayRow {
            date: r.date.to_string(),
            weight: fmt_field(r, Field::WeightKg),
            calories: fmt_field(r, Field::Calories),
            protein: fmt_field(r, Field::ProteinG),
            carbs: fmt_field(r, Field::CarbsG),
            fat: fmt_field(r, Field::FatsG),
            sleep: fmt_field(r, Field::TotalSleepHours),
            sleep_score: fmt_field(r, Field::SleepScore),
            readiness: fmt_field(r, Field::ReadinessScore),
            hrv: fmt_field(r, Field::HrvBalance),
            steps: fmt_field(r, Field::Steps),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}
