use anyhow::{Result, bail};
use chrono::{Duration, NaiveDate};

use crate::models::{Field, FieldMap, MANUAL_LIMITS, Value, drop_out_of_range, round1};

pub const USAGE: &str = "Format: YYYY-MM-DD weight protein carbs fats calories\n\
Use '-' to skip a field. Example: 2026-02-09 85.2 180 200 70 2100";

/// Positional fields after the date, in entry order.
const ORDER: [Field; 5] = [
    Field::WeightKg,
    Field::ProteinG,
    Field::CarbsG,
    Field::FatsG,
    Field::Calories,
];

#[derive(Debug, Clone, PartialEq)]
pub struct ManualEntry {
    pub date: NaiveDate,
    pub fields: FieldMap,
    /// Values that were dropped as implausible.
    pub warnings: Vec<String>,
}

impl ManualEntry {
    /// One-line confirmation, e.g. `✅ Feb 9 — 73kg | 180P | 2100cal`.
    #[must_use]
    pub fn confirmation(&self) -> String {
        let num = |f: Field| {
            self.fields
                .get(&f)
                .and_then(Option::as_ref)
                .and_then(Value::as_f64)
        };
        let mut parts = Vec::new();
        if let Some(w) = num(Field::WeightKg) {
            parts.push(format!("{w}kg"));
        }
        for (field, suffix) in [
            (Field::ProteinG, "P"),
            (Field::CarbsG, "C"),
            (Field::FatsG, "F"),
        ] {
            if let Some(v) = num(field) {
                parts.push(format!("{v:.0}{suffix}"));
            }
        }
        if let Some(c) = num(Field::Calories) {
            parts.push(format!("{c:.0}cal"));
        }
        format!("✅ {} — {}", self.date.format("%b %-d"), parts.join(" | "))
    }
}

fn resolve_date(token: &str, today: NaiveDate) -> Option<NaiveDate> {
    match token.to_lowercase().as_str() {
        "today" => Some(today),
        "yesterday" => Some(today - Duration::days(1)),
        _ => NaiveDate::parse_from_str(token, "%Y-%m-%d").ok(),
    }
}

/// Whether `text` starts like a manual entry (a date, `today` or `yesterday`).
#[must_use]
pub fn looks_like_entry(text: &str, today: NaiveDate) -> bool {
    text.split_whitespace()
        .next()
        .and_then(|t| resolve_date(t, today))
        .is_some()
}

/// Parse `DATE weight protein carbs fats calories`.
///
/// `-` skips a field, trailing fields may be omitted and unparsable tokens
/// are ignored. Implausible values are dropped and reported in `warnings`.
pub fn parse_manual_entry(text: &str, today: NaiveDate) -> Result<ManualEntry> {
    let parts: Vec<&str> = text.split_whitespace().collect();
    if parts.len() < 2 {
        bail!("{USAGE}");
    }
    let Some(date) = resolve_date(parts[0], today) else {
        bail!("Invalid date format: '{}'. Use YYYY-MM-DD.", parts[0]);
    };

    let mut fields = FieldMap::new();
    for (field, token) in ORDER.iter().zip(&parts[1..]) {
        if *token == "-" {
            continue;
        }
        let Ok(n) = token.parse::<f64>() else {
            continue;
        };
        if !n.is_finite() {
            continue;
        }
        let n = if field.is_integer() { n.trunc() } else { round1(n) };
        fields.insert(*field, Some(Value::Number(n)));
    }
    if fields.is_empty() {
        bail!("No values provided");
    }

    let warnings = drop_out_of_range(date, &mut fields, &MANUAL_LIMITS);
    if fields.is_empty() {
        bail!("No valid values left: {}", warnings.join("; "));
    }
    Ok(ManualEntry {
        date,
        fields,
        warnings,
    })
}
