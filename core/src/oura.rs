use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::models::{Field, FieldMap, Value, is_nonzero, round1};

/// One page of a usercollection endpoint.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
    #[serde(default)]
    pub data: Vec<T>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailySleep {
    pub day: NaiveDate,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadinessContributors {
    pub hrv_balance: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailyReadiness {
    pub day: NaiveDate,
    pub score: Option<f64>,
    pub temperature_deviation: Option<f64>,
    #[serde(default)]
    pub contributors: ReadinessContributors,
    pub resting_heart_rate: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailyActivity {
    pub day: NaiveDate,
    pub score: Option<f64>,
    pub steps: Option<f64>,
}

/// A single sleep period. A day can have several (main sleep plus naps).
#[derive(Debug, Clone, Deserialize)]
pub struct SleepSession {
    pub day: NaiveDate,
    pub total_sleep_duration: Option<f64>,
    pub deep_sleep_duration: Option<f64>,
    pub rem_sleep_duration: Option<f64>,
    pub efficiency: Option<f64>,
    pub lowest_heart_rate: Option<f64>,
}

/// Everything fetched for one sync window.
#[derive(Debug, Clone, Default)]
pub struct WearablePayload {
    pub daily_sleep: Vec<DailySleep>,
    pub readiness: Vec<DailyReadiness>,
    pub activity: Vec<DailyActivity>,
    pub sessions: Vec<SleepSession>,
}

fn set(fields: &mut FieldMap, field: Field, value: Option<f64>) {
    if let Some(v) = value.filter(|v| v.is_finite()) {
        fields.insert(field, Some(Value::Number(v)));
    }
}

fn seconds_to_minutes(seconds: Option<f64>) -> Option<f64> {
    seconds.map(|s| (s / 60.0).round())
}

fn apply_sessions(fields: &mut FieldMap, sessions: &[&SleepSession]) {
    let duration = |s: &SleepSession| s.total_sleep_duration.unwrap_or(0.0);
    // Longest session is the main sleep; the earliest listed wins a tie.
    let Some(primary) = sessions
        .iter()
        .copied()
        .reduce(|best, s| if duration(s) > duration(best) { s } else { best })
    else {
        return;
    };

    let primary_secs = duration(primary);
    if primary_secs > 0.0 {
        set(fields, Field::TotalSleepHours, Some(round1(primary_secs / 3600.0)));
    }
    set(fields, Field::DeepSleepMinutes, seconds_to_minutes(primary.deep_sleep_duration));
    set(fields, Field::RemSleepMinutes, seconds_to_minutes(primary.rem_sleep_duration));
    set(fields, Field::SleepEfficiency, primary.efficiency);

    let nap_secs: f64 = sessions
        .iter()
        .filter(|s| !std::ptr::eq(**s, primary))
        .map(|s| duration(*s))
        .sum();
    set(fields, Field::NapMinutes, Some((nap_secs / 60.0).round()));

    let has_resting = fields
        .get(&Field::RestingHeartRate)
        .is_some_and(|v| is_nonzero(v.as_ref()));
    if !has_resting {
        set(
            fields,
            Field::RestingHeartRate,
            primary.lowest_heart_rate.filter(|hr| *hr > 0.0),
        );
    }
}

/// Fold the four endpoints into per-day wearable fields.
///
/// Only days within `start..=end` that end up with at least one value are returned.
#[must_use]
pub fn merge_days(
    start: NaiveDate,
    end: NaiveDate,
    payload: &WearablePayload,
) -> BTreeMap<NaiveDate, FieldMap> {
    let in_range = |day: NaiveDate| day >= start && day <= end;
    let mut days: BTreeMap<NaiveDate, FieldMap> = BTreeMap::new();

    for item in payload.daily_sleep.iter().filter(|i| in_range(i.day)) {
        set(days.entry(item.day).or_default(), Field::SleepScore, item.score);
    }

    for item in payload.readiness.iter().filter(|i| in_range(i.day)) {
        let fields = days.entry(item.day).or_default();
        set(fields, Field::ReadinessScore, item.score);
        set(fields, Field::TemperatureDeviation, item.temperature_deviation);
        set(fields, Field::HrvBalance, item.contributors.hrv_balance);
        set(fields, Field::RestingHeartRate, item.resting_heart_rate);
    }

    for item in payload.activity.iter().filter(|i| in_range(i.day)) {
        let fields = days.entry(item.day).or_default();
        set(fields, Field::Steps, item.steps);
        set(fields, Field::ActivityScore, item.score);
    }

    let mut by_day: BTreeMap<NaiveDate, Vec<&SleepSession>> = BTreeMap::new();
    for session in payload.sessions.iter().filter(|s| in_range(s.day)) {
        by_day.entry(session.day).or_default().push(session);
    }
    for (day, sessions) in &by_day {
        apply_sessions(days.entry(*day).or_default(), sessions);
    }

    days.retain(|_, fields| !fields.is_empty());
    days
}
