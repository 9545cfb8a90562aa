use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Columns of the daily ledger, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Date,
    WeightKg,
    TrendWeightKg,
    FatPercent,
    ProteinG,
    CarbsG,
    FatsG,
    Calories,
    Expenditure,
    Steps,
    TotalSleepHours,
    SleepScore,
    DeepSleepMinutes,
    RemSleepMinutes,
    SleepEfficiency,
    ReadinessScore,
    TemperatureDeviation,
    HrvBalance,
    RestingHeartRate,
    ActivityScore,
    NutritionLogged,
    DataComplete,
    NapMinutes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldGroup {
    Identity,
    Wearable,
    Nutrition,
    Derived,
}

impl Field {
    pub const COUNT: usize = 23;

    pub const ALL: [Field; Field::COUNT] = [
        Field::Date,
        Field::WeightKg,
        Field::TrendWeightKg,
        Field::FatPercent,
        Field::ProteinG,
        Field::CarbsG,
        Field::FatsG,
        Field::Calories,
        Field::Expenditure,
        Field::Steps,
        Field::TotalSleepHours,
        Field::SleepScore,
        Field::DeepSleepMinutes,
        Field::RemSleepMinutes,
        Field::SleepEfficiency,
        Field::ReadinessScore,
        Field::TemperatureDeviation,
        Field::HrvBalance,
        Field::RestingHeartRate,
        Field::ActivityScore,
        Field::NutritionLogged,
        Field::DataComplete,
        Field::NapMinutes,
    ];

    /// Position of this column within a row.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn header(self) -> &'static str {
        match self {
            Field::Date => "Date",
            Field::WeightKg => "Weight_kg",
            Field::TrendWeightKg => "Trend_Weight_kg",
            Field::FatPercent => "Fat_Percent",
            Field::ProteinG => "Protein_g",
            Field::CarbsG => "Carbs_g",
            Field::FatsG => "Fats_g",
            Field::Calories => "Calories",
            Field::Expenditure => "Expenditure",
            Field::Steps => "Steps",
            Field::TotalSleepHours => "Total_Sleep_Hours",
            Field::SleepScore => "Sleep_Score",
            Field::DeepSleepMinutes => "Deep_Sleep_Minutes",
            Field::RemSleepMinutes => "REM_Sleep_Minutes",
            Field::SleepEfficiency => "Sleep_Efficiency",
            Field::ReadinessScore => "Readiness_Score",
            Field::TemperatureDeviation => "Temperature_Deviation",
            Field::HrvBalance => "HRV_Balance",
            Field::RestingHeartRate => "Resting_Heart_Rate",
            Field::ActivityScore => "Activity_Score",
            Field::NutritionLogged => "Nutrition_Logged",
            Field::DataComplete => "Data_Complete",
            Field::NapMinutes => "Nap_Minutes",
        }
    }

    #[must_use]
    pub fn from_header(header: &str) -> Option<Field> {
        Field::ALL
            .into_iter()
            .find(|f| f.header().eq_ignore_ascii_case(header.trim()))
    }

    /// SQL column name in the `daily_log` table.
    #[must_use]
    pub fn column(self) -> String {
        self.header().to_ascii_lowercase()
    }

    #[must_use]
    pub fn group(self) -> FieldGroup {
        match self {
            Field::Date => FieldGroup::Identity,
            Field::WeightKg
            | Field::TrendWeightKg
            | Field::FatPercent
            | Field::ProteinG
            | Field::CarbsG
            | Field::FatsG
            | Field::Calories
            | Field::Expenditure => FieldGroup::Nutrition,
            Field::NutritionLogged | Field::DataComplete => FieldGroup::Derived,
            _ => FieldGroup::Wearable,
        }
    }

    /// Whole-unit columns (scores, counts, kcal). Everything else numeric keeps one decimal.
    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Field::Calories
                | Field::Expenditure
                | Field::Steps
                | Field::SleepScore
                | Field::DeepSleepMinutes
                | Field::RemSleepMinutes
                | Field::SleepEfficiency
                | Field::ReadinessScore
                | Field::RestingHeartRate
                | Field::ActivityScore
                | Field::NapMinutes
        )
    }

    #[must_use]
    pub fn is_flag(self) -> bool {
        self.group() == FieldGroup::Derived
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// Producer category; decides which ledger columns a write may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Wearable,
    Nutrition,
}

const WEARABLE_FIELDS: [Field; 12] = [
    Field::Steps,
    Field::TotalSleepHours,
    Field::SleepScore,
    Field::DeepSleepMinutes,
    Field::RemSleepMinutes,
    Field::SleepEfficiency,
    Field::ReadinessScore,
    Field::TemperatureDeviation,
    Field::HrvBalance,
    Field::RestingHeartRate,
    Field::ActivityScore,
    Field::NapMinutes,
];

const NUTRITION_FIELDS: [Field; 8] = [
    Field::WeightKg,
    Field::TrendWeightKg,
    Field::FatPercent,
    Field::ProteinG,
    Field::CarbsG,
    Field::FatsG,
    Field::Calories,
    Field::Expenditure,
];

impl Source {
    /// Accepts the names used across the pipelines. Anything else has no columns.
    #[must_use]
    pub fn parse(name: &str) -> Option<Source> {
        match name.trim().to_lowercase().as_str() {
            "oura" | "wearable" => Some(Source::Wearable),
            "nutrition" | "macrofactor" | "manual" => Some(Source::Nutrition),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Wearable => "oura",
            Source::Nutrition => "nutrition",
        }
    }

    #[must_use]
    pub fn allowed_fields(self) -> &'static [Field] {
        match self {
            Source::Wearable => &WEARABLE_FIELDS,
            Source::Nutrition => &NUTRITION_FIELDS,
        }
    }

    /// Date is always writable; it only ever keys the row.
    #[must_use]
    pub fn allows(self, field: Field) -> bool {
        field == Field::Date || self.allowed_fields().contains(&field)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single ledger cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Flag(bool),
    Text(String),
}

impl Value {
    /// Empty text counts as absent for merging.
    #[must_use]
    pub fn is_present(&self) -> bool {
        match self {
            Value::Text(s) => !s.trim().is_empty(),
            Value::Number(n) => n.is_finite(),
            Value::Flag(_) => true,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) if n.is_finite() => Some(*n),
            Value::Number(_) => None,
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            Value::Flag(b) => Some(if *b { 1.0 } else { 0.0 }),
        }
    }

    #[must_use]
    pub fn as_flag(&self) -> bool {
        match self {
            Value::Flag(b) => *b,
            Value::Text(s) => s.trim().eq_ignore_ascii_case("true"),
            Value::Number(n) => *n != 0.0,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    #[allow(clippy::cast_precision_loss)]
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Flag(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

/// Full-width ledger row, indexed by [`Field::index`].
pub type Row = Vec<Option<Value>>;

/// Incoming values from a producer. A `None` value never erases anything.
pub type FieldMap = BTreeMap<Field, Option<Value>>;

#[must_use]
pub fn blank_row() -> Row {
    vec![None; Field::COUNT]
}

/// True when the cell holds something other than empty/zero.
#[must_use]
pub fn is_nonzero(cell: Option<&Value>) -> bool {
    match cell {
        None => false,
        Some(v) if !v.is_present() => false,
        Some(Value::Text(s)) => s.trim().parse::<f64>().map_or(true, |n| n != 0.0),
        Some(v) => v.as_f64().is_some_and(|n| n != 0.0),
    }
}

/// Read view over one ledger row.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub row: Row,
}

impl DailyRecord {
    #[must_use]
    pub fn new(date: NaiveDate, mut row: Row) -> Self {
        row.resize(Field::COUNT, None);
        DailyRecord { date, row }
    }

    #[must_use]
    pub fn get(&self, field: Field) -> Option<&Value> {
        self.row.get(field.index()).and_then(Option::as_ref)
    }

    #[must_use]
    pub fn number(&self, field: Field) -> Option<f64> {
        self.get(field)
            .filter(|v| v.is_present())
            .and_then(Value::as_f64)
    }

    #[must_use]
    pub fn flag(&self, field: Field) -> bool {
        self.get(field).is_some_and(Value::as_flag)
    }

    #[must_use]
    pub fn nutrition_logged(&self) -> bool {
        self.flag(Field::NutritionLogged)
    }

    #[must_use]
    pub fn data_complete(&self) -> bool {
        self.flag(Field::DataComplete)
    }
}

impl Serialize for DailyRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("Date", &self.date.format("%Y-%m-%d").to_string())?;
        for field in Field::ALL.into_iter().skip(1) {
            if field.is_flag() {
                map.serialize_entry(field.header(), &self.flag(field))?;
                continue;
            }
            let Some(n) = self.number(field) else {
                continue;
            };
            if field.is_integer() {
                map.serialize_entry(field.header(), &(n.round() as i64))?;
            } else {
                map.serialize_entry(field.header(), &round1(n))?;
            }
        }
        map.end()
    }
}

#[must_use]
pub fn round1(n: f64) -> f64 {
    (n * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeeklySummary {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub week_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_weight_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_trend_weight_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_protein_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_carbs_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_fats_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_calories: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_steps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_sleep_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_sleep_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_deep_sleep_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_rem_sleep_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_readiness_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_hrv_balance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_resting_hr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_activity_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_nap_minutes: Option<f64>,
    pub days_logged_nutrition: u32,
    pub days_logged_total: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_change_kg: Option<f64>,
    pub compliance_pct: u32,
}

pub const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Per-weekday macro targets. `day_of_week` is 0 = Monday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub day_of_week: i64,
    pub weekday: String,
    pub target_calories: Option<i64>,
    pub target_protein_g: Option<i64>,
    pub target_carbs_g: Option<i64>,
    pub target_fats_g: Option<i64>,
    pub target_weight_kg: Option<f64>,
    pub last_updated: NaiveDate,
}

/// Resolve a weekday name ("mon", "Monday") or index (0-6) to 0 = Monday.
#[must_use]
pub fn parse_weekday(raw: &str) -> Option<i64> {
    let s = raw.trim().to_lowercase();
    if let Ok(n) = s.parse::<f64>() {
        let n = n as i64;
        return (0..7).contains(&n).then_some(n);
    }
    if s.len() < 3 {
        return None;
    }
    WEEKDAYS
        .iter()
        .position(|w| w.to_lowercase().starts_with(&s))
        .map(|i| i as i64)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiSummaryRecord {
    pub date: NaiveDate,
    pub summary_text: String,
    pub week_number: u32,
}

// --- Data quality ---

/// Plausibility bounds for nutrition-owned values.
#[derive(Debug, Clone, Copy)]
pub struct NutritionLimits {
    pub weight_kg: (f64, f64),
    pub calories: (f64, f64),
    pub protein_max: f64,
    pub fat_percent: (f64, f64),
}

pub const IMPORT_LIMITS: NutritionLimits = NutritionLimits {
    weight_kg: (40.0, 200.0),
    calories: (0.0, 10_000.0),
    protein_max: 500.0,
    fat_percent: (1.0, 60.0),
};

pub const MANUAL_LIMITS: NutritionLimits = NutritionLimits {
    weight_kg: (40.0, 200.0),
    calories: (0.0, 5_000.0),
    protein_max: 500.0,
    fat_percent: (1.0, 60.0),
};

/// Drop implausible values from `fields`, returning one warning per dropped field.
pub fn drop_out_of_range(
    date: NaiveDate,
    fields: &mut FieldMap,
    limits: &NutritionLimits,
) -> Vec<String> {
    let mut warnings = Vec::new();
    fields.retain(|field, value| {
        let Some(n) = value.as_ref().and_then(Value::as_f64) else {
            return true;
        };
        let problem = match field {
            Field::WeightKg if !(limits.weight_kg.0..=limits.weight_kg.1).contains(&n) => Some(
                format!(
                    "Weight {n}kg outside {}-{}",
                    limits.weight_kg.0, limits.weight_kg.1
                ),
            ),
            Field::Calories if !(limits.calories.0..=limits.calories.1).contains(&n) => Some(
                format!(
                    "Calories {n} outside {}-{}",
                    limits.calories.0, limits.calories.1
                ),
            ),
            Field::ProteinG if n > limits.protein_max => {
                Some(format!("Protein {n}g exceeds {}g", limits.protein_max))
            }
            Field::FatPercent if !(limits.fat_percent.0..=limits.fat_percent.1).contains(&n) => {
                Some(format!(
                    "Fat {n}% outside {}-{}",
                    limits.fat_percent.0, limits.fat_percent.1
                ))
            }
            _ => None,
        };
        match problem {
            Some(msg) => {
                tracing::warn!(%date, field = %field, "{msg}, dropping value");
                warnings.push(msg);
                false
            }
            None => true,
        }
    });
    warnings
}
