//! Chat replies. Telegram "Markdown" flavour: `*bold*`, `_italic_`, backticks.

use chrono::NaiveDate;

use vitals_core::manual::{ManualEntry, USAGE};
use vitals_core::models::{AiSummaryRecord, DailyRecord, Field, Goal};
use vitals_core::service::{SyncReport, WeekView};

pub const START: &str = "👋 *Health Dashboard Bot*\n\n\
I track your health data from Oura Ring and MacroFactor.\n\n\
📤 *Send a MacroFactor .xlsx or .csv export* to import nutrition data\n\
📝 *Send a manual entry:*\n\
`YYYY-MM-DD weight protein carbs fats calories`\n\
Use `-` to skip a field\n\n\
📋 *Commands:*\n\
/status — Today's data completeness\n\
/today — Full stats for today\n\
/week — This week's summary\n\
/goals — Current macro targets\n\
/summary — AI health summary\n\
/sync — Pull the latest Oura data\n\
/help — All commands";

pub const HELP: &str = "📋 *Available Commands*\n\n\
/start — Welcome & quick instructions\n\
/status — Today's data completeness\n\
/today — Full stats for today\n\
/week — This week's summary so far\n\
/goals — Current macro/calorie targets\n\
/summary — AI-powered health summary\n\
/sync — Pull the latest Oura data now\n\
/help — This help message\n\n\
📤 *File Upload:* Send a MacroFactor `.xlsx` or `.csv` export\n\
📝 *Manual Entry:*\n\
`YYYY-MM-DD weight protein carbs fats calories`\n\
Example: `2026-02-09 73 180 200 70 2100`\n\
Use `-` to skip: `2026-02-09 73 - - - -` (weight only)";

pub const UNKNOWN_TEXT: &str = "🤔 I don't understand that.\n\n\
To enter data manually:\n\
`YYYY-MM-DD weight protein carbs fats calories`\n\
Example: `2026-02-09 73 180 200 70 2100`\n\n\
Or send a MacroFactor `.xlsx` or `.csv` export.\n\
Type /help for all commands.";

pub const UNAUTHORIZED: &str = "⛔ Unauthorized. This is a private bot.";

pub fn score_emoji(score: f64) -> &'static str {
    if score >= 80.0 {
        "🟢"
    } else if score >= 60.0 {
        "🟡"
    } else {
        "🔴"
    }
}

/// `8500` → `8,500`.
pub fn thousands(n: f64) -> String {
    let n = n.round() as i64;
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if n < 0 {
        out.insert(0, '-');
    }
    out
}

fn signed(v: f64) -> String {
    if v > 0.0 { format!("+{v}") } else { format!("{v}") }
}

pub fn format_status(date: NaiveDate, record: Option<&DailyRecord>) -> String {
    let Some(record) = record else {
        return format!(
            "📅 *{date}*\n\n❌ No data logged yet today.\n\n\
             Oura data syncs automatically at 10am, 6pm, midnight.\n\
             Send a MacroFactor export to add nutrition."
        );
    };

    let has = |f: Field| record.number(f).is_some_and(|v| v != 0.0);
    let checks = [
        (has(Field::SleepScore), "Oura Data (sleep, readiness, activity)", "Oura (sleep/readiness/activity)"),
        (has(Field::Calories), "Nutrition (calories & macros)", "Nutrition (calories/macros)"),
        (has(Field::WeightKg), "Weight", "Weight"),
    ];

    let mut lines = vec![format!("📅 *{date}*\n")];
    let mut missing = Vec::new();
    for (ok, label, short) in checks {
        lines.push(format!("{} {label}", if ok { "✅" } else { "❌" }));
        if !ok {
            missing.push(short);
        }
    }
    lines.push(String::new());
    if missing.is_empty() {
        lines.push("✅ All data logged!".to_string());
    } else {
        lines.push(format!("⚠️ Missing: {}", missing.join(", ")));
    }
    lines.join("\n")
}

#[allow(clippy::too_many_lines)]
pub fn format_day(date: NaiveDate, record: Option<&DailyRecord>) -> String {
    let Some(r) = record else {
        return format!("📅 *{date}*\n\nNo data yet. Oura syncs at 10am/6pm/midnight.");
    };
    let mut lines = vec![format!("📅 *{date}*\n")];

    for (field, label) in [
        (Field::SleepScore, "Sleep"),
        (Field::ReadinessScore, "Readiness"),
        (Field::ActivityScore, "Activity"),
    ] {
        if let Some(score) = r.number(field) {
            lines.push(format!("{} {label}: *{score:.0}*", score_emoji(score)));
        }
    }

    if let Some(hours) = r.number(Field::TotalSleepHours) {
        lines.push(format!("\n😴 *Sleep:* {hours}h"));
        let mut parts = Vec::new();
        if let Some(deep) = r.number(Field::DeepSleepMinutes) {
            parts.push(format!("Deep {deep:.0}min"));
        }
        if let Some(rem) = r.number(Field::RemSleepMinutes) {
            parts.push(format!("REM {rem:.0}min"));
        }
        if let Some(eff) = r.number(Field::SleepEfficiency) {
            parts.push(format!("Efficiency {eff}%"));
        }
        if !parts.is_empty() {
            lines.push(format!("   {}", parts.join(" · ")));
        }
        if let Some(nap) = r.number(Field::NapMinutes).filter(|n| *n > 0.0) {
            lines.push(format!("   💤 Nap: {nap:.0}min"));
        }
    }

    let mut body = Vec::new();
    if let Some(steps) = r.number(Field::Steps) {
        body.push(format!("🚶 Steps: *{}*", thousands(steps)));
    }
    if let Some(rhr) = r.number(Field::RestingHeartRate) {
        body.push(format!("❤️ RHR: *{rhr:.0}* bpm"));
    }
    if let Some(hrv) = r.number(Field::HrvBalance) {
        body.push(format!("📈 HRV: *{hrv}*"));
    }
    if let Some(temp) = r.number(Field::TemperatureDeviation) {
        body.push(format!("🌡️ Temp: *{}°*", signed(temp)));
    }
    if !body.is_empty() {
        lines.push(String::new());
        lines.extend(body);
    }

    let weight = r.number(Field::WeightKg);
    let calories = r.number(Field::Calories);
    let protein = r.number(Field::ProteinG);
    if weight.is_some() || calories.is_some() || protein.is_some() {
        lines.push(String::new());
        lines.push("🍽️ *Nutrition*".to_string());
        if let Some(w) = weight {
            let mut s = format!("⚖️ Weight: *{w}kg*");
            if let Some(t) = r.number(Field::TrendWeightKg) {
                s.push_str(&format!(" (trend: {t}kg)"));
            }
            lines.push(s);
        }
        if let Some(cal) = calories {
            let mut s = format!("🔥 Calories: *{cal:.0}*");
            if let Some(tdee) = r.number(Field::Expenditure) {
                s.push_str(&format!(" (TDEE: {tdee:.0}, {})", signed(cal - tdee)));
            }
            lines.push(s);
        }
        let macros: Vec<String> = [
            (Field::ProteinG, "P"),
            (Field::CarbsG, "C"),
            (Field::FatsG, "F"),
        ]
        .into_iter()
        .filter_map(|(f, suffix)| r.number(f).map(|v| format!("*{v:.0}*{suffix}")))
        .collect();
        if !macros.is_empty() {
            lines.push(format!("📊 Macros: {}", macros.join(" · ")));
        }
    }

    lines.join("\n")
}

/// Week so far. `today` bounds the "days with data" denominator.
pub fn format_week(view: &WeekView, today: NaiveDate) -> String {
    let monday = view.week_start;
    let Some(s) = view.summary.as_ref().filter(|_| !view.days.is_empty()) else {
        return format!("📊 *Week of {monday}*\n\nNo data logged this week yet.");
    };
    let mut lines = vec![format!("📊 *Week of {monday} → {}*\n", view.week_end)];

    for (avg, label) in [
        (s.avg_sleep_score, "Avg Sleep Score"),
        (s.avg_readiness_score, "Avg Readiness"),
        (s.avg_activity_score, "Avg Activity"),
    ] {
        if let Some(v) = avg {
            lines.push(format!("{} {label}: *{v:.0}*", score_emoji(v)));
        }
    }
    if let Some(h) = s.avg_sleep_hours {
        lines.push(format!("\n😴 Avg Sleep: *{h}h*"));
    }
    if let Some(nap) = s.avg_nap_minutes.filter(|n| *n > 0.0) {
        lines.push(format!("💤 Avg Nap: *{nap:.0}min*"));
    }
    if let Some(steps) = s.avg_steps {
        lines.push(format!("🚶 Avg Steps: *{}*", thousands(steps)));
    }

    let weights: Vec<f64> = view
        .days
        .iter()
        .filter_map(|d| d.number(Field::WeightKg))
        .collect();
    if let (Some(first), Some(last)) = (weights.first(), weights.last()) {
        lines.push(format!("\n⚖️ Weight: *{last}kg*"));
        if weights.len() > 1 {
            let change = ((last - first) * 10.0).round() / 10.0;
            lines.push(format!("   Week change: {}kg", signed(change)));
        }
    }

    if let Some(cal) = s.avg_calories {
        lines.push(format!("\n🔥 Avg Calories: *{cal:.0}*"));
    }
    let macros: Vec<String> = [
        (s.avg_protein_g, "P"),
        (s.avg_carbs_g, "C"),
        (s.avg_fats_g, "F"),
    ]
    .into_iter()
    .filter_map(|(v, suffix)| v.map(|v| format!("*{v:.0}*{suffix}")))
    .collect();
    if !macros.is_empty() {
        lines.push(format!("📊 Avg Macros: {}", macros.join(" · ")));
    }

    let elapsed = (today.min(view.week_end) - monday).num_days() + 1;
    lines.push(format!(
        "\n📋 Nutrition logged: *{}/7 days* ({}%)",
        s.days_logged_nutrition, s.compliance_pct
    ));
    lines.push(format!("📅 Days with data: *{}/{elapsed}*", view.days.len()));
    lines.join("\n")
}

pub fn format_goals(goals: &[Goal]) -> String {
    if goals.is_empty() {
        return "🎯 *No goals set yet.*\n\n\
                Upload a MacroFactor Program Settings export to set targets."
            .to_string();
    }
    let show = |v: Option<i64>| v.map_or_else(|| "—".to_string(), |n| n.to_string());
    let mut lines = vec!["🎯 *Current Macro Targets*\n".to_string()];
    for g in goals {
        let day: String = g.weekday.chars().take(3).collect();
        lines.push(format!(
            "*{day}:* {}cal | {}P {}C {}F",
            show(g.target_calories),
            show(g.target_protein_g),
            show(g.target_carbs_g),
            show(g.target_fats_g),
        ));
    }
    if let Some(updated) = goals.iter().map(|g| g.last_updated).max() {
        lines.push(format!("\n_Last updated: {updated}_"));
    }
    lines.join("\n")
}

pub fn format_manual(entry: &ManualEntry) -> String {
    let mut text = entry.confirmation();
    if !entry.warnings.is_empty() {
        text.push_str("\n\n");
        text.push_str(
            &entry
                .warnings
                .iter()
                .map(|w| format!("⚠️ {w}"))
                .collect::<Vec<_>>()
                .join("\n"),
        );
    }
    text
}

pub fn format_manual_error(err: &anyhow::Error) -> String {
    let msg = err.to_string();
    if msg.contains(USAGE) {
        format!("❌ {msg}")
    } else {
        format!("❌ {msg}\n\n{USAGE}")
    }
}

pub fn format_sync(report: &SyncReport) -> String {
    format!(
        "🔄 Synced {} of {} days ({} → {}).",
        report.days_updated, report.days_fetched, report.start_date, report.end_date
    )
}

pub fn format_summary(record: &AiSummaryRecord) -> String {
    format!("📊 *Weekly Health Summary*\n\n{}", record.summary_text)
}
