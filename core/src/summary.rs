use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::dates::{iso_week, lookback};
use crate::db::Database;
use crate::ledger::Ledger;
use crate::models::{AiSummaryRecord, DailyRecord, Goal, WeeklySummary};

/// Opaque text generation, e.g. a hosted language model.
pub trait SummaryGenerator {
    fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryContext {
    pub today: NaiveDate,
    pub week: Vec<DailyRecord>,
    pub month: Vec<DailyRecord>,
    pub goals: Vec<Goal>,
    pub previous_weeks: Vec<WeeklySummary>,
}

const PROMPT_TEMPLATE: &str = "You are a concise health analyst. Analyze the following health data and provide:

1. **This Week (7-day):** Key highlights. What went well, what needs attention. Compare actuals vs targets.
2. **Monthly Trend (30-day):** Are things improving, declining, or stable? Focus on weight trend, sleep quality, and nutrition compliance.
3. **Correlations:** Any patterns you notice (e.g., sleep quality vs nutrition, HRV vs activity).
4. **Action Items:** 2-3 specific, actionable recommendations for next week.

Keep it under 300 words. Be direct, no fluff. Use bullet points sparingly; prefer short sentences.

Data (last 7 days):
{data}

Monthly data (last 30 days):
{month_data}

Targets:
{targets}

Previous week summaries:
{prev_weeks}";

pub fn gather_context(db: &Database, today: NaiveDate) -> Result<SummaryContext> {
    let ledger = Ledger::new(db);
    let (week_start, _) = lookback(today, 7);
    let (month_start, _) = lookback(today, 30);
    Ok(SummaryContext {
        today,
        week: ledger.rows_in_range(week_start, today)?,
        month: ledger.rows_in_range(month_start, today)?,
        goals: db.get_goals()?,
        previous_weeks: db.get_recent_weekly_summaries(4)?,
    })
}

pub fn build_prompt(context: &SummaryContext) -> Result<String> {
    Ok(PROMPT_TEMPLATE
        .replace("{data}", &serde_json::to_string_pretty(&context.week)?)
        .replace("{month_data}", &serde_json::to_string_pretty(&context.month)?)
        .replace("{targets}", &serde_json::to_string_pretty(&context.goals)?)
        .replace(
            "{prev_weeks}",
            &serde_json::to_string_pretty(&context.previous_weeks)?,
        ))
}

/// Gather the context for `today` and render it as a prompt.
pub fn prompt_for(db: &Database, today: NaiveDate) -> Result<String> {
    build_prompt(&gather_context(db, today)?)
}

/// Store `text` as the summary for `today`, replacing any earlier one.
pub fn store_summary(db: &Database, today: NaiveDate, text: &str) -> Result<AiSummaryRecord> {
    let text = text.trim();
    if text.is_empty() {
        bail!("language model returned an empty summary");
    }
    let record = AiSummaryRecord {
        date: today,
        summary_text: text.to_string(),
        week_number: iso_week(today),
    };
    db.upsert_ai_summary(&record)?;
    info!(date = %today, chars = record.summary_text.len(), "stored AI summary");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Field, FieldMap, Source, Value};
    use crate::retry::RetryPolicy;
    use std::cell::RefCell;
    use std::time::Duration;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    struct Canned {
        reply: String,
        seen: RefCell<Vec<String>>,
    }

    impl SummaryGenerator for Canned {
        fn generate(&self, prompt: &str) -> Result<String> {
            self.seen.borrow_mut().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    fn canned(reply: &str) -> Canned {
        Canned {
            reply: reply.to_string(),
            seen: RefCell::new(Vec::new()),
        }
    }

    fn seed(db: &Database) {
        let ledger = Ledger::new(db)
            .with_retry(RetryPolicy::none())
            .with_pacing(Duration::ZERO);
        for (date, kcal) in [("2026-01-20", 1900.0), ("2026-02-05", 2000.0), ("2026-02-09", 2100.0)] {
            let mut f = FieldMap::new();
            f.insert(Field::Calories, Some(Value::Number(kcal)));
            ledger.upsert(date, &f, Source::Nutrition).unwrap();
        }
    }

    #[test]
    fn test_gather_context_windows() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let ctx = gather_context(&db, d("2026-02-09")).unwrap();
        assert_eq!(ctx.week.len(), 2);
        assert_eq!(ctx.month.len(), 3);
        assert!(ctx.goals.is_empty());
    }

    #[test]
    fn test_prompt_embeds_json_sections() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let ctx = gather_context(&db, d("2026-02-09")).unwrap();
        let prompt = build_prompt(&ctx).unwrap();
        assert!(prompt.contains("Keep it under 300 words"));
        assert!(prompt.contains("\"Calories\": 2100"));
        assert!(prompt.contains("Targets:\n[]"));
        assert!(!prompt.contains("{data}"));
    }

    fn summarize(db: &Database, today: NaiveDate, generator: &Canned) -> Result<AiSummaryRecord> {
        let prompt = prompt_for(db, today)?;
        let text = generator.generate(&prompt)?;
        store_summary(db, today, &text)
    }

    #[test]
    fn test_summary_overwrites_same_day() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let first = canned("Good week.");
        summarize(&db, d("2026-02-09"), &first).unwrap();
        assert_eq!(first.seen.borrow().len(), 1);
        assert!(first.seen.borrow()[0].contains("\"Calories\": 2100"));

        let record = summarize(&db, d("2026-02-09"), &canned("  Better week.  ")).unwrap();
        assert_eq!(record.summary_text, "Better week.");
        assert_eq!(record.week_number, 7);
        assert_eq!(db.count_ai_summaries().unwrap(), 1);
        assert_eq!(
            db.get_ai_summary(d("2026-02-09")).unwrap().unwrap().summary_text,
            "Better week."
        );
    }

    #[test]
    fn test_empty_summary_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        assert!(summarize(&db, d("2026-02-09"), &canned("   ")).is_err());
        assert_eq!(db.count_ai_summaries().unwrap(), 0);
    }
}
