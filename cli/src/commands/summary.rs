use std::process;

use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use crate::app::App;

use super::helpers::{fmt_opt, print_json};

/// Generate a fresh AI summary, or print today's stored one with `latest`.
pub(crate) async fn cmd_summary(app: &App, latest: bool, json: bool) -> Result<()> {
    let record = if latest {
        let today = app.today();
        match app.call(move |svc| svc.latest_summary(today)).await? {
            Some(r) => r,
            None => {
                eprintln!("No summary stored for today");
                process::exit(2);
            }
        }
    } else {
        app.generate_summary().await?
    };

    if json {
        return print_json(&record);
    }
    println!("=== Week {} summary ({}) ===\n", record.week_number, record.date);
    println!("{}", record.summary_text);
    Ok(())
}

pub(crate) async fn cmd_weekly(app: &App, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct WeekRow {
        #[tabled(rename = "Week")]
        week: String,
        #[tabled(rename = "Weight")]
        weight: String,
        #[tabled(rename = "Δ kg")]
        change: String,
        #[tabled(rename = "Calories")]
        calories: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Sleep h")]
        sleep: String,
        #[tabled(rename = "Ready")]
        readiness: String,
        #[tabled(rename = "Steps")]
        steps: String,
        #[tabled(rename = "Logged")]
        logged: String,
    }

    let today = app.today();
    let weeks = app.call(move |svc| svc.update_weekly(today)).await?;

    if json {
        return print_json(&weeks);
    }
    if weeks.is_empty() {
        eprintln!("No daily data to roll up");
        return Ok(());
    }

    let rows: Vec<WeekRow> = weeks
        .iter()
        .map(|w| WeekRow {
            week: format!("{} W{:02}", w.week_start, w.week_number),
            weight: fmt_opt(w.avg_weight_kg, 1),
            change: fmt_opt(w.weight_change_kg, 2),
            calories: fmt_opt(w.avg_calories, 0),
            protein: fmt_opt(w.avg_protein_g, 0),
            sleep: fmt_opt(w.avg_sleep_hours, 1),
            readiness: fmt_opt(w.avg_readiness_score, 0),
            steps: fmt_opt(w.avg_steps, 0),
            logged: format!("{}/7 ({}%)", w.days_logged_nutrition, w.compliance_pct),
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}
