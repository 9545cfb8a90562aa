use std::process;

use anyhow::Result;
use tabled::{Table, Tabled, settings::Style};

use vitals_core::models::Field;

use crate::app::App;

use super::helpers::{fmt_field, fmt_opt, parse_date, print_days_table, print_json};

pub(crate) async fn cmd_today(app: &App, date: Option<String>, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct FieldRow {
        #[tabled(rename = "Field")]
        field: &'static str,
        #[tabled(rename = "Value")]
        value: String,
    }

    let date = parse_date(date.as_deref(), app.today())?;
    let record = app.call(move |svc| svc.day(date)).await?;

    if json {
        return print_json(&record);
    }
    let Some(record) = record else {
        eprintln!("No data for {date}");
        process::exit(2);
    };

    println!("=== {date} ===\n");
    let rows: Vec<FieldRow> = Field::ALL
        .into_iter()
        .skip(1)
        .filter(|f| f.is_flag() || record.number(*f).is_some())
        .map(|f| FieldRow {
            field: f.header(),
            value: fmt_field(&record, f),
        })
        .collect();
    println!("{}", Table::new(&rows).with(Style::rounded()));
    Ok(())
}

pub(crate) async fn cmd_status(app: &App, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date.as_deref(), app.today())?;
    let status = app.call(move |svc| svc.day_status(date)).await?;

    if json {
        return print_json(&status);
    }
    let mark = |ok: bool| if ok { "✅" } else { "❌" };
    println!("=== {date} ===\n");
    if !status.exists {
        println!("  No row yet.");
        return Ok(());
    }
    println!(
        "  {} Wearable   {}/{} fields",
        mark(status.wearable_fields > 0),
        status.wearable_fields,
        status.wearable_total
    );
    println!(
        "  {} Nutrition  {}/{} fields",
        mark(status.nutrition_logged),
        status.nutrition_fields,
        status.nutrition_total
    );
    println!(
        "\n  {}",
        if status.data_complete {
            "All data logged."
        } else {
            "Incomplete."
        }
    );
    Ok(())
}

pub(crate) async fn cmd_history(app: &App, days: u32, json: bool) -> Result<()> {
    let today = app.today();
    let records = app.call(move |svc| svc.history(today, days)).await?;

    if json {
        return print_json(&records);
    }
    if records.is_empty() {
        eprintln!("No data in the last {days} days");
        return Ok(());
    }
    print_days_table(&records);
    Ok(())
}

pub(crate) async fn cmd_week(app: &App, json: bool) -> Result<()> {
    let today = app.today();
    let view = app.call(move |svc| svc.week(today)).await?;

    if json {
        return print_json(&view);
    }
    println!("=== Week of {} to {} ===\n", view.week_start, view.week_end);
    if view.days.is_empty() {
        println!("  No data logged this week yet.");
        return Ok(());
    }
    print_days_table(&view.days);

    if let Some(s) = &view.summary {
        println!(
            "\n  AVG: {} kcal | P:{}g C:{}g F:{}g | weight {}kg | sleep {}h",
            fmt_opt(s.avg_calories, 0),
            fmt_opt(s.avg_protein_g, 0),
            fmt_opt(s.avg_carbs_g, 0),
            fmt_opt(s.avg_fats_g, 0),
            fmt_opt(s.avg_weight_kg, 1),
            fmt_opt(s.avg_sleep_hours, 1),
        );
        println!(
            "  Nutrition logged {}/7 days ({}%)",
            s.days_logged_nutrition, s.compliance_pct
        );
    }
    Ok(())
}
