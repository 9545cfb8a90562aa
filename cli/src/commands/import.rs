use std::path::PathBuf;

use anyhow::Result;

use vitals_core::macrofactor;

use crate::app::App;

use super::helpers::print_json;

pub(crate) async fn cmd_import(
    app: &App,
    files: Vec<PathBuf>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    if dry_run {
        let parsed = macrofactor::parse_files(&files)?;
        if json {
            return print_json(&serde_json::json!({
                "dry_run": true,
                "layouts": parsed.layouts,
                "days": parsed.days.len(),
                "nutrition_entries": parsed.nutrition_count(),
                "weight_entries": parsed.weight_count(),
                "goals": parsed.goals.len(),
                "first_date": parsed.days.keys().next(),
                "last_date": parsed.days.keys().next_back(),
                "warnings": parsed.warnings,
            }));
        }
        println!("Dry run — no changes made.\n");
        let layouts: Vec<String> = parsed.layouts.iter().map(ToString::to_string).collect();
        println!("  Layouts:       {}", layouts.join(", "));
        println!("  Days:          {}", parsed.days.len());
        println!("  Nutrition:     {}", parsed.nutrition_count());
        println!("  Weight:        {}", parsed.weight_count());
        println!("  Goals:         {}", parsed.goals.len());
        for w in &parsed.warnings {
            eprintln!("Warning: {w}");
        }
        return Ok(());
    }

    let report = app.call(move |svc| svc.import_files(&files)).await?;
    if json {
        return print_json(&report);
    }
    println!("{}", report.message());
    Ok(())
}

pub(crate) async fn cmd_log(app: &App, entry: &[String], json: bool) -> Result<()> {
    let text = entry.join(" ");
    let today = app.today();
    let recorded = app
        .call(move |svc| svc.record_manual(&text, today))
        .await?;

    if json {
        return print_json(&serde_json::json!({
            "date": recorded.date,
            "confirmation": recorded.confirmation(),
            "warnings": recorded.warnings,
        }));
    }
    println!("{}", recorded.confirmation());
    for w in &recorded.warnings {
        eprintln!("Warning: {w}");
    }
    Ok(())
}
