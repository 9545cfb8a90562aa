use anyhow::Result;

use crate::app::App;

use super::helpers::print_json;

pub(crate) async fn cmd_sync(app: &App, days: Option<u32>, json: bool) -> Result<()> {
    let days = days.unwrap_or(app.lookback_days);
    let report = app.sync(days).await?;

    if json {
        return print_json(&report);
    }
    println!(
        "Synced {} of {} days from Oura ({} to {}).",
        report.days_updated, report.days_fetched, report.start_date, report.end_date
    );
    Ok(())
}

pub(crate) async fn cmd_check(app: &App, json: bool) -> Result<()> {
    let oura = app.oura()?;
    let records = oura.check(app.today()).await?;

    if json {
        return print_json(&serde_json::json!({ "ok": true, "sleep_records": records }));
    }
    println!("✅ Oura connection OK ({records} sleep records for the last day)");
    Ok(())
}
