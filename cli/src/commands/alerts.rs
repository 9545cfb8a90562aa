use anyhow::Result;

use crate::app::App;

use super::helpers::print_json;

/// Evaluate alerts for today. Alerts already sent today are not repeated.
pub(crate) async fn cmd_alerts(app: &App, nutrition: bool, json: bool) -> Result<()> {
    let today = app.today();
    let alerts = app
        .call(move |svc| svc.check_alerts(today, nutrition))
        .await?;

    if json {
        return print_json(&alerts);
    }
    if alerts.is_empty() {
        println!("No new alerts for {today}.");
        return Ok(());
    }
    for alert in &alerts {
        println!("{} {}", alert.severity.icon(), alert.title);
        for line in alert.message.lines().skip(1) {
            let line = line.replace('*', "").replace('_', "");
            if !line.trim().is_empty() {
                println!("   {line}");
            }
        }
        println!();
    }
    Ok(())
}
