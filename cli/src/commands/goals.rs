use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use vitals_core::models::Goal;
use vitals_core::service::VitalsService;

use crate::app::App;

use super::helpers::{fmt_opt, print_json};

fn show(v: Option<i64>) -> String {
    v.map_or_else(|| "-".to_string(), |n| n.to_string())
}

pub(crate) async fn cmd_goals(app: &App, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct GoalRow {
        #[tabled(rename = "Day")]
        day: String,
        #[tabled(rename = "Calories")]
        calories: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
        #[tabled(rename = "Weight")]
        weight: String,
        #[tabled(rename = "Updated")]
        updated: String,
    }

    let goals: Vec<Goal> = app.call(VitalsService::goals).await?;

    if json {
        return print_json(&goals);
    }
    if goals.is_empty() {
        println!("No targets set. Import a MacroFactor Program Settings export.");
        return Ok(());
    }

    let rows: Vec<GoalRow> = goals
        .iter()
        .map(|g| GoalRow {
            day: g.weekday.clone(),
            calories: show(g.target_calories),
            protein: show(g.target_protein_g),
            carbs: show(g.target_carbs_g),
            fat: show(g.target_fats_g),
            weight: fmt_opt(g.target_weight_kg, 1),
            updated: g.last_updated.to_string(),
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..6)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}
