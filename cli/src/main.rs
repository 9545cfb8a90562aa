mod anthropic;
mod app;
mod commands;
mod config;
mod messages;
mod oura;
mod scheduler;
mod telegram;

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::commands::{
    cmd_alerts, cmd_check, cmd_goals, cmd_history, cmd_import, cmd_log, cmd_status, cmd_summary,
    cmd_sync, cmd_today, cmd_week, cmd_weekly,
};
use crate::config::Config;
use crate::scheduler::Scheduler;
use crate::telegram::{Bot, Notifier, TelegramApi};

#[derive(Parser)]
#[command(
    name = "vitals",
    version,
    about = "Personal health dashboard",
    long_about = "Personal health dashboard.\n\n\
        Pulls sleep, readiness and activity from Oura, imports MacroFactor exports, \
        keeps one row per day in SQLite and reports on it from the terminal or Telegram."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull recent days from Oura into the ledger
    Sync {
        /// Days to look back (default: SYNC_LOOKBACK_DAYS or 7)
        #[arg(short, long)]
        days: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import MacroFactor exports (.xlsx workbooks or per-sheet CSVs)
    Import {
        /// One or more exported .xlsx or .csv files
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Parse and preview without writing
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record a manual entry: DATE WEIGHT PROTEIN CARBS FATS CALORIES ('-' skips)
    Log {
        /// Date (YYYY-MM-DD, today or yesterday) followed by values
        #[arg(required = true, num_args = 1..)]
        entry: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show every recorded value for a day
    Today {
        /// Date to show (YYYY-MM-DD, today or yesterday)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show which sources have reported for a day
    Status {
        /// Date to check (YYYY-MM-DD, today or yesterday)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the last N days
    History {
        /// Number of days to show
        #[arg(short, long, default_value = "7")]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the current Monday-to-Sunday week
    Week {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Recompute and show weekly rollups
    Weekly {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show nutrition targets by weekday
    Goals {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Evaluate alert rules for today
    Alerts {
        /// Also check for missing nutrition logs
        #[arg(long)]
        nutrition: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate the AI weekly summary
    Summary {
        /// Show today's stored summary instead of generating one
        #[arg(long)]
        latest: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Test the Oura connection
    Check {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the Telegram bot
    Bot,
    /// Run the Telegram bot and the job scheduler together
    Run,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config::log_filter()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let app = App::from_config(&config)?;

    match cli.command {
        Commands::Sync { days, json } => cmd_sync(&app, days, json).await,
        Commands::Import {
            files,
            dry_run,
            json,
        } => cmd_import(&app, files, dry_run, json).await,
        Commands::Log { entry, json } => cmd_log(&app, &entry, json).await,
        Commands::Today { date, json } => cmd_today(&app, date, json).await,
        Commands::Status { date, json } => cmd_status(&app, date, json).await,
        Commands::History { days, json } => cmd_history(&app, days, json).await,
        Commands::Week { json } => cmd_week(&app, json).await,
        Commands::Weekly { json } => cmd_weekly(&app, json).await,
        Commands::Goals { json } => cmd_goals(&app, json).await,
        Commands::Alerts { nutrition, json } => cmd_alerts(&app, nutrition, json).await,
        Commands::Summary { latest, json } => {
            if !latest {
                config.require_anthropic()?;
            }
            cmd_summary(&app, latest, json).await
        }
        Commands::Check { json } => cmd_check(&app, json).await,
        Commands::Bot => {
            let (token, user_id) = config.require_telegram()?;
            let api = TelegramApi::new(token)?;
            info!(db = %config.db_path.display(), "starting bot");
            Bot::new(api, app, user_id).run().await
        }
        Commands::Run => {
            let (token, user_id) = config.require_telegram()?;
            config.require_oura()?;
            config.require_anthropic()?;
            let api = TelegramApi::new(token)?;
            let notifier = Notifier::new(api.clone(), user_id);
            let scheduler = Scheduler::new(app.clone(), notifier)?;
            let bot = Bot::new(api, app, user_id);
            info!(
                db = %config.db_path.display(),
                timezone = %config.timezone,
                "starting bot and scheduler"
            );

            tokio::select! {
                res = bot.run() => res,
                res = scheduler.run() => res,
            }
        }
    }
}
