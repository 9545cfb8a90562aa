use anyhow::{Context, Result, bail};
use chrono_tz::Tz;
use directories::ProjectDirs;
use std::path::PathBuf;

use vitals_core::dates::{DEFAULT_TIMEZONE, parse_timezone};

pub const DEFAULT_OURA_BASE_URL: &str = "https://api.ouraring.com/v2/usercollection";
pub const DEFAULT_CLAUDE_MODEL: &str = "claude-sonnet-4-5-20250929";
pub const DEFAULT_LOOKBACK_DAYS: u32 = 7;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub oura_token: Option<String>,
    pub oura_base_url: String,
    pub anthropic_api_key: Option<String>,
    pub claude_model: String,
    pub telegram_token: Option<String>,
    pub telegram_user_id: Option<i64>,
    pub timezone: Tz,
    pub sync_lookback_days: u32,
}

impl Config {
    /// Resolve settings from the process environment. `.env` is loaded by `main`.
    pub fn load() -> Result<Self> {
        let default_db = || -> Result<PathBuf> {
            let proj_dirs =
                ProjectDirs::from("", "", "vitals").context("Could not determine home directory")?;
            let data_dir = proj_dirs.data_dir().to_path_buf();
            std::fs::create_dir_all(&data_dir).with_context(|| {
                format!("Failed to create data directory: {}", data_dir.display())
            })?;
            Ok(data_dir.join("vitals.db"))
        };
        Self::from_vars(|key| std::env::var(key).ok(), default_db)
    }

    /// Build from a variable lookup. `default_db` runs only without `VITALS_DB_PATH`.
    pub fn from_vars<V, D>(var: V, default_db: D) -> Result<Self>
    where
        V: Fn(&str) -> Option<String>,
        D: FnOnce() -> Result<PathBuf>,
    {
        let get = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let db_path = match get("VITALS_DB_PATH") {
            Some(p) => PathBuf::from(p),
            None => default_db()?,
        };

        let telegram_user_id = get("TELEGRAM_USER_ID")
            .map(|v| {
                v.parse::<i64>()
                    .with_context(|| format!("TELEGRAM_USER_ID must be a number, got '{v}'"))
            })
            .transpose()?;

        let timezone = parse_timezone(&get("TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.into()))
            .context("Invalid TIMEZONE")?;

        let sync_lookback_days = match get("SYNC_LOOKBACK_DAYS") {
            None => DEFAULT_LOOKBACK_DAYS,
            Some(v) => {
                let days: u32 = v.parse().with_context(|| {
                    format!("SYNC_LOOKBACK_DAYS must be a positive number, got '{v}'")
                })?;
                if days == 0 {
                    bail!("SYNC_LOOKBACK_DAYS must be at least 1");
                }
                days
            }
        };

        Ok(Config {
            db_path,
            oura_token: get("OURA_API_TOKEN"),
            oura_base_url: get("OURA_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OURA_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            claude_model: get("CLAUDE_MODEL").unwrap_or_else(|| DEFAULT_CLAUDE_MODEL.into()),
            telegram_token: get("TELEGRAM_BOT_TOKEN"),
            telegram_user_id,
            timezone,
            sync_lookback_days,
        })
    }

    pub fn require_oura(&self) -> Result<&str> {
        self.oura_token
            .as_deref()
            .context("OURA_API_TOKEN is not set")
    }

    pub fn require_anthropic(&self) -> Result<&str> {
        self.anthropic_api_key
            .as_deref()
            .context("ANTHROPIC_API_KEY is not set")
    }

    /// Bot token and the single user the bot answers.
    pub fn require_telegram(&self) -> Result<(&str, i64)> {
        let token = self
            .telegram_token
            .as_deref()
            .context("TELEGRAM_BOT_TOKEN is not set")?;
        let user_id = self
            .telegram_user_id
            .context("TELEGRAM_USER_ID is not set")?;
        Ok((token, user_id))
    }
}

/// Log filter: `RUST_LOG` wins, then `LOG_LEVEL`, then `info`.
pub fn log_filter() -> String {
    std::env::var("RUST_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| std::env::var("LOG_LEVEL").ok())
        .filter(|v| !v.trim().is_empty())
        .map_or_else(|| "info".to_string(), |v| v.trim().to_lowercase())
}
