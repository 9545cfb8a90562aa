use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use vitals_core::macrofactor;
use vitals_core::manual::looks_like_entry;
use vitals_core::service::VitalsService;

use crate::app::App;
use crate::messages;

const API_BASE: &str = "https://api.telegram.org";
/// Stay well under Telegram's 4096 character limit.
const MAX_CHUNK_CHARS: usize = 3500;
const POLL_TIMEOUT_SECS: u64 = 25;

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
    pub document: Option<Document>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct Document {
    pub file_id: String,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TelegramFile {
    file_path: Option<String>,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
    disable_web_page_preview: bool,
}

/// Thin Bot API wrapper.
#[derive(Clone)]
pub struct TelegramApi {
    client: Client,
    base_url: String,
    file_url: String,
}

impl TelegramApi {
    pub fn new(token: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 35))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: format!("{API_BASE}/bot{token}"),
            file_url: format!("{API_BASE}/file/bot{token}"),
        })
    }

    async fn call<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to reach Telegram ({method})"))?;
        let payload: TelegramResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse Telegram {method} response"))?;
        if !payload.ok {
            let description = payload
                .description
                .unwrap_or_else(|| format!("telegram {method} failed"));
            bail!(description);
        }
        payload
            .result
            .with_context(|| format!("Telegram {method} returned no result"))
    }

    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": POLL_TIMEOUT_SECS,
            "allowed_updates": ["message"],
        });
        self.call("getUpdates", &body).await
    }

    async fn send_chunk(&self, chat_id: i64, text: &str, parse_mode: Option<&str>) -> Result<()> {
        let body = SendMessageRequest {
            chat_id,
            text,
            parse_mode,
            disable_web_page_preview: true,
        };
        let _: serde_json::Value = self.call("sendMessage", &body).await?;
        Ok(())
    }

    /// Send `text` as Markdown, split into chunks. A chunk Telegram cannot
    /// parse as Markdown is resent as plain text.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        for chunk in chunk_message(text, MAX_CHUNK_CHARS) {
            if let Err(e) = self.send_chunk(chat_id, &chunk, Some("Markdown")).await {
                debug!(error = %e, "markdown rejected, sending plain text");
                self.send_chunk(chat_id, &chunk, None).await?;
            }
        }
        Ok(())
    }

    /// Best effort; a failed typing indicator is never surfaced.
    pub async fn send_typing(&self, chat_id: i64) {
        let body = serde_json::json!({ "chat_id": chat_id, "action": "typing" });
        let _ = self
            .call::<_, serde_json::Value>("sendChatAction", &body)
            .await;
    }

    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let body = serde_json::json!({ "file_id": file_id });
        let file: TelegramFile = self.call("getFile", &body).await?;
        let path = file
            .file_path
            .context("Telegram did not return a download path")?;
        let bytes = self
            .client
            .get(format!("{}/{path}", self.file_url))
            .send()
            .await
            .context("Failed to download file from Telegram")?
            .error_for_status()
            .context("Telegram refused the file download")?
            .bytes()
            .await
            .context("Failed to read downloaded file")?;
        Ok(bytes.to_vec())
    }
}

/// Sends scheduler output to the single user.
#[derive(Clone)]
pub struct Notifier {
    api: TelegramApi,
    chat_id: i64,
}

impl Notifier {
    pub fn new(api: TelegramApi, chat_id: i64) -> Self {
        Self { api, chat_id }
    }

    pub async fn send(&self, text: &str) {
        if let Err(e) = self.api.send_message(self.chat_id, text).await {
            error!(error = %format!("{e:#}"), "failed to send Telegram notification");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Status,
    Today,
    Week,
    Goals,
    Summary,
    Sync,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    Entry(String),
    Other,
}

/// `/today@my_bot extra` → `/today`.
fn command_name(text: &str) -> &str {
    let first = text.split_whitespace().next().unwrap_or_default();
    first.split_once('@').map_or(first, |(base, _)| base)
}

pub fn classify(text: &str, today: NaiveDate) -> Input {
    let text = text.trim();
    if text.starts_with('/') {
        let cmd = match command_name(text).to_lowercase().as_str() {
            "/start" => Command::Start,
            "/help" => Command::Help,
            "/status" => Command::Status,
            "/today" => Command::Today,
            "/week" => Command::Week,
            "/goals" => Command::Goals,
            "/summary" => Command::Summary,
            "/sync" => Command::Sync,
            other => Command::Unknown(other.to_string()),
        };
        return Input::Command(cmd);
    }
    if looks_like_entry(text, today) {
        return Input::Entry(text.to_string());
    }
    Input::Other
}

/// Split on line boundaries; lines longer than `max_chars` are cut hard.
pub fn chunk_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for line in text.lines() {
        let mut line: Vec<char> = line.chars().collect();
        while line.len() > max_chars {
            if current_len > 0 {
                chunks.push(current.trim_end().to_string());
                current.clear();
                current_len = 0;
            }
            let rest = line.split_off(max_chars);
            chunks.push(line.into_iter().collect());
            line = rest;
        }
        let line_len = line.len() + 1;
        if current_len > 0 && current_len + line_len > max_chars {
            chunks.push(current.trim_end().to_string());
            current.clear();
            current_len = 0;
        }
        current.extend(line);
        current.push('\n');
        current_len += line_len;
    }
    if !current.trim().is_empty() {
        chunks.push(current.trim_end().to_string());
    }
    chunks
}

pub struct Bot {
    api: TelegramApi,
    app: App,
    user_id: i64,
}

impl Bot {
    pub fn new(api: TelegramApi, app: App, user_id: i64) -> Self {
        Self { api, app, user_id }
    }

    /// Poll forever. Updates queued while the bot was down are skipped.
    pub async fn run(self) -> Result<()> {
        let mut offset = self.skip_pending().await;
        info!(user_id = self.user_id, "telegram bot polling for updates");

        loop {
            let updates = match self.api.get_updates(offset).await {
                Ok(u) => u,
                Err(e) => {
                    let msg = format!("{e:#}");
                    let wait = if msg.contains("Conflict") { 15 } else { 5 };
                    warn!(error = %msg, wait_secs = wait, "getUpdates failed");
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                    continue;
                }
            };
            for update in updates {
                offset = update.update_id + 1;
                if let Some(message) = update.message {
                    self.handle_message(message).await;
                }
            }
        }
    }

    async fn skip_pending(&self) -> i64 {
        match self.api.get_updates(-1).await {
            Ok(updates) => updates.last().map_or(0, |u| u.update_id + 1),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "could not skip pending updates");
                0
            }
        }
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.api.send_message(chat_id, text).await {
            error!(chat_id, error = %format!("{e:#}"), "sendMessage failed");
        }
    }

    async fn handle_message(&self, message: Message) {
        let chat_id = message.chat.id;
        let sender = message.from.as_ref().map(|u| u.id);
        if sender != Some(self.user_id) {
            warn!(?sender, chat_id, "unauthorized access attempt");
            self.reply(chat_id, messages::UNAUTHORIZED).await;
            return;
        }

        let result = if let Some(doc) = &message.document {
            self.handle_document(chat_id, doc).await
        } else if let Some(text) = message.text.as_deref().filter(|t| !t.trim().is_empty()) {
            self.handle_text(chat_id, text).await
        } else {
            return;
        };

        let reply = result.unwrap_or_else(|e| {
            error!(error = %format!("{e:#}"), "message handler failed");
            format!("❌ {e:#}")
        });
        self.reply(chat_id, &reply).await;
    }

    async fn handle_text(&self, chat_id: i64, text: &str) -> Result<String> {
        let today = self.app.today();
        match classify(text, today) {
            Input::Command(cmd) => {
                info!(?cmd, "command received");
                self.handle_command(chat_id, cmd, today).await
            }
            Input::Entry(line) => {
                info!(entry = %line, "manual entry received");
                let result = self
                    .app
                    .call(move |svc| svc.record_manual(&line, today))
                    .await;
                Ok(match result {
                    Ok(entry) => messages::format_manual(&entry),
                    Err(e) => messages::format_manual_error(&e),
                })
            }
            Input::Other => Ok(messages::UNKNOWN_TEXT.to_string()),
        }
    }

    async fn handle_command(&self, chat_id: i64, cmd: Command, today: NaiveDate) -> Result<String> {
        match cmd {
            Command::Start => Ok(messages::START.to_string()),
            Command::Help => Ok(messages::HELP.to_string()),
            Command::Status => {
                let record = self.app.call(move |svc| svc.day(today)).await?;
                Ok(messages::format_status(today, record.as_ref()))
            }
            Command::Today => {
                let record = self.app.call(move |svc| svc.day(today)).await?;
                Ok(messages::format_day(today, record.as_ref()))
            }
            Command::Week => {
                let view = self.app.call(move |svc| svc.week(today)).await?;
                Ok(messages::format_week(&view, today))
            }
            Command::Goals => {
                let goals = self.app.call(VitalsService::goals).await?;
                Ok(messages::format_goals(&goals))
            }
            Command::Summary => {
                self.reply(chat_id, "⏳ Generating AI summary... this may take a moment.")
                    .await;
                self.api.send_typing(chat_id).await;
                let record = self
                    .app
                    .generate_summary()
                    .await
                    .context("Could not generate AI summary")?;
                Ok(messages::format_summary(&record))
            }
            Command::Sync => {
                self.api.send_typing(chat_id).await;
                let report = self.app.sync(self.app.lookback_days).await?;
                Ok(messages::format_sync(&report))
            }
            Command::Unknown(name) => Ok(format!("Unknown command {name}. Use /help")),
        }
    }

    async fn handle_document(&self, chat_id: i64, doc: &Document) -> Result<String> {
        let name = doc.file_name.clone().unwrap_or_default();
        info!(file = %name, size = ?doc.file_size, "file received");
        if !macrofactor::is_supported(&name) {
            return Ok("⚠️ Please send a MacroFactor export as `.xlsx` or `.csv`.\n\
                       Other file types are not supported."
                .to_string());
        }

        self.reply(chat_id, "📥 Processing file...").await;
        let bytes = self.api.download_file(&doc.file_id).await?;
        let parsed = macrofactor::parse_bytes(&name, &bytes)
            .with_context(|| format!("Could not parse {name}"))?;
        let report = self
            .app
            .call(move |svc| svc.import_nutrition(parsed))
            .await?;
        Ok(report.message())
    }
}
