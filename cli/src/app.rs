use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use chrono_tz::Tz;

use vitals_core::dates::today_in;
use vitals_core::models::AiSummaryRecord;
use vitals_core::service::{SyncReport, VitalsService, fetch_wearable};
use vitals_core::summary::SummaryGenerator;

use crate::anthropic::AnthropicClient;
use crate::config::Config;
use crate::oura::OuraClient;

/// Everything a command, the bot or the scheduler needs, cheap to clone.
///
/// The service sits behind one mutex and every call runs on a blocking
/// thread, so ledger writes never interleave. Network round trips happen
/// outside the lock.
#[derive(Clone)]
pub struct App {
    service: Arc<Mutex<VitalsService>>,
    oura: Option<Arc<OuraClient>>,
    anthropic: Option<Arc<AnthropicClient>>,
    pub tz: Tz,
    pub lookback_days: u32,
}

impl App {
    pub fn new(service: VitalsService, tz: Tz, lookback_days: u32) -> Self {
        Self {
            service: Arc::new(Mutex::new(service)),
            oura: None,
            anthropic: None,
            tz,
            lookback_days,
        }
    }

    /// Open the database and build whichever clients have credentials.
    pub fn from_config(config: &Config) -> Result<Self> {
        let service = VitalsService::new(&config.db_path)?;
        let mut app = Self::new(service, config.timezone, config.sync_lookback_days);
        if let Some(token) = &config.oura_token {
            app.oura = Some(Arc::new(OuraClient::new(&config.oura_base_url, token)?));
        }
        if let Some(key) = &config.anthropic_api_key {
            app.anthropic = Some(Arc::new(AnthropicClient::new(key, &config.claude_model)?));
        }
        Ok(app)
    }

    pub fn today(&self) -> NaiveDate {
        today_in(self.tz)
    }

    pub fn oura(&self) -> Result<Arc<OuraClient>> {
        self.oura.clone().context("OURA_API_TOKEN is not set")
    }

    pub fn anthropic(&self) -> Result<Arc<AnthropicClient>> {
        self.anthropic.clone().context("ANTHROPIC_API_KEY is not set")
    }

    /// Run `f` against the service on a blocking thread.
    pub async fn call<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&VitalsService) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let service = Arc::clone(&self.service);
        tokio::task::spawn_blocking(move || {
            let guard = service.lock().unwrap_or_else(PoisonError::into_inner);
            f(&guard)
        })
        .await
        .context("Background task failed")?
    }

    /// Run `f` on a blocking thread without taking the service lock.
    async fn unlocked<T, F>(f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .context("Background task failed")?
    }

    /// Fetch from Oura unlocked, then hold the service only for the writes.
    pub async fn sync(&self, days: u32) -> Result<SyncReport> {
        let oura = self.oura()?;
        let today = self.today();
        let fetch = Self::unlocked(move || fetch_wearable(oura.as_ref(), today, days)).await?;
        self.call(move |svc| Ok(svc.apply_wearable(fetch))).await
    }

    pub async fn generate_summary(&self) -> Result<AiSummaryRecord> {
        let client = self.anthropic()?;
        let today = self.today();
        let prompt = self.call(move |svc| svc.summary_prompt(today)).await?;
        let text = Self::unlocked(move || client.generate(&prompt))
            .await
            .context("Failed to generate weekly summary")?;
        self.call(move |svc| svc.store_summary(today, &text)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use vitals_core::models::Field;
    use vitals_core::retry::RetryPolicy;

    fn app() -> App {
        let svc = VitalsService::new_in_memory()
            .unwrap()
            .with_pacing(Duration::ZERO)
            .with_retry(RetryPolicy::none());
        App::new(svc, chrono_tz::Europe::Sofia, 7)
    }

    #[tokio::test]
    async fn test_call_runs_against_shared_service() {
        let app = app();
        let today = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        app.call(move |svc| svc.record_manual("2026-02-09 73 180", today))
            .await
            .unwrap();

        let other = app.clone();
        let day = NaiveDate::from_ymd_opt(2026, 2, 9).unwrap();
        let rec = other.call(move |svc| svc.day(day)).await.unwrap().unwrap();
        assert_eq!(rec.number(Field::ProteinG), Some(180.0));
    }

    #[tokio::test]
    async fn test_missing_clients_are_errors() {
        let app = app();
        let err = app.sync(7).await.unwrap_err();
        assert!(err.to_string().contains("OURA_API_TOKEN"));
        let err = app.generate_summary().await.unwrap_err();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    /// An Oura stand-in that answers every request with an empty page after `delay`.
    async fn slow_oura(delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    tokio::time::sleep(delay).await;
                    let body = r#"{"data":[],"next_token":null}"#;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reads_are_not_blocked_by_a_slow_sync() {
        let base = slow_oura(Duration::from_millis(300)).await;
        let mut app = app();
        app.oura = Some(Arc::new(
            OuraClient::new(&base, "token")
                .unwrap()
                .with_retry(RetryPolicy::none()),
        ));

        let syncing = tokio::spawn({
            let app = app.clone();
            async move { app.sync(3).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        let day = NaiveDate::from_ymd_opt(2026, 2, 9).unwrap();
        let read = tokio::time::timeout(
            Duration::from_secs(5),
            app.call(move |svc| svc.day(day)),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(read.is_none());
        assert!(
            started.elapsed() < Duration::from_millis(250),
            "read waited {:?} behind the sync",
            started.elapsed()
        );

        let report = syncing.await.unwrap().unwrap();
        assert_eq!(report.days_fetched, 0);
        assert_eq!(report.days_updated, 0);
    }
}
