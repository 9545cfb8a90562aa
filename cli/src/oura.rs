use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use vitals_core::oura::{
    DailyActivity, DailyReadiness, DailySleep, Page, SleepSession, WearablePayload,
};
use vitals_core::retry::RetryPolicy;
use vitals_core::service::WearableProvider;

/// Upper bound on pages per endpoint, in case the API keeps handing out tokens.
const MAX_PAGES: usize = 50;

pub struct OuraClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    retry: RetryPolicy,
    rt: tokio::runtime::Handle,
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

impl OuraClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("vitals/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            retry: RetryPolicy::default(),
            rt: tokio::runtime::Handle::current(),
        })
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        start: NaiveDate,
        end: NaiveDate,
        next_token: Option<&str>,
    ) -> Result<Page<T>> {
        let url = format!("{}/{endpoint}", self.base_url);
        let mut query = vec![
            ("start_date", start.to_string()),
            ("end_date", end.to_string()),
        ];
        if let Some(t) = next_token {
            query.push(("next_token", t.to_string()));
        }

        let max = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .query(&query)
                .send()
                .await;

            let retry_reason = match result {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json::<Page<T>>()
                        .await
                        .with_context(|| format!("Failed to parse Oura {endpoint} response"));
                }
                Ok(resp) if is_retryable_status(resp.status()) => {
                    format!("HTTP {}", resp.status())
                }
                Ok(resp) => {
                    let status = resp.status();
                    if status == StatusCode::UNAUTHORIZED {
                        bail!("Oura rejected the token (HTTP 401); check OURA_API_TOKEN");
                    }
                    let body = resp.text().await.unwrap_or_default();
                    bail!("Oura {endpoint} failed with HTTP {status}: {body}");
                }
                Err(e) if e.is_connect() || e.is_timeout() => e.to_string(),
                Err(e) => {
                    return Err(anyhow!(e).context(format!("Failed to reach Oura {endpoint}")));
                }
            };

            if attempt >= max {
                bail!("Oura {endpoint} failed after {attempt} attempts: {retry_reason}");
            }
            let wait = self.retry.backoff(attempt);
            warn!(endpoint, attempt, reason = %retry_reason, ?wait, "retrying Oura request");
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }

    /// Every item of `endpoint` for the range, following `next_token`.
    async fn get_all<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut token: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let page: Page<T> = self.get_page(endpoint, start, end, token.as_deref()).await?;
            items.extend(page.data);
            match page.next_token {
                Some(t) if !t.is_empty() => token = Some(t),
                _ => {
                    debug!(endpoint, count = items.len(), "fetched Oura endpoint");
                    return Ok(items);
                }
            }
        }
        warn!(endpoint, max_pages = MAX_PAGES, "stopped following Oura pagination");
        Ok(items)
    }

    pub async fn fetch_async(&self, start: NaiveDate, end: NaiveDate) -> Result<WearablePayload> {
        info!(%start, %end, "fetching Oura data");
        let daily_sleep: Vec<DailySleep> = self.get_all("daily_sleep", start, end).await?;
        let readiness: Vec<DailyReadiness> = self.get_all("daily_readiness", start, end).await?;
        let activity: Vec<DailyActivity> = self.get_all("daily_activity", start, end).await?;
        let sessions: Vec<SleepSession> = self.get_all("sleep", start, end).await?;
        Ok(WearablePayload {
            daily_sleep,
            readiness,
            activity,
            sessions,
        })
    }

    /// Fetch the last day of sleep scores; returns how many records came back.
    pub async fn check(&self, today: NaiveDate) -> Result<usize> {
        let start = today - chrono::Duration::days(1);
        let items: Vec<DailySleep> = self.get_all("daily_sleep", start, today).await?;
        Ok(items.len())
    }
}

impl WearableProvider for OuraClient {
    fn fetch(&self, start: NaiveDate, end: NaiveDate) -> Result<WearablePayload> {
        self.rt.block_on(self.fetch_async(start, end))
    }
}
