use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vitals_core::retry::RetryPolicy;
use vitals_core::summary::SummaryGenerator;

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

fn first_text(resp: MessagesResponse) -> Option<String> {
    resp.content
        .into_iter()
        .find(|b| b.kind == "text")
        .and_then(|b| b.text)
}

pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    retry: RetryPolicy,
    rt: tokio::runtime::Handle,
}

impl AnthropicClient {
    pub fn new(api_key: &str, model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            retry: RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_secs(5),
                max_backoff: Duration::from_secs(5),
            },
            rt: tokio::runtime::Handle::current(),
        })
    }

    async fn request(&self, prompt: &str) -> Result<String> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };
        let resp = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .context("Failed to reach the Anthropic API")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("Anthropic API returned HTTP {status}: {text}");
        }

        let data: MessagesResponse = resp
            .json()
            .await
            .context("Failed to parse Anthropic response")?;
        if let Some(usage) = &data.usage {
            info!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "summary generated"
            );
        }
        first_text(data).context("Anthropic response had no text content")
    }

    pub async fn generate_async(&self, prompt: &str) -> Result<String> {
        let max = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.request(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < max => {
                    warn!(attempt, max, error = %format!("{e:#}"), "summary request failed");
                    tokio::time::sleep(self.retry.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.context(format!("Anthropic API failed after {attempt} attempts"))),
            }
        }
    }
}

impl SummaryGenerator for AnthropicClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        self.rt.block_on(self.generate_async(prompt))
    }
}
