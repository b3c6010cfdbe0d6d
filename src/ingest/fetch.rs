// src/ingest/fetch.rs
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::FetchSettings;

/// Raw HTTP answer: status code + body. Status interpretation is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<FetchedPage>;
}

/// `reqwest`-backed fetcher with a per-request timeout and capped retry on
/// transport errors.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_retries: u32,
    backoff: Duration,
}

impl HttpFetcher {
    pub fn new(settings: &FetchSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .connect_timeout(Duration::from_secs(4).min(settings.http_timeout()))
            .timeout(settings.http_timeout())
            .build()
            .context("building http client")?;
        Ok(Self {
            client,
            max_retries: settings.max_retries,
            backoff: settings.retry_backoff(),
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<FetchedPage> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let mut req = self.client.get(url);
            for (name, value) in headers {
                req = req.header(*name, *value);
            }
            match req.send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let body = resp.text().await.with_context(|| format!("reading body of {url}"))?;
                    return Ok(FetchedPage { status, body });
                }
                Err(e) if attempt <= self.max_retries && (e.is_timeout() || e.is_connect()) => {
                    tracing::debug!(url, attempt, error = %e, "transport error, retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(e) => return Err(e).with_context(|| format!("GET {url}")),
            }
        }
    }
}
