// src/ingest/providers/cryptocompare.rs
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::http::{client_with_timeout, send_with_retry, RetryPolicy};
use crate::ingest::normalize_text;
use crate::ingest::providers::{NEWS_TIMEOUT, SOURCE_RETRY};
use crate::ingest::types::{NewsItem, NewsSource, NewsSourceKind};

pub const DEFAULT_ENDPOINT: &str = "https://min-api.cryptocompare.com/data/v2/news/";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Response")]
    response: Option<String>,
    #[serde(rename = "Message")]
    message: Option<String>,
    #[serde(rename = "Data", default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct Article {
    title: Option<String>,
    url: Option<String>,
    #[serde(default)]
    categories: String,
    published_on: Option<i64>,
    source_info: Option<SourceInfo>,
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SourceInfo {
    name: Option<String>,
}

/// Secondary news API (no key needed).
pub struct CryptoCompareSource {
    endpoint: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl CryptoCompareSource {
    pub fn new() -> Result<Self> {
        Ok(Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            client: client_with_timeout(NEWS_TIMEOUT)?,
            retry: SOURCE_RETRY,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Parse a news payload. `Response == "Error"` is a source failure.
    pub fn parse_articles(body: &str, limit: usize) -> Result<Vec<NewsItem>> {
        let env: Envelope = serde_json::from_str(body).context("parsing cryptocompare json")?;
        if env.response.as_deref() == Some("Error") {
            bail!(
                "cryptocompare returned error: {}",
                env.message.unwrap_or_default()
            );
        }
        let articles: Vec<Article> = match env.data {
            serde_json::Value::Null => Vec::new(),
            other => serde_json::from_value(other).context("cryptocompare Data[]")?,
        };

        let mut out = Vec::with_capacity(articles.len().min(limit));
        for a in articles.into_iter().take(limit) {
            let title = normalize_text(a.title.as_deref().unwrap_or_default(), 500);
            let url = a.url.unwrap_or_default();
            if title.is_empty() || url.trim().is_empty() {
                continue;
            }
            let published_at = a
                .published_on
                .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
                .unwrap_or_else(Utc::now);
            let source_name = a
                .source_info
                .and_then(|s| s.name)
                .or(a.source)
                .unwrap_or_else(|| "Unknown".to_string());
            let codes: Vec<String> = a
                .categories
                .split('|')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();

            out.push(
                NewsItem::new(title, url, NewsSourceKind::Cryptonews, source_name, published_at)
                    .with_currencies(codes),
            );
        }
        Ok(out)
    }
}

#[async_trait]
impl NewsSource for CryptoCompareSource {
    fn name(&self) -> &'static str {
        "cryptonews"
    }

    async fn fetch(&self, limit: usize) -> Result<Vec<NewsItem>> {
        let rsp = send_with_retry(self.retry, || {
            self.client
                .get(&self.endpoint)
                .query(&[("lang", "EN"), ("sortOrder", "latest")])
        })
        .await
        .context("cryptocompare get()")?
        .error_for_status()
        .context("cryptocompare status")?;

        let body = rsp.text().await.context("cryptocompare .text()")?;
        Self::parse_articles(&body, limit)
    }
}
