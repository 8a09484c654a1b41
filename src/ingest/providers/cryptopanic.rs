// src/ingest/providers/cryptopanic.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::http::{client_with_timeout, send_with_retry, RetryPolicy};
use crate::ingest::normalize_text;
use crate::ingest::providers::{NEWS_TIMEOUT, SOURCE_RETRY};
use crate::ingest::types::{NewsItem, NewsSource, NewsSourceKind};

pub const DEFAULT_ENDPOINT: &str = "https://cryptopanic.com/api/v1/posts/";

#[derive(Debug, Deserialize)]
struct PostsResponse {
    #[serde(default)]
    results: Vec<Post>,
}

#[derive(Debug, Deserialize)]
struct Post {
    title: Option<String>,
    url: Option<String>,
    source: Option<PostSource>,
    published_at: Option<String>,
    #[serde(default)]
    currencies: Vec<Currency>,
    votes: Option<Votes>,
}

#[derive(Debug, Deserialize)]
struct PostSource {
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Currency {
    code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Votes {
    #[serde(default)]
    positive: i64,
    #[serde(default)]
    negative: i64,
}

impl Votes {
    fn label(&self) -> &'static str {
        match self.positive.cmp(&self.negative) {
            std::cmp::Ordering::Greater => "positive",
            std::cmp::Ordering::Less => "negative",
            std::cmp::Ordering::Equal => "neutral",
        }
    }
}

/// Primary news API. Requires an auth token.
pub struct CryptoPanicSource {
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl CryptoPanicSource {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
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

    /// Parse a `posts` payload. Entries without title or url are skipped.
    pub fn parse_posts(body: &str, limit: usize) -> Result<Vec<NewsItem>> {
        let parsed: PostsResponse =
            serde_json::from_str(body).context("parsing cryptopanic posts json")?;

        let mut out = Vec::with_capacity(parsed.results.len().min(limit));
        for post in parsed.results.into_iter().take(limit) {
            let title = normalize_text(post.title.as_deref().unwrap_or_default(), 500);
            let url = post.url.unwrap_or_default();
            if title.is_empty() || url.trim().is_empty() {
                continue;
            }
            let published_at = post
                .published_at
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);
            let source_name = post
                .source
                .and_then(|s| s.title)
                .unwrap_or_else(|| "Unknown".to_string());
            let codes = post.currencies.into_iter().filter_map(|c| c.code);

            out.push(
                NewsItem::new(title, url, NewsSourceKind::Cryptopanic, source_name, published_at)
                    .with_currencies(codes)
                    .with_raw_sentiment(post.votes.unwrap_or_default().label()),
            );
        }
        Ok(out)
    }
}

#[async_trait]
impl NewsSource for CryptoPanicSource {
    fn name(&self) -> &'static str {
        "cryptopanic"
    }

    async fn fetch(&self, limit: usize) -> Result<Vec<NewsItem>> {
        let rsp = send_with_retry(self.retry, || {
            self.client.get(&self.endpoint).query(&[
                ("auth_token", self.api_key.as_str()),
                ("kind", "news"),
                ("filter", "hot"),
                ("public", "true"),
            ])
        })
        .await
        .context("cryptopanic get()")?
        .error_for_status()
        .context("cryptopanic status")?;

        let body = rsp.text().await.context("cryptopanic .text()")?;
        Self::parse_posts(&body, limit)
    }
}
