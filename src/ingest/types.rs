// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Which upstream family an item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewsSourceKind {
    /// Primary news API (votes-bearing aggregator).
    Cryptopanic,
    /// Secondary news API.
    Cryptonews,
    /// Social feed read through mirror proxies.
    Social,
}

impl NewsSourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NewsSourceKind::Cryptopanic => "cryptopanic",
            NewsSourceKind::Cryptonews => "cryptonews",
            NewsSourceKind::Social => "social",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "cryptopanic" => Some(Self::Cryptopanic),
            "cryptonews" => Some(Self::Cryptonews),
            "social" | "twitter" => Some(Self::Social),
            _ => None,
        }
    }
}

impl std::fmt::Display for NewsSourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsItem {
    /// `news_id_for(url)`; never set by hand.
    pub id: String,
    pub title: String,
    pub url: String,
    pub source: NewsSourceKind,
    /// Publisher / account label, e.g. "CoinDesk" or "@WatcherGuru".
    pub source_name: String,
    pub published_at: DateTime<Utc>,
    /// Upper-case tickers from the tracked universe.
    pub currencies: Vec<String>,
    pub raw_sentiment: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl NewsItem {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        source: NewsSourceKind,
        source_name: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        let url = url.into();
        Self {
            id: news_id_for(&url),
            title: title.into(),
            url,
            source,
            source_name: source_name.into(),
            published_at,
            currencies: Vec::new(),
            raw_sentiment: None,
            fetched_at: Utc::now(),
        }
    }

    pub fn with_currencies<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.currencies = codes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_raw_sentiment(mut self, raw: impl Into<String>) -> Self {
        self.raw_sentiment = Some(raw.into());
        self
    }
}

/// Canonical form used for hashing: lower-case scheme/host, no fragment,
/// no `utm_*` params, no trailing slash on a non-root path.
pub fn canonical_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = reqwest::Url::parse(trimmed) else {
        return trimmed.to_string();
    };
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !k.to_ascii_lowercase().starts_with("utm_"))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }
    // Url::parse already lower-cases scheme and host.
    url.to_string()
}

/// First 16 hex chars of SHA-256 over the canonical URL.
pub fn news_id_for(url: &str) -> String {
    let digest = Sha256::digest(canonical_url(url).as_bytes());
    digest
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Any upstream that can produce news items.
#[async_trait::async_trait]
pub trait NewsSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch(&self, limit: usize) -> Result<Vec<NewsItem>>;
}
