// src/ingest/mod.rs
pub mod assets;
pub mod providers;
pub mod types;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};

use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;

use crate::config::AssetUniverse;
use crate::ingest::assets::AssetMatcher;
use crate::ingest::providers::nitter::NitterSource;
use crate::ingest::types::{NewsItem, NewsSource};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "sentiment_source_items_total",
            "Items returned by each news source before filtering."
        );
        describe_counter!(
            "sentiment_source_errors_total",
            "News source fetch/parse failures."
        );
        describe_histogram!(
            "sentiment_source_fetch_ms",
            "News source fetch time in milliseconds."
        );
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace, cap length.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
    }
    out
}

/// Fans out to every configured source and returns fresh, asset-tagged items.
pub struct NewsAggregator {
    sources: Vec<Arc<dyn NewsSource>>,
    social: Option<Arc<NitterSource>>,
    matcher: RwLock<AssetMatcher>,
    filter_by_assets: bool,
    seen: Mutex<HashSet<String>>,
}

impl NewsAggregator {
    pub fn new(universe: AssetUniverse, filter_by_assets: bool) -> Self {
        Self {
            sources: Vec::new(),
            social: None,
            matcher: RwLock::new(AssetMatcher::new(universe)),
            filter_by_assets,
            seen: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn NewsSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Register the social feed; the handle stays reachable for account management.
    pub fn with_social(mut self, social: Arc<NitterSource>) -> Self {
        self.sources.push(social.clone());
        self.social = Some(social);
        self
    }

    pub fn social(&self) -> Option<&Arc<NitterSource>> {
        self.social.as_ref()
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Fetch every source, newest first, without anything this instance already returned.
    /// A failing source contributes nothing; it never fails the whole call.
    pub async fn fetch_all(&self, limit_per_source: usize) -> Vec<NewsItem> {
        ensure_metrics_described();

        let mut raw = Vec::new();
        for source in &self.sources {
            let t0 = std::time::Instant::now();
            let name = source.name();
            match source.fetch(limit_per_source).await {
                Ok(mut items) => {
                    items.truncate(limit_per_source);
                    tracing::debug!(source = name, count = items.len(), "fetched news");
                    counter!("sentiment_source_items_total", "source" => name)
                        .increment(items.len() as u64);
                    raw.append(&mut items);
                }
                Err(e) => {
                    tracing::warn!(source = name, error = ?e, "news source failed");
                    counter!("sentiment_source_errors_total", "source" => name).increment(1);
                }
            }
            metrics::histogram!("sentiment_source_fetch_ms", "source" => name)
                .record(t0.elapsed().as_secs_f64() * 1_000.0);
        }

        let mut fresh = self.tag_and_filter(raw);
        fresh.sort_by(|a, b| b.published_at.cmp(&a.published_at));

        let mut seen = match self.seen.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        fresh.retain(|it| seen.insert(it.id.clone()));
        fresh
    }

    fn tag_and_filter(&self, raw: Vec<NewsItem>) -> Vec<NewsItem> {
        let matcher = match self.matcher.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut out = Vec::with_capacity(raw.len());
        for mut it in raw {
            if it.title.trim().is_empty() || it.url.trim().is_empty() {
                continue;
            }
            it.currencies = matcher.resolve(&it.title, it.currencies.iter().map(String::as_str));
            if self.filter_by_assets && it.currencies.is_empty() {
                continue;
            }
            out.push(it);
        }
        out
    }

    pub fn add_asset(&self, ticker: &str) -> bool {
        match self.matcher.write() {
            Ok(mut m) => m.add(ticker),
            Err(poisoned) => poisoned.into_inner().add(ticker),
        }
    }

    pub fn remove_asset(&self, ticker: &str) -> bool {
        match self.matcher.write() {
            Ok(mut m) => m.remove(ticker),
            Err(poisoned) => poisoned.into_inner().remove(ticker),
        }
    }

    pub fn tracked_assets(&self) -> Vec<String> {
        match self.matcher.read() {
            Ok(m) => m.tickers().iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().tickers().iter().cloned().collect(),
        }
    }

    pub fn clear_seen(&self) {
        match self.seen.lock() {
            Ok(mut s) => s.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
        tracing::info!("cleared seen news cache");
    }

    pub fn seen_count(&self) -> usize {
        match self.seen.lock() {
            Ok(s) => s.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}
