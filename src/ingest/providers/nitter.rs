// src/ingest/providers/nitter.rs
//! Social feed read through public mirror proxies (RSS or Atom per account).

use std::sync::RwLock;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};
use tokio::sync::Mutex;

use crate::http::{client_with_timeout, send_with_retry, RetryPolicy};
use crate::ingest::normalize_text;
use crate::ingest::providers::{PROBE_TIMEOUT, SOCIAL_TIMEOUT, SOURCE_RETRY};
use crate::ingest::types::{NewsItem, NewsSource, NewsSourceKind};

const MAX_TEXT_CHARS: usize = 500;

static RE_STATUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"/([^/?#]+)/status/(\d+)").unwrap());

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Atom {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<String>,
    #[serde(default)]
    link: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
}

/// Mirror-backed social source.
///
/// The first mirror that answers `GET /` with 200 is cached; when the cached mirror
/// stops answering, the whole list is probed again in order.
pub struct NitterSource {
    mirrors: Vec<String>,
    accounts: RwLock<Vec<String>>,
    healthy: Mutex<Option<String>>,
    client: reqwest::Client,
    probe_client: reqwest::Client,
    retry: RetryPolicy,
}

impl NitterSource {
    pub fn new<A, M>(accounts: A, mirrors: M) -> Result<Self>
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        M: IntoIterator,
        M::Item: AsRef<str>,
    {
        let mut handles: Vec<String> = Vec::new();
        for a in accounts {
            let h = normalize_handle(a.as_ref());
            if !h.is_empty() && !handles.contains(&h) {
                handles.push(h);
            }
        }
        Ok(Self {
            mirrors: mirrors
                .into_iter()
                .map(|m| m.as_ref().trim().trim_end_matches('/').to_string())
                .filter(|m| !m.is_empty())
                .collect(),
            accounts: RwLock::new(handles),
            healthy: Mutex::new(None),
            client: client_with_timeout(SOCIAL_TIMEOUT)?,
            probe_client: client_with_timeout(PROBE_TIMEOUT)?,
            retry: SOURCE_RETRY,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn accounts(&self) -> Vec<String> {
        match self.accounts.read() {
            Ok(a) => a.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Returns false if the handle was already tracked or empty.
    pub fn add_account(&self, handle: &str) -> bool {
        let h = normalize_handle(handle);
        if h.is_empty() {
            return false;
        }
        let mut accounts = match self.accounts.write() {
            Ok(a) => a,
            Err(poisoned) => poisoned.into_inner(),
        };
        if accounts.contains(&h) {
            return false;
        }
        accounts.push(h);
        true
    }

    pub fn remove_account(&self, handle: &str) -> bool {
        let h = normalize_handle(handle);
        let mut accounts = match self.accounts.write() {
            Ok(a) => a,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = accounts.len();
        accounts.retain(|a| a != &h);
        accounts.len() != before
    }

    pub async fn healthy_mirror(&self) -> Option<String> {
        self.healthy.lock().await.clone()
    }

    async fn probe(&self, base: &str) -> bool {
        match self.probe_client.get(format!("{base}/")).send().await {
            Ok(rsp) => rsp.status() == reqwest::StatusCode::OK,
            Err(e) => {
                tracing::debug!(mirror = base, error = %e, "mirror probe failed");
                false
            }
        }
    }

    /// Cached mirror if it still answers, otherwise the first healthy one in list order.
    async fn find_mirror(&self) -> Option<String> {
        let mut cached = self.healthy.lock().await;
        if let Some(m) = cached.clone() {
            if self.probe(&m).await {
                return Some(m);
            }
            tracing::info!(mirror = %m, "cached mirror unhealthy, re-probing");
            *cached = None;
        }
        for m in &self.mirrors {
            if self.probe(m).await {
                tracing::info!(mirror = %m, "using social mirror");
                *cached = Some(m.clone());
                return Some(m.clone());
            }
        }
        None
    }

    async fn fetch_account(&self, mirror: &str, account: &str, limit: usize) -> Result<Vec<NewsItem>> {
        let url = format!("{mirror}/{account}/rss");
        let rsp = send_with_retry(self.retry, || self.client.get(&url))
            .await
            .with_context(|| format!("social feed get {account}"))?
            .error_for_status()
            .with_context(|| format!("social feed status {account}"))?;
        let body = rsp.text().await.context("social feed .text()")?;
        let mut items = parse_feed(&body, account)?;
        items.truncate(limit);
        Ok(items)
    }
}

#[async_trait]
impl NewsSource for NitterSource {
    fn name(&self) -> &'static str {
        "social"
    }

    async fn fetch(&self, limit: usize) -> Result<Vec<NewsItem>> {
        let accounts = self.accounts();
        if accounts.is_empty() {
            return Ok(Vec::new());
        }
        let mirror = self
            .find_mirror()
            .await
            .ok_or_else(|| anyhow!("no healthy social mirror among {}", self.mirrors.len()))?;

        let mut all = Vec::new();
        for account in &accounts {
            match self.fetch_account(&mirror, account, limit).await {
                Ok(mut items) => all.append(&mut items),
                Err(e) => tracing::warn!(account = %account, error = ?e, "social account fetch failed"),
            }
        }
        all.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        all.truncate(limit);
        Ok(all)
    }
}

fn normalize_handle(h: &str) -> String {
    h.trim().trim_start_matches('@').to_ascii_lowercase()
}

/// Rewrite a mirror status link to the canonical twitter.com form.
pub fn canonical_status_url(link: &str) -> String {
    match RE_STATUS.captures(link) {
        Some(c) => format!("https://twitter.com/{}/status/{}", &c[1], &c[2]),
        None => link.trim().to_string(),
    }
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    match OffsetDateTime::parse(ts.trim(), &Rfc2822) {
        Ok(odt) => DateTime::<Utc>::from_timestamp(odt.unix_timestamp(), 0),
        // obsolete zone names ("GMT") are not accepted by every `time` release
        Err(_) => DateTime::parse_from_rfc2822(ts.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

fn parse_rfc3339(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&hellip;", "...")
}

/// Parse an account feed (RSS `item` or Atom `entry`) into social items.
pub fn parse_feed(xml: &str, account: &str) -> Result<Vec<NewsItem>> {
    let xml = scrub_html_entities_for_xml(xml);
    let source_name = format!("@{account}");

    let mut raw: Vec<(String, String, Option<DateTime<Utc>>)> = Vec::new();
    if xml.contains("<rss") {
        let rss: Rss = from_str(&xml).context("parsing social rss xml")?;
        for it in rss.channel.items {
            let text = it.title.or(it.description).unwrap_or_default();
            let link = it.link.unwrap_or_default();
            raw.push((text, link, it.pub_date.as_deref().and_then(parse_rfc2822)));
        }
    } else if xml.contains("<feed") {
        let atom: Atom = from_str(&xml).context("parsing social atom xml")?;
        for e in atom.entries {
            let link = e.link.into_iter().find_map(|l| l.href).unwrap_or_default();
            let ts = e.published.or(e.updated);
            raw.push((e.title.unwrap_or_default(), link, ts.as_deref().and_then(parse_rfc3339)));
        }
    } else {
        return Err(anyhow!("social feed is neither rss nor atom"));
    }

    let out = raw
        .into_iter()
        .filter_map(|(text, link, published)| {
            let text = normalize_text(&text, MAX_TEXT_CHARS);
            if text.is_empty() || link.trim().is_empty() {
                return None;
            }
            Some(NewsItem::new(
                text,
                canonical_status_url(&link),
                NewsSourceKind::Social,
                source_name.clone(),
                published.unwrap_or_else(Utc::now),
            ))
        })
        .collect();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_links_become_twitter_links() {
        assert_eq!(
            canonical_status_url("https://nitter.net/WatcherGuru/status/1790000000000#m"),
            "https://twitter.com/WatcherGuru/status/1790000000000"
        );
        assert_eq!(canonical_status_url("https://x.test/about"), "https://x.test/about");
    }

    #[test]
    fn parses_rss_items() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>feed</title>
<item><title>JUST IN: $BTC breaks &amp; holds 70k</title>
<link>https://nitter.net/watcherguru/status/1#m</link>
<pubDate>Tue, 14 May 2024 10:00:00 GMT</pubDate></item>
</channel></rss>"#;
        let items = parse_feed(xml, "watcherguru").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "JUST IN: $BTC breaks & holds 70k");
        assert_eq!(items[0].url, "https://twitter.com/watcherguru/status/1");
        assert_eq!(items[0].source_name, "@watcherguru");
        assert_eq!(items[0].published_at.to_rfc3339(), "2024-05-14T10:00:00+00:00");
    }

    #[test]
    fn parses_atom_entries() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
<entry><title>ETH upgrade live</title><link href="https://mirror.test/a/status/9"/>
<published>2024-05-14T09:00:00Z</published></entry></feed>"#;
        let items = parse_feed(xml, "a").unwrap();
        assert_eq!(items[0].url, "https://twitter.com/a/status/9");
    }

    #[test]
    fn handles_are_normalized() {
        let s = NitterSource::new(["@Foo", "foo", " bar "], ["https://m.test/"]).unwrap();
        assert_eq!(s.accounts(), vec!["foo", "bar"]);
        assert!(s.add_account("@Baz"));
        assert!(!s.add_account("baz"));
        assert!(s.remove_account("FOO"));
        assert_eq!(s.accounts(), vec!["bar", "baz"]);
    }
}
