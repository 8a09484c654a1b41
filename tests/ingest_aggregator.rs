// tests/ingest_aggregator.rs
//
// Aggregator behaviour with in-process sources: failure isolation, asset tagging,
// filtering and dedup across calls.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};

use crypto_sentiment_bot::config::AssetUniverse;
use crypto_sentiment_bot::ingest::types::{news_id_for, NewsItem, NewsSource, NewsSourceKind};
use crypto_sentiment_bot::ingest::NewsAggregator;

struct StaticSource {
    name: &'static str,
    items: Vec<NewsItem>,
}

#[async_trait]
impl NewsSource for StaticSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self, limit: usize) -> Result<Vec<NewsItem>> {
        Ok(self.items.iter().take(limit).cloned().collect())
    }
}

struct FailingSource;

#[async_trait]
impl NewsSource for FailingSource {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn fetch(&self, _limit: usize) -> Result<Vec<NewsItem>> {
        Err(anyhow!("upstream exploded"))
    }
}

fn item(title: &str, url: &str, minutes_ago: i64) -> NewsItem {
    let base = Utc.with_ymd_and_hms(2024, 5, 14, 12, 0, 0).unwrap();
    NewsItem::new(
        title,
        url,
        NewsSourceKind::Cryptonews,
        "Test Wire",
        base - Duration::minutes(minutes_ago),
    )
}

fn three_items() -> Vec<NewsItem> {
    vec![
        item("Bitcoin miners extend rally", "https://a.test/1", 30),
        item("ETH gas fees fall to yearly low", "https://a.test/2", 10),
        item("$SOL DEX volume flips rivals", "https://a.test/3", 20),
    ]
}

#[tokio::test]
async fn failing_source_does_not_hide_the_others() {
    let agg = NewsAggregator::new(AssetUniverse::default(), true)
        .with_source(Arc::new(FailingSource))
        .with_source(Arc::new(StaticSource {
            name: "ok",
            items: three_items(),
        }));

    let items = agg.fetch_all(20).await;
    assert_eq!(items.len(), 3);
    // newest first
    let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(
        titles,
        vec![
            "ETH gas fees fall to yearly low",
            "$SOL DEX volume flips rivals",
            "Bitcoin miners extend rally"
        ]
    );
    assert_eq!(items[2].currencies, vec!["BTC"]);
    assert_eq!(items[1].currencies, vec!["SOL"]);
}

#[tokio::test]
async fn items_without_tracked_assets_are_dropped_when_filtering() {
    let mut items = three_items();
    items.push(item("Fed holds rates steady", "https://a.test/4", 5));

    let filtered = NewsAggregator::new(AssetUniverse::default(), true).with_source(Arc::new(
        StaticSource {
            name: "ok",
            items: items.clone(),
        },
    ));
    assert_eq!(filtered.fetch_all(20).await.len(), 3);

    let unfiltered = NewsAggregator::new(AssetUniverse::default(), false)
        .with_source(Arc::new(StaticSource { name: "ok", items }));
    let all = unfiltered.fetch_all(20).await;
    assert_eq!(all.len(), 4);
    assert!(all[0].currencies.is_empty());
}

#[tokio::test]
async fn same_canonical_url_is_returned_once() {
    let dup_a = item("BTC breaks out", "https://News.test/story/?utm_source=x#top", 3);
    let dup_b = item("BTC breaks out (update)", "https://news.test/story", 2);
    assert_eq!(dup_a.id, dup_b.id);
    assert_eq!(dup_a.id, news_id_for("https://news.test/story/"));

    let agg = NewsAggregator::new(AssetUniverse::default(), true)
        .with_source(Arc::new(StaticSource {
            name: "one",
            items: vec![dup_a],
        }))
        .with_source(Arc::new(StaticSource {
            name: "two",
            items: vec![dup_b],
        }));

    assert_eq!(agg.fetch_all(20).await.len(), 1);
    // already returned by this instance
    assert!(agg.fetch_all(20).await.is_empty());
    assert_eq!(agg.seen_count(), 1);

    agg.clear_seen();
    assert_eq!(agg.fetch_all(20).await.len(), 1);
}

#[tokio::test]
async fn per_source_limit_is_enforced() {
    let agg = NewsAggregator::new(AssetUniverse::default(), true).with_source(Arc::new(
        StaticSource {
            name: "ok",
            items: three_items(),
        },
    ));
    assert_eq!(agg.fetch_all(2).await.len(), 2);
}

#[tokio::test]
async fn tracked_assets_can_change_at_runtime() {
    let agg = NewsAggregator::new(AssetUniverse::default(), true).with_source(Arc::new(
        StaticSource {
            name: "ok",
            items: vec![item("KAS hashrate hits new high", "https://a.test/kas", 1)],
        },
    ));
    assert!(agg.fetch_all(20).await.is_empty());

    assert!(agg.add_asset("kas"));
    assert!(agg.tracked_assets().contains(&"KAS".to_string()));
    agg.clear_seen();
    let items = agg.fetch_all(20).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].currencies, vec!["KAS"]);

    assert!(agg.remove_asset("KAS"));
    assert!(!agg.remove_asset("KAS"));
}
