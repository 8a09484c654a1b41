// tests/store_signals.rs
//
// Signal store on a real database file: idempotent saves, alert marking,
// query filters, retention and persistence across reopen.

use chrono::{Duration, Utc};

use crypto_sentiment_bot::analyze::signal::{
    PriceImpact, SentimentLevel, SentimentSignal, SignalStrength, Timeframe,
};
use crypto_sentiment_bot::ingest::types::{NewsItem, NewsSourceKind};
use crypto_sentiment_bot::store::{SignalQuery, SignalStore};

fn news(n: u32, currencies: &[&str]) -> NewsItem {
    NewsItem::new(
        format!("headline {n}"),
        format!("https://store.test/{n}"),
        NewsSourceKind::Cryptopanic,
        "Wire",
        Utc::now(),
    )
    .with_currencies(currencies.iter().copied())
}

fn signal(item: &NewsItem, sentiment: SentimentLevel, strength: SignalStrength, confidence: f64) -> SentimentSignal {
    SentimentSignal {
        news_id: item.id.clone(),
        title: item.title.clone(),
        sentiment,
        confidence,
        signal_strength: strength,
        price_impact: PriceImpact::Neutral,
        timeframe: Timeframe::ShortTerm,
        reasoning: "r".into(),
        assets: item.currencies.clone(),
        analyzed_at: Utc::now(),
    }
}

#[test]
fn saves_are_idempotent_and_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("sentiment.db");

    let item = news(1, &["BTC"]);
    {
        let store = SignalStore::open(&path).unwrap();
        let first = store.save_news(&item).unwrap();
        let mut changed = item.clone();
        changed.title = "different title".into();
        let second = store.save_news(&changed).unwrap();
        assert_eq!(first, second, "second save keeps the stored row");
        store
            .save_signal(&signal(&item, SentimentLevel::Bullish, SignalStrength::Strong, 0.9))
            .unwrap();
    }

    let store = SignalStore::open(&path).unwrap();
    assert!(store.news_exists(&item.id).unwrap());
    let rec = store.get_signal_by_news_id(&item.id).unwrap().unwrap();
    assert_eq!(rec.sentiment, SentimentLevel::Bullish);
    assert!(rec.is_actionable);
    assert_eq!(rec.url(), Some("https://store.test/1"));
    assert_eq!(rec.to_signal().title, "headline 1");
}

#[test]
fn alert_is_marked_once_and_resave_keeps_it() {
    let store = SignalStore::open_in_memory().unwrap();
    let item = news(2, &["ETH"]);
    let s = signal(&item, SentimentLevel::Bearish, SignalStrength::Moderate, 0.75);
    let recs = store.save_cycle(std::slice::from_ref(&item), std::slice::from_ref(&s)).unwrap();
    let id = recs[0].id;

    assert_eq!(store.get_unsent_actionable_signals(10).unwrap().len(), 1);
    assert!(store.mark_alert_sent(id, "discord").unwrap());
    assert!(!store.mark_alert_sent(id, "discord").unwrap());
    assert_eq!(store.mark_alerts_sent(&[id], "discord").unwrap(), 0);
    assert!(store.get_unsent_actionable_signals(10).unwrap().is_empty());

    // reclassification overwrites the verdict, not the delivery record
    let again = store
        .save_signal(&signal(&item, SentimentLevel::VeryBearish, SignalStrength::Strong, 0.95))
        .unwrap();
    assert_eq!(again.id, id);
    assert_eq!(again.sentiment, SentimentLevel::VeryBearish);
    assert!(again.alert_sent);
    assert_eq!(again.alert_channel.as_deref(), Some("discord"));
    assert!(again.alert_sent_at.is_some());
}

#[test]
fn recent_signals_filter_by_sentiment_asset_and_actionability() {
    let store = SignalStore::open_in_memory().unwrap();
    let a = news(10, &["BTC"]);
    let b = news(11, &["ETH", "SOL"]);
    let c = news(12, &["BTC"]);
    let signals = vec![
        signal(&a, SentimentLevel::Bullish, SignalStrength::Strong, 0.9),
        signal(&b, SentimentLevel::Bearish, SignalStrength::Weak, 0.9),
        signal(&c, SentimentLevel::Neutral, SignalStrength::Strong, 0.9),
    ];
    store.save_cycle(&[a.clone(), b.clone(), c.clone()], &signals).unwrap();

    let all = store.get_recent_signals(&SignalQuery::default()).unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.iter().all(|r| r.news.is_some()));

    let btc = store
        .get_recent_signals(&SignalQuery {
            asset: Some("btc".into()),
            ..SignalQuery::default()
        })
        .unwrap();
    assert_eq!(btc.len(), 2);

    let bearish = store
        .get_recent_signals(&SignalQuery {
            sentiment: Some(SentimentLevel::Bearish),
            ..SignalQuery::default()
        })
        .unwrap();
    assert_eq!(bearish.len(), 1);
    assert_eq!(bearish[0].news_id, b.id);

    let actionable = store
        .get_recent_signals(&SignalQuery {
            actionable_only: true,
            ..SignalQuery::default()
        })
        .unwrap();
    assert_eq!(actionable.len(), 1);
    assert_eq!(actionable[0].news_id, a.id);

    let limited = store
        .get_recent_signals(&SignalQuery {
            limit: 1,
            ..SignalQuery::default()
        })
        .unwrap();
    assert_eq!(limited.len(), 1);

    let top = store.top_assets(24, 2).unwrap();
    assert_eq!(top[0], ("BTC".to_string(), 2));
    assert_eq!(top.len(), 2);

    let stats = store.get_signal_stats(24).unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.actionable, 1);
    assert_eq!(stats.bullish(), 1);
    assert_eq!(stats.bearish(), 1);
    assert_eq!(stats.neutral(), 1);
}

#[test]
fn cleanup_removes_only_expired_rows() {
    let store = SignalStore::open_in_memory().unwrap();
    let mut old = news(20, &["BTC"]);
    old.fetched_at = Utc::now() - Duration::days(40);
    let mut old_signal = signal(&old, SentimentLevel::Bullish, SignalStrength::Strong, 0.9);
    old_signal.analyzed_at = Utc::now() - Duration::days(40);
    let fresh = news(21, &["ETH"]);
    let fresh_signal = signal(&fresh, SentimentLevel::Bullish, SignalStrength::Strong, 0.9);

    store
        .save_cycle(&[old.clone(), fresh.clone()], &[old_signal, fresh_signal])
        .unwrap();

    assert_eq!(store.cleanup_old_records(30).unwrap(), (1, 1));
    assert!(!store.news_exists(&old.id).unwrap());
    assert!(store.news_exists(&fresh.id).unwrap());
    assert_eq!(store.cleanup_old_records(30).unwrap(), (0, 0));
}
